//! Content digests for change detection.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::error::WatchError;

/// SHA-256 of a file's full content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Hash a file by streaming it through the hasher.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Read`] if the file cannot be opened or read.
    pub fn of_file(path: &Path) -> Result<Self, WatchError> {
        let mut file = File::open(path).map_err(|e| WatchError::read(path, e))?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher).map_err(|e| WatchError::read(path, e))?;
        Ok(Self(hasher.finalize().into()))
    }

    /// [`Self::of_file`] on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Read`] on read failures, or
    /// [`WatchError::Task`] if the hashing task panicked.
    pub async fn of_file_async(path: PathBuf) -> Result<Self, WatchError> {
        tokio::task::spawn_blocking(move || Self::of_file(&path)).await?
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            ContentDigest::of_bytes(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn file_digest_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.js");
        std::fs::write(&path, "console.log('a')\n").unwrap();
        assert_eq!(
            ContentDigest::of_file(&path).unwrap(),
            ContentDigest::of_bytes(b"console.log('a')\n")
        );
    }

    #[tokio::test]
    async fn blocking_pool_digest_matches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.js");
        let content = "x".repeat(1 << 20);
        std::fs::write(&path, &content).unwrap();
        assert_eq!(
            ContentDigest::of_file_async(path).await.unwrap(),
            ContentDigest::of_bytes(content.as_bytes())
        );
        let err = ContentDigest::of_file_async(dir.path().join("gone.js"))
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::Read { .. }));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = ContentDigest::of_file(Path::new("/nonexistent/a.js")).unwrap_err();
        assert!(matches!(err, WatchError::Read { .. }));
    }
}
