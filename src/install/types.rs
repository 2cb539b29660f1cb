//! Install request and result types.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::InstallConfig;

/// Outcome of one dependency check, as reported to the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallResult {
    pub is_installed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did_install: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl InstallResult {
    /// Dependencies were already present.
    #[must_use]
    pub fn already_installed() -> Self {
        Self {
            is_installed: true,
            did_install: Some(false),
            err: None,
        }
    }

    /// Dependencies were missing and have been installed.
    #[must_use]
    pub fn installed() -> Self {
        Self {
            is_installed: true,
            did_install: Some(true),
            err: None,
        }
    }

    #[must_use]
    pub fn failed(err: impl fmt::Display) -> Self {
        Self {
            is_installed: false,
            did_install: None,
            err: Some(err.to_string()),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.err.is_none()
    }
}

/// Work order sent to the install worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRequest {
    pub path: PathBuf,
    pub manager: String,
    #[serde(default)]
    pub check_args: Vec<String>,
    #[serde(default)]
    pub install_args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    600
}

impl InstallRequest {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, config: &InstallConfig) -> Self {
        Self {
            path: path.into(),
            manager: config.manager.clone(),
            check_args: config.check_args.clone(),
            install_args: config.install_args.clone(),
            timeout_secs: config.timeout_secs,
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Invalid install target.
#[derive(thiserror::Error, Debug)]
pub enum PathError {
    #[error("No install path given")]
    Empty,

    #[error("Install path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Install path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Resolve `relative` against `base` and check it names a directory.
///
/// # Errors
///
/// Returns a [`PathError`] describing why the target is unusable.
pub fn resolve_target(base: &Path, relative: &str) -> Result<PathBuf, PathError> {
    let relative = relative.trim();
    if relative.is_empty() {
        return Err(PathError::Empty);
    }

    let joined = base.join(relative);
    let target = joined.canonicalize().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PathError::NotFound(joined.clone()),
        _ => PathError::Io {
            path: joined.clone(),
            source: e,
        },
    })?;

    if target.is_dir() {
        Ok(target)
    } else {
        Err(PathError::NotADirectory(target))
    }
}

/// Failure of the package manager itself.
#[derive(thiserror::Error, Debug)]
pub enum InstallError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_uses_camel_case() {
        assert_eq!(
            serde_json::to_value(InstallResult::installed()).unwrap(),
            json!({"isInstalled": true, "didInstall": true})
        );
        assert_eq!(
            serde_json::to_value(InstallResult::failed("nope")).unwrap(),
            json!({"isInstalled": false, "err": "nope"})
        );
        let parsed: InstallResult = serde_json::from_value(json!({"isInstalled": true})).unwrap();
        assert_eq!(parsed.did_install, None);
        assert!(parsed.is_ok());
    }

    #[test]
    fn request_round_trips_config() {
        let config = InstallConfig::default();
        let request = InstallRequest::new("/work/app", &config);
        assert_eq!(request.manager, "npm");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["checkArgs"], json!(["ls"]));
        let back: InstallRequest = serde_json::from_value(value).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn resolve_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("app")).unwrap();
        let target = resolve_target(dir.path(), "app").unwrap();
        assert!(target.ends_with("app"));
        assert!(target.is_absolute());
    }

    #[test]
    fn resolve_rejects_bad_targets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), "x").unwrap();

        assert!(matches!(resolve_target(dir.path(), " "), Err(PathError::Empty)));
        assert!(matches!(
            resolve_target(dir.path(), "missing"),
            Err(PathError::NotFound(_))
        ));
        assert!(matches!(
            resolve_target(dir.path(), "file.txt"),
            Err(PathError::NotADirectory(_))
        ));
    }
}
