//! Package manager invocation, run inside the install worker.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use super::types::{InstallError, InstallRequest, InstallResult};

/// Runs the configured package manager in one directory.
#[derive(Debug, Clone)]
pub struct PackageManager<'a> {
    request: &'a InstallRequest,
}

impl<'a> PackageManager<'a> {
    #[must_use]
    pub fn new(request: &'a InstallRequest) -> Self {
        Self { request }
    }

    /// Check, and install if the check fails.
    pub async fn install_if_needed(&self) -> InstallResult {
        let dir = &self.request.path;
        if !dir.is_dir() {
            return InstallResult::failed(format!("Not a directory: {}", dir.display()));
        }

        match self.run(&self.request.check_args, dir).await {
            Ok(()) => return InstallResult::already_installed(),
            Err(InstallError::Spawn { program, source }) => {
                return InstallResult::failed(InstallError::Spawn { program, source });
            }
            Err(e) => tracing::info!(dir = %dir.display(), reason = %e, "Dependencies missing"),
        }

        match self.run(&self.request.install_args, dir).await {
            Ok(()) => InstallResult::installed(),
            Err(e) => InstallResult::failed(e),
        }
    }

    /// Run `<manager> <args>` in `dir`; success means exit status 0.
    async fn run(&self, args: &[String], dir: &Path) -> Result<(), InstallError> {
        let program = self.request.manager.clone();
        tracing::debug!(%program, ?args, dir = %dir.display(), "Running package manager");

        let mut cmd = Command::new(&program);
        cmd.args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.request.timeout(), cmd.output())
            .await
            .map_err(|_| InstallError::Timeout {
                program: program.clone(),
                secs: self.request.timeout_secs,
            })?
            .map_err(|source| InstallError::Spawn {
                program: program.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(InstallError::Failed {
                program,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
