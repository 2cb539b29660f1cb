//! Dependency installation through a one-shot worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::config::InstallConfig;
use crate::protocol::{INSTALL_REQUEST, INSTALL_RESULT};
use crate::worker::{
    worker_events, ScriptCommand, SpawnError, WorkerEvent, WorkerEventReceiver, WorkerRecord,
    WorkerSupervisor,
};

use super::types::{resolve_target, InstallRequest, InstallResult};

const INSTALL_WORKER_NAME: &str = "install-worker";

/// Runs dependency checks in a dedicated worker process.
///
/// Each call spawns its own worker; concurrent calls do not wait for each
/// other.
#[derive(Debug, Clone)]
pub struct InstallCoordinator {
    supervisor: WorkerSupervisor,
    config: InstallConfig,
    base_dir: PathBuf,
}

impl InstallCoordinator {
    #[must_use]
    pub fn new(supervisor: WorkerSupervisor, config: InstallConfig, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            supervisor,
            config,
            base_dir: base_dir.into(),
        }
    }

    /// Check (and install if needed) dependencies in `relative_path`, then
    /// hand the result to `callback` exactly once.
    ///
    /// Failures, including an invalid target, are reported in the result's
    /// `err` field.
    pub async fn install_if_needed<F>(&self, relative_path: &str, callback: F)
    where
        F: FnOnce(InstallResult),
    {
        let target = match resolve_target(&self.base_dir, relative_path) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(path = %relative_path, error = %e, "Invalid install target");
                callback(InstallResult::failed(e));
                return;
            }
        };

        let (tx, rx) = worker_events();
        let record = match self
            .command()
            .and_then(|command| self.supervisor.start_command(command, tx))
        {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to start install worker");
                callback(InstallResult::failed(e));
                return;
            }
        };

        let result = self.exchange(&record, &target, rx).await;
        tracing::info!(
            id = record.id(),
            target = %target.display(),
            installed = result.is_installed,
            "Install check finished"
        );
        callback(result);

        let supervisor = self.supervisor.clone();
        tokio::spawn(async move {
            if let Err(e) = supervisor.stop(&record).await {
                tracing::warn!(error = %e, "Install worker did not stop");
            }
        });
    }

    /// Like [`Self::install_if_needed`], returning the result.
    pub async fn check(&self, relative_path: &str) -> InstallResult {
        let mut outcome = None;
        self.install_if_needed(relative_path, |result| outcome = Some(result))
            .await;
        outcome.unwrap_or_else(|| InstallResult::failed("install finished without a result"))
    }

    fn command(&self) -> Result<ScriptCommand, SpawnError> {
        let program = match &self.config.program {
            Some(program) => program.clone(),
            None => std::env::current_exe()
                .map_err(|e| SpawnError::from_io(PathBuf::from(INSTALL_WORKER_NAME), e))?,
        };
        Ok(ScriptCommand::new(INSTALL_WORKER_NAME, program)
            .parameters(self.config.args.clone())
            .working_dir(&self.base_dir))
    }

    /// Send the request and wait for the single result event.
    async fn exchange(
        &self,
        record: &Arc<WorkerRecord>,
        target: &Path,
        mut events: WorkerEventReceiver,
    ) -> InstallResult {
        let request = InstallRequest::new(target, &self.config);
        let payload = match serde_json::to_value(&request) {
            Ok(payload) => payload,
            Err(e) => return InstallResult::failed(e),
        };
        if let Err(e) = self.supervisor.send(record, INSTALL_REQUEST, Some(payload)) {
            return InstallResult::failed(e);
        }

        let id = record.id();
        let wait = async {
            let mut stderr = String::new();
            while let Some(event) = events.recv().await {
                match event {
                    WorkerEvent::Emit { event, args, .. } if event == INSTALL_RESULT => {
                        return parse_result(args);
                    }
                    WorkerEvent::Emit { event, .. } => {
                        tracing::debug!(id, %event, "Ignoring install worker event");
                    }
                    WorkerEvent::Log { message, .. } => {
                        tracing::debug!(id, %message, "Install worker");
                    }
                    WorkerEvent::Error { text, .. } => stderr = text,
                    WorkerEvent::Ended { code, .. } => {
                        return InstallResult::failed(format!(
                            "Install worker exited ({code:?}) without a result{}",
                            if stderr.is_empty() {
                                String::new()
                            } else {
                                format!(": {stderr}")
                            }
                        ));
                    }
                }
            }
            InstallResult::failed("Install worker event stream closed")
        };

        tokio::time::timeout(self.config.timeout(), wait)
            .await
            .unwrap_or_else(|_| {
                InstallResult::failed(format!(
                    "Install timed out after {}s",
                    self.config.timeout_secs
                ))
            })
    }
}

fn parse_result(args: Vec<Value>) -> InstallResult {
    match args.into_iter().next() {
        Some(value) => serde_json::from_value(value)
            .unwrap_or_else(|e| InstallResult::failed(format!("Malformed install result: {e}"))),
        None => InstallResult::failed("Empty install result"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StopConfig;
    use serde_json::json;

    fn coordinator(base: &Path) -> InstallCoordinator {
        let supervisor = WorkerSupervisor::new(base, StopConfig::default());
        InstallCoordinator::new(supervisor, InstallConfig::default(), base)
    }

    #[tokio::test]
    async fn invalid_target_reports_path_error() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());

        let mut calls = 0;
        let mut seen = None;
        coordinator
            .install_if_needed("does-not-exist", |result| {
                calls += 1;
                seen = Some(result);
            })
            .await;

        assert_eq!(calls, 1);
        let result = seen.unwrap();
        assert!(!result.is_installed);
        assert!(result.err.unwrap().contains("does not exist"));
    }

    #[tokio::test]
    async fn missing_program_is_reported_in_result() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("app")).unwrap();
        let supervisor = WorkerSupervisor::new(dir.path(), StopConfig::default());
        let config = InstallConfig {
            program: Some(dir.path().join("no-such-installer")),
            ..InstallConfig::default()
        };
        let coordinator = InstallCoordinator::new(supervisor, config, dir.path());

        let result = coordinator.check("app").await;
        assert!(!result.is_installed);
        assert!(result.err.unwrap().contains("no-such-installer"));
    }

    #[test]
    fn result_parsing() {
        assert_eq!(
            parse_result(vec![json!({"isInstalled": true, "didInstall": false})]),
            InstallResult::already_installed()
        );
        assert!(parse_result(vec![json!("nonsense")]).err.is_some());
        assert!(parse_result(Vec::new()).err.is_some());
    }
}
