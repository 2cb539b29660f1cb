//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use script_host::config::HostConfig;
use script_host::transport::{HostClient, HostServer, ServerHandle};
use tempfile::TempDir;

/// Generous upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(10);

/// Path of the crate binary, which doubles as the echo and install worker.
pub fn host_binary() -> &'static str {
    env!("CARGO_BIN_EXE_script-host")
}

/// A config whose scripts run through `/bin/sh` from `dir`.
pub fn config_for(dir: &Path) -> HostConfig {
    let mut config = HostConfig::default();
    config.scripts.dir = dir.to_path_buf();
    config.scripts.channel_dir = dir.to_path_buf();
    config.scripts.interpreter = Some(PathBuf::from("/bin/sh"));
    config.session.socket_path = dir.join("host.sock");
    config.session.shutdown_delay_ms = 10;
    config.watch.debounce_ms = 50;
    config
}

/// Write a shell script into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    path
}

/// Write a script that becomes the echo worker, passing its arguments on.
pub fn write_echo_script(dir: &Path, name: &str) -> PathBuf {
    write_script(
        dir,
        name,
        &format!("exec '{}' echo-worker -- \"$@\"", host_binary()),
    )
}

/// Like [`write_echo_script`], but the worker ignores quit and kill events.
pub fn write_stubborn_script(dir: &Path, name: &str) -> PathBuf {
    write_script(
        dir,
        name,
        &format!("exec '{}' echo-worker --stubborn -- \"$@\"", host_binary()),
    )
}

/// A running host with one connected session.
pub struct TestHost {
    pub dir: TempDir,
    pub config: HostConfig,
    pub handle: ServerHandle,
}

impl TestHost {
    /// Start a host over a fresh scripts directory.
    pub fn start() -> Self {
        Self::start_with(|_| {})
    }

    /// Start a host after adjusting its config.
    pub fn start_with(adjust: impl FnOnce(&mut HostConfig)) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = config_for(dir.path());
        adjust(&mut config);
        let handle = HostServer::from_config(config.clone())
            .start()
            .expect("host starts");
        Self {
            dir,
            config,
            handle,
        }
    }

    pub fn scripts(&self) -> &Path {
        self.dir.path()
    }

    /// Open a session and consume its greeting.
    pub async fn connect(&self) -> HostClient {
        let mut client = HostClient::connect(self.handle.socket_path())
            .await
            .expect("client connects");
        let greeting = client
            .next_frame_timeout(WAIT)
            .await
            .expect("greeting arrives")
            .expect("session open");
        assert_eq!(greeting.event_name(), Some("log"));
        client
    }
}
