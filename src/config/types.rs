//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::StopConfig;

/// Where scripts live and how they are launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Base directory that script names are resolved against.
    #[serde(default = "default_scripts_dir")]
    pub dir: PathBuf,
    /// Program used to run scripts (for example `node`). Scripts are
    /// executed directly when unset.
    #[serde(default)]
    pub interpreter: Option<PathBuf>,
    /// Directory for per-worker channel sockets.
    #[serde(default = "default_channel_dir")]
    pub channel_dir: PathBuf,
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("scripts")
}

fn default_channel_dir() -> PathBuf {
    std::env::temp_dir()
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            dir: default_scripts_dir(),
            interpreter: None,
            channel_dir: default_channel_dir(),
        }
    }
}

/// Change detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Lockout window that coalesces bursts of file notifications.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Restart running workers of a script when its content changes.
    #[serde(default = "default_reload_on_change")]
    pub reload_on_change: bool,
    /// Prefix of the broadcast event emitted on change.
    #[serde(default = "default_event_prefix")]
    pub event_prefix: String,
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_reload_on_change() -> bool {
    true
}

fn default_event_prefix() -> String {
    "script-changed:".to_string()
}

impl WatchConfig {
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            reload_on_change: default_reload_on_change(),
            event_prefix: default_event_prefix(),
        }
    }
}

/// Dependency installation worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Executable of the install worker. Defaults to this binary.
    #[serde(default)]
    pub program: Option<PathBuf>,
    /// Arguments that select the install worker mode.
    #[serde(default = "default_install_worker_args")]
    pub args: Vec<String>,
    /// Package manager invoked by the install worker.
    #[serde(default = "default_manager")]
    pub manager: String,
    /// Arguments that check whether dependencies are met.
    #[serde(default = "default_check_args")]
    pub check_args: Vec<String>,
    /// Arguments that install dependencies.
    #[serde(default = "default_install_args")]
    pub install_args: Vec<String>,
    /// Upper bound for one install run.
    #[serde(default = "default_install_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_install_worker_args() -> Vec<String> {
    vec!["install-worker".to_string()]
}

fn default_manager() -> String {
    "npm".to_string()
}

fn default_check_args() -> Vec<String> {
    vec!["ls".to_string()]
}

fn default_install_args() -> Vec<String> {
    vec!["install".to_string()]
}

fn default_install_timeout_secs() -> u64 {
    600
}

impl InstallConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: default_install_worker_args(),
            manager: default_manager(),
            check_args: default_check_args(),
            install_args: default_install_args(),
            timeout_secs: default_install_timeout_secs(),
        }
    }
}

/// Upstream session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unix socket the host listens on.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Delay between the session-ended notice and closing the connection.
    #[serde(default = "default_shutdown_delay_ms")]
    pub shutdown_delay_ms: u64,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(crate::transport::DEFAULT_SOCKET_PATH)
}

fn default_shutdown_delay_ms() -> u64 {
    100
}

impl SessionConfig {
    #[must_use]
    pub fn shutdown_delay(&self) -> Duration {
        Duration::from_millis(self.shutdown_delay_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            shutdown_delay_ms: default_shutdown_delay_ms(),
        }
    }
}

/// Configuration for the script host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub stop: StopConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub install: InstallConfig,
    #[serde(default)]
    pub session: SessionConfig,
}
