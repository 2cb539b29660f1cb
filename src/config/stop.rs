//! Worker stop escalation configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing windows for the graceful-then-forced stop sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopConfig {
    /// How long a worker gets to honor the graceful exit event.
    #[serde(default = "default_graceful_ms")]
    pub graceful_ms: u64,

    /// How long a worker gets after its channel is disconnected.
    #[serde(default = "default_disconnect_ms")]
    pub disconnect_ms: u64,

    /// How long to wait for the process to be reaped after a kill.
    #[serde(default = "default_kill_confirm_ms")]
    pub kill_confirm_ms: u64,
}

fn default_graceful_ms() -> u64 {
    50
}

fn default_disconnect_ms() -> u64 {
    50
}

fn default_kill_confirm_ms() -> u64 {
    1000
}

impl StopConfig {
    #[must_use]
    pub fn graceful(&self) -> Duration {
        Duration::from_millis(self.graceful_ms)
    }

    #[must_use]
    pub fn disconnect(&self) -> Duration {
        Duration::from_millis(self.disconnect_ms)
    }

    #[must_use]
    pub fn kill_confirm(&self) -> Duration {
        Duration::from_millis(self.kill_confirm_ms)
    }
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            graceful_ms: default_graceful_ms(),
            disconnect_ms: default_disconnect_ms(),
            kill_confirm_ms: default_kill_confirm_ms(),
        }
    }
}
