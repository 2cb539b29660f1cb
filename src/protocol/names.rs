//! Fixed event names.

/// Start a script; payload `"name[|parameters]"`, acked with the worker id.
pub const RUN_SCRIPT: &str = "run-script";
/// Stop a worker by id.
pub const STOP_SCRIPT: &str = "stop-script";
/// Watch a script file for content changes.
pub const WATCH_SCRIPT: &str = "watch-script";
/// Stop watching a script file.
pub const UNWATCH_SCRIPT: &str = "unwatch-script";
/// End the session.
pub const STOP_SESSION: &str = "stop-session";
/// Run dependency installation for a directory.
pub const INSTALL_DEPS: &str = "install-deps";
/// Ack with a snapshot of the running workers.
pub const LIST_SCRIPTS: &str = "list-scripts";

/// Control events handled by the session instead of being routed to workers.
pub const CONTROL_EVENTS: &[&str] = &[
    RUN_SCRIPT,
    STOP_SCRIPT,
    WATCH_SCRIPT,
    UNWATCH_SCRIPT,
    STOP_SESSION,
    INSTALL_DEPS,
    LIST_SCRIPTS,
];

/// A worker terminated; payload is the id.
pub const SCRIPT_ENDED: &str = "script-ended";
/// A worker exited abnormally; payload is its accumulated stderr.
pub const SCRIPT_ERROR: &str = "script-error";
/// A worker wrote a stdout line; payload is `[message, id]`.
pub const SCRIPT_LOG: &str = "script-log";
/// A worker was restarted after a change; payload is `[old_id, new_id]`.
pub const SCRIPT_RELOADED: &str = "script-reloaded";
/// Session-level log line.
pub const SESSION_LOG: &str = "log";
/// The session is about to close; payload is the reason.
pub const SESSION_ENDED: &str = "session-ended";

/// Asks a worker to exit on its own.
pub const QUIT_EVENT: &str = "quit";
/// Asks a worker to exit immediately.
pub const KILL_EVENT: &str = "kill";

/// Sent to the install worker with the target directory.
pub const INSTALL_REQUEST: &str = "install-if-needed";
/// Sent by the install worker with its result.
pub const INSTALL_RESULT: &str = "install-result";

/// Separates the script name from its parameters in a run request.
pub const PARAMETER_SEPARATOR: char = '|';

/// Environment variable carrying the worker channel socket path.
pub const CHANNEL_ENV: &str = "SCRIPT_HOST_CHANNEL";

/// Returns true for events the session handles itself.
#[must_use]
pub fn is_control_event(name: &str) -> bool {
    CONTROL_EVENTS.contains(&name)
}
