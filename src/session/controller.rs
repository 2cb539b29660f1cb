//! One controlling session and everything it owns.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::config::HostConfig;
use crate::install::InstallCoordinator;
use crate::protocol::{
    InboundFrame, INSTALL_DEPS, LIST_SCRIPTS, RUN_SCRIPT, SCRIPT_RELOADED, SESSION_ENDED,
    STOP_SCRIPT, STOP_SESSION, UNWATCH_SCRIPT, WATCH_SCRIPT,
};
use crate::router::EventRouter;
use crate::transport::UpstreamSink;
use crate::watcher::{ChangeWatcher, WatchEvent};
use crate::worker::{WorkerRecord, WorkerSupervisor};

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    /// The session asked to stop.
    Stopped { reason: String },
    /// The upstream connection went away.
    Disconnected,
}

enum Input {
    Frame(Option<InboundFrame>),
    Watch(WatchEvent),
}

/// Binds one upstream connection to its router, registry and watches.
///
/// Nothing here is shared between sessions.
#[derive(Debug)]
pub struct SessionController {
    id: String,
    config: HostConfig,
    scripts_dir: PathBuf,
    upstream: UpstreamSink,
    router: EventRouter,
    installer: InstallCoordinator,
    watcher: ChangeWatcher,
    watch_events: mpsc::UnboundedReceiver<WatchEvent>,
    watch_acks: HashMap<String, Option<u64>>,
}

impl SessionController {
    #[must_use]
    pub fn new(config: &HostConfig, upstream: UpstreamSink) -> Self {
        let scripts_dir = config.scripts.dir.clone();
        let supervisor = WorkerSupervisor::from_config(config);
        let router = EventRouter::new(supervisor.clone(), upstream.clone());
        let installer =
            InstallCoordinator::new(supervisor, config.install.clone(), scripts_dir.clone());
        let (watcher, watch_events) = ChangeWatcher::new(scripts_dir.clone(), config.watch.debounce());

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            config: config.clone(),
            scripts_dir,
            upstream,
            router,
            installer,
            watcher,
            watch_events,
            watch_acks: HashMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Serve inbound frames until the session stops or disconnects.
    pub async fn run(mut self, mut inbound: mpsc::UnboundedReceiver<InboundFrame>) -> SessionExit {
        self.upstream.log(format!("Connected as {}", self.id));

        loop {
            let input = tokio::select! {
                frame = inbound.recv() => Input::Frame(frame),
                Some(event) = self.watch_events.recv() => Input::Watch(event),
            };

            match input {
                Input::Frame(Some(frame)) => {
                    if let Some(exit) = self.handle_frame(frame).await {
                        return exit;
                    }
                }
                Input::Frame(None) => {
                    self.shutdown().await;
                    return SessionExit::Disconnected;
                }
                Input::Watch(event) => self.handle_watch_event(event),
            }
        }
    }

    /// Dispatch one inbound frame. Returns the exit once the session ends.
    async fn handle_frame(&mut self, frame: InboundFrame) -> Option<SessionExit> {
        let InboundFrame {
            event,
            payload,
            ack,
        } = frame;

        match event.as_str() {
            RUN_SCRIPT => self.run_script(&payload, ack),
            STOP_SCRIPT => self.stop_script(&payload),
            WATCH_SCRIPT => self.watch_script(&payload, ack),
            UNWATCH_SCRIPT => self.unwatch_script(&payload),
            LIST_SCRIPTS => self.list_scripts(ack),
            INSTALL_DEPS => self.install_deps(&payload, ack),
            STOP_SESSION => {
                let reason = payload_text(&payload).unwrap_or("stop requested").to_string();
                return Some(self.stop_session(reason).await);
            }
            _ => {
                let delivered = self.router.route_inbound(&event, &payload);
                tracing::trace!(%event, delivered, "Routed session event");
            }
        }
        None
    }

    fn run_script(&self, payload: &Value, ack: Option<u64>) {
        let Some(request) = payload_text(payload) else {
            self.upstream.log("run-script needs a script name");
            return;
        };

        match self.router.spawn_script(request, &self.scripts_dir) {
            Ok(record) => {
                tracing::info!(session = %self.id, id = record.id(), script = %record.script_name(), "Script started");
                self.upstream.ack(ack, vec![json!(record.id())]);
            }
            Err(e) => {
                tracing::warn!(session = %self.id, %request, error = %e, "Script failed to start");
                self.upstream.log(format!("Failed to start {request}: {e}"));
            }
        }
    }

    fn stop_script(&self, payload: &Value) {
        let Some(id) = payload_id(payload) else {
            self.upstream.log(format!("stop-script needs a worker id, got {payload}"));
            return;
        };

        let router = self.router.clone();
        let upstream = self.upstream.clone();
        tokio::spawn(async move {
            match router.stop_worker(id).await {
                Ok(id) => tracing::debug!(id, "Script stopped"),
                Err(e) => {
                    upstream.log(e.to_string());
                }
            }
        });
    }

    fn watch_script(&mut self, payload: &Value, ack: Option<u64>) {
        let Some(name) = payload_text(payload) else {
            self.upstream.log("watch-script needs a script name");
            return;
        };

        match self.watcher.watch(name) {
            Ok(()) => {
                self.watch_acks.insert(name.to_string(), ack);
            }
            Err(e) => {
                self.upstream.log(format!("Failed to watch {name}: {e}"));
            }
        }
    }

    fn unwatch_script(&mut self, payload: &Value) {
        if let Some(name) = payload_text(payload) {
            self.watcher.unwatch(name);
            self.watch_acks.remove(name);
        }
    }

    fn list_scripts(&self, ack: Option<u64>) {
        match serde_json::to_value(self.router.registry().snapshot()) {
            Ok(workers) => {
                self.upstream.ack(ack, vec![workers]);
            }
            Err(e) => {
                self.upstream.log(format!("Failed to list scripts: {e}"));
            }
        }
    }

    fn install_deps(&self, payload: &Value, ack: Option<u64>) {
        let path = payload_text(payload).unwrap_or_default().to_string();
        let installer = self.installer.clone();
        let upstream = self.upstream.clone();

        tokio::spawn(async move {
            installer
                .install_if_needed(&path, |result| {
                    if let Some(err) = &result.err {
                        upstream.log(format!("Install in {path} failed: {err}"));
                    }
                    match serde_json::to_value(&result) {
                        Ok(value) => {
                            upstream.ack(ack, vec![value]);
                        }
                        Err(e) => {
                            upstream.log(format!("Failed to encode install result: {e}"));
                        }
                    }
                })
                .await;
        });
    }

    fn handle_watch_event(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::Changed { script_name } => {
                tracing::info!(session = %self.id, script = %script_name, "Watched script changed");
                if let Some(ack) = self.watch_acks.get(&script_name) {
                    self.upstream.ack(*ack, vec![json!(script_name)]);
                }
                self.upstream.emit(
                    format!("{}{script_name}", self.config.watch.event_prefix),
                    json!(script_name),
                );
                if self.config.watch.reload_on_change {
                    self.reload(&script_name);
                }
            }
            WatchEvent::Failed { script_name, error } => {
                self.upstream.log(format!("Failed to check {script_name} for changes: {error}"));
            }
        }
    }

    /// Restart every running worker of `script_name`.
    fn reload(&self, script_name: &str) {
        for record in self.router.registry().by_script(script_name) {
            if record.state().is_stopping_or_exited() {
                tracing::debug!(id = record.id(), "Skipping reload of stopping worker");
                continue;
            }
            let router = self.router.clone();
            let upstream = self.upstream.clone();
            tokio::spawn(restart(router, upstream, record));
        }
    }

    async fn stop_session(&mut self, reason: String) -> SessionExit {
        tracing::info!(session = %self.id, %reason, "Stopping session");
        self.shutdown().await;
        self.upstream.emit(SESSION_ENDED, json!(reason));
        tokio::time::sleep(self.config.session.shutdown_delay()).await;
        SessionExit::Stopped { reason }
    }

    /// Stop watches and workers.
    async fn shutdown(&mut self) {
        self.watcher.unwatch_all();
        self.watch_acks.clear();

        for result in self.router.stop_all().await {
            if let Err(e) = result {
                tracing::warn!(session = %self.id, error = %e, "Worker did not stop cleanly");
                self.upstream.log(e.to_string());
            }
        }
    }
}

async fn restart(router: EventRouter, upstream: UpstreamSink, record: Arc<WorkerRecord>) {
    let old = record.id();
    match router.restart_worker(&record).await {
        Ok(Some(replacement)) => {
            upstream.emit(SCRIPT_RELOADED, json!([old, replacement.id()]));
        }
        Ok(None) => {}
        Err(e) => {
            upstream.log(format!("Failed to reload {}: {e}", record.script_name()));
        }
    }
}

/// A string payload, or the first element of an array payload.
fn payload_text(payload: &Value) -> Option<&str> {
    match payload {
        Value::String(s) => Some(s.as_str()),
        Value::Array(items) => items.first().and_then(Value::as_str),
        _ => None,
    }
    .filter(|s| !s.trim().is_empty())
}

/// A worker id given as a number or numeric string.
fn payload_id(payload: &Value) -> Option<u32> {
    match payload {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(items) => items.first().and_then(payload_id),
        _ => None,
    }
}
