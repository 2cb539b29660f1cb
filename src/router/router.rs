//! Routing between the upstream session and its workers.

use std::path::Path;
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::{json, Value};

use crate::protocol::{
    payload_from_args, ChannelFrame, EventAddress, SCRIPT_ENDED, SCRIPT_ERROR, SCRIPT_LOG,
};
use crate::router::{RouterError, WorkerRegistry};
use crate::transport::UpstreamSink;
use crate::worker::{
    parse_parameters, split_run_request, worker_events, ScriptCommand, StopError,
    WorkerEvent, WorkerEventReceiver, WorkerRecord, WorkerSupervisor,
};

/// Routes events between one upstream session and the workers it owns.
///
/// Cloning is cheap; clones share the registry.
#[derive(Debug, Clone)]
pub struct EventRouter {
    registry: Arc<WorkerRegistry>,
    supervisor: WorkerSupervisor,
    upstream: UpstreamSink,
}

impl EventRouter {
    #[must_use]
    pub fn new(supervisor: WorkerSupervisor, upstream: UpstreamSink) -> Self {
        Self {
            registry: Arc::new(WorkerRegistry::new()),
            supervisor,
            upstream,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    #[must_use]
    pub fn supervisor(&self) -> &WorkerSupervisor {
        &self.supervisor
    }

    /// Make `record` routable and forward its events upstream.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Duplicate`] if a live worker holds the id.
    pub fn register_worker(
        &self,
        record: Arc<WorkerRecord>,
        events: WorkerEventReceiver,
    ) -> Result<(), RouterError> {
        self.registry.register(Arc::clone(&record))?;
        tracing::debug!(id = record.id(), script = %record.script_name(), "Registered worker");

        tokio::spawn(forward_worker_events(
            Arc::clone(&self.registry),
            record,
            events,
            self.upstream.clone(),
        ));
        Ok(())
    }

    /// Stop routing to `id`. The process itself is left alone.
    pub fn unregister_worker(&self, id: u32) -> Option<Arc<WorkerRecord>> {
        let removed = self.registry.remove(id);
        if removed.is_some() {
            tracing::debug!(id, "Unregistered worker");
        }
        removed
    }

    /// Deliver an upstream event to its workers.
    ///
    /// Bare names go to every worker with an open channel, `"<id>@<event>"`
    /// only to worker `id`. Unknown targets are dropped. Returns how many
    /// workers the event was queued for.
    pub fn route_inbound(&self, addressed_name: &str, payload: &Value) -> usize {
        match EventAddress::parse(addressed_name) {
            EventAddress::Broadcast(event) => self
                .registry
                .all()
                .iter()
                .filter(|record| record.channel().is_open())
                .filter(|record| deliver(record, event, payload))
                .count(),
            EventAddress::Targeted { id, event } => match self.registry.get(id) {
                Some(record) => usize::from(deliver(&record, event, payload)),
                None => {
                    tracing::debug!(id, event, "Dropping event for unknown worker");
                    0
                }
            },
            EventAddress::Unresolved { target, event } => {
                tracing::debug!(worker = target, event, "Dropping event with invalid worker id");
                0
            }
        }
    }

    /// Deliver a worker's event upstream as `"<id>@<event>"`.
    pub fn route_outbound(&self, id: u32, event_name: &str, payload: Value) -> bool {
        emit_from_worker(&self.upstream, id, event_name, payload)
    }

    /// Start a script from a `"name[|parameters]"` request.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Spawn`] if the worker cannot be started.
    pub fn spawn_script(
        &self,
        request: &str,
        base_path: &Path,
    ) -> Result<Arc<WorkerRecord>, RouterError> {
        let (name, params) = split_run_request(request);
        let parameters = params.map(parse_parameters).unwrap_or_default();
        self.start_script(name, parameters, base_path)
    }

    /// Start a script and register it.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Spawn`] if the worker cannot be started.
    pub fn start_script(
        &self,
        script_name: &str,
        launch_parameters: Vec<String>,
        base_path: &Path,
    ) -> Result<Arc<WorkerRecord>, RouterError> {
        let (tx, rx) = worker_events();
        let record = self
            .supervisor
            .start(script_name, launch_parameters, base_path, tx)?;
        self.adopt(record, rx)
    }

    /// Start `command` again as a new worker.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Spawn`] if the worker cannot be started.
    pub fn launch(&self, command: ScriptCommand) -> Result<Arc<WorkerRecord>, RouterError> {
        let (tx, rx) = worker_events();
        let record = self.supervisor.start_command(command, tx)?;
        self.adopt(record, rx)
    }

    /// Stop a registered worker.
    ///
    /// # Errors
    ///
    /// Returns [`StopError::UnknownWorker`] for ids not in the registry.
    pub async fn stop_worker(&self, id: u32) -> Result<u32, RouterError> {
        let record = self
            .registry
            .get(id)
            .ok_or(StopError::UnknownWorker(id))?;
        let stopped = self.supervisor.stop(&record).await?;
        self.registry.remove_if(&record);
        Ok(stopped)
    }

    /// Stop every registered worker concurrently.
    pub async fn stop_all(&self) -> Vec<Result<u32, RouterError>> {
        let ids = self.registry.ids();
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "Stopping all workers");
        }
        join_all(ids.into_iter().map(|id| self.stop_worker(id))).await
    }

    /// Stop `record` and start its command again with the same parameters.
    ///
    /// Returns `Ok(None)` without starting anything if `record` is already
    /// being stopped, so overlapping reloads never duplicate a worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the old worker cannot be stopped or the new one
    /// cannot be started.
    pub async fn restart_worker(
        &self,
        record: &Arc<WorkerRecord>,
    ) -> Result<Option<Arc<WorkerRecord>>, RouterError> {
        let Some(stopped) = self.supervisor.stop_exclusive(record).await? else {
            tracing::debug!(id = record.id(), "Restart skipped, worker already stopping");
            return Ok(None);
        };
        self.registry.remove_if(record);
        let replacement = self.launch(record.command().clone())?;
        tracing::info!(
            old = stopped,
            new = replacement.id(),
            script = %record.script_name(),
            "Restarted worker"
        );
        Ok(Some(replacement))
    }

    fn adopt(
        &self,
        record: Arc<WorkerRecord>,
        events: WorkerEventReceiver,
    ) -> Result<Arc<WorkerRecord>, RouterError> {
        if let Err(e) = self.register_worker(Arc::clone(&record), events) {
            let supervisor = self.supervisor.clone();
            let orphan = Arc::clone(&record);
            tokio::spawn(async move {
                if let Err(e) = supervisor.stop(&orphan).await {
                    tracing::warn!(id = orphan.id(), error = %e, "Orphaned worker did not stop");
                }
            });
            return Err(e);
        }
        Ok(record)
    }
}

fn deliver(record: &WorkerRecord, event: &str, payload: &Value) -> bool {
    match record
        .channel()
        .send(ChannelFrame::with_payload(event, Some(payload.clone())))
    {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(id = record.id(), event, error = %e, "Event not delivered");
            false
        }
    }
}

fn emit_from_worker(upstream: &UpstreamSink, id: u32, event: &str, payload: Value) -> bool {
    upstream.emit(EventAddress::targeted(id, event).to_string(), payload)
}

/// Forward one worker's events upstream, in order, until it ends.
async fn forward_worker_events(
    registry: Arc<WorkerRegistry>,
    record: Arc<WorkerRecord>,
    mut events: WorkerEventReceiver,
    upstream: UpstreamSink,
) {
    while let Some(event) = events.recv().await {
        match event {
            WorkerEvent::Log { id, message } => {
                upstream.emit(SCRIPT_LOG, json!([message, id]));
            }
            WorkerEvent::Emit { id, event, args } => {
                emit_from_worker(&upstream, id, &event, payload_from_args(args));
            }
            WorkerEvent::Error { id, text } => {
                tracing::warn!(id, script = %record.script_name(), "Worker exited abnormally");
                upstream.emit(SCRIPT_ERROR, Value::String(text));
            }
            WorkerEvent::Ended { id, code } => {
                registry.remove_if(&record);
                tracing::debug!(id, ?code, "Worker ended");
                upstream.emit(SCRIPT_ENDED, json!(id));
                break;
            }
        }
    }
}
