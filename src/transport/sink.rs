//! Outbound half of one upstream session.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::protocol::{OutboundFrame, SESSION_LOG};

/// Cloneable handle for writing frames to the controlling session.
///
/// Every component of a session gets its own clone; nothing writes to the
/// upstream connection any other way.
#[derive(Debug, Clone)]
pub struct UpstreamSink {
    tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl UpstreamSink {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiver that drains it.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Emit a named event. Returns false once the session is gone.
    pub fn emit(&self, event: impl Into<String>, payload: Value) -> bool {
        self.send(OutboundFrame::event(event, payload))
    }

    /// Emit a session log line.
    pub fn log(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        tracing::debug!(%message, "Session log");
        self.emit(SESSION_LOG, Value::String(message))
    }

    /// Reply to an acknowledged request. Requests without an ack id get
    /// no reply.
    pub fn ack(&self, ack: Option<u64>, args: Vec<Value>) -> bool {
        match ack {
            Some(ack) => self.send(OutboundFrame::ack(ack, args)),
            None => false,
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, frame: OutboundFrame) -> bool {
        self.tx.send(frame).is_ok()
    }
}
