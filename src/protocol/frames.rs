//! JSON-line frames.
//!
//! Upstream frames travel between the controlling session and the host.
//! Channel frames travel between the host and one worker.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame sent by the controlling session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    /// Control event, bare broadcast name, or `"<id>@<event>"`.
    pub event: String,
    /// Event payload. `null` means the event carries no payload.
    #[serde(default)]
    pub payload: Value,
    /// Acknowledgement id the session wants replies tagged with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
}

impl InboundFrame {
    #[must_use]
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
            ack: None,
        }
    }

    #[must_use]
    pub fn with_ack(mut self, ack: u64) -> Self {
        self.ack = Some(ack);
        self
    }
}

/// Frame sent to the controlling session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// A named event.
    Event {
        event: String,
        #[serde(default)]
        payload: Value,
    },
    /// Reply to an inbound frame that carried an ack id.
    Ack { ack: u64, args: Vec<Value> },
}

impl OutboundFrame {
    #[must_use]
    pub fn event(event: impl Into<String>, payload: Value) -> Self {
        Self::Event {
            event: event.into(),
            payload,
        }
    }

    #[must_use]
    pub fn ack(ack: u64, args: Vec<Value>) -> Self {
        Self::Ack { ack, args }
    }

    /// Returns the event name for event frames.
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        match self {
            Self::Event { event, .. } => Some(event),
            Self::Ack { .. } => None,
        }
    }
}

/// Frame on a worker's private channel: `{"emit": ["event", args...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelFrame {
    pub emit: Vec<Value>,
}

impl ChannelFrame {
    #[must_use]
    pub fn new(event: &str, args: Vec<Value>) -> Self {
        let mut emit = Vec::with_capacity(args.len() + 1);
        emit.push(Value::String(event.to_string()));
        emit.extend(args);
        Self { emit }
    }

    /// Frame carrying at most one payload; `None` and `null` carry nothing.
    #[must_use]
    pub fn with_payload(event: &str, payload: Option<Value>) -> Self {
        match payload {
            Some(Value::Null) | None => Self::new(event, Vec::new()),
            Some(payload) => Self::new(event, vec![payload]),
        }
    }

    /// The event name, if the frame is well formed.
    #[must_use]
    pub fn event(&self) -> Option<&str> {
        self.emit.first().and_then(Value::as_str)
    }

    /// Split into event name and positional arguments.
    #[must_use]
    pub fn into_parts(mut self) -> Option<(String, Vec<Value>)> {
        if self.event().is_none() {
            return None;
        }
        let args = self.emit.split_off(1);
        match self.emit.pop() {
            Some(Value::String(event)) => Some((event, args)),
            _ => None,
        }
    }
}

/// Collapse worker arguments into the upstream payload shape: a single
/// argument is sent as-is, anything else as an array.
#[must_use]
pub fn payload_from_args(mut args: Vec<Value>) -> Value {
    if args.len() == 1 {
        args.pop().unwrap_or(Value::Null)
    } else {
        Value::Array(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inbound_frame_defaults_missing_fields() {
        let frame: InboundFrame = serde_json::from_str(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(frame.event, "ping");
        assert_eq!(frame.payload, Value::Null);
        assert_eq!(frame.ack, None);
    }

    #[test]
    fn inbound_frame_with_ack() {
        let frame = InboundFrame::new("run-script", json!("child.js")).with_ack(3);
        let serialized = serde_json::to_string(&frame).unwrap();
        assert!(serialized.contains(r#""ack":3"#));
        assert!(!serialized.contains('\n'));
    }

    #[test]
    fn outbound_frames_are_tagged() {
        let event = OutboundFrame::event("script-ended", json!(42));
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"event","event":"script-ended","payload":42}"#
        );

        let ack = OutboundFrame::ack(5, vec![json!(42)]);
        assert_eq!(
            serde_json::to_string(&ack).unwrap(),
            r#"{"type":"ack","ack":5,"args":[42]}"#
        );
        assert_eq!(ack.event_name(), None);
    }

    #[test]
    fn channel_frame_parts() {
        let frame = ChannelFrame::new("echo", vec![json!({"x": 4}), json!(2)]);
        assert_eq!(frame.event(), Some("echo"));
        let (event, args) = frame.into_parts().unwrap();
        assert_eq!(event, "echo");
        assert_eq!(args, vec![json!({"x": 4}), json!(2)]);
    }

    #[test]
    fn channel_frame_null_payload_carries_nothing() {
        let frame = ChannelFrame::with_payload("quit", Some(Value::Null));
        assert_eq!(frame.emit, vec![json!("quit")]);
        let frame = ChannelFrame::with_payload("ping", Some(json!("hi")));
        assert_eq!(frame.emit, vec![json!("ping"), json!("hi")]);
    }

    #[test]
    fn malformed_channel_frame_has_no_parts() {
        let frame: ChannelFrame = serde_json::from_str(r#"{"emit":[1,2]}"#).unwrap();
        assert!(frame.into_parts().is_none());
        let frame: ChannelFrame = serde_json::from_str(r#"{"emit":[]}"#).unwrap();
        assert!(frame.into_parts().is_none());
    }

    #[test]
    fn payload_shape_follows_arity() {
        assert_eq!(payload_from_args(vec![json!("a")]), json!("a"));
        assert_eq!(payload_from_args(vec![json!(1), json!(2)]), json!([1, 2]));
        assert_eq!(payload_from_args(Vec::new()), json!([]));
    }
}
