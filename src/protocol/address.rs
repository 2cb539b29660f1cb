//! Addressed event names.
//!
//! A single upstream connection carries events for every worker of a
//! session. Events aimed at (or coming from) one worker carry the worker id
//! in front of the event name: `"<id>@<event>"`. Names without the separator
//! are broadcasts. Both directions go through [`EventAddress`].

use std::fmt;

/// Separator between a worker id and the event name.
pub const ADDRESS_SEPARATOR: char = '@';

/// A decoded event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAddress<'a> {
    /// Bare event name, delivered to every worker.
    Broadcast(&'a str),
    /// Event for (or from) one worker.
    Targeted { id: u32, event: &'a str },
    /// Carries a separator, but the prefix is not a worker id.
    Unresolved { target: &'a str, event: &'a str },
}

impl<'a> EventAddress<'a> {
    /// Decode a wire event name.
    ///
    /// Only the first separator splits the name, so event names may
    /// themselves contain `@`.
    #[must_use]
    pub fn parse(name: &'a str) -> Self {
        match name.split_once(ADDRESS_SEPARATOR) {
            None => Self::Broadcast(name),
            Some((target, event)) => match target.parse::<u32>() {
                Ok(id) => Self::Targeted { id, event },
                Err(_) => Self::Unresolved { target, event },
            },
        }
    }

    /// Address an event to or from a worker.
    #[must_use]
    pub fn targeted(id: u32, event: &'a str) -> Self {
        Self::Targeted { id, event }
    }

    /// The event name without any worker prefix.
    #[must_use]
    pub fn event(&self) -> &'a str {
        match self {
            Self::Broadcast(event)
            | Self::Targeted { event, .. }
            | Self::Unresolved { event, .. } => event,
        }
    }

    /// The worker id, if this address names a known-format id.
    #[must_use]
    pub fn worker_id(&self) -> Option<u32> {
        match self {
            Self::Targeted { id, .. } => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for EventAddress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast(event) => f.write_str(event),
            Self::Targeted { id, event } => write!(f, "{id}{ADDRESS_SEPARATOR}{event}"),
            Self::Unresolved { target, event } => write!(f, "{target}{ADDRESS_SEPARATOR}{event}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_is_broadcast() {
        assert_eq!(EventAddress::parse("ping"), EventAddress::Broadcast("ping"));
        assert_eq!(EventAddress::parse("ping").worker_id(), None);
    }

    #[test]
    fn prefixed_name_is_targeted() {
        let address = EventAddress::parse("4312@ping");
        assert_eq!(address, EventAddress::Targeted { id: 4312, event: "ping" });
        assert_eq!(address.worker_id(), Some(4312));
        assert_eq!(address.event(), "ping");
    }

    #[test]
    fn only_first_separator_splits() {
        let address = EventAddress::parse("7@user@example");
        assert_eq!(address.event(), "user@example");
        assert_eq!(address.worker_id(), Some(7));
    }

    #[test]
    fn non_numeric_prefix_is_unresolved() {
        let address = EventAddress::parse("abc@ping");
        assert_eq!(
            address,
            EventAddress::Unresolved {
                target: "abc",
                event: "ping"
            }
        );
        assert_eq!(address.worker_id(), None);
    }

    #[test]
    fn display_matches_wire_format() {
        assert_eq!(EventAddress::targeted(12, "echo").to_string(), "12@echo");
        assert_eq!(EventAddress::Broadcast("ready").to_string(), "ready");

        let wire = EventAddress::targeted(99, "state").to_string();
        assert_eq!(EventAddress::parse(&wire), EventAddress::targeted(99, "state"));
    }
}
