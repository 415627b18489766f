use std::fmt;

use serde::{Deserialize, Serialize};

/// Resolved workspace user id. Authentication happens upstream; the engine
/// only ever sees ids that already passed the identity collaborator.
pub type UserId = u64;

/// Globally unique message id, strictly increasing in actual creation order.
pub type MessageId = u64;

/// A container is anything owning an ordered message thread: a channel or a
/// direct-message group. Engine logic stays container-agnostic by carrying
/// this tag instead of branching on strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerRef {
    Channel(u64),
    Dm(u64),
}

impl ContainerRef {
    pub fn is_channel(&self) -> bool {
        matches!(self, ContainerRef::Channel(_))
    }

    pub fn container_id(&self) -> u64 {
        match self {
            ContainerRef::Channel(id) | ContainerRef::Dm(id) => *id,
        }
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerRef::Channel(id) => write!(f, "channel {}", id),
            ContainerRef::Dm(id) => write!(f, "dm {}", id),
        }
    }
}

/// One react kind on a message, as seen by a particular user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactView {
    pub react_kind: u32,
    /// Reactor ids in the order the reactions arrived.
    pub reactor_ids: Vec<UserId>,
    pub is_this_user_reacted: bool,
}

/// A message rendered for the transport layer, with reaction state resolved
/// against the requesting user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub message_id: MessageId,
    pub container: ContainerRef,
    pub sender_id: UserId,
    pub body: String,
    /// Unix seconds.
    pub time_sent: i64,
    pub reacts: Vec<ReactView>,
    pub is_pinned: bool,
}

/// One page of a container thread, most-recent-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<MessageView>,
    pub start: usize,
    /// `start + page_size` when more messages remain, `-1` otherwise.
    pub end: i64,
}

/// Standup state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandupStatus {
    pub is_active: bool,
    /// Unix seconds when the active session flushes; `None` when inactive.
    pub time_finish: Option<i64>,
}

/// Acknowledgement for a deferred send. The message id is not known until
/// the job actually fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredReceipt {
    pub job_id: u64,
    /// Unix seconds.
    pub fire_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_ref_display() {
        assert_eq!(ContainerRef::Channel(3).to_string(), "channel 3");
        assert_eq!(ContainerRef::Dm(7).to_string(), "dm 7");
    }

    #[test]
    fn test_container_ref_serde_round_trip() {
        let container = ContainerRef::Dm(42);
        let json = serde_json::to_string(&container).unwrap();
        let back: ContainerRef = serde_json::from_str(&json).unwrap();
        assert_eq!(container, back);
        assert!(!back.is_channel());
        assert_eq!(back.container_id(), 42);
    }
}
