use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backchannel::error::{BackchannelError, Result};
use crate::backchannel::types::{ContainerRef, MessageId, MessageView, ReactView, UserId};

/// Allocator for the single id space shared by channel and DM messages.
///
/// Allocation only happens while the engine write lock is held, which is what
/// makes ids strictly increasing in actual creation order across immediate,
/// deferred and standup sends.
#[derive(Debug)]
pub(crate) struct MessageSequence(AtomicU64);

impl MessageSequence {
    pub(crate) fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub(crate) fn next(&self) -> MessageId {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// One react kind and everyone who used it, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub react_kind: u32,
    pub reactor_ids: Vec<UserId>,
}

/// Canonical message record. Removed messages stay in the store as
/// tombstones so their id is never reused; they are invisible everywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub container: ContainerRef,
    pub sender_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub removed: bool,
    pub pinned: bool,
    pub reacts: Vec<Reaction>,
}

impl Message {
    /// Renders the message for `viewer`, resolving per-user reaction state.
    pub fn view_for(&self, viewer: UserId) -> MessageView {
        MessageView {
            message_id: self.id,
            container: self.container,
            sender_id: self.sender_id,
            body: self.body.clone(),
            time_sent: self.created_at.timestamp(),
            reacts: self
                .reacts
                .iter()
                .map(|r| ReactView {
                    react_kind: r.react_kind,
                    reactor_ids: r.reactor_ids.clone(),
                    is_this_user_reacted: r.reactor_ids.contains(&viewer),
                })
                .collect(),
            is_pinned: self.pinned,
        }
    }
}

/// Rejects bodies the engine refuses to store: empty or longer than
/// `cap` characters.
pub(crate) fn validate_body(body: &str, cap: usize) -> Result<()> {
    if body.is_empty() {
        return Err(BackchannelError::validation("message body is empty"));
    }
    if body.chars().count() > cap {
        return Err(BackchannelError::validation(format!(
            "message body exceeds {} characters",
            cap
        )));
    }
    Ok(())
}

/// Keyed storage for every message in the workspace, channel or DM.
#[derive(Debug)]
pub(crate) struct MessageStore {
    seq: MessageSequence,
    messages: HashMap<MessageId, Message>,
}

impl MessageStore {
    pub(crate) fn new(seq: MessageSequence) -> Self {
        Self {
            seq,
            messages: HashMap::new(),
        }
    }

    /// Allocates the next global id and stores a fresh message under it.
    pub(crate) fn create(
        &mut self,
        container: ContainerRef,
        sender_id: UserId,
        body: String,
        created_at: DateTime<Utc>,
    ) -> MessageId {
        let id = self.seq.next();
        self.messages.insert(
            id,
            Message {
                id,
                container,
                sender_id,
                body,
                created_at,
                removed: false,
                pinned: false,
                reacts: Vec::new(),
            },
        );
        id
    }

    /// Looks up a live (non-tombstoned) message.
    pub(crate) fn get_live(&self, id: MessageId) -> Result<&Message> {
        match self.messages.get(&id) {
            Some(message) if !message.removed => Ok(message),
            _ => Err(BackchannelError::not_found(format!(
                "message {} does not exist",
                id
            ))),
        }
    }

    pub(crate) fn get_live_mut(&mut self, id: MessageId) -> Result<&mut Message> {
        match self.messages.get_mut(&id) {
            Some(message) if !message.removed => Ok(message),
            _ => Err(BackchannelError::not_found(format!(
                "message {} does not exist",
                id
            ))),
        }
    }

    /// Replaces the body of a live message. Id, sender and creation time are
    /// untouched.
    pub(crate) fn set_body(&mut self, id: MessageId, body: String) -> Result<()> {
        self.get_live_mut(id)?.body = body;
        Ok(())
    }

    /// Tombstones a live message. Removing twice is a NotFound, same as an
    /// unknown id.
    pub(crate) fn mark_removed(&mut self, id: MessageId) -> Result<()> {
        self.get_live_mut(id)?.removed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MessageStore {
        MessageStore::new(MessageSequence::new())
    }

    #[test]
    fn test_validate_body() {
        assert!(validate_body("hi", 1000).is_ok());
        assert!(validate_body(&"x".repeat(1000), 1000).is_ok());

        let empty = validate_body("", 1000);
        assert!(matches!(empty, Err(BackchannelError::Validation(_))));

        let too_long = validate_body(&"x".repeat(1001), 1000);
        assert!(matches!(too_long, Err(BackchannelError::Validation(_))));
    }

    #[test]
    fn test_create_allocates_increasing_ids_across_containers() {
        let mut store = store();
        let now = Utc::now();
        let a = store.create(ContainerRef::Channel(1), 1, "one".into(), now);
        let b = store.create(ContainerRef::Dm(1), 1, "two".into(), now);
        let c = store.create(ContainerRef::Channel(2), 2, "three".into(), now);
        assert!(a < b && b < c);
    }

    #[test]
    fn test_round_trip_and_edit() {
        let mut store = store();
        let id = store.create(ContainerRef::Channel(1), 1, "hello".into(), Utc::now());
        assert_eq!(store.get_live(id).unwrap().body, "hello");

        store.set_body(id, "goodbye".into()).unwrap();
        let message = store.get_live(id).unwrap();
        assert_eq!(message.body, "goodbye");
        assert_eq!(message.id, id);
        assert_eq!(message.sender_id, 1);
    }

    #[test]
    fn test_removed_message_is_invisible_and_double_remove_fails() {
        let mut store = store();
        let id = store.create(ContainerRef::Dm(1), 1, "bye".into(), Utc::now());

        store.mark_removed(id).unwrap();
        assert!(matches!(
            store.get_live(id),
            Err(BackchannelError::NotFound(_))
        ));
        assert!(matches!(
            store.mark_removed(id),
            Err(BackchannelError::NotFound(_))
        ));
    }

    #[test]
    fn test_view_for_resolves_reaction_state() {
        let mut store = store();
        let id = store.create(ContainerRef::Channel(1), 1, "hi".into(), Utc::now());
        store.get_live_mut(id).unwrap().reacts.push(Reaction {
            react_kind: 1,
            reactor_ids: vec![2, 3],
        });

        let view = store.get_live(id).unwrap().view_for(2);
        assert!(view.reacts[0].is_this_user_reacted);
        assert_eq!(view.reacts[0].reactor_ids, vec![2, 3]);

        let view = store.get_live(id).unwrap().view_for(4);
        assert!(!view.reacts[0].is_this_user_reacted);
    }
}
