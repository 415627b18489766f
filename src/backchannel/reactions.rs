use chrono::Utc;

use crate::backchannel::directory::display_name;
use crate::backchannel::error::{BackchannelError, Result};
use crate::backchannel::message_store::Reaction;
use crate::backchannel::notifications::{Notification, NotificationKind};
use crate::backchannel::types::{MessageId, UserId};
use crate::backchannel::Backchannel;

/// React kinds the workspace understands. Kind 1 is the thumbs-up.
pub const SUPPORTED_REACT_KINDS: &[u32] = &[1];

impl Backchannel {
    /// Adds a reaction to a message.
    ///
    /// Fails `Validation` for unsupported kinds, `NotFound` when the actor
    /// is not a member of the message's container (the message is invisible
    /// to them), and `Conflict` when the actor already reacted with that
    /// kind. The message's sender is notified unless they reacted to their
    /// own message.
    pub async fn add_react(
        &self,
        actor_id: UserId,
        message_id: MessageId,
        react_kind: u32,
    ) -> Result<()> {
        ensure_supported(react_kind)?;

        let mut state = self.state.write().await;
        let message = state.store.get_live(message_id)?;
        let (container, sender_id) = (message.container, message.sender_id);
        if !self.directory.is_member(container, actor_id).await {
            return Err(BackchannelError::not_found(format!(
                "message {} does not exist",
                message_id
            )));
        }

        let message = state.store.get_live_mut(message_id)?;
        let idx = match message.reacts.iter().position(|r| r.react_kind == react_kind) {
            Some(idx) => idx,
            None => {
                message.reacts.push(Reaction {
                    react_kind,
                    reactor_ids: Vec::new(),
                });
                message.reacts.len() - 1
            }
        };
        let reaction = &mut message.reacts[idx];
        if reaction.reactor_ids.contains(&actor_id) {
            return Err(BackchannelError::conflict(format!(
                "user {} already reacted to message {} with kind {}",
                actor_id, message_id, react_kind
            )));
        }
        reaction.reactor_ids.push(actor_id);

        // Only reacts notify, never unreacts, and never the reacting sender
        // themselves.
        if actor_id != sender_id {
            let name = display_name(self.directory.as_ref(), container).await;
            state.notifications.append(Notification {
                recipient_id: sender_id,
                kind: NotificationKind::React,
                container,
                text: format!("reacted to your message in {}", name),
                created_at: Utc::now(),
            });
        }

        tracing::debug!(
            target: "backchannel::reactions",
            "user {} reacted to message {} with kind {}",
            actor_id,
            message_id,
            react_kind
        );
        Ok(())
    }

    /// Removes the actor's reaction of the given kind.
    ///
    /// Fails `Conflict` when no such reaction exists. Reaction entries whose
    /// reactor list empties are dropped entirely.
    pub async fn remove_react(
        &self,
        actor_id: UserId,
        message_id: MessageId,
        react_kind: u32,
    ) -> Result<()> {
        ensure_supported(react_kind)?;

        let mut state = self.state.write().await;
        let message = state.store.get_live(message_id)?;
        let container = message.container;
        if !self.directory.is_member(container, actor_id).await {
            return Err(BackchannelError::not_found(format!(
                "message {} does not exist",
                message_id
            )));
        }

        let message = state.store.get_live_mut(message_id)?;
        let Some(idx) = message
            .reacts
            .iter()
            .position(|r| r.react_kind == react_kind && r.reactor_ids.contains(&actor_id))
        else {
            return Err(BackchannelError::conflict(format!(
                "user {} has not reacted to message {} with kind {}",
                actor_id, message_id, react_kind
            )));
        };

        message.reacts[idx].reactor_ids.retain(|&u| u != actor_id);
        if message.reacts[idx].reactor_ids.is_empty() {
            message.reacts.remove(idx);
        }
        Ok(())
    }
}

fn ensure_supported(react_kind: u32) -> Result<()> {
    if SUPPORTED_REACT_KINDS.contains(&react_kind) {
        return Ok(());
    }
    Err(BackchannelError::validation(format!(
        "react kind {} is not supported",
        react_kind
    )))
}
