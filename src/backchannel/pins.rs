use crate::backchannel::directory::can_moderate;
use crate::backchannel::error::{BackchannelError, Result};
use crate::backchannel::types::{MessageId, UserId};
use crate::backchannel::Backchannel;

impl Backchannel {
    /// Marks a message as pinned.
    ///
    /// Membership is checked before role: a non-member gets `NotFound` (the
    /// message is invisible to them), a member without moderation rights
    /// gets `Permission`. Pinning an already-pinned message is a `Conflict`.
    pub async fn pin_message(&self, actor_id: UserId, message_id: MessageId) -> Result<()> {
        self.set_pinned(actor_id, message_id, true).await
    }

    /// Clears a message's pin. Same checks as [`pin_message`](Self::pin_message);
    /// unpinning a message that is not pinned is a `Conflict`.
    pub async fn unpin_message(&self, actor_id: UserId, message_id: MessageId) -> Result<()> {
        self.set_pinned(actor_id, message_id, false).await
    }

    async fn set_pinned(&self, actor_id: UserId, message_id: MessageId, pinned: bool) -> Result<()> {
        let mut state = self.state.write().await;
        let message = state.store.get_live(message_id)?;
        let container = message.container;

        if !self.directory.is_member(container, actor_id).await {
            return Err(BackchannelError::not_found(format!(
                "message {} does not exist",
                message_id
            )));
        }
        if !can_moderate(self.directory.as_ref(), container, actor_id).await {
            return Err(BackchannelError::permission(format!(
                "user {} may not pin messages in {}",
                actor_id, container
            )));
        }

        let message = state.store.get_live_mut(message_id)?;
        if message.pinned == pinned {
            return Err(BackchannelError::conflict(format!(
                "message {} is already {}",
                message_id,
                if pinned { "pinned" } else { "unpinned" }
            )));
        }
        message.pinned = pinned;

        tracing::debug!(
            target: "backchannel::pins",
            "message {} {} by user {}",
            message_id,
            if pinned { "pinned" } else { "unpinned" },
            actor_id
        );
        Ok(())
    }
}
