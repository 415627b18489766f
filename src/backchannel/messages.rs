use chrono::Utc;

use crate::backchannel::directory::can_moderate;
use crate::backchannel::error::{BackchannelError, Result};
use crate::backchannel::message_store::validate_body;
use crate::backchannel::tagging;
use crate::backchannel::types::{ContainerRef, MessageId, MessagePage, MessageView, UserId};
use crate::backchannel::Backchannel;

impl Backchannel {
    /// Sends a message into a channel or DM and returns its id.
    ///
    /// Fails `Validation` when the body is empty or over the configured cap.
    /// Tag notifications for every mentioned live member, the sender's
    /// `messages_sent` series and the workspace `messages_exist` series are
    /// all applied atomically with the message itself.
    pub async fn send_message(
        &self,
        sender_id: UserId,
        container: ContainerRef,
        body: impl Into<String>,
    ) -> Result<MessageId> {
        let body = body.into();
        validate_body(&body, self.config.max_body_chars)?;
        self.create_message_in(container, sender_id, body).await
    }

    /// The message as seen by `actor_id`. Tombstoned ids are NotFound.
    pub async fn get_message(&self, actor_id: UserId, message_id: MessageId) -> Result<MessageView> {
        let state = self.state.read().await;
        Ok(state.store.get_live(message_id)?.view_for(actor_id))
    }

    /// Replaces a message body; an empty body logically removes the message
    /// instead.
    ///
    /// Permitted for the sender, for channel owners and global owners on
    /// channel messages, and for the DM creator on DM messages — global
    /// owners get no special rights inside DMs. The new body is re-scanned
    /// for mentions, so an edit can notify a member a second time.
    pub async fn edit_message(
        &self,
        actor_id: UserId,
        message_id: MessageId,
        body: impl Into<String>,
    ) -> Result<()> {
        let body = body.into();
        if body.chars().count() > self.config.max_body_chars {
            return Err(BackchannelError::validation(format!(
                "message body exceeds {} characters",
                self.config.max_body_chars
            )));
        }

        let mut state = self.state.write().await;
        let message = state.store.get_live(message_id)?;
        let (container, sender_id) = (message.container, message.sender_id);
        self.ensure_can_mutate(container, sender_id, actor_id)
            .await?;

        if body.is_empty() {
            Self::remove_locked(&mut state, container, message_id);
            tracing::debug!(
                target: "backchannel::messages",
                "message {} removed via empty edit by user {}",
                message_id,
                actor_id
            );
            return Ok(());
        }

        state.store.set_body(message_id, body.clone())?;
        tagging::dispatch_tag_notifications(
            self.directory.as_ref(),
            &mut state.notifications,
            container,
            &body,
            Utc::now(),
        )
        .await;
        Ok(())
    }

    /// Tombstones a message. Same permission rule as [`edit_message`](Self::edit_message);
    /// removing an already-removed message is NotFound.
    pub async fn remove_message(&self, actor_id: UserId, message_id: MessageId) -> Result<()> {
        let mut state = self.state.write().await;
        let message = state.store.get_live(message_id)?;
        let (container, sender_id) = (message.container, message.sender_id);
        self.ensure_can_mutate(container, sender_id, actor_id)
            .await?;

        Self::remove_locked(&mut state, container, message_id);
        tracing::debug!(
            target: "backchannel::messages",
            "message {} removed from {} by user {}",
            message_id,
            container,
            actor_id
        );
        Ok(())
    }

    /// Shares an existing message into another container, optionally with an
    /// extra comment appended.
    ///
    /// The original must be visible to the actor (live, in one of their
    /// containers); the actor must be a member of the target. The combined
    /// body is exempt from the length cap — a legal original plus a legal
    /// comment may exceed it — but the comment itself is capped.
    pub async fn share_message(
        &self,
        actor_id: UserId,
        og_message_id: MessageId,
        text: impl Into<String>,
        target: ContainerRef,
    ) -> Result<MessageId> {
        let text = text.into();
        if text.chars().count() > self.config.max_body_chars {
            return Err(BackchannelError::validation(format!(
                "share comment exceeds {} characters",
                self.config.max_body_chars
            )));
        }
        if !self.directory.is_member(target, actor_id).await {
            return Err(BackchannelError::permission(format!(
                "user {} is not a member of {}",
                actor_id, target
            )));
        }

        let (og_container, og_body) = {
            let state = self.state.read().await;
            let message = state.store.get_live(og_message_id)?;
            (message.container, message.body.clone())
        };
        if !self.directory.is_member(og_container, actor_id).await {
            return Err(BackchannelError::not_found(format!(
                "message {} does not exist",
                og_message_id
            )));
        }

        let body = if text.is_empty() {
            og_body
        } else {
            format!("{}\n{}", og_body, text)
        };
        self.create_message_in(target, actor_id, body).await
    }

    /// One pagination window of the container's thread, most-recent-first.
    ///
    /// Returns up to `page_size` (50) messages starting at offset `start`
    /// and the next offset, `-1` when the thread is exhausted. A `start`
    /// beyond the live message count is a `Validation` error; `start == 0`
    /// on an empty container is legal.
    pub async fn list_messages(
        &self,
        actor_id: UserId,
        container: ContainerRef,
        start: usize,
    ) -> Result<MessagePage> {
        let state = self.state.read().await;
        let total = state.threads.live_len(container);
        if start > total {
            return Err(BackchannelError::validation(format!(
                "start {} is greater than the number of messages in {}",
                start, container
            )));
        }

        let (ids, end) = state.threads.page(container, start, self.config.page_size);
        let messages = ids
            .iter()
            .map(|&id| state.store.get_live(id).map(|m| m.view_for(actor_id)))
            .collect::<Result<Vec<MessageView>>>()?;

        Ok(MessagePage {
            messages,
            start,
            end,
        })
    }

    /// The shared creation pipeline behind immediate sends, deferred fires,
    /// standup flushes and shares: allocate the id, thread it, bump the
    /// counters and dispatch tag notifications, all under one write lock.
    /// Callers validate the body first; flushes and shares are exempt.
    pub(crate) async fn create_message_in(
        &self,
        container: ContainerRef,
        sender_id: UserId,
        body: String,
    ) -> Result<MessageId> {
        let now = Utc::now();
        let mut state = self.state.write().await;

        let id = state.store.create(container, sender_id, body.clone(), now);
        state.threads.append(container, id);
        state.stats.record_message_sent(sender_id, now);
        state.stats.record_message_created(now);
        tagging::dispatch_tag_notifications(
            self.directory.as_ref(),
            &mut state.notifications,
            container,
            &body,
            now,
        )
        .await;

        tracing::debug!(
            target: "backchannel::messages",
            "message {} created in {} by user {}",
            id,
            container,
            sender_id
        );
        Ok(id)
    }

    async fn ensure_can_mutate(
        &self,
        container: ContainerRef,
        sender_id: UserId,
        actor_id: UserId,
    ) -> Result<()> {
        if actor_id == sender_id || can_moderate(self.directory.as_ref(), container, actor_id).await
        {
            return Ok(());
        }
        Err(BackchannelError::permission(format!(
            "user {} may not modify messages of user {} in {}",
            actor_id, sender_id, container
        )))
    }

    fn remove_locked(
        state: &mut super::CoreState,
        container: ContainerRef,
        message_id: MessageId,
    ) {
        // get_live succeeded under this same lock, so these cannot fail
        let _ = state.store.mark_removed(message_id);
        state.threads.remove(container, message_id);
        state.stats.record_message_removed(Utc::now());
    }
}
