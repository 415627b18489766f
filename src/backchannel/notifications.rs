use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backchannel::directory::display_name;
use crate::backchannel::types::{ContainerRef, UserId};
use crate::backchannel::Backchannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// The membership collaborator added the recipient to a container.
    Added,
    /// The recipient was @-mentioned in a message.
    Tag,
    /// Someone reacted to one of the recipient's messages.
    React,
}

/// One event in a user's notification feed. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub container: ContainerRef,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Per-user append-only event log. Storage is unbounded; reads are capped
/// by the engine config (20 most recent by default).
#[derive(Debug, Default)]
pub(crate) struct NotificationLog {
    entries: HashMap<UserId, Vec<Notification>>,
}

impl NotificationLog {
    pub(crate) fn append(&mut self, notification: Notification) {
        self.entries
            .entry(notification.recipient_id)
            .or_default()
            .push(notification);
    }

    /// The `cap` most recent notifications for `recipient`, newest first.
    pub(crate) fn recent(&self, recipient: UserId, cap: usize) -> Vec<Notification> {
        self.entries
            .get(&recipient)
            .into_iter()
            .flat_map(|log| log.iter().rev().take(cap).cloned())
            .collect()
    }
}

impl Backchannel {
    /// The requesting user's notification feed: at most the configured cap,
    /// most recent first.
    pub async fn notifications_for(&self, user_id: UserId) -> Vec<Notification> {
        let state = self.state.read().await;
        state
            .notifications
            .recent(user_id, self.config.notification_read_cap)
    }

    /// Records that the membership collaborator added `user_id` to
    /// `container`. The engine owns only the notification side of the event;
    /// membership itself lives with the collaborator.
    pub async fn membership_added(&self, user_id: UserId, container: ContainerRef) {
        let name = display_name(self.directory.as_ref(), container).await;
        let notification = Notification {
            recipient_id: user_id,
            kind: NotificationKind::Added,
            container,
            text: format!("added you to {}", name),
            created_at: Utc::now(),
        };

        let mut state = self.state.write().await;
        state.notifications.append(notification);
        tracing::debug!(
            target: "backchannel::notifications",
            "user {} notified of being added to {}",
            user_id,
            container
        );
    }
}
