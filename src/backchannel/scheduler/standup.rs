use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use crate::backchannel::error::{BackchannelError, Result};
use crate::backchannel::scheduler::TaskPayload;
use crate::backchannel::types::{ContainerRef, StandupStatus, UserId};
use crate::backchannel::Backchannel;

/// A running standup window. Lines accumulate here until the timer fires
/// and the buffer flushes into a single message from the starter.
#[derive(Debug)]
pub(crate) struct StandupSession {
    starter_id: UserId,
    end_at: i64,
    /// `(handle, line)` in send order; handles resolve at send time.
    lines: Vec<(String, String)>,
}

impl StandupSession {
    /// The flushed body: one `"handle: line\n"` row per buffered entry.
    fn render(&self) -> String {
        self.lines
            .iter()
            .map(|(handle, line)| format!("{}: {}\n", handle, line))
            .collect()
    }
}

impl Backchannel {
    /// Opens a standup window on the container and schedules its flush.
    ///
    /// Returns the unix time the standup finishes. A negative length is a
    /// `Validation` error; a standup already running in the container is a
    /// `Conflict`. There is no early termination — only the timer ends a
    /// standup.
    pub async fn standup_start(
        &self,
        actor_id: UserId,
        container: ContainerRef,
        length_seconds: i64,
    ) -> Result<i64> {
        if length_seconds < 0 {
            return Err(BackchannelError::validation(
                "standup length cannot be negative",
            ));
        }

        let end_at = match self.standups.entry(container) {
            Entry::Occupied(_) => {
                return Err(BackchannelError::conflict(format!(
                    "a standup is already active in {}",
                    container
                )));
            }
            Entry::Vacant(slot) => {
                let end_at = Utc::now().timestamp() + length_seconds;
                slot.insert(StandupSession {
                    starter_id: actor_id,
                    end_at,
                    lines: Vec::new(),
                });
                end_at
            }
        };

        let deadline = Instant::now() + Duration::from_secs(length_seconds as u64);
        if let Err(e) = self
            .scheduler
            .submit(deadline, TaskPayload::StandupFlush { container })
            .await
        {
            // Could not arm the flush timer; roll the session back.
            self.standups.remove(&container);
            return Err(e);
        }

        tracing::debug!(
            target: "backchannel::standup",
            "standup started in {} by user {}, ends at {}",
            container,
            actor_id,
            end_at
        );
        Ok(end_at)
    }

    /// Whether a standup is running in the container, and until when.
    pub async fn standup_active(&self, container: ContainerRef) -> StandupStatus {
        match self.standups.get(&container) {
            Some(session) => StandupStatus {
                is_active: true,
                time_finish: Some(session.end_at),
            },
            None => StandupStatus {
                is_active: false,
                time_finish: None,
            },
        }
    }

    /// Buffers a line into the container's active standup.
    ///
    /// Fails `Validation` when no standup is active, the line is over the
    /// body cap, or the actor is not a member of the container.
    pub async fn standup_send(
        &self,
        actor_id: UserId,
        container: ContainerRef,
        line: impl Into<String>,
    ) -> Result<()> {
        let line = line.into();
        if line.chars().count() > self.config.max_body_chars {
            return Err(BackchannelError::validation(format!(
                "standup line exceeds {} characters",
                self.config.max_body_chars
            )));
        }
        if !self.directory.is_member(container, actor_id).await {
            return Err(BackchannelError::validation(format!(
                "user {} is not a member of {}",
                actor_id, container
            )));
        }
        let handle = match self.directory.handle_of(actor_id).await {
            Some(handle) => handle,
            None => {
                return Err(BackchannelError::not_found(format!(
                    "user {} does not exist",
                    actor_id
                )));
            }
        };

        // No awaits while the session entry is held.
        let Some(mut session) = self.standups.get_mut(&container) else {
            return Err(BackchannelError::validation(format!(
                "no standup is active in {}",
                container
            )));
        };
        session.lines.push((handle, line));
        Ok(())
    }

    /// Closes the container's standup window and sends the aggregated
    /// message, if any lines were buffered. Runs from the scheduler loop.
    pub(crate) async fn flush_standup(&self, container: ContainerRef) {
        let Some((_, session)) = self.standups.remove(&container) else {
            tracing::warn!(
                target: "backchannel::standup",
                "standup flush fired for {} but no session was active",
                container
            );
            return;
        };

        if session.lines.is_empty() {
            tracing::debug!(
                target: "backchannel::standup",
                "standup in {} ended with no lines, nothing to send",
                container
            );
            return;
        }
        if !self.directory.container_exists(container).await {
            tracing::warn!(
                target: "backchannel::standup",
                "dropping standup flush into vanished {}",
                container
            );
            return;
        }

        let body = session.render();
        match self
            .create_message_in(container, session.starter_id, body)
            .await
        {
            Ok(id) => tracing::debug!(
                target: "backchannel::standup",
                "standup in {} flushed {} line(s) into message {}",
                container,
                session.lines.len(),
                id
            ),
            Err(e) => tracing::warn!(
                target: "backchannel::standup",
                "standup flush into {} failed: {}",
                container,
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_concatenates_lines_in_send_order() {
        let session = StandupSession {
            starter_id: 1,
            end_at: 0,
            lines: vec![
                ("alice".into(), "shipped the parser".into()),
                ("bob".into(), "reviewing".into()),
            ],
        };
        assert_eq!(session.render(), "alice: shipped the parser\nbob: reviewing\n");
    }
}
