use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{self, AtomicU64};
use std::sync::Weak;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::Instant;

use crate::backchannel::error::{BackchannelError, Result};
use crate::backchannel::message_store::validate_body;
use crate::backchannel::types::{ContainerRef, DeferredReceipt, UserId};
use crate::backchannel::Backchannel;

pub(crate) mod standup;

/// What a scheduled task does when its deadline passes. Plain data: the
/// loop owns no logic beyond handing the payload back to the engine.
#[derive(Debug)]
pub(crate) enum TaskPayload {
    DeferredSend {
        container: ContainerRef,
        sender_id: UserId,
        body: String,
    },
    StandupFlush {
        container: ContainerRef,
    },
}

#[derive(Debug)]
pub(crate) struct ScheduledTask {
    deadline: Instant,
    seq: u64,
    payload: TaskPayload,
}

// BinaryHeap is a max-heap; ordering is reversed so the earliest deadline
// (then lowest submission seq) surfaces first.
impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then(other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for ScheduledTask {}

pub(crate) enum SchedulerCommand {
    Schedule(ScheduledTask),
    /// Drop every pending task; used by the external clear collaborator.
    Drain,
}

/// Caller-side handle to the scheduler loop.
#[derive(Debug)]
pub(crate) struct SchedulerHandle {
    commands: Sender<SchedulerCommand>,
    job_seq: AtomicU64,
}

impl SchedulerHandle {
    pub(crate) fn new(commands: Sender<SchedulerCommand>) -> Self {
        Self {
            commands,
            job_seq: AtomicU64::new(1),
        }
    }

    /// Enqueues a task for `deadline` and returns its job id. Never waits
    /// for the deadline itself.
    pub(crate) async fn submit(&self, deadline: Instant, payload: TaskPayload) -> Result<u64> {
        let seq = self.job_seq.fetch_add(1, atomic::Ordering::Relaxed);
        self.commands
            .send(SchedulerCommand::Schedule(ScheduledTask {
                deadline,
                seq,
                payload,
            }))
            .await
            .map_err(|_| BackchannelError::SchedulerClosed)?;
        Ok(seq)
    }

    pub(crate) async fn drain(&self) -> Result<()> {
        self.commands
            .send(SchedulerCommand::Drain)
            .await
            .map_err(|_| BackchannelError::SchedulerClosed)
    }
}

/// Starts the scheduler loop in a background task.
///
/// The loop holds only a weak engine reference: dropping the engine (or an
/// explicit shutdown) ends it. Fires go through the same write-lock
/// discipline as synchronous sends, so a deferred delivery can never race a
/// concurrent send for id allocation.
pub(crate) fn spawn_scheduler_loop(
    engine: Weak<Backchannel>,
    mut commands: Receiver<SchedulerCommand>,
    mut shutdown: Receiver<()>,
) {
    tokio::spawn(async move {
        let mut queue: BinaryHeap<ScheduledTask> = BinaryHeap::new();
        tracing::debug!(target: "backchannel::scheduler", "scheduler loop started");

        loop {
            let next_deadline = queue.peek().map(|task| task.deadline);
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SchedulerCommand::Schedule(task)) => queue.push(task),
                    Some(SchedulerCommand::Drain) => {
                        tracing::debug!(
                            target: "backchannel::scheduler",
                            "draining {} pending task(s)",
                            queue.len()
                        );
                        queue.clear();
                    }
                    None => break,
                },
                Some(_) = shutdown.recv() => {
                    tracing::info!(
                        target: "backchannel::scheduler",
                        "shutdown signal received, {} pending task(s) dropped",
                        queue.len()
                    );
                    break;
                }
                _ = tokio::time::sleep_until(next_deadline.unwrap_or_else(Instant::now)),
                    if next_deadline.is_some() =>
                {
                    let Some(task) = queue.pop() else { continue };
                    let Some(engine) = engine.upgrade() else { break };
                    engine.run_scheduled(task.payload).await;
                }
            }
        }

        tracing::debug!(target: "backchannel::scheduler", "scheduler loop exited");
    });
}

impl Backchannel {
    /// Schedules a message for future delivery into a channel or DM.
    ///
    /// Body length and `fire_at` are validated now; the message itself is
    /// only created when the job fires, through the full send pipeline, so
    /// its id reflects actual fire order rather than call order. Returns
    /// immediately — delivery is asynchronous and best-effort with respect
    /// to exact timing.
    pub async fn send_later(
        &self,
        sender_id: UserId,
        container: ContainerRef,
        body: impl Into<String>,
        fire_at: i64,
    ) -> Result<DeferredReceipt> {
        let body = body.into();
        validate_body(&body, self.config.max_body_chars)?;

        let now = Utc::now().timestamp();
        if fire_at < now {
            return Err(BackchannelError::validation(
                "cannot schedule a message in the past",
            ));
        }

        let deadline = Instant::now() + Duration::from_secs((fire_at - now) as u64);
        let job_id = self
            .scheduler
            .submit(
                deadline,
                TaskPayload::DeferredSend {
                    container,
                    sender_id,
                    body,
                },
            )
            .await?;

        tracing::debug!(
            target: "backchannel::scheduler",
            "job {} scheduled by user {} for {} ({}s out)",
            job_id,
            sender_id,
            container,
            fire_at - now
        );
        Ok(DeferredReceipt { job_id, fire_at })
    }

    /// Runs one fired task. Failures are logged and dropped: fires are
    /// fire-and-forget and there is nobody left to report to.
    pub(crate) async fn run_scheduled(&self, payload: TaskPayload) {
        match payload {
            TaskPayload::DeferredSend {
                container,
                sender_id,
                body,
            } => {
                if !self.directory.container_exists(container).await {
                    tracing::warn!(
                        target: "backchannel::scheduler",
                        "dropping deferred send into vanished {}",
                        container
                    );
                    return;
                }
                if let Err(e) = self.create_message_in(container, sender_id, body).await {
                    tracing::warn!(
                        target: "backchannel::scheduler",
                        "deferred send into {} failed: {}",
                        container,
                        e
                    );
                }
            }
            TaskPayload::StandupFlush { container } => {
                self.flush_standup(container).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_orders_by_deadline_then_submission() {
        let base = Instant::now();
        let task = |secs: u64, seq: u64| ScheduledTask {
            deadline: base + Duration::from_secs(secs),
            seq,
            payload: TaskPayload::StandupFlush {
                container: ContainerRef::Channel(1),
            },
        };

        let mut queue = BinaryHeap::new();
        queue.push(task(5, 1));
        queue.push(task(1, 2));
        queue.push(task(1, 3));
        queue.push(task(3, 4));

        let order: Vec<u64> = std::iter::from_fn(|| queue.pop().map(|t| t.seq)).collect();
        assert_eq!(order, vec![2, 3, 4, 1]);
    }
}
