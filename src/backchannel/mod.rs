use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, RwLock};

pub mod container_index;
pub mod directory;
pub mod error;
pub mod message_store;
pub mod messages;
pub mod notifications;
pub mod pins;
pub mod reactions;
pub mod scheduler;
pub mod search;
pub mod stats;
pub mod tagging;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

use container_index::ContainerIndex;
use directory::Directory;
use error::Result;
use message_store::{MessageSequence, MessageStore};
use notifications::NotificationLog;
use scheduler::standup::StandupSession;
use scheduler::SchedulerHandle;
use stats::StatsLedger;
use types::ContainerRef;

/// Engine tunables. The defaults are the workspace's wire contract
/// (50-message pages, 20-notification reads, 1000-character bodies) —
/// override them only in tests.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Maximum message body length, in characters.
    pub max_body_chars: usize,
    /// Messages per pagination window.
    pub page_size: usize,
    /// Notifications returned per read; storage is unbounded.
    pub notification_read_cap: usize,
    /// Depth of the scheduler's command channel.
    pub scheduler_queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_body_chars: 1000,
            page_size: 50,
            notification_read_cap: 20,
            scheduler_queue_depth: 256,
        }
    }
}

impl EngineConfig {
    /// Builds a config from `BACKCHANNEL_*` environment variables (via
    /// `.env` when present), falling back to the defaults per key.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            max_body_chars: env_or("BACKCHANNEL_MAX_BODY_CHARS", defaults.max_body_chars),
            page_size: env_or("BACKCHANNEL_PAGE_SIZE", defaults.page_size),
            notification_read_cap: env_or(
                "BACKCHANNEL_NOTIFICATION_READ_CAP",
                defaults.notification_read_cap,
            ),
            scheduler_queue_depth: env_or(
                "BACKCHANNEL_SCHEDULER_QUEUE_DEPTH",
                defaults.scheduler_queue_depth,
            ),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// Everything the engine mutates, behind one lock.
///
/// A single writer guard serializes id allocation, thread appends, counter
/// bumps and notification emission, which is what makes each operation
/// atomic and ids strictly increasing in creation order.
pub(crate) struct CoreState {
    pub(crate) store: MessageStore,
    pub(crate) threads: ContainerIndex,
    pub(crate) notifications: NotificationLog,
    pub(crate) stats: StatsLedger,
}

impl CoreState {
    fn new() -> Self {
        Self {
            store: MessageStore::new(MessageSequence::new()),
            threads: ContainerIndex::default(),
            notifications: NotificationLog::default(),
            stats: StatsLedger::new(),
        }
    }
}

/// The message and notification engine of the workspace.
///
/// Owns the unified message store, per-container threads, reaction and pin
/// state, the notification log, usage counters and the deferred-delivery
/// scheduler. Membership, roles, handles and container names live with the
/// external membership collaborator and are consulted live through the
/// injected [`Directory`].
pub struct Backchannel {
    pub config: EngineConfig,
    pub(crate) directory: Arc<dyn Directory>,
    pub(crate) state: RwLock<CoreState>,
    pub(crate) standups: DashMap<ContainerRef, StandupSession>,
    pub(crate) scheduler: SchedulerHandle,
    shutdown_sender: mpsc::Sender<()>,
}

impl std::fmt::Debug for Backchannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backchannel")
            .field("config", &self.config)
            .field("directory", &"<dyn Directory>")
            .field("state", &"<CoreState>")
            .finish()
    }
}

impl Backchannel {
    /// Creates the engine and starts its scheduler loop.
    ///
    /// Must be called from within a tokio runtime. The loop holds only a
    /// weak reference, so dropping the last `Arc` (or calling
    /// [`shutdown`](Self::shutdown)) ends it.
    pub fn new(directory: Arc<dyn Directory>, config: EngineConfig) -> Arc<Self> {
        let (command_sender, command_receiver) = mpsc::channel(config.scheduler_queue_depth);
        let (shutdown_sender, shutdown_receiver) = mpsc::channel(1);

        let engine = Arc::new(Self {
            config,
            directory,
            state: RwLock::new(CoreState::new()),
            standups: DashMap::new(),
            scheduler: SchedulerHandle::new(command_sender),
            shutdown_sender,
        });

        scheduler::spawn_scheduler_loop(
            Arc::downgrade(&engine),
            command_receiver,
            shutdown_receiver,
        );

        tracing::debug!(target: "backchannel::engine", "engine initialized");
        engine
    }

    /// Atomically resets the engine to its freshly-constructed state:
    /// messages, threads, notifications, counters, standup sessions and
    /// every pending deferred job. The external clear collaborator calls
    /// this; nothing inside the engine does.
    pub async fn clear(&self) -> Result<()> {
        self.scheduler.drain().await?;
        self.standups.clear();

        let mut state = self.state.write().await;
        *state = CoreState::new();
        tracing::info!(target: "backchannel::engine", "engine state cleared");
        Ok(())
    }

    /// Stops the scheduler loop. Pending deferred jobs are dropped;
    /// synchronous operations keep working.
    pub async fn shutdown(&self) {
        // Expected to fail if the loop already exited.
        let _ = self.shutdown_sender.send(()).await;
    }
}
