pub use crate::backchannel::directory::{Directory, Role};
pub use crate::backchannel::error::{BackchannelError, Result};
pub use crate::backchannel::message_store::{Message, Reaction};
pub use crate::backchannel::notifications::{Notification, NotificationKind};
pub use crate::backchannel::reactions::SUPPORTED_REACT_KINDS;
pub use crate::backchannel::stats::{StatsPoint, UserStats, WorkspaceStats};
pub use crate::backchannel::types::{
    ContainerRef, DeferredReceipt, MessageId, MessagePage, MessageView, ReactView, StandupStatus,
    UserId,
};
pub use crate::backchannel::{Backchannel, EngineConfig};

use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

use std::sync::Mutex;

pub mod backchannel;

static TRACING_GUARDS: OnceCell<Mutex<Option<(WorkerGuard, WorkerGuard)>>> = OnceCell::new();
static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Initializes tracing for the embedding application.
///
/// Logs go to a daily-rolling file in `logs_dir` and to stdout, filtered by
/// `RUST_LOG` (defaulting to `info`). Safe to call more than once; only the
/// first call has any effect.
pub fn init_tracing(logs_dir: &std::path::Path) {
    TRACING_INIT.get_or_init(|| {
        let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("backchannel")
            .filename_suffix("log")
            .build(logs_dir)
            .expect("Failed to create file appender");

        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

        TRACING_GUARDS
            .set(Mutex::new(Some((file_guard, stdout_guard))))
            .ok();

        let stdout_layer = Layer::new()
            .with_writer(non_blocking_stdout)
            .with_ansi(true)
            .with_target(true);

        let file_layer = Layer::new()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_target(true);

        Registry::default()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(stdout_layer)
            .with(file_layer)
            .init();
    });
}
