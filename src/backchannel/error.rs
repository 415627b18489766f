use thiserror::Error;

pub type Result<T> = core::result::Result<T, BackchannelError>;

/// Typed error kinds raised by the engine.
///
/// Mapping these to transport status codes (400/403/404/409) is the HTTP
/// layer's responsibility; the engine only ever reports the kind.
#[derive(Error, Debug)]
pub enum BackchannelError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Scheduler unavailable: engine is shutting down")]
    SchedulerClosed,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl BackchannelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
