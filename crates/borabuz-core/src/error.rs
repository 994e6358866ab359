//! BoraBuz error types.

use thiserror::Error;

/// Every fallible operation in the alert subsystem returns this error.
#[derive(Debug, Error)]
pub enum BoraBuzError {
    /// The user declined (now or earlier) to allow notifications.
    #[error("notification permission not granted")]
    PermissionDenied,

    /// A recurring time is not two colon-separated integers forming a valid `HH:MM`.
    #[error("malformed schedule time '{0}' (expected HH:MM)")]
    MalformedSchedule(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The platform refused to show a notification.
    #[error("render failure: {0}")]
    RenderFailure(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("background runtime is not running")]
    ChannelClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failure of `NotificationScheduler::schedule`.
pub type SchedulingFailure = BoraBuzError;

pub type Result<T> = std::result::Result<T, BoraBuzError>;
