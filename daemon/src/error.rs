/// Error taxonomy for lifecycle commands.
///
/// Every variant maps to a stable reply code so the host application can branch
/// on failures without parsing messages.
use crate::indicator::BuildFailure;

/// A required field is absent or malformed in an incoming configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{field} is malformed: {reason}")]
    Malformed { field: &'static str, reason: String },
}

/// Failure to bring the presence up (or to refresh its indicator).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("invalid presence config: {0}")]
    InvalidConfig(String),

    /// Carries the actionable message from the permission gate.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("indicator could not be built: {0}")]
    BuildFailed(#[from] BuildFailure),

    #[error("platform rejected the indicator: {0}")]
    PlatformError(String),
}

impl From<ConfigError> for StartError {
    fn from(e: ConfigError) -> Self {
        StartError::InvalidConfig(e.to_string())
    }
}

/// Updating the indicator fails exactly the way starting does.
pub type UpdateError = StartError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunTaskError {
    #[error("no presence is running and none can be restarted")]
    NotRunning,

    #[error("presence could not be restarted for the task: {0}")]
    RestartFailed(#[source] StartError),

    #[error("invalid task config: {0}")]
    InvalidConfig(String),
}

impl From<ConfigError> for RunTaskError {
    fn from(e: ConfigError) -> Self {
        RunTaskError::InvalidConfig(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CancelError {
    #[error("indicator {0} backs the running presence; stop the presence instead")]
    ActivePresence(i32),

    #[error("platform rejected the cancel: {0}")]
    PlatformError(String),
}

/// Stable machine-readable code attached to error replies.
pub trait ErrorCode {
    fn code(&self) -> &'static str;
}

impl ErrorCode for StartError {
    fn code(&self) -> &'static str {
        match self {
            StartError::InvalidConfig(_) => "invalid_config",
            StartError::PermissionDenied(_) => "permission_denied",
            StartError::BuildFailed(_) => "build_failed",
            StartError::PlatformError(_) => "platform_error",
        }
    }
}

impl ErrorCode for RunTaskError {
    fn code(&self) -> &'static str {
        match self {
            RunTaskError::NotRunning => "not_running",
            RunTaskError::RestartFailed(_) => "restart_failed",
            RunTaskError::InvalidConfig(_) => "invalid_config",
        }
    }
}

impl ErrorCode for CancelError {
    fn code(&self) -> &'static str {
        match self {
            CancelError::ActivePresence(_) => "active_presence",
            CancelError::PlatformError(_) => "platform_error",
        }
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        "invalid_config"
    }
}
