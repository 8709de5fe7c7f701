use crate::config::ConfigError;
use crate::ids::InstanceId;

/// Command failures for the session-management surface. Each variant maps to
/// a stable code carried in the response envelope, so clients can branch on
/// the code while showing the message.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StormError {
    #[error("a storm is already running. Stop the current storm before starting a new one")]
    AlreadyActive,
    #[error("no storm is running")]
    NoActiveSession,
    #[error("cannot {action} while the storm is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    #[error("instance {0} not found")]
    NotFound(InstanceId),
    #[error("instance {0} is not running")]
    AlreadyTerminal(InstanceId),
    #[error("insufficient capacity: {0}")]
    InsufficientCapacity(String),
    #[error("engine is busy: {0}")]
    Busy(String),
    #[error("{0}")]
    Internal(String),
}

impl StormError {
    /// Stable machine-readable code for the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyActive => "ALREADY_ACTIVE",
            Self::NoActiveSession => "NO_ACTIVE_SESSION",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyTerminal(_) => "ALREADY_TERMINAL",
            Self::InsufficientCapacity(_) => "INSUFFICIENT_CAPACITY",
            Self::Busy(_) => "ENGINE_BUSY",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP status the REST layer answers with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AlreadyActive
            | Self::InvalidTransition { .. }
            | Self::AlreadyTerminal(_)
            | Self::InsufficientCapacity(_)
            | Self::Busy(_) => 409,
            Self::InvalidConfig(_) => 400,
            Self::NoActiveSession | Self::NotFound(_) => 404,
            Self::Internal(_) => 500,
        }
    }

    /// Conflicts are resolvable by the user (confirmation dialog), not by
    /// fixing the request.
    pub fn is_state_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyActive | Self::InvalidTransition { .. } | Self::Busy(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(StormError::AlreadyActive.code(), "ALREADY_ACTIVE");
        assert_eq!(StormError::NotFound(InstanceId(3)).code(), "NOT_FOUND");
        assert_eq!(
            StormError::AlreadyTerminal(InstanceId(3)).code(),
            "ALREADY_TERMINAL"
        );
    }

    #[test]
    fn http_statuses() {
        assert_eq!(StormError::AlreadyActive.http_status(), 409);
        assert_eq!(StormError::NoActiveSession.http_status(), 404);
        assert_eq!(StormError::NotFound(InstanceId(1)).http_status(), 404);
        assert_eq!(
            StormError::InvalidConfig(ConfigError::NoMessages).http_status(),
            400
        );
        assert_eq!(StormError::Internal("boom".into()).http_status(), 500);
    }

    #[test]
    fn config_errors_convert() {
        let err: StormError = ConfigError::NoChannels.into();
        assert_eq!(err.code(), "INVALID_CONFIG");
        assert_eq!(err.to_string(), "channels cannot be empty");
    }

    #[test]
    fn conflict_classification() {
        assert!(StormError::AlreadyActive.is_state_conflict());
        assert!(StormError::Busy("profiles".into()).is_state_conflict());
        assert!(!StormError::NotFound(InstanceId(1)).is_state_conflict());
        assert!(!StormError::InvalidConfig(ConfigError::NoMessages).is_state_conflict());
    }
}
