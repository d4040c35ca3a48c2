//! Unified error handling for the walk-tracker library.
//!
//! Every session operation returns a typed outcome instead of logging and
//! swallowing failures. The state machine is always left in a well-defined
//! state when one of these is returned.

use thiserror::Error;

use crate::session::SessionState;

/// Unified error type for walk-tracking operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalkError {
    /// Foreground location permission was not granted
    #[error("location permission denied")]
    PermissionDenied,

    /// One-shot fix or subscription setup failed
    #[error("location unavailable: {message}")]
    LocationUnavailable { message: String },

    /// `start` was called while another walk is in progress
    #[error("a walk is already active for pet '{pet_id}'")]
    SessionAlreadyActive { pet_id: String },

    /// The finalized walk could not be saved
    #[error("failed to persist walk: {message}")]
    PersistenceFailed { message: String },

    /// The operation needs a session but none exists
    #[error("cannot {action}: no active walk")]
    NoActiveSession { action: &'static str },

    /// The operation is not valid from the current state
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: SessionState,
    },

    /// Configuration error
    #[error("configuration error: {message}")]
    ConfigError { message: String },
}

/// Flat error discriminant, used where payloads cannot cross a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum WalkErrorKind {
    PermissionDenied,
    LocationUnavailable,
    SessionAlreadyActive,
    PersistenceFailed,
    NoActiveSession,
    InvalidTransition,
    ConfigError,
}

impl WalkError {
    pub fn kind(&self) -> WalkErrorKind {
        match self {
            WalkError::PermissionDenied => WalkErrorKind::PermissionDenied,
            WalkError::LocationUnavailable { .. } => WalkErrorKind::LocationUnavailable,
            WalkError::SessionAlreadyActive { .. } => WalkErrorKind::SessionAlreadyActive,
            WalkError::PersistenceFailed { .. } => WalkErrorKind::PersistenceFailed,
            WalkError::NoActiveSession { .. } => WalkErrorKind::NoActiveSession,
            WalkError::InvalidTransition { .. } => WalkErrorKind::InvalidTransition,
            WalkError::ConfigError { .. } => WalkErrorKind::ConfigError,
        }
    }

    pub(crate) fn location(message: impl Into<String>) -> Self {
        WalkError::LocationUnavailable {
            message: message.into(),
        }
    }

    pub(crate) fn persistence(message: impl Into<String>) -> Self {
        WalkError::PersistenceFailed {
            message: message.into(),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for WalkError {
    fn from(err: rusqlite::Error) -> Self {
        WalkError::persistence(err.to_string())
    }
}

/// Result type alias for walk-tracker operations.
pub type Result<T> = std::result::Result<T, WalkError>;

/// Extension trait for converting Option to WalkError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a no-active-session error.
    fn ok_or_no_session(self, action: &'static str) -> Result<T>;

    /// Convert Option to Result with a location-unavailable error.
    fn ok_or_location(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_no_session(self, action: &'static str) -> Result<T> {
        self.ok_or(WalkError::NoActiveSession { action })
    }

    fn ok_or_location(self, message: &str) -> Result<T> {
        self.ok_or_else(|| WalkError::location(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WalkError::SessionAlreadyActive {
            pet_id: "rex".to_string(),
        };
        assert_eq!(err.to_string(), "a walk is already active for pet 'rex'");

        let err = WalkError::InvalidTransition {
            action: "resume",
            state: SessionState::Tracking,
        };
        assert_eq!(err.to_string(), "cannot resume while tracking");

        let err = WalkError::NoActiveSession { action: "pause" };
        assert_eq!(err.to_string(), "cannot pause: no active walk");
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            WalkError::PermissionDenied.kind(),
            WalkErrorKind::PermissionDenied
        );
        assert_eq!(
            WalkError::persistence("disk full").kind(),
            WalkErrorKind::PersistenceFailed
        );
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_no_session("stop");
        assert!(matches!(
            result,
            Err(WalkError::NoActiveSession { action: "stop" })
        ));

        let result = None::<i32>.ok_or_location("no fix");
        assert!(matches!(result, Err(WalkError::LocationUnavailable { .. })));
        assert_eq!(Some(3).ok_or_location("no fix"), Ok(3));
    }
}
