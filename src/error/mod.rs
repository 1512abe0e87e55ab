//! Error types for rewind
//!
//! This module defines the main error type used throughout the crate and the
//! flat return codes shared with the C command surface.

use thiserror::Error;

/// Result type alias for rewind operations
pub type Result<T> = std::result::Result<T, RewindError>;

/// Main error type for rewind
#[derive(Error, Debug)]
pub enum RewindError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Log file is not open")]
    StoreInvalid,

    #[error("Log file version '{0}' is unsupported by this tool")]
    UnsupportedVersion(String),

    #[error("Topic not found in log: {0}")]
    TopicNotFound(String),

    #[error("A playback session is already running against a single-threaded backend")]
    SessionActive,

    #[error("A recording is already in progress")]
    AlreadyRecording,

    #[error("Invalid verbosity level: {0}")]
    InvalidVerbosity(u8),

    #[error("Fabric error: {0}")]
    Fabric(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Return codes of the flat command surface (`verbosity`, `record_topics`,
/// `playback_topics`). These values are part of the C ABI and must not change.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCode {
    Success = 0,
    FailedToOpen = 1,
    BadRegex = 2,
    InvalidVersion = 3,
}

impl CommandCode {
    /// Map a library error onto the closest flat return code.
    pub fn from_error(err: &RewindError) -> Self {
        match err {
            RewindError::Pattern(_) => CommandCode::BadRegex,
            RewindError::UnsupportedVersion(_) => CommandCode::InvalidVersion,
            RewindError::InvalidVerbosity(_) => CommandCode::InvalidVersion,
            _ => CommandCode::FailedToOpen,
        }
    }
}

impl From<CommandCode> for i32 {
    fn from(code: CommandCode) -> Self {
        code as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_code_values() {
        assert_eq!(i32::from(CommandCode::Success), 0);
        assert_eq!(i32::from(CommandCode::FailedToOpen), 1);
        assert_eq!(i32::from(CommandCode::BadRegex), 2);
        assert_eq!(i32::from(CommandCode::InvalidVersion), 3);
    }

    #[test]
    fn test_error_mapping() {
        let err = RewindError::UnsupportedVersion("0.0.9".to_string());
        assert_eq!(CommandCode::from_error(&err), CommandCode::InvalidVersion);

        let bad = regex::Regex::new("(").unwrap_err();
        assert_eq!(
            CommandCode::from_error(&RewindError::Pattern(bad)),
            CommandCode::BadRegex
        );

        assert_eq!(
            CommandCode::from_error(&RewindError::StoreInvalid),
            CommandCode::FailedToOpen
        );
    }
}
