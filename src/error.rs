//! Error types for ARINC-429 lane management and the command frontend

use crate::core::{Platform, Role};
use thiserror::Error;

/// Result type for ARINC-429 bus operations
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors reported by lane allocation, program loading and transfers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// No free lane in any engine
    #[error("Resource exhausted: no free lane in any engine")]
    ResourceExhausted,

    /// The loader has no program for the requested role
    #[error("Unsupported role: {0}")]
    UnsupportedRole(Role),

    /// The engine's instruction memory cannot hold the program
    #[error("Program space exhausted in engine {engine}: {needed} instructions needed")]
    ProgramSpace {
        /// Engine index
        engine: u8,
        /// Program length in instructions
        needed: usize,
    },

    /// Hardware refused to claim the lane picked by the registry
    #[error("Lane {lane} of engine {engine} is not available in hardware")]
    LaneUnavailable {
        /// Engine index
        engine: u8,
        /// Lane index
        lane: u8,
    },

    /// Baud rate is zero or yields an unrepresentable clock divider
    #[error("Invalid baud rate: {0}")]
    InvalidBaudRate(String),

    /// A handle bound to one role was used for another
    #[error("Wrong role: expected {expected}, lane is bound to {actual}")]
    WrongRole {
        /// Role the operation needs
        expected: Role,
        /// Role the lane is bound to
        actual: Role,
    },

    /// The lane is not bound
    #[error("Lane {lane} of engine {engine} is not bound")]
    NotBound {
        /// Engine index
        engine: u8,
        /// Lane index
        lane: u8,
    },

    /// Engine index beyond the platform's engine count
    #[error("Invalid engine index: {0}")]
    InvalidEngine(u8),

    /// The hardware has a different engine count than the platform
    #[error("Platform {platform} has {expected} engines, hardware reports {actual}")]
    PlatformMismatch {
        /// Platform the bus was configured for
        platform: Platform,
        /// Engines the platform has
        expected: u8,
        /// Engines the hardware reports
        actual: u8,
    },

    /// Lane index beyond the lanes of one engine
    #[error("Invalid lane index {lane} in engine {engine}")]
    InvalidLane {
        /// Engine index
        engine: u8,
        /// Lane index
        lane: u8,
    },

    /// Word failed the odd parity check
    #[error("Parity error: {0}")]
    ParityError(String),

    /// A bounded wait ran out before the FIFO became ready
    #[error("Timed out waiting for FIFO")]
    Timeout,

    /// A bounded wait was cancelled by its token
    #[error("Wait cancelled")]
    Cancelled,
}

impl BusError {
    /// Create a new InvalidBaudRate error
    pub fn invalid_baud_rate(msg: impl Into<String>) -> Self {
        BusError::InvalidBaudRate(msg.into())
    }

    /// Create a new ParityError
    pub fn parity_error(msg: impl Into<String>) -> Self {
        BusError::ParityError(msg.into())
    }

    /// True for the two outcomes of a bounded wait that gave up
    pub fn is_wait_abort(&self) -> bool {
        matches!(self, BusError::Timeout | BusError::Cancelled)
    }
}

/// Argument errors raised while parsing a tokenized command line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// No token left on the line
    #[error("Missing argument")]
    MissingArgument,

    /// Token is not a complete number
    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    /// Token is neither ON nor OFF
    #[error("Invalid flag: {0}")]
    InvalidFlag(String),
}

impl CommandError {
    /// Create a new InvalidNumber error
    pub fn invalid_number(token: impl Into<String>) -> Self {
        CommandError::InvalidNumber(token.into())
    }

    /// Create a new InvalidFlag error
    pub fn invalid_flag(token: impl Into<String>) -> Self {
        CommandError::InvalidFlag(token.into())
    }

    /// Short console code printed for this error
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::InvalidFlag(_) => "ERR0",
            CommandError::MissingArgument => "ERR1",
            CommandError::InvalidNumber(_) => "ERR2",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BusError::invalid_baud_rate("zero");
        assert!(err.to_string().contains("Invalid baud rate"));

        let err = BusError::UnsupportedRole(Role::Other);
        assert_eq!(err.to_string(), "Unsupported role: Other");
    }

    #[test]
    fn test_wait_abort() {
        assert!(BusError::Timeout.is_wait_abort());
        assert!(BusError::Cancelled.is_wait_abort());
        assert!(!BusError::ResourceExhausted.is_wait_abort());
    }

    #[test]
    fn test_command_error_codes() {
        assert_eq!(CommandError::MissingArgument.code(), "ERR1");
        assert_eq!(CommandError::invalid_number("abc").code(), "ERR2");
        assert_eq!(CommandError::invalid_flag("MAYBE").code(), "ERR0");
    }
}
