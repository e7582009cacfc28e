use std::io;
use thiserror::Error;

use super::types::DeviceAddress;

/// Custom error types for Smart-Bus G4 communication
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid field {field}: {value} does not fit in a single byte")]
    InvalidField { field: &'static str, value: i64 },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transport is closed")]
    Closed,

    #[error("No datagram received within the receive window")]
    Timeout,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Reasons an incoming datagram is rejected by the codec
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("expected response opcode {expected:#06x}, got {actual:#06x}")]
    Opcode { expected: u16, actual: u16 },

    #[error("expected response from {expected}, got {actual}")]
    Address {
        expected: DeviceAddress,
        actual: DeviceAddress,
    },
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new invalid field error
    pub fn invalid_field(field: &'static str, value: impl Into<i64>) -> Self {
        Error::InvalidField {
            field,
            value: value.into(),
        }
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Whether a background poll may absorb this error and carry on
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Validation(_) | Error::Timeout => true,
            Error::Io(e) => !matches!(
                e.kind(),
                io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe
            ),
            Error::InvalidField { .. } | Error::Closed | Error::Config(_) => false,
        }
    }
}

/// Narrows a caller-supplied integer to a single protocol byte
pub fn byte_field<T>(field: &'static str, value: T) -> Result<u8>
where
    T: TryInto<u8> + Into<i64> + Copy,
{
    value
        .try_into()
        .map_err(|_| Error::invalid_field(field, value))
}
