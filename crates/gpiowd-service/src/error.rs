//! Error types for the gpiowd service.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Endpoint access rejected by the daemon, with the negative errno it reported.
    #[error("{message} (errno {errno})")]
    Endpoint { errno: i32, message: String },
}

impl ServiceError {
    /// Process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidConfiguration(_) => 2,
            Self::ServiceUnavailable(_) | Self::Protocol(_) | Self::Endpoint { .. } => 1,
        }
    }
}
