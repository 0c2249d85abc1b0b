//! Error types for watchdog supervisor operations.
//!
//! Startup errors (`Configuration`, `InvalidLine`, `ResourceUnavailable`,
//! `Registration`) abort activation. Runtime errors are only ever returned from endpoint writes or
//! wrong-direction endpoint access; reads observe state and never fail.

use thiserror::Error;

use crate::line::{LineError, LineId};

/// Errors that can occur while activating or driving the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    /// Missing or invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A configured line identifier is not a usable digital line on this host.
    #[error("Invalid configuration: {label} line {line} is not a valid digital line")]
    InvalidLine {
        /// Consumer label the line was configured for.
        label: &'static str,
        /// Line identifier.
        line: LineId,
    },

    /// A digital line could not be acquired.
    #[error("Line {line} ({label}) unavailable: {source}")]
    ResourceUnavailable {
        /// Line identifier.
        line: LineId,
        /// Consumer label requested for the line.
        label: &'static str,
        /// Underlying provider failure.
        source: LineError,
    },

    /// Endpoint payload is not a decimal integer.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Endpoint payload is a decimal integer that does not fit the target type.
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// The endpoint group could not be registered with the host.
    #[error("Endpoint registration failed: {0}")]
    Registration(String),

    /// Endpoint accessed against its direction (read of a write-only endpoint or vice versa).
    #[error("Permission denied: {endpoint} is {access}")]
    PermissionDenied {
        /// Endpoint name.
        endpoint: &'static str,
        /// Access mode of the endpoint.
        access: &'static str,
    },

    /// No endpoint with this name exists in the group.
    #[error("No such endpoint: {0}")]
    NotFound(String),

    /// A runtime pulse on the trigger line failed.
    #[error("Line fault on {label}: {source}")]
    LineFault {
        /// Consumer label of the failing line.
        label: &'static str,
        /// Underlying provider failure.
        source: LineError,
    },
}

impl SupervisorError {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a resource-unavailable error.
    #[must_use]
    pub fn resource_unavailable(line: LineId, label: &'static str, source: LineError) -> Self {
        Self::ResourceUnavailable {
            line,
            label,
            source,
        }
    }

    /// Create a malformed-input error.
    #[must_use]
    pub fn malformed_input(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    /// Create a registration error.
    #[must_use]
    pub fn registration(msg: impl Into<String>) -> Self {
        Self::Registration(msg.into())
    }

    /// Whether this error is a rejected endpoint payload.
    #[must_use]
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, Self::MalformedInput(_) | Self::OutOfRange(_))
    }

    /// Whether this error comes from the configuration rather than the host.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::InvalidLine { .. })
    }

    /// Positive errno value a kernel attribute interface would report for this error.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::MalformedInput(_) => libc::EINVAL,
            Self::InvalidLine { .. } | Self::PermissionDenied { .. } => libc::EACCES,
            Self::ResourceUnavailable { source, .. } => source.errno(),
            Self::OutOfRange(_) => libc::ERANGE,
            Self::Registration(_) => libc::ENOMEM,
            Self::NotFound(_) => libc::ENOENT,
            Self::LineFault { .. } => libc::EIO,
        }
    }
}

/// A specialized `Result` type for supervisor operations.
pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SupervisorError::configuration("trigger_line is missing");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: trigger_line is missing"
        );

        let err = SupervisorError::resource_unavailable(7, "wd-trig", LineError::Busy(7));
        assert!(err.to_string().contains("wd-trig"));
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(SupervisorError::malformed_input("x").errno(), libc::EINVAL);
        assert_eq!(SupervisorError::OutOfRange("9".repeat(20)).errno(), libc::ERANGE);
        assert_eq!(SupervisorError::registration("oom").errno(), libc::ENOMEM);
        assert_eq!(
            SupervisorError::resource_unavailable(3, "wd-clock", LineError::Busy(3)).errno(),
            libc::EBUSY
        );
        assert_eq!(
            SupervisorError::PermissionDenied {
                endpoint: "trig",
                access: "write-only"
            }
            .errno(),
            libc::EACCES
        );
        assert_eq!(
            SupervisorError::InvalidLine {
                label: "wd-trig",
                line: 600
            }
            .errno(),
            libc::EACCES
        );
    }

    #[test]
    fn test_classification() {
        assert!(SupervisorError::malformed_input("abc").is_malformed_input());
        assert!(SupervisorError::OutOfRange("1".into()).is_malformed_input());
        assert!(!SupervisorError::registration("x").is_malformed_input());

        assert!(SupervisorError::configuration("x").is_configuration());
        assert!(
            SupervisorError::InvalidLine {
                label: "wd-clock",
                line: 900
            }
            .is_configuration()
        );
        assert!(!SupervisorError::registration("x").is_configuration());
        assert!(
            !SupervisorError::resource_unavailable(3, "wd-clock", LineError::Busy(3))
                .is_configuration()
        );
    }
}
