//! Digital I/O line abstraction.
//!
//! The host platform supplies a [`LineProvider`]; the supervisor only ever sees
//! owned [`DigitalLine`] handles. Releasing a line is tied to dropping its
//! handle, so a failed activation that returns early releases whatever it had
//! acquired, in reverse acquisition order.

use thiserror::Error;

/// Identifier of a digital line (a GPIO number on Linux hosts).
pub type LineId = u32;

/// Logic level of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Level {
    /// Logic 0.
    #[default]
    Low,
    /// Logic 1.
    High,
}

impl Level {
    /// Whether the level is high.
    #[must_use]
    pub fn is_high(self) -> bool {
        self == Self::High
    }

    /// The opposite level.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> Self {
        level.is_high()
    }
}

/// Direction requested when acquiring a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sampled input.
    Input,
    /// Driven output, set to `initial` as part of acquisition.
    Output {
        /// Level driven as soon as the line becomes an output.
        initial: Level,
    },
}

/// Failures reported by a line provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    /// The identifier does not name a usable line on this host.
    #[error("line {0} is not a valid digital line")]
    Invalid(LineId),

    /// The line is owned by another consumer.
    #[error("line {0} is already in use")]
    Busy(LineId),

    /// The line was driven while configured as an input.
    #[error("line {0} is not configured as an output")]
    NotOutput(LineId),

    /// Backend I/O failure.
    #[error("I/O error on line {line}: {reason}")]
    Io {
        /// Line identifier.
        line: LineId,
        /// Backend description of the failure.
        reason: String,
    },
}

impl LineError {
    /// Create an I/O error.
    #[must_use]
    pub fn io(line: LineId, reason: impl Into<String>) -> Self {
        Self::Io {
            line,
            reason: reason.into(),
        }
    }

    /// Positive errno value for this failure.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::Invalid(_) => libc::EINVAL,
            Self::Busy(_) => libc::EBUSY,
            Self::NotOutput(_) => libc::EPERM,
            Self::Io { .. } => libc::EIO,
        }
    }
}

/// An acquired digital line.
///
/// Dropping the handle releases the line back to the provider. Level access
/// may block (lines behind slow buses are allowed).
pub trait DigitalLine: Send {
    /// Identifier this handle was acquired with.
    fn id(&self) -> LineId;

    /// Read the current level.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot sample the line.
    fn get_level(&mut self) -> Result<Level, LineError>;

    /// Drive the line to `level`.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not an output or the backend write fails.
    fn set_level(&mut self, level: Level) -> Result<(), LineError>;
}

/// Source of digital lines, keyed by identifier.
pub trait LineProvider {
    /// Handle type produced by this provider.
    type Line: DigitalLine;

    /// Whether `id` names a usable line on this host.
    fn is_valid(&self, id: LineId) -> bool;

    /// Acquire exclusive ownership of `id` with the given direction.
    ///
    /// # Errors
    ///
    /// Returns [`LineError::Busy`] if the line is owned elsewhere, or another
    /// [`LineError`] if the backend cannot configure it.
    fn acquire(
        &self,
        id: LineId,
        label: &'static str,
        direction: Direction,
    ) -> Result<Self::Line, LineError>;
}
