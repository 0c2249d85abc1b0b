//! Named read/write endpoints exposed to the host.
//!
//! The supervisor publishes one group, [`GROUP_NAME`], holding four
//! attribute-style endpoints:
//!
//! | Endpoint | Access | Read format |
//! |---|---|---|
//! | `inhib` | read-only | `0\n` or `1\n` |
//! | `clock` | read-only | `0\n` or `1\n` |
//! | `remaining_time` | read-only | signed decimal + `\n` |
//! | `trig` | write-only | n/a |
//!
//! How the group is reached (a filesystem node, a socket) is up to the
//! [`EndpointHost`]. Hosts must keep the ordering contract: register only once
//! the supervisor is fully activated, and drop the registration before the
//! supervisor is dropped.

use std::num::IntErrorKind;
use std::sync::Arc;

use crate::error::{SupervisorError, SupervisorResult};
use crate::line::DigitalLine;
use crate::supervisor::{StatusSnapshot, WatchdogSupervisor};

/// Name of the endpoint group.
pub const GROUP_NAME: &str = "watchdog";

/// Access mode of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Reads only.
    ReadOnly,
    /// Writes only.
    WriteOnly,
}

impl Access {
    /// Get the access mode as a string slice.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::WriteOnly => "write-only",
        }
    }
}

/// Endpoints in the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Raw inhibit-line reading.
    Inhib,
    /// Clock presence.
    Clock,
    /// Seconds until overdue, or `-1` when halted.
    RemainingTime,
    /// Manual re-arm.
    Trig,
}

impl Endpoint {
    /// Every endpoint, in registration order.
    pub const ALL: [Self; 4] = [Self::Inhib, Self::Clock, Self::RemainingTime, Self::Trig];

    /// Endpoint name within the group.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Inhib => "inhib",
            Self::Clock => "clock",
            Self::RemainingTime => "remaining_time",
            Self::Trig => "trig",
        }
    }

    /// Access mode.
    #[must_use]
    pub fn access(self) -> Access {
        match self {
            Self::Inhib | Self::Clock | Self::RemainingTime => Access::ReadOnly,
            Self::Trig => Access::WriteOnly,
        }
    }

    /// Look an endpoint up by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|endpoint| endpoint.name() == name)
    }

    /// Look an endpoint up by name, failing with [`SupervisorError::NotFound`].
    ///
    /// # Errors
    ///
    /// Returns an error if no endpoint has this name.
    pub fn lookup(name: &str) -> SupervisorResult<Self> {
        Self::from_name(name).ok_or_else(|| SupervisorError::NotFound(name.to_owned()))
    }

    fn denied(self) -> SupervisorError {
        SupervisorError::PermissionDenied {
            endpoint: self.name(),
            access: self.access().as_str(),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse an endpoint payload as a base-10 `i32`.
///
/// Accepts an optional sign, decimal digits and at most one trailing newline,
/// the way the kernel's `kstrtoint(buf, 10, ..)` does.
///
/// # Errors
///
/// - [`SupervisorError::MalformedInput`] if the payload is empty, not UTF-8, or
///   contains anything besides the sign, digits and one trailing newline.
/// - [`SupervisorError::OutOfRange`] if the number does not fit in an `i32`.
pub fn parse_int(payload: &[u8]) -> SupervisorResult<i32> {
    let body = payload.strip_suffix(b"\n").unwrap_or(payload);
    let text = std::str::from_utf8(body)
        .map_err(|e| SupervisorError::malformed_input(format!("payload is not UTF-8: {e}")))?;

    text.parse::<i32>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
            SupervisorError::OutOfRange(text.to_owned())
        }
        _ => SupervisorError::malformed_input(format!("{text:?} is not a decimal integer")),
    })
}

/// Whether a parsed `trig` value requests a re-arm.
///
/// Both `1` and `49` (the code of ASCII `'1'`) are accepted. The second form is
/// kept for writers that historically relied on it and is not extended to any
/// other value or endpoint.
#[must_use]
pub fn is_rearm_value(value: i32) -> bool {
    value == 1 || value == i32::from(b'1')
}

/// Format a boolean reading as an endpoint value.
#[must_use]
pub fn format_flag(value: bool) -> String {
    format!("{}\n", u8::from(value))
}

/// Format a signed value as an endpoint value.
#[must_use]
pub fn format_signed(value: i64) -> String {
    format!("{value}\n")
}

/// Handlers behind the endpoint group.
pub trait EndpointHandler: Send + Sync {
    /// Produce the text of a read-only endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::PermissionDenied`] for write-only endpoints.
    fn show(&self, endpoint: Endpoint) -> SupervisorResult<String>;

    /// Consume a write to a write-only endpoint. Returns the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::PermissionDenied`] for read-only endpoints,
    /// or the endpoint's own rejection.
    fn store(&self, endpoint: Endpoint, payload: &[u8]) -> SupervisorResult<usize>;

    /// Side-effect-free status snapshot.
    fn status(&self) -> StatusSnapshot;

    /// Read an endpoint by name.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotFound`] for unknown names, otherwise as [`Self::show`].
    fn show_by_name(&self, name: &str) -> SupervisorResult<String> {
        self.show(Endpoint::lookup(name)?)
    }

    /// Write an endpoint by name.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotFound`] for unknown names, otherwise as [`Self::store`].
    fn store_by_name(&self, name: &str, payload: &[u8]) -> SupervisorResult<usize> {
        self.store(Endpoint::lookup(name)?, payload)
    }
}

impl<L: DigitalLine> EndpointHandler for WatchdogSupervisor<L> {
    fn show(&self, endpoint: Endpoint) -> SupervisorResult<String> {
        match endpoint {
            Endpoint::Inhib => Ok(format_flag(self.check_inhibit())),
            Endpoint::Clock => Ok(format_flag(self.check_clock())),
            Endpoint::RemainingTime => Ok(format_signed(self.displayed_remaining_secs())),
            Endpoint::Trig => Err(endpoint.denied()),
        }
    }

    fn store(&self, endpoint: Endpoint, payload: &[u8]) -> SupervisorResult<usize> {
        match endpoint {
            Endpoint::Trig => self.store_trig(payload),
            Endpoint::Inhib | Endpoint::Clock | Endpoint::RemainingTime => Err(endpoint.denied()),
        }
    }

    fn status(&self) -> StatusSnapshot {
        WatchdogSupervisor::status(self)
    }
}

/// Host environment that publishes an endpoint group.
///
/// The returned registration keeps the group published; dropping it (or a
/// host-specific close) removes the group and releases the host's reference to
/// the handler.
pub trait EndpointHost {
    /// Guard type that keeps the group registered.
    type Registration;

    /// Publish `handler` under `group`.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Registration`] if the group cannot be created.
    fn register(
        &mut self,
        group: &'static str,
        handler: Arc<dyn EndpointHandler>,
    ) -> SupervisorResult<Self::Registration>;
}
