//! Sticky halt latch.
//!
//! ```text
//!            inhibit observed / clock lost
//!   Armed ─────────────────────────────────► Stopped(cause)
//!     ▲                                          │
//!     └──────────────── rearm() ─────────────────┘
//! ```
//!
//! Observations can only move the latch towards `Stopped`. The single path
//! back to `Armed` is [`Latch::rearm`], which the supervisor calls only after a
//! successful manual trigger pulse.

use serde::Serialize;

/// Why the latch tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCause {
    /// The inhibit line read active.
    Inhibited,
    /// The clock line was not seen toggling.
    ClockLost,
}

impl StopCause {
    /// Get the cause as a string slice.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inhibited => "inhibited",
            Self::ClockLost => "clock_lost",
        }
    }
}

/// Latch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "cause", rename_all = "snake_case")]
pub enum LatchState {
    /// Supervision is protecting the system.
    #[default]
    Armed,
    /// Supervision halted until an operator re-arms.
    Stopped(StopCause),
}

impl LatchState {
    /// Whether the latch has tripped.
    #[must_use]
    pub fn is_stopped(self) -> bool {
        matches!(self, Self::Stopped(_))
    }

    /// Cause of the trip, if tripped.
    #[must_use]
    pub fn cause(self) -> Option<StopCause> {
        match self {
            Self::Armed => None,
            Self::Stopped(cause) => Some(cause),
        }
    }

    /// Get the state as a string slice.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Armed => "Armed",
            Self::Stopped(_) => "Stopped",
        }
    }
}

impl std::fmt::Display for LatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Armed => f.write_str("Armed"),
            Self::Stopped(cause) => write!(f, "Stopped ({})", cause.as_str()),
        }
    }
}

/// Result of feeding an observation to the latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The observation was healthy; state unchanged.
    Healthy,
    /// The observation tripped a previously armed latch.
    Tripped(StopCause),
    /// The observation was unhealthy but the latch had already tripped.
    AlreadyStopped,
}

/// Sticky latch with explicit transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Latch {
    state: LatchState,
}

impl Latch {
    /// Create an armed latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LatchState {
        self.state
    }

    /// Whether the latch has tripped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state.is_stopped()
    }

    /// Feed an inhibit-line reading.
    pub fn observe_inhibit(&mut self, inhibited: bool) -> Observation {
        if inhibited {
            self.trip(StopCause::Inhibited)
        } else {
            Observation::Healthy
        }
    }

    /// Feed a clock-presence result.
    pub fn observe_clock(&mut self, present: bool) -> Observation {
        if present {
            Observation::Healthy
        } else {
            self.trip(StopCause::ClockLost)
        }
    }

    /// Clear the latch. Returns the cause it was tripped for, if any.
    pub fn rearm(&mut self) -> Option<StopCause> {
        let previous = self.state.cause();
        self.state = LatchState::Armed;
        previous
    }

    fn trip(&mut self, cause: StopCause) -> Observation {
        match self.state {
            LatchState::Armed => {
                self.state = LatchState::Stopped(cause);
                Observation::Tripped(cause)
            }
            LatchState::Stopped(_) => Observation::AlreadyStopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_armed() {
        let latch = Latch::new();
        assert_eq!(latch.state(), LatchState::Armed);
        assert!(!latch.is_stopped());
    }

    #[test]
    fn test_inhibit_trips() {
        let mut latch = Latch::new();
        assert_eq!(latch.observe_inhibit(false), Observation::Healthy);
        assert_eq!(
            latch.observe_inhibit(true),
            Observation::Tripped(StopCause::Inhibited)
        );
        assert_eq!(latch.state(), LatchState::Stopped(StopCause::Inhibited));
    }

    #[test]
    fn test_healthy_observation_never_clears() {
        let mut latch = Latch::new();
        latch.observe_clock(false);
        assert_eq!(latch.observe_inhibit(false), Observation::Healthy);
        assert_eq!(latch.observe_clock(true), Observation::Healthy);
        assert!(latch.is_stopped());
    }

    #[test]
    fn test_first_cause_is_kept() {
        let mut latch = Latch::new();
        latch.observe_clock(false);
        assert_eq!(latch.observe_inhibit(true), Observation::AlreadyStopped);
        assert_eq!(latch.state().cause(), Some(StopCause::ClockLost));
    }

    #[test]
    fn test_rearm() {
        let mut latch = Latch::new();
        assert_eq!(latch.rearm(), None);

        latch.observe_inhibit(true);
        assert_eq!(latch.rearm(), Some(StopCause::Inhibited));
        assert_eq!(latch.state(), LatchState::Armed);
    }

    #[test]
    fn test_display() {
        assert_eq!(LatchState::Armed.to_string(), "Armed");
        assert_eq!(
            LatchState::Stopped(StopCause::ClockLost).to_string(),
            "Stopped (clock_lost)"
        );
    }

    #[test]
    fn test_serialize_state() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&LatchState::Stopped(StopCause::Inhibited))?;
        assert_eq!(json, r#"{"state":"stopped","cause":"inhibited"}"#);
        let json = serde_json::to_string(&LatchState::Armed)?;
        assert_eq!(json, r#"{"state":"armed"}"#);
        Ok(())
    }
}
