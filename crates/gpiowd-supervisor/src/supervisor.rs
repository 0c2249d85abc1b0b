//! The watchdog supervisor.
//!
//! The supervisor owns the three watchdog lines, the sticky halt latch and the
//! last-trigger timestamp. Every operation runs synchronously on the caller's
//! thread; there is no background task.
//!
//! # Locking
//!
//! One mutex guards the lines, the latch and the timestamp. It is held across
//! the trigger pulse (pulse then timestamp update) and across the whole
//! three-point clock sample, so a clock check excludes every other check and
//! any re-arm until its verdict has been latched. Counters live outside the
//! lock.

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{ResolvedConfig, SupervisorConfig};
use crate::endpoint::{is_rearm_value, parse_int};
use crate::error::{SupervisorError, SupervisorResult};
use crate::latch::{Latch, LatchState, Observation, StopCause};
use crate::line::{DigitalLine, Direction, Level, LineError, LineId, LineProvider};
use crate::metrics::{MetricsRecorder, SupervisorMetrics};
use crate::time::Timebase;

/// Remaining time reported while supervision is halted.
pub const HALTED_SENTINEL: i64 = -1;

/// Consumer label of the clock line.
pub const CLOCK_LABEL: &str = "wd-clock";

/// Consumer label of the inhibit line.
pub const INHIBIT_LABEL: &str = "wd-inhib";

/// Consumer label of the trigger line.
pub const TRIGGER_LABEL: &str = "wd-trig";

/// Seconds left before the watchdog is overdue, clamped at zero.
#[must_use]
pub fn compute_remaining_secs(period_secs: u32, last_trigger_secs: u64, now_secs: u64) -> u32 {
    let elapsed = now_secs.saturating_sub(last_trigger_secs);
    let elapsed = u32::try_from(elapsed).unwrap_or(u32::MAX);
    period_secs.saturating_sub(elapsed)
}

/// Three-point edge detection: the clock is present if any adjacent pair of
/// samples differs.
#[must_use]
pub fn clock_toggled(samples: [Level; 3]) -> bool {
    let [first, second, third] = samples;
    first != second || second != third
}

/// Side-effect-free view of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Latch state.
    pub latch: LatchState,
    /// Configured period in seconds.
    pub period_secs: u32,
    /// Clock reading at the last trigger pulse.
    pub last_trigger_secs: u64,
    /// Clock reading when the snapshot was taken.
    pub now_secs: u64,
    /// Arithmetic remaining time, ignoring the latch.
    pub remaining_secs: u32,
    /// Counter snapshot.
    pub metrics: SupervisorMetrics,
}

impl StatusSnapshot {
    /// Remaining time as the `remaining_time` endpoint would display it,
    /// based on the latch alone.
    #[must_use]
    pub fn displayed_remaining_secs(&self) -> i64 {
        if self.latch.is_stopped() {
            HALTED_SENTINEL
        } else {
            i64::from(self.remaining_secs)
        }
    }
}

// Field order is the release order: reverse of acquisition.
struct Lines<L> {
    trigger: L,
    inhibit: L,
    clock: L,
}

struct State<L> {
    lines: Lines<L>,
    latch: Latch,
    last_trigger_secs: u64,
}

impl<L: DigitalLine> State<L> {
    /// Drive the trigger line active for `settle`, release it, then stamp the time.
    fn pulse(&mut self, config: &ResolvedConfig, timebase: &Timebase) -> Result<u64, LineError> {
        let trigger = &mut self.lines.trigger;
        if let Err(e) = trigger.set_level(Level::High) {
            if let Err(release) = trigger.set_level(Level::Low) {
                warn!(line = trigger.id(), error = %release, "Could not return trigger line to inactive");
            }
            return Err(e);
        }
        timebase.delay(config.settle);
        trigger.set_level(Level::Low)?;

        let now = timebase.now_secs();
        self.last_trigger_secs = self.last_trigger_secs.max(now);
        Ok(self.last_trigger_secs)
    }
}

fn acquire<P: LineProvider>(
    provider: &P,
    id: LineId,
    label: &'static str,
    direction: Direction,
) -> SupervisorResult<P::Line> {
    provider.acquire(id, label, direction).map_err(|source| {
        error!(line = id, label, error = %source, "Line not available");
        SupervisorError::resource_unavailable(id, label, source)
    })
}

/// Supervisor for an external hardware watchdog driven over three digital lines.
///
/// # Thread Safety
///
/// The supervisor is `Send + Sync` and meant to be shared as
/// `Arc<WatchdogSupervisor<_>>` between concurrent endpoint handlers.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use gpiowd_supervisor::prelude::*;
///
/// let board = SimLineProvider::new();
/// let clock = Arc::new(ManualClock::new());
/// let config = SupervisorConfig::new(4, 5, 6, 60);
///
/// let supervisor = WatchdogSupervisor::activate(&board, &config, Timebase::manual(&clock))?;
/// assert_eq!(supervisor.displayed_remaining_secs(), 60);
///
/// clock.advance_secs(10);
/// assert_eq!(supervisor.displayed_remaining_secs(), 50);
/// # Ok::<(), SupervisorError>(())
/// ```
pub struct WatchdogSupervisor<L: DigitalLine> {
    config: ResolvedConfig,
    timebase: Timebase,
    state: Mutex<State<L>>,
    metrics: MetricsRecorder,
}

impl<L: DigitalLine> WatchdogSupervisor<L> {
    /// Validate the configuration, acquire the lines and deliver the baseline pulse.
    ///
    /// Clock and inhibit are acquired as inputs, trigger as an output driven
    /// inactive. Any failure releases every line acquired so far, in reverse
    /// order, before returning. There is no retry.
    ///
    /// # Errors
    ///
    /// - [`SupervisorError::Configuration`] if a value is missing or out of
    ///   range, or [`SupervisorError::InvalidLine`] if a line identifier is not
    ///   valid on this host; no line is acquired in either case.
    /// - [`SupervisorError::ResourceUnavailable`] if a line cannot be acquired
    ///   or the baseline pulse cannot be delivered.
    pub fn activate<P>(
        provider: &P,
        config: &SupervisorConfig,
        timebase: Timebase,
    ) -> SupervisorResult<Self>
    where
        P: LineProvider<Line = L>,
    {
        let config = config.resolve()?;

        for (id, label) in [
            (config.clock_line, CLOCK_LABEL),
            (config.inhibit_line, INHIBIT_LABEL),
            (config.trigger_line, TRIGGER_LABEL),
        ] {
            if !provider.is_valid(id) {
                error!(line = id, label, "Line is not a valid digital line");
                return Err(SupervisorError::InvalidLine { label, line: id });
            }
        }

        // On early return the handles already bound drop in reverse order.
        let clock = acquire(provider, config.clock_line, CLOCK_LABEL, Direction::Input)?;
        let inhibit = acquire(provider, config.inhibit_line, INHIBIT_LABEL, Direction::Input)?;
        let trigger = acquire(
            provider,
            config.trigger_line,
            TRIGGER_LABEL,
            Direction::Output {
                initial: Level::Low,
            },
        )?;

        let mut state = State {
            last_trigger_secs: timebase.now_secs(),
            lines: Lines {
                trigger,
                inhibit,
                clock,
            },
            latch: Latch::new(),
        };

        let metrics = MetricsRecorder::default();
        let baseline = state.pulse(&config, &timebase).map_err(|source| {
            error!(line = config.trigger_line, error = %source, "Baseline trigger pulse failed");
            SupervisorError::resource_unavailable(config.trigger_line, TRIGGER_LABEL, source)
        })?;
        metrics.record_trigger();

        info!(
            clock_line = config.clock_line,
            inhibit_line = config.inhibit_line,
            trigger_line = config.trigger_line,
            period_secs = config.period_secs,
            baseline_secs = baseline,
            "Watchdog supervisor activated"
        );

        Ok(Self {
            config,
            timebase,
            state: Mutex::new(state),
            metrics,
        })
    }

    /// Deliver a trigger pulse without touching the latch.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::LineFault`] if the trigger line cannot be driven;
    /// `last_trigger_time` is left unchanged in that case.
    pub fn trigger(&self) -> SupervisorResult<u64> {
        let mut state = self.state.lock();
        self.deliver_pulse(&mut state)
    }

    /// Clear the latch and deliver a trigger pulse.
    ///
    /// Both happen under the supervisor lock, so no concurrent check can
    /// observe the cleared latch before the pulse has completed. If the pulse
    /// fails the latch is left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::LineFault`] if the trigger line cannot be driven.
    pub fn rearm(&self) -> SupervisorResult<()> {
        let mut state = self.state.lock();
        let at = self.deliver_pulse(&mut state)?;
        let cleared = state.latch.rearm();
        self.metrics.record_rearm();
        info!(
            at_secs = at,
            cleared = cleared.map(StopCause::as_str),
            "Watchdog re-armed"
        );
        Ok(())
    }

    /// Read the inhibit line, tripping the latch if it is active.
    ///
    /// Returns the raw reading whatever the latch state. A read failure counts
    /// as inhibited.
    pub fn check_inhibit(&self) -> bool {
        let mut state = self.state.lock();
        self.observe_inhibit(&mut state)
    }

    /// Sample the clock line three times, tripping the latch if it never toggles.
    ///
    /// Blocks for two sample intervals (800ms by default) while holding the
    /// supervisor lock. A read failure counts as clock loss.
    pub fn check_clock(&self) -> bool {
        let mut state = self.state.lock();

        let present = match self.sample_clock(&mut state.lines.clock) {
            Ok(samples) => {
                let present = clock_toggled(samples);
                debug!(samples = ?samples, present, "Sampled clock line");
                present
            }
            Err(e) => {
                self.metrics.record_line_fault();
                warn!(error = %e, "Clock line read failed, treating as clock loss");
                false
            }
        };

        if let Observation::Tripped(cause) = state.latch.observe_clock(present) {
            self.metrics.record_clock_loss_latch();
            warn!(
                cause = cause.as_str(),
                "Watchdog supervision halted: clock line not toggling"
            );
        }
        present
    }

    /// Seconds before the watchdog is overdue, ignoring the latch. No side effects.
    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        let last = self.state.lock().last_trigger_secs;
        compute_remaining_secs(self.config.period_secs, last, self.timebase.now_secs())
    }

    /// Remaining time as displayed to readers: [`HALTED_SENTINEL`] if the
    /// inhibit line reads active now or the latch has tripped.
    #[must_use]
    pub fn displayed_remaining_secs(&self) -> i64 {
        let mut state = self.state.lock();
        let remaining = compute_remaining_secs(
            self.config.period_secs,
            state.last_trigger_secs,
            self.timebase.now_secs(),
        );
        self.observe_inhibit(&mut state);

        if state.latch.is_stopped() {
            HALTED_SENTINEL
        } else {
            i64::from(remaining)
        }
    }

    /// Handle a write to the `trig` endpoint.
    ///
    /// Only `1` (or `49`, the code of ASCII `'1'`) re-arms. Any other integer
    /// is accepted and ignored. The full payload length is reported as consumed.
    ///
    /// # Errors
    ///
    /// - [`SupervisorError::MalformedInput`] / [`SupervisorError::OutOfRange`]
    ///   if the payload is not a decimal `i32`; no state changes.
    /// - [`SupervisorError::LineFault`] if the re-arm pulse fails.
    pub fn store_trig(&self, payload: &[u8]) -> SupervisorResult<usize> {
        let value = match parse_int(payload) {
            Ok(value) => value,
            Err(e) => {
                self.metrics.record_rejected_write();
                debug!(error = %e, "Rejected trig write");
                return Err(e);
            }
        };

        if is_rearm_value(value) {
            self.rearm()?;
        } else {
            self.metrics.record_ignored_write();
            debug!(value, "Ignoring trig write");
        }
        Ok(payload.len())
    }

    /// Side-effect-free snapshot. Does not read any line.
    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        let (latch, last_trigger_secs) = {
            let state = self.state.lock();
            (state.latch.state(), state.last_trigger_secs)
        };
        let now_secs = self.timebase.now_secs();
        StatusSnapshot {
            latch,
            period_secs: self.config.period_secs,
            last_trigger_secs,
            now_secs,
            remaining_secs: compute_remaining_secs(
                self.config.period_secs,
                last_trigger_secs,
                now_secs,
            ),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Current latch state.
    #[must_use]
    pub fn latch_state(&self) -> LatchState {
        self.state.lock().latch.state()
    }

    /// Whether supervision is halted.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.latch_state().is_stopped()
    }

    /// Clock reading at the last successful trigger pulse.
    #[must_use]
    pub fn last_trigger_secs(&self) -> u64 {
        self.state.lock().last_trigger_secs
    }

    /// Configured period in seconds.
    #[must_use]
    pub fn period_secs(&self) -> u32 {
        self.config.period_secs
    }

    /// Validated configuration in effect.
    #[must_use]
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Counter snapshot. Lock-free.
    #[must_use]
    pub fn metrics(&self) -> SupervisorMetrics {
        self.metrics.snapshot()
    }

    fn deliver_pulse(&self, state: &mut State<L>) -> SupervisorResult<u64> {
        match state.pulse(&self.config, &self.timebase) {
            Ok(at) => {
                self.metrics.record_trigger();
                debug!(at_secs = at, "Trigger pulse delivered");
                Ok(at)
            }
            Err(source) => {
                self.metrics.record_line_fault();
                error!(line = self.config.trigger_line, error = %source, "Trigger pulse failed");
                Err(SupervisorError::LineFault {
                    label: TRIGGER_LABEL,
                    source,
                })
            }
        }
    }

    fn observe_inhibit(&self, state: &mut State<L>) -> bool {
        let inhibited = match state.lines.inhibit.get_level() {
            Ok(level) => level.is_high(),
            Err(e) => {
                self.metrics.record_line_fault();
                warn!(error = %e, "Inhibit line read failed, treating as inhibited");
                true
            }
        };

        if let Observation::Tripped(cause) = state.latch.observe_inhibit(inhibited) {
            self.metrics.record_inhibit_latch();
            warn!(
                cause = cause.as_str(),
                "Watchdog supervision halted: inhibit line active"
            );
        }
        inhibited
    }

    fn sample_clock(&self, line: &mut L) -> Result<[Level; 3], LineError> {
        let first = line.get_level()?;
        self.timebase.delay(self.config.sample_interval);
        let second = line.get_level()?;
        self.timebase.delay(self.config.sample_interval);
        let third = line.get_level()?;
        Ok([first, second, third])
    }
}

impl<L: DigitalLine> Drop for WatchdogSupervisor<L> {
    fn drop(&mut self) {
        info!(
            clock_line = self.config.clock_line,
            inhibit_line = self.config.inhibit_line,
            trigger_line = self.config.trigger_line,
            "Releasing watchdog lines"
        );
    }
}

impl<L: DigitalLine> std::fmt::Debug for WatchdogSupervisor<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchdogSupervisor")
            .field("config", &self.config)
            .field("metrics", &self.metrics.snapshot())
            .finish_non_exhaustive()
    }
}
