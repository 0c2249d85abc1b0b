//! Configuration types for the watchdog supervisor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SupervisorError, SupervisorResult};
use crate::line::LineId;

/// Trigger pulse settle time used when none is configured.
pub const DEFAULT_SETTLE_MS: u32 = 50;

/// Delay between clock samples used when none is configured.
pub const DEFAULT_SAMPLE_INTERVAL_MS: u32 = 400;

/// Largest accepted period. The remaining time is reported as a C `int`.
pub const MAX_PERIOD_SECS: u32 = i32::MAX.unsigned_abs();

/// Supervisor configuration as supplied by the host.
///
/// Line identifiers and the period are optional at this level so that a
/// missing value is detected by [`SupervisorConfig::resolve`] instead of being
/// silently defaulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Line carrying the watchdog's periodic clock.
    pub clock_line: Option<LineId>,

    /// Line reporting that the watchdog is inhibited (active high).
    pub inhibit_line: Option<LineId>,

    /// Line pulsed to trigger (re-arm) the watchdog.
    pub trigger_line: Option<LineId>,

    /// Watchdog period in seconds.
    pub period_secs: Option<u32>,

    /// Trigger pulse width in milliseconds.
    ///
    /// Default: 50ms, above the watchdog's minimum pulse width.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u32,

    /// Delay between the three clock samples in milliseconds.
    ///
    /// Default: 400ms, spanning at least one clock period.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u32,
}

fn default_settle_ms() -> u32 {
    DEFAULT_SETTLE_MS
}

fn default_sample_interval_ms() -> u32 {
    DEFAULT_SAMPLE_INTERVAL_MS
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            clock_line: None,
            inhibit_line: None,
            trigger_line: None,
            period_secs: None,
            settle_ms: DEFAULT_SETTLE_MS,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
        }
    }
}

impl SupervisorConfig {
    /// Create a complete configuration with default timings.
    #[must_use]
    pub fn new(clock_line: LineId, inhibit_line: LineId, trigger_line: LineId, period_secs: u32) -> Self {
        Self {
            clock_line: Some(clock_line),
            inhibit_line: Some(inhibit_line),
            trigger_line: Some(trigger_line),
            period_secs: Some(period_secs),
            ..Self::default()
        }
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> SupervisorConfigBuilder {
        SupervisorConfigBuilder::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is missing or out of range.
    pub fn validate(&self) -> SupervisorResult<()> {
        self.resolve().map(|_| ())
    }

    /// Check every value and produce the settings the supervisor runs with.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Configuration`] naming the first missing or
    /// out-of-range value.
    pub fn resolve(&self) -> SupervisorResult<ResolvedConfig> {
        let clock_line = require(self.clock_line, "clock_line")?;
        let inhibit_line = require(self.inhibit_line, "inhibit_line")?;
        let trigger_line = require(self.trigger_line, "trigger_line")?;
        let period_secs = require(self.period_secs, "period_secs")?;

        if !(1..=MAX_PERIOD_SECS).contains(&period_secs) {
            return Err(SupervisorError::configuration(format!(
                "period_secs must be between 1 and {MAX_PERIOD_SECS}"
            )));
        }
        if !(1..=1000).contains(&self.settle_ms) {
            return Err(SupervisorError::configuration(
                "settle_ms must be between 1 and 1000",
            ));
        }
        if !(1..=5000).contains(&self.sample_interval_ms) {
            return Err(SupervisorError::configuration(
                "sample_interval_ms must be between 1 and 5000",
            ));
        }

        Ok(ResolvedConfig {
            clock_line,
            inhibit_line,
            trigger_line,
            period_secs,
            settle: Duration::from_millis(u64::from(self.settle_ms)),
            sample_interval: Duration::from_millis(u64::from(self.sample_interval_ms)),
        })
    }
}

fn require<T>(value: Option<T>, name: &str) -> SupervisorResult<T> {
    value.ok_or_else(|| SupervisorError::configuration(format!("{name} is missing")))
}

/// Validated configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Clock input line.
    pub clock_line: LineId,
    /// Inhibit input line.
    pub inhibit_line: LineId,
    /// Trigger output line.
    pub trigger_line: LineId,
    /// Watchdog period in seconds.
    pub period_secs: u32,
    /// Trigger pulse width.
    pub settle: Duration,
    /// Delay between clock samples.
    pub sample_interval: Duration,
}

/// Builder for `SupervisorConfig`.
#[derive(Debug, Default)]
pub struct SupervisorConfigBuilder {
    config: SupervisorConfig,
}

impl SupervisorConfigBuilder {
    /// Set the clock line.
    #[must_use]
    pub fn clock_line(mut self, id: LineId) -> Self {
        self.config.clock_line = Some(id);
        self
    }

    /// Set the inhibit line.
    #[must_use]
    pub fn inhibit_line(mut self, id: LineId) -> Self {
        self.config.inhibit_line = Some(id);
        self
    }

    /// Set the trigger line.
    #[must_use]
    pub fn trigger_line(mut self, id: LineId) -> Self {
        self.config.trigger_line = Some(id);
        self
    }

    /// Set the period in seconds.
    #[must_use]
    pub fn period_secs(mut self, secs: u32) -> Self {
        self.config.period_secs = Some(secs);
        self
    }

    /// Set the trigger pulse width in milliseconds.
    #[must_use]
    pub fn settle_ms(mut self, ms: u32) -> Self {
        self.config.settle_ms = ms;
        self
    }

    /// Set the delay between clock samples in milliseconds.
    #[must_use]
    pub fn sample_interval_ms(mut self, ms: u32) -> Self {
        self.config.sample_interval_ms = ms;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> SupervisorResult<SupervisorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
