//! Supervisor counters.
//!
//! Counters are lock-free so that a metrics snapshot never waits behind a
//! clock sample holding the supervisor lock. `portable-atomic` provides 64-bit
//! atomics on 32-bit ARM boards that lack them natively.

use portable_atomic::{AtomicU64, Ordering};
use serde::Serialize;

/// Point-in-time copy of the supervisor counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SupervisorMetrics {
    /// Trigger pulses delivered, including the activation baseline.
    pub trigger_count: u64,
    /// Manual re-arms performed.
    pub rearm_count: u64,
    /// Writes accepted as no-ops (value other than 1).
    pub ignored_writes: u64,
    /// Writes rejected as malformed.
    pub rejected_writes: u64,
    /// Latch trips caused by the inhibit line.
    pub inhibit_latches: u64,
    /// Latch trips caused by clock loss.
    pub clock_loss_latches: u64,
    /// Line read or write failures.
    pub line_faults: u64,
}

#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    trigger_count: AtomicU64,
    rearm_count: AtomicU64,
    ignored_writes: AtomicU64,
    rejected_writes: AtomicU64,
    inhibit_latches: AtomicU64,
    clock_loss_latches: AtomicU64,
    line_faults: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    // fetch_update never fails with a closure returning Some.
    let _previous = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
        Some(v.saturating_add(1))
    });
}

impl MetricsRecorder {
    pub(crate) fn record_trigger(&self) {
        bump(&self.trigger_count);
    }

    pub(crate) fn record_rearm(&self) {
        bump(&self.rearm_count);
    }

    pub(crate) fn record_ignored_write(&self) {
        bump(&self.ignored_writes);
    }

    pub(crate) fn record_rejected_write(&self) {
        bump(&self.rejected_writes);
    }

    pub(crate) fn record_inhibit_latch(&self) {
        bump(&self.inhibit_latches);
    }

    pub(crate) fn record_clock_loss_latch(&self) {
        bump(&self.clock_loss_latches);
    }

    pub(crate) fn record_line_fault(&self) {
        bump(&self.line_faults);
    }

    pub(crate) fn snapshot(&self) -> SupervisorMetrics {
        SupervisorMetrics {
            trigger_count: self.trigger_count.load(Ordering::Acquire),
            rearm_count: self.rearm_count.load(Ordering::Acquire),
            ignored_writes: self.ignored_writes.load(Ordering::Acquire),
            rejected_writes: self.rejected_writes.load(Ordering::Acquire),
            inhibit_latches: self.inhibit_latches.load(Ordering::Acquire),
            clock_loss_latches: self.clock_loss_latches.load(Ordering::Acquire),
            line_faults: self.line_faults.load(Ordering::Acquire),
        }
    }
}
