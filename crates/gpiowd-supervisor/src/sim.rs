//! Hardware-free backend.
//!
//! This module provides simulated lines, a manually driven clock and an
//! in-memory endpoint host, for tests and for running the supervisor on
//! machines without the watchdog wired up.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use gpiowd_supervisor::prelude::*;
//!
//! let board = SimLineProvider::new();
//! let clock = Arc::new(ManualClock::new());
//! let mut host = SimEndpointHost::new();
//!
//! let activation = Activation::activate(
//!     &board,
//!     &SupervisorConfig::new(1, 2, 3, 60),
//!     Timebase::manual(&clock),
//!     &mut host,
//! )?;
//!
//! board.set_level(2, Level::High);
//! assert_eq!(host.read("watchdog", "inhib")?, "1\n");
//! assert_eq!(host.read("watchdog", "remaining_time")?, "-1\n");
//!
//! activation.deactivate();
//! assert!(board.acquired_lines().is_empty());
//! # Ok::<(), SupervisorError>(())
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use portable_atomic::{AtomicU64, Ordering};

use crate::endpoint::{EndpointHandler, EndpointHost};
use crate::error::{SupervisorError, SupervisorResult};
use crate::line::{DigitalLine, Direction, Level, LineError, LineId, LineProvider};
use crate::time::{Delay, MonotonicClock, Timebase};

/// Number of lines a default simulated board exposes.
pub const DEFAULT_SIM_LINE_COUNT: u32 = 512;

/// Ownership change recorded by the simulated board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    /// A line was acquired.
    Acquired(LineId),
    /// A line was released.
    Released(LineId),
}

#[derive(Debug, Default)]
struct SimPin {
    owner: Option<&'static str>,
    direction: Option<Direction>,
    level: Level,
    script: VecDeque<Level>,
    toggle_on_read: bool,
    fail_reads: bool,
    fail_writes: bool,
    refuse_acquire: bool,
    writes: Vec<Level>,
}

#[derive(Debug, Default)]
struct Board {
    pins: HashMap<LineId, SimPin>,
    events: Vec<SimEvent>,
}

impl Board {
    fn pin(&mut self, id: LineId) -> &mut SimPin {
        self.pins.entry(id).or_default()
    }
}

/// Simulated digital I/O provider.
///
/// Clones share the same board, so a test can keep a handle for driving
/// inputs and inspecting outputs while the supervisor owns the lines.
#[derive(Debug, Clone)]
pub struct SimLineProvider {
    board: Arc<Mutex<Board>>,
    line_count: u32,
}

impl SimLineProvider {
    /// Create a board with [`DEFAULT_SIM_LINE_COUNT`] lines, all low.
    #[must_use]
    pub fn new() -> Self {
        Self::with_line_count(DEFAULT_SIM_LINE_COUNT)
    }

    /// Create a board where ids `0..line_count` are valid.
    #[must_use]
    pub fn with_line_count(line_count: u32) -> Self {
        Self {
            board: Arc::new(Mutex::new(Board::default())),
            line_count,
        }
    }

    /// Hold an input at `level`, discarding any pending script.
    pub fn set_level(&self, id: LineId, level: Level) {
        let mut board = self.board.lock();
        let pin = board.pin(id);
        pin.script.clear();
        pin.level = level;
    }

    /// Queue levels returned by successive reads. The last one stays in
    /// effect once the script runs out.
    pub fn script(&self, id: LineId, levels: impl IntoIterator<Item = Level>) {
        self.board.lock().pin(id).script.extend(levels);
    }

    /// Make every read of `id` flip its level, like a free-running clock.
    pub fn toggle_on_read(&self, id: LineId, enabled: bool) {
        self.board.lock().pin(id).toggle_on_read = enabled;
    }

    /// Make reads of `id` fail with an I/O error.
    pub fn fail_reads(&self, id: LineId, enabled: bool) {
        self.board.lock().pin(id).fail_reads = enabled;
    }

    /// Make writes to `id` fail with an I/O error.
    pub fn fail_writes(&self, id: LineId, enabled: bool) {
        self.board.lock().pin(id).fail_writes = enabled;
    }

    /// Pretend `id` is owned by another consumer.
    pub fn refuse_acquire(&self, id: LineId, enabled: bool) {
        self.board.lock().pin(id).refuse_acquire = enabled;
    }

    /// Whether `id` is currently acquired.
    #[must_use]
    pub fn is_acquired(&self, id: LineId) -> bool {
        self.board
            .lock()
            .pins
            .get(&id)
            .is_some_and(|pin| pin.owner.is_some())
    }

    /// Label of the consumer owning `id`.
    #[must_use]
    pub fn owner(&self, id: LineId) -> Option<&'static str> {
        self.board.lock().pins.get(&id).and_then(|pin| pin.owner)
    }

    /// Direction `id` was acquired with.
    #[must_use]
    pub fn direction(&self, id: LineId) -> Option<Direction> {
        self.board.lock().pins.get(&id).and_then(|pin| pin.direction)
    }

    /// Currently acquired lines, ascending.
    #[must_use]
    pub fn acquired_lines(&self) -> Vec<LineId> {
        let board = self.board.lock();
        let mut lines: Vec<LineId> = board
            .pins
            .iter()
            .filter(|(_, pin)| pin.owner.is_some())
            .map(|(id, _)| *id)
            .collect();
        lines.sort_unstable();
        lines
    }

    /// Current level of `id`.
    #[must_use]
    pub fn level(&self, id: LineId) -> Level {
        self.board
            .lock()
            .pins
            .get(&id)
            .map_or(Level::Low, |pin| pin.level)
    }

    /// Levels written to `id` through [`DigitalLine::set_level`], oldest first.
    #[must_use]
    pub fn writes(&self, id: LineId) -> Vec<Level> {
        self.board
            .lock()
            .pins
            .get(&id)
            .map(|pin| pin.writes.clone())
            .unwrap_or_default()
    }

    /// Acquire/release history, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<SimEvent> {
        self.board.lock().events.clone()
    }
}

impl Default for SimLineProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LineProvider for SimLineProvider {
    type Line = SimLine;

    fn is_valid(&self, id: LineId) -> bool {
        id < self.line_count
    }

    fn acquire(
        &self,
        id: LineId,
        label: &'static str,
        direction: Direction,
    ) -> Result<SimLine, LineError> {
        if !self.is_valid(id) {
            return Err(LineError::Invalid(id));
        }

        let mut board = self.board.lock();
        let pin = board.pin(id);
        if pin.owner.is_some() || pin.refuse_acquire {
            return Err(LineError::Busy(id));
        }
        pin.owner = Some(label);
        pin.direction = Some(direction);
        if let Direction::Output { initial } = direction {
            pin.level = initial;
        }
        board.events.push(SimEvent::Acquired(id));

        Ok(SimLine {
            id,
            board: Arc::clone(&self.board),
        })
    }
}

/// Line handle produced by [`SimLineProvider`].
#[derive(Debug)]
pub struct SimLine {
    id: LineId,
    board: Arc<Mutex<Board>>,
}

impl DigitalLine for SimLine {
    fn id(&self) -> LineId {
        self.id
    }

    fn get_level(&mut self) -> Result<Level, LineError> {
        let mut board = self.board.lock();
        let pin = board.pin(self.id);
        if pin.fail_reads {
            return Err(LineError::io(self.id, "simulated read failure"));
        }
        if let Some(next) = pin.script.pop_front() {
            pin.level = next;
        } else if pin.toggle_on_read {
            pin.level = pin.level.toggled();
        }
        Ok(pin.level)
    }

    fn set_level(&mut self, level: Level) -> Result<(), LineError> {
        let mut board = self.board.lock();
        let pin = board.pin(self.id);
        if !matches!(pin.direction, Some(Direction::Output { .. })) {
            return Err(LineError::NotOutput(self.id));
        }
        if pin.fail_writes {
            return Err(LineError::io(self.id, "simulated write failure"));
        }
        pin.level = level;
        pin.writes.push(level);
        Ok(())
    }
}

impl Drop for SimLine {
    fn drop(&mut self) {
        let mut board = self.board.lock();
        let pin = board.pin(self.id);
        pin.owner = None;
        pin.direction = None;
        board.events.push(SimEvent::Released(self.id));
    }
}

/// Manually advanced clock. Delays advance it instead of sleeping.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current reading in milliseconds.
    #[must_use]
    pub fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::Acquire)
    }

    /// Advance by `duration`.
    pub fn advance(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        let _previous = self
            .millis
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_add(millis))
            });
    }

    /// Advance by whole seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    /// Move to `secs` seconds after the epoch. Never moves backwards.
    pub fn set_secs(&self, secs: u64) {
        self.millis
            .fetch_max(secs.saturating_mul(1000), Ordering::AcqRel);
    }
}

impl MonotonicClock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.now_millis() / 1000
    }
}

impl Delay for ManualClock {
    fn delay(&self, duration: Duration) {
        self.advance(duration);
    }
}

impl Timebase {
    /// Timebase driven entirely by `clock`: delays advance it.
    #[must_use]
    pub fn manual(clock: &Arc<ManualClock>) -> Self {
        Self::new(Arc::clone(clock) as _, Arc::clone(clock) as _)
    }
}

type GroupMap = HashMap<&'static str, Arc<dyn EndpointHandler>>;

/// In-memory endpoint host.
#[derive(Clone, Default)]
pub struct SimEndpointHost {
    groups: Arc<Mutex<GroupMap>>,
    refuse: bool,
}

impl SimEndpointHost {
    /// Create a host accepting registrations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a host that refuses every registration.
    #[must_use]
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// Whether `group` is currently published.
    #[must_use]
    pub fn is_registered(&self, group: &str) -> bool {
        self.groups.lock().contains_key(group)
    }

    fn handler(&self, group: &str) -> SupervisorResult<Arc<dyn EndpointHandler>> {
        self.groups
            .lock()
            .get(group)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(group.to_owned()))
    }

    /// Read `endpoint` in `group`.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotFound`] if the group or endpoint does not
    /// exist, or the handler's own error.
    pub fn read(&self, group: &str, endpoint: &str) -> SupervisorResult<String> {
        // The map lock is released before the handler runs; handlers may block.
        self.handler(group)?.show_by_name(endpoint)
    }

    /// Write `payload` to `endpoint` in `group`.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotFound`] if the group or endpoint does not
    /// exist, or the handler's own error.
    pub fn write(&self, group: &str, endpoint: &str, payload: &[u8]) -> SupervisorResult<usize> {
        self.handler(group)?.store_by_name(endpoint, payload)
    }
}

impl std::fmt::Debug for SimEndpointHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let groups: Vec<&'static str> = self.groups.lock().keys().copied().collect();
        f.debug_struct("SimEndpointHost")
            .field("groups", &groups)
            .field("refuse", &self.refuse)
            .finish()
    }
}

impl EndpointHost for SimEndpointHost {
    type Registration = SimRegistration;

    fn register(
        &mut self,
        group: &'static str,
        handler: Arc<dyn EndpointHandler>,
    ) -> SupervisorResult<SimRegistration> {
        if self.refuse {
            return Err(SupervisorError::registration(format!(
                "cannot create group {group}"
            )));
        }

        let mut groups = self.groups.lock();
        if groups.contains_key(group) {
            return Err(SupervisorError::registration(format!(
                "group {group} already exists"
            )));
        }
        groups.insert(group, handler);

        Ok(SimRegistration {
            group,
            groups: Arc::clone(&self.groups),
        })
    }
}

/// Registration guard of [`SimEndpointHost`]. Dropping it unpublishes the group.
pub struct SimRegistration {
    group: &'static str,
    groups: Arc<Mutex<GroupMap>>,
}

impl SimRegistration {
    /// Published group name.
    #[must_use]
    pub fn group(&self) -> &'static str {
        self.group
    }
}

impl std::fmt::Debug for SimRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimRegistration")
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

impl Drop for SimRegistration {
    fn drop(&mut self) {
        self.groups.lock().remove(self.group);
    }
}
