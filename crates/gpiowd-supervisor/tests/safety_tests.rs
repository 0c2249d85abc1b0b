//! Safety tests for activation unwinding and teardown ordering.
//!
//! Every failed activation must leave zero lines acquired, and lines are
//! always released in reverse acquisition order.
//! All tests use `Result<>` return types and avoid `unwrap`/`expect`.

#![cfg(test)]

use std::sync::Arc;

use gpiowd_supervisor::prelude::*;
use gpiowd_supervisor::sim::SimEvent;
use parking_lot::Mutex;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const CLOCK: LineId = 4;
const INHIBIT: LineId = 5;
const TRIGGER: LineId = 6;

fn config() -> SupervisorConfig {
    SupervisorConfig::new(CLOCK, INHIBIT, TRIGGER, 60)
}

fn timebase() -> Timebase {
    Timebase::manual(&Arc::new(ManualClock::new()))
}

#[test]
fn test_invalid_line_acquires_nothing() {
    let board = SimLineProvider::with_line_count(6);

    let result = WatchdogSupervisor::activate(&board, &config(), timebase());
    assert!(matches!(result, Err(SupervisorError::InvalidLine { .. })));
    assert!(result.as_ref().err().is_some_and(SupervisorError::is_configuration));
    assert_eq!(result.err().map(|e| e.errno()), Some(libc::EACCES));
    assert!(board.events().is_empty());
}

#[test]
fn test_busy_inhibit_releases_clock() {
    let board = SimLineProvider::new();
    board.refuse_acquire(INHIBIT, true);

    let result = WatchdogSupervisor::activate(&board, &config(), timebase());
    assert!(matches!(
        result,
        Err(SupervisorError::ResourceUnavailable {
            line: INHIBIT,
            label: "wd-inhib",
            source: LineError::Busy(INHIBIT),
        })
    ));
    assert_eq!(
        board.events(),
        vec![SimEvent::Acquired(CLOCK), SimEvent::Released(CLOCK)]
    );
    assert!(board.acquired_lines().is_empty());
}

#[test]
fn test_busy_trigger_releases_in_reverse_order() {
    let board = SimLineProvider::new();
    board.refuse_acquire(TRIGGER, true);

    let result = WatchdogSupervisor::activate(&board, &config(), timebase());
    assert!(matches!(
        result,
        Err(SupervisorError::ResourceUnavailable { line: TRIGGER, .. })
    ));
    assert_eq!(
        board.events(),
        vec![
            SimEvent::Acquired(CLOCK),
            SimEvent::Acquired(INHIBIT),
            SimEvent::Released(INHIBIT),
            SimEvent::Released(CLOCK),
        ]
    );
}

#[test]
fn test_failed_baseline_pulse_releases_everything() {
    let board = SimLineProvider::new();
    board.fail_writes(TRIGGER, true);

    let result = WatchdogSupervisor::activate(&board, &config(), timebase());
    assert!(matches!(
        result,
        Err(SupervisorError::ResourceUnavailable {
            line: TRIGGER,
            source: LineError::Io { .. },
            ..
        })
    ));
    assert!(board.acquired_lines().is_empty());
    assert_eq!(
        board.events().get(3..),
        Some(
            &[
                SimEvent::Released(TRIGGER),
                SimEvent::Released(INHIBIT),
                SimEvent::Released(CLOCK),
            ][..]
        )
    );
}

#[test]
fn test_refused_registration_releases_everything() {
    let board = SimLineProvider::new();
    let mut host = SimEndpointHost::refusing();

    let result = Activation::activate(&board, &config(), timebase(), &mut host);
    let err = result.err();
    assert!(matches!(err, Some(SupervisorError::Registration(_))));
    assert_eq!(err.map(|e| e.errno()), Some(libc::ENOMEM));
    assert!(board.acquired_lines().is_empty());
}

#[test]
fn test_duplicate_group_is_refused() -> TestResult {
    let first_board = SimLineProvider::new();
    let second_board = SimLineProvider::new();
    let mut host = SimEndpointHost::new();

    let _first = Activation::activate(&first_board, &config(), timebase(), &mut host)?;
    let second = Activation::activate(&second_board, &config(), timebase(), &mut host);

    assert!(matches!(second, Err(SupervisorError::Registration(_))));
    assert!(second_board.acquired_lines().is_empty());
    assert_eq!(first_board.acquired_lines(), vec![CLOCK, INHIBIT, TRIGGER]);
    Ok(())
}

#[test]
fn test_drop_releases_in_reverse_order() -> TestResult {
    let board = SimLineProvider::new();
    let supervisor = WatchdogSupervisor::activate(&board, &config(), timebase())?;
    drop(supervisor);

    assert_eq!(
        board.events(),
        vec![
            SimEvent::Acquired(CLOCK),
            SimEvent::Acquired(INHIBIT),
            SimEvent::Acquired(TRIGGER),
            SimEvent::Released(TRIGGER),
            SimEvent::Released(INHIBIT),
            SimEvent::Released(CLOCK),
        ]
    );
    Ok(())
}

/// Host whose registration records how many lines were still held when it was dropped.
struct RecordingHost {
    board: SimLineProvider,
    held_at_unregister: Arc<Mutex<Option<usize>>>,
}

struct RecordingRegistration {
    board: SimLineProvider,
    held_at_unregister: Arc<Mutex<Option<usize>>>,
    _handler: Arc<dyn EndpointHandler>,
}

impl Drop for RecordingRegistration {
    fn drop(&mut self) {
        *self.held_at_unregister.lock() = Some(self.board.acquired_lines().len());
    }
}

impl EndpointHost for RecordingHost {
    type Registration = RecordingRegistration;

    fn register(
        &mut self,
        _group: &'static str,
        handler: Arc<dyn EndpointHandler>,
    ) -> SupervisorResult<RecordingRegistration> {
        Ok(RecordingRegistration {
            board: self.board.clone(),
            held_at_unregister: Arc::clone(&self.held_at_unregister),
            _handler: handler,
        })
    }
}

#[test]
fn test_endpoints_removed_before_lines_released() -> TestResult {
    let board = SimLineProvider::new();
    let held = Arc::new(Mutex::new(None));
    let mut host = RecordingHost {
        board: board.clone(),
        held_at_unregister: Arc::clone(&held),
    };

    let activation = Activation::activate(&board, &config(), timebase(), &mut host)?;
    activation.deactivate();

    assert_eq!(*held.lock(), Some(3));
    assert!(board.acquired_lines().is_empty());
    Ok(())
}

#[test]
fn test_activation_drop_keeps_order() -> TestResult {
    let board = SimLineProvider::new();
    let held = Arc::new(Mutex::new(None));
    let mut host = RecordingHost {
        board: board.clone(),
        held_at_unregister: Arc::clone(&held),
    };

    let activation = Activation::activate(&board, &config(), timebase(), &mut host)?;
    drop(activation);

    assert_eq!(*held.lock(), Some(3));
    assert!(board.acquired_lines().is_empty());
    Ok(())
}
