//! BDD tests for watchdog supervision scenarios.
//!
//! Feature: halt latch and manual re-arm

#![cfg(test)]

use std::sync::Arc;

use gpiowd_supervisor::prelude::*;
use gpiowd_supervisor::sim::{SimLine, SimRegistration};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const CLOCK: LineId = 17;
const INHIBIT: LineId = 27;
const TRIGGER: LineId = 22;

struct Rig {
    board: SimLineProvider,
    clock: Arc<ManualClock>,
    host: SimEndpointHost,
    activation: Activation<SimLine, SimRegistration>,
}

impl Rig {
    fn given_period(period_secs: u32) -> Result<Self, SupervisorError> {
        let board = SimLineProvider::new();
        let clock = Arc::new(ManualClock::new());
        let mut host = SimEndpointHost::new();
        let activation = Activation::activate(
            &board,
            &SupervisorConfig::new(CLOCK, INHIBIT, TRIGGER, period_secs),
            Timebase::manual(&clock),
            &mut host,
        )?;
        Ok(Self {
            board,
            clock,
            host,
            activation,
        })
    }

    fn read(&self, endpoint: &str) -> Result<String, SupervisorError> {
        self.host.read(GROUP_NAME, endpoint)
    }

    fn write(&self, endpoint: &str, payload: &[u8]) -> Result<usize, SupervisorError> {
        self.host.write(GROUP_NAME, endpoint, payload)
    }
}

mod halt_latch_scenarios {
    use super::*;

    /// Scenario: countdown, inhibit, re-arm over a 60 second period
    #[test]
    fn scenario_inhibit_then_rearm_restarts_countdown() -> TestResult {
        // Given a supervisor activated at t=0 with a 60 second period
        let rig = Rig::given_period(60)?;

        // When remaining_time is read at t=10
        rig.clock.set_secs(10);
        // Then it reports 50
        assert_eq!(rig.read("remaining_time")?, "50\n");

        // When the inhibit line goes active at t=20 and is observed
        rig.clock.set_secs(20);
        rig.board.set_level(INHIBIT, Level::High);
        assert_eq!(rig.read("inhib")?, "1\n");

        // And it goes inactive again
        rig.board.set_level(INHIBIT, Level::Low);

        // Then remaining_time reads -1 at t=25
        rig.clock.set_secs(25);
        assert_eq!(rig.read("remaining_time")?, "-1\n");

        // When 1 is written to trig at t=30
        rig.clock.set_secs(30);
        assert_eq!(rig.write("trig", b"1\n")?, 2);

        // Then remaining_time reads 59 at t=31
        rig.clock.set_secs(31);
        assert_eq!(rig.read("remaining_time")?, "59\n");
        Ok(())
    }

    /// Scenario: remaining time clamps to zero when overdue
    #[test]
    fn scenario_overdue_reads_zero() -> TestResult {
        let rig = Rig::given_period(60)?;

        rig.clock.set_secs(60);
        assert_eq!(rig.read("remaining_time")?, "0\n");

        rig.clock.set_secs(3600);
        assert_eq!(rig.read("remaining_time")?, "0\n");
        Ok(())
    }

    /// Scenario: inhibit observed only through remaining_time still latches
    #[test]
    fn scenario_remaining_time_read_latches_inhibit() -> TestResult {
        let rig = Rig::given_period(60)?;

        rig.board.set_level(INHIBIT, Level::High);
        assert_eq!(rig.read("remaining_time")?, "-1\n");

        rig.board.set_level(INHIBIT, Level::Low);
        assert_eq!(rig.read("remaining_time")?, "-1\n");
        assert_eq!(rig.read("inhib")?, "0\n");
        assert_eq!(rig.read("remaining_time")?, "-1\n");
        Ok(())
    }

    /// Scenario: a stalled clock halts supervision
    #[test]
    fn scenario_stalled_clock_latches() -> TestResult {
        let rig = Rig::given_period(60)?;

        assert_eq!(rig.read("clock")?, "0\n");
        assert_eq!(rig.read("remaining_time")?, "-1\n");
        assert_eq!(
            rig.activation.supervisor().latch_state(),
            LatchState::Stopped(StopCause::ClockLost)
        );
        Ok(())
    }

    /// Scenario: a running clock keeps supervision armed
    #[test]
    fn scenario_running_clock_stays_armed() -> TestResult {
        let rig = Rig::given_period(60)?;
        rig.board.toggle_on_read(CLOCK, true);

        assert_eq!(rig.read("clock")?, "1\n");
        assert!(!rig.activation.supervisor().is_stopped());
        Ok(())
    }

    /// Scenario: a single edge within the sample window counts as present
    #[test]
    fn scenario_single_late_edge_is_present() -> TestResult {
        let rig = Rig::given_period(60)?;
        rig.board.script(CLOCK, [Level::Low, Level::Low, Level::High]);

        assert_eq!(rig.read("clock")?, "1\n");
        assert!(!rig.activation.supervisor().is_stopped());
        Ok(())
    }

    /// Scenario: the clock check takes two sample intervals
    #[test]
    fn scenario_clock_check_spans_two_intervals() -> TestResult {
        let rig = Rig::given_period(60)?;
        rig.board.toggle_on_read(CLOCK, true);

        let before = rig.clock.now_millis();
        rig.read("clock")?;
        assert_eq!(rig.clock.now_millis() - before, 800);
        Ok(())
    }

    /// Scenario: the first cause is kept until re-arm
    #[test]
    fn scenario_first_cause_is_kept() -> TestResult {
        let rig = Rig::given_period(60)?;

        rig.board.set_level(INHIBIT, Level::High);
        rig.read("inhib")?;
        rig.read("clock")?;

        assert_eq!(
            rig.activation.supervisor().latch_state(),
            LatchState::Stopped(StopCause::Inhibited)
        );
        Ok(())
    }
}

mod trig_write_scenarios {
    use super::*;

    /// Scenario: the ASCII code of '1' also re-arms
    #[test]
    fn scenario_ascii_one_rearms() -> TestResult {
        let rig = Rig::given_period(60)?;
        rig.board.set_level(INHIBIT, Level::High);
        rig.read("inhib")?;
        rig.board.set_level(INHIBIT, Level::Low);

        rig.clock.set_secs(40);
        assert_eq!(rig.write("trig", b"49")?, 2);

        assert!(!rig.activation.supervisor().is_stopped());
        assert_eq!(rig.read("remaining_time")?, "60\n");
        Ok(())
    }

    /// Scenario: other integers are accepted and ignored
    #[test]
    fn scenario_other_values_are_noops() -> TestResult {
        let rig = Rig::given_period(60)?;
        rig.board.set_level(INHIBIT, Level::High);
        rig.read("inhib")?;
        rig.board.set_level(INHIBIT, Level::Low);
        rig.clock.set_secs(10);

        let payloads: [&[u8]; 4] = [b"0", b"5\n", b"-1", b"2"];
        for payload in payloads {
            assert_eq!(rig.write("trig", payload)?, payload.len());
        }

        let supervisor = rig.activation.supervisor();
        assert!(supervisor.is_stopped());
        assert_eq!(supervisor.last_trigger_secs(), 0);
        assert_eq!(supervisor.metrics().ignored_writes, 4);
        Ok(())
    }

    /// Scenario: malformed writes are rejected without side effects
    #[test]
    fn scenario_malformed_write_rejected() -> TestResult {
        let rig = Rig::given_period(60)?;
        rig.clock.set_secs(10);

        let result = rig.write("trig", b"yes");
        assert!(matches!(result, Err(SupervisorError::MalformedInput(_))));
        assert_eq!(result.err().map(|e| e.errno()), Some(libc::EINVAL));

        let supervisor = rig.activation.supervisor();
        assert_eq!(supervisor.last_trigger_secs(), 0);
        assert_eq!(supervisor.metrics().rejected_writes, 1);
        assert_eq!(supervisor.metrics().trigger_count, 1);
        Ok(())
    }

    /// Scenario: endpoints reject access against their direction
    #[test]
    fn scenario_wrong_direction_is_denied() -> TestResult {
        let rig = Rig::given_period(60)?;

        assert!(matches!(
            rig.read("trig"),
            Err(SupervisorError::PermissionDenied { endpoint: "trig", .. })
        ));
        assert!(matches!(
            rig.write("remaining_time", b"1"),
            Err(SupervisorError::PermissionDenied { .. })
        ));
        assert!(matches!(
            rig.read("period"),
            Err(SupervisorError::NotFound(_))
        ));
        Ok(())
    }
}
