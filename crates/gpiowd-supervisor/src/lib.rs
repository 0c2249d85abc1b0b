//! # gpiowd-supervisor
//!
//! Supervisor for an external hardware watchdog wired to three digital lines.
//!
//! The watchdog chip runs a free-running clock, exposes an inhibit line and
//! expects periodic pulses on a trigger line. This crate provides:
//! - `WatchdogSupervisor`, owning the lines, the sticky halt latch and the
//!   last-trigger timestamp
//! - An endpoint group (`inhib`, `clock`, `remaining_time`, `trig`) behind the
//!   `EndpointHandler` trait, published through an `EndpointHost`
//! - `LineProvider`, `MonotonicClock` and `Delay` seams for the platform
//! - A `sim` backend for tests and hardware-free environments
//!
//! ## Halt Latch
//!
//! ```text
//!                 inhibit active / clock not toggling
//!  ┌─────────┐ ─────────────────────────────────────► ┌──────────────────┐
//!  │  Armed  │                                        │ Stopped(cause)   │
//!  └─────────┘ ◄───────────────────────────────────── └──────────────────┘
//!                     write 1 (or '1') to trig
//! ```
//!
//! While stopped, `remaining_time` reads `-1`. Only a manual re-arm clears
//! the latch, whatever the lines read afterwards.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use gpiowd_supervisor::prelude::*;
//!
//! let board = SimLineProvider::new();
//! let clock = Arc::new(ManualClock::new());
//! let supervisor =
//!     WatchdogSupervisor::activate(&board, &SupervisorConfig::new(1, 2, 3, 60), Timebase::manual(&clock))?;
//!
//! board.set_level(2, Level::High);
//! assert_eq!(supervisor.show(Endpoint::RemainingTime)?, "-1\n");
//!
//! board.set_level(2, Level::Low);
//! supervisor.store(Endpoint::Trig, b"1\n")?;
//! assert_eq!(supervisor.show(Endpoint::RemainingTime)?, "60\n");
//! # Ok::<(), SupervisorError>(())
//! ```

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::panic,
    missing_docs,
    missing_debug_implementations
)]
#![warn(clippy::pedantic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod activation;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod latch;
pub mod line;
pub mod metrics;
pub mod prelude;
pub mod sim;
pub mod supervisor;
pub mod time;

pub use activation::Activation;
pub use config::{ResolvedConfig, SupervisorConfig, SupervisorConfigBuilder};
pub use endpoint::{Endpoint, EndpointHandler, EndpointHost, GROUP_NAME};
pub use error::{SupervisorError, SupervisorResult};
pub use latch::{Latch, LatchState, StopCause};
pub use line::{DigitalLine, Direction, Level, LineError, LineId, LineProvider};
pub use metrics::SupervisorMetrics;
pub use supervisor::{HALTED_SENTINEL, StatusSnapshot, WatchdogSupervisor};
pub use time::{Delay, MonotonicClock, SystemClock, ThreadDelay, Timebase};
