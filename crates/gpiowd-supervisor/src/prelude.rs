//! Prelude for gpiowd-supervisor.
//!
//! Re-exports the types needed to activate and drive a supervisor.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use gpiowd_supervisor::prelude::*;
//!
//! let clock = Arc::new(ManualClock::new());
//! let config = SupervisorConfig::builder()
//!     .clock_line(17)
//!     .inhibit_line(27)
//!     .trigger_line(22)
//!     .period_secs(30)
//!     .build()?;
//! let supervisor = WatchdogSupervisor::activate(&SimLineProvider::new(), &config, Timebase::manual(&clock))?;
//! assert!(!supervisor.is_stopped());
//! # Ok::<(), SupervisorError>(())
//! ```

pub use crate::activation::Activation;
pub use crate::config::{SupervisorConfig, SupervisorConfigBuilder};
pub use crate::endpoint::{Endpoint, EndpointHandler, EndpointHost, GROUP_NAME};
pub use crate::error::{SupervisorError, SupervisorResult};
pub use crate::latch::{LatchState, StopCause};
pub use crate::line::{DigitalLine, Direction, Level, LineError, LineId, LineProvider};
pub use crate::metrics::SupervisorMetrics;
pub use crate::sim::{ManualClock, SimEndpointHost, SimLineProvider};
pub use crate::supervisor::{HALTED_SENTINEL, StatusSnapshot, WatchdogSupervisor};
pub use crate::time::Timebase;
