//! # gpiowd-sysfs
//!
//! Linux sysfs GPIO backend for `gpiowd-supervisor`.
//!
//! Lines are exported through `<root>/export`, configured through
//! `<root>/gpioN/direction` and sampled or driven through `<root>/gpioN/value`.
//! Dropping a line handle writes its number to `<root>/unexport`.
//!
//! An export rejected with `EBUSY` (the line is owned elsewhere) is reported as
//! [`gpiowd_supervisor::LineError::Busy`].

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    missing_debug_implementations
)]
#![warn(clippy::pedantic)]

pub mod chip;
pub mod provider;

pub use chip::{ChipRange, scan_chips};
pub use provider::{DEFAULT_ROOT, MAX_GPIO, SysfsGpio, SysfsLine};
