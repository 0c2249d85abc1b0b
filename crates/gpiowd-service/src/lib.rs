//! gpiowd service
//!
//! Hosts the watchdog endpoint group on a Unix domain socket and provides the
//! matching client. The `gpiowdd` binary wires these together with the sysfs
//! backend (or the simulation backend with `--simulate`).

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod protocol;

pub use client::Client;
pub use config::{DEFAULT_CONFIG_PATH, DEFAULT_SOCKET_PATH, ServiceConfig};
pub use error::ServiceError;
pub use host::{SocketHost, SocketRegistration};
pub use logging::init_logging;
