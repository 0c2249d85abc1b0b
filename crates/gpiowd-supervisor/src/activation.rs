//! Activation lifecycle: supervisor first, endpoints second; teardown in reverse.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::SupervisorConfig;
use crate::endpoint::{EndpointHandler, EndpointHost, GROUP_NAME};
use crate::error::SupervisorResult;
use crate::line::{DigitalLine, LineProvider};
use crate::supervisor::WatchdogSupervisor;
use crate::time::Timebase;

/// An activated supervisor together with its endpoint registration.
///
/// Fields drop in declaration order: the registration goes first so that no
/// endpoint stays reachable once the lines are released.
pub struct Activation<L: DigitalLine, R> {
    registration: R,
    supervisor: Arc<WatchdogSupervisor<L>>,
}

impl<L: DigitalLine + 'static, R> Activation<L, R> {
    /// Activate the supervisor, then publish its endpoint group on `host`.
    ///
    /// If registration fails the supervisor is dropped before returning,
    /// releasing all lines.
    ///
    /// # Errors
    ///
    /// Returns any activation error from [`WatchdogSupervisor::activate`], or
    /// [`crate::SupervisorError::Registration`] from the host.
    pub fn activate<P, H>(
        provider: &P,
        config: &SupervisorConfig,
        timebase: Timebase,
        host: &mut H,
    ) -> SupervisorResult<Self>
    where
        P: LineProvider<Line = L>,
        H: EndpointHost<Registration = R>,
    {
        let supervisor = Arc::new(WatchdogSupervisor::activate(provider, config, timebase)?);
        let handler: Arc<dyn EndpointHandler> = supervisor.clone();

        let registration = host.register(GROUP_NAME, handler).inspect_err(|e| {
            error!(group = GROUP_NAME, error = %e, "Endpoint group registration failed");
        })?;
        info!(group = GROUP_NAME, "Endpoint group registered");

        Ok(Self {
            registration,
            supervisor,
        })
    }

    /// The activated supervisor.
    #[must_use]
    pub fn supervisor(&self) -> &Arc<WatchdogSupervisor<L>> {
        &self.supervisor
    }

    /// The host registration guard.
    #[must_use]
    pub fn registration(&self) -> &R {
        &self.registration
    }

    /// Split into parts for hosts whose teardown is asynchronous. The caller
    /// takes over the ordering contract: close the registration first.
    #[must_use]
    pub fn into_parts(self) -> (R, Arc<WatchdogSupervisor<L>>) {
        (self.registration, self.supervisor)
    }

    /// Remove the endpoint group, then release the lines.
    pub fn deactivate(self) {
        let Self {
            registration,
            supervisor,
        } = self;
        drop(registration);
        info!(group = GROUP_NAME, "Endpoint group removed");
        drop(supervisor);
    }
}

impl<L: DigitalLine, R> std::fmt::Debug for Activation<L, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Activation")
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}
