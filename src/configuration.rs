//! Configuration handshake with a freshly started module.
//!
//! The only readiness signal of a module is it accepting its configuration, so the call is
//! retried a bounded number of times with a fixed delay.

use crate::endpoint::{ConfigurationPayload, ModuleEndpoint};
use crate::errors::LifecycleError;
use crate::oplog::OperationLog;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Suspends the current operation between attempts.
pub(crate) trait Sleeper {
    async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

impl<T: Sleeper> Sleeper for Arc<T> {
    async fn sleep(&self, duration: Duration) {
        self.as_ref().sleep(duration).await;
    }
}

#[derive(Debug)]
pub(crate) struct ConfigurationClient<E, Z> {
    endpoint: E,
    sleeper: Z,
    attempts: u32,
    delay: Duration,
}

impl<E: ModuleEndpoint, Z: Sleeper> ConfigurationClient<E, Z> {
    pub(crate) fn new(endpoint: E, sleeper: Z, attempts: u32, delay: Duration) -> Self {
        Self {
            endpoint,
            sleeper,
            attempts: attempts.max(1),
            delay,
        }
    }

    pub(crate) fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Hands a module its identity, retrying until it accepts or the attempts are used up.
    ///
    /// Every attempt is recorded in `log`. There is no delay after the last attempt.
    ///
    /// # Errors
    /// Returns [`LifecycleError::Handshake`] carrying the last attempt error if no attempt
    /// succeeded.
    #[instrument(skip(self, log))]
    pub(crate) async fn configure(
        &self,
        service_url: &str,
        id: &str,
        name: &str,
        port: u16,
        log: &mut OperationLog,
    ) -> Result<(), LifecycleError> {
        let payload = ConfigurationPayload {
            id: id.to_string(),
            name: name.to_string(),
            port,
        };

        let mut last_error = String::new();
        for attempt in 1..=self.attempts {
            match self.endpoint.post_configuration(service_url, &payload).await {
                Ok(()) => {
                    log.attempt(
                        attempt,
                        true,
                        format!("Module at {} accepted its configuration", service_url),
                    );
                    return Ok(());
                }
                Err(e) => {
                    last_error = e.to_string();
                    log.attempt(
                        attempt,
                        false,
                        format!(
                            "Attempt {}/{} to configure {} failed: {}",
                            attempt, self.attempts, service_url, last_error
                        ),
                    );
                }
            }
            if attempt < self.attempts {
                self.sleeper.sleep(self.delay).await;
            }
        }

        Err(LifecycleError::Handshake {
            attempts: self.attempts,
            last_error,
        })
    }
}
