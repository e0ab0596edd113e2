//! Connectivity monitoring
//!
//! A stateless reachability probe plus an exponential-backoff waiter. Every
//! other component calls [`ConnectivityMonitor::wait_for_recovery`] before it
//! declares a network-shaped failure fatal, so retry policies downstream can
//! assume connectivity was confirmed (or given up on) immediately prior.

mod backoff;
mod probe;

pub use backoff::{Backoff, BackoffPolicy};
pub use probe::TcpProbe;

use crate::config::ConnectivityConfig;
use std::time::Duration;

/// Probe plus backoff policy; cheap to clone, holds no mutable state
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    probe: TcpProbe,
    policy: BackoffPolicy,
}

impl ConnectivityMonitor {
    pub fn new(probe: TcpProbe, policy: BackoffPolicy) -> Self {
        Self { probe, policy }
    }

    pub fn from_config(config: &ConnectivityConfig) -> Self {
        Self::new(
            TcpProbe::new(
                config.probe_address.clone(),
                Duration::from_millis(config.probe_timeout_ms),
            ),
            BackoffPolicy {
                initial_delay: Duration::from_millis(config.initial_delay_ms),
                max_delay: Duration::from_millis(config.max_delay_ms),
                max_attempts: config.max_attempts,
            },
        )
    }

    /// Single reachability check
    pub async fn probe(&self) -> bool {
        self.probe.probe().await
    }

    /// Waits until the probe succeeds
    ///
    /// Sleeps between failed probes following the policy's exponential
    /// schedule. Returns `false` once `max_attempts` failed probes have
    /// been made; never gives up when no limit is configured.
    pub async fn wait_for_recovery(&self) -> bool {
        let mut backoff = Backoff::new(self.policy.clone());

        loop {
            if backoff.is_exhausted() {
                tracing::error!(
                    "Connectivity not restored after {} probes",
                    backoff.attempts()
                );
                return false;
            }

            if self.probe.probe().await {
                if backoff.attempts() > 0 {
                    tracing::info!(
                        "Connectivity restored after {} failed probes",
                        backoff.attempts()
                    );
                }
                backoff.reset();
                return true;
            }

            let Some(delay) = backoff.advance() else {
                continue;
            };
            tracing::warn!(
                probe = %self.probe.address(),
                "No connectivity. Waiting {:?} before the next probe",
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}
