//! Phase barrier shared by startup and shutdown.
//!
//! A barrier waits for a known number of participants to arrive. Unlike a
//! plain countdown, a participant can also fail the phase, which releases
//! every waiter with an error instead of leaving it blocked forever.

use std::time::Duration;
use tokio::sync::watch;

use crate::types::{Error, Result};

#[derive(Debug, Clone, Default)]
struct PhaseState {
    remaining: usize,
    failure: Option<String>,
}

/// Countdown barrier for one lifecycle phase.
#[derive(Debug)]
pub struct PhaseBarrier {
    phase: String,
    state: watch::Sender<PhaseState>,
}

impl PhaseBarrier {
    /// Barrier for `phase` expecting `expected` arrivals.
    pub fn new(phase: impl Into<String>, expected: usize) -> Self {
        let (state, _) = watch::channel(PhaseState {
            remaining: expected,
            failure: None,
        });
        Self {
            phase: phase.into(),
            state,
        }
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    /// Expect `n` more arrivals.
    pub fn add(&self, n: usize) {
        self.state.send_modify(|s| s.remaining += n);
    }

    /// Record one arrival.
    pub fn arrive(&self) {
        self.state.send_modify(|s| s.remaining = s.remaining.saturating_sub(1));
    }

    /// Fail the phase. The first failure wins; waiters are released.
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.state.send_modify(|s| {
            if s.failure.is_none() {
                s.failure = Some(reason);
            }
        });
    }

    /// Arrivals still outstanding.
    pub fn remaining(&self) -> usize {
        self.state.borrow().remaining
    }

    /// Block until every participant arrived or one of them failed.
    pub async fn wait(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        let failure = {
            let state = rx
                .wait_for(|s| s.remaining == 0 || s.failure.is_some())
                .await
                .map_err(|_| Error::internal(format!("{}: barrier closed", self.phase)))?;
            state.failure.clone()
        };
        match failure {
            Some(reason) => Err(Error::startup(self.phase.clone(), reason)),
            None => {
                tracing::debug!(phase = %self.phase, "barrier released");
                Ok(())
            }
        }
    }

    /// [`wait`](Self::wait) bounded by `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| {
                Error::timeout(format!(
                    "{}: {} participant(s) still outstanding after {:?}",
                    self.phase,
                    self.remaining(),
                    timeout
                ))
            })?
    }
}
