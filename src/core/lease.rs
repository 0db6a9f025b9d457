//! Fail-fast mutual exclusion backed by the coordination store.
//!
//! A [`LeaseLock`] owns at most one live lease at a time. While held, a watchdog task
//! re-extends the key on a cadence of half the initial TTL, but only through
//! compare-and-extend, and never past `max_ttl` measured from acquisition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::coordination::{CoordinationError, CoordinationStore};

const MIN_RENEWAL_PERIOD: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub(crate) enum LeaseError {
    #[error("lease {0} is already held")]
    AlreadyHeld(String),
    #[error("lease {0} is no longer owned by this holder")]
    NotOwner(String),
    #[error("lease {0} expired before it was released")]
    AlreadyExpired(String),
    #[error(transparent)]
    Store(#[from] CoordinationError),
}

pub(crate) struct LeaseLock {
    store: Arc<dyn CoordinationStore>,
    key: String,
    initial_ttl: Duration,
    max_ttl: Duration,
    state: LeaseState,
}

enum LeaseState {
    Idle,
    Held(HeldLease),
    Released { expired: bool },
}

struct HeldLease {
    token: String,
    acquired_at: Instant,
    lost: Arc<AtomicBool>,
    watchdog: CancellationToken,
    handle: JoinHandle<()>,
}

impl HeldLease {
    fn is_expired(&self, max_ttl: Duration) -> bool {
        self.lost.load(Ordering::SeqCst) || self.acquired_at.elapsed() > max_ttl
    }
}

impl Drop for HeldLease {
    fn drop(&mut self) {
        self.watchdog.cancel();
        self.handle.abort();
    }
}

impl LeaseLock {
    pub(crate) fn new(
        store: Arc<dyn CoordinationStore>,
        key: impl Into<String>,
        initial_ttl: Duration,
        max_ttl: Duration,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            initial_ttl,
            max_ttl: max_ttl.max(initial_ttl),
            state: LeaseState::Idle,
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// Attempts a single set-if-absent; never waits for the current holder.
    pub(crate) async fn lock(&mut self) -> Result<(), LeaseError> {
        if let LeaseState::Held(held) = &self.state {
            if !held.is_expired(self.max_ttl) {
                return Ok(());
            }
        }

        let token = Uuid::new_v4().to_string();
        let acquired_at = Instant::now();
        let acquired = self
            .store
            .set_if_absent(&self.key, &token, self.initial_ttl.min(self.max_ttl))
            .await?;

        if !acquired {
            return Err(LeaseError::AlreadyHeld(self.key.clone()));
        }

        let lost = Arc::new(AtomicBool::new(false));
        let watchdog = CancellationToken::new();
        let handle = tokio::spawn(renew_until_released(Renewal {
            store: self.store.clone(),
            key: self.key.clone(),
            token: token.clone(),
            initial_ttl: self.initial_ttl,
            max_ttl: self.max_ttl,
            acquired_at,
            lost: lost.clone(),
            cancel: watchdog.clone(),
        }));

        tracing::debug!(key = %self.key, "Lease acquired");
        self.state = LeaseState::Held(HeldLease { token, acquired_at, lost, watchdog, handle });
        Ok(())
    }

    /// Stops renewal and deletes the key if it still carries this holder's token.
    pub(crate) async fn unlock(&mut self) -> Result<(), LeaseError> {
        let held = match std::mem::replace(&mut self.state, LeaseState::Idle) {
            LeaseState::Held(held) => held,
            other => {
                self.state = other;
                return Err(LeaseError::NotOwner(self.key.clone()));
            }
        };

        held.watchdog.cancel();
        let expired = held.is_expired(self.max_ttl);
        let token = held.token.clone();
        drop(held);
        self.state = LeaseState::Released { expired };

        let deleted = self.store.compare_and_delete(&self.key, &token).await?;
        if deleted {
            tracing::debug!(key = %self.key, "Lease released");
            return Ok(());
        }

        if expired {
            Err(LeaseError::AlreadyExpired(self.key.clone()))
        } else {
            Err(LeaseError::NotOwner(self.key.clone()))
        }
    }

    /// True once the hold outlived `max_ttl` or the watchdog saw another token in place.
    /// Stays meaningful after [`unlock`](Self::unlock) returns.
    pub(crate) fn expired(&self) -> bool {
        match &self.state {
            LeaseState::Idle => false,
            LeaseState::Held(held) => held.is_expired(self.max_ttl),
            LeaseState::Released { expired } => *expired,
        }
    }

    /// Re-checks ownership against the store right now instead of waiting for the next
    /// watchdog tick, extending the lease on success. A mismatch marks the lease lost.
    pub(crate) async fn confirm_held(&self) -> Result<bool, LeaseError> {
        let LeaseState::Held(held) = &self.state else {
            return Ok(false);
        };
        if held.is_expired(self.max_ttl) {
            return Ok(false);
        }

        let remaining = self.max_ttl.saturating_sub(held.acquired_at.elapsed());
        if remaining.is_zero() {
            return Ok(false);
        }
        let ttl = self.initial_ttl.min(remaining);
        if self.store.compare_and_extend(&self.key, &held.token, ttl).await? {
            return Ok(true);
        }

        held.lost.store(true, Ordering::SeqCst);
        tracing::warn!(key = %self.key, "Lease held by another owner at confirmation");
        Ok(false)
    }

    #[cfg(test)]
    pub(crate) fn renewing(&self) -> bool {
        matches!(&self.state, LeaseState::Held(held) if !held.handle.is_finished())
    }
}

struct Renewal {
    store: Arc<dyn CoordinationStore>,
    key: String,
    token: String,
    initial_ttl: Duration,
    max_ttl: Duration,
    acquired_at: Instant,
    lost: Arc<AtomicBool>,
    cancel: CancellationToken,
}

fn renewal_period(initial_ttl: Duration) -> Duration {
    (initial_ttl / 2).max(MIN_RENEWAL_PERIOD)
}

async fn renew_until_released(renewal: Renewal) {
    let period = renewal_period(renewal.initial_ttl);
    let mut ticker = interval_at(renewal.acquired_at + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = renewal.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let elapsed = renewal.acquired_at.elapsed();
        if elapsed >= renewal.max_ttl {
            tracing::warn!(key = %renewal.key, "Lease reached its maximum lifetime; renewal stopped");
            break;
        }

        let remaining = renewal.max_ttl - elapsed;
        let ttl = renewal.initial_ttl.min(remaining);
        match renewal.store.compare_and_extend(&renewal.key, &renewal.token, ttl).await {
            Ok(true) if remaining <= renewal.initial_ttl => {
                tracing::debug!(key = %renewal.key, "Lease extended to its ceiling; renewal stopped");
                break;
            }
            Ok(true) => {}
            Ok(false) => {
                renewal.lost.store(true, Ordering::SeqCst);
                metrics::counter!("lease_ownership_lost_total").increment(1);
                tracing::warn!(key = %renewal.key, "Lease ownership lost; renewal stopped");
                break;
            }
            Err(err) => {
                tracing::warn!(key = %renewal.key, error = %err, "Lease renewal failed");
            }
        }
    }
}
