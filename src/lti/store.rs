//! Pending-launch store — one record per in-flight login attempt.
//!
//! Records are keyed by `state` and live in a `DashMap`. Consumption is the
//! map's atomic `remove`: of any number of concurrent callers presenting the
//! same `state`, exactly one gets the record and the rest observe nothing.
//! Expiry is checked on the consuming side, so a record past its deadline is
//! never handed out even if it was never physically deleted.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

/// One in-flight login attempt, created by the login initiator.
#[derive(Debug, Clone)]
pub struct PendingLaunch {
    /// CSRF binding returned by the platform unchanged
    pub state: String,
    /// Replay binding that must come back inside the signed token
    pub nonce: String,
    /// When the attempt was created
    pub created_at: Instant,
    /// Hard deadline after which the attempt is dead
    pub expires_at: Instant,
    /// Sub-resource inside the tool the caller ultimately wants
    pub target_url: Option<String>,
}

impl PendingLaunch {
    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory store of pending launches, keyed by `state`.
pub struct PendingLaunchStore {
    entries: DashMap<String, PendingLaunch>,
    ttl: Duration,
}

impl PendingLaunchStore {
    /// Create a store whose records expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Record a new login attempt.
    ///
    /// Opportunistically sweeps expired rows first; correctness never depends
    /// on the sweep since [`consume_if_valid`](Self::consume_if_valid) checks
    /// expiry itself.
    pub fn create(
        &self,
        state: impl Into<String>,
        nonce: impl Into<String>,
        target_url: Option<String>,
    ) -> PendingLaunch {
        self.sweep();

        let now = Instant::now();
        let pending = PendingLaunch {
            state: state.into(),
            nonce: nonce.into(),
            created_at: now,
            expires_at: now + self.ttl,
            target_url,
        };
        self.entries.insert(pending.state.clone(), pending.clone());
        pending
    }

    /// Atomically consume the record for `state`.
    ///
    /// Returns `None` when the record is missing, already consumed, or
    /// expired. Exactly one of any set of concurrent callers with the same
    /// `state` receives `Some`; the `remove` below is the single
    /// mutual-exclusion point of the whole launch path.
    pub fn consume_if_valid(&self, state: &str) -> Option<PendingLaunch> {
        let (_, pending) = self.entries.remove(state)?;

        if pending.is_expired() {
            debug!("Discarded expired pending launch");
            return None;
        }

        Some(pending)
    }

    /// Drop every expired record.
    fn sweep(&self) {
        self.entries.retain(|_, pending| !pending.is_expired());
    }

    /// Number of live records (tests and the health endpoint).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
