//! Nonce pool for sponsor accounts.
//!
//! Hands out exactly-once nonces across `N` sponsor accounts, round-robin.
//! Every operation is a read-modify-write of one [`PoolState`] record under a
//! pool-wide lock; the lock is never held across I/O other than the store
//! write itself.

mod state;
mod store;
mod sweep;

pub use state::{NonceSeed, Outcome, PoolState, Reservation};
pub use store::{FileStore, MemoryStore, StateStore};
pub use sweep::run_reservation_sweeper;

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Nonce pool failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The selected sponsor already has `limit` unconfirmed nonces in flight.
    ExhaustedPool { sponsor_index: usize, limit: usize },
    /// `resolve` against a pool that was never initialized.
    UnknownSponsorState,
    /// Empty `available` after bootstrap. Always a defect.
    NoNonceAvailable { sponsor_index: usize },
    /// The selected sponsor has no nonces and no watermark; the caller must
    /// supply its on-chain nonce as a seed.
    ColdSponsor { sponsor_index: usize },
    UnknownSponsor { sponsor_index: usize, sponsors: usize },
    /// Stored record was written for a different number of sponsors.
    SponsorCountMismatch { stored: usize, configured: usize },
    Invariant(String),
    Storage(String),
}

impl PoolError {
    /// Defects that must never occur given the pool algorithm.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PoolError::NoNonceAvailable { .. } | PoolError::Invariant(_))
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::ExhaustedPool { sponsor_index, limit } => write!(
                f,
                "sponsor {sponsor_index} has {limit} unconfirmed transactions in flight"
            ),
            PoolError::UnknownSponsorState => write!(f, "nonce pool was never initialized"),
            PoolError::NoNonceAvailable { sponsor_index } => {
                write!(f, "no nonce available for sponsor {sponsor_index}")
            }
            PoolError::ColdSponsor { sponsor_index } => {
                write!(f, "sponsor {sponsor_index} needs a starting nonce")
            }
            PoolError::UnknownSponsor {
                sponsor_index,
                sponsors,
            } => write!(f, "sponsor index {sponsor_index} out of range (0..{sponsors})"),
            PoolError::SponsorCountMismatch { stored, configured } => write!(
                f,
                "stored pool has {stored} sponsors but {configured} are configured"
            ),
            PoolError::Invariant(msg) => write!(f, "nonce pool invariant violated: {msg}"),
            PoolError::Storage(msg) => write!(f, "nonce pool storage: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Diagnostics view of one sponsor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorSnapshot {
    pub index: usize,
    pub available: usize,
    pub reserved: usize,
    pub high_watermark: Option<u64>,
    pub next_nonce: Option<u64>,
    pub reserved_nonces: Vec<u64>,
}

/// Read-only `getState()` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub initialized: bool,
    pub chaining_limit: usize,
    pub next_sponsor_index: usize,
    pub sponsors: Vec<SponsorSnapshot>,
}

impl PoolSnapshot {
    pub fn total_available(&self) -> usize {
        self.sponsors.iter().map(|s| s.available).sum()
    }

    pub fn total_reserved(&self) -> usize {
        self.sponsors.iter().map(|s| s.reserved).sum()
    }
}

/// The pool service. One instance per network.
pub struct NoncePool {
    sponsors: usize,
    chaining_limit: usize,
    store: Arc<dyn StateStore>,
    /// Write-through copy of the stored record; `None` until first use.
    state: Mutex<Option<PoolState>>,
}

impl NoncePool {
    pub fn new(sponsors: usize, chaining_limit: usize, store: Arc<dyn StateStore>) -> Self {
        info!(sponsors, chaining_limit, "Nonce pool initialized");
        Self {
            sponsors,
            chaining_limit,
            store,
            state: Mutex::new(None),
        }
    }

    pub fn sponsor_count(&self) -> usize {
        self.sponsors
    }

    pub fn chaining_limit(&self) -> usize {
        self.chaining_limit
    }

    /// Check out the next nonce, round-robin across sponsors.
    ///
    /// A cold sponsor yields [`PoolError::ColdSponsor`]; retry with a
    /// [`NonceSeed`] carrying that sponsor's on-chain nonce.
    pub fn reserve_next(&self, seed: Option<NonceSeed>) -> Result<Reservation, PoolError> {
        let chaining_limit = self.chaining_limit;
        let reservation =
            self.transact(true, |state| state.reserve(chaining_limit, seed, now_secs()))?;
        debug!(
            sponsor_index = reservation.sponsor_index,
            nonce = reservation.nonce,
            "Nonce reserved"
        );
        Ok(reservation)
    }

    /// Return a reservation. Unknown `(sponsor, nonce)` pairs are a no-op.
    pub fn resolve(
        &self,
        sponsor_index: usize,
        nonce: u64,
        outcome: Outcome,
    ) -> Result<(), PoolError> {
        let released =
            self.transact(false, |state| state.release(sponsor_index, nonce, &outcome))?;
        if released {
            match &outcome {
                Outcome::Used(txid) => debug!(sponsor_index, nonce, txid = %txid, "Nonce consumed"),
                Outcome::Unused => debug!(sponsor_index, nonce, "Nonce returned to pool"),
            }
        } else {
            debug!(sponsor_index, nonce, "Resolve of unreserved nonce ignored");
        }
        Ok(())
    }

    /// Resolve every reservation older than `ttl_secs` as unused.
    pub fn sweep_stale(&self, ttl_secs: u64) -> Result<Vec<Reservation>, PoolError> {
        let now = now_secs();
        let swept = self.transact(false, |state| {
            let stale = state.stale_reservations(now, ttl_secs);
            for r in &stale {
                state.release(r.sponsor_index, r.nonce, &Outcome::Unused)?;
            }
            Ok(stale)
        });
        match swept {
            Err(PoolError::UnknownSponsorState) => Ok(Vec::new()),
            other => other,
        }
    }

    pub fn snapshot(&self) -> Result<PoolSnapshot, PoolError> {
        let mut guard = self.lock();
        self.ensure_loaded(&mut guard)?;

        let Some(state) = guard.as_ref() else {
            return Ok(PoolSnapshot {
                initialized: false,
                chaining_limit: self.chaining_limit,
                next_sponsor_index: 0,
                sponsors: (0..self.sponsors)
                    .map(|index| SponsorSnapshot {
                        index,
                        available: 0,
                        reserved: 0,
                        high_watermark: None,
                        next_nonce: None,
                        reserved_nonces: Vec::new(),
                    })
                    .collect(),
            });
        };

        Ok(PoolSnapshot {
            initialized: true,
            chaining_limit: self.chaining_limit,
            next_sponsor_index: state.next_sponsor_index,
            sponsors: (0..state.sponsor_count())
                .map(|index| SponsorSnapshot {
                    index,
                    available: state.available[index].len(),
                    reserved: state.reserved[index].len(),
                    high_watermark: state.high_watermark[index],
                    next_nonce: state.available[index].first().copied(),
                    reserved_nonces: state.reserved[index].clone(),
                })
                .collect(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PoolState>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_loaded(&self, slot: &mut Option<PoolState>) -> Result<(), PoolError> {
        if slot.is_some() {
            return Ok(());
        }
        let Some(mut stored) = self.store.load()? else {
            return Ok(());
        };
        if stored.sponsor_count() != self.sponsors {
            return Err(PoolError::SponsorCountMismatch {
                stored: stored.sponsor_count(),
                configured: self.sponsors,
            });
        }
        stored.normalize();
        stored.verify().inspect_err(|e| {
            error!(error = %e, "Stored nonce pool record is corrupt");
        })?;
        *slot = Some(stored);
        Ok(())
    }

    /// Run `op` against a copy of the state; commit and persist only if it
    /// succeeds and every invariant still holds.
    fn transact<T>(
        &self,
        create: bool,
        op: impl FnOnce(&mut PoolState) -> Result<T, PoolError>,
    ) -> Result<T, PoolError> {
        let mut guard = self.lock();
        self.ensure_loaded(&mut guard)?;

        let mut next = match guard.as_ref() {
            Some(state) => state.clone(),
            None if create => {
                if self.sponsors == 0 {
                    return Err(PoolError::Invariant("pool has no sponsors".into()));
                }
                PoolState::new(self.sponsors)
            }
            None => return Err(PoolError::UnknownSponsorState),
        };

        let out = op(&mut next).inspect_err(|e| {
            if e.is_fatal() {
                error!(error = %e, "Nonce pool defect");
            }
        })?;

        if let Err(e) = next
            .verify()
            .and_then(|()| next.check_growth(guard.as_ref(), self.chaining_limit))
        {
            error!(error = %e, "Nonce pool defect, transition discarded");
            return Err(e);
        }
        if guard.as_ref() == Some(&next) {
            return Ok(out);
        }

        self.store.save(&next).inspect_err(|e| {
            warn!(error = %e, "Nonce pool persist failed, transition discarded");
        })?;
        *guard = Some(next);
        Ok(out)
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
