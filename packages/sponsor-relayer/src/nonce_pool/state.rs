//! Persisted pool record and its pure state transitions.
//!
//! Arena layout: every per-sponsor field is a vector indexed by sponsor index,
//! so one record holds the whole pool and is saved in a single write.

use super::PoolError;
use serde::{Deserialize, Serialize};

/// How a reservation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Consumed on-chain. The txid is audit trail only.
    Used(String),
    /// Never reached the network; goes back to `available`.
    Unused,
}

/// Externally supplied starting nonce for a cold sponsor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceSeed {
    pub sponsor_index: usize,
    pub nonce: u64,
}

/// A nonce checked out of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub sponsor_index: usize,
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolState {
    pub next_sponsor_index: usize,
    pub available: Vec<Vec<u64>>,
    pub reserved: Vec<Vec<u64>>,
    /// Unix seconds at which each `reserved` entry was taken, same shape.
    #[serde(default)]
    pub reserved_at: Vec<Vec<u64>>,
    pub high_watermark: Vec<Option<u64>>,
}

impl PoolState {
    /// Fresh pool: every sponsor cold, cursor at 0.
    pub fn new(sponsors: usize) -> Self {
        Self {
            next_sponsor_index: 0,
            available: vec![Vec::new(); sponsors],
            reserved: vec![Vec::new(); sponsors],
            reserved_at: vec![Vec::new(); sponsors],
            high_watermark: vec![None; sponsors],
        }
    }

    pub fn sponsor_count(&self) -> usize {
        self.available.len()
    }

    /// Reserve the smallest available nonce of the sponsor under the cursor.
    pub fn reserve(
        &mut self,
        chaining_limit: usize,
        seed: Option<NonceSeed>,
        now: u64,
    ) -> Result<Reservation, PoolError> {
        let sponsors = self.sponsor_count();
        if sponsors == 0 {
            return Err(PoolError::Invariant("pool has no sponsors".into()));
        }
        let idx = self.next_sponsor_index;
        if idx >= sponsors {
            return Err(PoolError::Invariant(format!(
                "cursor {idx} out of range for {sponsors} sponsors"
            )));
        }

        if self.reserved[idx].len() >= chaining_limit {
            return Err(PoolError::ExhaustedPool {
                sponsor_index: idx,
                limit: chaining_limit,
            });
        }

        if self.available[idx].is_empty() {
            let start = match (self.high_watermark[idx], seed) {
                (Some(hw), _) => next_nonce(idx, hw)?,
                (None, Some(seed)) if seed.sponsor_index == idx => seed.nonce,
                (None, _) => return Err(PoolError::ColdSponsor { sponsor_index: idx }),
            };
            self.bootstrap(idx, start, chaining_limit)?;
        }

        if self.available[idx].is_empty() {
            return Err(PoolError::NoNonceAvailable { sponsor_index: idx });
        }

        let nonce = self.available[idx][0];
        let next = next_nonce(idx, self.high_watermark[idx].map_or(nonce, |hw| hw.max(nonce)))?;
        self.available[idx].remove(0);
        // Keep the window at constant size.
        self.available[idx].push(next);
        self.high_watermark[idx] = Some(next);

        self.reserved[idx].push(nonce);
        self.reserved_at[idx].push(now);
        self.next_sponsor_index = (idx + 1) % sponsors;

        Ok(Reservation {
            sponsor_index: idx,
            nonce,
        })
    }

    fn bootstrap(&mut self, idx: usize, start: u64, chaining_limit: usize) -> Result<(), PoolError> {
        let count = chaining_limit.max(1) as u64;
        let end = start.checked_add(count).ok_or_else(|| {
            PoolError::Invariant(format!("sponsor {idx}: nonce window from {start} overflows"))
        })?;
        self.available[idx] = (start..end).collect();
        self.high_watermark[idx] = Some(end - 1);
        Ok(())
    }

    /// Idempotent: resolving a nonce that is not reserved is a no-op and
    /// returns `false`.
    pub fn release(
        &mut self,
        sponsor_index: usize,
        nonce: u64,
        outcome: &Outcome,
    ) -> Result<bool, PoolError> {
        if sponsor_index >= self.sponsor_count() {
            return Err(PoolError::UnknownSponsor {
                sponsor_index,
                sponsors: self.sponsor_count(),
            });
        }

        let Some(pos) = self.reserved[sponsor_index].iter().position(|n| *n == nonce) else {
            return Ok(false);
        };
        self.reserved[sponsor_index].remove(pos);
        if pos < self.reserved_at[sponsor_index].len() {
            self.reserved_at[sponsor_index].remove(pos);
        }

        if *outcome == Outcome::Unused {
            let available = &mut self.available[sponsor_index];
            let at = available.partition_point(|n| *n < nonce);
            available.insert(at, nonce);
        }
        Ok(true)
    }

    /// Reservations older than `ttl_secs`, oldest first per sponsor.
    pub fn stale_reservations(&self, now: u64, ttl_secs: u64) -> Vec<Reservation> {
        let mut stale = Vec::new();
        for (sponsor_index, nonces) in self.reserved.iter().enumerate() {
            let taken = self.reserved_at.get(sponsor_index);
            for (pos, nonce) in nonces.iter().enumerate() {
                // Entries without a timestamp predate the sweeper; treat as taken at 0.
                let at = taken.and_then(|t| t.get(pos)).copied().unwrap_or(0);
                if now.saturating_sub(at) >= ttl_secs {
                    stale.push(Reservation {
                        sponsor_index,
                        nonce: *nonce,
                    });
                }
            }
        }
        stale
    }

    /// Bring records written before `reservedAt` existed up to shape.
    pub(crate) fn normalize(&mut self) {
        let sponsors = self.sponsor_count();
        self.reserved_at.resize(sponsors, Vec::new());
        for (taken, reserved) in self.reserved_at.iter_mut().zip(&self.reserved) {
            taken.resize(reserved.len(), 0);
        }
    }

    /// A sponsor may sit above `chaining_limit` only when it already did in
    /// `before` (the limit was lowered across a restart). It must never grow
    /// past it.
    pub fn check_growth(
        &self,
        before: Option<&PoolState>,
        chaining_limit: usize,
    ) -> Result<(), PoolError> {
        for (idx, reserved) in self.reserved.iter().enumerate() {
            let prior = before
                .and_then(|b| b.reserved.get(idx))
                .map_or(0, Vec::len);
            if reserved.len() > chaining_limit && reserved.len() > prior {
                return Err(PoolError::Invariant(format!(
                    "sponsor {idx}: {} reserved exceeds chaining limit {chaining_limit}",
                    reserved.len()
                )));
            }
        }
        Ok(())
    }

    /// Checks every structural invariant of the pool. The chaining limit is
    /// not one of them: see [`PoolState::check_growth`].
    pub fn verify(&self) -> Result<(), PoolError> {
        let n = self.sponsor_count();
        if self.reserved.len() != n || self.reserved_at.len() != n || self.high_watermark.len() != n
        {
            return Err(PoolError::Invariant("per-sponsor arrays differ in length".into()));
        }
        if n > 0 && self.next_sponsor_index >= n {
            return Err(PoolError::Invariant(format!(
                "cursor {} out of range",
                self.next_sponsor_index
            )));
        }

        for idx in 0..n {
            let available = &self.available[idx];
            let reserved = &self.reserved[idx];

            if available.windows(2).any(|w| w[0] >= w[1]) {
                return Err(PoolError::Invariant(format!(
                    "sponsor {idx}: available not strictly ascending"
                )));
            }
            if self.reserved_at[idx].len() != reserved.len() {
                return Err(PoolError::Invariant(format!(
                    "sponsor {idx}: reservation timestamps out of step"
                )));
            }
            if let Some(dup) = reserved.iter().find(|r| available.binary_search(r).is_ok()) {
                return Err(PoolError::Invariant(format!(
                    "sponsor {idx}: nonce {dup} both available and reserved"
                )));
            }
            let highest = available.iter().chain(reserved).max();
            match (highest, self.high_watermark[idx]) {
                (None, _) => {}
                (Some(top), Some(hw)) if *top <= hw => {}
                (Some(top), hw) => {
                    return Err(PoolError::Invariant(format!(
                        "sponsor {idx}: nonce {top} above watermark {hw:?}"
                    )))
                }
            }
        }
        Ok(())
    }
}

fn next_nonce(idx: usize, nonce: u64) -> Result<u64, PoolError> {
    nonce
        .checked_add(1)
        .ok_or_else(|| PoolError::Invariant(format!("sponsor {idx}: nonce space exhausted")))
}
