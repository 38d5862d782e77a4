//! Sponsorship orchestration: policy → reservation → sign → broadcast → resolve.
//!
//! Steps before the reservation fail fast with nothing to undo. From the
//! reservation on, a [`ReservationGuard`] owns the nonce: it is resolved
//! exactly once, explicitly via [`ReservationGuard::settle`] or as unused
//! when the guard drops (error path or cancelled request).

use crate::collaborators::{BroadcastOutcome, Collaborators, SponsorOrder};
use crate::metrics::METRICS;
use crate::nonce_pool::{NoncePool, NonceSeed, Outcome, PoolError, Reservation};
use crate::Error;
use sponsor_policy::{Network, PolicyParams, PolicyResult, ProgramRegistry, SponsorshipProgram};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Fee policy and nonce toggles.
#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    pub max_fee: u64,
    pub dev_mode: bool,
    pub nonce_management: bool,
}

/// Sponsor accounts of one network and the pool that nonces them.
pub struct SponsorAccounts {
    addresses: Vec<String>,
    pool: Arc<NoncePool>,
}

impl SponsorAccounts {
    pub fn new(addresses: Vec<String>, pool: Arc<NoncePool>) -> Result<Self, Error> {
        if addresses.is_empty() {
            return Err(Error::Config("a served network needs at least one sponsor".into()));
        }
        if addresses.len() != pool.sponsor_count() {
            return Err(Error::Config(format!(
                "{} sponsor addresses for a pool of {}",
                addresses.len(),
                pool.sponsor_count()
            )));
        }
        Ok(Self { addresses, pool })
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Fee line items are paid to this address.
    pub fn primary(&self) -> &str {
        &self.addresses[0]
    }

    pub fn pool(&self) -> &Arc<NoncePool> {
        &self.pool
    }
}

/// A decoded sponsorship request.
#[derive(Debug, Clone)]
pub struct SponsorRequest {
    pub tx: Vec<u8>,
    pub network: Network,
    pub declared_fee: Option<u128>,
}

/// Result of a successful sponsorship.
#[derive(Debug, Clone)]
pub struct Sponsored {
    pub txid: String,
    pub tx_hex: String,
    pub fee: u64,
    /// Raw oracle estimate, `None` when the oracle failed or was skipped.
    pub fee_estimate: Option<u64>,
    pub sponsor_index: usize,
    pub sponsor_address: String,
    /// `None` when nonce management is disabled.
    pub nonce: Option<u64>,
    pub policy: PolicyResult,
}

/// `min(estimate, max_fee)`; a missing estimate costs the cap.
pub fn capped_fee(estimate: Option<u64>, max_fee: u64) -> u64 {
    estimate.map_or(max_fee, |fee| fee.min(max_fee))
}

/// The sponsorship service.
pub struct Relay {
    programs: ProgramRegistry,
    networks: BTreeMap<Network, SponsorAccounts>,
    collaborators: Collaborators,
    settings: RelaySettings,
}

impl Relay {
    pub fn new(
        programs: ProgramRegistry,
        collaborators: Collaborators,
        settings: RelaySettings,
    ) -> Self {
        Self {
            programs,
            networks: BTreeMap::new(),
            collaborators,
            settings,
        }
    }

    /// Serve `network` with these sponsors.
    pub fn with_network(mut self, network: Network, accounts: SponsorAccounts) -> Self {
        info!(
            %network,
            sponsors = accounts.addresses.len(),
            primary = %accounts.primary(),
            "Network enabled"
        );
        self.networks.insert(network, accounts);
        self
    }

    pub fn programs(&self) -> &ProgramRegistry {
        &self.programs
    }

    pub fn settings(&self) -> RelaySettings {
        self.settings
    }

    pub fn networks(&self) -> impl Iterator<Item = (Network, &SponsorAccounts)> {
        self.networks.iter().map(|(n, a)| (*n, a))
    }

    pub fn accounts(&self, network: Network) -> Result<&SponsorAccounts, Error> {
        self.networks
            .get(&network)
            .ok_or_else(|| Error::UnsupportedNetwork(network.to_string()))
    }

    fn program(&self, name: &str) -> Result<&SponsorshipProgram, Error> {
        self.programs
            .get(name)
            .ok_or_else(|| Error::UnknownProgram(name.to_string()))
    }

    /// Decode and evaluate only. Never touches the pool.
    pub async fn check(&self, program: &str, request: &SponsorRequest) -> Result<PolicyResult, Error> {
        let policy = self.program(program)?;
        let accounts = self.accounts(request.network)?;
        let view = self.collaborators.codec.decode(&request.tx).await?;
        Ok(policy.evaluate(
            &view,
            &PolicyParams {
                declared_fee: request.declared_fee,
                sponsor_address: accounts.primary(),
                network: request.network,
            },
        ))
    }

    /// Full sponsorship protocol for one request.
    pub async fn sponsor(&self, program: &str, request: SponsorRequest) -> Result<Sponsored, Error> {
        let network = request.network;
        let accounts = self.accounts(network)?;

        let result = self.check(program, &request).await?;
        if !result.eligible() {
            debug!(program, %network, reason = %result.reason_code(), "Not sponsorable");
            return Err(Error::PolicyRejected(result));
        }

        let guard = if self.settings.nonce_management {
            let reservation = self.reserve(network, accounts).await?;
            Some(ReservationGuard::new(Arc::clone(&accounts.pool), reservation))
        } else {
            None
        };
        let sponsor_index = guard.as_ref().map_or(0, |g| g.reservation().sponsor_index);
        let nonce = guard.as_ref().map(|g| g.reservation().nonce);
        let sponsor_address = accounts.addresses[sponsor_index].clone();

        let fee_estimate = if self.settings.dev_mode {
            None
        } else {
            match self.collaborators.fees.estimate(&request.tx, network).await {
                Ok(fee) => Some(fee),
                Err(e) => {
                    METRICS.fee_estimate_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(%network, error = %e, max_fee = self.settings.max_fee, "Fee estimate failed, using cap");
                    None
                }
            }
        };
        let fee = if self.settings.dev_mode {
            0
        } else {
            capped_fee(fee_estimate, self.settings.max_fee)
        };

        let signed = self
            .collaborators
            .signer
            .sponsor(&SponsorOrder {
                tx: &request.tx,
                network,
                fee,
                nonce,
                sponsor_index,
                sponsor_address: &sponsor_address,
            })
            .await?;

        match self.collaborators.broadcaster.broadcast(&signed, network).await? {
            BroadcastOutcome::Accepted { txid } => {
                if let Some(guard) = guard {
                    if let Err(e) = guard.settle(Outcome::Used(txid.clone())) {
                        // Already on-chain; the reservation stays until swept.
                        error!(%network, %txid, error = %e, "Failed to record consumed nonce");
                    }
                }
                info!(program, %network, sponsor_index, ?nonce, fee, %txid, "Sponsored transaction broadcast");
                Ok(Sponsored {
                    txid,
                    tx_hex: signed.to_hex(),
                    fee,
                    fee_estimate,
                    sponsor_index,
                    sponsor_address,
                    nonce,
                    policy: result,
                })
            }
            BroadcastOutcome::Rejected {
                error,
                reason,
                reason_data,
                txid,
            } => {
                if let Some(guard) = guard {
                    guard.settle(Outcome::Unused)?;
                }
                warn!(program, %network, sponsor_index, ?nonce, %error, ?reason, "Broadcast rejected");
                Err(Error::BroadcastRejected {
                    error,
                    reason,
                    reason_data,
                    txid: txid.or(signed.txid),
                })
            }
        }
    }

    /// Reserve a nonce, seeding cold sponsors from the chain. The pool lock
    /// is released while the node is queried.
    async fn reserve(&self, network: Network, accounts: &SponsorAccounts) -> Result<Reservation, Error> {
        let mut seed = None;
        let mut last = PoolError::ColdSponsor { sponsor_index: 0 };
        for _ in 0..=accounts.addresses.len() {
            match accounts.pool.reserve_next(seed) {
                Err(PoolError::ColdSponsor { sponsor_index }) => {
                    let address = accounts.addresses.get(sponsor_index).ok_or(
                        PoolError::UnknownSponsor {
                            sponsor_index,
                            sponsors: accounts.addresses.len(),
                        },
                    )?;
                    let nonce = self.collaborators.nonces.account_nonce(address, network).await?;
                    METRICS.nonce_seeds.fetch_add(1, Ordering::Relaxed);
                    info!(%network, sponsor_index, nonce, "Seeding cold sponsor from chain");
                    seed = Some(NonceSeed { sponsor_index, nonce });
                    last = PoolError::ColdSponsor { sponsor_index };
                }
                Err(e) => {
                    if let PoolError::ExhaustedPool { sponsor_index, limit } = &e {
                        METRICS.pool_exhausted.fetch_add(1, Ordering::Relaxed);
                        warn!(%network, sponsor_index, limit, "Sponsor at chaining limit");
                    }
                    return Err(e.into());
                }
                Ok(reservation) => return Ok(reservation),
            }
        }
        Err(last.into())
    }
}

/// RAII owner of one reservation. Dropping it unresolved returns the nonce.
pub struct ReservationGuard {
    pool: Arc<NoncePool>,
    reservation: Reservation,
    settled: bool,
}

impl ReservationGuard {
    pub fn new(pool: Arc<NoncePool>, reservation: Reservation) -> Self {
        Self {
            pool,
            reservation,
            settled: false,
        }
    }

    pub fn reservation(&self) -> Reservation {
        self.reservation
    }

    pub fn settle(mut self, outcome: Outcome) -> Result<(), PoolError> {
        self.settled = true;
        let r = self.reservation;
        self.pool.resolve(r.sponsor_index, r.nonce, outcome)
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let r = self.reservation;
        METRICS.reservations_abandoned.fetch_add(1, Ordering::Relaxed);
        match self.pool.resolve(r.sponsor_index, r.nonce, Outcome::Unused) {
            Ok(()) => warn!(
                sponsor_index = r.sponsor_index,
                nonce = r.nonce,
                "Reservation released after failure"
            ),
            Err(e) => error!(
                sponsor_index = r.sponsor_index,
                nonce = r.nonce,
                error = %e,
                "Failed to release reservation"
            ),
        }
    }
}
