//! # Sponsor Relayer
//!
//! Pays network fees on behalf of callers. Each request is checked against a
//! named sponsorship program, given a nonce from a per-network pool of
//! sponsor accounts, countersigned by the remote signing service, and
//! broadcast. Nonces are never leaked: every reservation is resolved as used
//! or returned.
//!
//! ## Quick Start
//! ```bash
//! RELAYER_TESTNET_SPONSORS=ST1... cargo run --bin sponsor-relayer
//! ```
//!
//! ## Endpoints
//! - `POST /sponsor/{program}` - Sponsor and broadcast a transaction
//! - `POST /check/{program}` - Policy dry run
//! - `GET /status` - Programs and fee recipients
//! - `GET /nonces` - Nonce pool state per network
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics

pub mod collaborators;
pub mod config;
mod error;
mod handlers;
pub mod metrics;
pub mod middleware;
pub mod node;
pub mod nonce_pool;
pub mod response;
mod router;
pub mod schemas;
pub mod signing_service;
pub mod sponsor;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use collaborators::{
    BroadcastOutcome, Broadcaster, Collaborators, FeeOracle, NonceSource, SignedTransaction,
    SponsorOrder, SponsorSigner, TransactionCodec,
};
pub use config::Config;
pub use error::Error;
pub use nonce_pool::{NoncePool, PoolError, PoolSnapshot};
pub use router::create as create_router;
pub use sponsor::{Relay, RelaySettings, SponsorAccounts, SponsorRequest, Sponsored};
pub use state::AppState;
