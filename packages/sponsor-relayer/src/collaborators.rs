//! External collaborators the orchestrator drives.
//!
//! The relay never touches transaction bytes or key material itself: decoding,
//! fee estimation, countersigning and broadcast all sit behind these traits.

use crate::Error;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sponsor_policy::{Network, TransactionView};
use std::sync::Arc;

/// Wire bytes → read-only view for the policy engine.
#[async_trait]
pub trait TransactionCodec: Send + Sync {
    async fn decode(&self, tx: &[u8]) -> Result<TransactionView, Error>;
}

#[async_trait]
pub trait FeeOracle: Send + Sync {
    /// Network fee estimate in micro-STX. May fail; the caller caps or falls back.
    async fn estimate(&self, tx: &[u8], network: Network) -> Result<u64, Error>;
}

/// Everything the signer needs to countersign as sponsor.
#[derive(Debug, Clone, Copy)]
pub struct SponsorOrder<'a> {
    pub tx: &'a [u8],
    pub network: Network,
    pub fee: u64,
    /// `None` lets the signer choose (nonce management disabled).
    pub nonce: Option<u64>,
    pub sponsor_index: usize,
    pub sponsor_address: &'a str,
}

#[async_trait]
pub trait SponsorSigner: Send + Sync {
    async fn sponsor(&self, order: &SponsorOrder<'_>) -> Result<SignedTransaction, Error>;
}

#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(
        &self,
        tx: &SignedTransaction,
        network: Network,
    ) -> Result<BroadcastOutcome, Error>;
}

/// On-chain account nonce, used to seed a cold sponsor.
#[async_trait]
pub trait NonceSource: Send + Sync {
    async fn account_nonce(&self, address: &str, network: Network) -> Result<u64, Error>;
}

/// A fully signed sponsored transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub bytes: Vec<u8>,
    /// Known before broadcast when the signer reports it.
    pub txid: Option<String>,
}

impl SignedTransaction {
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

/// Node verdict on a broadcast. `Rejected` is tried first: an accepted
/// body carries only the txid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BroadcastOutcome {
    Rejected {
        error: String,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        reason_data: Option<Value>,
        #[serde(default)]
        txid: Option<String>,
    },
    Accepted {
        txid: String,
    },
}

/// The full collaborator set, injected into [`crate::Relay`].
#[derive(Clone)]
pub struct Collaborators {
    pub codec: Arc<dyn TransactionCodec>,
    pub fees: Arc<dyn FeeOracle>,
    pub signer: Arc<dyn SponsorSigner>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub nonces: Arc<dyn NonceSource>,
}
