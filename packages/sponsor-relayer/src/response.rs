//! Response types for the relayer API.

use crate::nonce_pool::PoolSnapshot;
use crate::sponsor::Sponsored;
use serde::Serialize;
use sponsor_policy::{Network, PolicyResult, SponsorshipProgram};
use std::collections::BTreeMap;

/// Response from `/sponsor/{program}`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorResponse {
    pub success: bool,
    pub txid: String,
    /// Signed transaction, hex.
    pub tx: String,
    pub fee: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_estimate: Option<u64>,
    pub sponsor_index: usize,
    pub sponsor_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    pub policy: PolicyResult,
}

impl From<Sponsored> for SponsorResponse {
    fn from(s: Sponsored) -> Self {
        Self {
            success: true,
            txid: s.txid,
            tx: s.tx_hex,
            fee: s.fee,
            fee_estimate: s.fee_estimate,
            sponsor_index: s.sponsor_index,
            sponsor_address: s.sponsor_address,
            nonce: s.nonce,
            policy: s.policy,
        }
    }
}

/// Response from `/check/{program}`.
#[derive(Serialize)]
pub struct CheckResponse {
    pub success: bool,
    pub program: String,
    pub policy: PolicyResult,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramStatus {
    #[serde(flatten)]
    pub program: SponsorshipProgram,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_fee: Option<u64>,
}

/// Response from `/status`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub programs: BTreeMap<String, ProgramStatus>,
    /// Fee recipient per served network.
    pub sponsors: BTreeMap<Network, String>,
    pub max_fee: u64,
    pub dev_mode: bool,
    pub nonce_management: bool,
}

/// Response from `/nonces`.
#[derive(Serialize)]
pub struct NoncesResponse {
    pub pools: BTreeMap<Network, PoolSnapshot>,
}

/// Response from the health endpoint.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub requests: u64,
    pub networks: BTreeMap<Network, NetworkHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_service: Option<String>,
}

#[derive(Serialize)]
pub struct NetworkHealth {
    pub sponsors: usize,
    pub available: usize,
    pub reserved: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failovers: Option<u64>,
}
