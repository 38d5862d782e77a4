//! HTTP request handlers.

use crate::metrics::METRICS;
use crate::middleware::RequestId;
use crate::nonce_pool::PoolSnapshot;
use crate::response::{
    CheckResponse, HealthResponse, NetworkHealth, NoncesResponse, ProgramStatus, SponsorResponse,
    StatusResponse,
};
use crate::schemas::SponsorBody;
use crate::sponsor::SponsorRequest;
use crate::state::AppState;
use crate::Error;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use sponsor_policy::Network;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

fn parse_body(body: &[u8]) -> Result<SponsorRequest, Error> {
    serde_json::from_slice::<SponsorBody>(body)
        .map(SponsorRequest::from)
        .map_err(|e| Error::Decode(format!("invalid request body: {e}")))
}

/// Full sponsorship: policy, nonce, countersign, broadcast.
pub async fn sponsor(
    State(state): State<Arc<AppState>>,
    Path(program): Path<String>,
    Extension(RequestId(req_id)): Extension<RequestId>,
    body: Bytes,
) -> Result<Json<SponsorResponse>, Error> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    METRICS.sponsor_total.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();

    let result = match parse_body(&body) {
        Ok(request) => state.relay.sponsor(&program, request).await,
        Err(e) => Err(e),
    };
    METRICS.record_sponsor_duration(start);

    match &result {
        Ok(sponsored) => {
            METRICS.sponsor_success.fetch_add(1, Ordering::Relaxed);
            info!(req_id = %req_id, program = %program, txid = %sponsored.txid, "Sponsor request succeeded");
        }
        Err(Error::PolicyRejected(policy)) => {
            METRICS.sponsor_policy_rejected.fetch_add(1, Ordering::Relaxed);
            info!(req_id = %req_id, program = %program, reason = %policy.reason_code(), "Sponsor request declined");
        }
        Err(e @ Error::BroadcastRejected { .. }) => {
            METRICS.sponsor_broadcast_rejected.fetch_add(1, Ordering::Relaxed);
            warn!(req_id = %req_id, program = %program, error = %e, "Sponsor request rejected by node");
        }
        Err(Error::NoncePool(e)) if e.is_fatal() => {
            METRICS.sponsor_error.fetch_add(1, Ordering::Relaxed);
            error!(req_id = %req_id, program = %program, error = %e, "Nonce pool defect");
        }
        Err(e) => {
            METRICS.sponsor_error.fetch_add(1, Ordering::Relaxed);
            warn!(req_id = %req_id, program = %program, kind = e.kind(), error = %e, "Sponsor request failed");
        }
    }

    result.map(|s| Json(s.into()))
}

/// Policy dry run. Never reserves a nonce.
pub async fn check(
    State(state): State<Arc<AppState>>,
    Path(program): Path<String>,
    body: Bytes,
) -> Result<Json<CheckResponse>, Error> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    METRICS.check_total.fetch_add(1, Ordering::Relaxed);

    let request = parse_body(&body)?;
    let policy = state.relay.check(&program, &request).await?;
    Ok(Json(CheckResponse {
        success: policy.eligible(),
        program,
        policy,
    }))
}

/// Programs, minimum fees and the fee recipient per network.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let programs = state
        .relay
        .programs()
        .iter()
        .map(|(name, program)| {
            (
                name.to_string(),
                ProgramStatus {
                    minimum_fee: program.minimum_fee(),
                    program: program.clone(),
                },
            )
        })
        .collect();
    let sponsors = state
        .relay
        .networks()
        .map(|(network, accounts)| (network, accounts.primary().to_string()))
        .collect();
    let settings = state.relay.settings();

    Json(StatusResponse {
        programs,
        sponsors,
        max_fee: settings.max_fee,
        dev_mode: settings.dev_mode,
        nonce_management: settings.nonce_management,
    })
}

fn pool_snapshots(state: &AppState) -> Result<BTreeMap<Network, PoolSnapshot>, Error> {
    state
        .relay
        .networks()
        .map(|(network, accounts)| Ok((network, accounts.pool().snapshot()?)))
        .collect()
}

/// Nonce pool state per network.
pub async fn nonces(State(state): State<Arc<AppState>>) -> Result<Json<NoncesResponse>, Error> {
    Ok(Json(NoncesResponse {
        pools: pool_snapshots(&state)?,
    }))
}

/// Health check with pool occupancy and collaborator reachability.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut degraded = false;
    let mut networks = BTreeMap::new();

    for (network, accounts) in state.relay.networks() {
        let (available, reserved) = match accounts.pool().snapshot() {
            Ok(snap) => (snap.total_available(), snap.total_reserved()),
            Err(e) => {
                warn!(%network, error = %e, "Nonce pool unreadable");
                degraded = true;
                (0, 0)
            }
        };

        let mut entry = NetworkHealth {
            sponsors: accounts.addresses().len(),
            available,
            reserved,
            node: None,
            active_node: None,
            failovers: None,
        };
        if let Some(client) = state.nodes.as_ref().and_then(|n| n.get(network).ok()) {
            let node = match client.health_check().await {
                Ok(s) => s.to_string(),
                Err(e) => {
                    warn!(%network, error = %e, "Node health check failed");
                    "unreachable".to_string()
                }
            };
            degraded |= node != "ok";
            entry.node = Some(node);
            entry.active_node = Some(client.active_url().to_string());
            entry.failovers = Some(client.failover_count());
        }
        networks.insert(network, entry);
    }

    let signing_service = match &state.signing_service {
        Some(client) => Some(match client.health_check().await {
            Ok(()) => "ok".to_string(),
            Err(e) => {
                degraded = true;
                e.to_string()
            }
        }),
        None => None,
    };

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "ok" },
        uptime_secs: state.start_time.elapsed().as_secs(),
        requests: state.request_count.load(Ordering::Relaxed),
        networks,
        signing_service,
    })
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let pools: Vec<(Network, PoolSnapshot)> = state
        .relay
        .networks()
        .filter_map(|(network, accounts)| {
            accounts.pool().snapshot().ok().map(|snap| (network, snap))
        })
        .collect();
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.render(&pools),
    )
}
