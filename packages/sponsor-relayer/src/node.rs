//! Stacks node client with primary → fallback failover and circuit breaker.
//!
//! Backs three collaborators: fee oracle (`/v2/fees/transfer`), broadcaster
//! (`/v2/transactions`) and on-chain nonce source (`/v2/accounts`).

use crate::collaborators::{BroadcastOutcome, Broadcaster, FeeOracle, NonceSource, SignedTransaction};
use crate::metrics::METRICS;
use crate::Error;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use sponsor_policy::Network;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

const CIRCUIT_BREAKER_THRESHOLD: u64 = 5;
const CIRCUIT_BREAKER_WINDOW_MS: u64 = 30_000;

struct CircuitState {
    failures: u64,
    last_failure_ms: u64,
    open: bool,
}

#[derive(Deserialize)]
struct AccountResponse {
    nonce: u64,
}

/// Client for one network's node pair.
pub struct NodeClient {
    http: Client,
    primary_url: String,
    fallback_url: String,
    circuit: Mutex<CircuitState>,
    total_failovers: AtomicU64,
}

impl NodeClient {
    pub fn new(primary_url: &str, fallback_url: &str, timeout: Duration) -> Result<Self, Error> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::Config(format!("HTTP client build failed: {e}")))?;
        info!(
            primary = primary_url,
            fallback = fallback_url,
            "Node client initialized with failover"
        );
        Ok(Self {
            http,
            primary_url: primary_url.trim_end_matches('/').to_string(),
            fallback_url: fallback_url.trim_end_matches('/').to_string(),
            circuit: Mutex::new(CircuitState {
                failures: 0,
                last_failure_ms: 0,
                open: false,
            }),
            total_failovers: AtomicU64::new(0),
        })
    }

    /// Fee rate per byte for a transfer.
    pub async fn transfer_fee_rate(&self) -> Result<u64, Error> {
        let resp = self
            .send("fee rate", true, |http, base| http.get(format!("{base}/v2/fees/transfer")))
            .await?;
        expect_success(&resp, "fee rate")?;
        resp.json::<u64>()
            .await
            .map_err(|e| Error::Rpc(format!("fee rate parse error: {e}")))
    }

    /// `rate × size`, the node's own estimate for a transaction of `tx_len` bytes.
    pub async fn estimate_fee(&self, tx_len: usize) -> Result<u64, Error> {
        let rate = self.transfer_fee_rate().await?;
        Ok(rate.saturating_mul(tx_len as u64))
    }

    pub async fn account_nonce(&self, address: &str) -> Result<u64, Error> {
        let resp = self
            .send("account", true, |http, base| {
                http.get(format!("{base}/v2/accounts/{address}?proof=0"))
            })
            .await?;
        expect_success(&resp, "account")?;
        let account: AccountResponse = resp
            .json()
            .await
            .map_err(|e| Error::Rpc(format!("account parse error: {e}")))?;
        Ok(account.nonce)
    }

    /// Submit raw transaction bytes to the active node only. A 400 is a node
    /// verdict, not a failure. Transport errors are never retried elsewhere:
    /// the first node may already hold the transaction.
    pub async fn broadcast(&self, bytes: &[u8]) -> Result<BroadcastOutcome, Error> {
        let resp = self
            .send("broadcast", false, |http, base| {
                http.post(format!("{base}/v2/transactions"))
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(bytes.to_vec())
            })
            .await?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Rpc(format!("broadcast read error: {e}")))?;

        match status {
            s if s.is_success() => {
                let txid = serde_json::from_str::<String>(&body)
                    .unwrap_or_else(|_| body.trim().trim_matches('"').to_string());
                Ok(BroadcastOutcome::Accepted { txid })
            }
            StatusCode::BAD_REQUEST => match serde_json::from_str::<BroadcastOutcome>(&body) {
                Ok(outcome @ BroadcastOutcome::Rejected { .. }) => Ok(outcome),
                _ => Ok(BroadcastOutcome::Rejected {
                    error: body,
                    reason: None,
                    reason_data: None,
                    txid: None,
                }),
            },
            other => Err(Error::Rpc(format!("broadcast HTTP {other}: {body}"))),
        }
    }

    /// Returns "ok", "degraded" (fallback only), or error.
    pub async fn health_check(&self) -> Result<&'static str, Error> {
        let probe = |url: &str| self.http.get(format!("{url}/v2/info")).send();
        match probe(&self.primary_url).await {
            Ok(r) if r.status().is_success() => Ok("ok"),
            _ => match probe(&self.fallback_url).await {
                Ok(r) if r.status().is_success() => Ok("degraded"),
                Ok(r) => Err(Error::Rpc(format!("both nodes unhealthy: HTTP {}", r.status()))),
                Err(e) => Err(Error::Rpc(format!("both nodes unreachable: {e}"))),
            },
        }
    }

    /// Send via the active node. With `failover`, retry once on the other
    /// node for transport errors and 5xx/429.
    async fn send<F>(&self, what: &str, failover: bool, build: F) -> Result<Response, Error>
    where
        F: Fn(&Client, &str) -> RequestBuilder,
    {
        let (first, second) = if self.is_circuit_open() {
            (&self.fallback_url, &self.primary_url)
        } else {
            (&self.primary_url, &self.fallback_url)
        };
        let first_is_primary = std::ptr::eq(first, &self.primary_url);

        let first_err = match build(&self.http, first.as_str()).send().await {
            Ok(r) if !is_retryable(r.status()) => {
                if first_is_primary {
                    self.record_success();
                }
                return Ok(r);
            }
            Ok(r) => format!("HTTP {}", r.status()),
            Err(e) => e.to_string(),
        };
        if first_is_primary {
            self.record_failure();
        }
        METRICS.node_errors.fetch_add(1, Ordering::Relaxed);

        if !failover || first == second {
            return Err(Error::Rpc(format!("{what} failed: {first_err}")));
        }
        warn!(node = %first, error = %first_err, "{what} failed, trying other node");

        match build(&self.http, second.as_str()).send().await {
            Ok(r) if !is_retryable(r.status()) => Ok(r),
            Ok(r) => {
                METRICS.node_errors.fetch_add(1, Ordering::Relaxed);
                Err(Error::Rpc(format!(
                    "{what} failed on both nodes: first={first_err}, second=HTTP {}",
                    r.status()
                )))
            }
            Err(e) => {
                METRICS.node_errors.fetch_add(1, Ordering::Relaxed);
                Err(Error::Rpc(format!(
                    "{what} failed on both nodes: first={first_err}, second={e}"
                )))
            }
        }
    }

    // --- Failover / circuit breaker ---

    fn record_success(&self) {
        let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
        if circuit.failures > 0 {
            info!(primary = %self.primary_url, "Primary node recovered");
            circuit.failures = 0;
            circuit.open = false;
        }
    }

    fn record_failure(&self) {
        let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
        circuit.failures += 1;
        circuit.last_failure_ms = now_ms();
        if circuit.failures >= CIRCUIT_BREAKER_THRESHOLD && !circuit.open {
            circuit.open = true;
            self.total_failovers.fetch_add(1, Ordering::Relaxed);
            METRICS.node_failovers.fetch_add(1, Ordering::Relaxed);
            warn!(
                failures = circuit.failures,
                fallback = %self.fallback_url,
                "Circuit breaker opened, routing to fallback node"
            );
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
        if !circuit.open {
            return false;
        }
        if now_ms().saturating_sub(circuit.last_failure_ms) > CIRCUIT_BREAKER_WINDOW_MS {
            circuit.open = false;
            circuit.failures = 0;
            info!(primary = %self.primary_url, "Circuit breaker half-open, retrying primary");
            return false;
        }
        true
    }

    pub fn failover_count(&self) -> u64 {
        self.total_failovers.load(Ordering::Relaxed)
    }

    /// Currently active node URL.
    pub fn active_url(&self) -> &str {
        if self.is_circuit_open() {
            &self.fallback_url
        } else {
            &self.primary_url
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn expect_success(resp: &Response, what: &str) -> Result<(), Error> {
    if resp.status().is_success() {
        Ok(())
    } else {
        Err(Error::Rpc(format!("{what} HTTP {}", resp.status())))
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Node clients keyed by network.
#[derive(Default)]
pub struct StacksNodes {
    clients: BTreeMap<Network, NodeClient>,
}

impl StacksNodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, network: Network, client: NodeClient) {
        self.clients.insert(network, client);
    }

    pub fn get(&self, network: Network) -> Result<&NodeClient, Error> {
        self.clients
            .get(&network)
            .ok_or_else(|| Error::UnsupportedNetwork(network.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Network, &NodeClient)> {
        self.clients.iter().map(|(n, c)| (*n, c))
    }
}

#[async_trait]
impl FeeOracle for StacksNodes {
    async fn estimate(&self, tx: &[u8], network: Network) -> Result<u64, Error> {
        self.get(network)?.estimate_fee(tx.len()).await
    }
}

#[async_trait]
impl Broadcaster for StacksNodes {
    async fn broadcast(
        &self,
        tx: &SignedTransaction,
        network: Network,
    ) -> Result<BroadcastOutcome, Error> {
        self.get(network)?.broadcast(&tx.bytes).await
    }
}

#[async_trait]
impl NonceSource for StacksNodes {
    async fn account_nonce(&self, address: &str, network: Network) -> Result<u64, Error> {
        self.get(network)?.account_nonce(address).await
    }
}
