//! Remote signing service client.
//!
//! Sponsor keys live in the signing service; the relay sends it wire bytes to
//! decode and sponsor orders to countersign. Transient failures retry with
//! exponential backoff and jitter, and repeated failures trip a breaker so
//! requests fail fast while the service is down.

use crate::collaborators::{SignedTransaction, SponsorOrder, SponsorSigner, TransactionCodec};
use crate::metrics::METRICS;
use crate::Error;
use async_trait::async_trait;
use rand::Rng;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sponsor_policy::{Network, TransactionView};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_RETRIES: u32 = 3;
const RETRY_BASE_MS: u64 = 100;
const CIRCUIT_THRESHOLD: u64 = 15;
const CIRCUIT_RECOVERY_SECS: u64 = 30;

#[derive(Serialize)]
struct DecodeRequest<'a> {
    tx: &'a str,
}

#[derive(Deserialize)]
struct DecodeResponse {
    transaction: TransactionView,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SponsorRequest<'a> {
    tx: String,
    network: Network,
    fee: u64,
    nonce: Option<u64>,
    sponsor_index: usize,
    sponsor_address: &'a str,
}

#[derive(Deserialize)]
struct SponsorResponse {
    tx: String,
    #[serde(default)]
    txid: Option<String>,
}

#[derive(Deserialize)]
struct ServiceError {
    error: String,
}

/// Transient HTTP errors worth retrying.
fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
}

pub struct SigningServiceClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    cb_failures: AtomicU64,
    cb_last_failure: AtomicU64,
}

impl SigningServiceClient {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client build failed: {e}")))?;
        info!(url = base_url, "Signing service client initialized");
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()).map(str::to_string),
            cb_failures: AtomicU64::new(0),
            cb_last_failure: AtomicU64::new(0),
        })
    }

    pub fn is_circuit_open(&self) -> bool {
        if self.cb_failures.load(Ordering::Relaxed) < CIRCUIT_THRESHOLD {
            return false;
        }
        let last = self.cb_last_failure.load(Ordering::Relaxed);
        // Half-open once the recovery window passes.
        now_secs().saturating_sub(last) <= CIRCUIT_RECOVERY_SECS
    }

    fn record_success(&self) {
        let prev = self.cb_failures.swap(0, Ordering::Relaxed);
        if prev >= CIRCUIT_THRESHOLD {
            info!("Signing service circuit breaker recovered");
        }
    }

    fn record_failure(&self) {
        let failures = self.cb_failures.fetch_add(1, Ordering::Relaxed) + 1;
        self.cb_last_failure.store(now_secs(), Ordering::Relaxed);
        if failures == CIRCUIT_THRESHOLD {
            warn!(
                failures,
                "Signing service circuit breaker OPEN, failing fast for {}s", CIRCUIT_RECOVERY_SECS
            );
        }
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        if self.is_circuit_open() {
            return Err(Error::Signer("signing service circuit breaker is open".into()));
        }
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| Error::Signer(format!("signing service unreachable: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Signer(format!("signing service HTTP {}", resp.status())));
        }
        Ok(())
    }

    /// POST `body` to `path`, retrying transient failures. Returns the final
    /// non-retryable status and body text.
    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(StatusCode, String), Error> {
        METRICS.signer_requests.fetch_add(1, Ordering::Relaxed);
        if self.is_circuit_open() {
            METRICS.signer_errors.fetch_add(1, Ordering::Relaxed);
            return Err(Error::Signer("signing service circuit breaker open".into()));
        }

        let url = format!("{}{path}", self.base_url);
        let mut last_err = None;
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let base = RETRY_BASE_MS * 2u64.pow(attempt);
                let jitter = rand::thread_rng().gen_range(0..=base / 2);
                tokio::time::sleep(Duration::from_millis(base + jitter)).await;
            }

            let mut request = self.http.post(&url).json(body);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(attempt, path, error = %e, "Signing service request failed (retrying)");
                    last_err = Some(Error::Signer(format!("signing service {path} failed: {e}")));
                    continue;
                }
            };

            let status = response.status();
            if is_retryable(status) && attempt + 1 < MAX_RETRIES {
                warn!(attempt, path, status = %status, "Signing service transient error (retrying)");
                last_err = Some(Error::Signer(format!("signing service {path} HTTP {status}")));
                continue;
            }

            let text = response
                .text()
                .await
                .map_err(|e| Error::Signer(format!("signing service read error: {e}")))?;
            if status.is_server_error() {
                self.record_failure();
                METRICS.signer_errors.fetch_add(1, Ordering::Relaxed);
            } else {
                self.record_success();
            }
            debug!(path, attempt, status = %status, "Signing service replied");
            return Ok((status, text));
        }

        self.record_failure();
        METRICS.signer_errors.fetch_add(1, Ordering::Relaxed);
        Err(last_err.unwrap_or_else(|| Error::Signer(format!("signing service {path} failed after retries"))))
    }
}

fn service_message(body: &str) -> String {
    serde_json::from_str::<ServiceError>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.to_string())
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[async_trait]
impl TransactionCodec for SigningServiceClient {
    async fn decode(&self, tx: &[u8]) -> Result<TransactionView, Error> {
        let hex_tx = hex::encode(tx);
        let (status, body) = self
            .post("/v1/transactions/decode", &DecodeRequest { tx: &hex_tx })
            .await?;
        match status {
            s if s.is_success() => serde_json::from_str::<DecodeResponse>(&body)
                .map(|r| r.transaction)
                .map_err(|e| Error::Signer(format!("decode response parse error: {e}"))),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(Error::Decode(service_message(&body)))
            }
            other => Err(Error::Signer(format!(
                "decode HTTP {other}: {}",
                service_message(&body)
            ))),
        }
    }
}

#[async_trait]
impl SponsorSigner for SigningServiceClient {
    async fn sponsor(&self, order: &SponsorOrder<'_>) -> Result<SignedTransaction, Error> {
        let request = SponsorRequest {
            tx: hex::encode(order.tx),
            network: order.network,
            fee: order.fee,
            nonce: order.nonce,
            sponsor_index: order.sponsor_index,
            sponsor_address: order.sponsor_address,
        };
        let (status, body) = self.post("/v1/transactions/sponsor", &request).await?;
        if !status.is_success() {
            return Err(Error::Signer(format!(
                "sponsor HTTP {status}: {}",
                service_message(&body)
            )));
        }
        let resp: SponsorResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Signer(format!("sponsor response parse error: {e}")))?;
        let bytes = hex::decode(resp.tx.trim_start_matches("0x"))
            .map_err(|e| Error::Signer(format!("signed transaction hex error: {e}")))?;
        debug!(
            sponsor_index = order.sponsor_index,
            nonce = ?order.nonce,
            fee = order.fee,
            "Transaction countersigned"
        );
        Ok(SignedTransaction {
            bytes,
            txid: resp.txid,
        })
    }
}
