//! Background return of abandoned reservations.

use super::NoncePool;
use crate::metrics::METRICS;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Every `interval`, resolve reservations older than `ttl` as unused.
pub async fn run_reservation_sweeper(
    pool: Arc<NoncePool>,
    label: String,
    ttl: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!(pool = %label, ttl_secs = ttl.as_secs(), "Reservation sweeper started");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {},
            _ = cancel.cancelled() => {
                info!(pool = %label, "Reservation sweeper shutting down");
                return;
            }
        }

        match pool.sweep_stale(ttl.as_secs()) {
            Ok(swept) if swept.is_empty() => {}
            Ok(swept) => {
                METRICS
                    .reservations_swept
                    .fetch_add(swept.len() as u64, Ordering::Relaxed);
                for r in &swept {
                    warn!(
                        pool = %label,
                        sponsor_index = r.sponsor_index,
                        nonce = r.nonce,
                        "Stale reservation returned to pool"
                    );
                }
            }
            Err(e) => error!(pool = %label, error = %e, "Reservation sweep failed"),
        }
    }
}
