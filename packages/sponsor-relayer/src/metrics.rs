//! Prometheus metrics (lock-free atomics).

use crate::nonce_pool::PoolSnapshot;
use sponsor_policy::Network;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    // --- Traffic ---
    pub sponsor_total: AtomicU64,
    pub sponsor_success: AtomicU64,
    pub sponsor_policy_rejected: AtomicU64,
    pub sponsor_broadcast_rejected: AtomicU64,
    pub sponsor_error: AtomicU64,
    pub check_total: AtomicU64,

    // --- Latency (μs) ---
    pub sponsor_duration_us_sum: AtomicU64,
    pub sponsor_duration_us_max: AtomicU64,

    // --- Nonce pool ---
    pub pool_exhausted: AtomicU64,
    pub nonce_seeds: AtomicU64,
    pub reservations_abandoned: AtomicU64,
    pub reservations_swept: AtomicU64,

    // --- Collaborators ---
    pub fee_estimate_errors: AtomicU64,
    pub signer_requests: AtomicU64,
    pub signer_errors: AtomicU64,
    pub node_failovers: AtomicU64,
    pub node_errors: AtomicU64,
}

impl Metrics {
    const fn new() -> Self {
        Self {
            sponsor_total: AtomicU64::new(0),
            sponsor_success: AtomicU64::new(0),
            sponsor_policy_rejected: AtomicU64::new(0),
            sponsor_broadcast_rejected: AtomicU64::new(0),
            sponsor_error: AtomicU64::new(0),
            check_total: AtomicU64::new(0),
            sponsor_duration_us_sum: AtomicU64::new(0),
            sponsor_duration_us_max: AtomicU64::new(0),
            pool_exhausted: AtomicU64::new(0),
            nonce_seeds: AtomicU64::new(0),
            reservations_abandoned: AtomicU64::new(0),
            reservations_swept: AtomicU64::new(0),
            fee_estimate_errors: AtomicU64::new(0),
            signer_requests: AtomicU64::new(0),
            signer_errors: AtomicU64::new(0),
            node_failovers: AtomicU64::new(0),
            node_errors: AtomicU64::new(0),
        }
    }

    pub fn record_sponsor_duration(&self, start: Instant) {
        let us = start.elapsed().as_micros() as u64;
        self.sponsor_duration_us_sum.fetch_add(us, Ordering::Relaxed);
        self.sponsor_duration_us_max.fetch_max(us, Ordering::Relaxed);
    }

    /// Render in Prometheus text exposition format, with pool gauges per network.
    pub fn render(&self, pools: &[(Network, PoolSnapshot)]) -> String {
        let counters: [(&str, &str, u64); 15] = [
            ("sponsor_total", "Sponsor requests received.", self.sponsor_total.load(Ordering::Relaxed)),
            ("sponsor_success_total", "Transactions sponsored and broadcast.", self.sponsor_success.load(Ordering::Relaxed)),
            ("sponsor_policy_rejected_total", "Requests declined by a sponsorship program.", self.sponsor_policy_rejected.load(Ordering::Relaxed)),
            ("sponsor_broadcast_rejected_total", "Signed transactions refused by the node.", self.sponsor_broadcast_rejected.load(Ordering::Relaxed)),
            ("sponsor_error_total", "Requests failed for any other reason.", self.sponsor_error.load(Ordering::Relaxed)),
            ("check_total", "Policy dry runs.", self.check_total.load(Ordering::Relaxed)),
            ("pool_exhausted_total", "Reservations refused at the chaining limit.", self.pool_exhausted.load(Ordering::Relaxed)),
            ("nonce_seeds_total", "Cold sponsors seeded from the chain.", self.nonce_seeds.load(Ordering::Relaxed)),
            ("reservations_abandoned_total", "Reservations released by failure cleanup.", self.reservations_abandoned.load(Ordering::Relaxed)),
            ("reservations_swept_total", "Reservations released by the TTL sweeper.", self.reservations_swept.load(Ordering::Relaxed)),
            ("fee_estimate_errors_total", "Fee oracle failures (cap applied).", self.fee_estimate_errors.load(Ordering::Relaxed)),
            ("signer_requests_total", "Signing service calls.", self.signer_requests.load(Ordering::Relaxed)),
            ("signer_errors_total", "Signing service failures after retries.", self.signer_errors.load(Ordering::Relaxed)),
            ("node_failovers_total", "Node primary-to-fallback failovers.", self.node_failovers.load(Ordering::Relaxed)),
            ("node_errors_total", "Node request errors.", self.node_errors.load(Ordering::Relaxed)),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            let _ = write!(
                out,
                "# HELP relayer_{name} {help}\n# TYPE relayer_{name} counter\nrelayer_{name} {value}\n"
            );
        }

        let dur_sum_s = self.sponsor_duration_us_sum.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let dur_max_s = self.sponsor_duration_us_max.swap(0, Ordering::Relaxed) as f64 / 1_000_000.0;
        let _ = write!(
            out,
            "\
# HELP relayer_sponsor_duration_seconds_sum Total sponsor handler time (seconds).\n\
# TYPE relayer_sponsor_duration_seconds_sum counter\n\
relayer_sponsor_duration_seconds_sum {dur_sum_s:.6}\n\
# HELP relayer_sponsor_duration_seconds_max Max sponsor handler time since last scrape (seconds).\n\
# TYPE relayer_sponsor_duration_seconds_max gauge\n\
relayer_sponsor_duration_seconds_max {dur_max_s:.6}\n"
        );

        out.push_str(
            "\
# HELP relayer_pool_available Nonces ready to reserve.\n\
# TYPE relayer_pool_available gauge\n",
        );
        for (network, snap) in pools {
            for s in &snap.sponsors {
                let _ = writeln!(
                    out,
                    "relayer_pool_available{{network=\"{network}\",sponsor=\"{}\"}} {}",
                    s.index, s.available
                );
            }
        }
        out.push_str(
            "\
# HELP relayer_pool_reserved Nonces checked out and unresolved.\n\
# TYPE relayer_pool_reserved gauge\n",
        );
        for (network, snap) in pools {
            for s in &snap.sponsors {
                let _ = writeln!(
                    out,
                    "relayer_pool_reserved{{network=\"{network}\",sponsor=\"{}\"}} {}",
                    s.index, s.reserved
                );
            }
        }
        out.push_str(
            "\
# HELP relayer_pool_next_sponsor Round-robin cursor.\n\
# TYPE relayer_pool_next_sponsor gauge\n",
        );
        for (network, snap) in pools {
            let _ = writeln!(
                out,
                "relayer_pool_next_sponsor{{network=\"{network}\"}} {}",
                snap.next_sponsor_index
            );
        }
        out
    }
}
