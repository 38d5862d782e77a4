//! Nonce pool behaviour under concurrency, restarts and sweeps.

use anyhow::Result;
use sponsor_policy::Network;
use sponsor_relayer::nonce_pool::{
    run_reservation_sweeper, FileStore, MemoryStore, NonceSeed, Outcome, StateStore,
};
use sponsor_relayer::{NoncePool, PoolError, SponsorRequest};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::utils::{encode, not_send_many, scratch_dir, HarnessBuilder, SPONSOR_A, SPONSOR_B};

fn not_request() -> SponsorRequest {
    SponsorRequest {
        tx: encode(&not_send_many(SPONSOR_A, 10_000)),
        network: Network::Testnet,
        declared_fee: Some(10_000),
    }
}

// ── Concurrency ─────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_never_share_a_nonce() -> Result<()> {
    let h = HarnessBuilder::default().build()?;
    let relay = Arc::new(h.relay);

    let tasks: Vec<_> = (0..40)
        .map(|_| {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move { relay.sponsor("not", not_request()).await })
        })
        .collect();

    let mut per_sponsor: BTreeMap<usize, BTreeSet<u64>> = BTreeMap::new();
    for task in tasks {
        let sponsored = task.await??;
        let nonce = sponsored.nonce.expect("nonce management is on");
        assert!(
            per_sponsor.entry(sponsored.sponsor_index).or_default().insert(nonce),
            "nonce {nonce} handed out twice"
        );
    }

    // Strict rotation splits the load evenly, and each sponsor's nonces
    // are gapless from its on-chain start.
    assert_eq!(per_sponsor.len(), 2);
    for nonces in per_sponsor.values() {
        assert_eq!(nonces.iter().copied().collect::<Vec<_>>(), (0..20).collect::<Vec<_>>());
    }
    assert_eq!(h.pool.snapshot()?.total_reserved(), 0);
    Ok(())
}

#[tokio::test]
async fn test_exhaustion_is_per_sponsor_and_recovers() -> Result<()> {
    let pool = NoncePool::new(1, 2, Arc::new(MemoryStore::new()));

    assert!(matches!(
        pool.reserve_next(None),
        Err(PoolError::ColdSponsor { sponsor_index: 0 })
    ));
    let seed = Some(NonceSeed { sponsor_index: 0, nonce: 5 });
    let first = pool.reserve_next(seed)?;
    let second = pool.reserve_next(None)?;
    assert_eq!((first.nonce, second.nonce), (5, 6));

    assert!(matches!(
        pool.reserve_next(None),
        Err(PoolError::ExhaustedPool { sponsor_index: 0, limit: 2 })
    ));

    pool.resolve(0, first.nonce, Outcome::Unused)?;
    assert_eq!(pool.reserve_next(None)?.nonce, 5);
    Ok(())
}

#[tokio::test]
async fn test_resolve_is_idempotent_and_bounds_checked() -> Result<()> {
    let pool = NoncePool::new(2, 25, Arc::new(MemoryStore::new()));
    assert!(matches!(pool.resolve(0, 1, Outcome::Unused), Err(PoolError::UnknownSponsorState)));

    let r = pool.reserve_next(Some(NonceSeed { sponsor_index: 0, nonce: 0 }))?;
    pool.resolve(r.sponsor_index, r.nonce, Outcome::Used("0xabc".into()))?;
    let after = pool.snapshot()?;
    pool.resolve(r.sponsor_index, r.nonce, Outcome::Unused)?;
    assert_eq!(pool.snapshot()?, after);

    assert!(matches!(
        pool.resolve(2, 0, Outcome::Unused),
        Err(PoolError::UnknownSponsor { sponsor_index: 2, sponsors: 2 })
    ));
    Ok(())
}

// ── Persistence ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_pool_survives_restart() -> Result<()> {
    let dir = scratch_dir("restart");
    let path = dir.join("nonce-pool-testnet.json");

    {
        let h = HarnessBuilder::default()
            .store(Arc::new(FileStore::new(&path)))
            .chain_nonce(SPONSOR_A, 10)
            .chain_nonce(SPONSOR_B, 20)
            .build()?;
        for _ in 0..3 {
            h.relay.sponsor("not", not_request()).await?;
        }
    }
    assert!(path.exists());

    // A restarted relay continues where the record left off, even though
    // the chain still reports the old nonces.
    let h = HarnessBuilder::default()
        .store(Arc::new(FileStore::new(&path)))
        .chain_nonce(SPONSOR_A, 10)
        .chain_nonce(SPONSOR_B, 20)
        .build()?;
    let next = h.relay.sponsor("not", not_request()).await?;
    assert_eq!((next.sponsor_index, next.nonce), (1, Some(21)));

    let snap = h.pool.snapshot()?;
    assert_eq!(snap.next_sponsor_index, 0);
    assert_eq!(snap.sponsors[0].next_nonce, Some(12));

    std::fs::remove_dir_all(dir)?;
    Ok(())
}

#[tokio::test]
async fn test_sponsor_count_change_is_refused() -> Result<()> {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let two = NoncePool::new(2, 25, store.clone());
    two.reserve_next(Some(NonceSeed { sponsor_index: 0, nonce: 0 }))?;

    let one = NoncePool::new(1, 25, store);
    assert!(matches!(
        one.snapshot(),
        Err(PoolError::SponsorCountMismatch { stored: 2, configured: 1 })
    ));
    assert!(matches!(
        one.reserve_next(None),
        Err(PoolError::SponsorCountMismatch { .. })
    ));
    Ok(())
}

// ── Sweeper ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sweeper_returns_abandoned_reservations() -> Result<()> {
    let pool = Arc::new(NoncePool::new(1, 25, Arc::new(MemoryStore::new())));
    let r = pool.reserve_next(Some(NonceSeed { sponsor_index: 0, nonce: 3 }))?;
    assert_eq!(pool.snapshot()?.total_reserved(), 1);

    let cancel = CancellationToken::new();
    let sweeper = tokio::spawn(run_reservation_sweeper(
        Arc::clone(&pool),
        "testnet".into(),
        Duration::ZERO,
        Duration::from_millis(10),
        cancel.clone(),
    ));

    let mut waited = 0;
    while pool.snapshot()?.total_reserved() > 0 && waited < 200 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += 1;
    }
    cancel.cancel();
    sweeper.await?;

    let snap = pool.snapshot()?;
    assert_eq!(snap.total_reserved(), 0);
    assert_eq!(snap.sponsors[0].next_nonce, Some(r.nonce));
    Ok(())
}
