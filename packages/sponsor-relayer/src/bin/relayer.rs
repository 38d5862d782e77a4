//! Sponsor Relayer binary.

use sponsor_relayer::nonce_pool::run_reservation_sweeper;
use sponsor_relayer::{create_router, AppState, Config};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Sponsor Relayer");

    let config: Config = config::Config::builder()
        .add_source(config::File::with_name("sponsor-relayer").required(false))
        .add_source(config::Environment::with_prefix("RELAYER"))
        .build()
        .and_then(|c| c.try_deserialize())
        .unwrap_or_else(|e| {
            // Fall back only when no config exists; parsing errors fail hard.
            let err_str = format!("{e}");
            if err_str.contains("not found") || err_str.contains("missing field") {
                warn!(error = %e, "No config file found, using defaults");
                Config::default()
            } else {
                error!(error = %e, "FATAL: Config error, fix env vars or sponsor-relayer.toml");
                std::process::exit(1);
            }
        });

    if config.api_key().is_some() {
        info!("API key auth enabled");
    } else {
        warn!("RELAYER_API_KEY not set, /sponsor is unprotected (dev mode)");
    }
    if config.dev_mode {
        warn!("Dev mode: sponsored transactions pay zero fee");
    }

    info!(
        networks = ?config.served_networks(),
        chaining_limit = config.chaining_limit,
        max_fee = config.max_fee,
        nonce_management = config.nonce_management,
        "Configuration loaded"
    );

    let bind_address = config.bind_address.clone();
    let ttl_secs = config.reservation_ttl_secs;
    let sweep_interval = Duration::from_secs(config.sweep_interval_secs.max(1));
    let state = Arc::new(AppState::from_config(config)?);

    let cancel = CancellationToken::new();
    let mut sweepers = Vec::new();
    if ttl_secs > 0 {
        for (network, accounts) in state.relay.networks() {
            sweepers.push(tokio::spawn(run_reservation_sweeper(
                Arc::clone(accounts.pool()),
                network.to_string(),
                Duration::from_secs(ttl_secs),
                sweep_interval,
                cancel.clone(),
            )));
        }
    }

    let app = create_router(state.clone());

    info!(address = %bind_address, "Listening");

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    cancel.cancel();
    for task in sweepers {
        if let Err(e) = task.await {
            warn!(error = %e, "Reservation sweeper did not stop cleanly");
        }
    }

    for (network, accounts) in state.relay.networks() {
        match accounts.pool().snapshot() {
            Ok(snap) if snap.total_reserved() > 0 => {
                for s in snap.sponsors.iter().filter(|s| s.reserved > 0) {
                    warn!(
                        %network,
                        sponsor_index = s.index,
                        nonces = ?s.reserved_nonces,
                        "Reservations outstanding at shutdown"
                    );
                }
            }
            Ok(_) => info!(%network, "No outstanding reservations"),
            Err(e) => error!(%network, error = %e, "Could not read nonce pool on shutdown"),
        }
    }

    info!("Relayer shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
