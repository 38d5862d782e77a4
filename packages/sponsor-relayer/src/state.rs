//! Application state shared across handlers.

use crate::collaborators::Collaborators;
use crate::config::Config;
use crate::node::{NodeClient, StacksNodes};
use crate::nonce_pool::{FileStore, MemoryStore, NoncePool, StateStore};
use crate::signing_service::SigningServiceClient;
use crate::sponsor::{Relay, RelaySettings, SponsorAccounts};
use sponsor_policy::builtin_programs;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub relay: Relay,
    /// Absent when collaborators are injected directly (tests).
    pub nodes: Option<Arc<StacksNodes>>,
    pub signing_service: Option<Arc<SigningServiceClient>>,
    pub start_time: Instant,
    pub request_count: AtomicU64,
}

impl AppState {
    /// Wrap an already-assembled relay.
    pub fn new(config: Config, relay: Relay) -> Self {
        Self {
            config,
            relay,
            nodes: None,
            signing_service: None,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
        }
    }

    /// Build the production relay from configuration: node clients and the
    /// signing service as collaborators, one nonce pool per served network.
    pub fn from_config(config: Config) -> Result<Self, crate::Error> {
        config.validate()?;
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let mut nodes = StacksNodes::new();
        for network in config.served_networks() {
            let (primary, fallback) = config.node_urls(network);
            nodes.insert(network, NodeClient::new(&primary, &fallback, timeout)?);
        }
        let nodes = Arc::new(nodes);

        let signing = Arc::new(SigningServiceClient::new(
            &config.signing_service_url,
            Some(&config.signing_service_token),
            timeout,
        )?);

        let collaborators = Collaborators {
            codec: signing.clone(),
            fees: nodes.clone(),
            signer: signing.clone(),
            broadcaster: nodes.clone(),
            nonces: nodes.clone(),
        };

        let settings = RelaySettings {
            max_fee: config.max_fee,
            dev_mode: config.dev_mode,
            nonce_management: config.nonce_management,
        };
        let mut relay = Relay::new(builtin_programs(config.dao_deployer()), collaborators, settings);

        for network in config.served_networks() {
            let sponsors = config.sponsors(network);
            let store: Arc<dyn StateStore> = match config.state_path(network) {
                Some(path) => {
                    info!(%network, path = %path.display(), "Nonce pool persisted to disk");
                    Arc::new(FileStore::new(path))
                }
                None => Arc::new(MemoryStore::new()),
            };
            let pool = Arc::new(NoncePool::new(sponsors.len(), config.chaining_limit, store));
            relay = relay.with_network(network, SponsorAccounts::new(sponsors, pool)?);
        }

        let mut state = Self::new(config, relay);
        state.nodes = Some(nodes);
        state.signing_service = Some(signing);
        Ok(state)
    }
}
