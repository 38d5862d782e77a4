//! Relayer configuration.

use serde::Deserialize;
use sponsor_policy::Network;
use std::path::PathBuf;

/// Configuration for the sponsor relayer.
///
/// Loaded from `sponsor-relayer.toml` (optional) and `RELAYER_*` environment
/// variables, e.g. `RELAYER_MAINNET_SPONSORS=SP1...,SP2...`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "defaults::bind_address")]
    pub bind_address: String,

    #[serde(default = "defaults::mainnet_node_url")]
    pub mainnet_node_url: String,

    /// Empty = no fallback (primary is reused).
    #[serde(default = "defaults::mainnet_fallback_node_url")]
    pub mainnet_fallback_node_url: String,

    #[serde(default = "defaults::testnet_node_url")]
    pub testnet_node_url: String,

    #[serde(default)]
    pub testnet_fallback_node_url: String,

    /// Remote service holding sponsor keys; decodes and countersigns.
    #[serde(default = "defaults::signing_service_url")]
    pub signing_service_url: String,

    #[serde(default)]
    pub signing_service_token: String,

    /// Comma-separated sponsor addresses. A network with none is not served.
    #[serde(default)]
    pub mainnet_sponsors: String,

    #[serde(default)]
    pub testnet_sponsors: String,

    /// Max unconfirmed transactions in flight per sponsor account.
    #[serde(default = "defaults::chaining_limit")]
    pub chaining_limit: usize,

    /// Fee cap in micro-STX, whatever the oracle says.
    #[serde(default = "defaults::max_fee")]
    pub max_fee: u64,

    /// Forces the sponsor fee to 0.
    #[serde(default)]
    pub dev_mode: bool,

    /// When false, no nonce is reserved and the signer picks one.
    #[serde(default = "defaults::nonce_management")]
    pub nonce_management: bool,

    /// 0 disables the reservation sweeper.
    #[serde(default)]
    pub reservation_ttl_secs: u64,

    #[serde(default = "defaults::sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Directory for `nonce-pool-<network>.json`. Empty = in-memory.
    #[serde(default)]
    pub state_dir: String,

    /// Enables the `dao` program, restricted to this signer on mainnet.
    #[serde(default)]
    pub dao_deployer: String,

    /// Empty = sponsor endpoints are open (dev mode).
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: defaults::bind_address(),
            mainnet_node_url: defaults::mainnet_node_url(),
            mainnet_fallback_node_url: defaults::mainnet_fallback_node_url(),
            testnet_node_url: defaults::testnet_node_url(),
            testnet_fallback_node_url: String::new(),
            signing_service_url: defaults::signing_service_url(),
            signing_service_token: String::new(),
            mainnet_sponsors: String::new(),
            testnet_sponsors: String::new(),
            chaining_limit: defaults::chaining_limit(),
            max_fee: defaults::max_fee(),
            dev_mode: false,
            nonce_management: defaults::nonce_management(),
            reservation_ttl_secs: 0,
            sweep_interval_secs: defaults::sweep_interval_secs(),
            state_dir: String::new(),
            dao_deployer: String::new(),
            api_key: String::new(),
            request_timeout_secs: defaults::request_timeout_secs(),
        }
    }
}

impl Config {
    /// Sponsor addresses for `network`, in index order.
    pub fn sponsors(&self, network: Network) -> Vec<String> {
        let csv = match network {
            Network::Mainnet => &self.mainnet_sponsors,
            Network::Testnet => &self.testnet_sponsors,
        };
        csv.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Networks with at least one sponsor configured.
    pub fn served_networks(&self) -> Vec<Network> {
        Network::ALL
            .into_iter()
            .filter(|n| !self.sponsors(*n).is_empty())
            .collect()
    }

    /// `(primary, fallback)` node URLs; fallback defaults to primary.
    pub fn node_urls(&self, network: Network) -> (String, String) {
        let (primary, fallback) = match network {
            Network::Mainnet => (&self.mainnet_node_url, &self.mainnet_fallback_node_url),
            Network::Testnet => (&self.testnet_node_url, &self.testnet_fallback_node_url),
        };
        let fallback = if fallback.is_empty() { primary } else { fallback };
        (primary.clone(), fallback.clone())
    }

    /// Pool record path, or `None` for in-memory pools.
    pub fn state_path(&self, network: Network) -> Option<PathBuf> {
        if self.state_dir.is_empty() {
            return None;
        }
        Some(PathBuf::from(&self.state_dir).join(format!("nonce-pool-{network}.json")))
    }

    pub fn dao_deployer(&self) -> Option<&str> {
        Some(self.dao_deployer.as_str()).filter(|d| !d.is_empty())
    }

    pub fn api_key(&self) -> Option<&str> {
        Some(self.api_key.as_str()).filter(|k| !k.is_empty())
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.chaining_limit == 0 {
            return Err(crate::Error::Config("chaining_limit must be at least 1".into()));
        }
        if self.max_fee == 0 && !self.dev_mode {
            return Err(crate::Error::Config(
                "max_fee must be positive outside dev mode".into(),
            ));
        }
        if self.served_networks().is_empty() {
            return Err(crate::Error::Config(
                "no sponsors configured: set mainnet_sponsors or testnet_sponsors".into(),
            ));
        }
        for network in self.served_networks() {
            let sponsors = self.sponsors(network);
            for (i, addr) in sponsors.iter().enumerate() {
                if sponsors[..i].contains(addr) {
                    return Err(crate::Error::Config(format!(
                        "duplicate {network} sponsor: {addr}"
                    )));
                }
            }
        }
        Ok(())
    }
}

mod defaults {
    pub fn bind_address() -> String {
        "0.0.0.0:3040".into()
    }

    pub fn mainnet_node_url() -> String {
        "https://api.mainnet.hiro.so".into()
    }

    pub fn mainnet_fallback_node_url() -> String {
        "https://api.hiro.so".into()
    }

    pub fn testnet_node_url() -> String {
        "https://api.testnet.hiro.so".into()
    }

    pub fn signing_service_url() -> String {
        "http://127.0.0.1:3050".into()
    }

    pub fn chaining_limit() -> usize {
        25
    }

    /// 0.51 STX.
    pub fn max_fee() -> u64 {
        510_000
    }

    pub fn nonce_management() -> bool {
        true
    }

    pub fn sweep_interval_secs() -> u64 {
        30
    }

    pub fn request_timeout_secs() -> u64 {
        30
    }
}
