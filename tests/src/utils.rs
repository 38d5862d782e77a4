//! Shared helpers: in-process collaborator fakes and relay builders.

use anyhow::Result;
use async_trait::async_trait;
use sponsor_policy::{
    builtin_programs, AuthKind, ClarityValue, ContractCall, Network, Payload, TransactionView,
    SEND_MANY_NOT_CONTRACT,
};
use sponsor_relayer::nonce_pool::{MemoryStore, StateStore};
use sponsor_relayer::{
    BroadcastOutcome, Broadcaster, Collaborators, Error, FeeOracle, NoncePool, NonceSource, Relay,
    RelaySettings, SignedTransaction, SponsorAccounts, SponsorOrder, SponsorSigner,
    TransactionCodec,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const SPONSOR_A: &str = "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSPTPD4B0";
pub const SPONSOR_B: &str = "ST2CY5V39NHDPWSXMW9QDT3HC3GD6Q6XX4CFRK9AG";
pub const CALLER: &str = "ST2JHG361ZXG51QTKY2NQCVBPPRRE2KZB1HR05NNC";
pub const FEE_ESTIMATE: u64 = 300;

/// The fake codec's wire format is the JSON view itself.
pub fn encode(view: &TransactionView) -> Vec<u8> {
    serde_json::to_vec(view).unwrap()
}

/// A sponsored NOT send-many with one line paying `fee` to `sponsor`.
pub fn not_send_many(sponsor: &str, fee: u128) -> TransactionView {
    let line = |to: &str, amount: u128| {
        let mut fields = BTreeMap::new();
        fields.insert("to".to_string(), ClarityValue::Principal(to.into()));
        fields.insert("amount".to_string(), ClarityValue::UInt(amount));
        ClarityValue::Tuple(fields)
    };
    let (address, name, function) = SEND_MANY_NOT_CONTRACT;
    TransactionView {
        auth: AuthKind::Sponsored,
        signer: CALLER.into(),
        payload: Payload::ContractCall(ContractCall {
            contract_address: address.into(),
            contract_name: name.into(),
            function_name: function.into(),
            function_args: vec![ClarityValue::List(vec![
                line(CALLER, 5_000),
                line(sponsor, fee),
            ])],
        }),
    }
}

pub struct JsonCodec;

#[async_trait]
impl TransactionCodec for JsonCodec {
    async fn decode(&self, tx: &[u8]) -> Result<TransactionView, Error> {
        serde_json::from_slice(tx).map_err(|e| Error::Decode(e.to_string()))
    }
}

pub struct FixedFees(pub Result<u64, String>);

#[async_trait]
impl FeeOracle for FixedFees {
    async fn estimate(&self, _tx: &[u8], _network: Network) -> Result<u64, Error> {
        self.0.clone().map_err(Error::Rpc)
    }
}

/// Records every `(sponsor_index, nonce)` it countersigns.
#[derive(Default)]
pub struct RecordingSigner {
    pub signed: Mutex<Vec<(usize, Option<u64>, u64)>>,
}

#[async_trait]
impl SponsorSigner for RecordingSigner {
    async fn sponsor(&self, order: &SponsorOrder<'_>) -> Result<SignedTransaction, Error> {
        self.signed
            .lock()
            .unwrap()
            .push((order.sponsor_index, order.nonce, order.fee));
        tokio::task::yield_now().await;
        let mut bytes = order.tx.to_vec();
        bytes.push(order.sponsor_index as u8);
        Ok(SignedTransaction { bytes, txid: None })
    }
}

/// What the broadcaster does with the next transaction.
#[derive(Clone)]
pub enum Verdict {
    Accept,
    Reject(String),
    Fail,
    /// Never returns until released.
    Hang,
}

pub struct ScriptedBroadcaster {
    script: Mutex<Vec<Verdict>>,
    sent: AtomicU64,
    pub release: Notify,
}

impl ScriptedBroadcaster {
    /// Verdicts are consumed in order; once exhausted every broadcast is accepted.
    pub fn new(script: Vec<Verdict>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().rev().collect()),
            sent: AtomicU64::new(0),
            release: Notify::new(),
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broadcaster for ScriptedBroadcaster {
    async fn broadcast(
        &self,
        _tx: &SignedTransaction,
        _network: Network,
    ) -> Result<BroadcastOutcome, Error> {
        let n = self.sent.fetch_add(1, Ordering::SeqCst);
        let verdict = self.script.lock().unwrap().pop().unwrap_or(Verdict::Accept);
        match verdict {
            Verdict::Accept => Ok(BroadcastOutcome::Accepted {
                txid: format!("0x{n:064x}"),
            }),
            Verdict::Reject(reason) => Ok(BroadcastOutcome::Rejected {
                error: "transaction rejected".into(),
                reason: Some(reason),
                reason_data: None,
                txid: None,
            }),
            Verdict::Fail => Err(Error::Rpc("node unreachable".into())),
            Verdict::Hang => {
                self.release.notified().await;
                Err(Error::Rpc("released".into()))
            }
        }
    }
}

#[derive(Default)]
pub struct ChainNonces {
    pub nonces: Mutex<HashMap<String, u64>>,
}

#[async_trait]
impl NonceSource for ChainNonces {
    async fn account_nonce(&self, address: &str, _network: Network) -> Result<u64, Error> {
        Ok(self.nonces.lock().unwrap().get(address).copied().unwrap_or(0))
    }
}

/// Handles to the fakes behind one relay.
pub struct Harness {
    pub relay: Relay,
    pub pool: Arc<NoncePool>,
    pub signer: Arc<RecordingSigner>,
    pub broadcaster: Arc<ScriptedBroadcaster>,
    pub nonces: Arc<ChainNonces>,
}

pub struct HarnessBuilder {
    sponsors: Vec<String>,
    chaining_limit: usize,
    store: Arc<dyn StateStore>,
    script: Vec<Verdict>,
    fees: Result<u64, String>,
    settings: RelaySettings,
    chain: HashMap<String, u64>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            sponsors: vec![SPONSOR_A.into(), SPONSOR_B.into()],
            chaining_limit: 25,
            store: Arc::new(MemoryStore::new()),
            script: Vec::new(),
            fees: Ok(FEE_ESTIMATE),
            settings: RelaySettings {
                max_fee: 510_000,
                dev_mode: false,
                nonce_management: true,
            },
            chain: HashMap::new(),
        }
    }
}

impl HarnessBuilder {
    pub fn sponsors(mut self, sponsors: &[&str]) -> Self {
        self.sponsors = sponsors.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn chaining_limit(mut self, limit: usize) -> Self {
        self.chaining_limit = limit;
        self
    }

    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = store;
        self
    }

    pub fn script(mut self, script: Vec<Verdict>) -> Self {
        self.script = script;
        self
    }

    pub fn fees(mut self, fees: Result<u64, String>) -> Self {
        self.fees = fees;
        self
    }

    pub fn settings(mut self, settings: RelaySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn chain_nonce(mut self, address: &str, nonce: u64) -> Self {
        self.chain.insert(address.to_string(), nonce);
        self
    }

    pub fn build(self) -> Result<Harness> {
        let signer = Arc::new(RecordingSigner::default());
        let broadcaster = Arc::new(ScriptedBroadcaster::new(self.script));
        let nonces = Arc::new(ChainNonces {
            nonces: Mutex::new(self.chain),
        });
        let collaborators = Collaborators {
            codec: Arc::new(JsonCodec),
            fees: Arc::new(FixedFees(self.fees)),
            signer: signer.clone(),
            broadcaster: broadcaster.clone(),
            nonces: nonces.clone(),
        };
        let pool = Arc::new(NoncePool::new(
            self.sponsors.len(),
            self.chaining_limit,
            self.store,
        ));
        let accounts = SponsorAccounts::new(self.sponsors, pool.clone())?;
        let relay = Relay::new(builtin_programs(Some(CALLER)), collaborators, self.settings)
            .with_network(Network::Testnet, accounts);
        Ok(Harness {
            relay,
            pool,
            signer,
            broadcaster,
            nonces,
        })
    }
}

/// Unique scratch directory under the system temp dir.
pub fn scratch_dir(tag: &str) -> std::path::PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "sponsor-relayer-{tag}-{}-{nanos}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
