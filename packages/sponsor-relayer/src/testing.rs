//! Hand-written collaborator fakes shared by unit tests.

use crate::collaborators::{
    BroadcastOutcome, Broadcaster, Collaborators, FeeOracle, NonceSource, SignedTransaction,
    SponsorOrder, SponsorSigner, TransactionCodec,
};
use crate::Error;
use async_trait::async_trait;
use sponsor_policy::{
    AuthKind, ClarityValue, ContractCall, Network, Payload, TransactionView,
    SEND_MANY_NOT_CONTRACT,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const SPONSOR_A: &str = "SP1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRCBGD7R";
pub const SPONSOR_B: &str = "SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7";
pub const CALLER: &str = "SP3FBR2AGK5H9QBDH3EEN6DF8EK8JY7RX8QJ5SVTE";
pub const DEFAULT_FEE_ESTIMATE: u64 = 180;

/// Wire bytes for a sponsored NOT send-many paying `fee` to `sponsor`.
/// The fake codec's wire format is the JSON view itself.
pub fn sponsored_send_many(sponsor: &str, fee: u128) -> Vec<u8> {
    let line = |to: &str, amount: u128| {
        let mut fields = BTreeMap::new();
        fields.insert("to".to_string(), ClarityValue::Principal(to.into()));
        fields.insert("amount".to_string(), ClarityValue::UInt(amount));
        ClarityValue::Tuple(fields)
    };
    let (address, name, function) = SEND_MANY_NOT_CONTRACT;
    let view = TransactionView {
        auth: AuthKind::Sponsored,
        signer: CALLER.into(),
        payload: Payload::ContractCall(ContractCall {
            contract_address: address.into(),
            contract_name: name.into(),
            function_name: function.into(),
            function_args: vec![ClarityValue::List(vec![
                line("SP000000000000000000002Q6VF78", 1_000),
                line(sponsor, fee),
            ])],
        }),
    };
    serde_json::to_vec(&view).unwrap()
}

pub struct FakeCodec;

#[async_trait]
impl TransactionCodec for FakeCodec {
    async fn decode(&self, tx: &[u8]) -> Result<TransactionView, Error> {
        serde_json::from_slice(tx).map_err(|e| Error::Decode(format!("invalid transaction: {e}")))
    }
}

pub struct FakeFees {
    next: Mutex<Result<u64, String>>,
}

impl FakeFees {
    pub fn set(&self, result: Result<u64, String>) {
        *self.next.lock().unwrap() = result;
    }
}

#[async_trait]
impl FeeOracle for FakeFees {
    async fn estimate(&self, _tx: &[u8], _network: Network) -> Result<u64, Error> {
        self.next.lock().unwrap().clone().map_err(Error::Rpc)
    }
}

/// What the signer was asked to do.
#[derive(Debug, Clone)]
pub struct SignerCall {
    pub network: Network,
    pub fee: u64,
    pub nonce: Option<u64>,
    pub sponsor_index: usize,
    pub sponsor_address: String,
}

#[derive(Default)]
pub struct FakeSigner {
    orders: Mutex<Vec<SignerCall>>,
    fail: AtomicBool,
}

impl FakeSigner {
    pub fn orders(&self) -> Vec<SignerCall> {
        self.orders.lock().unwrap().clone()
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SponsorSigner for FakeSigner {
    async fn sponsor(&self, order: &SponsorOrder<'_>) -> Result<SignedTransaction, Error> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(Error::Signer("signing service unavailable".into()));
        }
        self.orders.lock().unwrap().push(SignerCall {
            network: order.network,
            fee: order.fee,
            nonce: order.nonce,
            sponsor_index: order.sponsor_index,
            sponsor_address: order.sponsor_address.to_string(),
        });
        let mut bytes = order.tx.to_vec();
        bytes.extend_from_slice(&order.nonce.unwrap_or_default().to_be_bytes());
        Ok(SignedTransaction { bytes, txid: None })
    }
}

#[derive(Default)]
pub struct FakeBroadcaster {
    sent: AtomicU64,
    reject: Mutex<Option<String>>,
}

impl FakeBroadcaster {
    pub fn reject_next(&self, reason: &str) {
        *self.reject.lock().unwrap() = Some(reason.to_string());
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broadcaster for FakeBroadcaster {
    async fn broadcast(
        &self,
        _tx: &SignedTransaction,
        _network: Network,
    ) -> Result<BroadcastOutcome, Error> {
        let n = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
        let txid = format!("0x{n:064x}");
        if let Some(reason) = self.reject.lock().unwrap().take() {
            return Ok(BroadcastOutcome::Rejected {
                error: "transaction rejected".into(),
                reason: Some(reason),
                reason_data: None,
                txid: Some(txid),
            });
        }
        Ok(BroadcastOutcome::Accepted { txid })
    }
}

#[derive(Default)]
pub struct FakeNonces {
    nonces: Mutex<HashMap<String, u64>>,
    calls: AtomicU64,
}

impl FakeNonces {
    pub fn set(&self, address: &str, nonce: u64) {
        self.nonces.lock().unwrap().insert(address.to_string(), nonce);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NonceSource for FakeNonces {
    async fn account_nonce(&self, address: &str, _network: Network) -> Result<u64, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.nonces.lock().unwrap().get(address).copied().unwrap_or(0))
    }
}

pub struct Fakes {
    pub codec: Arc<FakeCodec>,
    pub fees: Arc<FakeFees>,
    pub signer: Arc<FakeSigner>,
    pub broadcaster: Arc<FakeBroadcaster>,
    pub nonces: Arc<FakeNonces>,
}

impl Fakes {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            codec: self.codec.clone(),
            fees: self.fees.clone(),
            signer: self.signer.clone(),
            broadcaster: self.broadcaster.clone(),
            nonces: self.nonces.clone(),
        }
    }
}

pub fn fakes() -> Fakes {
    Fakes {
        codec: Arc::new(FakeCodec),
        fees: Arc::new(FakeFees {
            next: Mutex::new(Ok(DEFAULT_FEE_ESTIMATE)),
        }),
        signer: Arc::new(FakeSigner::default()),
        broadcaster: Arc::new(FakeBroadcaster::default()),
        nonces: Arc::new(FakeNonces::default()),
    }
}
