//! Read-only view of a decoded transaction.
//!
//! The relay never parses wire bytes itself; a transaction codec produces a
//! [`TransactionView`] and the programs only ever read it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Target network of a sponsorship request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub const ALL: [Network; 2] = [Network::Mainnet, Network::Testnet];

    /// Signer restrictions are only enforced on production networks.
    pub fn is_production(self) -> bool {
        matches!(self, Network::Mainnet)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            other => Err(format!("unsupported network: {other}")),
        }
    }
}

/// Authorization kind. Only `Sponsored` transactions are waiting for a sponsor signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthKind {
    Standard,
    Sponsored,
}

/// Payload discriminant, used in rejection details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PayloadKind {
    ContractCall,
    TokenTransfer,
    SmartContract,
    Other,
}

/// Clarity value as exposed by the codec for function arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClarityValue {
    Int(i128),
    #[serde(rename = "uint")]
    UInt(u128),
    Bool(bool),
    /// Hex-encoded bytes.
    Buffer(String),
    /// Canonical `address` or `address.contract-name`.
    Principal(String),
    StringAscii(String),
    StringUtf8(String),
    Optional(Option<Box<ClarityValue>>),
    ResponseOk(Box<ClarityValue>),
    ResponseErr(Box<ClarityValue>),
    List(Vec<ClarityValue>),
    Tuple(BTreeMap<String, ClarityValue>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCall {
    pub contract_address: String,
    pub contract_name: String,
    pub function_name: String,
    #[serde(default)]
    pub function_args: Vec<ClarityValue>,
}

impl ContractCall {
    /// `address.name`, the form used in allow-list rejections.
    pub fn contract_id(&self) -> String {
        format!("{}.{}", self.contract_address, self.contract_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Payload {
    ContractCall(ContractCall),
    #[serde(rename_all = "camelCase")]
    TokenTransfer { recipient: String, amount: u64 },
    #[serde(rename_all = "camelCase")]
    SmartContract { contract_name: String },
    Other,
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::ContractCall(_) => PayloadKind::ContractCall,
            Payload::TokenTransfer { .. } => PayloadKind::TokenTransfer,
            Payload::SmartContract { .. } => PayloadKind::SmartContract,
            Payload::Other => PayloadKind::Other,
        }
    }
}

/// What a program is allowed to see of a decoded transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub auth: AuthKind,
    /// Origin signer address.
    pub signer: String,
    pub payload: Payload,
}

impl TransactionView {
    pub fn contract_call(&self) -> Option<&ContractCall> {
        match &self.payload {
            Payload::ContractCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn is_awaiting_sponsor(&self) -> bool {
        self.auth == AuthKind::Sponsored
    }
}
