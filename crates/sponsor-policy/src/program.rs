//! Sponsorship programs.
//!
//! Every program runs the same skeleton: the "awaiting sponsor" gate, the
//! payload-shape check, the contract check, then the program-specific fee or
//! signer rule. Comparisons are exact string and integer equality throughout.

use crate::payment::payment_to;
use crate::result::{amount_value, detail, PolicyResult, ReasonCode};
use crate::transaction::{ContractCall, Network, TransactionView};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A contract identified by deployer address and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractId {
    pub contract_address: String,
    pub contract_name: String,
}

impl ContractId {
    pub fn new(contract_address: impl Into<String>, contract_name: impl Into<String>) -> Self {
        Self {
            contract_address: contract_address.into(),
            contract_name: contract_name.into(),
        }
    }

    fn matches(&self, call: &ContractCall) -> bool {
        self.contract_address == call.contract_address && self.contract_name == call.contract_name
    }
}

/// A single public function of a single contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractFunction {
    pub contract_address: String,
    pub contract_name: String,
    pub function_name: String,
}

impl ContractFunction {
    pub fn new(
        contract_address: impl Into<String>,
        contract_name: impl Into<String>,
        function_name: impl Into<String>,
    ) -> Self {
        Self {
            contract_address: contract_address.into(),
            contract_name: contract_name.into(),
            function_name: function_name.into(),
        }
    }

    fn matches(&self, call: &ContractCall) -> bool {
        self.contract_address == call.contract_address
            && self.contract_name == call.contract_name
            && self.function_name == call.function_name
    }
}

/// Caller-declared and relay-side parameters for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct PolicyParams<'a> {
    /// Fee the caller claims to pay, in the program's token unit.
    pub declared_fee: Option<u128>,
    /// Address fee line items must be paid to.
    pub sponsor_address: &'a str,
    pub network: Network,
}

/// One named sponsorship policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SponsorshipProgram {
    /// Calls to one function, paid for by a fee line item to the sponsor.
    #[serde(rename_all = "camelCase")]
    FixedContractFee {
        target: ContractFunction,
        min_fee: u64,
    },
    /// Calls to one function, no fee line item required.
    FixedContractNoFee { target: ContractFunction },
    /// Calls to any function of any listed contract, optionally paid for by a
    /// fee line item to the sponsor.
    #[serde(rename_all = "camelCase")]
    AllowList {
        contracts: Vec<ContractId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_fee: Option<u64>,
    },
    /// Any contract call at all.
    AnyContractCall,
    /// Any payload, as long as the origin is `signer`. Waived off mainnet.
    SignerRestricted { signer: String },
}

impl SponsorshipProgram {
    /// Pure eligibility check; never mutates its inputs.
    pub fn evaluate(&self, tx: &TransactionView, params: &PolicyParams<'_>) -> PolicyResult {
        if !tx.is_awaiting_sponsor() {
            return PolicyResult::reject(
                ReasonCode::InvalidAuthType,
                detail([("invalidAuthType", json!(tx.auth))]),
            );
        }

        match self {
            Self::SignerRestricted { signer } => check_signer(tx, signer, params.network),
            Self::FixedContractFee { target, min_fee } => with_contract_call(tx, |call| {
                if !target.matches(call) {
                    return invalid_function(call);
                }
                check_fee(call, u128::from(*min_fee), params)
            }),
            Self::FixedContractNoFee { target } => with_contract_call(tx, |call| {
                if !target.matches(call) {
                    return invalid_function(call);
                }
                PolicyResult::accept(matched_contract(call))
            }),
            Self::AllowList { contracts, min_fee } => with_contract_call(tx, |call| {
                if !contracts.iter().any(|c| c.matches(call)) {
                    return PolicyResult::reject(
                        ReasonCode::InvalidContract,
                        detail([("invalidContract", Value::String(call.contract_id()))]),
                    );
                }
                match min_fee {
                    Some(min_fee) => check_fee(call, u128::from(*min_fee), params),
                    None => PolicyResult::accept(matched_contract(call)),
                }
            }),
            Self::AnyContractCall => with_contract_call(tx, |call| {
                let mut d = matched_contract(call);
                if let Some(fee) = params.declared_fee {
                    d.insert("declaredFee".into(), amount_value(fee));
                }
                PolicyResult::accept(d)
            }),
        }
    }

    /// Minimum fee line item, for fee-bearing programs.
    pub fn minimum_fee(&self) -> Option<u64> {
        match self {
            Self::FixedContractFee { min_fee, .. } => Some(*min_fee),
            Self::AllowList { min_fee, .. } => *min_fee,
            _ => None,
        }
    }

    pub fn requires_fee(&self) -> bool {
        self.minimum_fee().is_some()
    }
}

fn with_contract_call(
    tx: &TransactionView,
    check: impl FnOnce(&ContractCall) -> PolicyResult,
) -> PolicyResult {
    match tx.contract_call() {
        Some(call) => check(call),
        None => PolicyResult::reject(
            ReasonCode::InvalidPayloadType,
            detail([("invalidPayloadType", json!(tx.payload.kind()))]),
        ),
    }
}

fn invalid_function(call: &ContractCall) -> PolicyResult {
    PolicyResult::reject(
        ReasonCode::InvalidContract,
        detail([(
            "invalidContract",
            Value::String(format!("{}::{}", call.contract_id(), call.function_name)),
        )]),
    )
}

fn matched_contract(call: &ContractCall) -> Map<String, Value> {
    detail([
        ("contractAddress", Value::String(call.contract_address.clone())),
        ("contractName", Value::String(call.contract_name.clone())),
        ("functionName", Value::String(call.function_name.clone())),
    ])
}

fn check_fee(call: &ContractCall, min_fee: u128, params: &PolicyParams<'_>) -> PolicyResult {
    let Some(payment) = payment_to(call, params.sponsor_address) else {
        return PolicyResult::reject(
            ReasonCode::NoSponsorEntry,
            detail([
                ("noSponsorEntry", Value::Bool(true)),
                ("sponsor", Value::String(params.sponsor_address.to_string())),
            ]),
        );
    };

    if payment.amount < min_fee {
        return PolicyResult::reject(
            ReasonCode::NotEnoughFees,
            detail([
                ("notEnoughFees", amount_value(payment.amount)),
                ("minimumFee", amount_value(min_fee)),
            ]),
        );
    }

    let declared = params.declared_fee.map(amount_value).unwrap_or(Value::Null);
    let d = detail([
        ("amountForSponsor", amount_value(payment.amount)),
        ("declaredFee", declared),
    ]);
    if params.declared_fee != Some(payment.amount) {
        return PolicyResult::reject(ReasonCode::FeeMismatch, d);
    }
    PolicyResult::accept(d)
}

fn check_signer(tx: &TransactionView, signer: &str, network: Network) -> PolicyResult {
    if network.is_production() && tx.signer != signer {
        return PolicyResult::reject(
            ReasonCode::InvalidSigner,
            detail([("invalidSigner", Value::String(tx.signer.clone()))]),
        );
    }
    PolicyResult::accept(detail([("signer", Value::String(tx.signer.clone()))]))
}
