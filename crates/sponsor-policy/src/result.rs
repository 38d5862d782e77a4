//! Policy evaluation result.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Why a program accepted or rejected a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReasonCode {
    Sponsorable,
    InvalidAuthType,
    InvalidPayloadType,
    InvalidContract,
    NoSponsorEntry,
    NotEnoughFees,
    FeeMismatch,
    InvalidSigner,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::Sponsorable => "sponsorable",
            ReasonCode::InvalidAuthType => "invalidAuthType",
            ReasonCode::InvalidPayloadType => "invalidPayloadType",
            ReasonCode::InvalidContract => "invalidContract",
            ReasonCode::NoSponsorEntry => "noSponsorEntry",
            ReasonCode::NotEnoughFees => "notEnoughFees",
            ReasonCode::FeeMismatch => "feeMismatch",
            ReasonCode::InvalidSigner => "invalidSigner",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{eligible, reasonCode, detail}`. Built fresh per evaluation, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResult {
    eligible: bool,
    reason_code: ReasonCode,
    detail: Map<String, Value>,
}

impl PolicyResult {
    pub(crate) fn accept(detail: Map<String, Value>) -> Self {
        Self {
            eligible: true,
            reason_code: ReasonCode::Sponsorable,
            detail,
        }
    }

    pub(crate) fn reject(reason_code: ReasonCode, detail: Map<String, Value>) -> Self {
        Self {
            eligible: false,
            reason_code,
            detail,
        }
    }

    pub fn eligible(&self) -> bool {
        self.eligible
    }

    pub fn reason_code(&self) -> ReasonCode {
        self.reason_code
    }

    pub fn detail(&self) -> &Map<String, Value> {
        &self.detail
    }
}

/// Build a detail map from `(key, value)` pairs.
pub(crate) fn detail<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Token amounts beyond `u64` render as decimal strings.
pub(crate) fn amount_value(amount: u128) -> Value {
    match u64::try_from(amount) {
        Ok(small) => Value::from(small),
        Err(_) => Value::String(amount.to_string()),
    }
}
