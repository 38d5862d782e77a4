//! Error types for the relayer.

use crate::nonce_pool::PoolError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use sponsor_policy::PolicyResult;
use std::fmt;

/// Relayer error type.
#[derive(Debug)]
pub enum Error {
    /// Malformed request body or undecodable transaction.
    Decode(String),
    /// The program declined the transaction.
    PolicyRejected(PolicyResult),
    NoncePool(PoolError),
    /// The node refused the signed transaction; the nonce went back to the pool.
    BroadcastRejected {
        error: String,
        reason: Option<String>,
        reason_data: Option<Value>,
        txid: Option<String>,
    },
    /// Signing service or codec failure.
    Signer(String),
    /// Node communication error.
    Rpc(String),
    Config(String),
    UnknownProgram(String),
    UnsupportedNetwork(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Decode(_)
            | Error::PolicyRejected(_)
            | Error::BroadcastRejected { .. }
            | Error::UnsupportedNetwork(_) => StatusCode::BAD_REQUEST,
            Error::NoncePool(PoolError::ExhaustedPool { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Error::NoncePool(_) | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Signer(_) | Error::Rpc(_) => StatusCode::BAD_GATEWAY,
            Error::UnknownProgram(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Stable machine-readable kind, also used as the metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Decode(_) => "decode",
            Error::PolicyRejected(_) => "policy",
            Error::NoncePool(PoolError::ExhaustedPool { .. }) => "exhausted",
            Error::NoncePool(_) => "nonce_pool",
            Error::BroadcastRejected { .. } => "broadcast",
            Error::Signer(_) => "signer",
            Error::Rpc(_) => "rpc",
            Error::Config(_) => "config",
            Error::UnknownProgram(_) => "unknown_program",
            Error::UnsupportedNetwork(_) => "unsupported_network",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Decode(msg) => write!(f, "decode error: {msg}"),
            Error::PolicyRejected(result) => {
                write!(f, "not sponsorable: {}", result.reason_code())
            }
            Error::NoncePool(e) => write!(f, "{e}"),
            Error::BroadcastRejected { error, reason, .. } => match reason {
                Some(reason) => write!(f, "broadcast rejected: {error} ({reason})"),
                None => write!(f, "broadcast rejected: {error}"),
            },
            Error::Signer(msg) => write!(f, "signer error: {msg}"),
            Error::Rpc(msg) => write!(f, "rpc error: {msg}"),
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::UnknownProgram(name) => write!(f, "unknown sponsorship program: {name}"),
            Error::UnsupportedNetwork(net) => write!(f, "network not served: {net}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NoncePool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PoolError> for Error {
    fn from(e: PoolError) -> Self {
        Error::NoncePool(e)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "success": false,
            "error": self.to_string(),
            "kind": self.kind(),
        });
        match &self {
            Error::PolicyRejected(result) => {
                body["reasonCode"] = json!(result.reason_code());
                body["detail"] = Value::Object(result.detail().clone());
            }
            Error::BroadcastRejected {
                reason,
                reason_data,
                txid,
                ..
            } => {
                body["reason"] = json!(reason);
                body["reasonData"] = reason_data.clone().unwrap_or(Value::Null);
                body["txid"] = json!(txid);
            }
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}
