//! Ledger access errors.

use thiserror::Error;

/// Failure talking to the ledger, classified once at the RPC boundary.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// The transaction was accepted but is not mined yet.
    #[error("transaction submitted but not yet confirmed")]
    Pending,

    /// The signing wallet has a conflicting transaction in flight.
    #[error("signing conflict: {0}")]
    Conflict(String),

    /// Transport failure or the node is unreachable.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The node answered with a JSON-RPC error we do not classify further.
    #[error("ledger rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node answered with something we could not decode.
    #[error("malformed ledger response: {0}")]
    Decode(String),
}

impl LedgerError {
    /// Map a JSON-RPC error object onto a variant.
    pub fn from_rpc(code: i64, message: &str) -> Self {
        let lower = message.to_lowercase();
        if PENDING_MARKERS.iter().any(|m| lower.contains(m)) {
            return Self::Pending;
        }
        if CONFLICT_MARKERS.iter().any(|m| lower.contains(m)) {
            return Self::Conflict(message.to_string());
        }
        Self::Rpc {
            code,
            message: message.to_string(),
        }
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Unavailable(e.to_string())
        }
    }
}

/// Node messages meaning "known but not mined".
const PENDING_MARKERS: &[&str] = &[
    "transaction submitted",
    "not yet mined",
    "transaction not found",
    "could not be found",
    "receipt not available",
];

/// Node messages meaning the signer's nonce sequence collided.
const CONFLICT_MARKERS: &[&str] = &[
    "nonce too low",
    "replacement transaction underpriced",
    "already known",
    "known transaction",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rpc_messages() {
        assert!(matches!(
            LedgerError::from_rpc(-32000, "Transaction submitted, waiting for receipt"),
            LedgerError::Pending
        ));
        assert!(matches!(
            LedgerError::from_rpc(-32000, "nonce too low: next nonce 5"),
            LedgerError::Conflict(_)
        ));
        assert!(matches!(
            LedgerError::from_rpc(-32602, "invalid params"),
            LedgerError::Rpc { code: -32602, .. }
        ));
    }
}
