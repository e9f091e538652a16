// src/error.rs
//! Error taxonomy for staking operations
//!
//! Retry semantics differ per class: transient network failures are safe to
//! retry, on-chain/on-ledger rejections are not (gas already spent), and
//! verification timeouts are ambiguous (the source-side effect may have
//! landed). Callers must never conflate these.

use thiserror::Error;

/// Maximum length of a user-visible error message. Provider error strings
/// can run to thousands of characters; the UI shows a summary.
const MAX_MESSAGE_LEN: usize = 160;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StakingError {
    /// The user rejected the request in their wallet popup.
    #[error("rejected in wallet: {0}")]
    UserRejected(String),

    #[error("insufficient funds for this operation")]
    InsufficientFunds,

    /// RPC or ledger endpoint unreachable, or a request timed out mid-flight.
    #[error("network error: {0}")]
    Network(String),

    /// Transaction was included but reverted on the EVM chain.
    #[error("transaction reverted on chain: {0}")]
    OnChainRejected(String),

    /// Transaction was validated by the ledger with a failure result code.
    #[error("transaction failed on the ledger: {0}")]
    OnLedgerFailure(String),

    /// Confirmation wait budget exhausted without finality.
    #[error("confirmation timed out: {0}")]
    ConfirmationTimeout(String),

    /// Bridge relay was never confirmed on the destination chain within
    /// budget. Ambiguous: the source-side effect may still have occurred.
    #[error("cross-chain verification timed out: {0}")]
    VerificationTimeout(String),

    /// Client-side input rejected before anything reached the network.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Operation not available for this token category.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("not connected")]
    NotConnected,

    #[error("internal error: {0}")]
    Internal(String),
}

impl StakingError {
    /// Whether a retry with identical inputs can possibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StakingError::Network(_)
                | StakingError::ConfirmationTimeout(_)
                | StakingError::NotConnected
        )
    }

    /// Short message suitable for direct display.
    pub fn user_message(&self) -> String {
        truncate_message(&self.to_string())
    }
}

/// Map a raw provider/wallet error string into the taxonomy.
///
/// Wallet SDKs and RPC providers disagree wildly on error shapes; string
/// matching on the stable fragments is the only portable classification.
pub fn classify_provider_error(raw: &str) -> StakingError {
    let lower = raw.to_lowercase();

    if lower.contains("user rejected")
        || lower.contains("user denied")
        || lower.contains("rejected by user")
        || lower.contains("action_rejected")
    {
        return StakingError::UserRejected(truncate_message(raw));
    }

    if lower.contains("insufficient funds") || lower.contains("insufficient balance") {
        return StakingError::InsufficientFunds;
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("dns error")
    {
        return StakingError::Network(truncate_message(raw));
    }

    if lower.contains("execution reverted") || lower.contains("revert") {
        return StakingError::OnChainRejected(truncate_message(raw));
    }

    StakingError::Internal(truncate_message(raw))
}

/// Truncate a message for display, appending an ellipsis when cut.
pub fn truncate_message(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() <= MAX_MESSAGE_LEN {
        return trimmed.to_string();
    }
    let mut cut = MAX_MESSAGE_LEN;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &trimmed[..cut])
}
