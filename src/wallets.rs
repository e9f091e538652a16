// src/wallets.rs
//! Injected wallet SDK surfaces
//!
//! The core never talks to a wallet extension directly; the rendering shell
//! implements these traits over the real SDKs (wagmi/AppKit for EVM,
//! GemWallet for XRP, the Bitcoin adapter) and injects them. A `None` return
//! from a send call means the user rejected the request in the popup - that
//! is a normal outcome, not an error.

use async_trait::async_trait;
use ethers::types::{TransactionRequest, H256};

use crate::error::StakingError;

/// Network as reported by a native wallet SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDescriptor {
    pub id: String,
    pub name: String,
}

/// EVM wallet provider surface (connect, switch, submit).
#[async_trait]
pub trait EvmWallet: Send + Sync {
    /// Prompt the connect flow. Resolves with the connected address.
    async fn connect(&self) -> Result<String, StakingError>;

    async fn disconnect(&self);

    /// Currently connected address, if any.
    async fn address(&self) -> Option<String>;

    /// Chain id the wallet is currently on, if connected.
    async fn chain_id(&self) -> Option<u64>;

    /// Prompt a chain switch. May be declined by the user.
    async fn switch_chain(&self, chain_id: u64) -> Result<(), StakingError>;

    /// Submit a transaction for signing. `Ok(None)` means user rejection.
    async fn send_transaction(
        &self,
        tx: TransactionRequest,
    ) -> Result<Option<H256>, StakingError>;
}

/// Native-chain wallet surface (GemWallet-style, Bitcoin adapter).
#[async_trait]
pub trait NativeWallet: Send + Sync {
    /// Whether the extension is installed at all.
    async fn is_installed(&self) -> bool;

    /// Prompt the connect flow. Resolves with the connected address.
    async fn connect(&self) -> Result<String, StakingError>;

    async fn disconnect(&self);

    async fn address(&self) -> Option<String>;

    /// Network the wallet is currently pointed at, if connected.
    async fn network(&self) -> Option<NetworkDescriptor>;

    /// Submit a signed payment. `Ok(None)` means the user rejected or the
    /// SDK could not broadcast - no hash exists either way.
    async fn send_payment(&self, params: PaymentParams) -> Result<Option<String>, StakingError>;
}

/// Payment request for a native-chain wallet.
#[derive(Debug, Clone)]
pub struct PaymentParams {
    pub destination: String,

    /// Amount in the chain's minor unit (drops, sats).
    pub amount: u64,

    /// Hex-encoded memo carried with the payment (Imua intent routing).
    pub memo_hex: Option<String>,
}
