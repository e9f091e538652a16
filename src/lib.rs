// src/lib.rs
//! Imua Staking Core Library
//!
//! This library provides the chain-facing core of the Imua staking client:
//! cross-chain transaction orchestration, wallet binding resolution,
//! readiness derivation, and per-token staking services. Rendering shells
//! inject wallet SDK implementations and a progress sink; everything here
//! stays UI-free.

pub mod binding;
pub mod bootstrap;
pub mod config;
pub mod connector;
pub mod error;
pub mod esplora;
pub mod gateway;
pub mod ledger;
pub mod orchestrator;
pub mod persist;
pub mod service;
pub mod wallet_store;
pub mod wallets;
pub mod watchers;

// Re-export commonly used types
pub use binding::{BindingResolver, BindingSource};
pub use bootstrap::{BootstrapMonitor, BootstrapPhase, BootstrapStatus};
pub use config::{StakingConfig, TokenCategory, TokenConfig};
pub use connector::{evaluate, IssueKind, Readiness, ReadinessInputs, WalletConnector};
pub use error::StakingError;
pub use ledger::XrplClient;
pub use orchestrator::{ProgressSink, TxOrchestrator, TxPhase, TxResult};
pub use persist::LocalStore;
pub use service::{StakingService, TokenCapabilities};
pub use wallet_store::{BindingState, WalletRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
