// src/wallet_store.rs
//! Per-chain wallet connection state (the All-Wallets registry)
//!
//! Two layers by design: the durable record (address + binding, persisted)
//! and the live flags (connection, in-flight checks) which are re-derived
//! each session and never written to disk. Single writer per chain-id key;
//! concurrent reads are safe.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::StakingError;

/// Binding of a native-chain address to an Imua (EVM) address.
///
/// `Unchecked` = never looked up; `Unbound` = looked up, no binding exists.
/// The distinction matters: polling retries `Unchecked` only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingState {
    Unchecked,
    Unbound,
    Bound(String),
}

impl BindingState {
    /// Whether a lookup has produced an answer (Unbound counts).
    pub fn is_resolved(&self) -> bool {
        !matches!(self, BindingState::Unchecked)
    }
}

/// State for one chain-id key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletState {
    pub is_connected: bool,
    pub address: Option<String>,
    pub binding: BindingState,
    pub is_checking_binding: bool,
    pub binding_error: Option<String>,
}

impl Default for WalletState {
    fn default() -> Self {
        Self {
            is_connected: false,
            address: None,
            binding: BindingState::Unchecked,
            is_checking_binding: false,
            binding_error: None,
        }
    }
}

/// Durable subset of a wallet record. Live flags are deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedWallet {
    pub address: Option<String>,
    pub binding: BindingState,
}

/// Chain-id-keyed registry of wallet states.
pub struct WalletRegistry {
    wallets: RwLock<HashMap<u64, WalletState>>,
}

impl WalletRegistry {
    pub fn new() -> Self {
        Self {
            wallets: RwLock::new(HashMap::new()),
        }
    }

    /// Record a wallet-connect event for a chain. Creates the entry on first
    /// connect. A reconnect with a different address resets the binding -
    /// the old binding belongs to the old address.
    pub async fn connect_wallet(&self, chain_id: u64, address: &str) {
        let mut wallets = self.wallets.write().await;
        let entry = wallets.entry(chain_id).or_default();

        let address_changed = entry
            .address
            .as_deref()
            .map(|a| !a.eq_ignore_ascii_case(address))
            .unwrap_or(false);

        if address_changed {
            debug!(
                "Chain {}: address changed {:?} -> {}, resetting binding",
                chain_id, entry.address, address
            );
            entry.binding = BindingState::Unchecked;
            entry.binding_error = None;
        }

        entry.is_connected = true;
        entry.address = Some(address.to_string());
        info!("Chain {}: wallet connected as {}", chain_id, address);
    }

    /// Clear live state and binding for a chain on disconnect.
    pub async fn disconnect_wallet(&self, chain_id: u64) {
        let mut wallets = self.wallets.write().await;
        if let Some(entry) = wallets.get_mut(&chain_id) {
            *entry = WalletState::default();
            info!("Chain {}: wallet disconnected", chain_id);
        }
    }

    pub async fn get(&self, chain_id: u64) -> Option<WalletState> {
        self.wallets.read().await.get(&chain_id).cloned()
    }

    pub async fn get_or_default(&self, chain_id: u64) -> WalletState {
        self.get(chain_id).await.unwrap_or_default()
    }

    /// Record a resolved binding. Transitions only `Unchecked -> resolved`;
    /// an already-resolved binding is immutable until disconnect or an
    /// explicit `clear_binding`.
    pub async fn set_binding(
        &self,
        chain_id: u64,
        binding: BindingState,
    ) -> Result<(), StakingError> {
        if binding == BindingState::Unchecked {
            return Err(StakingError::Internal(
                "cannot set a binding back to unchecked".to_string(),
            ));
        }

        let mut wallets = self.wallets.write().await;
        let entry = wallets.entry(chain_id).or_default();

        if entry.binding.is_resolved() && entry.binding != binding {
            warn!(
                "Chain {}: refusing to overwrite resolved binding {:?} with {:?}",
                chain_id, entry.binding, binding
            );
            return Err(StakingError::Internal(
                "binding already resolved; clear it first".to_string(),
            ));
        }

        debug!("Chain {}: binding resolved to {:?}", chain_id, binding);
        entry.binding = binding;
        entry.binding_error = None;
        Ok(())
    }

    /// Explicit unbind; the only way back to `Unchecked` besides disconnect.
    pub async fn clear_binding(&self, chain_id: u64) {
        let mut wallets = self.wallets.write().await;
        if let Some(entry) = wallets.get_mut(&chain_id) {
            entry.binding = BindingState::Unchecked;
            entry.binding_error = None;
        }
    }

    pub async fn set_checking_binding(&self, chain_id: u64, checking: bool) {
        let mut wallets = self.wallets.write().await;
        let entry = wallets.entry(chain_id).or_default();
        entry.is_checking_binding = checking;
    }

    /// Record a failed lookup; binding stays `Unchecked` so polling retries.
    pub async fn set_binding_error(&self, chain_id: u64, error: &str) {
        let mut wallets = self.wallets.write().await;
        let entry = wallets.entry(chain_id).or_default();
        entry.binding_error = Some(error.to_string());
        entry.is_checking_binding = false;
    }

    /// Export the durable subset for persistence.
    pub async fn export(&self) -> HashMap<u64, PersistedWallet> {
        let wallets = self.wallets.read().await;
        wallets
            .iter()
            .map(|(chain_id, state)| {
                (
                    *chain_id,
                    PersistedWallet {
                        address: state.address.clone(),
                        binding: state.binding.clone(),
                    },
                )
            })
            .collect()
    }

    /// Restore durable records from a previous session. Connection flags
    /// start false; live state must be re-verified against the SDKs.
    pub async fn restore(&self, persisted: HashMap<u64, PersistedWallet>) {
        let mut wallets = self.wallets.write().await;
        for (chain_id, record) in persisted {
            wallets.insert(
                chain_id,
                WalletState {
                    is_connected: false,
                    address: record.address,
                    binding: record.binding,
                    is_checking_binding: false,
                    binding_error: None,
                },
            );
        }
    }
}

impl Default for WalletRegistry {
    fn default() -> Self {
        Self::new()
    }
}
