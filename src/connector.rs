// src/connector.rs
//! Wallet readiness derivation
//!
//! For a token's chain pairing, compute whether the user can proceed to
//! stake and, if not, which unresolved issues block them. Derivation is a
//! pure function of the inputs - nothing here is cached, so a bootstrap
//! phase flip or a wallet event changes the answer on the very next
//! evaluation. The durable record lives in the registry; this value is
//! recomputed each tick and never persisted.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::bootstrap::BootstrapStatus;
use crate::wallet_store::BindingState;
use crate::wallets::{EvmWallet, NativeWallet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    NeedsInstallNative,
    NeedsConnectNative,
    NeedsSwitchNative,
    NeedsConnectBindingEvm,
    NeedsSwitchBindingEvm,
    NeedsMatchingAddress,
}

/// Resolves one issue with exactly one side-effecting action. Resolution
/// means "the outcome is observable, re-evaluate" - user cancellation also
/// resolves, it never rejects.
#[async_trait]
pub trait IssueResolver: Send + Sync {
    async fn resolve(&self);
}

pub struct Issue {
    pub kind: IssueKind,
    /// False when only manual user action can clear this (show instructions
    /// instead of a button).
    pub needs_action: bool,
    /// For `NeedsMatchingAddress`: the address the EVM wallet must present.
    pub expected_bound_address: Option<String>,
    pub resolver: Option<Arc<dyn IssueResolver>>,
}

impl Issue {
    fn manual(kind: IssueKind) -> Self {
        Self {
            kind,
            needs_action: false,
            expected_bound_address: None,
            resolver: None,
        }
    }

    fn actionable(kind: IssueKind, resolver: Option<Arc<dyn IssueResolver>>) -> Self {
        Self {
            kind,
            needs_action: true,
            expected_bound_address: None,
            resolver,
        }
    }
}

pub struct Readiness {
    pub issues: Vec<Issue>,
    pub target_chain_id: u64,
}

impl Readiness {
    pub fn is_ready_for_staking(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }
}

/// Everything the derivation looks at, gathered from the registry and the
/// live SDKs immediately before evaluation.
#[derive(Debug, Clone)]
pub struct ReadinessInputs {
    pub native_installed: bool,
    pub native_connected: bool,
    /// Whether the native wallet reports the required network
    pub native_network_ok: bool,
    pub evm_connected: bool,
    pub evm_chain_id: Option<u64>,
    pub evm_address: Option<String>,
    pub binding: BindingState,
    pub bootstrap: BootstrapStatus,
    pub bootstrap_chain_id: u64,
    pub mainnet_chain_id: u64,
}

impl ReadinessInputs {
    /// Required EVM chain id for the current phase. Never cached across
    /// phase transitions.
    pub fn target_chain_id(&self) -> u64 {
        if self.bootstrap.is_bootstrapped {
            self.mainnet_chain_id
        } else {
            self.bootstrap_chain_id
        }
    }
}

/// Pure issue-set derivation. `is_ready_for_staking` holds iff this returns
/// no issues.
pub fn evaluate(inputs: &ReadinessInputs) -> Readiness {
    let target_chain_id = inputs.target_chain_id();
    let mut issues = Vec::new();

    if !inputs.native_installed {
        issues.push(Issue::manual(IssueKind::NeedsInstallNative));
    } else if !inputs.native_connected {
        issues.push(Issue::actionable(IssueKind::NeedsConnectNative, None));
    } else if !inputs.native_network_ok {
        // Native wallets expose no programmatic network switch
        issues.push(Issue::manual(IssueKind::NeedsSwitchNative));
    }

    if !inputs.evm_connected {
        issues.push(Issue::actionable(IssueKind::NeedsConnectBindingEvm, None));
    } else {
        if inputs.evm_chain_id != Some(target_chain_id) {
            issues.push(Issue::actionable(IssueKind::NeedsSwitchBindingEvm, None));
        }

        if let BindingState::Bound(bound) = &inputs.binding {
            let matches = inputs
                .evm_address
                .as_deref()
                .map(|a| a.eq_ignore_ascii_case(bound))
                .unwrap_or(false);

            if !matches {
                let mut issue = Issue::actionable(IssueKind::NeedsMatchingAddress, None);
                issue.expected_bound_address = Some(bound.clone());
                issues.push(issue);
            }
        }
    }

    debug!(
        "Readiness: target chain {}, {} issue(s)",
        target_chain_id,
        issues.len()
    );

    Readiness {
        issues,
        target_chain_id,
    }
}

// ============ Resolver implementations ============

/// Prompt the native wallet connect flow; cancellation resolves quietly.
pub struct ConnectNativeResolver {
    pub wallet: Arc<dyn NativeWallet>,
    pub fallback_timeout: Duration,
}

#[async_trait]
impl IssueResolver for ConnectNativeResolver {
    async fn resolve(&self) {
        // Fallback timeout is longer than the wallet modal's own timeout so
        // the external flow's failure path resolves first.
        let _ = tokio::time::timeout(self.fallback_timeout, self.wallet.connect()).await;
    }
}

/// Prompt the EVM wallet connect flow.
pub struct ConnectEvmResolver {
    pub wallet: Arc<dyn EvmWallet>,
    pub fallback_timeout: Duration,
}

#[async_trait]
impl IssueResolver for ConnectEvmResolver {
    async fn resolve(&self) {
        let _ = tokio::time::timeout(self.fallback_timeout, self.wallet.connect()).await;
    }
}

/// Prompt an EVM chain switch to the phase-appropriate target.
pub struct SwitchEvmResolver {
    pub wallet: Arc<dyn EvmWallet>,
    pub target_chain_id: u64,
}

#[async_trait]
impl IssueResolver for SwitchEvmResolver {
    async fn resolve(&self) {
        if let Err(e) = self.wallet.switch_chain(self.target_chain_id).await {
            debug!("Chain switch declined: {}", e);
        }
    }
}

/// Disconnect the mismatched EVM wallet and prompt a reconnect, so the user
/// can pick the account that matches the bound address.
pub struct ReconnectEvmResolver {
    pub wallet: Arc<dyn EvmWallet>,
    pub fallback_timeout: Duration,
}

#[async_trait]
impl IssueResolver for ReconnectEvmResolver {
    async fn resolve(&self) {
        self.wallet.disconnect().await;
        let _ = tokio::time::timeout(self.fallback_timeout, self.wallet.connect()).await;
    }
}

/// Ties the pure derivation to live wallet handles, attaching resolvers.
pub struct WalletConnector {
    native: Arc<dyn NativeWallet>,
    evm: Arc<dyn EvmWallet>,
    required_native_network: String,
    bootstrap_chain_id: u64,
    mainnet_chain_id: u64,
    fallback_timeout: Duration,
}

impl WalletConnector {
    pub fn new(
        native: Arc<dyn NativeWallet>,
        evm: Arc<dyn EvmWallet>,
        required_native_network: &str,
        bootstrap_chain_id: u64,
        mainnet_chain_id: u64,
        fallback_timeout: Duration,
    ) -> Self {
        Self {
            native,
            evm,
            required_native_network: required_native_network.to_string(),
            bootstrap_chain_id,
            mainnet_chain_id,
            fallback_timeout,
        }
    }

    /// Gather live inputs, derive the issue set and attach resolvers.
    pub async fn assess(&self, binding: BindingState, bootstrap: BootstrapStatus) -> Readiness {
        let (native_installed, native_address, native_network, evm_address, evm_chain_id) = futures::join!(
            self.native.is_installed(),
            self.native.address(),
            self.native.network(),
            self.evm.address(),
            self.evm.chain_id(),
        );
        let native_network_ok = native_network
            .map(|n| n.id == self.required_native_network)
            .unwrap_or(false);

        let inputs = ReadinessInputs {
            native_installed,
            native_connected: native_address.is_some(),
            native_network_ok,
            evm_connected: evm_address.is_some(),
            evm_chain_id,
            evm_address,
            binding,
            bootstrap,
            bootstrap_chain_id: self.bootstrap_chain_id,
            mainnet_chain_id: self.mainnet_chain_id,
        };

        let mut readiness = evaluate(&inputs);
        let target_chain_id = readiness.target_chain_id;

        for issue in &mut readiness.issues {
            issue.resolver = match issue.kind {
                IssueKind::NeedsConnectNative => Some(Arc::new(ConnectNativeResolver {
                    wallet: self.native.clone(),
                    fallback_timeout: self.fallback_timeout,
                }) as Arc<dyn IssueResolver>),
                IssueKind::NeedsConnectBindingEvm => Some(Arc::new(ConnectEvmResolver {
                    wallet: self.evm.clone(),
                    fallback_timeout: self.fallback_timeout,
                })),
                IssueKind::NeedsSwitchBindingEvm => Some(Arc::new(SwitchEvmResolver {
                    wallet: self.evm.clone(),
                    target_chain_id,
                })),
                IssueKind::NeedsMatchingAddress => Some(Arc::new(ReconnectEvmResolver {
                    wallet: self.evm.clone(),
                    fallback_timeout: self.fallback_timeout,
                })),
                // Install / native network switch require manual action
                IssueKind::NeedsInstallNative | IssueKind::NeedsSwitchNative => None,
            };
        }

        readiness
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> ReadinessInputs {
        ReadinessInputs {
            native_installed: true,
            native_connected: true,
            native_network_ok: true,
            evm_connected: true,
            evm_chain_id: Some(233),
            evm_address: Some("0xAAA".to_string()),
            binding: BindingState::Bound("0xAAA".to_string()),
            bootstrap: BootstrapStatus {
                is_bootstrapped: true,
                is_locked: false,
                spawn_time: 0,
                offset_duration: 0,
            },
            bootstrap_chain_id: 11155111,
            mainnet_chain_id: 233,
        }
    }

    #[test]
    fn test_fully_paired_is_ready() {
        let readiness = evaluate(&base_inputs());
        assert!(readiness.is_ready_for_staking());
    }

    #[test]
    fn test_native_unconnected_scenario() {
        // EVM connected, native not: only the native connect issue appears
        let mut inputs = base_inputs();
        inputs.native_connected = false;
        inputs.binding = BindingState::Unchecked;

        let readiness = evaluate(&inputs);
        assert!(readiness.has(IssueKind::NeedsConnectNative));
        assert!(!readiness.has(IssueKind::NeedsConnectBindingEvm));
        assert!(!readiness.is_ready_for_staking());
    }

    #[test]
    fn test_address_mismatch_scenario() {
        // Bound to 0xAAA, EVM connects as 0xBBB
        let mut inputs = base_inputs();
        inputs.evm_address = Some("0xBBB".to_string());

        let readiness = evaluate(&inputs);
        assert!(readiness.has(IssueKind::NeedsMatchingAddress));
        let issue = readiness
            .issues
            .iter()
            .find(|i| i.kind == IssueKind::NeedsMatchingAddress)
            .unwrap();
        assert_eq!(issue.expected_bound_address.as_deref(), Some("0xAAA"));

        // Reconnecting as the bound address clears the issue
        inputs.evm_address = Some("0xAAA".to_string());
        assert!(evaluate(&inputs).is_ready_for_staking());
    }

    #[test]
    fn test_address_match_is_case_insensitive() {
        let mut inputs = base_inputs();
        inputs.evm_address = Some("0xaaa".to_string());
        assert!(evaluate(&inputs).is_ready_for_staking());
    }

    #[test]
    fn test_unchecked_binding_does_not_block() {
        let mut inputs = base_inputs();
        inputs.binding = BindingState::Unchecked;
        assert!(evaluate(&inputs).is_ready_for_staking());

        inputs.binding = BindingState::Unbound;
        assert!(evaluate(&inputs).is_ready_for_staking());
    }

    #[test]
    fn test_bootstrap_flip_retargets_chain() {
        // Ready on the bootstrap network pre-bootstrap
        let mut inputs = base_inputs();
        inputs.bootstrap.is_bootstrapped = false;
        inputs.evm_chain_id = Some(inputs.bootstrap_chain_id);
        let readiness = evaluate(&inputs);
        assert!(readiness.is_ready_for_staking());
        assert_eq!(readiness.target_chain_id, inputs.bootstrap_chain_id);

        // The phase flips mid-session: same wallet now needs a switch
        inputs.bootstrap.is_bootstrapped = true;
        let readiness = evaluate(&inputs);
        assert!(readiness.has(IssueKind::NeedsSwitchBindingEvm));
        assert_eq!(readiness.target_chain_id, inputs.mainnet_chain_id);
    }

    #[test]
    fn test_not_installed_is_manual_issue() {
        let mut inputs = base_inputs();
        inputs.native_installed = false;

        let readiness = evaluate(&inputs);
        let issue = readiness
            .issues
            .iter()
            .find(|i| i.kind == IssueKind::NeedsInstallNative)
            .unwrap();
        assert!(!issue.needs_action);
        assert!(issue.resolver.is_none());
    }

    #[test]
    fn test_wrong_native_network_is_manual() {
        let mut inputs = base_inputs();
        inputs.native_network_ok = false;

        let readiness = evaluate(&inputs);
        assert!(readiness.has(IssueKind::NeedsSwitchNative));
        let issue = readiness
            .issues
            .iter()
            .find(|i| i.kind == IssueKind::NeedsSwitchNative)
            .unwrap();
        assert!(!issue.needs_action);
    }

    /// P4: the readiness bit and the issue set are the same statement over
    /// every input combination.
    #[test]
    fn test_ready_iff_no_issues_exhaustive() {
        for native_connected in [false, true] {
            for evm_connected in [false, true] {
                for chain_ok in [false, true] {
                    for addr_ok in [false, true] {
                        let inputs = ReadinessInputs {
                            native_installed: true,
                            native_connected,
                            native_network_ok: native_connected,
                            evm_connected,
                            evm_chain_id: if chain_ok { Some(233) } else { Some(1) },
                            evm_address: if evm_connected {
                                Some(if addr_ok { "0xAAA" } else { "0xBBB" }.to_string())
                            } else {
                                None
                            },
                            binding: BindingState::Bound("0xAAA".to_string()),
                            bootstrap: BootstrapStatus {
                                is_bootstrapped: true,
                                is_locked: false,
                                spawn_time: 0,
                                offset_duration: 0,
                            },
                            bootstrap_chain_id: 11155111,
                            mainnet_chain_id: 233,
                        };

                        let readiness = evaluate(&inputs);
                        let expect_ready =
                            native_connected && evm_connected && chain_ok && addr_ok;
                        assert_eq!(
                            readiness.is_ready_for_staking(),
                            expect_ready,
                            "native={} evm={} chain={} addr={}",
                            native_connected,
                            evm_connected,
                            chain_ok,
                            addr_ok
                        );
                        assert_eq!(
                            readiness.is_ready_for_staking(),
                            readiness.issues.is_empty()
                        );
                    }
                }
            }
        }
    }
}
