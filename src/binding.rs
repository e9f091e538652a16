// src/binding.rs
//! Binding resolution: which Imua (EVM) address owns a native-chain address
//!
//! Answers come from the UTXOGateway contract post-bootstrap. During the
//! bootstrap phase no gateway is reachable, so every address resolves to
//! "no binding" - a policy, not an error fallback. Concurrent checks for the
//! same address collapse into one contract read.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::bootstrap::BootstrapMonitor;
use crate::error::{truncate_message, StakingError};
use crate::wallet_store::{BindingState, WalletRegistry};
use crate::watchers::{FocusFlag, PollerHandle};

/// Contract-backed binding lookup. `Ok(None)` is the all-zero-address
/// sentinel: checked, no binding exists.
#[async_trait]
pub trait BindingSource: Send + Sync {
    async fn bound_address(
        &self,
        client_chain_id: u32,
        native_address: &str,
    ) -> Result<Option<String>, StakingError>;
}

pub struct BindingResolver {
    registry: Arc<WalletRegistry>,
    source: Arc<dyn BindingSource>,
    /// Registry key for the native chain this resolver serves
    chain_key: u64,
    /// Imua client-chain identifier passed to the contract read
    client_chain_id: u32,
    in_flight: Mutex<HashSet<String>>,
}

impl BindingResolver {
    pub fn new(
        registry: Arc<WalletRegistry>,
        source: Arc<dyn BindingSource>,
        chain_key: u64,
        client_chain_id: u32,
    ) -> Self {
        Self {
            registry,
            source,
            chain_key,
            client_chain_id,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Resolve the binding for a native address. Returns immediately when a
    /// check for the same address is already in flight.
    pub async fn check_binding(&self, native_address: &str, bootstrap_phase: bool) {
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(native_address.to_string()) {
                debug!("Binding check already in flight for {}", native_address);
                return;
            }
        }

        self.registry.set_checking_binding(self.chain_key, true).await;
        self.run_check(native_address, bootstrap_phase).await;
        self.registry.set_checking_binding(self.chain_key, false).await;

        let mut in_flight = self.in_flight.lock().await;
        in_flight.remove(native_address);
    }

    async fn run_check(&self, native_address: &str, bootstrap_phase: bool) {
        if bootstrap_phase {
            // No gateway deployed yet; "no binding" is the designed answer.
            debug!(
                "Bootstrap phase: assuming no binding for {}",
                native_address
            );
            if let Err(e) = self
                .registry
                .set_binding(self.chain_key, BindingState::Unbound)
                .await
            {
                debug!("Binding already resolved for {}: {}", native_address, e);
            }
            return;
        }

        match self
            .source
            .bound_address(self.client_chain_id, native_address)
            .await
        {
            Ok(resolved) => {
                let binding = match resolved {
                    Some(address) => BindingState::Bound(address),
                    None => BindingState::Unbound,
                };
                info!("Binding for {} resolved: {:?}", native_address, binding);
                if let Err(e) = self.registry.set_binding(self.chain_key, binding).await {
                    debug!("Binding already resolved for {}: {}", native_address, e);
                }
            }
            Err(e) => {
                // Leave the binding unchecked so the poller retries later.
                warn!("Binding lookup failed for {}: {}", native_address, e);
                self.registry
                    .set_binding_error(self.chain_key, &truncate_message(&e.to_string()))
                    .await;
            }
        }
    }

    /// Background re-check loop: while the connected native address is still
    /// unresolved, retry on an interval, foreground only. Addresses with a
    /// resolved binding (Unbound counts) are never polled.
    pub fn start_poller(
        self: Arc<Self>,
        monitor: Arc<BootstrapMonitor>,
        focus: FocusFlag,
        interval: Duration,
    ) -> PollerHandle {
        let resolver = self;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;

                if !focus.is_focused() {
                    continue;
                }

                let state = resolver.registry.get_or_default(resolver.chain_key).await;
                if !state.is_connected || state.binding.is_resolved() {
                    continue;
                }

                let address = match state.address {
                    Some(address) => address,
                    None => continue,
                };

                let bootstrap_phase = !monitor.status().await.is_bootstrapped;
                resolver.check_binding(&address, bootstrap_phase).await;
            }
        });

        PollerHandle::new(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const XRPL_KEY: u64 = 2;

    struct CountingSource {
        calls: AtomicUsize,
        answer: Option<String>,
        delay: Duration,
        fail: bool,
    }

    impl CountingSource {
        fn new(answer: Option<String>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                answer,
                delay: Duration::from_millis(20),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                answer: None,
                delay: Duration::ZERO,
                fail: true,
            }
        }
    }

    #[async_trait]
    impl BindingSource for CountingSource {
        async fn bound_address(
            &self,
            _client_chain_id: u32,
            _native_address: &str,
        ) -> Result<Option<String>, StakingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(StakingError::Network("gateway unreachable".to_string()));
            }
            Ok(self.answer.clone())
        }
    }

    fn resolver_with(source: Arc<CountingSource>) -> (Arc<BindingResolver>, Arc<WalletRegistry>) {
        let registry = Arc::new(WalletRegistry::new());
        let resolver = Arc::new(BindingResolver::new(
            registry.clone(),
            source,
            XRPL_KEY,
            2,
        ));
        (resolver, registry)
    }

    #[tokio::test]
    async fn test_concurrent_checks_deduplicated() {
        let source = Arc::new(CountingSource::new(Some("0xAAA".to_string())));
        let (resolver, registry) = resolver_with(source.clone());
        registry.connect_wallet(XRPL_KEY, "rAlice").await;

        let first = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.check_binding("rAlice", false).await })
        };
        let second = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.check_binding("rAlice", false).await })
        };

        first.await.unwrap();
        second.await.unwrap();

        // At most one underlying contract read
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        let state = registry.get(XRPL_KEY).await.unwrap();
        assert_eq!(state.binding, BindingState::Bound("0xAAA".to_string()));
    }

    #[tokio::test]
    async fn test_bootstrap_phase_skips_contract() {
        let source = Arc::new(CountingSource::new(Some("0xAAA".to_string())));
        let (resolver, registry) = resolver_with(source.clone());
        registry.connect_wallet(XRPL_KEY, "rAlice").await;

        resolver.check_binding("rAlice", true).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        let state = registry.get(XRPL_KEY).await.unwrap();
        assert_eq!(state.binding, BindingState::Unbound);
    }

    #[tokio::test]
    async fn test_zero_sentinel_resolves_unbound() {
        let source = Arc::new(CountingSource::new(None));
        let (resolver, registry) = resolver_with(source);
        registry.connect_wallet(XRPL_KEY, "rAlice").await;

        resolver.check_binding("rAlice", false).await;

        let state = registry.get(XRPL_KEY).await.unwrap();
        assert_eq!(state.binding, BindingState::Unbound);
    }

    #[tokio::test]
    async fn test_lookup_failure_leaves_unchecked() {
        let source = Arc::new(CountingSource::failing());
        let (resolver, registry) = resolver_with(source);
        registry.connect_wallet(XRPL_KEY, "rAlice").await;

        resolver.check_binding("rAlice", false).await;

        let state = registry.get(XRPL_KEY).await.unwrap();
        assert_eq!(state.binding, BindingState::Unchecked);
        assert!(state.binding_error.is_some());
        assert!(!state.is_checking_binding);
    }

    #[tokio::test]
    async fn test_poller_stops_after_resolution() {
        let source = Arc::new(CountingSource::new(Some("0xAAA".to_string())));
        let (resolver, registry) = resolver_with(source.clone());
        registry.connect_wallet(XRPL_KEY, "rAlice").await;

        let monitor = Arc::new(BootstrapMonitor::new("http://127.0.0.1:1/status"));
        monitor
            .set_status(crate::bootstrap::BootstrapStatus {
                is_bootstrapped: true,
                is_locked: false,
                spawn_time: 0,
                offset_duration: 0,
            })
            .await;

        let handle = resolver.clone().start_poller(
            monitor,
            FocusFlag::new(),
            Duration::from_millis(10),
        );

        // Give the poller a few ticks; it must resolve once and then go idle
        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.stop();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        let state = registry.get(XRPL_KEY).await.unwrap();
        assert_eq!(state.binding, BindingState::Bound("0xAAA".to_string()));
    }

    #[tokio::test]
    async fn test_unfocused_poller_idles() {
        let source = Arc::new(CountingSource::new(Some("0xAAA".to_string())));
        let (resolver, registry) = resolver_with(source.clone());
        registry.connect_wallet(XRPL_KEY, "rAlice").await;

        let monitor = Arc::new(BootstrapMonitor::new("http://127.0.0.1:1/status"));
        let focus = FocusFlag::new();
        focus.set_focused(false);

        let handle = resolver
            .clone()
            .start_poller(monitor, focus, Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.stop();

        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
