// src/bootstrap.rs
//! Bootstrap status source and target-network selection
//!
//! The Imua chain goes through pre-lock -> locked -> bootstrapped. Which EVM
//! network an operation targets, and whether staking is permitted at all,
//! follow from the latest polled status. Staleness is bounded only by the
//! poll interval - there is no real-time guarantee.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::{EvmNetwork, StakingConfig};
use crate::error::StakingError;
use crate::watchers::{FocusFlag, PollerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootstrapPhase {
    PreLock,
    Locked,
    Bootstrapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapStatus {
    pub is_bootstrapped: bool,
    pub is_locked: bool,
    /// Unix time at which the Imua chain spawns
    pub spawn_time: u64,
    /// Lock window before spawn, in seconds
    pub offset_duration: u64,
}

impl BootstrapStatus {
    pub fn phase(&self) -> BootstrapPhase {
        if self.is_bootstrapped {
            BootstrapPhase::Bootstrapped
        } else if self.is_locked {
            BootstrapPhase::Locked
        } else {
            BootstrapPhase::PreLock
        }
    }

    /// Staking operations are gated off during the lock window.
    pub fn staking_permitted(&self) -> bool {
        self.phase() != BootstrapPhase::Locked
    }
}

impl Default for BootstrapStatus {
    fn default() -> Self {
        Self {
            is_bootstrapped: false,
            is_locked: false,
            spawn_time: 0,
            offset_duration: 0,
        }
    }
}

/// Pick the EVM network an operation must target for the given phase.
/// Recomputed on every call - never cached across phase transitions.
pub fn target_network<'a>(status: &BootstrapStatus, config: &'a StakingConfig) -> &'a EvmNetwork {
    if status.is_bootstrapped {
        &config.mainnet_network
    } else {
        &config.bootstrap_network
    }
}

/// Polls the bootstrap-status endpoint and caches the latest answer.
pub struct BootstrapMonitor {
    endpoint: String,
    client: Client,
    status: RwLock<BootstrapStatus>,
}

impl BootstrapMonitor {
    pub fn new(endpoint: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            endpoint: endpoint.to_string(),
            client,
            status: RwLock::new(BootstrapStatus::default()),
        }
    }

    /// Latest known status (default until the first successful refresh).
    pub async fn status(&self) -> BootstrapStatus {
        *self.status.read().await
    }

    /// Fetch the status endpoint once and update the cache.
    pub async fn refresh(&self) -> Result<BootstrapStatus, StakingError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| StakingError::Network(format!("status fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(StakingError::Network(format!(
                "status endpoint returned {}",
                response.status()
            )));
        }

        let status: BootstrapStatus = response
            .json()
            .await
            .map_err(|e| StakingError::Network(format!("invalid status payload: {}", e)))?;

        let mut cached = self.status.write().await;
        if *cached != status {
            debug!("Bootstrap status changed: {:?} -> {:?}", cached.phase(), status.phase());
        }
        *cached = status;

        Ok(status)
    }

    /// For tests and host shells that obtain status out of band.
    pub async fn set_status(&self, status: BootstrapStatus) {
        *self.status.write().await = status;
    }

    /// Start the focus-gated refresh loop.
    pub fn start(self: Arc<Self>, focus: FocusFlag, interval: Duration) -> PollerHandle {
        let monitor = self;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;

                if !focus.is_focused() {
                    continue;
                }

                if let Err(e) = monitor.refresh().await {
                    warn!("Bootstrap status refresh failed: {}", e);
                }
            }
        });

        PollerHandle::new(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[test]
    fn test_phase_derivation() {
        let mut status = BootstrapStatus::default();
        assert_eq!(status.phase(), BootstrapPhase::PreLock);
        assert!(status.staking_permitted());

        status.is_locked = true;
        assert_eq!(status.phase(), BootstrapPhase::Locked);
        assert!(!status.staking_permitted());

        status.is_bootstrapped = true;
        assert_eq!(status.phase(), BootstrapPhase::Bootstrapped);
        assert!(status.staking_permitted());
    }

    #[test]
    fn test_target_network_follows_phase() {
        let config = test_config();
        let mut status = BootstrapStatus::default();

        assert_eq!(
            target_network(&status, &config).chain_id,
            config.bootstrap_network.chain_id
        );

        status.is_bootstrapped = true;
        assert_eq!(
            target_network(&status, &config).chain_id,
            config.mainnet_network.chain_id
        );
    }

    #[tokio::test]
    async fn test_monitor_defaults_before_first_refresh() {
        let monitor = BootstrapMonitor::new("http://127.0.0.1:1/status");
        assert_eq!(monitor.status().await, BootstrapStatus::default());

        // Unreachable endpoint: refresh errors, cache keeps its old value
        assert!(monitor.refresh().await.is_err());
        assert_eq!(monitor.status().await, BootstrapStatus::default());
    }
}
