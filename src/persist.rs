// src/persist.rs
//! Best-effort local persistence for wallet records and UI selections
//!
//! This file is a cache, never a source of truth for fund-affecting
//! decisions. Any read problem (missing file, corrupt JSON, version
//! mismatch) degrades to defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::wallet_store::PersistedWallet;

const STORE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreFile {
    pub version: u32,

    /// Durable wallet records keyed by chain id
    #[serde(default)]
    pub wallets: HashMap<u64, PersistedWallet>,

    /// Last-selected operator per token symbol
    #[serde(default)]
    pub last_operator: HashMap<String, String>,

    /// Last-selected staking tab
    #[serde(default)]
    pub last_tab: Option<String>,

    /// Unix timestamp of the last write
    #[serde(default)]
    pub saved_at: i64,
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            wallets: HashMap::new(),
            last_operator: HashMap::new(),
            last_tab: None,
            saved_at: 0,
        }
    }
}

pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the store, degrading to defaults on any problem.
    pub async fn load(&self) -> StoreFile {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                debug!("No persisted store at {:?}: {}", self.path, e);
                return StoreFile::default();
            }
        };

        let store: StoreFile = match serde_json::from_str(&content) {
            Ok(store) => store,
            Err(e) => {
                warn!("Discarding corrupt store file {:?}: {}", self.path, e);
                return StoreFile::default();
            }
        };

        if store.version != STORE_VERSION {
            warn!(
                "Discarding store file with version {} (expected {})",
                store.version, STORE_VERSION
            );
            return StoreFile::default();
        }

        store
    }

    /// Write the store. Failures are reported but callers treat them as
    /// non-fatal - losing this file only loses convenience state.
    pub async fn save(&self, store: &StoreFile) -> Result<()> {
        let mut stamped = store.clone();
        stamped.version = STORE_VERSION;
        stamped.saved_at = chrono::Utc::now().timestamp();

        let content =
            serde_json::to_string_pretty(&stamped).context("Failed to serialize store")?;

        tokio::fs::write(&self.path, content)
            .await
            .context("Failed to write store file")?;

        debug!("Persisted store to {:?}", self.path);
        Ok(())
    }
}
