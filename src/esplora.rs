// src/esplora.rs
//! Esplora client for Bitcoin transaction status

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::EsploraConfig;
use crate::ledger::{QueryResult, TxLedgerStatus, TxStatusSource};

#[derive(Debug, Deserialize)]
struct TxStatusResponse {
    confirmed: bool,
}

/// Thin REST client for an Esplora-style API. A Bitcoin transaction that is
/// confirmed cannot have "failed" - inclusion is success - so `success`
/// always mirrors `finalized` here.
pub struct EsploraClient {
    client: Client,
    config: EsploraConfig,
}

impl EsploraClient {
    pub fn new(config: EsploraConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self { client, config }
    }

    pub fn vault_address(&self) -> &str {
        &self.config.vault_address
    }
}

#[async_trait]
impl TxStatusSource for EsploraClient {
    async fn transaction_status(&self, hash: &str) -> QueryResult<TxLedgerStatus> {
        let url = format!("{}/tx/{}/status", self.config.base_url, hash);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                return QueryResult::fail(
                    format!("Esplora request failed: {}", e),
                    TxLedgerStatus::default(),
                )
            }
        };

        // Unknown txid: not yet propagated, a normal intermediate state
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("Esplora has not seen {} yet", hash);
            return QueryResult::ok(TxLedgerStatus::default());
        }

        if !response.status().is_success() {
            return QueryResult::fail(
                format!("Esplora error: {}", response.status()),
                TxLedgerStatus::default(),
            );
        }

        match response.json::<TxStatusResponse>().await {
            Ok(status) => QueryResult::ok(TxLedgerStatus {
                finalized: status.confirmed,
                success: status.confirmed,
            }),
            Err(e) => QueryResult::fail(
                format!("Invalid Esplora response: {}", e),
                TxLedgerStatus::default(),
            ),
        }
    }
}
