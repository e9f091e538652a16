// src/config.rs
//! Staking core configuration - networks, tokens and poll intervals
//! The rendering shell loads this once and hands it to every component.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingConfig {
    /// EVM network hosting the Bootstrap contract (pre-bootstrap phase)
    pub bootstrap_network: EvmNetwork,

    /// Imua mainnet network hosting the ClientChainGateway (post-bootstrap)
    pub mainnet_network: EvmNetwork,

    /// XRP Ledger endpoint and vault
    pub xrpl: XrplConfig,

    /// Esplora endpoint and Bitcoin vault
    pub esplora: EsploraConfig,

    /// REST endpoint returning the bootstrap status shape
    pub bootstrap_status_url: String,

    /// Whitelisted tokens
    pub tokens: Vec<TokenConfig>,

    /// Path for the best-effort local persistence file
    #[serde(default = "default_store_path")]
    pub store_path: String,

    #[serde(default)]
    pub intervals: PollIntervals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmNetwork {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,

    /// Gateway (Bootstrap or ClientChainGateway) contract address
    pub gateway_address: String,

    /// UTXOGateway contract address (binding lookups), if deployed here
    #[serde(default)]
    pub utxo_gateway_address: Option<String>,

    /// Assets precompile address for staker balance reads
    #[serde(default)]
    pub assets_precompile_address: Option<String>,

    /// Transaction explorer URL template containing `{hash}`
    #[serde(default)]
    pub explorer_tx_url: Option<String>,
}

impl EvmNetwork {
    /// Render an explorer link for a transaction hash, if a template is set.
    pub fn explorer_url(&self, hash: &str) -> Option<String> {
        self.explorer_tx_url
            .as_ref()
            .map(|t| t.replace("{hash}", hash))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XrplConfig {
    /// Network identity (e.g. "xrpl-testnet"); connect() treats a matching
    /// identity + URL as "already connected"
    pub network_id: String,

    /// JSON-RPC endpoint
    pub json_rpc_url: String,

    /// Vault account receiving staking deposits
    pub vault_address: String,

    /// Imua client-chain identifier for XRPL
    pub client_chain_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsploraConfig {
    pub base_url: String,

    /// Vault address receiving Bitcoin staking deposits
    pub vault_address: String,

    /// Imua client-chain identifier for Bitcoin
    pub client_chain_id: u32,
}

/// Token category drives which facade variant serves it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TokenCategory {
    /// EVM liquid-staking token
    EvmLst,
    /// EVM native/validator staking token
    EvmNst,
    Xrp,
    Btc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub category: TokenCategory,
    pub decimals: u8,

    /// ERC-20 contract address (EVM LST only)
    #[serde(default)]
    pub address: Option<String>,

    /// Whether the validator-holding contract runs in Pectra mode
    /// (variable deposits within [32, 2048] ETH instead of exactly 32)
    #[serde(default)]
    pub pectra_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollIntervals {
    /// Binding re-check while unresolved (seconds)
    #[serde(default = "default_binding_secs")]
    pub binding_secs: u64,

    /// Bootstrap status refresh (seconds)
    #[serde(default = "default_bootstrap_secs")]
    pub bootstrap_secs: u64,

    /// Native wallet network re-check (seconds)
    #[serde(default = "default_network_secs")]
    pub network_secs: u64,

    /// Ledger transaction status poll step (seconds)
    #[serde(default = "default_ledger_poll_secs")]
    pub ledger_poll_secs: u64,

    /// Total ledger validation wait budget (seconds)
    #[serde(default = "default_ledger_budget_secs")]
    pub ledger_budget_secs: u64,

    /// EVM receipt wait budget (seconds)
    #[serde(default = "default_receipt_budget_secs")]
    pub receipt_budget_secs: u64,

    /// Cross-chain relay verification budget (seconds)
    #[serde(default = "default_relay_budget_secs")]
    pub relay_budget_secs: u64,

    /// Connect-modal fallback timeout (seconds). Longer than the external
    /// wallet modal's own 30s timeout so the external flow resolves first.
    #[serde(default = "default_connect_fallback_secs")]
    pub connect_fallback_secs: u64,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            binding_secs: default_binding_secs(),
            bootstrap_secs: default_bootstrap_secs(),
            network_secs: default_network_secs(),
            ledger_poll_secs: default_ledger_poll_secs(),
            ledger_budget_secs: default_ledger_budget_secs(),
            receipt_budget_secs: default_receipt_budget_secs(),
            relay_budget_secs: default_relay_budget_secs(),
            connect_fallback_secs: default_connect_fallback_secs(),
        }
    }
}

// Default values
fn default_binding_secs() -> u64 {
    30
}

fn default_bootstrap_secs() -> u64 {
    15
}

fn default_network_secs() -> u64 {
    10
}

fn default_ledger_poll_secs() -> u64 {
    2
}

fn default_ledger_budget_secs() -> u64 {
    60
}

fn default_receipt_budget_secs() -> u64 {
    30
}

fn default_relay_budget_secs() -> u64 {
    180
}

fn default_connect_fallback_secs() -> u64 {
    35
}

fn default_store_path() -> String {
    "imua-staking-store.json".to_string()
}

impl StakingConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context("Failed to read config file")?;

        let config: StakingConfig = toml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for network in [&self.bootstrap_network, &self.mainnet_network] {
            if network.rpc_url.is_empty() {
                anyhow::bail!("RPC URL for network {} cannot be empty", network.name);
            }
            if network.chain_id == 0 {
                anyhow::bail!("Chain id for network {} cannot be zero", network.name);
            }
            if network.gateway_address.is_empty() {
                anyhow::bail!("Gateway address for network {} cannot be empty", network.name);
            }
        }

        if self.bootstrap_network.chain_id == self.mainnet_network.chain_id {
            anyhow::bail!("Bootstrap and mainnet networks must have distinct chain ids");
        }

        if self.xrpl.json_rpc_url.is_empty() {
            anyhow::bail!("XRPL JSON-RPC URL cannot be empty");
        }

        if self.bootstrap_status_url.is_empty() {
            anyhow::bail!("Bootstrap status URL cannot be empty");
        }

        let mut seen = HashSet::new();
        for token in &self.tokens {
            if !seen.insert(token.symbol.to_uppercase()) {
                anyhow::bail!("Duplicate token symbol: {}", token.symbol);
            }
            if token.category == TokenCategory::EvmLst && token.address.is_none() {
                anyhow::bail!("LST token {} requires a contract address", token.symbol);
            }
        }

        Ok(())
    }

    /// Get token config by symbol
    pub fn get_token(&self, symbol: &str) -> Option<&TokenConfig> {
        self.tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> StakingConfig {
    StakingConfig {
        bootstrap_network: EvmNetwork {
            chain_id: 11155111,
            name: "Sepolia".to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            gateway_address: "0x1111111111111111111111111111111111111111".to_string(),
            utxo_gateway_address: None,
            assets_precompile_address: None,
            explorer_tx_url: Some("https://sepolia.etherscan.io/tx/{hash}".to_string()),
        },
        mainnet_network: EvmNetwork {
            chain_id: 233,
            name: "Imua".to_string(),
            rpc_url: "http://localhost:8546".to_string(),
            gateway_address: "0x2222222222222222222222222222222222222222".to_string(),
            utxo_gateway_address: Some("0x3333333333333333333333333333333333333333".to_string()),
            assets_precompile_address: Some("0x0000000000000000000000000000000000000804".to_string()),
            explorer_tx_url: Some("https://exoscan.org/tx/{hash}".to_string()),
        },
        xrpl: XrplConfig {
            network_id: "xrpl-testnet".to_string(),
            json_rpc_url: "http://localhost:5005".to_string(),
            vault_address: "rVaultVaultVaultVaultVaultVaultVa".to_string(),
            client_chain_id: 2,
        },
        esplora: EsploraConfig {
            base_url: "http://localhost:3002".to_string(),
            vault_address: "tb1qvault".to_string(),
            client_chain_id: 1,
        },
        bootstrap_status_url: "http://localhost:8088/status".to_string(),
        tokens: vec![
            TokenConfig {
                symbol: "exoETH".to_string(),
                category: TokenCategory::EvmLst,
                decimals: 18,
                address: Some("0x4444444444444444444444444444444444444444".to_string()),
                pectra_mode: false,
            },
            TokenConfig {
                symbol: "ETH".to_string(),
                category: TokenCategory::EvmNst,
                decimals: 18,
                address: None,
                pectra_mode: false,
            },
            TokenConfig {
                symbol: "XRP".to_string(),
                category: TokenCategory::Xrp,
                decimals: 6,
                address: None,
                pectra_mode: false,
            },
        ],
        store_path: "test-store.json".to_string(),
        intervals: PollIntervals::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let config = test_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_symbol_rejected() {
        let mut config = test_config();
        let mut dup = config.tokens[0].clone();
        dup.symbol = "exoeth".to_string();
        config.tokens.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_same_chain_ids_rejected() {
        let mut config = test_config();
        config.mainnet_network.chain_id = config.bootstrap_network.chain_id;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_xrpl_endpoint_identity_is_comparable() {
        // The ledger client compares endpoint identities on reconnect
        let config = test_config();
        assert_eq!(config.xrpl, config.xrpl.clone());

        let mut other = config.xrpl.clone();
        other.json_rpc_url = "https://elsewhere.example/rpc".to_string();
        assert_ne!(config.xrpl, other);
    }

    #[test]
    fn test_explorer_url_template() {
        let config = test_config();
        let url = config.mainnet_network.explorer_url("0xabc").unwrap();
        assert_eq!(url, "https://exoscan.org/tx/0xabc");
    }

    #[test]
    fn test_default_intervals() {
        let intervals = PollIntervals::default();
        assert_eq!(intervals.binding_secs, 30);
        assert_eq!(intervals.ledger_poll_secs, 2);
        assert_eq!(intervals.ledger_budget_secs, 60);
        assert_eq!(intervals.receipt_budget_secs, 30);
        assert!(intervals.connect_fallback_secs > 30);
    }
}
