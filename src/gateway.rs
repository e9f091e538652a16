// src/gateway.rs
//! Gateway and precompile call plumbing
//!
//! Contracts stay opaque RPC targets: calldata is built from signatures and
//! ABI tokens, reads go through `eth_call`, and nothing here knows staking
//! semantics. The user's wallet signs writes; this module only prepares and
//! reads.

use async_trait::async_trait;
use ethers::abi::{decode, encode, ParamType, Token};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};
use std::sync::Arc;
use tracing::debug;

use crate::binding::BindingSource;
use crate::error::{classify_provider_error, StakingError};
use crate::orchestrator::ReceiptSource;

/// Staker identity as the Imua REST API keys it: `${address}_0x${chainIdHex}`.
/// The rendering shell uses this when building operator/delegation/reward
/// query paths; nothing chain-facing needs it.
pub fn staker_id(address: &str, client_chain_id: u32) -> String {
    format!("{}_0x{:x}", address.to_lowercase(), client_chain_id)
}

/// Selector + ABI-encoded arguments.
fn call_data(signature: &str, tokens: &[Token]) -> Bytes {
    let mut data = ethers::utils::id(signature).to_vec();
    data.extend(encode(tokens));
    Bytes::from(data)
}

/// Calldata builders for the client-chain gateway / Bootstrap entry points.
#[derive(Debug, Clone)]
pub struct GatewayCalls {
    pub address: Address,
}

impl GatewayCalls {
    pub fn new(address: &str) -> Result<Self, StakingError> {
        let address = address
            .parse::<Address>()
            .map_err(|e| StakingError::Validation(format!("bad gateway address: {}", e)))?;
        Ok(Self { address })
    }

    pub fn deposit(&self, token: Address, amount: U256) -> Bytes {
        call_data(
            "deposit(address,uint256)",
            &[Token::Address(token), Token::Uint(amount)],
        )
    }

    /// Deposit and delegate in one transaction.
    pub fn deposit_then_delegate(&self, token: Address, amount: U256, operator: &str) -> Bytes {
        call_data(
            "depositThenDelegateTo(address,uint256,string)",
            &[
                Token::Address(token),
                Token::Uint(amount),
                Token::String(operator.to_string()),
            ],
        )
    }

    pub fn delegate_to(&self, operator: &str, token: Address, amount: U256) -> Bytes {
        call_data(
            "delegateTo(string,address,uint256)",
            &[
                Token::String(operator.to_string()),
                Token::Address(token),
                Token::Uint(amount),
            ],
        )
    }

    pub fn undelegate_from(&self, operator: &str, token: Address, amount: U256) -> Bytes {
        call_data(
            "undelegateFrom(string,address,uint256)",
            &[
                Token::String(operator.to_string()),
                Token::Address(token),
                Token::Uint(amount),
            ],
        )
    }

    pub fn claim_principal(&self, token: Address, amount: U256) -> Bytes {
        call_data(
            "claimPrincipalFromImuachain(address,uint256)",
            &[Token::Address(token), Token::Uint(amount)],
        )
    }

    pub fn withdraw_principal(&self, token: Address, amount: U256, recipient: Address) -> Bytes {
        call_data(
            "withdrawPrincipal(address,uint256,address)",
            &[
                Token::Address(token),
                Token::Uint(amount),
                Token::Address(recipient),
            ],
        )
    }

    /// Validator deposit (NST). Amount travels as msg.value.
    pub fn stake_validator(
        &self,
        pubkey: &[u8],
        signature: &[u8],
        deposit_data_root: [u8; 32],
    ) -> Bytes {
        call_data(
            "stake(bytes,bytes,bytes32)",
            &[
                Token::Bytes(pubkey.to_vec()),
                Token::Bytes(signature.to_vec()),
                Token::FixedBytes(deposit_data_root.to_vec()),
            ],
        )
    }

    /// Relay fee quote for an encoded cross-chain message.
    pub fn quote(&self, message: &[u8]) -> Bytes {
        call_data("quote(bytes)", &[Token::Bytes(message.to_vec())])
    }
}

/// ERC-20 calldata builders (allowance check + approval).
pub struct Erc20Calls;

impl Erc20Calls {
    pub fn approve(spender: Address, amount: U256) -> Bytes {
        call_data(
            "approve(address,uint256)",
            &[Token::Address(spender), Token::Uint(amount)],
        )
    }

    pub fn allowance(owner: Address, spender: Address) -> Bytes {
        call_data(
            "allowance(address,address)",
            &[Token::Address(owner), Token::Address(spender)],
        )
    }
}

/// Read-only `eth_call` access to one EVM network.
pub struct EvmReader {
    provider: Arc<Provider<Http>>,
}

impl EvmReader {
    pub fn new(rpc_url: &str) -> Result<Self, StakingError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| StakingError::Internal(format!("bad RPC URL: {}", e)))?;
        Ok(Self {
            provider: Arc::new(provider),
        })
    }

    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, StakingError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        // Provider errors carry revert/connection detail in the message;
        // classify rather than blanket-tagging everything as network
        self.provider
            .call(&tx, None)
            .await
            .map_err(|e| classify_provider_error(&e.to_string()))
    }

    /// ERC-20 allowance of `owner` towards `spender`.
    pub async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, StakingError> {
        let raw = self.call(token, Erc20Calls::allowance(owner, spender)).await?;
        decode_uint(&raw)
    }
}

fn decode_uint(raw: &Bytes) -> Result<U256, StakingError> {
    let tokens = decode(&[ParamType::Uint(256)], raw)
        .map_err(|e| StakingError::Internal(format!("bad uint256 response: {}", e)))?;
    tokens
        .into_iter()
        .next()
        .and_then(|t| t.into_uint())
        .ok_or_else(|| StakingError::Internal("empty uint256 response".to_string()))
}

/// UTXOGateway binding lookup: `getImuachainAddress(uint32,bytes)`.
pub struct UtxoGatewayReader {
    reader: Arc<EvmReader>,
    gateway: Address,
}

impl UtxoGatewayReader {
    pub fn new(reader: Arc<EvmReader>, gateway_address: &str) -> Result<Self, StakingError> {
        let gateway = gateway_address
            .parse::<Address>()
            .map_err(|e| StakingError::Validation(format!("bad UTXO gateway address: {}", e)))?;
        Ok(Self { reader, gateway })
    }
}

#[async_trait]
impl BindingSource for UtxoGatewayReader {
    async fn bound_address(
        &self,
        client_chain_id: u32,
        native_address: &str,
    ) -> Result<Option<String>, StakingError> {
        let data = call_data(
            "getImuachainAddress(uint32,bytes)",
            &[
                Token::Uint(U256::from(client_chain_id)),
                Token::Bytes(native_address.as_bytes().to_vec()),
            ],
        );

        let raw = self.reader.call(self.gateway, data).await?;
        let tokens = decode(&[ParamType::Address], &raw)
            .map_err(|e| StakingError::Internal(format!("bad binding response: {}", e)))?;
        let address = tokens
            .into_iter()
            .next()
            .and_then(|t| t.into_address())
            .ok_or_else(|| StakingError::Internal("empty binding response".to_string()))?;

        // All-zero address is the "no binding" sentinel
        if address == Address::zero() {
            debug!("No binding recorded for {}", native_address);
            return Ok(None);
        }

        Ok(Some(format!("{:#x}", address)))
    }
}

/// Relay fee lookup for cross-chain messages.
#[async_trait]
pub trait FeeQuoter: Send + Sync {
    async fn quote(&self, message: &[u8]) -> Result<U256, StakingError>;
}

/// `quote(bytes)` against the gateway contract.
pub struct GatewayQuoter {
    pub reader: Arc<EvmReader>,
    pub calls: GatewayCalls,
}

#[async_trait]
impl FeeQuoter for GatewayQuoter {
    async fn quote(&self, message: &[u8]) -> Result<U256, StakingError> {
        let raw = self
            .reader
            .call(self.calls.address, self.calls.quote(message))
            .await?;
        decode_uint(&raw)
    }
}

/// Staker balance read used by cross-chain completion checks.
#[async_trait]
pub trait StakerBalanceSource: Send + Sync {
    async fn staker_balance(
        &self,
        client_chain_id: u32,
        staker_address: &str,
        token: Address,
    ) -> Result<U256, StakingError>;
}

/// Assets-precompile read: `getStakerBalanceByToken(uint32,bytes,address)`.
pub struct AssetsReader {
    reader: Arc<EvmReader>,
    precompile: Address,
}

impl AssetsReader {
    pub fn new(reader: Arc<EvmReader>, precompile_address: &str) -> Result<Self, StakingError> {
        let precompile = precompile_address
            .parse::<Address>()
            .map_err(|e| StakingError::Validation(format!("bad precompile address: {}", e)))?;
        Ok(Self { reader, precompile })
    }
}

#[async_trait]
impl StakerBalanceSource for AssetsReader {
    async fn staker_balance(
        &self,
        client_chain_id: u32,
        staker_address: &str,
        token: Address,
    ) -> Result<U256, StakingError> {
        let data = call_data(
            "getStakerBalanceByToken(uint32,bytes,address)",
            &[
                Token::Uint(U256::from(client_chain_id)),
                Token::Bytes(staker_address.as_bytes().to_vec()),
                Token::Address(token),
            ],
        );

        let raw = self.reader.call(self.precompile, data).await?;
        decode_uint(&raw)
    }
}

/// Receipt lookup over an ethers provider, for the EVM confirmation wait.
pub struct HttpReceiptSource {
    provider: Arc<Provider<Http>>,
}

impl HttpReceiptSource {
    pub fn new(rpc_url: &str) -> Result<Self, StakingError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| StakingError::Internal(format!("bad RPC URL: {}", e)))?;
        Ok(Self {
            provider: Arc::new(provider),
        })
    }
}

#[async_trait]
impl ReceiptSource for HttpReceiptSource {
    async fn receipt_status(&self, hash: &str) -> Result<Option<bool>, StakingError> {
        let hash = hash
            .parse::<H256>()
            .map_err(|e| StakingError::Validation(format!("bad transaction hash: {}", e)))?;

        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| classify_provider_error(&e.to_string()))?;

        Ok(receipt.map(|r| r.status.map(|s| s.as_u64() == 1).unwrap_or(false)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    #[test]
    fn test_staker_id_format() {
        assert_eq!(staker_id("rAlice", 2), "ralice_0x2");
        assert_eq!(
            staker_id("0xAbC0000000000000000000000000000000000001", 40),
            "0xabc0000000000000000000000000000000000001_0x28"
        );
    }

    #[test]
    fn test_calldata_has_selector_and_args() {
        let gateway = GatewayCalls::new("0x2222222222222222222222222222222222222222").unwrap();
        let data = gateway.deposit(addr(0x44), U256::from(1000u64));

        // 4-byte selector + two 32-byte words
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[..4], ethers::utils::id("deposit(address,uint256)"));

        let args = decode(
            &[ParamType::Address, ParamType::Uint(256)],
            &data[4..],
        )
        .unwrap();
        assert_eq!(args[0], Token::Address(addr(0x44)));
        assert_eq!(args[1], Token::Uint(U256::from(1000u64)));
    }

    #[test]
    fn test_delegate_calldata_roundtrip() {
        let gateway = GatewayCalls::new("0x2222222222222222222222222222222222222222").unwrap();
        let data = gateway.delegate_to("im1operator", addr(0x44), U256::from(5u64));

        let args = decode(
            &[ParamType::String, ParamType::Address, ParamType::Uint(256)],
            &data[4..],
        )
        .unwrap();
        assert_eq!(args[0], Token::String("im1operator".to_string()));
    }

    #[test]
    fn test_validator_stake_calldata() {
        let gateway = GatewayCalls::new("0x2222222222222222222222222222222222222222").unwrap();
        let data = gateway.stake_validator(&[0xaa; 48], &[0xbb; 96], [0xcc; 32]);

        let args = decode(
            &[
                ParamType::Bytes,
                ParamType::Bytes,
                ParamType::FixedBytes(32),
            ],
            &data[4..],
        )
        .unwrap();
        assert_eq!(args[0], Token::Bytes(vec![0xaa; 48]));
        assert_eq!(args[2], Token::FixedBytes(vec![0xcc; 32]));
    }

    #[test]
    fn test_bad_gateway_address_rejected() {
        assert!(GatewayCalls::new("not-an-address").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_rpc_classified_as_network_error() {
        let reader = EvmReader::new("http://127.0.0.1:1").unwrap();
        let err = reader
            .call(addr(0x22), Erc20Calls::allowance(addr(0x11), addr(0x22)))
            .await
            .unwrap_err();
        assert!(matches!(err, StakingError::Network(_)), "{:?}", err);
        assert!(err.is_retryable());
    }
}
