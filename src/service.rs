// src/service.rs
//! Per-token staking facades
//!
//! One service per token category, unified behind `StakingService`. Each
//! operation assembles a `TxPlan` (submitter, confirmation strategy,
//! optional relay verification) and hands it to the orchestrator. What a
//! category can and cannot do is declared up front in `TokenCapabilities`
//! and enforced with `Unsupported` errors rather than discovered by
//! poking at missing methods at call time.

use async_trait::async_trait;
use ethers::types::{Address, TransactionRequest, H256, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::TokenCategory;
use crate::error::StakingError;
use crate::gateway::{Erc20Calls, EvmReader, FeeQuoter, GatewayCalls, StakerBalanceSource};
use crate::orchestrator::{
    CompletionCheck, ConfirmationStrategy, RelayVerification, TxOrchestrator, TxPlan, TxResult,
    TxSubmitter,
};
use crate::wallets::{EvmWallet, NativeWallet, PaymentParams};

/// What a token category supports, declared rather than sniffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCapabilities {
    /// Two-step exit: claim principal back from Imua, then withdraw.
    pub supports_claim: bool,
    /// Single-step withdrawal without a prior claim.
    pub direct_withdrawal: bool,
    /// Deposit and delegate can travel in one transaction.
    pub deposit_then_delegate: bool,
}

impl TokenCategory {
    pub fn capabilities(&self) -> TokenCapabilities {
        match self {
            TokenCategory::EvmLst => TokenCapabilities {
                supports_claim: true,
                direct_withdrawal: false,
                deposit_then_delegate: true,
            },
            TokenCategory::EvmNst => TokenCapabilities {
                supports_claim: true,
                direct_withdrawal: false,
                deposit_then_delegate: false,
            },
            TokenCategory::Xrp | TokenCategory::Btc => TokenCapabilities {
                supports_claim: false,
                direct_withdrawal: true,
                deposit_then_delegate: false,
            },
        }
    }
}

// ============ Validator stake validation ============

const WEI_PER_GWEI: u64 = 1_000_000_000;
const GWEI_PER_ETH: u64 = 1_000_000_000;
const MIN_VALIDATOR_ETH: u64 = 32;
const MAX_PECTRA_VALIDATOR_ETH: u64 = 2048;
const BLS_PUBKEY_LEN: usize = 48;
const BLS_SIGNATURE_LEN: usize = 96;

/// Beacon-deposit constraints, checked before anything reaches the wallet.
/// Pectra-style validators accept a range; classic ones exactly 32 ETH.
pub fn validate_validator_stake(
    amount_wei: U256,
    pubkey: &[u8],
    signature: &[u8],
    pectra_mode: bool,
) -> Result<(), StakingError> {
    if pubkey.len() != BLS_PUBKEY_LEN {
        return Err(StakingError::Validation(format!(
            "validator pubkey must be {} bytes, got {}",
            BLS_PUBKEY_LEN,
            pubkey.len()
        )));
    }
    if signature.len() != BLS_SIGNATURE_LEN {
        return Err(StakingError::Validation(format!(
            "deposit signature must be {} bytes, got {}",
            BLS_SIGNATURE_LEN,
            signature.len()
        )));
    }

    let gwei = U256::from(WEI_PER_GWEI);
    if amount_wei % gwei != U256::zero() {
        return Err(StakingError::Validation(
            "stake amount must be a multiple of 1 gwei".to_string(),
        ));
    }

    let min = U256::from(MIN_VALIDATOR_ETH) * U256::from(GWEI_PER_ETH) * gwei;
    let max = U256::from(MAX_PECTRA_VALIDATOR_ETH) * U256::from(GWEI_PER_ETH) * gwei;

    if pectra_mode {
        if amount_wei < min || amount_wei > max {
            return Err(StakingError::Validation(format!(
                "stake amount must be between {} and {} ETH",
                MIN_VALIDATOR_ETH, MAX_PECTRA_VALIDATOR_ETH
            )));
        }
    } else if amount_wei != min {
        return Err(StakingError::Validation(format!(
            "stake amount must be exactly {} ETH",
            MIN_VALIDATOR_ETH
        )));
    }

    Ok(())
}

// ============ Submitters ============

/// Submit one prepared EVM transaction through the user's wallet.
pub struct EvmSubmit {
    pub wallet: Arc<dyn EvmWallet>,
    pub tx: TransactionRequest,
}

#[async_trait]
impl TxSubmitter for EvmSubmit {
    async fn submit(&self) -> Result<Option<String>, StakingError> {
        let hash = self.wallet.send_transaction(self.tx.clone()).await?;
        Ok(hash.map(format_hash))
    }
}

fn format_hash(hash: H256) -> String {
    format!("{:?}", hash)
}

/// Submit one native-chain payment through the user's wallet.
pub struct NativeSubmit {
    pub wallet: Arc<dyn NativeWallet>,
    pub params: PaymentParams,
}

#[async_trait]
impl TxSubmitter for NativeSubmit {
    async fn submit(&self) -> Result<Option<String>, StakingError> {
        self.wallet.send_payment(self.params.clone()).await
    }
}

// ============ Completion check ============

/// Verifies relay completion by watching the staker's recorded balance on
/// Imua move from its pre-operation snapshot.
pub struct BalanceDeltaCheck {
    pub source: Arc<dyn StakerBalanceSource>,
    pub client_chain_id: u32,
    pub staker_address: String,
    pub token: Address,
    /// True when the operation should grow the balance (deposit), false
    /// when it should shrink it (withdrawal).
    pub expect_increase: bool,
}

#[async_trait]
impl CompletionCheck for BalanceDeltaCheck {
    async fn snapshot(&self) -> Result<U256, StakingError> {
        self.source
            .staker_balance(self.client_chain_id, &self.staker_address, self.token)
            .await
    }

    async fn verify(&self, before: U256) -> Result<bool, StakingError> {
        let now = self
            .source
            .staker_balance(self.client_chain_id, &self.staker_address, self.token)
            .await?;
        debug!("Staker balance {} -> {}", before, now);
        Ok(if self.expect_increase {
            now > before
        } else {
            now < before
        })
    }
}

// ============ EVM LST service ============

/// Shared pieces every relay-verified operation needs.
#[derive(Clone)]
pub struct RelayParams {
    pub check: Arc<dyn CompletionCheck>,
    pub interval: Duration,
    pub budget: Duration,
}

impl RelayParams {
    fn verification(&self) -> RelayVerification {
        RelayVerification {
            check: self.check.clone(),
            interval: self.interval,
            budget: self.budget,
        }
    }
}

/// Allowance lookup seam so approval decisions are testable offline.
#[async_trait]
pub trait AllowanceSource: Send + Sync {
    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, StakingError>;
}

#[async_trait]
impl AllowanceSource for EvmReader {
    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, StakingError> {
        EvmReader::allowance(self, token, owner, spender).await
    }
}

pub struct LstService {
    pub wallet: Arc<dyn EvmWallet>,
    pub allowance: Arc<dyn AllowanceSource>,
    pub gateway: GatewayCalls,
    pub token: Address,
    pub owner: Address,
    pub confirm: Arc<dyn ConfirmationStrategy>,
    pub orchestrator: Arc<TxOrchestrator>,
    pub relay: Option<RelayParams>,
    pub quoter: Option<Arc<dyn FeeQuoter>>,
}

impl LstService {
    fn gateway_tx(&self, data: ethers::types::Bytes) -> TransactionRequest {
        TransactionRequest::new().to(self.gateway.address).data(data)
    }

    /// ERC-20 approval pre-step, only when the current allowance falls
    /// short of the amount being moved.
    async fn approval_if_needed(
        &self,
        amount: U256,
    ) -> Result<Option<Arc<dyn TxSubmitter>>, StakingError> {
        let current = self
            .allowance
            .allowance(self.token, self.owner, self.gateway.address)
            .await?;
        if current >= amount {
            return Ok(None);
        }

        info!(
            "Allowance {} below stake amount {}, requesting approval",
            current, amount
        );
        let tx = TransactionRequest::new()
            .to(self.token)
            .data(Erc20Calls::approve(self.gateway.address, amount));
        Ok(Some(Arc::new(EvmSubmit {
            wallet: self.wallet.clone(),
            tx,
        })))
    }

    async fn run(&self, approval: Option<Arc<dyn TxSubmitter>>, data: ethers::types::Bytes) -> TxResult {
        let plan = TxPlan {
            approval,
            submit: Arc::new(EvmSubmit {
                wallet: self.wallet.clone(),
                tx: self.gateway_tx(data),
            }),
            confirm: self.confirm.clone(),
            relay: self.relay.as_ref().map(RelayParams::verification),
        };
        self.orchestrator.execute(plan).await
    }

    pub async fn stake(
        &self,
        amount: U256,
        operator: Option<&str>,
    ) -> Result<TxResult, StakingError> {
        let approval = self.approval_if_needed(amount).await?;
        let data = match operator {
            Some(op) => self.gateway.deposit_then_delegate(self.token, amount, op),
            None => self.gateway.deposit(self.token, amount),
        };
        Ok(self.run(approval, data).await)
    }

    pub async fn delegate_to(&self, operator: &str, amount: U256) -> TxResult {
        self.run(None, self.gateway.delegate_to(operator, self.token, amount))
            .await
    }

    pub async fn undelegate_from(&self, operator: &str, amount: U256) -> TxResult {
        self.run(None, self.gateway.undelegate_from(operator, self.token, amount))
            .await
    }

    pub async fn claim_principal(&self, amount: U256) -> TxResult {
        self.run(None, self.gateway.claim_principal(self.token, amount))
            .await
    }

    pub async fn withdraw_principal(&self, amount: U256, recipient: Address) -> TxResult {
        self.run(
            None,
            self.gateway.withdraw_principal(self.token, amount, recipient),
        )
        .await
    }
}

// ============ EVM NST service ============

pub struct NstService {
    pub wallet: Arc<dyn EvmWallet>,
    pub gateway: GatewayCalls,
    /// Virtual token address standing in for beacon-chain ETH.
    pub token: Address,
    pub pectra_mode: bool,
    pub confirm: Arc<dyn ConfirmationStrategy>,
    pub orchestrator: Arc<TxOrchestrator>,
    pub relay: Option<RelayParams>,
    pub quoter: Option<Arc<dyn FeeQuoter>>,
}

impl NstService {
    async fn run(&self, tx: TransactionRequest) -> TxResult {
        let plan = TxPlan {
            approval: None,
            submit: Arc::new(EvmSubmit {
                wallet: self.wallet.clone(),
                tx,
            }),
            confirm: self.confirm.clone(),
            relay: self.relay.as_ref().map(RelayParams::verification),
        };
        self.orchestrator.execute(plan).await
    }

    /// Validator deposit. Amount travels as transaction value, not as a
    /// calldata argument.
    pub async fn stake_validator(
        &self,
        amount_wei: U256,
        pubkey: &[u8],
        signature: &[u8],
        deposit_data_root: [u8; 32],
    ) -> Result<TxResult, StakingError> {
        validate_validator_stake(amount_wei, pubkey, signature, self.pectra_mode)?;

        let tx = TransactionRequest::new()
            .to(self.gateway.address)
            .data(self.gateway.stake_validator(pubkey, signature, deposit_data_root))
            .value(amount_wei);
        Ok(self.run(tx).await)
    }

    pub async fn delegate_to(&self, operator: &str, amount: U256) -> TxResult {
        let data = self.gateway.delegate_to(operator, self.token, amount);
        self.run(TransactionRequest::new().to(self.gateway.address).data(data))
            .await
    }

    pub async fn undelegate_from(&self, operator: &str, amount: U256) -> TxResult {
        let data = self.gateway.undelegate_from(operator, self.token, amount);
        self.run(TransactionRequest::new().to(self.gateway.address).data(data))
            .await
    }

    pub async fn claim_principal(&self, amount: U256) -> TxResult {
        let data = self.gateway.claim_principal(self.token, amount);
        self.run(TransactionRequest::new().to(self.gateway.address).data(data))
            .await
    }
}

// ============ Native-chain services (XRP, BTC) ============

/// Staking by payment into the chain's vault address, with the bound Imua
/// address carried in the memo for intent routing. Delegation happens on
/// the Imua chain through the bound EVM wallet.
pub struct NativeChainService {
    pub wallet: Arc<dyn NativeWallet>,
    pub evm_wallet: Arc<dyn EvmWallet>,
    pub vault_address: String,
    pub bound_address: String,
    /// Virtual token address representing this asset on Imua.
    pub token: Address,
    pub gateway: GatewayCalls,
    pub payment_confirm: Arc<dyn ConfirmationStrategy>,
    pub evm_confirm: Arc<dyn ConfirmationStrategy>,
    pub orchestrator: Arc<TxOrchestrator>,
    pub relay: Option<RelayParams>,
    pub quoter: Option<Arc<dyn FeeQuoter>>,
}

/// Memo payload: the bound EVM address, hex without the 0x prefix. Wallets
/// reject malformed memo hex after the user has already approved, so it is
/// checked here first.
fn memo_for(bound_address: &str) -> Result<String, StakingError> {
    let trimmed = bound_address.trim_start_matches("0x").to_lowercase();
    hex::decode(&trimmed).map_err(|_| {
        StakingError::Validation(format!("bound address {} is not valid hex", bound_address))
    })?;
    Ok(trimmed)
}

impl NativeChainService {
    pub async fn stake(&self, amount: U256) -> Result<TxResult, StakingError> {
        if amount > U256::from(u64::MAX) {
            return Err(StakingError::Validation(
                "amount exceeds the chain's representable range".to_string(),
            ));
        }

        let params = PaymentParams {
            destination: self.vault_address.clone(),
            amount: amount.as_u64(),
            memo_hex: Some(memo_for(&self.bound_address)?),
        };

        let plan = TxPlan {
            approval: None,
            submit: Arc::new(NativeSubmit {
                wallet: self.wallet.clone(),
                params,
            }),
            confirm: self.payment_confirm.clone(),
            relay: self.relay.as_ref().map(RelayParams::verification),
        };
        Ok(self.orchestrator.execute(plan).await)
    }

    async fn run_evm(&self, data: ethers::types::Bytes) -> TxResult {
        let plan = TxPlan {
            approval: None,
            submit: Arc::new(EvmSubmit {
                wallet: self.evm_wallet.clone(),
                tx: TransactionRequest::new().to(self.gateway.address).data(data),
            }),
            confirm: self.evm_confirm.clone(),
            relay: None,
        };
        self.orchestrator.execute(plan).await
    }

    pub async fn delegate_to(&self, operator: &str, amount: U256) -> TxResult {
        self.run_evm(self.gateway.delegate_to(operator, self.token, amount))
            .await
    }

    pub async fn undelegate_from(&self, operator: &str, amount: U256) -> TxResult {
        self.run_evm(self.gateway.undelegate_from(operator, self.token, amount))
            .await
    }

    /// Single-step principal withdrawal back to the native chain. The
    /// gateway credits the bound EVM account, which then bridges out.
    pub async fn withdraw_principal(&self, amount: U256) -> Result<TxResult, StakingError> {
        let recipient = self.bound_address.parse::<Address>().map_err(|e| {
            StakingError::Validation(format!(
                "bound address {} is not an EVM address: {}",
                self.bound_address, e
            ))
        })?;
        Ok(self
            .run_evm(self.gateway.withdraw_principal(self.token, amount, recipient))
            .await)
    }
}

// ============ Unified dispatch ============

/// One service per configured token, dispatched exhaustively. Operations a
/// category does not support fail fast with `Unsupported` instead of being
/// absent from the surface.
pub enum StakingService {
    EvmLst(LstService),
    EvmNst(NstService),
    Xrp(NativeChainService),
    Btc(NativeChainService),
}

impl StakingService {
    pub fn capabilities(&self) -> TokenCapabilities {
        self.category().capabilities()
    }

    pub fn category(&self) -> TokenCategory {
        match self {
            StakingService::EvmLst(_) => TokenCategory::EvmLst,
            StakingService::EvmNst(_) => TokenCategory::EvmNst,
            StakingService::Xrp(_) => TokenCategory::Xrp,
            StakingService::Btc(_) => TokenCategory::Btc,
        }
    }

    /// Deposit into Imua. For LST an operator may be supplied to deposit
    /// and delegate in one transaction; validator (NST) deposits go through
    /// `stake_validator` instead.
    pub async fn stake(
        &self,
        amount: U256,
        operator: Option<&str>,
    ) -> Result<TxResult, StakingError> {
        match self {
            StakingService::EvmLst(s) => s.stake(amount, operator).await,
            StakingService::EvmNst(_) => {
                Err(StakingError::Unsupported("validator stake required"))
            }
            StakingService::Xrp(s) | StakingService::Btc(s) => {
                if operator.is_some() {
                    return Err(StakingError::Unsupported("deposit-then-delegate"));
                }
                s.stake(amount).await
            }
        }
    }

    /// Beacon validator deposit. Only meaningful for NST tokens.
    pub async fn stake_validator(
        &self,
        amount_wei: U256,
        pubkey: &[u8],
        signature: &[u8],
        deposit_data_root: [u8; 32],
    ) -> Result<TxResult, StakingError> {
        match self {
            StakingService::EvmNst(s) => {
                s.stake_validator(amount_wei, pubkey, signature, deposit_data_root)
                    .await
            }
            StakingService::EvmLst(_) | StakingService::Xrp(_) | StakingService::Btc(_) => {
                Err(StakingError::Unsupported("validator stake"))
            }
        }
    }

    pub async fn delegate_to(
        &self,
        operator: &str,
        amount: U256,
    ) -> Result<TxResult, StakingError> {
        Ok(match self {
            StakingService::EvmLst(s) => s.delegate_to(operator, amount).await,
            StakingService::EvmNst(s) => s.delegate_to(operator, amount).await,
            StakingService::Xrp(s) | StakingService::Btc(s) => {
                s.delegate_to(operator, amount).await
            }
        })
    }

    pub async fn undelegate_from(
        &self,
        operator: &str,
        amount: U256,
    ) -> Result<TxResult, StakingError> {
        Ok(match self {
            StakingService::EvmLst(s) => s.undelegate_from(operator, amount).await,
            StakingService::EvmNst(s) => s.undelegate_from(operator, amount).await,
            StakingService::Xrp(s) | StakingService::Btc(s) => {
                s.undelegate_from(operator, amount).await
            }
        })
    }

    /// First leg of the two-step exit.
    pub async fn claim_principal(&self, amount: U256) -> Result<TxResult, StakingError> {
        match self {
            StakingService::EvmLst(s) => Ok(s.claim_principal(amount).await),
            StakingService::EvmNst(s) => Ok(s.claim_principal(amount).await),
            StakingService::Xrp(_) | StakingService::Btc(_) => {
                Err(StakingError::Unsupported("claim principal"))
            }
        }
    }

    /// Relay fee estimate for an encoded cross-chain message.
    pub async fn quote(&self, message: &[u8]) -> Result<U256, StakingError> {
        let quoter = match self {
            StakingService::EvmLst(s) => &s.quoter,
            StakingService::EvmNst(s) => &s.quoter,
            StakingService::Xrp(s) | StakingService::Btc(s) => &s.quoter,
        };
        match quoter {
            Some(q) => q.quote(message).await,
            None => Err(StakingError::Unsupported("relay fee quote")),
        }
    }

    /// Second leg for claim-capable tokens; the whole exit for
    /// direct-withdrawal ones.
    pub async fn withdraw_principal(
        &self,
        amount: U256,
        recipient: Option<Address>,
    ) -> Result<TxResult, StakingError> {
        match self {
            StakingService::EvmLst(s) => {
                let recipient = recipient.unwrap_or(s.owner);
                Ok(s.withdraw_principal(amount, recipient).await)
            }
            StakingService::EvmNst(_) => {
                Err(StakingError::Unsupported("principal withdrawal"))
            }
            StakingService::Xrp(s) | StakingService::Btc(s) => {
                s.withdraw_principal(amount).await
            }
        }
    }
}
