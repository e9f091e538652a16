// src/orchestrator.rs
//! Phased transaction execution
//!
//! One invocation drives one user-initiated operation through an ordered
//! phase pipeline, emitting an event before and after each phase's work so
//! the UI can show "processing" while the awaited call is in flight. The
//! orchestrator never throws to its caller - every attempt resolves to a
//! terminal `TxResult`. It also never retries: the underlying actions move
//! funds, and a silent double-submission is worse than a surfaced failure.

use async_trait::async_trait;
use ethers::types::U256;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::StakingError;
use crate::ledger::TxStatusSource;

/// Phase sequence (superset; operations use an in-order subset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TxPhase {
    Approving,
    SendingTx,
    ConfirmingTx,
    SendingRequest,
    ReceivingResponse,
    VerifyingCompletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Processing,
    Success,
    Error,
}

/// One phase transition, as reported to the progress sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseEvent {
    pub phase: TxPhase,
    pub status: StepStatus,
    pub tx_hash: Option<String>,
    pub explorer_url: Option<String>,
    pub error: Option<String>,
}

/// Receives phase events. The UI attaches a recorder; tests attach probes.
pub trait ProgressSink: Send + Sync {
    fn on_phase(&self, event: PhaseEvent);
}

/// Sink for callers that do not track progress.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_phase(&self, _event: PhaseEvent) {}
}

/// Terminal result of one orchestrated attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResult {
    pub hash: String,
    pub success: bool,
    pub error: Option<String>,
}

impl TxResult {
    fn ok(hash: String) -> Self {
        Self {
            hash,
            success: true,
            error: None,
        }
    }

    fn fail(hash: String, error: &StakingError) -> Self {
        Self {
            hash,
            success: false,
            error: Some(error.user_message()),
        }
    }
}

/// Submits one transaction. `Ok(None)` means the wallet produced no hash
/// (user rejection or broadcast failure) - a normal terminal outcome.
#[async_trait]
pub trait TxSubmitter: Send + Sync {
    async fn submit(&self) -> Result<Option<String>, StakingError>;
}

/// Chain-specific confirmation: receipt wait for EVM, status poll for
/// ledgers. Resolves once the transaction is final, errs on revert/ledger
/// failure/timeout with the distinctions callers rely on.
#[async_trait]
pub trait ConfirmationStrategy: Send + Sync {
    async fn wait_for_confirmation(&self, hash: &str) -> Result<(), StakingError>;
}

/// EVM receipt lookup: `Ok(None)` = no receipt yet, `Ok(Some(success))` once
/// mined. Implemented over an ethers provider in `gateway`.
#[async_trait]
pub trait ReceiptSource: Send + Sync {
    async fn receipt_status(&self, hash: &str) -> Result<Option<bool>, StakingError>;
}

/// Poll a receipt within a bounded budget.
pub struct ReceiptWait {
    source: Arc<dyn ReceiptSource>,
    pub interval: Duration,
    pub budget: Duration,
}

impl ReceiptWait {
    pub fn new(source: Arc<dyn ReceiptSource>, interval: Duration, budget: Duration) -> Self {
        Self {
            source,
            interval,
            budget,
        }
    }
}

#[async_trait]
impl ConfirmationStrategy for ReceiptWait {
    async fn wait_for_confirmation(&self, hash: &str) -> Result<(), StakingError> {
        let deadline = Instant::now() + self.budget;

        loop {
            match self.source.receipt_status(hash).await {
                Ok(Some(true)) => return Ok(()),
                Ok(Some(false)) => {
                    return Err(StakingError::OnChainRejected(
                        "transaction reverted".to_string(),
                    ))
                }
                Ok(None) => debug!("No receipt yet for {}", hash),
                // Transient lookup failure; keep polling within budget
                Err(e) => debug!("Receipt lookup failed for {}: {}", hash, e),
            }

            if Instant::now() >= deadline {
                return Err(StakingError::ConfirmationTimeout(format!(
                    "receipt wait timed out after {:?}",
                    self.budget
                )));
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}

/// Poll ledger finality within a bounded budget.
///
/// Two failure modes that must never be conflated: budget exhaustion
/// ("timed out", safe to retry) and a validated-but-failed transaction
/// ("failed on the ledger", retrying is pointless and the funds state
/// differs).
pub struct LedgerPoll {
    source: Arc<dyn TxStatusSource>,
    pub interval: Duration,
    pub budget: Duration,
}

impl LedgerPoll {
    pub fn new(source: Arc<dyn TxStatusSource>, interval: Duration, budget: Duration) -> Self {
        Self {
            source,
            interval,
            budget,
        }
    }
}

#[async_trait]
impl ConfirmationStrategy for LedgerPoll {
    async fn wait_for_confirmation(&self, hash: &str) -> Result<(), StakingError> {
        let deadline = Instant::now() + self.budget;

        loop {
            let status = self.source.transaction_status(hash).await;

            if status.success {
                if status.data.finalized && status.data.success {
                    return Ok(());
                }
                if status.data.finalized {
                    return Err(StakingError::OnLedgerFailure(
                        "transaction failed on the ledger".to_string(),
                    ));
                }
            } else {
                // A failed poll attempt is transient, not a ledger verdict
                debug!(
                    "Status poll failed for {}: {:?}",
                    hash,
                    status.error.as_deref().unwrap_or("unknown")
                );
            }

            if Instant::now() >= deadline {
                return Err(StakingError::ConfirmationTimeout(format!(
                    "ledger validation timed out after {:?}",
                    self.budget
                )));
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}

/// Destination-side completion check for cross-chain operations. The
/// orchestrator only sequences phases; what "did it actually land" means is
/// supplied by the operation (typically a balance delta on the Imua chain).
#[async_trait]
pub trait CompletionCheck: Send + Sync {
    /// Capture the pre-operation snapshot value.
    async fn snapshot(&self) -> Result<U256, StakingError>;

    /// Whether the expected state change relative to `before` is visible.
    async fn verify(&self, before: U256) -> Result<bool, StakingError>;
}

pub struct RelayVerification {
    pub check: Arc<dyn CompletionCheck>,
    pub interval: Duration,
    pub budget: Duration,
}

/// Everything one attempt needs. Built by the staking facades.
pub struct TxPlan {
    /// ERC-20 allowance or similar pre-step; failure is terminal before the
    /// main transaction is attempted.
    pub approval: Option<Arc<dyn TxSubmitter>>,
    pub submit: Arc<dyn TxSubmitter>,
    pub confirm: Arc<dyn ConfirmationStrategy>,
    /// Present for cross-chain operations that await a bridge relay.
    pub relay: Option<RelayVerification>,
}

pub struct TxOrchestrator {
    sink: Arc<dyn ProgressSink>,
    /// Explorer URL template containing `{hash}`
    explorer_template: Option<String>,
}

impl TxOrchestrator {
    pub fn new(sink: Arc<dyn ProgressSink>, explorer_template: Option<String>) -> Self {
        Self {
            sink,
            explorer_template,
        }
    }

    fn emit(&self, phase: TxPhase, status: StepStatus, hash: Option<&str>, error: Option<String>) {
        let explorer_url = match (hash, &self.explorer_template) {
            (Some(hash), Some(template)) => Some(template.replace("{hash}", hash)),
            _ => None,
        };
        self.sink.on_phase(PhaseEvent {
            phase,
            status,
            tx_hash: hash.map(str::to_string),
            explorer_url,
            error,
        });
    }

    fn terminal_error(
        &self,
        phase: TxPhase,
        hash: Option<&str>,
        error: StakingError,
    ) -> TxResult {
        warn!("Operation failed at {:?}: {}", phase, error);
        self.emit(phase, StepStatus::Error, hash, Some(error.user_message()));
        TxResult::fail(hash.unwrap_or_default().to_string(), &error)
    }

    /// Execute one attempt end to end. Phases run strictly sequentially; no
    /// phase begins before the previous one has settled.
    pub async fn execute(&self, plan: TxPlan) -> TxResult {
        // Capture the destination-side snapshot before anything is sent;
        // after submission it would already include the effect under test.
        let before_snapshot = match &plan.relay {
            Some(relay) => match relay.check.snapshot().await {
                Ok(value) => Some(value),
                Err(e) => return self.terminal_error(TxPhase::SendingTx, None, e),
            },
            None => None,
        };

        if let Some(approval) = &plan.approval {
            self.emit(TxPhase::Approving, StepStatus::Processing, None, None);

            let approval_hash = match approval.submit().await {
                Ok(Some(hash)) => hash,
                Ok(None) => {
                    return self.terminal_error(
                        TxPhase::Approving,
                        None,
                        StakingError::UserRejected("approval produced no hash".to_string()),
                    )
                }
                Err(e) => return self.terminal_error(TxPhase::Approving, None, e),
            };

            if let Err(e) = plan.confirm.wait_for_confirmation(&approval_hash).await {
                return self.terminal_error(TxPhase::Approving, Some(&approval_hash), e);
            }

            self.emit(
                TxPhase::Approving,
                StepStatus::Success,
                Some(&approval_hash),
                None,
            );
        }

        self.emit(TxPhase::SendingTx, StepStatus::Processing, None, None);

        let hash = match plan.submit.submit().await {
            Ok(Some(hash)) => hash,
            Ok(None) => {
                // User rejection or broadcast failure: nothing to poll for
                return self.terminal_error(
                    TxPhase::SendingTx,
                    None,
                    StakingError::UserRejected(
                        "wallet returned no transaction hash".to_string(),
                    ),
                );
            }
            Err(e) => return self.terminal_error(TxPhase::SendingTx, None, e),
        };

        info!("Transaction submitted: {}", hash);
        self.emit(TxPhase::SendingTx, StepStatus::Success, Some(&hash), None);

        self.emit(TxPhase::ConfirmingTx, StepStatus::Processing, Some(&hash), None);
        if let Err(e) = plan.confirm.wait_for_confirmation(&hash).await {
            return self.terminal_error(TxPhase::ConfirmingTx, Some(&hash), e);
        }
        self.emit(TxPhase::ConfirmingTx, StepStatus::Success, Some(&hash), None);

        if let Some(relay) = &plan.relay {
            let before = before_snapshot.unwrap_or_default();

            // The bridge message rides the confirmed source transaction
            self.emit(TxPhase::SendingRequest, StepStatus::Processing, Some(&hash), None);
            self.emit(TxPhase::SendingRequest, StepStatus::Success, Some(&hash), None);

            self.emit(
                TxPhase::ReceivingResponse,
                StepStatus::Processing,
                Some(&hash),
                None,
            );
            if let Err(e) = self.await_relay(relay, before, &hash).await {
                return self.terminal_error(TxPhase::ReceivingResponse, Some(&hash), e);
            }
            self.emit(
                TxPhase::ReceivingResponse,
                StepStatus::Success,
                Some(&hash),
                None,
            );

            // The relay wait already observed the destination state change;
            // asking again could hit a transient RPC failure and misreport a
            // confirmed operation.
            self.emit(
                TxPhase::VerifyingCompletion,
                StepStatus::Processing,
                Some(&hash),
                None,
            );
            self.emit(
                TxPhase::VerifyingCompletion,
                StepStatus::Success,
                Some(&hash),
                None,
            );
        }

        info!("Operation completed: {}", hash);
        TxResult::ok(hash)
    }

    /// Poll the caller-supplied completion check until the destination state
    /// change is visible or the budget runs out.
    async fn await_relay(
        &self,
        relay: &RelayVerification,
        before: U256,
        hash: &str,
    ) -> Result<(), StakingError> {
        let deadline = Instant::now() + relay.budget;

        loop {
            match relay.check.verify(before).await {
                Ok(true) => return Ok(()),
                Ok(false) => debug!("Relay for {} not yet observed", hash),
                // Transient check failure; keep polling within budget
                Err(e) => debug!("Completion check failed for {}: {}", hash, e),
            }

            if Instant::now() >= deadline {
                return Err(StakingError::VerificationTimeout(format!(
                    "bridge relay not confirmed within {:?}",
                    relay.budget
                )));
            }

            tokio::time::sleep(relay.interval).await;
        }
    }
}

// ============ Progress recording ============

/// One step of an operation as the UI renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub phase: TxPhase,
    pub status: StepStatus,
    pub tx_hash: Option<String>,
    pub explorer_url: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverallStatus {
    Idle,
    Processing,
    Success,
    Error,
}

/// Ordered step record for one attempt. Invariants: at most one step is
/// `Processing`, and once a step errors no later step may progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationProgress {
    pub steps: Vec<Step>,
    pub overall: OverallStatus,
}

impl OperationProgress {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            overall: OverallStatus::Idle,
        }
    }

    fn apply(&mut self, event: PhaseEvent) {
        // Terminal error freezes the record; late events are dropped
        if self.overall == OverallStatus::Error {
            return;
        }

        if let Some(step) = self.steps.iter_mut().find(|s| s.phase == event.phase) {
            step.status = event.status;
            if event.tx_hash.is_some() {
                step.tx_hash = event.tx_hash;
            }
            if event.explorer_url.is_some() {
                step.explorer_url = event.explorer_url;
            }
            step.error = event.error;
        } else {
            self.steps.push(Step {
                phase: event.phase,
                status: event.status,
                tx_hash: event.tx_hash,
                explorer_url: event.explorer_url,
                error: event.error,
            });
        }

        self.overall = match event.status {
            StepStatus::Error => OverallStatus::Error,
            _ if self.steps.iter().all(|s| s.status == StepStatus::Success) => {
                OverallStatus::Success
            }
            _ => OverallStatus::Processing,
        };
    }

    pub fn processing_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Processing)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Error)
            .count()
    }
}

impl Default for OperationProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Sink that maintains an `OperationProgress` for the UI dialog.
pub struct ProgressRecorder {
    progress: std::sync::Mutex<OperationProgress>,
}

impl ProgressRecorder {
    pub fn new() -> Self {
        Self {
            progress: std::sync::Mutex::new(OperationProgress::new()),
        }
    }

    pub fn snapshot(&self) -> OperationProgress {
        // A poisoned lock means a sink panicked mid-apply; the record is
        // still the best available answer and the orchestrator never throws.
        self.progress
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for ProgressRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressRecorder {
    fn on_phase(&self, event: PhaseEvent) {
        let mut progress = self.progress.lock().unwrap_or_else(|e| e.into_inner());
        progress.apply(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{QueryResult, TxLedgerStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedSubmitter(Option<String>);

    #[async_trait]
    impl TxSubmitter for FixedSubmitter {
        async fn submit(&self) -> Result<Option<String>, StakingError> {
            Ok(self.0.clone())
        }
    }

    struct FailingSubmitter;

    #[async_trait]
    impl TxSubmitter for FailingSubmitter {
        async fn submit(&self) -> Result<Option<String>, StakingError> {
            Err(StakingError::InsufficientFunds)
        }
    }

    struct InstantConfirm;

    #[async_trait]
    impl ConfirmationStrategy for InstantConfirm {
        async fn wait_for_confirmation(&self, _hash: &str) -> Result<(), StakingError> {
            Ok(())
        }
    }

    /// Ledger that reports a scripted sequence of statuses, then repeats the
    /// last one.
    struct ScriptedLedger {
        script: Mutex<Vec<QueryResult<TxLedgerStatus>>>,
        polls: AtomicUsize,
    }

    impl ScriptedLedger {
        fn new(script: Vec<QueryResult<TxLedgerStatus>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                polls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TxStatusSource for ScriptedLedger {
        async fn transaction_status(&self, _hash: &str) -> QueryResult<TxLedgerStatus> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        }
    }

    fn orchestrator_with_recorder() -> (TxOrchestrator, Arc<ProgressRecorder>) {
        let recorder = Arc::new(ProgressRecorder::new());
        let orchestrator = TxOrchestrator::new(
            recorder.clone(),
            Some("https://scan.example/tx/{hash}".to_string()),
        );
        (orchestrator, recorder)
    }

    #[tokio::test]
    async fn test_happy_path_phase_ordering() {
        let (orchestrator, recorder) = orchestrator_with_recorder();

        let result = orchestrator
            .execute(TxPlan {
                approval: None,
                submit: Arc::new(FixedSubmitter(Some("0xHASH".to_string()))),
                confirm: Arc::new(InstantConfirm),
                relay: None,
            })
            .await;

        assert!(result.success);
        assert_eq!(result.hash, "0xHASH");

        let progress = recorder.snapshot();
        assert_eq!(progress.overall, OverallStatus::Success);
        assert_eq!(progress.error_count(), 0);
        assert_eq!(progress.processing_count(), 0);
        let phases: Vec<_> = progress.steps.iter().map(|s| s.phase).collect();
        assert_eq!(phases, vec![TxPhase::SendingTx, TxPhase::ConfirmingTx]);
        assert_eq!(
            progress.steps[0].explorer_url.as_deref(),
            Some("https://scan.example/tx/0xHASH")
        );
    }

    #[tokio::test]
    async fn test_no_hash_terminates_without_polling() {
        let (orchestrator, recorder) = orchestrator_with_recorder();
        let ledger = ScriptedLedger::new(vec![QueryResult::ok(TxLedgerStatus::default())]);

        let result = orchestrator
            .execute(TxPlan {
                approval: None,
                submit: Arc::new(FixedSubmitter(None)),
                confirm: Arc::new(LedgerPoll::new(
                    ledger.clone(),
                    Duration::from_millis(1),
                    Duration::from_millis(50),
                )),
                relay: None,
            })
            .await;

        assert!(!result.success);
        assert_eq!(result.hash, "");
        assert!(result.error.unwrap().contains("no transaction hash"));
        assert_eq!(ledger.polls.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.snapshot().overall, OverallStatus::Error);
    }

    #[tokio::test]
    async fn test_error_step_is_terminal() {
        let (orchestrator, recorder) = orchestrator_with_recorder();

        let result = orchestrator
            .execute(TxPlan {
                approval: None,
                submit: Arc::new(FailingSubmitter),
                confirm: Arc::new(InstantConfirm),
                relay: None,
            })
            .await;

        assert!(!result.success);
        let progress = recorder.snapshot();
        assert_eq!(progress.error_count(), 1);
        // No step after the error may be processing or successful
        let error_index = progress
            .steps
            .iter()
            .position(|s| s.status == StepStatus::Error)
            .unwrap();
        assert!(progress.steps[error_index + 1..]
            .iter()
            .all(|s| s.status == StepStatus::Pending));
    }

    #[tokio::test]
    async fn test_ledger_failure_distinct_from_timeout() {
        // Validated with a failure code
        let failed = ScriptedLedger::new(vec![QueryResult::ok(TxLedgerStatus {
            finalized: true,
            success: false,
        })]);
        let poll = LedgerPoll::new(failed, Duration::from_millis(1), Duration::from_millis(50));
        let err = poll.wait_for_confirmation("TX1").await.unwrap_err();
        assert!(err.to_string().contains("failed on the ledger"));
        assert!(!err.is_retryable());

        // Never validated within budget
        let pending = ScriptedLedger::new(vec![QueryResult::ok(TxLedgerStatus::default())]);
        let poll = LedgerPoll::new(pending, Duration::from_millis(1), Duration::from_millis(20));
        let err = poll.wait_for_confirmation("TX2").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_transient_poll_failures_do_not_count_as_verdict() {
        let ledger = ScriptedLedger::new(vec![
            QueryResult::fail("connection reset", TxLedgerStatus::default()),
            QueryResult::fail("connection reset", TxLedgerStatus::default()),
            QueryResult::ok(TxLedgerStatus {
                finalized: true,
                success: true,
            }),
        ]);

        let poll = LedgerPoll::new(
            ledger.clone(),
            Duration::from_millis(1),
            Duration::from_millis(100),
        );
        assert!(poll.wait_for_confirmation("TX").await.is_ok());
        assert!(ledger.polls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_approval_failure_skips_main_submit() {
        let (orchestrator, recorder) = orchestrator_with_recorder();

        struct CountingSubmitter(AtomicUsize);
        #[async_trait]
        impl TxSubmitter for CountingSubmitter {
            async fn submit(&self) -> Result<Option<String>, StakingError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(Some("0xMAIN".to_string()))
            }
        }

        let main = Arc::new(CountingSubmitter(AtomicUsize::new(0)));
        let result = orchestrator
            .execute(TxPlan {
                approval: Some(Arc::new(FailingSubmitter)),
                submit: main.clone(),
                confirm: Arc::new(InstantConfirm),
                relay: None,
            })
            .await;

        assert!(!result.success);
        assert_eq!(main.0.load(Ordering::SeqCst), 0);
        let progress = recorder.snapshot();
        assert_eq!(progress.steps[0].phase, TxPhase::Approving);
        assert_eq!(progress.steps[0].status, StepStatus::Error);
    }

    struct DeltaCheck {
        value: Mutex<Vec<U256>>,
    }

    #[async_trait]
    impl CompletionCheck for DeltaCheck {
        async fn snapshot(&self) -> Result<U256, StakingError> {
            Ok(self.value.lock().unwrap()[0])
        }

        async fn verify(&self, before: U256) -> Result<bool, StakingError> {
            let mut values = self.value.lock().unwrap();
            if values.len() > 1 {
                values.remove(0);
            }
            Ok(values[0] > before)
        }
    }

    #[tokio::test]
    async fn test_cross_chain_phases_run_after_confirmation() {
        let (orchestrator, recorder) = orchestrator_with_recorder();

        let check = Arc::new(DeltaCheck {
            value: Mutex::new(vec![U256::from(100), U256::from(100), U256::from(150)]),
        });

        let result = orchestrator
            .execute(TxPlan {
                approval: None,
                submit: Arc::new(FixedSubmitter(Some("0xHASH".to_string()))),
                confirm: Arc::new(InstantConfirm),
                relay: Some(RelayVerification {
                    check,
                    interval: Duration::from_millis(1),
                    budget: Duration::from_millis(100),
                }),
            })
            .await;

        assert!(result.success);
        let progress = recorder.snapshot();
        let phases: Vec<_> = progress.steps.iter().map(|s| s.phase).collect();
        assert_eq!(
            phases,
            vec![
                TxPhase::SendingTx,
                TxPhase::ConfirmingTx,
                TxPhase::SendingRequest,
                TxPhase::ReceivingResponse,
                TxPhase::VerifyingCompletion,
            ]
        );
        assert_eq!(progress.overall, OverallStatus::Success);
    }

    struct ScriptedCheck {
        outcomes: Mutex<Vec<Result<bool, StakingError>>>,
    }

    #[async_trait]
    impl CompletionCheck for ScriptedCheck {
        async fn snapshot(&self) -> Result<U256, StakingError> {
            Ok(U256::zero())
        }

        async fn verify(&self, _before: U256) -> Result<bool, StakingError> {
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.len() > 1 {
                outcomes.remove(0)
            } else {
                outcomes[0].clone()
            }
        }
    }

    #[tokio::test]
    async fn test_observed_relay_survives_later_check_errors() {
        let (orchestrator, recorder) = orchestrator_with_recorder();

        // The relay lands on the first check; anything the checker would
        // say afterwards must not undo the confirmed outcome
        let check = Arc::new(ScriptedCheck {
            outcomes: Mutex::new(vec![
                Ok(true),
                Err(StakingError::Network("rpc unreachable".to_string())),
            ]),
        });

        let result = orchestrator
            .execute(TxPlan {
                approval: None,
                submit: Arc::new(FixedSubmitter(Some("0xHASH".to_string()))),
                confirm: Arc::new(InstantConfirm),
                relay: Some(RelayVerification {
                    check,
                    interval: Duration::from_millis(1),
                    budget: Duration::from_millis(100),
                }),
            })
            .await;

        assert!(result.success, "{:?}", result.error);
        let progress = recorder.snapshot();
        let last = progress.steps.last().unwrap();
        assert_eq!(last.phase, TxPhase::VerifyingCompletion);
        assert_eq!(last.status, StepStatus::Success);
    }

    #[tokio::test]
    async fn test_relay_budget_exhaustion_is_verification_timeout() {
        let (orchestrator, _recorder) = orchestrator_with_recorder();

        let check = Arc::new(DeltaCheck {
            value: Mutex::new(vec![U256::from(100)]),
        });

        let result = orchestrator
            .execute(TxPlan {
                approval: None,
                submit: Arc::new(FixedSubmitter(Some("0xHASH".to_string()))),
                confirm: Arc::new(InstantConfirm),
                relay: Some(RelayVerification {
                    check,
                    interval: Duration::from_millis(1),
                    budget: Duration::from_millis(15),
                }),
            })
            .await;

        assert!(!result.success);
        // The hash survives so the UI can link to an explorer
        assert_eq!(result.hash, "0xHASH");
        assert!(result.error.unwrap().contains("not confirmed"));
    }
}
