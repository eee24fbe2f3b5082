//! # Recovery Coordinator
//!
//! Wraps fallible asynchronous operations. A failure is classified and
//! recorded, the matching recovery action runs, and on success the operation
//! is invoked exactly once more. The recovery budget is process-wide: every
//! request shares it and it is never reset.
//!
//! Budget checks and increments happen under a single async gate, so two
//! concurrent failures can never both consume the last slot.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::classifier::{classify, FailureKind};
use crate::strategy::{RecoveryAction, RecoveryConfig, RecoveryStrategyTable, MAX_RECOVERY_ATTEMPTS};
use crate::tuning::TuningState;
use crate::types::{Error, Result};

/// One intercepted failure. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Terminal payload produced when recovery is exhausted or fails outright
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailsafeResponse {
    /// Always `"error"`
    pub status: String,
    pub message: String,
    /// Detail of the failure that could not be recovered
    pub error: String,
    pub kind: FailureKind,
    /// Recovery attempts used when the response was produced
    pub attempts: usize,
    pub suggestion: String,
}

impl FailsafeResponse {
    fn new(operation: &str, kind: FailureKind, error: &Error, attempts: usize) -> Self {
        Self {
            status: "error".to_string(),
            message: format!("Operation '{}' failed and could not be recovered", operation),
            error: error.to_string(),
            kind,
            attempts,
            suggestion: RecoveryAction::for_kind(kind).suggestion().to_string(),
        }
    }
}

/// The result of a protected operation
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryResult<T> {
    /// The operation succeeded, directly or after recovery
    Success(T),
    /// Recovery was exhausted or failed
    Failsafe(FailsafeResponse),
}

impl<T> RecoveryResult<T> {
    pub fn into_result(self) -> std::result::Result<T, FailsafeResponse> {
        match self {
            RecoveryResult::Success(value) => Ok(value),
            RecoveryResult::Failsafe(failsafe) => Err(failsafe),
        }
    }
}

enum RecoveryOutcome {
    Recovered,
    ActionFailed,
    BudgetExhausted,
}

#[derive(Debug, Default)]
struct ErrorHistory {
    records: VecDeque<ErrorRecord>,
    total: usize,
}

/// Owns the error history, the recovery budget and the shared tuning state
#[derive(Debug)]
pub struct RecoveryCoordinator {
    strategies: RecoveryStrategyTable,
    tuning: Arc<TuningState>,
    attempts_used: AtomicUsize,
    // held while checking, running and committing a recovery
    recovery_gate: tokio::sync::Mutex<()>,
    history: Mutex<ErrorHistory>,
    history_capacity: usize,
}

impl RecoveryCoordinator {
    pub fn new(config: RecoveryConfig, tuning: Arc<TuningState>) -> Result<Self> {
        let history_capacity = config.history_capacity.max(1);
        let strategies = RecoveryStrategyTable::new(config)?;

        Ok(Self {
            strategies,
            tuning,
            attempts_used: AtomicUsize::new(0),
            recovery_gate: tokio::sync::Mutex::new(()),
            history: Mutex::new(ErrorHistory::default()),
            history_capacity,
        })
    }

    /// Executes `operation`, recovering from at most one failure per call.
    ///
    /// Success passes through untouched. On failure the error is recorded and,
    /// budget permitting, the kind's recovery action runs; when it succeeds the
    /// budget is charged and `operation` is retried once. A failing retry is
    /// recorded and ends in a [`FailsafeResponse`] without nested recovery.
    pub async fn protect<F, Fut, T>(&self, operation_name: &str, operation: F) -> RecoveryResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let error = match operation().await {
            Ok(value) => return RecoveryResult::Success(value),
            Err(error) => error,
        };

        let kind = self.record_failure(operation_name, &error);

        match self.attempt_recovery(operation_name, kind).await {
            RecoveryOutcome::Recovered => {}
            RecoveryOutcome::ActionFailed | RecoveryOutcome::BudgetExhausted => {
                return RecoveryResult::Failsafe(self.failsafe(operation_name, kind, &error));
            }
        }

        match operation().await {
            Ok(value) => {
                info!(operation = %operation_name, kind = %kind, "Operation succeeded after recovery");
                RecoveryResult::Success(value)
            }
            Err(retry_error) => {
                let retry_kind = self.record_failure(operation_name, &retry_error);
                RecoveryResult::Failsafe(self.failsafe(operation_name, retry_kind, &retry_error))
            }
        }
    }

    async fn attempt_recovery(&self, operation_name: &str, kind: FailureKind) -> RecoveryOutcome {
        let _gate = self.recovery_gate.lock().await;

        let used = self.attempts_used.load(Ordering::SeqCst);
        if used >= MAX_RECOVERY_ATTEMPTS {
            error!(
                operation = %operation_name,
                kind = %kind,
                attempts = used,
                "Recovery budget exhausted"
            );
            return RecoveryOutcome::BudgetExhausted;
        }

        let action = self.strategies.action_for(kind);
        if !self.strategies.run(action, &self.tuning, used).await {
            warn!(operation = %operation_name, kind = %kind, action = ?action, "Recovery action failed");
            return RecoveryOutcome::ActionFailed;
        }

        self.attempts_used.store(used + 1, Ordering::SeqCst);
        counter!("resilience_recoveries_total", 1, "operation" => operation_name.to_string(), "kind" => kind.as_str());
        info!(
            operation = %operation_name,
            kind = %kind,
            action = ?action,
            attempts = used + 1,
            max_attempts = MAX_RECOVERY_ATTEMPTS,
            "Recovery action succeeded, retrying operation"
        );
        RecoveryOutcome::Recovered
    }

    fn record_failure(&self, operation_name: &str, error: &Error) -> FailureKind {
        let kind = classify(error);
        warn!(
            operation = %operation_name,
            kind = %kind,
            error_kind = %error.kind,
            message = %error.message,
            "Operation failed"
        );
        counter!("resilience_failures_total", 1, "operation" => operation_name.to_string(), "kind" => kind.as_str());

        let record = ErrorRecord {
            timestamp: Utc::now(),
            operation: operation_name.to_string(),
            kind,
            message: error.message.clone(),
        };

        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.records.len() == self.history_capacity {
            history.records.pop_front();
        }
        history.records.push_back(record);
        history.total += 1;

        kind
    }

    fn failsafe(&self, operation_name: &str, kind: FailureKind, error: &Error) -> FailsafeResponse {
        counter!("resilience_failsafe_total", 1, "operation" => operation_name.to_string(), "kind" => kind.as_str());
        FailsafeResponse::new(operation_name, kind, error, self.attempts_used())
    }

    pub fn attempts_used(&self) -> usize {
        self.attempts_used.load(Ordering::SeqCst)
    }

    pub fn tuning(&self) -> &Arc<TuningState> {
        &self.tuning
    }

    /// Total failures recorded since start, including evicted records
    pub fn error_count(&self) -> usize {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).total
    }

    /// Up to `n` most recent records, oldest first
    pub fn recent_errors(&self, n: usize) -> Vec<ErrorRecord> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = history.records.len().saturating_sub(n);
        history.records.iter().skip(skip).cloned().collect()
    }

    /// All retained records in insertion order
    pub fn history(&self) -> Vec<ErrorRecord> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.records.iter().cloned().collect()
    }
}
