//! Read-only health view over the coordinator's recovery state.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::coordinator::{ErrorRecord, RecoveryCoordinator};

/// Number of error records included in a snapshot
pub const RECENT_ERROR_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No recovery has been needed
    Healthy,
    /// At least one recovery attempt has been spent
    Degraded,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub error_count: usize,
    pub active_threads: usize,
    pub search_timeout_secs: u64,
    pub recovery_attempts: usize,
    pub last_errors: Vec<ErrorRecord>,
}

#[derive(Debug, Clone)]
pub struct HealthReporter {
    coordinator: Arc<RecoveryCoordinator>,
}

impl HealthReporter {
    pub fn new(coordinator: Arc<RecoveryCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let attempts = self.coordinator.attempts_used();
        let tuning = self.coordinator.tuning().snapshot();

        HealthSnapshot {
            status: if attempts == 0 { HealthStatus::Healthy } else { HealthStatus::Degraded },
            error_count: self.coordinator.error_count(),
            active_threads: tuning.worker_threads,
            search_timeout_secs: tuning.search_timeout_secs,
            recovery_attempts: attempts,
            last_errors: self.coordinator.recent_errors(RECENT_ERROR_LIMIT),
        }
    }
}
