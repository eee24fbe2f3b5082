//! # Resilience Layer
//!
//! Wraps fallible operations of the inference gateway and recovers from
//! their failures within a process-wide budget.
//!
//! ## Components
//!
//! - [`classifier`]: maps a failure's category to a [`FailureKind`]
//! - [`strategy`]: the per-kind recovery actions
//! - [`coordinator`]: `protect`, the error history and the recovery budget
//! - [`tuning`]: live search timeout and worker thread count
//! - [`health`]: read-only snapshot of the above
//!

pub mod types;
pub mod classifier;
pub mod strategy;
pub mod tuning;
pub mod coordinator;
pub mod health;
pub mod logging;

// Re-export commonly used types
pub use types::{Error, ErrorKind, Result};
pub use classifier::{classify, FailureKind};
pub use strategy::{RecoveryAction, RecoveryConfig, RecoveryStrategyTable, MAX_RECOVERY_ATTEMPTS};
pub use tuning::{TuningSnapshot, TuningState};
pub use coordinator::{ErrorRecord, FailsafeResponse, RecoveryCoordinator, RecoveryResult};
pub use health::{HealthReporter, HealthSnapshot, HealthStatus};
pub use logging::{init_logging, LoggingConfig};
