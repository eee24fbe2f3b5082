//! # Failure Classification
//!
//! Maps the category reported by a failed operation onto the closed set of
//! failure kinds the recovery table understands.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Error, ErrorKind};

/// The fixed vocabulary of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A required local resource (model file, binary input) is absent
    ResourceMissing,
    /// The remote side could not be reached
    Connectivity,
    /// The operation ran out of time
    Timeout,
    /// The operation started but faulted while executing
    ExecutionFault,
    /// Anything the classifier does not recognize
    Unknown,
}

impl FailureKind {
    pub const ALL: [FailureKind; 5] = [
        FailureKind::ResourceMissing,
        FailureKind::Connectivity,
        FailureKind::Timeout,
        FailureKind::ExecutionFault,
        FailureKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ResourceMissing => "resource_missing",
            FailureKind::Connectivity => "connectivity",
            FailureKind::Timeout => "timeout",
            FailureKind::ExecutionFault => "execution_fault",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ErrorKind> for FailureKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NotFound => FailureKind::ResourceMissing,
            ErrorKind::Communication => FailureKind::Connectivity,
            ErrorKind::Timeout => FailureKind::Timeout,
            ErrorKind::Execution => FailureKind::ExecutionFault,
            _ => FailureKind::Unknown,
        }
    }
}

/// Classifies a failure by its reported category. The message never matters.
pub fn classify(error: &Error) -> FailureKind {
    FailureKind::from(error.kind)
}
