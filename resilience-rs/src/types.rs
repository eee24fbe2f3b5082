//! # Standardized Error Types
//!
//! Every fallible operation wrapped by the coordinator reports failures through
//! this [`Error`] type. The [`ErrorKind`] carried by an error is the category
//! the classifier works from; the message is for humans only.

use std::error::Error as StdError;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A type alias for Result with the error type defaulting to our Error
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Categorizes different kinds of errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A required file, model or other resource does not exist
    NotFound,
    /// The remote side could not be reached
    Communication,
    /// An operation exceeded its deadline
    Timeout,
    /// A local computation or subprocess failed while running
    Execution,
    /// Error in data processing or decoding
    Processing,
    /// External service answered with an error
    External,
    /// Input/output error
    IO,
    /// Initialization or configuration error
    Initialization,
    /// Error in data validation
    Validation,
    /// Internal invariant violation
    Internal,
    /// Unexpected or unhandled error
    Unexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "Not Found Error"),
            ErrorKind::Communication => write!(f, "Communication Error"),
            ErrorKind::Timeout => write!(f, "Timeout Error"),
            ErrorKind::Execution => write!(f, "Execution Error"),
            ErrorKind::Processing => write!(f, "Processing Error"),
            ErrorKind::External => write!(f, "External Service Error"),
            ErrorKind::IO => write!(f, "I/O Error"),
            ErrorKind::Initialization => write!(f, "Initialization Error"),
            ErrorKind::Validation => write!(f, "Validation Error"),
            ErrorKind::Internal => write!(f, "Internal Error"),
            ErrorKind::Unexpected => write!(f, "Unexpected Error"),
        }
    }
}

/// Core error type for wrapped operations
///
/// `Clone` drops the opaque `cause`, keeping the structured metadata.
#[derive(Debug, Serialize, Deserialize)]
pub struct Error {
    /// A unique identifier for this error instance
    pub id: Uuid,
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Detailed error message
    pub message: String,
    /// The time when the error occurred
    pub timestamp: DateTime<Utc>,
    /// The component where the error originated
    pub service: Option<String>,
    /// Additional context as key-value pairs
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
    /// Chain of causes (not serialized)
    #[serde(skip)]
    pub cause: Option<Box<dyn StdError + Send + Sync>>,
}

impl Clone for Error {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            kind: self.kind,
            message: self.message.clone(),
            timestamp: self.timestamp,
            service: self.service.clone(),
            context: self.context.clone(),
            cause: None,
        }
    }
}

impl Error {
    /// Creates a new error with the specified kind and message
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            timestamp: Utc::now(),
            service: None,
            context: serde_json::Map::new(),
            cause: None,
        }
    }

    /// Sets the service name
    pub fn service<S: Into<String>>(mut self, service: S) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Adds context information to the error
    pub fn context<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Serialize,
    {
        if let Ok(value) = serde_json::to_value(value) {
            self.context.insert(key.into(), value);
        }
        self
    }

    /// Chains this error with its cause
    pub fn cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;

        if let Some(service) = &self.service {
            write!(f, " [Service: {}]", service)?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_ref().map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
            _ => ErrorKind::IO,
        };
        Self::new(kind, err.to_string()).cause(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_connect() {
            ErrorKind::Communication
        } else if err.is_decode() {
            ErrorKind::Processing
        } else {
            ErrorKind::External
        };

        Self::new(kind, format!("HTTP request error: {}", err)).cause(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Processing, format!("JSON error: {}", err)).cause(err)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        let message = if err.is_panic() {
            "worker task panicked".to_string()
        } else {
            format!("worker task did not complete: {}", err)
        };
        Self::new(ErrorKind::Execution, message).cause(err)
    }
}
