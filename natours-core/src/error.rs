//! Unified error handling system
//!
//! Structured error types with context for the storage, notification and
//! configuration collaborators of the credential subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{error, warn};

pub type NatoursResult<T> = Result<T, NatoursError>;

/// Error context providing additional information for debugging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for correlating log lines
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: HashMap<String, String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Main error type shared by the Natours crates
#[derive(Error, Debug)]
pub enum NatoursError {
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Notification error: {message}")]
    Notification {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        context: ErrorContext,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl NatoursError {
    /// Get the error context
    pub fn context(&self) -> &ErrorContext {
        match self {
            NatoursError::Storage { context, .. }
            | NatoursError::Notification { context, .. }
            | NatoursError::Config { context, .. }
            | NatoursError::Validation { context, .. }
            | NatoursError::Conflict { context, .. }
            | NatoursError::Internal { context, .. } => context,
        }
    }

    /// Field the error refers to, for validation failures
    pub fn field(&self) -> Option<&str> {
        match self {
            NatoursError::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    /// Whether retrying the same call could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NatoursError::Storage { .. } | NatoursError::Notification { .. }
        )
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        let context = self.context();
        match self {
            NatoursError::Validation { .. } | NatoursError::Conflict { .. } => {
                warn!(
                    error_id = %context.error_id,
                    component = %context.component,
                    error = %self,
                    "Rejected input"
                );
            }
            NatoursError::Storage { .. } | NatoursError::Notification { .. } => {
                warn!(
                    error_id = %context.error_id,
                    component = %context.component,
                    error = %self,
                    "Dependency error (may be recoverable)"
                );
            }
            _ => {
                error!(
                    error_id = %context.error_id,
                    component = %context.component,
                    error = %self,
                    "Error occurred"
                );
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! storage_error {
    ($msg:expr, $component:expr) => {
        $crate::NatoursError::Storage {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::NatoursError::Storage {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! notification_error {
    ($msg:expr, $component:expr) => {
        $crate::NatoursError::Notification {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::NatoursError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::NatoursError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! internal_error {
    ($msg:expr, $component:expr) => {
        $crate::NatoursError::Internal {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::NatoursError::Internal {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}
