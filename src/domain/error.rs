//! Public error taxonomy.
//!
//! `BillingError` is the only error type returned from application entry
//! points. Ports speak `DomainError`; the `From` impl below folds their
//! codes into this taxonomy.

use std::fmt;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, ValidationError};

/// Collaborator that produced an adapter failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Payment,
    Storage,
    Events,
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdapterKind::Payment => "payment",
            AdapterKind::Storage => "storage",
            AdapterKind::Events => "events",
        };
        write!(f, "{}", s)
    }
}

/// Taxonomy class of a `BillingError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    PaymentDeclined,
    Adapter,
    Conflict,
}

/// Errors crossing the public entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    /// Malformed or rejected input. Never retried.
    #[error("Validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Definitive refusal from the payment processor.
    #[error("Payment declined ({code}): {message}")]
    PaymentDeclined { code: String, message: String },

    /// Transient collaborator failure. Never advances state.
    #[error("{source_kind} adapter failed: {message}")]
    Adapter {
        source_kind: AdapterKind,
        message: String,
    },

    /// Compare-and-swap write lost to a concurrent writer.
    #[error("Subscription {subscription_id} was modified concurrently")]
    ConcurrencyConflict { subscription_id: SubscriptionId },

    #[error("Cannot {attempted} a subscription in {current} state")]
    InvalidState { current: String, attempted: String },
}

impl BillingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: &'static str, id: impl fmt::Display) -> Self {
        BillingError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn declined(code: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::PaymentDeclined {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn adapter(source_kind: AdapterKind, message: impl Into<String>) -> Self {
        BillingError::Adapter {
            source_kind,
            message: message.into(),
        }
    }

    pub fn conflict(subscription_id: SubscriptionId) -> Self {
        BillingError::ConcurrencyConflict { subscription_id }
    }

    pub fn invalid_state(current: impl fmt::Display, attempted: impl Into<String>) -> Self {
        BillingError::InvalidState {
            current: current.to_string(),
            attempted: attempted.into(),
        }
    }

    /// Returns the taxonomy class. `InvalidState` is a validation error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BillingError::Validation { .. } | BillingError::InvalidState { .. } => {
                ErrorKind::Validation
            }
            BillingError::NotFound { .. } => ErrorKind::NotFound,
            BillingError::PaymentDeclined { .. } => ErrorKind::PaymentDeclined,
            BillingError::Adapter { .. } => ErrorKind::Adapter,
            BillingError::ConcurrencyConflict { .. } => ErrorKind::Conflict,
        }
    }

    /// Returns true if repeating the operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Adapter | ErrorKind::Conflict)
    }

    /// Maps a storage-port failure, keeping the taxonomy of known codes.
    pub fn from_storage(err: DomainError) -> Self {
        match err.code {
            ErrorCode::StorageError | ErrorCode::InternalError => {
                BillingError::adapter(AdapterKind::Storage, err.message)
            }
            _ => err.into(),
        }
    }
}

fn resource_for(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::SubscriptionNotFound => "Subscription",
        ErrorCode::PlanNotFound => "Plan",
        ErrorCode::PriceNotFound => "Price",
        ErrorCode::PromoCodeNotFound => "Promo code",
        ErrorCode::InvoiceNotFound => "Invoice",
        _ => "Resource",
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        let detail = |key: &str| err.details.get(key).cloned();
        match err.code {
            ErrorCode::ValidationFailed | ErrorCode::CurrencyMismatch => BillingError::Validation {
                field: detail("field").unwrap_or_else(|| "unknown".to_string()),
                message: err.message,
            },
            ErrorCode::InvalidStateTransition => BillingError::InvalidState {
                current: detail("current").unwrap_or_else(|| "unknown".to_string()),
                attempted: detail("attempted").unwrap_or(err.message),
            },
            code if code.is_not_found() => BillingError::NotFound {
                resource: resource_for(code),
                id: detail("id").unwrap_or(err.message),
            },
            ErrorCode::ConcurrencyConflict => match detail("subscription_id")
                .and_then(|id| id.parse::<SubscriptionId>().ok())
            {
                Some(subscription_id) => BillingError::ConcurrencyConflict { subscription_id },
                None => BillingError::adapter(AdapterKind::Storage, err.message),
            },
            ErrorCode::PaymentDeclined => BillingError::PaymentDeclined {
                code: detail("decline_code").unwrap_or_else(|| "declined".to_string()),
                message: err.message,
            },
            ErrorCode::ExternalServiceError => {
                BillingError::adapter(AdapterKind::Payment, err.message)
            }
            _ => BillingError::adapter(AdapterKind::Storage, err.message),
        }
    }
}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        BillingError::Validation {
            field: err.field().to_string(),
            message: err.to_string(),
        }
    }
}
