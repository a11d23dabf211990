//! Payment provider port for external payment processing.
//!
//! One polymorphic interface for every processor. The core never talks to
//! a processor directly; a relay or SDK adapter implements this trait.
//!
//! # Design
//!
//! - **Gateway agnostic**: payment methods are a tagged enum, not processor types
//! - **Idempotent**: every charge carries a key; repeating it must not charge twice
//! - **Classified failures**: declines are definitive, everything else transient

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::domain::foundation::{
    Currency, CustomerId, PaymentId, PaymentMethodId, SubscriptionId, Timestamp,
};

/// Port for payment provider integrations.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Charge a stored payment method.
    ///
    /// Repeating a request with the same idempotency key returns the
    /// original payment instead of charging again.
    async fn create_payment(&self, request: PaymentRequest) -> Result<Payment, PaymentError>;

    /// The customer's default stored payment method, if any.
    async fn default_payment_method(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<PaymentMethod>, PaymentError>;
}

/// Stored payment instrument, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethod {
    Card {
        id: PaymentMethodId,
        brand: Option<String>,
        last4: Option<String>,
    },
    /// Card whose processor requires a tokenized CVC on each charge.
    CardWithCvc {
        id: PaymentMethodId,
        cvc_token: String,
    },
    BankDebit {
        id: PaymentMethodId,
        bank_name: Option<String>,
    },
    Wallet {
        id: PaymentMethodId,
        /// Wallet provider, e.g. "apple_pay".
        wallet: String,
    },
}

impl PaymentMethod {
    pub fn id(&self) -> &PaymentMethodId {
        match self {
            PaymentMethod::Card { id, .. }
            | PaymentMethod::CardWithCvc { id, .. }
            | PaymentMethod::BankDebit { id, .. }
            | PaymentMethod::Wallet { id, .. } => id,
        }
    }

    pub fn card(id: PaymentMethodId) -> Self {
        PaymentMethod::Card {
            id,
            brand: None,
            last4: None,
        }
    }
}

/// Key that makes a charge safe to repeat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derives the key for a subscription charge.
    ///
    /// Two runs that read the same subscription state derive the same key.
    pub fn for_subscription(
        purpose: &str,
        subscription_id: &SubscriptionId,
        period_start: Timestamp,
        retry_count: u32,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(purpose.as_bytes());
        hasher.update(b":");
        hasher.update(subscription_id.as_uuid().as_bytes());
        hasher.update(b":");
        hasher.update(period_start.as_unix_secs().to_be_bytes());
        hasher.update(b":");
        hasher.update(retry_count.to_be_bytes());
        Self(format!("{}_{:x}", purpose, hasher.finalize()))
    }

    /// Uses a caller-supplied key as is.
    pub fn explicit(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request to charge a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub customer_id: CustomerId,
    /// Minor currency units, always positive.
    pub amount: i64,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub idempotency_key: IdempotencyKey,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Succeeded,
    /// Not settled yet (e.g. awaiting bank confirmation).
    Pending,
    Failed,
}

/// Payment as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub status: PaymentStatus,
    pub amount: i64,
    pub currency: Currency,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
}

impl Payment {
    pub fn is_succeeded(&self) -> bool {
        self.status == PaymentStatus::Succeeded
    }
}

/// Errors from payment provider operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentError {
    /// Error code for categorization.
    pub code: PaymentErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl PaymentError {
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    pub fn card_declined(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::CardDeclined, message)
    }

    pub fn insufficient_funds(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InsufficientFunds, message)
    }

    /// True if the processor definitively refused the charge.
    pub fn is_decline(&self) -> bool {
        self.code.is_decline()
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    /// Network connectivity issue.
    NetworkError,

    /// API authentication with the processor failed.
    AuthenticationError,

    /// Card was declined.
    CardDeclined,

    InsufficientFunds,

    /// Customer must complete an authentication challenge.
    AuthenticationRequired,

    CardExpired,

    InvalidCard,

    RateLimitExceeded,

    /// Provider API error.
    ProviderError,

    Unknown,
}

impl PaymentErrorCode {
    /// Definitive refusals that advance dunning.
    pub fn is_decline(&self) -> bool {
        matches!(
            self,
            PaymentErrorCode::CardDeclined
                | PaymentErrorCode::InsufficientFunds
                | PaymentErrorCode::AuthenticationRequired
                | PaymentErrorCode::CardExpired
                | PaymentErrorCode::InvalidCard
        )
    }

    /// Everything that is not a decline may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        !self.is_decline()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::CardDeclined => "card_declined",
            PaymentErrorCode::InsufficientFunds => "insufficient_funds",
            PaymentErrorCode::AuthenticationRequired => "authentication_required",
            PaymentErrorCode::CardExpired => "card_expired",
            PaymentErrorCode::InvalidCard => "invalid_card",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::ProviderError => "provider_error",
            PaymentErrorCode::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
