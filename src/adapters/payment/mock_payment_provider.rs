//! Mock payment provider for testing.
//!
//! Provides a configurable mock implementation of `PaymentProvider` for unit
//! and integration tests. Supports:
//! - Scripted outcomes per customer
//! - Error injection
//! - Call tracking
//! - Idempotent replay by key, like a real processor

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::foundation::{CustomerId, PaymentId, PaymentMethodId};
use crate::ports::{
    IdempotencyKey, Payment, PaymentError, PaymentErrorCode, PaymentMethod, PaymentProvider,
    PaymentRequest, PaymentStatus,
};

/// Scripted result for the next charge of a customer.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Succeed,
    /// Processor reports a failed payment with this failure code.
    Decline(String),
    Pending,
    /// Transport or provider failure; nothing is recorded under the key.
    Error(PaymentError),
}

/// Mock payment provider for testing.
///
/// Charges succeed unless an outcome is scripted for the customer.
///
/// # Example
///
/// ```ignore
/// let mock = MockPaymentProvider::new();
/// mock.add_card(&customer_id);
/// mock.push_outcome(&customer_id, MockOutcome::Decline("card_declined".into()));
///
/// let payment = mock.create_payment(request).await?;
/// assert_eq!(payment.status, PaymentStatus::Failed);
/// ```
#[derive(Debug, Default)]
pub struct MockPaymentProvider {
    inner: Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    default_methods: HashMap<CustomerId, PaymentMethod>,
    scripted: HashMap<CustomerId, VecDeque<MockOutcome>>,
    /// Completed payments by idempotency key.
    completed: HashMap<IdempotencyKey, Payment>,
    lookup_error: Option<PaymentError>,
    requests: Vec<PaymentRequest>,
    next_payment: u64,
}

impl MockPaymentProvider {
    /// Create a new mock provider with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    pub fn set_default_method(&self, customer_id: &CustomerId, method: PaymentMethod) {
        self.state()
            .default_methods
            .insert(customer_id.clone(), method);
    }

    /// Gives the customer a default card `pm_<customer>`.
    pub fn add_card(&self, customer_id: &CustomerId) {
        if let Ok(id) = PaymentMethodId::new(format!("pm_{}", customer_id)) {
            self.set_default_method(customer_id, PaymentMethod::card(id));
        }
    }

    /// Queue an outcome for the customer's next new charge.
    pub fn push_outcome(&self, customer_id: &CustomerId, outcome: MockOutcome) {
        self.state()
            .scripted
            .entry(customer_id.clone())
            .or_default()
            .push_back(outcome);
    }

    pub fn decline_next(&self, customer_id: &CustomerId, times: usize) {
        for _ in 0..times {
            self.push_outcome(customer_id, MockOutcome::Decline("card_declined".to_string()));
        }
    }

    /// Make `default_payment_method` fail until cleared.
    pub fn set_lookup_error(&self, error: Option<PaymentError>) {
        self.state().lookup_error = error;
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    /// Every `create_payment` request received, replays included.
    pub fn requests(&self) -> Vec<PaymentRequest> {
        self.state().requests.clone()
    }

    /// Number of distinct payments that succeeded.
    pub fn successful_charges(&self) -> usize {
        self.state()
            .completed
            .values()
            .filter(|p| p.status == PaymentStatus::Succeeded)
            .count()
    }

    /// Total amount collected across distinct succeeded payments.
    pub fn collected_amount(&self) -> i64 {
        self.state()
            .completed
            .values()
            .filter(|p| p.status == PaymentStatus::Succeeded)
            .map(|p| p.amount)
            .sum()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_payment(&self, request: PaymentRequest) -> Result<Payment, PaymentError> {
        let mut state = self.state();
        state.requests.push(request.clone());

        if let Some(existing) = state.completed.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }

        let outcome = state
            .scripted
            .get_mut(&request.customer_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(MockOutcome::Succeed);

        let (status, failure_code) = match outcome {
            MockOutcome::Succeed => (PaymentStatus::Succeeded, None),
            MockOutcome::Decline(code) => (PaymentStatus::Failed, Some(code)),
            MockOutcome::Pending => (PaymentStatus::Pending, None),
            MockOutcome::Error(err) => return Err(err),
        };

        state.next_payment += 1;
        let id = PaymentId::new(format!("pay_mock_{}", state.next_payment))
            .map_err(|e| PaymentError::new(PaymentErrorCode::ProviderError, e.to_string()))?;
        let payment = Payment {
            id,
            status,
            amount: request.amount,
            currency: request.currency.clone(),
            failure_message: failure_code
                .as_ref()
                .map(|code| format!("Mock decline: {}", code)),
            failure_code,
        };
        if status != PaymentStatus::Pending {
            state
                .completed
                .insert(request.idempotency_key.clone(), payment.clone());
        }
        Ok(payment)
    }

    async fn default_payment_method(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<PaymentMethod>, PaymentError> {
        let state = self.state();
        if let Some(err) = &state.lookup_error {
            return Err(err.clone());
        }
        Ok(state.default_methods.get(customer_id).cloned())
    }
}
