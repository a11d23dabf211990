//! Subscription repository port.
//!
//! # Design
//!
//! - **Never deletes**: subscriptions end in terminal statuses
//! - **Compare-and-swap updates**: every write after insert is conditioned on
//!   the version that was read, and stores `expected_version + 1`

use async_trait::async_trait;

use crate::domain::foundation::{CustomerId, DomainError, SubscriptionId, Timestamp};
use crate::domain::subscription::Subscription;

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Store a new subscription.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the id is taken
    /// - `StorageError` on persistence failure
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Find a subscription by its ID.
    ///
    /// Returns `None` if not found.
    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    /// All subscriptions of a customer, oldest first.
    async fn find_by_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<Subscription>, DomainError>;

    /// Up to `limit` subscriptions whose next action is due at `now`,
    /// earliest first. Paused and terminal subscriptions are never returned.
    async fn find_due(&self, now: Timestamp, limit: usize)
        -> Result<Vec<Subscription>, DomainError>;

    /// Replace the stored subscription if its version still equals
    /// `expected_version`. Returns the stored value (with its new version).
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict` (with a `subscription_id` detail) if the
    ///   stored version differs
    /// - `SubscriptionNotFound` if nothing is stored under the id
    async fn compare_and_swap(
        &self,
        expected_version: u64,
        subscription: &Subscription,
    ) -> Result<Subscription, DomainError>;
}
