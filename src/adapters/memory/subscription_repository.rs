//! In-memory subscription store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{CustomerId, DomainError, ErrorCode, SubscriptionId, Timestamp};
use crate::domain::subscription::Subscription;
use crate::ports::SubscriptionRepository;

/// Subscription store backed by a `HashMap`.
///
/// Compare-and-swap runs entirely under the write lock, so concurrent
/// writers conditioned on the same version see exactly one success.
#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: Arc<RwLock<HashMap<SubscriptionId, Subscription>>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored subscriptions.
    pub async fn count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Overwrite a stored record without a version check (test setup).
    pub async fn force_put(&self, subscription: Subscription) {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id, subscription);
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut subscriptions = self.subscriptions.write().await;
        if subscriptions.contains_key(&subscription.id) {
            return Err(DomainError::new(
                ErrorCode::AlreadyExists,
                format!("Subscription {} already exists", subscription.id),
            ));
        }
        subscriptions.insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        Ok(self.subscriptions.read().await.get(id).cloned())
    }

    async fn find_by_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<Subscription>, DomainError> {
        let subscriptions = self.subscriptions.read().await;
        let mut found: Vec<Subscription> = subscriptions
            .values()
            .filter(|s| &s.customer_id == customer_id)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.created_at);
        Ok(found)
    }

    async fn find_due(
        &self,
        now: Timestamp,
        limit: usize,
    ) -> Result<Vec<Subscription>, DomainError> {
        let subscriptions = self.subscriptions.read().await;
        let mut due: Vec<(Timestamp, &Subscription)> = subscriptions
            .values()
            .filter_map(|s| s.next_action_at().filter(|at| *at <= now).map(|at| (at, s)))
            .collect();
        due.sort_by_key(|(at, s)| (*at, s.id));
        Ok(due
            .into_iter()
            .take(limit)
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        subscription: &Subscription,
    ) -> Result<Subscription, DomainError> {
        let mut subscriptions = self.subscriptions.write().await;
        let stored = subscriptions.get_mut(&subscription.id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription {} not found", subscription.id),
            )
            .with_detail("id", subscription.id.to_string())
        })?;

        if stored.version != expected_version {
            return Err(DomainError::new(
                ErrorCode::ConcurrencyConflict,
                format!(
                    "Subscription {} is at version {}, expected {}",
                    subscription.id, stored.version, expected_version
                ),
            )
            .with_detail("subscription_id", subscription.id.to_string()));
        }

        let mut next = subscription.clone();
        next.version = expected_version + 1;
        *stored = next.clone();
        Ok(next)
    }
}
