//! In-memory invoice store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::foundation::{CustomerId, DomainError, InvoiceId, StateMachine};
use crate::domain::invoice::Invoice;
use crate::ports::InvoiceRepository;

#[derive(Debug, Clone, Default)]
pub struct InMemoryInvoiceRepository {
    invoices: Arc<RwLock<HashMap<InvoiceId, Invoice>>>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.invoices.read().await.len()
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn save(&self, invoice: &Invoice) -> Result<(), DomainError> {
        let mut invoices = self.invoices.write().await;
        if let Some(stored) = invoices.get(&invoice.id) {
            if stored.status.is_terminal() {
                debug!(invoice_id = %invoice.id, status = %stored.status, "invoice already final");
                return Ok(());
            }
        }
        invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, DomainError> {
        Ok(self.invoices.read().await.get(id).cloned())
    }

    async fn find_by_customer(&self, customer_id: &CustomerId) -> Result<Vec<Invoice>, DomainError> {
        let invoices = self.invoices.read().await;
        let mut found: Vec<Invoice> = invoices
            .values()
            .filter(|i| &i.customer_id == customer_id)
            .cloned()
            .collect();
        found.sort_by_key(|i| (i.created_at, i.id));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Currency, Timestamp};

    #[tokio::test]
    async fn save_upserts_by_id() {
        let repo = InMemoryInvoiceRepository::new();
        let now = Timestamp::from_unix_secs(1_717_200_000).unwrap();
        let customer = CustomerId::new("cus_1").unwrap();
        let usd = Currency::try_new("USD").unwrap();

        let first = Invoice::for_idempotency_key("renewal_abc", customer.clone(), usd.clone(), now);
        let replay = Invoice::for_idempotency_key("renewal_abc", customer.clone(), usd, now);
        repo.save(&first).await.unwrap();
        repo.save(&replay).await.unwrap();

        assert_eq!(repo.count().await, 1);
        assert_eq!(repo.find_by_customer(&customer).await.unwrap().len(), 1);
        assert!(repo.find_by_id(&first.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn paid_invoice_is_not_overwritten() {
        let repo = InMemoryInvoiceRepository::new();
        let now = Timestamp::from_unix_secs(1_717_200_000).unwrap();
        let later = now.plus_secs(60);
        let customer = CustomerId::new("cus_1").unwrap();
        let usd = Currency::try_new("USD").unwrap();

        let mut first = Invoice::for_idempotency_key("renewal_abc", customer.clone(), usd.clone(), now);
        first.finalize(now).unwrap();
        first.mark_paid(None, now).unwrap();
        repo.save(&first).await.unwrap();

        let mut replay = Invoice::for_idempotency_key("renewal_abc", customer, usd, later);
        replay.finalize(later).unwrap();
        replay.mark_paid(None, later).unwrap();
        repo.save(&replay).await.unwrap();

        let stored = repo.find_by_id(&first.id).await.unwrap().unwrap();
        assert_eq!(stored.paid_at, Some(now));
        assert_eq!(stored.created_at, now);
    }

    #[tokio::test]
    async fn open_invoice_can_still_be_replaced() {
        let repo = InMemoryInvoiceRepository::new();
        let now = Timestamp::from_unix_secs(1_717_200_000).unwrap();
        let customer = CustomerId::new("cus_1").unwrap();
        let usd = Currency::try_new("USD").unwrap();

        let mut invoice = Invoice::for_idempotency_key("charge_abc", customer, usd, now);
        invoice.finalize(now).unwrap();
        repo.save(&invoice).await.unwrap();
        invoice.mark_paid(None, now).unwrap();
        repo.save(&invoice).await.unwrap();

        assert!(repo.find_by_id(&invoice.id).await.unwrap().unwrap().is_paid());
    }
}
