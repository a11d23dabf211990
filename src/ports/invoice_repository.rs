//! Invoice repository port.

use async_trait::async_trait;

use crate::domain::foundation::{CustomerId, DomainError, InvoiceId};
use crate::domain::invoice::Invoice;

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Insert or replace by id.
    ///
    /// Invoice ids derive from idempotency keys, so a replayed charge saves
    /// under the same id. Once the stored invoice is paid or void, saving
    /// it again leaves the stored copy untouched and succeeds.
    async fn save(&self, invoice: &Invoice) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, DomainError>;

    /// All invoices of a customer, oldest first.
    async fn find_by_customer(&self, customer_id: &CustomerId) -> Result<Vec<Invoice>, DomainError>;
}
