//! In-memory storage adapters.
//!
//! Each store keeps its state behind a `tokio::sync::RwLock`. Guarded
//! writes (compare-and-swap, redemption increments) happen under a single
//! write lock. Suitable for tests and single-process embedding.

mod catalog;
mod invoice_repository;
mod promo_code_repository;
mod subscription_repository;

pub use catalog::InMemoryCatalog;
pub use invoice_repository::InMemoryInvoiceRepository;
pub use promo_code_repository::InMemoryPromoCodeRepository;
pub use subscription_repository::InMemorySubscriptionRepository;
