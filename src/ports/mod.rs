//! Ports - interfaces to everything outside the core.
//!
//! Driven ports are implemented by adapters (storage, payment processors,
//! event transport, time). The core depends only on these traits.

mod catalog_repository;
mod clock;
mod event_publisher;
mod invoice_repository;
mod payment_provider;
mod promo_code_repository;
mod subscription_repository;

pub use catalog_repository::CatalogRepository;
pub use clock::Clock;
pub use event_publisher::EventPublisher;
pub use invoice_repository::InvoiceRepository;
pub use payment_provider::{
    IdempotencyKey, Payment, PaymentError, PaymentErrorCode, PaymentMethod, PaymentProvider,
    PaymentRequest, PaymentStatus,
};
pub use promo_code_repository::PromoCodeRepository;
pub use subscription_repository::SubscriptionRepository;
