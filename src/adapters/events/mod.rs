//! Event bus adapters.
//!
//! - `InMemoryEventBus` - In-process bus that records envelopes for tests

mod in_memory;

pub use in_memory::InMemoryEventBus;
