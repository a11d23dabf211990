//! Clock port - the only source of "now" for the core.

use crate::domain::foundation::Timestamp;

/// Time source injected into every entry point.
///
/// Tests drive the lifecycle by advancing a manual clock instead of
/// waiting for wall time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}
