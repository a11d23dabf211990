//! Billing handlers - charges outside the subscription cycle.

mod charge_customer;

pub use charge_customer::{ChargeCustomerCommand, ChargeCustomerHandler, ChargeCustomerResult};
