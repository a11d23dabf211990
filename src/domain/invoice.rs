//! Invoice aggregate and its status lifecycle.
//!
//! Paid and void invoices are immutable. Every charge the core makes is
//! recorded on an invoice whose id derives from the charge's idempotency
//! key, so replays overwrite instead of duplicating.

use serde::{Deserialize, Serialize};

use crate::domain::error::BillingError;
use crate::domain::foundation::{
    Currency, CustomerId, DomainEvent, EventId, InvoiceId, PaymentId, StateMachine,
    SubscriptionId, Timestamp,
};
use crate::domain::promotion::AppliedDiscount;

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Open,
    Paid,
    Void,
    Uncollectible,
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Open => "open",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
            InvoiceStatus::Uncollectible => "uncollectible",
        };
        write!(f, "{}", s)
    }
}

impl StateMachine for InvoiceStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, target),
            (Draft, Open)
                | (Draft, Void)
                | (Open, Paid)
                | (Open, Void)
                | (Open, Uncollectible)
                | (Uncollectible, Paid)
                | (Uncollectible, Void)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use InvoiceStatus::*;
        match self {
            Draft => vec![Open, Void],
            Open => vec![Paid, Void, Uncollectible],
            Uncollectible => vec![Paid, Void],
            Paid | Void => vec![],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemKind {
    Subscription,
    ProrationCharge,
    ProrationCredit,
    OneOff,
}

/// One billed line. Credits carry negative amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub amount: i64,
    pub kind: LineItemKind,
}

impl LineItem {
    pub fn new(description: impl Into<String>, amount: i64, kind: LineItemKind) -> Self {
        Self {
            description: description.into(),
            amount,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub customer_id: CustomerId,
    pub subscription_id: Option<SubscriptionId>,
    pub currency: Currency,
    pub lines: Vec<LineItem>,
    pub discounts: Vec<AppliedDiscount>,
    pub subtotal: i64,
    pub total: i64,
    pub status: InvoiceStatus,
    pub payment_id: Option<PaymentId>,
    pub idempotency_key: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub paid_at: Option<Timestamp>,
}

impl Invoice {
    pub fn draft(
        id: InvoiceId,
        customer_id: CustomerId,
        currency: Currency,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            customer_id,
            subscription_id: None,
            currency,
            lines: Vec::new(),
            discounts: Vec::new(),
            subtotal: 0,
            total: 0,
            status: InvoiceStatus::Draft,
            payment_id: None,
            idempotency_key: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
        }
    }

    /// Draft invoice whose id derives from `idempotency_key`.
    pub fn for_idempotency_key(
        idempotency_key: &str,
        customer_id: CustomerId,
        currency: Currency,
        now: Timestamp,
    ) -> Self {
        let mut invoice = Self::draft(
            InvoiceId::for_idempotency_key(idempotency_key),
            customer_id,
            currency,
            now,
        );
        invoice.idempotency_key = Some(idempotency_key.to_string());
        invoice
    }

    pub fn for_subscription(mut self, subscription_id: SubscriptionId) -> Self {
        self.subscription_id = Some(subscription_id);
        self
    }

    fn ensure_draft(&self, attempted: &str) -> Result<(), BillingError> {
        if self.status != InvoiceStatus::Draft {
            return Err(BillingError::invalid_state(self.status, attempted));
        }
        Ok(())
    }

    pub fn add_line(&mut self, line: LineItem) -> Result<(), BillingError> {
        self.ensure_draft("add a line to")?;
        self.lines.push(line);
        self.recalculate();
        Ok(())
    }

    pub fn set_discounts(&mut self, discounts: Vec<AppliedDiscount>) -> Result<(), BillingError> {
        self.ensure_draft("discount")?;
        self.discounts = discounts;
        self.recalculate();
        Ok(())
    }

    fn recalculate(&mut self) {
        self.subtotal = self.lines.iter().map(|l| l.amount).sum();
        let discounted: i64 = self.discounts.iter().map(|d| d.amount).sum();
        self.total = (self.subtotal - discounted).max(0);
    }

    fn move_to(&mut self, target: InvoiceStatus, now: Timestamp) -> Result<(), BillingError> {
        self.status = self
            .status
            .transition_to(target)
            .map_err(|_| BillingError::invalid_state(self.status, format!("mark {}", target)))?;
        self.updated_at = now;
        Ok(())
    }

    /// Draft → Open.
    pub fn finalize(&mut self, now: Timestamp) -> Result<(), BillingError> {
        self.move_to(InvoiceStatus::Open, now)
    }

    /// Settles the invoice with a succeeded payment.
    ///
    /// A zero-total invoice is settled without a payment.
    pub fn mark_paid(&mut self, payment_id: Option<PaymentId>, now: Timestamp) -> Result<(), BillingError> {
        if payment_id.is_none() && self.total > 0 {
            return Err(BillingError::validation(
                "payment_id",
                "a paid invoice with a positive total requires a succeeded payment",
            ));
        }
        self.move_to(InvoiceStatus::Paid, now)?;
        self.payment_id = payment_id;
        self.paid_at = Some(now);
        Ok(())
    }

    pub fn void(&mut self, now: Timestamp) -> Result<(), BillingError> {
        self.move_to(InvoiceStatus::Void, now)
    }

    pub fn mark_uncollectible(&mut self, now: Timestamp) -> Result<(), BillingError> {
        self.move_to(InvoiceStatus::Uncollectible, now)
    }

    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Paid
    }
}

/// An invoice was settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePaid {
    pub event_id: EventId,
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub subscription_id: Option<SubscriptionId>,
    pub total: i64,
    pub currency: Currency,
    pub payment_id: Option<PaymentId>,
    pub occurred_at: Timestamp,
}

impl InvoicePaid {
    pub fn for_invoice(invoice: &Invoice, now: Timestamp) -> Self {
        Self {
            event_id: EventId::new(),
            invoice_id: invoice.id,
            customer_id: invoice.customer_id.clone(),
            subscription_id: invoice.subscription_id,
            total: invoice.total,
            currency: invoice.currency.clone(),
            payment_id: invoice.payment_id.clone(),
            occurred_at: now,
        }
    }
}

impl DomainEvent for InvoicePaid {
    fn event_type(&self) -> &'static str {
        "invoice.paid"
    }

    fn aggregate_id(&self) -> String {
        self.invoice_id.to_string()
    }

    fn aggregate_type(&self) -> &'static str {
        "Invoice"
    }

    fn occurred_at(&self) -> Timestamp {
        self.occurred_at
    }

    fn event_id(&self) -> EventId {
        self.event_id.clone()
    }
}
