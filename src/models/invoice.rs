//! Invoice aggregate: money-math invariants and status transitions.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::InvoiceItem;

/// Invoice status.
///
/// `paid` is terminal with respect to automatic transitions; `cancelled` and
/// `draft` are likewise never touched by the batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "draft" => InvoiceStatus::Draft,
            "paid" => InvoiceStatus::Paid,
            "overdue" => InvoiceStatus::Overdue,
            "cancelled" => InvoiceStatus::Cancelled,
            _ => InvoiceStatus::Pending,
        }
    }
}

/// Invoice record.
///
/// Money fields are derived, never written directly by callers; call
/// [`Invoice::recompute_totals`] after any item change and before persisting.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub owner_id: i64,
    pub invoice_number: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub client_address: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: String,
    pub status: String,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub terms_conditions: Option<String>,
    pub payment_link: Option<String>,
    pub payment_gateway: Option<String>,
    pub payment_order_id: Option<String>,
    pub last_reminder_sent: Option<DateTime<Utc>>,
    pub reminder_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }

    /// Recompute subtotal, tax and total from the current item list.
    ///
    /// Invariants: `subtotal == sum(item.total)`,
    /// `tax_amount == round2(subtotal * tax_rate / 100)`,
    /// `total_amount == subtotal + tax_amount`.
    pub fn recompute_totals(&mut self, items: &[InvoiceItem]) {
        let subtotal: Decimal = items.iter().map(|i| i.total).sum();
        self.subtotal = round2(subtotal);
        self.tax_amount = round2(self.subtotal * self.tax_rate / Decimal::from(100));
        self.total_amount = round2(self.subtotal + self.tax_amount);
    }

    /// Status the invoice should have for the given date.
    ///
    /// Paid, cancelled and draft invoices keep their status; everything else
    /// is overdue once the due date has passed, pending otherwise.
    pub fn transition_for_date(&self, today: NaiveDate) -> InvoiceStatus {
        match self.status() {
            s @ (InvoiceStatus::Paid | InvoiceStatus::Cancelled | InvoiceStatus::Draft) => s,
            _ => {
                if self.due_date < today {
                    InvoiceStatus::Overdue
                } else {
                    InvoiceStatus::Pending
                }
            }
        }
    }
}

/// Round to two decimal places with the scale fixed at exactly 2, so money
/// amounts always read (and serialize) as `125.00`, never `125`.
pub(crate) fn round2(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp(2);
    rounded.rescale(2);
    rounded
}

/// Human-readable invoice number: `INV-{owner:04}-{seq:04}`.
pub fn format_invoice_number(owner_id: i64, sequence: i64) -> String {
    format!("INV-{:04}-{:04}", owner_id, sequence)
}
