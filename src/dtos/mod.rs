//! Request and response DTOs for the REST surface.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Invoice, InvoiceItem, InvoiceStatus};

fn default_currency() -> String {
    "INR".to_string()
}

fn default_tax_rate() -> Decimal {
    Decimal::new(1800, 2)
}

#[derive(Debug, Deserialize, Validate)]
pub struct InvoiceItemRequest {
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Body for both `POST /invoices` and `PUT /invoices/{id}`; updates replace
/// the item list wholesale.
#[derive(Debug, Deserialize, Validate)]
pub struct InvoiceRequest {
    #[validate(length(min = 1, max = 200))]
    pub client_name: String,
    #[validate(email)]
    pub client_email: String,
    pub client_phone: Option<String>,
    pub client_address: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Percent, e.g. 18.00.
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,
    pub status: Option<InvoiceStatus>,
    pub notes: Option<String>,
    pub terms_conditions: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub items: Vec<InvoiceItemRequest>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceItemResponse {
    pub id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
}

impl From<InvoiceItem> for InvoiceItemResponse {
    fn from(item: InvoiceItem) -> Self {
        Self {
            id: item.id,
            description: item.description,
            quantity: item.quantity,
            unit_price: item.unit_price,
            total: item.total,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub invoice_number: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub client_address: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: String,
    pub status: InvoiceStatus,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub terms_conditions: Option<String>,
    pub payment_link: Option<String>,
    pub payment_gateway: Option<String>,
    pub last_reminder_sent: Option<DateTime<Utc>>,
    pub reminder_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<InvoiceItemResponse>,
}

impl InvoiceResponse {
    pub fn from_parts(invoice: Invoice, items: Vec<InvoiceItem>) -> Self {
        Self {
            id: invoice.id,
            invoice_number: invoice.invoice_number,
            client_name: invoice.client_name,
            client_email: invoice.client_email,
            client_phone: invoice.client_phone,
            client_address: invoice.client_address,
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            currency: invoice.currency,
            status: InvoiceStatus::from_string(&invoice.status),
            subtotal: invoice.subtotal,
            tax_rate: invoice.tax_rate,
            tax_amount: invoice.tax_amount,
            total_amount: invoice.total_amount,
            notes: invoice.notes,
            terms_conditions: invoice.terms_conditions,
            payment_link: invoice.payment_link,
            payment_gateway: invoice.payment_gateway,
            last_reminder_sent: invoice.last_reminder_sent,
            reminder_count: invoice.reminder_count,
            created_at: invoice.created_at,
            updated_at: invoice.updated_at,
            items: items.into_iter().map(InvoiceItemResponse::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct SendReminderRequest {
    /// Custom message body; the default reminder text is used when absent.
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
