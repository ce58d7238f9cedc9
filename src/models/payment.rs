//! Append-only payment log.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

/// One successful external payment event. Written once by webhook
/// reconciliation (or a manual mark-paid), never updated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub gateway: String,
    pub transaction_id: String,
    pub status: String,
    pub notes: Option<String>,
    pub paid_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        invoice_id: Uuid,
        amount: Decimal,
        currency: &str,
        gateway: &str,
        transaction_id: &str,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            invoice_id,
            amount,
            currency: currency.to_string(),
            gateway: gateway.to_string(),
            transaction_id: transaction_id.to_string(),
            status: PaymentStatus::Completed.as_str().to_string(),
            notes,
            paid_at: Utc::now(),
        }
    }
}
