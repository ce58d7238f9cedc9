//! Line items owned by an invoice.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::invoice::round2;
use crate::error::AppError;

/// One line on an invoice. Never exists without its invoice; the whole list
/// is replaced when the invoice's items are edited.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}

impl InvoiceItem {
    /// Build a line item, deriving `total = quantity * unit_price`.
    ///
    /// Rejects quantity <= 0 and unit_price < 0.
    pub fn new(
        invoice_id: Uuid,
        description: &str,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Result<Self, AppError> {
        if quantity <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Item quantity must be greater than zero"
            )));
        }
        if unit_price < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Item unit price must not be negative"
            )));
        }
        if description.trim().is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Item description must not be empty"
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            invoice_id,
            description: description.to_string(),
            quantity,
            unit_price,
            total: round2(quantity * unit_price),
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_quantity_times_price() {
        let item = InvoiceItem::new(
            Uuid::new_v4(),
            "Consulting",
            Decimal::new(25, 1),  // 2.5
            Decimal::new(1999, 2), // 19.99
        )
        .unwrap();
        assert_eq!(item.total, Decimal::new(4998, 2)); // 49.975 -> 49.98
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let err = InvoiceItem::new(Uuid::new_v4(), "x", Decimal::ZERO, Decimal::ONE);
        assert!(err.is_err());
    }

    #[test]
    fn negative_price_is_rejected() {
        let err = InvoiceItem::new(Uuid::new_v4(), "x", Decimal::ONE, Decimal::from(-1));
        assert!(err.is_err());
    }
}
