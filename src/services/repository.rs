//! Persistence interface for the invoice domain.
//!
//! The domain logic only ever talks to [`InvoiceRepository`]; Postgres is the
//! concrete store behind it in production (see `database.rs`), and the
//! in-memory implementation here backs tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Invoice, InvoiceItem, InvoiceStatus, Payment};

/// Aggregate counts and amounts by status for one owner.
#[derive(Debug, Clone, Serialize, Default)]
pub struct InvoiceSummary {
    pub total_invoices: i64,
    pub pending_invoices: i64,
    pub paid_invoices: i64,
    pub overdue_invoices: i64,
    pub total_pending_amount: Decimal,
    pub total_paid_amount: Decimal,
    pub total_overdue_amount: Decimal,
    pub total_amount: Decimal,
}

/// Result of one status-sync pass of the batch job.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusSyncCounts {
    pub marked_overdue: u64,
    pub reverted_pending: u64,
}

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    /// Atomically advance and return the per-owner invoice number sequence.
    async fn next_invoice_sequence(&self, owner_id: i64) -> Result<i64, AppError>;

    async fn create_invoice(
        &self,
        invoice: &Invoice,
        items: &[InvoiceItem],
    ) -> Result<(), AppError>;

    /// Owner-scoped fetch: a foreign invoice reads as absent.
    async fn get_invoice(&self, owner_id: i64, id: Uuid) -> Result<Option<Invoice>, AppError>;

    /// Owner-scoped list, newest first. `limit` caps the result when set.
    async fn list_invoices(
        &self,
        owner_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Invoice>, AppError>;

    /// Persist an edited invoice, replacing its item list wholesale.
    async fn update_invoice(
        &self,
        invoice: &Invoice,
        items: &[InvoiceItem],
    ) -> Result<(), AppError>;

    /// Delete an invoice and its items. Returns false when absent.
    async fn delete_invoice(&self, owner_id: i64, id: Uuid) -> Result<bool, AppError>;

    async fn list_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, AppError>;

    async fn summary(&self, owner_id: i64) -> Result<InvoiceSummary, AppError>;

    /// Write-once payment linkage. Returns false (and changes nothing) when a
    /// link is already present, guarding against lost updates between
    /// concurrent link requests.
    async fn set_payment_link(
        &self,
        invoice_id: Uuid,
        link: &str,
        gateway: &str,
        order_id: &str,
    ) -> Result<bool, AppError>;

    /// Locate the invoice holding the given external order reference.
    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Invoice>, AppError>;

    /// Compare-and-set transition to paid plus the payment record, as one
    /// atomic operation. Returns true exactly once per invoice; a second call
    /// (duplicate webhook, racing delivery) is a no-op returning false that
    /// appends nothing. The transition and the append commit together: a
    /// failed append rolls the transition back, so a paid invoice always has
    /// its payment row.
    async fn mark_paid_with_payment(
        &self,
        invoice_id: Uuid,
        payment: &Payment,
    ) -> Result<bool, AppError>;

    async fn list_payments(&self, invoice_id: Uuid) -> Result<Vec<Payment>, AppError>;

    /// Bulk status sync: pending past due -> overdue, overdue with a future
    /// due date -> pending. Paid, cancelled and draft rows are never touched.
    async fn sync_statuses(&self, today: NaiveDate) -> Result<StatusSyncCounts, AppError>;

    /// Overdue invoices whose last reminder is older than `cutoff` (or never
    /// sent).
    async fn list_overdue_needing_reminder(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, AppError>;

    /// Pending invoices due exactly on `due_on` that have never been
    /// reminded.
    async fn list_due_soon_unreminded(&self, due_on: NaiveDate)
        -> Result<Vec<Invoice>, AppError>;

    /// Stamp a reminder send unconditionally (overdue nag, manual reminder).
    async fn record_reminder_sent(
        &self,
        invoice_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Conditionally stamp the first-ever reminder. Returns false when a
    /// reminder was already recorded, so racing batch runs send at most once.
    async fn claim_first_reminder(
        &self,
        invoice_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;
}

/// In-memory repository used by tests.
#[derive(Clone, Default)]
pub struct InMemoryInvoiceRepository {
    inner: Arc<RwLock<Store>>,
}

#[derive(Default)]
struct Store {
    invoices: HashMap<Uuid, Invoice>,
    items: HashMap<Uuid, Vec<InvoiceItem>>,
    payments: Vec<Payment>,
    counters: HashMap<i64, i64>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn next_invoice_sequence(&self, owner_id: i64) -> Result<i64, AppError> {
        let mut store = self.inner.write().await;
        let counter = store.counters.entry(owner_id).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn create_invoice(
        &self,
        invoice: &Invoice,
        items: &[InvoiceItem],
    ) -> Result<(), AppError> {
        let mut store = self.inner.write().await;
        if store
            .invoices
            .values()
            .any(|i| i.invoice_number == invoice.invoice_number)
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice number {} already exists",
                invoice.invoice_number
            )));
        }
        store.invoices.insert(invoice.id, invoice.clone());
        store.items.insert(invoice.id, items.to_vec());
        Ok(())
    }

    async fn get_invoice(&self, owner_id: i64, id: Uuid) -> Result<Option<Invoice>, AppError> {
        let store = self.inner.read().await;
        Ok(store
            .invoices
            .get(&id)
            .filter(|i| i.owner_id == owner_id)
            .cloned())
    }

    async fn list_invoices(
        &self,
        owner_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Invoice>, AppError> {
        let store = self.inner.read().await;
        let mut invoices: Vec<Invoice> = store
            .invoices
            .values()
            .filter(|i| i.owner_id == owner_id)
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            invoices.truncate(limit as usize);
        }
        Ok(invoices)
    }

    async fn update_invoice(
        &self,
        invoice: &Invoice,
        items: &[InvoiceItem],
    ) -> Result<(), AppError> {
        let mut store = self.inner.write().await;
        if !store.invoices.contains_key(&invoice.id) {
            return Err(AppError::NotFound(anyhow::anyhow!("Invoice not found")));
        }
        store.invoices.insert(invoice.id, invoice.clone());
        store.items.insert(invoice.id, items.to_vec());
        Ok(())
    }

    async fn delete_invoice(&self, owner_id: i64, id: Uuid) -> Result<bool, AppError> {
        let mut store = self.inner.write().await;
        let owned = store
            .invoices
            .get(&id)
            .map(|i| i.owner_id == owner_id)
            .unwrap_or(false);
        if !owned {
            return Ok(false);
        }
        store.invoices.remove(&id);
        store.items.remove(&id);
        Ok(true)
    }

    async fn list_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, AppError> {
        let store = self.inner.read().await;
        Ok(store.items.get(&invoice_id).cloned().unwrap_or_default())
    }

    async fn summary(&self, owner_id: i64) -> Result<InvoiceSummary, AppError> {
        let store = self.inner.read().await;
        let mut summary = InvoiceSummary::default();
        for invoice in store.invoices.values().filter(|i| i.owner_id == owner_id) {
            summary.total_invoices += 1;
            summary.total_amount += invoice.total_amount;
            match invoice.status() {
                InvoiceStatus::Pending => {
                    summary.pending_invoices += 1;
                    summary.total_pending_amount += invoice.total_amount;
                }
                InvoiceStatus::Paid => {
                    summary.paid_invoices += 1;
                    summary.total_paid_amount += invoice.total_amount;
                }
                InvoiceStatus::Overdue => {
                    summary.overdue_invoices += 1;
                    summary.total_overdue_amount += invoice.total_amount;
                }
                _ => {}
            }
        }
        Ok(summary)
    }

    async fn set_payment_link(
        &self,
        invoice_id: Uuid,
        link: &str,
        gateway: &str,
        order_id: &str,
    ) -> Result<bool, AppError> {
        let mut store = self.inner.write().await;
        let invoice = store
            .invoices
            .get_mut(&invoice_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        if invoice.payment_link.as_deref().is_some_and(|l| !l.is_empty()) {
            return Ok(false);
        }
        invoice.payment_link = Some(link.to_string());
        invoice.payment_gateway = Some(gateway.to_string());
        invoice.payment_order_id = Some(order_id.to_string());
        invoice.updated_at = Utc::now();
        Ok(true)
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Invoice>, AppError> {
        let store = self.inner.read().await;
        Ok(store
            .invoices
            .values()
            .find(|i| i.payment_order_id.as_deref() == Some(order_id))
            .cloned())
    }

    async fn mark_paid_with_payment(
        &self,
        invoice_id: Uuid,
        payment: &Payment,
    ) -> Result<bool, AppError> {
        // One lock scope: the transition and the append are indivisible.
        let mut store = self.inner.write().await;
        let invoice = store
            .invoices
            .get_mut(&invoice_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        if invoice.status() == InvoiceStatus::Paid {
            return Ok(false);
        }
        invoice.status = InvoiceStatus::Paid.as_str().to_string();
        invoice.updated_at = Utc::now();
        store.payments.push(payment.clone());
        Ok(true)
    }

    async fn list_payments(&self, invoice_id: Uuid) -> Result<Vec<Payment>, AppError> {
        let store = self.inner.read().await;
        Ok(store
            .payments
            .iter()
            .filter(|p| p.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn sync_statuses(&self, today: NaiveDate) -> Result<StatusSyncCounts, AppError> {
        let mut store = self.inner.write().await;
        let mut counts = StatusSyncCounts::default();
        for invoice in store.invoices.values_mut() {
            match invoice.status() {
                InvoiceStatus::Pending if invoice.due_date < today => {
                    invoice.status = InvoiceStatus::Overdue.as_str().to_string();
                    invoice.updated_at = Utc::now();
                    counts.marked_overdue += 1;
                }
                InvoiceStatus::Overdue if invoice.due_date >= today => {
                    invoice.status = InvoiceStatus::Pending.as_str().to_string();
                    invoice.updated_at = Utc::now();
                    counts.reverted_pending += 1;
                }
                _ => {}
            }
        }
        Ok(counts)
    }

    async fn list_overdue_needing_reminder(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, AppError> {
        let store = self.inner.read().await;
        Ok(store
            .invoices
            .values()
            .filter(|i| {
                i.status() == InvoiceStatus::Overdue
                    && i.last_reminder_sent.map_or(true, |sent| sent < cutoff)
            })
            .cloned()
            .collect())
    }

    async fn list_due_soon_unreminded(
        &self,
        due_on: NaiveDate,
    ) -> Result<Vec<Invoice>, AppError> {
        let store = self.inner.read().await;
        Ok(store
            .invoices
            .values()
            .filter(|i| {
                i.status() == InvoiceStatus::Pending
                    && i.due_date == due_on
                    && i.last_reminder_sent.is_none()
            })
            .cloned()
            .collect())
    }

    async fn record_reminder_sent(
        &self,
        invoice_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut store = self.inner.write().await;
        let invoice = store
            .invoices
            .get_mut(&invoice_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        invoice.last_reminder_sent = Some(sent_at);
        invoice.reminder_count += 1;
        invoice.updated_at = Utc::now();
        Ok(())
    }

    async fn claim_first_reminder(
        &self,
        invoice_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut store = self.inner.write().await;
        let invoice = store
            .invoices
            .get_mut(&invoice_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        if invoice.last_reminder_sent.is_some() {
            return Ok(false);
        }
        invoice.last_reminder_sent = Some(sent_at);
        invoice.reminder_count += 1;
        invoice.updated_at = Utc::now();
        Ok(true)
    }
}
