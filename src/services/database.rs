//! Postgres-backed [`InvoiceRepository`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Invoice, InvoiceItem, InvoiceStatus, Payment};
use crate::services::repository::{InvoiceRepository, InvoiceSummary, StatusSyncCounts};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[instrument(skip(database_url), fields(service = "invoice-service"))]
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        info!(max_connections, "Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl InvoiceRepository for Database {
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    async fn next_invoice_sequence(&self, owner_id: i64) -> Result<i64, AppError> {
        // Atomic per-owner counter; safe under concurrent invoice creation.
        let row = sqlx::query(
            r#"
            INSERT INTO invoice_counters (owner_id, last_value)
            VALUES ($1, 1)
            ON CONFLICT (owner_id)
            DO UPDATE SET last_value = invoice_counters.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("last_value"))
    }

    async fn create_invoice(
        &self,
        invoice: &Invoice,
        items: &[InvoiceItem],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, owner_id, invoice_number, client_name, client_email,
                client_phone, client_address, issue_date, due_date, currency,
                status, subtotal, tax_rate, tax_amount, total_amount,
                notes, terms_conditions, payment_link, payment_gateway,
                payment_order_id, last_reminder_sent, reminder_count,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24)
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.owner_id)
        .bind(&invoice.invoice_number)
        .bind(&invoice.client_name)
        .bind(&invoice.client_email)
        .bind(&invoice.client_phone)
        .bind(&invoice.client_address)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(&invoice.currency)
        .bind(&invoice.status)
        .bind(invoice.subtotal)
        .bind(invoice.tax_rate)
        .bind(invoice.tax_amount)
        .bind(invoice.total_amount)
        .bind(&invoice.notes)
        .bind(&invoice.terms_conditions)
        .bind(&invoice.payment_link)
        .bind(&invoice.payment_gateway)
        .bind(&invoice.payment_order_id)
        .bind(invoice.last_reminder_sent)
        .bind(invoice.reminder_count)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Invoice number {} already exists",
                    invoice.invoice_number
                ))
            }
            _ => AppError::from(e),
        })?;

        for item in items {
            insert_item(&mut tx, item).await?;
        }

        tx.commit().await?;

        info!(invoice_id = %invoice.id, invoice_number = %invoice.invoice_number, "Invoice created");
        Ok(())
    }

    async fn get_invoice(&self, owner_id: i64, id: Uuid) -> Result<Option<Invoice>, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(invoice)
    }

    async fn list_invoices(
        &self,
        owner_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Invoice>, AppError> {
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT * FROM invoices
            WHERE owner_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(owner_id)
        .bind(limit.unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(invoices)
    }

    async fn update_invoice(
        &self,
        invoice: &Invoice,
        items: &[InvoiceItem],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET client_name = $2, client_email = $3, client_phone = $4,
                client_address = $5, issue_date = $6, due_date = $7,
                currency = $8, status = $9, subtotal = $10, tax_rate = $11,
                tax_amount = $12, total_amount = $13, notes = $14,
                terms_conditions = $15, updated_at = $16
            WHERE id = $1
            "#,
        )
        .bind(invoice.id)
        .bind(&invoice.client_name)
        .bind(&invoice.client_email)
        .bind(&invoice.client_phone)
        .bind(&invoice.client_address)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(&invoice.currency)
        .bind(&invoice.status)
        .bind(invoice.subtotal)
        .bind(invoice.tax_rate)
        .bind(invoice.tax_amount)
        .bind(invoice.total_amount)
        .bind(&invoice.notes)
        .bind(&invoice.terms_conditions)
        .bind(invoice.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Invoice not found")));
        }

        // Wholesale item replacement.
        sqlx::query("DELETE FROM invoice_items WHERE invoice_id = $1")
            .bind(invoice.id)
            .execute(&mut *tx)
            .await?;
        for item in items {
            insert_item(&mut tx, item).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_invoice(&self, owner_id: i64, id: Uuid) -> Result<bool, AppError> {
        // Items and payments cascade at the schema level.
        let result = sqlx::query("DELETE FROM invoices WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, AppError> {
        let items = sqlx::query_as::<_, InvoiceItem>(
            "SELECT * FROM invoice_items WHERE invoice_id = $1 ORDER BY created_at",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn summary(&self, owner_id: i64) -> Result<InvoiceSummary, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count, COALESCE(SUM(total_amount), 0) AS amount
            FROM invoices WHERE owner_id = $1 GROUP BY status
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut summary = InvoiceSummary::default();
        for row in rows {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            let amount: Decimal = row.get("amount");
            summary.total_invoices += count;
            summary.total_amount += amount;
            match InvoiceStatus::from_string(&status) {
                InvoiceStatus::Pending => {
                    summary.pending_invoices += count;
                    summary.total_pending_amount += amount;
                }
                InvoiceStatus::Paid => {
                    summary.paid_invoices += count;
                    summary.total_paid_amount += amount;
                }
                InvoiceStatus::Overdue => {
                    summary.overdue_invoices += count;
                    summary.total_overdue_amount += amount;
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
        // Write-once: refuses to overwrite an existing link.
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET payment_link = $2, payment_gateway = $3, payment_order_id = $4,
                updated_at = NOW()
            WHERE id = $1 AND (payment_link IS NULL OR payment_link = '')
            "#,
        )
        .bind(invoice_id)
        .bind(link)
        .bind(gateway)
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Invoice>, AppError> {
        let invoice =
            sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE payment_order_id = $1")
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(invoice)
    }

    async fn mark_paid_with_payment(
        &self,
        invoice_id: Uuid,
        payment: &Payment,
    ) -> Result<bool, AppError> {
        // CAS on status plus the payment insert in one transaction:
        // concurrent duplicate webhooks race the CAS and exactly one delivery
        // wins; a failed insert rolls the transition back.
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE invoices SET status = 'paid', updated_at = NOW()
            WHERE id = $1 AND status <> 'paid'
            "#,
        )
        .bind(invoice_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO payments (id, invoice_id, amount, currency, gateway,
                                  transaction_id, status, notes, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(payment.id)
        .bind(payment.invoice_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(&payment.gateway)
        .bind(&payment.transaction_id)
        .bind(&payment.status)
        .bind(&payment.notes)
        .bind(payment.paid_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_payments(&self, invoice_id: Uuid) -> Result<Vec<Payment>, AppError> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE invoice_id = $1 ORDER BY paid_at",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    async fn sync_statuses(&self, today: NaiveDate) -> Result<StatusSyncCounts, AppError> {
        let marked = sqlx::query(
            r#"
            UPDATE invoices SET status = 'overdue', updated_at = NOW()
            WHERE status = 'pending' AND due_date < $1
            "#,
        )
        .bind(today)
        .execute(&self.pool)
        .await?;

        let reverted = sqlx::query(
            r#"
            UPDATE invoices SET status = 'pending', updated_at = NOW()
            WHERE status = 'overdue' AND due_date >= $1
            "#,
        )
        .bind(today)
        .execute(&self.pool)
        .await?;

        Ok(StatusSyncCounts {
            marked_overdue: marked.rows_affected(),
            reverted_pending: reverted.rows_affected(),
        })
    }

    async fn list_overdue_needing_reminder(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, AppError> {
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT * FROM invoices
            WHERE status = 'overdue'
              AND (last_reminder_sent IS NULL OR last_reminder_sent < $1)
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(invoices)
    }

    async fn list_due_soon_unreminded(
        &self,
        due_on: NaiveDate,
    ) -> Result<Vec<Invoice>, AppError> {
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT * FROM invoices
            WHERE status = 'pending' AND due_date = $1 AND last_reminder_sent IS NULL
            "#,
        )
        .bind(due_on)
        .fetch_all(&self.pool)
        .await?;
        Ok(invoices)
    }

    async fn record_reminder_sent(
        &self,
        invoice_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE invoices
            SET last_reminder_sent = $2, reminder_count = reminder_count + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(invoice_id)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_first_reminder(
        &self,
        invoice_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        // Conditional on the null check so racing batch runs stamp at most once.
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET last_reminder_sent = $2, reminder_count = reminder_count + 1,
                updated_at = NOW()
            WHERE id = $1 AND last_reminder_sent IS NULL
            "#,
        )
        .bind(invoice_id)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

async fn insert_item(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    item: &InvoiceItem,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO invoice_items (id, invoice_id, description, quantity,
                                   unit_price, total, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(item.id)
    .bind(item.invoice_id)
    .bind(&item.description)
    .bind(item.quantity)
    .bind(item.unit_price)
    .bind(item.total)
    .bind(item.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
