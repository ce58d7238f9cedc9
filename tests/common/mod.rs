//! Test helper module for invoice-service integration tests.
//!
//! Spawns the HTTP application over the in-memory repository with a
//! recording mailer, so tests need no database or SMTP server. Gateway
//! base URLs point at wiremock servers when a test needs them.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use invoice_service::config::{
    Config, DatabaseConfig, RazorpayConfig, ReminderConfig, ServerConfig, SmtpConfig, StripeConfig,
};
use invoice_service::error::AppError;
use invoice_service::models::{Invoice, InvoiceItem, Payment};
use invoice_service::services::email::Mailer;
use invoice_service::services::repository::{InvoiceSummary, StatusSyncCounts};
use invoice_service::services::{InMemoryInvoiceRepository, InvoiceRepository};
use invoice_service::startup::{build_router, build_state};
use secrecy::Secret;
use serde_json::json;
use sha2::Sha256;
use tokio::net::TcpListener;
use uuid::Uuid;

pub const TEST_OWNER_ID: i64 = 7;
pub const OTHER_OWNER_ID: i64 = 8;
pub const RAZORPAY_WEBHOOK_SECRET: &str = "rzp_webhook_secret";
pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_test";

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mailer double that records every send instead of talking SMTP.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentEmail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Repository double wrapping the in-memory store, with switchable fault
/// injection for exercising partial-failure paths. Every method delegates
/// to the inner store unless its fault is armed.
pub struct FaultyRepository {
    inner: Arc<InMemoryInvoiceRepository>,
    fail_next_paid_write: AtomicBool,
    refuse_link_writes: AtomicBool,
}

impl FaultyRepository {
    pub fn new(inner: Arc<InMemoryInvoiceRepository>) -> Self {
        Self {
            inner,
            fail_next_paid_write: AtomicBool::new(false),
            refuse_link_writes: AtomicBool::new(false),
        }
    }

    /// Make the next paid transition fail with a database error, as a
    /// connection dropped mid-write would.
    pub fn fail_next_paid_write(&self) {
        self.fail_next_paid_write.store(true, Ordering::SeqCst);
    }

    /// Make every `set_payment_link` report the write-once guard as already
    /// claimed, without writing anything.
    pub fn refuse_link_writes(&self) {
        self.refuse_link_writes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl InvoiceRepository for FaultyRepository {
    async fn health_check(&self) -> Result<(), AppError> {
        self.inner.health_check().await
    }

    async fn next_invoice_sequence(&self, owner_id: i64) -> Result<i64, AppError> {
        self.inner.next_invoice_sequence(owner_id).await
    }

    async fn create_invoice(
        &self,
        invoice: &Invoice,
        items: &[InvoiceItem],
    ) -> Result<(), AppError> {
        self.inner.create_invoice(invoice, items).await
    }

    async fn get_invoice(&self, owner_id: i64, id: Uuid) -> Result<Option<Invoice>, AppError> {
        self.inner.get_invoice(owner_id, id).await
    }

    async fn list_invoices(
        &self,
        owner_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Invoice>, AppError> {
        self.inner.list_invoices(owner_id, limit).await
    }

    async fn update_invoice(
        &self,
        invoice: &Invoice,
        items: &[InvoiceItem],
    ) -> Result<(), AppError> {
        self.inner.update_invoice(invoice, items).await
    }

    async fn delete_invoice(&self, owner_id: i64, id: Uuid) -> Result<bool, AppError> {
        self.inner.delete_invoice(owner_id, id).await
    }

    async fn list_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, AppError> {
        self.inner.list_items(invoice_id).await
    }

    async fn summary(&self, owner_id: i64) -> Result<InvoiceSummary, AppError> {
        self.inner.summary(owner_id).await
    }

    async fn set_payment_link(
        &self,
        invoice_id: Uuid,
        link: &str,
        gateway: &str,
        order_id: &str,
    ) -> Result<bool, AppError> {
        if self.refuse_link_writes.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner
            .set_payment_link(invoice_id, link, gateway, order_id)
            .await
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Invoice>, AppError> {
        self.inner.find_by_order_id(order_id).await
    }

    async fn mark_paid_with_payment(
        &self,
        invoice_id: Uuid,
        payment: &Payment,
    ) -> Result<bool, AppError> {
        if self.fail_next_paid_write.swap(false, Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "connection reset by peer"
            )));
        }
        self.inner.mark_paid_with_payment(invoice_id, payment).await
    }

    async fn list_payments(&self, invoice_id: Uuid) -> Result<Vec<Payment>, AppError> {
        self.inner.list_payments(invoice_id).await
    }

    async fn sync_statuses(&self, today: NaiveDate) -> Result<StatusSyncCounts, AppError> {
        self.inner.sync_statuses(today).await
    }

    async fn list_overdue_needing_reminder(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, AppError> {
        self.inner.list_overdue_needing_reminder(cutoff).await
    }

    async fn list_due_soon_unreminded(
        &self,
        due_on: NaiveDate,
    ) -> Result<Vec<Invoice>, AppError> {
        self.inner.list_due_soon_unreminded(due_on).await
    }

    async fn record_reminder_sent(
        &self,
        invoice_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.inner.record_reminder_sent(invoice_id, sent_at).await
    }

    async fn claim_first_reminder(
        &self,
        invoice_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        self.inner.claim_first_reminder(invoice_id, sent_at).await
    }
}

/// Razorpay credentials pointed at the given API base, matching what
/// [`TestApp::spawn_with`] wires for a configured provider.
pub fn razorpay_test_config(api_base_url: &str) -> RazorpayConfig {
    RazorpayConfig {
        key_id: "rzp_test_key".to_string(),
        key_secret: Secret::new("rzp_test_secret".to_string()),
        webhook_secret: Secret::new(RAZORPAY_WEBHOOK_SECRET.to_string()),
        api_base_url: api_base_url.to_string(),
    }
}

/// Gateway wiring for a spawned test app. `None` leaves the provider
/// unconfigured (empty credentials).
#[derive(Default)]
pub struct GatewaySetup {
    pub razorpay_base: Option<String>,
    pub stripe_base: Option<String>,
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub repository: Arc<InMemoryInvoiceRepository>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    /// Spawn a test application with both gateways unconfigured.
    pub async fn spawn() -> Self {
        Self::spawn_with(GatewaySetup::default()).await
    }

    pub async fn spawn_with(gateways: GatewaySetup) -> Self {
        let repository = Arc::new(InMemoryInvoiceRepository::new());
        let mailer = Arc::new(RecordingMailer::default());

        let config = Arc::new(test_config(&gateways));
        let state = build_state(
            config,
            repository.clone() as Arc<dyn InvoiceRepository>,
            mailer.clone() as Arc<dyn Mailer>,
        );
        let app = build_router(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            address: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
            repository,
            mailer,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// POST an invoice as the test owner, asserting creation succeeds.
    pub async fn create_invoice(&self, body: serde_json::Value) -> serde_json::Value {
        let response = self
            .client
            .post(self.url("/invoices"))
            .header("X-Owner-Id", TEST_OWNER_ID)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(
            response.status().as_u16(),
            201,
            "invoice creation should succeed"
        );
        response.json().await.expect("Invalid invoice response")
    }
}

fn test_config(gateways: &GatewaySetup) -> Config {
    let razorpay = match &gateways.razorpay_base {
        Some(base) => RazorpayConfig {
            key_id: "rzp_test_key".to_string(),
            key_secret: Secret::new("rzp_test_secret".to_string()),
            webhook_secret: Secret::new(RAZORPAY_WEBHOOK_SECRET.to_string()),
            api_base_url: base.clone(),
        },
        None => RazorpayConfig {
            key_id: String::new(),
            key_secret: Secret::new(String::new()),
            webhook_secret: Secret::new(RAZORPAY_WEBHOOK_SECRET.to_string()),
            api_base_url: "http://127.0.0.1:1".to_string(),
        },
    };
    let stripe = match &gateways.stripe_base {
        Some(base) => StripeConfig {
            secret_key: Secret::new("sk_test_123".to_string()),
            webhook_secret: Secret::new(STRIPE_WEBHOOK_SECRET.to_string()),
            api_base_url: base.clone(),
        },
        None => StripeConfig {
            secret_key: Secret::new(String::new()),
            webhook_secret: Secret::new(STRIPE_WEBHOOK_SECRET.to_string()),
            api_base_url: "http://127.0.0.1:1".to_string(),
        },
    };

    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            url: Secret::new("postgres://unused".to_string()),
            max_connections: 1,
        },
        razorpay,
        stripe,
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 587,
            user: String::new(),
            password: Secret::new(String::new()),
            from_email: "billing@example.test".to_string(),
            from_name: "Invoice Service".to_string(),
            enabled: false,
        },
        reminders: ReminderConfig {
            run_interval_secs: 86400,
            overdue_repeat_days: 7,
            due_soon_days: 3,
        },
        frontend_url: "http://localhost:3000".to_string(),
        service_name: "invoice-service-test".to_string(),
    }
}

/// Invoice body used across tests: 2 x 50 + 1 x 25 at 18% tax, totals
/// 125.00 / 22.50 / 147.50.
pub fn sample_invoice_body() -> serde_json::Value {
    json!({
        "client_name": "Acme Corp",
        "client_email": "billing@acme.test",
        "issue_date": "2026-08-01",
        "due_date": "2026-09-01",
        "currency": "INR",
        "tax_rate": "18.00",
        "items": [
            { "description": "Consulting", "quantity": "2", "unit_price": "50" },
            { "description": "Support", "quantity": "1", "unit_price": "25" }
        ]
    })
}

pub fn hmac_hex(secret: &str, payload: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Razorpay `payment.captured` webhook body for the given order.
pub fn razorpay_captured_body(order_id: &str, amount_minor: u64) -> String {
    json!({
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": {
                    "id": format!("pay_{}", order_id),
                    "amount": amount_minor,
                    "currency": "INR",
                    "status": "captured",
                    "order_id": order_id
                }
            }
        }
    })
    .to_string()
}
