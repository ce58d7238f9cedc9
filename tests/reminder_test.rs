//! Reminder batch job tests: status sync, the overdue repeat window and the
//! one-shot due-soon nudge.

mod common;

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use common::RecordingMailer;
use invoice_service::config::ReminderConfig;
use invoice_service::models::{format_invoice_number, Invoice};
use invoice_service::services::email::Mailer;
use invoice_service::services::reminders::ReminderJob;
use invoice_service::services::{InMemoryInvoiceRepository, InvoiceRepository};
use rust_decimal::Decimal;
use uuid::Uuid;

const OWNER: i64 = 1;

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 29, 12, 0, 0).unwrap()
}

fn reminder_config() -> ReminderConfig {
    ReminderConfig {
        run_interval_secs: 86400,
        overdue_repeat_days: 7,
        due_soon_days: 3,
    }
}

struct Harness {
    repository: Arc<InMemoryInvoiceRepository>,
    mailer: Arc<RecordingMailer>,
    job: ReminderJob,
}

fn harness() -> Harness {
    let repository = Arc::new(InMemoryInvoiceRepository::new());
    let mailer = Arc::new(RecordingMailer::default());
    let job = ReminderJob::new(
        repository.clone() as Arc<dyn InvoiceRepository>,
        mailer.clone() as Arc<dyn Mailer>,
        reminder_config(),
    );
    Harness {
        repository,
        mailer,
        job,
    }
}

async fn seed_invoice(
    repository: &InMemoryInvoiceRepository,
    status: &str,
    due_date: NaiveDate,
    last_reminder_sent: Option<DateTime<Utc>>,
) -> Uuid {
    let sequence = repository.next_invoice_sequence(OWNER).await.unwrap();
    let now = fixed_now();
    let invoice = Invoice {
        id: Uuid::new_v4(),
        owner_id: OWNER,
        invoice_number: format_invoice_number(OWNER, sequence),
        client_name: "Acme Corp".to_string(),
        client_email: "billing@acme.test".to_string(),
        client_phone: None,
        client_address: None,
        issue_date: due_date - Duration::days(30),
        due_date,
        currency: "INR".to_string(),
        status: status.to_string(),
        subtotal: Decimal::new(10000, 2),
        tax_rate: Decimal::new(1800, 2),
        tax_amount: Decimal::new(1800, 2),
        total_amount: Decimal::new(11800, 2),
        notes: None,
        terms_conditions: None,
        payment_link: None,
        payment_gateway: None,
        payment_order_id: None,
        last_reminder_sent,
        reminder_count: if last_reminder_sent.is_some() { 1 } else { 0 },
        created_at: now,
        updated_at: now,
    };
    let id = invoice.id;
    repository.create_invoice(&invoice, &[]).await.unwrap();
    id
}

async fn status_of(repository: &InMemoryInvoiceRepository, id: Uuid) -> String {
    repository
        .get_invoice(OWNER, id)
        .await
        .unwrap()
        .unwrap()
        .status
}

#[tokio::test]
async fn sync_marks_past_due_pending_as_overdue() {
    let h = harness();
    let today = fixed_now().date_naive();
    let past_due = seed_invoice(&h.repository, "pending", today - Duration::days(1), None).await;
    let future_due = seed_invoice(&h.repository, "pending", today + Duration::days(10), None).await;

    let report = h.job.run_once(fixed_now()).await.unwrap();

    assert_eq!(report.status_sync.marked_overdue, 1);
    assert_eq!(status_of(&h.repository, past_due).await, "overdue");
    assert_eq!(status_of(&h.repository, future_due).await, "pending");
}

#[tokio::test]
async fn sync_reverts_overdue_with_future_due_date() {
    let h = harness();
    let today = fixed_now().date_naive();
    // Due date pushed out after the invoice went overdue.
    let extended = seed_invoice(&h.repository, "overdue", today + Duration::days(14), None).await;

    let report = h.job.run_once(fixed_now()).await.unwrap();

    assert_eq!(report.status_sync.reverted_pending, 1);
    assert_eq!(status_of(&h.repository, extended).await, "pending");
}

#[tokio::test]
async fn sync_never_touches_paid_cancelled_or_draft() {
    let h = harness();
    let today = fixed_now().date_naive();
    let paid = seed_invoice(&h.repository, "paid", today - Duration::days(30), None).await;
    let cancelled = seed_invoice(&h.repository, "cancelled", today - Duration::days(30), None).await;
    let draft = seed_invoice(&h.repository, "draft", today - Duration::days(30), None).await;

    h.job.run_once(fixed_now()).await.unwrap();

    assert_eq!(status_of(&h.repository, paid).await, "paid");
    assert_eq!(status_of(&h.repository, cancelled).await, "cancelled");
    assert_eq!(status_of(&h.repository, draft).await, "draft");
    // No reminders either.
    assert!(h.mailer.sent().is_empty());
}

#[tokio::test]
async fn overdue_invoice_gets_a_reminder_and_a_stamp() {
    let h = harness();
    let today = fixed_now().date_naive();
    let id = seed_invoice(&h.repository, "overdue", today - Duration::days(5), None).await;

    let report = h.job.run_once(fixed_now()).await.unwrap();

    assert_eq!(report.overdue_reminders_sent, 1);
    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "billing@acme.test");

    let invoice = h.repository.get_invoice(OWNER, id).await.unwrap().unwrap();
    assert_eq!(invoice.last_reminder_sent, Some(fixed_now()));
    assert_eq!(invoice.reminder_count, 1);
}

#[tokio::test]
async fn overdue_reminder_respects_the_repeat_window() {
    let h = harness();
    let today = fixed_now().date_naive();
    // Reminded 2 days ago: inside the 7-day window, stays quiet.
    seed_invoice(
        &h.repository,
        "overdue",
        today - Duration::days(10),
        Some(fixed_now() - Duration::days(2)),
    )
    .await;
    // Reminded 8 days ago: window elapsed, nag again.
    let stale = seed_invoice(
        &h.repository,
        "overdue",
        today - Duration::days(10),
        Some(fixed_now() - Duration::days(8)),
    )
    .await;

    let report = h.job.run_once(fixed_now()).await.unwrap();

    assert_eq!(report.overdue_reminders_sent, 1);
    let invoice = h.repository.get_invoice(OWNER, stale).await.unwrap().unwrap();
    assert_eq!(invoice.last_reminder_sent, Some(fixed_now()));
    assert_eq!(invoice.reminder_count, 2);
}

#[tokio::test]
async fn due_soon_nudge_fires_exactly_once() {
    let h = harness();
    let today = fixed_now().date_naive();
    let id = seed_invoice(&h.repository, "pending", today + Duration::days(3), None).await;

    let report = h.job.run_once(fixed_now()).await.unwrap();
    assert_eq!(report.due_soon_reminders_sent, 1);

    // The same run tomorrow-at-the-same-distance must not repeat: the first
    // reminder stamp suppresses it.
    let report = h.job.run_once(fixed_now()).await.unwrap();
    assert_eq!(report.due_soon_reminders_sent, 0);
    assert_eq!(h.mailer.sent().len(), 1);

    let invoice = h.repository.get_invoice(OWNER, id).await.unwrap().unwrap();
    assert_eq!(invoice.reminder_count, 1);
}

#[tokio::test]
async fn due_soon_skips_already_reminded_invoices() {
    let h = harness();
    let today = fixed_now().date_naive();
    seed_invoice(
        &h.repository,
        "pending",
        today + Duration::days(3),
        Some(fixed_now() - Duration::days(1)),
    )
    .await;

    let report = h.job.run_once(fixed_now()).await.unwrap();
    assert_eq!(report.due_soon_reminders_sent, 0);
    assert!(h.mailer.sent().is_empty());
}

#[tokio::test]
async fn due_soon_only_matches_the_exact_day() {
    let h = harness();
    let today = fixed_now().date_naive();
    seed_invoice(&h.repository, "pending", today + Duration::days(2), None).await;
    seed_invoice(&h.repository, "pending", today + Duration::days(4), None).await;

    let report = h.job.run_once(fixed_now()).await.unwrap();
    assert_eq!(report.due_soon_reminders_sent, 0);
    assert!(h.mailer.sent().is_empty());
}
