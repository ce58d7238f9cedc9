//! Periodic reminder batch job.
//!
//! Three passes per run: due-date status sync, overdue nags (repeat every 7
//! days), and a one-shot due-soon nudge 3 days ahead. Email failure for one
//! invoice never blocks the rest.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::config::ReminderConfig;
use crate::error::AppError;
use crate::services::email::{
    Mailer, due_soon_body, due_soon_subject, overdue_body, overdue_subject,
};
use crate::services::repository::{InvoiceRepository, StatusSyncCounts};

/// What one batch run did.
#[derive(Debug, Default)]
pub struct ReminderRunReport {
    pub skipped: bool,
    pub status_sync: StatusSyncCounts,
    pub overdue_reminders_sent: u64,
    pub due_soon_reminders_sent: u64,
    pub send_failures: u64,
}

pub struct ReminderJob {
    repository: Arc<dyn InvoiceRepository>,
    mailer: Arc<dyn Mailer>,
    config: ReminderConfig,
    // Single-flight guard: overlapping runs would race the
    // check-then-stamp of reminder bookkeeping.
    running: Mutex<()>,
}

impl ReminderJob {
    pub fn new(
        repository: Arc<dyn InvoiceRepository>,
        mailer: Arc<dyn Mailer>,
        config: ReminderConfig,
    ) -> Self {
        Self {
            repository,
            mailer,
            config,
            running: Mutex::new(()),
        }
    }

    /// Execute one batch run. A run that overlaps an in-flight one is
    /// skipped rather than queued.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<ReminderRunReport, AppError> {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::info!("Reminder run already in progress; skipping");
            return Ok(ReminderRunReport {
                skipped: true,
                ..Default::default()
            });
        };

        let today = now.date_naive();
        let mut report = ReminderRunReport::default();

        report.status_sync = self.repository.sync_statuses(today).await?;
        tracing::info!(
            marked_overdue = report.status_sync.marked_overdue,
            reverted_pending = report.status_sync.reverted_pending,
            "Invoice status sync completed"
        );

        self.send_overdue_reminders(now, &mut report).await?;
        self.send_due_soon_reminders(now, &mut report).await?;

        tracing::info!(
            overdue_sent = report.overdue_reminders_sent,
            due_soon_sent = report.due_soon_reminders_sent,
            failures = report.send_failures,
            "Reminder run completed"
        );
        Ok(report)
    }

    /// Pass A: nag every overdue invoice at most once per repeat window.
    async fn send_overdue_reminders(
        &self,
        now: DateTime<Utc>,
        report: &mut ReminderRunReport,
    ) -> Result<(), AppError> {
        let cutoff = now - chrono::Duration::days(self.config.overdue_repeat_days);
        let invoices = self.repository.list_overdue_needing_reminder(cutoff).await?;

        for invoice in invoices {
            match self
                .mailer
                .send(
                    &invoice.client_email,
                    &overdue_subject(&invoice),
                    &overdue_body(&invoice),
                )
                .await
            {
                Ok(()) => {
                    self.repository.record_reminder_sent(invoice.id, now).await?;
                    report.overdue_reminders_sent += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        invoice_id = %invoice.id,
                        invoice_number = %invoice.invoice_number,
                        error = %e,
                        "Failed to send overdue reminder"
                    );
                    report.send_failures += 1;
                }
            }
        }
        Ok(())
    }

    /// Pass B: one-shot nudge for invoices due in exactly `due_soon_days`.
    /// The stamp is claimed before sending, so racing runs send at most once.
    async fn send_due_soon_reminders(
        &self,
        now: DateTime<Utc>,
        report: &mut ReminderRunReport,
    ) -> Result<(), AppError> {
        let due_on = now.date_naive() + chrono::Duration::days(self.config.due_soon_days);
        let invoices = self.repository.list_due_soon_unreminded(due_on).await?;

        for invoice in invoices {
            if !self.repository.claim_first_reminder(invoice.id, now).await? {
                continue;
            }
            match self
                .mailer
                .send(
                    &invoice.client_email,
                    &due_soon_subject(&invoice),
                    &due_soon_body(&invoice),
                )
                .await
            {
                Ok(()) => report.due_soon_reminders_sent += 1,
                Err(e) => {
                    tracing::warn!(
                        invoice_id = %invoice.id,
                        invoice_number = %invoice.invoice_number,
                        error = %e,
                        "Failed to send due-soon reminder"
                    );
                    report.send_failures += 1;
                }
            }
        }
        Ok(())
    }
}

/// Run the batch job forever on a fixed interval. Spawned from startup.
pub async fn run_periodically(job: Arc<ReminderJob>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so startup does not race
    // migrations or tests.
    interval.tick().await;

    loop {
        interval.tick().await;
        if let Err(e) = job.run_once(Utc::now()).await {
            tracing::error!(error = %e, "Reminder run failed");
        }
    }
}
