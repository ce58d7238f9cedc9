//! Manual reminder handler, outside the batch job's bookkeeping windows.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::dtos::{MessageResponse, SendReminderRequest};
use crate::error::AppError;
use crate::middleware::OwnerId;
use crate::models::InvoiceStatus;
use crate::services::email::{manual_reminder_body, manual_reminder_subject, Mailer};
use crate::services::InvoiceRepository;
use crate::startup::AppState;

use super::invoices::fetch_owned;

#[tracing::instrument(name = "Send manual reminder", skip(state, payload), fields(owner_id))]
pub async fn send_reminder(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<Uuid>,
    payload: Option<Json<SendReminderRequest>>,
) -> Result<Json<MessageResponse>, AppError> {
    let invoice = fetch_owned(&state, owner_id, id).await?;

    if invoice.status() == InvoiceStatus::Paid {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Invoice is already paid"
        )));
    }

    let subject = manual_reminder_subject(&invoice);
    let body = payload
        .and_then(|Json(req)| req.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| manual_reminder_body(&invoice));

    state
        .mailer
        .send(&invoice.client_email, &subject, &body)
        .await?;
    state
        .repository
        .record_reminder_sent(invoice.id, Utc::now())
        .await?;

    tracing::info!(invoice_number = %invoice.invoice_number, "Manual reminder sent");
    Ok(Json(MessageResponse::new(format!(
        "Reminder sent to {}",
        invoice.client_email
    ))))
}
