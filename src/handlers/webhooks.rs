//! Inbound payment webhook endpoint.
//!
//! The provider only cares about the status code: 200 acknowledges the
//! delivery (including duplicates and events we ignore), 400 tells it the
//! payload failed signature verification.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::json;

use crate::error::AppError;
use crate::services::reconciliation::WebhookOutcome;
use crate::startup::AppState;

#[tracing::instrument(name = "Payment webhook", skip_all)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, AppError> {
    let outcome = state.reconciliation.process(&headers, &body).await?;

    let status = match outcome {
        WebhookOutcome::Reconciled { invoice_number } => {
            tracing::info!(%invoice_number, "Webhook reconciled");
            "processed"
        }
        WebhookOutcome::AlreadyPaid => "duplicate",
        WebhookOutcome::Ignored => "ignored",
        WebhookOutcome::UnmatchedOrder => "unmatched",
    };

    Ok(Json(json!({ "status": status })))
}
