//! Payment link handler: idempotent creation of the external payment object.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::OwnerId;
use crate::models::InvoiceStatus;
use crate::services::payment_links::EnsuredLink;
use crate::startup::AppState;

use super::invoices::fetch_owned;

#[tracing::instrument(name = "Create payment link", skip(state), fields(owner_id))]
pub async fn create_payment_link(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<EnsuredLink>), AppError> {
    let invoice = fetch_owned(&state, owner_id, id).await?;

    match invoice.status() {
        InvoiceStatus::Paid => {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice is already paid"
            )));
        }
        InvoiceStatus::Cancelled => {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice is cancelled"
            )));
        }
        InvoiceStatus::Draft => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "A draft invoice cannot take payments"
            )));
        }
        InvoiceStatus::Pending | InvoiceStatus::Overdue => {}
    }

    let already_linked = invoice
        .payment_link
        .as_deref()
        .is_some_and(|l| !l.is_empty());
    let link = state.payment_links.ensure_payment_link(&invoice).await?;

    let status = if already_linked {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(link)))
}
