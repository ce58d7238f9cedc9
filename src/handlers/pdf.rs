//! Invoice PDF download.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::OwnerId;
use crate::services::pdf::render_invoice_pdf;
use crate::services::InvoiceRepository;
use crate::startup::AppState;

use super::invoices::fetch_owned;

#[tracing::instrument(name = "Download invoice PDF", skip(state), fields(owner_id))]
pub async fn download_pdf(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = fetch_owned(&state, owner_id, id).await?;
    let items = state.repository.list_items(invoice.id).await?;

    let filename = format!("invoice_{}.pdf", invoice.invoice_number);
    let bytes = render_invoice_pdf(&invoice, &items)?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    ))
}
