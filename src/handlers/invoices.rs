//! Invoice CRUD and lifecycle handlers. Every route is scoped to the
//! authenticated owner; a foreign invoice id reads as 404.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{InvoiceRequest, InvoiceResponse, MessageResponse};
use crate::error::AppError;
use crate::middleware::OwnerId;
use crate::models::{format_invoice_number, Invoice, InvoiceItem, InvoiceStatus, Payment};
use crate::services::repository::{InvoiceRepository, InvoiceSummary};
use crate::startup::AppState;

const RECENT_LIMIT: i64 = 5;

#[tracing::instrument(name = "Create invoice", skip(state, payload), fields(owner_id))]
pub async fn create_invoice(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Json(payload): Json<InvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    payload.validate()?;
    validate_dates(&payload)?;

    let status = match payload.status {
        None => InvoiceStatus::Pending,
        Some(s @ (InvoiceStatus::Draft | InvoiceStatus::Pending)) => s,
        Some(_) => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "An invoice can only be created as draft or pending"
            )));
        }
    };

    let sequence = state.repository.next_invoice_sequence(owner_id).await?;
    let now = Utc::now();
    let mut invoice = Invoice {
        id: Uuid::new_v4(),
        owner_id,
        invoice_number: format_invoice_number(owner_id, sequence),
        client_name: payload.client_name.clone(),
        client_email: payload.client_email.clone(),
        client_phone: payload.client_phone.clone(),
        client_address: payload.client_address.clone(),
        issue_date: payload.issue_date,
        due_date: payload.due_date,
        currency: payload.currency.to_uppercase(),
        status: status.as_str().to_string(),
        subtotal: Decimal::ZERO,
        tax_rate: payload.tax_rate,
        tax_amount: Decimal::ZERO,
        total_amount: Decimal::ZERO,
        notes: payload.notes.clone(),
        terms_conditions: payload.terms_conditions.clone(),
        payment_link: None,
        payment_gateway: None,
        payment_order_id: None,
        last_reminder_sent: None,
        reminder_count: 0,
        created_at: now,
        updated_at: now,
    };

    let items = build_items(invoice.id, &payload)?;
    invoice.recompute_totals(&items);

    state.repository.create_invoice(&invoice, &items).await?;
    tracing::info!(invoice_number = %invoice.invoice_number, "Invoice created");

    Ok((
        StatusCode::CREATED,
        Json(InvoiceResponse::from_parts(invoice, items)),
    ))
}

#[tracing::instrument(name = "List invoices", skip(state), fields(owner_id))]
pub async fn list_invoices(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> Result<Json<Vec<InvoiceResponse>>, AppError> {
    let invoices = state.repository.list_invoices(owner_id, None).await?;
    respond_with_items(&state, invoices).await
}

#[tracing::instrument(name = "Recent invoices", skip(state), fields(owner_id))]
pub async fn recent_invoices(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> Result<Json<Vec<InvoiceResponse>>, AppError> {
    let invoices = state
        .repository
        .list_invoices(owner_id, Some(RECENT_LIMIT))
        .await?;
    respond_with_items(&state, invoices).await
}

#[tracing::instrument(name = "Invoice summary", skip(state), fields(owner_id))]
pub async fn invoice_summary(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> Result<Json<InvoiceSummary>, AppError> {
    let summary = state.repository.summary(owner_id).await?;
    Ok(Json(summary))
}

#[tracing::instrument(name = "Get invoice", skip(state), fields(owner_id))]
pub async fn get_invoice(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let invoice = fetch_owned(&state, owner_id, id).await?;
    let items = state.repository.list_items(invoice.id).await?;
    Ok(Json(InvoiceResponse::from_parts(invoice, items)))
}

#[tracing::instrument(name = "Update invoice", skip(state, payload), fields(owner_id))]
pub async fn update_invoice(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<Uuid>,
    Json(payload): Json<InvoiceRequest>,
) -> Result<Json<InvoiceResponse>, AppError> {
    payload.validate()?;
    validate_dates(&payload)?;

    let mut invoice = fetch_owned(&state, owner_id, id).await?;
    if invoice.status() == InvoiceStatus::Paid {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "A paid invoice cannot be edited"
        )));
    }

    invoice.client_name = payload.client_name.clone();
    invoice.client_email = payload.client_email.clone();
    invoice.client_phone = payload.client_phone.clone();
    invoice.client_address = payload.client_address.clone();
    invoice.issue_date = payload.issue_date;
    invoice.due_date = payload.due_date;
    invoice.currency = payload.currency.to_uppercase();
    invoice.tax_rate = payload.tax_rate;
    invoice.notes = payload.notes.clone();
    invoice.terms_conditions = payload.terms_conditions.clone();
    if let Some(status) = payload.status {
        if status == InvoiceStatus::Paid {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Invoices are marked paid through the mark-paid endpoint"
            )));
        }
        invoice.status = status.as_str().to_string();
    }
    invoice.updated_at = Utc::now();

    let items = build_items(invoice.id, &payload)?;
    invoice.recompute_totals(&items);

    state.repository.update_invoice(&invoice, &items).await?;
    Ok(Json(InvoiceResponse::from_parts(invoice, items)))
}

#[tracing::instrument(name = "Delete invoice", skip(state), fields(owner_id))]
pub async fn delete_invoice(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state.repository.delete_invoice(owner_id, id).await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("Invoice not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(name = "Mark invoice paid", skip(state), fields(owner_id))]
pub async fn mark_paid(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let invoice = fetch_owned(&state, owner_id, id).await?;

    let payment = Payment::new(
        invoice.id,
        invoice.total_amount,
        &invoice.currency,
        "manual",
        &format!("manual_{}", Uuid::new_v4()),
        Some("Manually marked as paid".to_string()),
    );
    let transitioned = state
        .repository
        .mark_paid_with_payment(invoice.id, &payment)
        .await?;
    if !transitioned {
        return Ok(Json(MessageResponse::new("Invoice is already paid")));
    }
    tracing::info!(invoice_number = %invoice.invoice_number, "Invoice manually marked as paid");

    Ok(Json(MessageResponse::new("Invoice marked as paid")))
}

pub(super) async fn fetch_owned(
    state: &AppState,
    owner_id: i64,
    id: Uuid,
) -> Result<Invoice, AppError> {
    state
        .repository
        .get_invoice(owner_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))
}

fn validate_dates(payload: &InvoiceRequest) -> Result<(), AppError> {
    if payload.due_date < payload.issue_date {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Due date cannot be before the issue date"
        )));
    }
    Ok(())
}

fn build_items(invoice_id: Uuid, payload: &InvoiceRequest) -> Result<Vec<InvoiceItem>, AppError> {
    payload
        .items
        .iter()
        .map(|item| {
            InvoiceItem::new(
                invoice_id,
                &item.description,
                item.quantity,
                item.unit_price,
            )
        })
        .collect()
}

async fn respond_with_items(
    state: &AppState,
    invoices: Vec<Invoice>,
) -> Result<Json<Vec<InvoiceResponse>>, AppError> {
    let mut responses = Vec::with_capacity(invoices.len());
    for invoice in invoices {
        let items = state.repository.list_items(invoice.id).await?;
        responses.push(InvoiceResponse::from_parts(invoice, items));
    }
    Ok(Json(responses))
}
