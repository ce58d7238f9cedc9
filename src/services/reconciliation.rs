//! Webhook reconciliation: turn an inbound payment notification into a paid
//! invoice, exactly once.

use std::sync::Arc;

use axum::http::HeaderMap;

use crate::error::AppError;
use crate::models::Payment;
use crate::services::email::{Mailer, confirmation_body, confirmation_subject};
use crate::services::gateways::{GatewayRegistry, from_minor_units};
use crate::services::repository::InvoiceRepository;

/// What a processed webhook amounted to. Every variant maps to a 200
/// response; only a signature failure is an error.
#[derive(Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Invoice transitioned to paid and a payment was recorded.
    Reconciled { invoice_number: String },
    /// Duplicate delivery; the invoice was already paid, nothing recorded.
    AlreadyPaid,
    /// Event type is not a payment capture; accepted and ignored.
    Ignored,
    /// No invoice carries the event's order reference; accepted and ignored
    /// so the provider does not retry-storm an unresolvable event.
    UnmatchedOrder,
}

#[derive(Clone)]
pub struct ReconciliationService {
    repository: Arc<dyn InvoiceRepository>,
    gateways: GatewayRegistry,
    mailer: Arc<dyn Mailer>,
}

impl ReconciliationService {
    pub fn new(
        repository: Arc<dyn InvoiceRepository>,
        gateways: GatewayRegistry,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            repository,
            gateways,
            mailer,
        }
    }

    /// Verify, decode and apply one webhook delivery.
    ///
    /// Fails only on a missing or invalid signature; every other path is a
    /// successful (possibly no-op) outcome.
    pub async fn process(
        &self,
        headers: &HeaderMap,
        body: &str,
    ) -> Result<WebhookOutcome, AppError> {
        let Some((gateway, signature)) = self.gateways.verifier_for(headers) else {
            tracing::warn!("Webhook without a recognized signature header");
            return Err(AppError::InvalidSignature);
        };

        if !gateway.verify_webhook_signature(body, &signature) {
            return Err(AppError::InvalidSignature);
        }

        let Some(captured) = gateway.parse_captured_event(body) else {
            tracing::debug!(gateway = gateway.kind().as_str(), "Ignoring non-capture webhook event");
            return Ok(WebhookOutcome::Ignored);
        };

        let Some(invoice) = self.repository.find_by_order_id(&captured.order_id).await? else {
            tracing::info!(
                order_id = %captured.order_id,
                "Webhook order reference matches no invoice"
            );
            return Ok(WebhookOutcome::UnmatchedOrder);
        };

        let amount = from_minor_units(captured.amount_minor);
        let payment = Payment::new(
            invoice.id,
            amount,
            &captured.currency,
            gateway.kind().as_str(),
            &captured.transaction_id,
            Some(format!(
                "Payment captured via {} webhook",
                gateway.kind().as_str()
            )),
        );

        // Atomic CAS transition + payment append; exactly one delivery per
        // invoice gets past this, and a failed append leaves the invoice
        // unpaid so the provider retry can reconcile it.
        let transitioned = self
            .repository
            .mark_paid_with_payment(invoice.id, &payment)
            .await?;
        if !transitioned {
            tracing::info!(
                invoice_id = %invoice.id,
                transaction_id = %captured.transaction_id,
                "Invoice already paid; duplicate webhook ignored"
            );
            return Ok(WebhookOutcome::AlreadyPaid);
        }

        tracing::info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            amount = %amount,
            gateway = gateway.kind().as_str(),
            "Invoice reconciled as paid"
        );

        // Best effort; a failed confirmation email never fails the webhook.
        if let Err(e) = self
            .mailer
            .send(
                &invoice.client_email,
                &confirmation_subject(&invoice),
                &confirmation_body(&invoice, amount),
            )
            .await
        {
            tracing::warn!(
                invoice_id = %invoice.id,
                error = %e,
                "Failed to send payment confirmation email"
            );
        }

        Ok(WebhookOutcome::Reconciled {
            invoice_number: invoice.invoice_number,
        })
    }
}
