//! Payment link orchestration: pick a gateway, create the external payment
//! object, persist the reference on the invoice.

use std::sync::Arc;

use serde::Serialize;

use crate::error::AppError;
use crate::models::Invoice;
use crate::services::gateways::{GatewayRegistry, PaymentLinkRequest, to_minor_units};
use crate::services::repository::InvoiceRepository;

/// Persisted payment linkage, as returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct EnsuredLink {
    pub payment_link: String,
    pub gateway: String,
    pub order_id: String,
}

#[derive(Clone)]
pub struct PaymentLinkService {
    repository: Arc<dyn InvoiceRepository>,
    gateways: GatewayRegistry,
    callback_url: String,
}

impl PaymentLinkService {
    pub fn new(
        repository: Arc<dyn InvoiceRepository>,
        gateways: GatewayRegistry,
        frontend_url: &str,
    ) -> Self {
        Self {
            repository,
            gateways,
            callback_url: format!("{}/payment-success", frontend_url.trim_end_matches('/')),
        }
    }

    /// Create (or return the already-created) payment link for an invoice.
    ///
    /// Idempotent: an invoice that already carries a link gets it back
    /// unchanged, so a second call never creates a duplicate external payment
    /// object. On a fresh invoice the preferred gateway is tried first, then
    /// every other configured gateway once; if all fail the invoice is left
    /// unmodified and the call fails with `AllGatewaysFailed`.
    pub async fn ensure_payment_link(&self, invoice: &Invoice) -> Result<EnsuredLink, AppError> {
        if let Some(link) = existing_link(invoice) {
            tracing::debug!(invoice_id = %invoice.id, "Payment link already present");
            return Ok(link);
        }

        let candidates = self.gateways.ordered_for(&invoice.currency);
        if candidates.is_empty() {
            return Err(AppError::NoGatewayAvailable);
        }

        let request = PaymentLinkRequest {
            invoice_ref: invoice.invoice_number.clone(),
            amount_minor: to_minor_units(invoice.total_amount),
            currency: invoice.currency.clone(),
            description: format!("Payment for Invoice #{}", invoice.invoice_number),
            customer_email: invoice.client_email.clone(),
            callback_url: self.callback_url.clone(),
        };

        for gateway in candidates {
            match gateway.create_payment_link(&request).await {
                Ok(details) => {
                    let stored = self
                        .repository
                        .set_payment_link(
                            invoice.id,
                            &details.payment_url,
                            details.gateway.as_str(),
                            &details.order_id,
                        )
                        .await?;

                    if !stored {
                        // Lost the race to a concurrent request; hand back
                        // whatever that request persisted. Never return the
                        // details created here, they were not stored.
                        tracing::warn!(
                            invoice_id = %invoice.id,
                            "Payment link already persisted by a concurrent request"
                        );
                        let current = self
                            .repository
                            .get_invoice(invoice.owner_id, invoice.id)
                            .await?
                            .and_then(|i| existing_link(&i));
                        return match current {
                            Some(link) => Ok(link),
                            None => Err(AppError::Conflict(anyhow::anyhow!(
                                "Invoice changed concurrently while creating its payment link"
                            ))),
                        };
                    }

                    tracing::info!(
                        invoice_id = %invoice.id,
                        gateway = details.gateway.as_str(),
                        order_id = %details.order_id,
                        "Payment link created"
                    );
                    return Ok(EnsuredLink {
                        payment_link: details.payment_url,
                        gateway: details.gateway.as_str().to_string(),
                        order_id: details.order_id,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        invoice_id = %invoice.id,
                        gateway = gateway.kind().as_str(),
                        error = %e,
                        "Gateway failed to create payment link"
                    );
                }
            }
        }

        Err(AppError::AllGatewaysFailed)
    }
}

fn existing_link(invoice: &Invoice) -> Option<EnsuredLink> {
    let link = invoice.payment_link.as_deref().filter(|l| !l.is_empty())?;
    Some(EnsuredLink {
        payment_link: link.to_string(),
        gateway: invoice.payment_gateway.clone().unwrap_or_default(),
        order_id: invoice.payment_order_id.clone().unwrap_or_default(),
    })
}
