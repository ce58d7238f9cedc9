//! Stripe payment provider adapter.
//!
//! Creates Payment Links with an inline price (form-encoded API) and verifies
//! the `Stripe-Signature` webhook scheme.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;

use super::{
    CapturedPayment, GatewayError, GatewayKind, PROVIDER_TIMEOUT, PaymentGateway,
    PaymentLinkDetails, PaymentLinkRequest, hmac_sha256_hex,
};
use crate::config::StripeConfig;

#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct StripePaymentLink {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct StripeApiError {
    error: StripeApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeApiErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: CheckoutSession,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    payment_link: Option<String>,
    payment_intent: Option<String>,
    amount_total: Option<u64>,
    currency: Option<String>,
    payment_status: Option<String>,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Stripe
    }

    fn is_configured(&self) -> bool {
        !self.config.secret_key.expose_secret().is_empty()
    }

    fn signature_header(&self) -> &'static str {
        "Stripe-Signature"
    }

    async fn create_payment_link(
        &self,
        request: &PaymentLinkRequest,
    ) -> Result<PaymentLinkDetails, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured("Stripe"));
        }

        let unit_amount = request.amount_minor.to_string();
        let currency = request.currency.to_lowercase();
        let product_name = format!("Invoice #{}", request.invoice_ref);
        let form: Vec<(&str, &str)> = vec![
            ("line_items[0][price_data][currency]", &currency),
            ("line_items[0][price_data][product_data][name]", &product_name),
            (
                "line_items[0][price_data][product_data][description]",
                &request.description,
            ),
            ("line_items[0][price_data][unit_amount]", &unit_amount),
            ("line_items[0][quantity]", "1"),
            ("after_completion[type]", "redirect"),
            ("after_completion[redirect][url]", &request.callback_url),
            ("metadata[invoice_ref]", &request.invoice_ref),
            ("metadata[customer_email]", &request.customer_email),
        ];

        let url = format!("{}/v1/payment_links", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .timeout(PROVIDER_TIMEOUT)
            .bearer_auth(self.config.secret_key.expose_secret())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let (code, message) = serde_json::from_str::<StripeApiError>(&body)
                .map(|e| {
                    (
                        e.error.error_type,
                        e.error.message.unwrap_or_default(),
                    )
                })
                .unwrap_or_else(|_| ("unknown".to_string(), body));
            tracing::error!(code = %code, message = %message, "Stripe call failed");
            return Err(GatewayError::Api { code, message });
        }

        let link: StripePaymentLink = serde_json::from_str(&body).map_err(|e| {
            GatewayError::InvalidResponse(format!("Stripe response did not parse: {}", e))
        })?;

        tracing::info!(
            payment_link_id = %link.id,
            invoice_ref = %request.invoice_ref,
            "Stripe payment link created"
        );

        // The payment link id is the reference checkout sessions echo back.
        Ok(PaymentLinkDetails {
            payment_url: link.url,
            order_id: link.id,
            gateway: GatewayKind::Stripe,
        })
    }

    /// `Stripe-Signature: t=<ts>,v1=<hmac>` where the HMAC-SHA256 is over
    /// `"{ts}.{body}"`.
    fn verify_webhook_signature(&self, body: &str, signature: &str) -> bool {
        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in signature.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }
        let Some(timestamp) = timestamp else {
            tracing::warn!("Stripe webhook signature missing timestamp");
            return false;
        };
        if candidates.is_empty() {
            tracing::warn!("Stripe webhook signature missing v1 component");
            return false;
        }

        let payload = format!("{}.{}", timestamp, body);
        let expected = hmac_sha256_hex(self.config.webhook_secret.expose_secret(), &payload);
        let is_valid = candidates.iter().any(|c| *c == expected);
        if !is_valid {
            tracing::warn!("Stripe webhook signature verification failed");
        }
        is_valid
    }

    fn parse_captured_event(&self, body: &str) -> Option<CapturedPayment> {
        let event: StripeEvent = serde_json::from_str(body).ok()?;
        if event.event_type != "checkout.session.completed" {
            return None;
        }
        let session = event.data.object;
        if session.payment_status.as_deref() != Some("paid") {
            return None;
        }
        Some(CapturedPayment {
            transaction_id: session.payment_intent.unwrap_or(session.id),
            order_id: session.payment_link?,
            amount_minor: session.amount_total?,
            currency: session.currency?.to_uppercase(),
        })
    }
}
