//! Razorpay payment provider adapter.
//!
//! Uses the Orders API plus the Payment Links API for link creation and
//! HMAC-SHA256 signature verification for webhook confirmation.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    CapturedPayment, GatewayError, GatewayKind, PROVIDER_TIMEOUT, PaymentGateway,
    PaymentLinkDetails, PaymentLinkRequest, hmac_sha256_hex,
};
use crate::config::RazorpayConfig;

#[derive(Clone)]
pub struct RazorpayGateway {
    client: Client,
    config: RazorpayConfig,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody {
    /// Amount in smallest currency unit (paise for INR).
    amount: u64,
    currency: String,
    receipt: String,
    notes: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
    #[allow(dead_code)]
    amount: u64,
    #[allow(dead_code)]
    currency: String,
}

#[derive(Debug, Serialize)]
struct CreatePaymentLinkBody {
    amount: u64,
    currency: String,
    accept_partial: bool,
    reference_id: String,
    description: String,
    callback_url: String,
    callback_method: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayPaymentLink {
    #[allow(dead_code)]
    id: String,
    short_url: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayApiError {
    error: RazorpayApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayApiErrorDetail {
    code: String,
    description: String,
}

/// Webhook event envelope. Only the payment-captured shape is decoded; every
/// other event deserializes with `payload.payment == None` or a different
/// `event` string and is ignored upstream.
#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    payment: Option<WebhookPaymentEntity>,
}

#[derive(Debug, Deserialize)]
struct WebhookPaymentEntity {
    entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    amount: u64,
    currency: String,
    status: String,
    order_id: Option<String>,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn create_order(&self, request: &PaymentLinkRequest) -> Result<RazorpayOrder, GatewayError> {
        let body = CreateOrderBody {
            amount: request.amount_minor,
            currency: request.currency.clone(),
            receipt: format!("invoice_{}", request.invoice_ref),
            notes: json!({
                "invoice_ref": request.invoice_ref,
                "customer_email": request.customer_email,
            }),
        };

        let url = format!("{}/orders", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .timeout(PROVIDER_TIMEOUT)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&body)
            .send()
            .await?;

        read_json(response).await
    }

    async fn create_link(
        &self,
        request: &PaymentLinkRequest,
    ) -> Result<RazorpayPaymentLink, GatewayError> {
        let body = CreatePaymentLinkBody {
            amount: request.amount_minor,
            currency: request.currency.clone(),
            accept_partial: false,
            reference_id: format!("invoice_{}", request.invoice_ref),
            description: request.description.clone(),
            callback_url: request.callback_url.clone(),
            callback_method: "get".to_string(),
        };

        let url = format!("{}/payment_links", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .timeout(PROVIDER_TIMEOUT)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&body)
            .send()
            .await?;

        read_json(response).await
    }
}

/// Deserialize a success body, or normalize Razorpay's error envelope.
async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        serde_json::from_str(&body).map_err(|e| {
            GatewayError::InvalidResponse(format!("Razorpay response did not parse: {}", e))
        })
    } else {
        let (code, message) = serde_json::from_str::<RazorpayApiError>(&body)
            .map(|e| (e.error.code, e.error.description))
            .unwrap_or_else(|_| ("UNKNOWN".to_string(), body));
        tracing::error!(code = %code, message = %message, "Razorpay call failed");
        Err(GatewayError::Api { code, message })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Razorpay
    }

    fn is_configured(&self) -> bool {
        !self.config.key_id.is_empty() && !self.config.key_secret.expose_secret().is_empty()
    }

    fn signature_header(&self) -> &'static str {
        "X-Razorpay-Signature"
    }

    async fn create_payment_link(
        &self,
        request: &PaymentLinkRequest,
    ) -> Result<PaymentLinkDetails, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured("Razorpay"));
        }

        let order = self.create_order(request).await?;
        let link = self.create_link(request).await?;

        tracing::info!(
            order_id = %order.id,
            invoice_ref = %request.invoice_ref,
            "Razorpay payment link created"
        );

        Ok(PaymentLinkDetails {
            payment_url: link.short_url,
            order_id: order.id,
            gateway: GatewayKind::Razorpay,
        })
    }

    /// `HMAC-SHA256(request_body, webhook_secret)`, hex-encoded.
    fn verify_webhook_signature(&self, body: &str, signature: &str) -> bool {
        let expected = hmac_sha256_hex(self.config.webhook_secret.expose_secret(), body);
        let is_valid = expected == signature;
        if !is_valid {
            tracing::warn!("Razorpay webhook signature verification failed");
        }
        is_valid
    }

    fn parse_captured_event(&self, body: &str) -> Option<CapturedPayment> {
        let event: WebhookEvent = serde_json::from_str(body).ok()?;
        if event.event != "payment.captured" {
            return None;
        }
        let payment = event.payload.payment?.entity;
        if payment.status != "captured" {
            return None;
        }
        Some(CapturedPayment {
            transaction_id: payment.id,
            order_id: payment.order_id?,
            amount_minor: payment.amount,
            currency: payment.currency,
        })
    }
}
