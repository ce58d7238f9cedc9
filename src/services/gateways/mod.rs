//! Payment gateway abstraction.
//!
//! One interface over the external payment providers; concrete adapters live
//! in `razorpay.rs` and `stripe.rs`. Provider-specific failures never cross
//! this module boundary: everything is normalized to [`GatewayError`].

mod razorpay;
mod stripe;

pub use razorpay::RazorpayGateway;
pub use stripe::StripeGateway;

use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Cap on outbound provider calls.
pub(crate) const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    Razorpay,
    Stripe,
}

impl GatewayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayKind::Razorpay => "razorpay",
            GatewayKind::Stripe => "stripe",
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0} credentials not configured")]
    NotConfigured(&'static str),

    #[error("Provider request failed: {0}")]
    Http(String),

    #[error("Provider rejected the request: {code}: {message}")]
    Api { code: String, message: String },

    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Http(err.to_string())
    }
}

/// What the payment link service hands a provider.
#[derive(Debug, Clone)]
pub struct PaymentLinkRequest {
    /// Human-readable invoice reference (the invoice number).
    pub invoice_ref: String,
    /// Amount in minor currency units (paise, cents).
    pub amount_minor: u64,
    /// ISO 4217 currency code, uppercase.
    pub currency: String,
    pub description: String,
    pub customer_email: String,
    /// Where the provider sends the payer after checkout.
    pub callback_url: String,
}

/// What a provider hands back on success.
#[derive(Debug, Clone)]
pub struct PaymentLinkDetails {
    pub payment_url: String,
    /// External reference the provider will echo in webhook events.
    pub order_id: String,
    pub gateway: GatewayKind,
}

/// A "payment captured" webhook event, decoded into the one shape
/// reconciliation cares about.
#[derive(Debug, Clone)]
pub struct CapturedPayment {
    pub transaction_id: String,
    pub order_id: String,
    pub amount_minor: u64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    /// Whether credentials for this provider are present.
    fn is_configured(&self) -> bool;

    /// Name of the webhook signature header this provider sends.
    fn signature_header(&self) -> &'static str;

    async fn create_payment_link(
        &self,
        request: &PaymentLinkRequest,
    ) -> Result<PaymentLinkDetails, GatewayError>;

    /// Verify a webhook signature against the raw request body.
    fn verify_webhook_signature(&self, body: &str, signature: &str) -> bool;

    /// Decode a raw webhook body into a captured payment, if the event is of
    /// the captured/succeeded kind. Unknown and non-capture shapes yield None.
    fn parse_captured_event(&self, body: &str) -> Option<CapturedPayment>;
}

/// Configured providers in priority order. Built once at startup and injected
/// wherever payments are handled; there is no ambient gateway state.
#[derive(Clone)]
pub struct GatewayRegistry {
    gateways: Vec<Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new(gateways: Vec<Arc<dyn PaymentGateway>>) -> Self {
        Self { gateways }
    }

    /// Providers whose credentials are configured, in priority order.
    pub fn available(&self) -> Vec<Arc<dyn PaymentGateway>> {
        self.gateways
            .iter()
            .filter(|g| g.is_configured())
            .cloned()
            .collect()
    }

    /// Currency-aware default choice: Razorpay wins for INR, Stripe
    /// otherwise, falling back to whatever is configured.
    pub fn select_preferred(&self, currency: &str) -> Option<Arc<dyn PaymentGateway>> {
        let available = self.available();
        if available.is_empty() {
            return None;
        }
        let preferred_kind = if currency.eq_ignore_ascii_case("INR") {
            GatewayKind::Razorpay
        } else {
            GatewayKind::Stripe
        };
        available
            .iter()
            .find(|g| g.kind() == preferred_kind)
            .or_else(|| available.first())
            .cloned()
    }

    /// All available providers with the preferred one first; the fallback
    /// order for a link-creation attempt.
    pub fn ordered_for(&self, currency: &str) -> Vec<Arc<dyn PaymentGateway>> {
        let mut ordered = self.available();
        if let Some(preferred) = self.select_preferred(currency) {
            ordered.sort_by_key(|g| g.kind() != preferred.kind());
        }
        ordered
    }

    /// The provider whose signature header is present on a webhook request,
    /// along with the header value.
    pub fn verifier_for(
        &self,
        headers: &HeaderMap,
    ) -> Option<(Arc<dyn PaymentGateway>, String)> {
        self.gateways.iter().find_map(|g| {
            headers
                .get(g.signature_header())
                .and_then(|v| v.to_str().ok())
                .map(|sig| (g.clone(), sig.to_string()))
        })
    }
}

/// HMAC-SHA256 over `payload`, hex-encoded. Both providers sign webhooks this
/// way (Stripe prefixes the payload with a timestamp, see `stripe.rs`).
pub(crate) fn hmac_sha256_hex(secret: &str, payload: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Convert a two-decimal major-unit amount into minor units for the provider
/// APIs. Amounts are already rounded to 2 dp by the invoice math.
pub fn to_minor_units(amount: Decimal) -> u64 {
    (amount * Decimal::from(100))
        .round()
        .to_u64()
        .unwrap_or(0)
}

/// Convert provider minor units back into a major-unit Decimal.
pub fn from_minor_units(amount_minor: u64) -> Decimal {
    Decimal::from(amount_minor) / Decimal::from(100)
}
