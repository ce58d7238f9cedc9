//! Outbound email: SMTP transport behind a `Mailer` trait, plus the
//! reminder and confirmation message bodies.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;

use crate::config::SmtpConfig;
use crate::error::AppError;
use crate::models::Invoice;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError>;
}

pub struct SmtpMailer {
    config: SmtpConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self, AppError> {
        if !config.enabled {
            return Ok(Self {
                config,
                transport: None,
            });
        }

        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().clone(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| AppError::EmailError(format!("Failed to create SMTP relay: {}", e)))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            config,
            transport: Some(transport),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        let Some(transport) = self.transport.as_ref() else {
            return Err(AppError::EmailError(
                "SMTP transport is not enabled".to_string(),
            ));
        };

        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid from address: {}", e)))?;
        let to: Mailbox = to
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid recipient: {}", e)))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::EmailError(format!("Failed to build message: {}", e)))?;

        transport
            .send(message)
            .await
            .map_err(|e| AppError::EmailError(format!("Failed to send email: {}", e)))?;

        tracing::info!(subject = %subject, "Email sent");
        Ok(())
    }
}

/// Format an amount with a currency symbol where one is conventional.
pub fn format_amount(currency: &str, amount: Decimal) -> String {
    match currency {
        "INR" => format!("\u{20b9}{}", amount),
        "USD" => format!("${}", amount),
        "EUR" => format!("\u{20ac}{}", amount),
        other => format!("{} {}", other, amount),
    }
}

pub fn overdue_subject(invoice: &Invoice) -> String {
    format!("Payment Overdue - Invoice #{}", invoice.invoice_number)
}

pub fn overdue_body(invoice: &Invoice) -> String {
    format!(
        "Dear {},\n\n\
         This is a reminder that payment for Invoice #{} amounting to {} \
         was due on {}.\n\n\
         The payment is now overdue. Please process the payment immediately \
         to avoid any late fees.\n\n\
         If you have already made the payment, please disregard this message.\n\n\
         Thank you for your prompt attention to this matter.",
        invoice.client_name,
        invoice.invoice_number,
        format_amount(&invoice.currency, invoice.total_amount),
        invoice.due_date.format("%B %d, %Y"),
    )
}

pub fn due_soon_subject(invoice: &Invoice) -> String {
    format!("Payment Due Soon - Invoice #{}", invoice.invoice_number)
}

pub fn due_soon_body(invoice: &Invoice) -> String {
    format!(
        "Dear {},\n\n\
         This is a friendly reminder that payment for Invoice #{} amounting \
         to {} is due on {}.\n\n\
         Please ensure the payment is processed before the due date to avoid \
         any late fees.\n\n\
         Thank you for your business.",
        invoice.client_name,
        invoice.invoice_number,
        format_amount(&invoice.currency, invoice.total_amount),
        invoice.due_date.format("%B %d, %Y"),
    )
}

pub fn manual_reminder_subject(invoice: &Invoice) -> String {
    format!("Payment Reminder - Invoice #{}", invoice.invoice_number)
}

pub fn manual_reminder_body(invoice: &Invoice) -> String {
    format!(
        "Dear {},\n\n\
         This is a friendly reminder that payment for Invoice #{} amounting \
         to {} is due on {}.\n\n\
         Please process the payment at your earliest convenience.\n\n\
         Thank you for your business.",
        invoice.client_name,
        invoice.invoice_number,
        format_amount(&invoice.currency, invoice.total_amount),
        invoice.due_date.format("%B %d, %Y"),
    )
}

pub fn confirmation_subject(invoice: &Invoice) -> String {
    format!("Payment Received - Invoice #{}", invoice.invoice_number)
}

pub fn confirmation_body(invoice: &Invoice, amount: Decimal) -> String {
    format!(
        "Dear {},\n\n\
         We have received your payment of {} for Invoice #{}.\n\n\
         Thank you for your business!",
        invoice.client_name,
        format_amount(&invoice.currency, amount),
        invoice.invoice_number,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_formatting_uses_conventional_symbols() {
        assert_eq!(format_amount("INR", Decimal::new(14750, 2)), "\u{20b9}147.50");
        assert_eq!(format_amount("USD", Decimal::new(999, 2)), "$9.99");
        assert_eq!(format_amount("JPY", Decimal::from(500)), "JPY 500");
    }
}
