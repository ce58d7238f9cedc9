use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub razorpay: RazorpayConfig,
    pub stripe: StripeConfig,
    pub smtp: SmtpConfig,
    pub reminders: ReminderConfig,
    pub frontend_url: String,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ReminderConfig {
    /// Interval between batch job runs, in seconds.
    pub run_interval_secs: u64,
    /// Minimum days between repeated overdue reminders.
    pub overdue_repeat_days: i64,
    /// Days before the due date for the one-shot pre-due nudge.
    pub due_soon_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("INVOICE_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("INVOICE_SERVICE_PORT")
            .unwrap_or_else(|_| "3004".to_string())
            .parse()?;

        let db_url = env::var("INVOICE_DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("INVOICE_DATABASE_URL must be set"))?;
        let max_connections = env::var("INVOICE_DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let razorpay = RazorpayConfig {
            key_id: env::var("RAZORPAY_KEY_ID").unwrap_or_default(),
            key_secret: Secret::new(env::var("RAZORPAY_KEY_SECRET").unwrap_or_default()),
            webhook_secret: Secret::new(env::var("RAZORPAY_WEBHOOK_SECRET").unwrap_or_default()),
            api_base_url: env::var("RAZORPAY_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string()),
        };

        let stripe = StripeConfig {
            secret_key: Secret::new(env::var("STRIPE_SECRET_KEY").unwrap_or_default()),
            webhook_secret: Secret::new(env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default()),
            api_base_url: env::var("STRIPE_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
        };

        let smtp = SmtpConfig {
            host: env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            port: env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .unwrap_or(587),
            user: env::var("SMTP_USER").unwrap_or_default(),
            password: Secret::new(env::var("SMTP_PASSWORD").unwrap_or_default()),
            from_email: env::var("SMTP_FROM_EMAIL")
                .unwrap_or_else(|_| "noreply@example.com".to_string()),
            from_name: env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Invoice Service".to_string()),
            enabled: env::var("SMTP_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
        };

        let reminders = ReminderConfig {
            run_interval_secs: env::var("REMINDER_RUN_INTERVAL_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .unwrap_or(86_400),
            overdue_repeat_days: 7,
            due_soon_days: 3,
        };

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections,
            },
            razorpay,
            stripe,
            smtp,
            reminders,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            service_name: "invoice-service".to_string(),
        })
    }
}
