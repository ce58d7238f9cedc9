//! Application startup and lifecycle management.
//!
//! Wires configuration into the repository, gateway registry, mailer and
//! services, builds the HTTP router and spawns the reminder batch loop.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::ExposeSecret;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::AppError;
use crate::handlers;
use crate::services::email::{Mailer, SmtpMailer};
use crate::services::gateways::{GatewayRegistry, PaymentGateway, RazorpayGateway, StripeGateway};
use crate::services::reminders::{run_periodically, ReminderJob};
use crate::services::{
    Database, InvoiceRepository, PaymentLinkService, ReconciliationService,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repository: Arc<dyn InvoiceRepository>,
    pub payment_links: Arc<PaymentLinkService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub mailer: Arc<dyn Mailer>,
}

/// Build the gateway registry from configuration. Only providers with
/// credentials present end up selectable.
pub fn build_gateways(config: &Config) -> GatewayRegistry {
    let gateways: Vec<Arc<dyn PaymentGateway>> = vec![
        Arc::new(RazorpayGateway::new(config.razorpay.clone())),
        Arc::new(StripeGateway::new(config.stripe.clone())),
    ];
    GatewayRegistry::new(gateways)
}

/// Assemble the shared state over an arbitrary repository and mailer.
///
/// Startup passes the Postgres repository and SMTP mailer; tests inject
/// in-memory doubles through the same seam.
pub fn build_state(
    config: Arc<Config>,
    repository: Arc<dyn InvoiceRepository>,
    mailer: Arc<dyn Mailer>,
) -> AppState {
    let gateways = build_gateways(&config);
    let payment_links = Arc::new(PaymentLinkService::new(
        repository.clone(),
        gateways.clone(),
        &config.frontend_url,
    ));
    let reconciliation = Arc::new(ReconciliationService::new(
        repository.clone(),
        gateways,
        mailer.clone(),
    ));

    AppState {
        config,
        repository,
        payment_links,
        reconciliation,
        mailer,
    }
}

/// Build the HTTP router over the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route(
            "/invoices",
            post(handlers::create_invoice).get(handlers::list_invoices),
        )
        .route("/invoices/summary", get(handlers::invoice_summary))
        .route("/invoices/recent", get(handlers::recent_invoices))
        .route(
            "/invoices/:id",
            get(handlers::get_invoice)
                .put(handlers::update_invoice)
                .delete(handlers::delete_invoice),
        )
        .route(
            "/invoices/:id/payment-link",
            post(handlers::create_payment_link),
        )
        .route("/invoices/:id/pdf", get(handlers::download_pdf))
        .route("/invoices/:id/send-reminder", post(handlers::send_reminder))
        .route("/invoices/:id/mark-paid", post(handlers::mark_paid))
        .route("/webhooks/payment", post(handlers::payment_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "invoice-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

async fn readiness_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    state.repository.health_check().await?;
    Ok((StatusCode::OK, Json(json!({ "status": "ready" }))))
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let database = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
        )
        .await?;
        database.run_migrations().await?;

        let repository: Arc<dyn InvoiceRepository> = Arc::new(database);
        let mailer: Arc<dyn Mailer> = Arc::new(SmtpMailer::new(config.smtp.clone())?);
        if !config.smtp.enabled {
            tracing::warn!("SMTP not configured - reminder and confirmation emails are disabled");
        }

        let config = Arc::new(config);
        let state = build_state(config.clone(), repository.clone(), mailer.clone());

        let reminder_job = Arc::new(ReminderJob::new(
            repository,
            mailer,
            config.reminders.clone(),
        ));
        tokio::spawn(run_periodically(
            reminder_job,
            config.reminders.run_interval_secs,
        ));

        let app = build_router(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(listener, app);

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}
