pub mod database;
pub mod email;
pub mod gateways;
pub mod payment_links;
pub mod pdf;
pub mod reconciliation;
pub mod reminders;
pub mod repository;

pub use database::Database;
pub use payment_links::PaymentLinkService;
pub use reconciliation::ReconciliationService;
pub use reminders::ReminderJob;
pub use repository::{InMemoryInvoiceRepository, InvoiceRepository};
