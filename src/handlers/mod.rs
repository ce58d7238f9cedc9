mod invoices;
mod payment_links;
mod pdf;
mod reminders;
mod webhooks;

pub use invoices::{
    create_invoice, delete_invoice, get_invoice, invoice_summary, list_invoices, mark_paid,
    recent_invoices, update_invoice,
};
pub use payment_links::create_payment_link;
pub use pdf::download_pdf;
pub use reminders::send_reminder;
pub use webhooks::payment_webhook;
