mod invoice;
mod line_item;
mod payment;

pub use invoice::{Invoice, InvoiceStatus, format_invoice_number};
pub use line_item::InvoiceItem;
pub use payment::{Payment, PaymentStatus};
