//! Invoice PDF rendering.

use printpdf::{BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference, Point};
use rust_decimal::Decimal;
use std::io::BufWriter;

use crate::error::AppError;
use crate::models::{Invoice, InvoiceItem};

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 15.0;

/// Render an invoice to PDF bytes. A4, builtin Helvetica; amounts carry the
/// ISO currency code since builtin fonts cannot encode every symbol.
pub fn render_invoice_pdf(invoice: &Invoice, items: &[InvoiceItem]) -> Result<Vec<u8>, AppError> {
    let (doc, page1, layer1) = PdfDocument::new(
        format!("Invoice {}", invoice.invoice_number),
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "Layer 1",
    );
    let layer = doc.get_page(page1).get_layer(layer1);

    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("PDF font error: {}", e)))?;
    let font_bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("PDF font error: {}", e)))?;

    let mut y: f32 = 280.0;

    // Title
    push_line(
        &layer,
        &font_bold,
        &format!("INVOICE #{}", invoice.invoice_number),
        20.0,
        MARGIN_MM,
        y,
    );
    y -= 12.0;
    divider(&layer, y);
    y -= 10.0;

    // Client block
    push_line(&layer, &font_bold, "Bill To:", 12.0, MARGIN_MM, y);
    y -= 6.0;
    push_line(&layer, &font, &invoice.client_name, 10.0, MARGIN_MM, y);
    y -= 5.0;
    push_line(
        &layer,
        &font,
        &format!("Email: {}", invoice.client_email),
        10.0,
        MARGIN_MM,
        y,
    );
    if let Some(phone) = invoice.client_phone.as_deref().filter(|p| !p.is_empty()) {
        y -= 5.0;
        push_line(&layer, &font, &format!("Phone: {}", phone), 10.0, MARGIN_MM, y);
    }
    if let Some(address) = invoice.client_address.as_deref().filter(|a| !a.is_empty()) {
        y -= 5.0;
        push_line(&layer, &font, address, 10.0, MARGIN_MM, y);
    }

    // Dates and status, right-hand column
    let mut right_y = 252.0;
    push_line(
        &layer,
        &font,
        &format!("Issue Date: {}", invoice.issue_date.format("%B %d, %Y")),
        10.0,
        120.0,
        right_y,
    );
    right_y -= 5.0;
    push_line(
        &layer,
        &font,
        &format!("Due Date: {}", invoice.due_date.format("%B %d, %Y")),
        10.0,
        120.0,
        right_y,
    );
    right_y -= 5.0;
    push_line(
        &layer,
        &font,
        &format!("Status: {}", invoice.status),
        10.0,
        120.0,
        right_y,
    );

    y = y.min(right_y) - 12.0;

    // Items table
    let x_desc = MARGIN_MM;
    let x_qty = 115.0;
    let x_unit = 140.0;
    let x_total = 170.0;

    push_line(&layer, &font_bold, "Description", 10.0, x_desc, y);
    push_line(&layer, &font_bold, "Qty", 10.0, x_qty, y);
    push_line(&layer, &font_bold, "Unit Price", 10.0, x_unit, y);
    push_line(&layer, &font_bold, "Total", 10.0, x_total, y);
    y -= 2.5;
    divider(&layer, y);
    y -= 5.0;

    for item in items {
        push_line(&layer, &font, &item.description, 10.0, x_desc, y);
        push_line(&layer, &font, &item.quantity.to_string(), 10.0, x_qty, y);
        push_line(&layer, &font, &money(&invoice.currency, item.unit_price), 10.0, x_unit, y);
        push_line(&layer, &font, &money(&invoice.currency, item.total), 10.0, x_total, y);
        y -= 5.5;
    }

    y -= 2.0;
    divider(&layer, y);
    y -= 7.0;

    // Totals block
    push_line(&layer, &font, "Subtotal:", 10.0, x_unit, y);
    push_line(&layer, &font, &money(&invoice.currency, invoice.subtotal), 10.0, x_total, y);
    y -= 5.5;
    push_line(
        &layer,
        &font,
        &format!("Tax ({}%):", invoice.tax_rate),
        10.0,
        x_unit,
        y,
    );
    push_line(&layer, &font, &money(&invoice.currency, invoice.tax_amount), 10.0, x_total, y);
    y -= 6.5;
    push_line(&layer, &font_bold, "Total:", 12.0, x_unit, y);
    push_line(
        &layer,
        &font_bold,
        &money(&invoice.currency, invoice.total_amount),
        12.0,
        x_total,
        y,
    );

    // Notes and terms
    if let Some(notes) = invoice.notes.as_deref().filter(|n| !n.is_empty()) {
        y -= 14.0;
        push_line(&layer, &font_bold, "Notes:", 11.0, MARGIN_MM, y);
        y -= 5.5;
        push_line(&layer, &font, notes, 10.0, MARGIN_MM, y);
    }
    if let Some(terms) = invoice.terms_conditions.as_deref().filter(|t| !t.is_empty()) {
        y -= 10.0;
        push_line(&layer, &font_bold, "Terms & Conditions:", 11.0, MARGIN_MM, y);
        y -= 5.5;
        push_line(&layer, &font, terms, 10.0, MARGIN_MM, y);
    }

    let mut bytes = Vec::new();
    doc.save(&mut BufWriter::new(&mut bytes))
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("PDF write error: {}", e)))?;
    Ok(bytes)
}

fn push_line(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    text: &str,
    font_size: f32,
    x: f32,
    y: f32,
) {
    layer.use_text(text, font_size, Mm(x), Mm(y), font);
}

fn divider(layer: &PdfLayerReference, y: f32) {
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(MARGIN_MM), Mm(y)), false),
            (Point::new(Mm(PAGE_WIDTH_MM - MARGIN_MM), Mm(y)), false),
        ],
        is_closed: false,
    });
}

fn money(currency: &str, amount: Decimal) -> String {
    format!("{} {}", currency, amount)
}
