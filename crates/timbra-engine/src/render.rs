//! Document rendering seam.
//!
//! Rendering is a pure function from a stamped invoice to printable bytes.
//! The production representation (PDF layout, fonts, logos) is out of scope
//! here - the engine only needs *a* rendering to attach to notifications,
//! and tests need a deterministic one.

use timbra_core::{InvoiceRecord, StampingRequest};

/// Pure rendering seam: `render(invoice, request) → bytes`.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, invoice: &InvoiceRecord, request: &StampingRequest) -> Vec<u8>;
}

/// Plain-text rendering of a stamped invoice.
///
/// One screen of text with the fields a cashier would read back over the
/// phone. Deliberately boring.
pub struct TextRenderer;

impl DocumentRenderer for TextRenderer {
    fn render(&self, invoice: &InvoiceRecord, request: &StampingRequest) -> Vec<u8> {
        let company = request.company.as_deref().unwrap_or("");
        let address = request.address.as_deref().unwrap_or("");

        let mut out = String::new();
        out.push_str(&format!("{company}\n{address}\n"));
        out.push_str(&format!("Folio: {}\n", invoice.folio));
        out.push_str(&format!("UUID: {}\n", invoice.uuid));
        out.push_str(&format!("Ticket: {}\n", invoice.ticket_id));
        out.push_str(&format!("Fecha venta: {}\n", request.sale_date));
        if let Some(stamped_at) = &invoice.stamped_at {
            out.push_str(&format!("Fecha timbrado: {stamped_at}\n"));
        }
        out.push_str(&format!("Sello: {}\n", invoice.seal_chain));
        out.push_str(&format!("QR: {}\n", invoice.qr_code));
        out.push_str("Este documento es una representacion impresa de un CFDI\n");

        out.into_bytes()
    }
}
