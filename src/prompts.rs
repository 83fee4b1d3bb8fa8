//! Instruction templates for invoice extraction.
//!
//! Centralising every prompt here means changing what the model is asked for
//! touches exactly one place, and unit tests can check the templates without
//! a model.
//!
//! Callers can override the template via
//! [`crate::config::ExtractionConfig::instructions`]; the constants here are
//! used only when no override is provided.

use crate::config::ExtractionStrategy;

/// Instructions for [`ExtractionStrategy::WholeDocument`]: every page image
/// is attached to a single request.
pub const WHOLE_DOCUMENT_PROMPT: &str = r#"You are an expert invoice data extraction assistant. The attached images are the pages of ONE invoice document, in page order.

Extract the following fields and return them as a single JSON object:

- invoiceNumber: the invoice number or ID
- invoiceDate: the issue date, as printed
- vendorName: the company issuing the invoice
- customerName: the company or person being billed
- totalAmount: the final total due, as a number
- subtotal: the amount before tax, as a number
- tax: the tax amount, as a number
- dueDate: the payment due date, as printed
- lineItemsCount: the number of line items
- lineItemsSummary: a short comma-separated list of the line item descriptions
- lineItems: an array with one object per line item, each with "description", "quantity" and "amount"

Rules:
- Use null for any field that is not present. Never guess.
- Monetary values are plain numbers without currency symbols or thousands separators.
- If the document holds several invoices, extract only the first one.

Your response must be ONLY the valid JSON object. Do not wrap it in markdown fences and do not add commentary."#;

/// Instructions for [`ExtractionStrategy::PerPage`]: one page per request,
/// answered as a `{status, data}` fragment.
pub const PER_PAGE_PROMPT: &str = r#"You are an AI assistant analyzing a single page from a potentially multi-page invoice document. Your task is to extract all invoice data present on THIS PAGE ONLY and determine its context.

Return a single JSON object with two main keys: "status" and "data".

1.  The "status" object must contain these boolean fields:
    - "is_start_of_invoice": true if an invoice header (invoice number, vendor name, etc.) is present.
    - "is_continuation": true if the page contains only line items or totals that belong to a previous page.
    - "is_end_of_invoice": true if a final total (Total Amount Due) is present.
    - "is_blank_or_misc": true if the page contains no invoice data.

2.  The "data" object must contain any of the following fields you can find ON THIS PAGE:
    - invoiceNumber, invoiceDate, vendorName, customerName, totalAmount, subtotal, tax, dueDate, and a "lineItems" array containing an object for each line item found.

EXAMPLE RESPONSE FOR A FIRST PAGE:
{
  "status": { "is_start_of_invoice": true, "is_continuation": false, "is_end_of_invoice": false, "is_blank_or_misc": false },
  "data": { "invoiceNumber": "INV-123", "lineItems": [{"description": "Item A", "amount": 100.00}] }
}
Your response must be ONLY the valid JSON object."#;

/// Text of the user turn that carries the page images.
pub const USER_TURN: &str = "Extract the invoice data from these page images.";

/// The built-in template for `strategy`.
pub fn default_instructions(strategy: ExtractionStrategy) -> &'static str {
    match strategy {
        ExtractionStrategy::WholeDocument => WHOLE_DOCUMENT_PROMPT,
        ExtractionStrategy::PerPage => PER_PAGE_PROMPT,
    }
}
