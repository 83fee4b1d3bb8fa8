//! Page merging for [`ExtractionStrategy::PerPage`](crate::config::ExtractionStrategy).
//!
//! In per-page mode every page is sent to the model on its own and comes back
//! as a fragment:
//!
//! ```json
//! {
//!   "status": {
//!     "is_start_of_invoice": true,
//!     "is_continuation": false,
//!     "is_end_of_invoice": false,
//!     "is_blank_or_misc": false
//!   },
//!   "data": { "invoiceNumber": "INV-1", "lineItems": [ ... ] }
//! }
//! ```
//!
//! [`merge_pages`] walks the fragments in page order and stitches them into
//! invoices. A fragment without a `status` object is treated as flat data.

use crate::pipeline::normalize::JsonObject;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::debug;

const LINE_ITEMS: &str = "lineItems";

static NO_DATA: Lazy<JsonObject> = Lazy::new(JsonObject::new);

/// Result of stitching a document's page fragments together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedPages {
    /// The first invoice found in the document (empty when none was found).
    pub invoice: JsonObject,
    /// How many distinct invoices the pages describe.
    pub invoices_found: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct PageFlags {
    start: bool,
    continuation: bool,
    end: bool,
    blank: bool,
}

/// Stitch per-page fragments, in page order, into one invoice mapping.
pub fn merge_pages(fragments: &[JsonObject]) -> MergedPages {
    let mut invoices: Vec<JsonObject> = Vec::new();
    let mut current: Option<JsonObject> = None;

    for (idx, fragment) in fragments.iter().enumerate() {
        let (flags, data) = split_fragment(fragment);

        if data.is_empty() || (flags.blank && !flags.start && !flags.continuation && !flags.end) {
            debug!("Page {}: blank or empty, skipped", idx + 1);
            continue;
        }

        let mut fresh = false;
        if flags.start || current.is_none() {
            if let Some(done) = current.take() {
                invoices.push(done);
            }
            current = Some(data.clone());
            fresh = true;
        } else if let Some(invoice) = current.as_mut() {
            if flags.continuation && !flags.end {
                append_line_items(invoice, data);
            } else if !flags.end {
                absorb(invoice, data);
            }
        }

        if flags.end {
            if let Some(mut invoice) = current.take() {
                if !fresh {
                    overlay(&mut invoice, data);
                    append_line_items(&mut invoice, data);
                }
                invoices.push(invoice);
            }
        }
    }

    if let Some(open) = current.take() {
        invoices.push(open);
    }

    MergedPages {
        invoices_found: invoices.len(),
        invoice: invoices.into_iter().next().unwrap_or_default(),
    }
}

/// Split a fragment into its flags and its data object.
fn split_fragment(fragment: &JsonObject) -> (PageFlags, &JsonObject) {
    let Some(status) = fragment.get("status").and_then(Value::as_object) else {
        return (PageFlags::default(), fragment);
    };
    let flag = |key: &str| status.get(key).and_then(Value::as_bool).unwrap_or(false);
    let flags = PageFlags {
        start: flag("is_start_of_invoice"),
        continuation: flag("is_continuation"),
        end: flag("is_end_of_invoice"),
        blank: flag("is_blank_or_misc"),
    };
    let data = fragment
        .get("data")
        .and_then(Value::as_object)
        .unwrap_or(&*NO_DATA);
    (flags, data)
}

fn append_line_items(invoice: &mut JsonObject, data: &JsonObject) {
    let Some(Value::Array(extra)) = data.get(LINE_ITEMS) else {
        return;
    };
    if extra.is_empty() {
        return;
    }
    match invoice.get_mut(LINE_ITEMS) {
        Some(Value::Array(items)) => items.extend(extra.iter().cloned()),
        _ => {
            invoice.insert(LINE_ITEMS.to_string(), Value::Array(extra.clone()));
        }
    }
}

/// Copy every non-null field except line items over the invoice.
fn overlay(invoice: &mut JsonObject, data: &JsonObject) {
    for (key, value) in data {
        if key != LINE_ITEMS && !value.is_null() {
            invoice.insert(key.clone(), value.clone());
        }
    }
}

fn absorb(invoice: &mut JsonObject, data: &JsonObject) {
    overlay(invoice, data);
    append_line_items(invoice, data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fragment(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    fn page(start: bool, cont: bool, end: bool, data: Value) -> JsonObject {
        fragment(json!({
            "status": {
                "is_start_of_invoice": start,
                "is_continuation": cont,
                "is_end_of_invoice": end,
                "is_blank_or_misc": false
            },
            "data": data
        }))
    }

    #[test]
    fn three_page_invoice_is_stitched() {
        let merged = merge_pages(&[
            page(
                true,
                false,
                false,
                json!({"invoiceNumber": "INV-3", "vendorName": "ACME",
                       "lineItems": [{"description": "A"}]}),
            ),
            page(false, true, false, json!({"lineItems": [{"description": "B"}]})),
            page(
                false,
                true,
                true,
                json!({"totalAmount": 300.0, "vendorName": null,
                       "lineItems": [{"description": "C"}]}),
            ),
        ]);
        assert_eq!(merged.invoices_found, 1);
        let inv = merged.invoice;
        assert_eq!(inv["invoiceNumber"], "INV-3");
        assert_eq!(inv["vendorName"], "ACME");
        assert_eq!(inv["totalAmount"], 300.0);
        assert_eq!(inv["lineItems"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn single_page_invoice_with_start_and_end() {
        let merged = merge_pages(&[page(true, false, true, json!({"invoiceNumber": "X"}))]);
        assert_eq!(merged.invoices_found, 1);
        assert_eq!(merged.invoice["invoiceNumber"], "X");
    }

    #[test]
    fn second_invoice_is_counted_but_first_is_kept() {
        let merged = merge_pages(&[
            page(true, false, true, json!({"invoiceNumber": "FIRST"})),
            page(true, false, true, json!({"invoiceNumber": "SECOND"})),
        ]);
        assert_eq!(merged.invoices_found, 2);
        assert_eq!(merged.invoice["invoiceNumber"], "FIRST");
    }

    #[test]
    fn blank_pages_are_skipped() {
        let blank = fragment(json!({
            "status": {"is_blank_or_misc": true},
            "data": {"note": "terms and conditions"}
        }));
        let merged = merge_pages(&[blank.clone(), page(true, false, false, json!({"tax": 5})), blank]);
        assert_eq!(merged.invoices_found, 1);
        assert!(merged.invoice.get("note").is_none());
    }

    #[test]
    fn flat_fragments_merge_with_non_null_winning() {
        let merged = merge_pages(&[
            fragment(json!({"invoiceNumber": "F-1", "lineItems": [{"description": "a"}]})),
            fragment(json!({"invoiceNumber": null, "tax": 2.5,
                            "lineItems": [{"description": "b"}]})),
        ]);
        assert_eq!(merged.invoices_found, 1);
        assert_eq!(merged.invoice["invoiceNumber"], "F-1");
        assert_eq!(merged.invoice["tax"], 2.5);
        assert_eq!(merged.invoice["lineItems"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn continuation_without_open_invoice_opens_one() {
        let merged = merge_pages(&[page(false, true, false, json!({"subtotal": 10}))]);
        assert_eq!(merged.invoices_found, 1);
        assert_eq!(merged.invoice["subtotal"], 10);
    }

    #[test]
    fn no_fragments_yield_empty_invoice() {
        let merged = merge_pages(&[]);
        assert_eq!(merged.invoices_found, 0);
        assert!(merged.invoice.is_empty());
    }
}
