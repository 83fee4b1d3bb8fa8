//! Field reconciliation: map an arbitrary JSON object onto [`CanonicalRecord`].
//!
//! The model's answer is an open shape: keys may be missing, numbers arrive
//! as `"$1,234.56"`, counts as `"3 items"`, names as numbers. [`reconcile`]
//! is a total function from any object to the closed record. Every field is
//! either correctly typed or `None`; a bad field never fails the document.

use crate::output::CanonicalRecord;
use crate::pipeline::normalize::JsonObject;
use serde_json::Value;

/// Maximum length, in characters, of a derived line-items summary.
pub const LINE_ITEMS_SUMMARY_MAX_CHARS: usize = 300;

const CURRENCY_SYMBOLS: [char; 12] = ['$', '€', '£', '¥', '₹', '₩', '₽', '₺', '₪', '₫', '₱', '¢'];

/// Build a fully-keyed record from a parsed model answer.
///
/// Keys are matched by exact name. When `lineItemsCount` or
/// `lineItemsSummary` is missing or unusable but a `lineItems` array is
/// present, they are derived from it.
pub fn reconcile(parsed: &JsonObject) -> CanonicalRecord {
    let field = |key: &str| parsed.get(key).unwrap_or(&Value::Null);
    let line_items = parsed.get("lineItems").and_then(Value::as_array);

    CanonicalRecord {
        invoice_number: coerce_text(field("invoiceNumber")),
        invoice_date: coerce_text(field("invoiceDate")),
        vendor_name: coerce_text(field("vendorName")),
        customer_name: coerce_text(field("customerName")),
        total_amount: coerce_decimal(field("totalAmount")),
        subtotal: coerce_decimal(field("subtotal")),
        tax: coerce_decimal(field("tax")),
        due_date: coerce_text(field("dueDate")),
        line_items_count: coerce_count(field("lineItemsCount"))
            .or_else(|| line_items.map(|items| items.len() as u64)),
        line_items_summary: coerce_text(field("lineItemsSummary"))
            .or_else(|| line_items.and_then(|items| summarize_line_items(items))),
    }
}

/// Coerce a value to a finite decimal.
///
/// Numbers are kept when finite. Strings may carry a sign, a leading or
/// trailing currency symbol (or a three-letter code such as `USD`) and `,`
/// thousands separators. Anything else is `None`.
pub fn coerce_decimal(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_decimal_text(s),
        _ => None,
    }
}

/// Coerce a value to a non-negative integer count (truncating decimals).
pub fn coerce_count(value: &Value) -> Option<u64> {
    let n = coerce_decimal(value)?.trunc();
    if n < 0.0 || n > u64::MAX as f64 {
        return None;
    }
    Some(n as u64)
}

/// Coerce a value to trimmed, non-empty text.
pub fn coerce_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) if items.is_empty() => return None,
        Value::Object(map) if map.is_empty() => return None,
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn parse_decimal_text(raw: &str) -> Option<f64> {
    let mut s = raw.trim();
    let mut negative = false;

    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest.trim_start();
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest.trim_start();
    }

    s = strip_currency_prefix(s);

    if !negative {
        if let Some(rest) = s.strip_prefix('-') {
            negative = true;
            s = rest.trim_start();
        }
    }

    s = strip_currency_suffix(s);

    // Commas are thousands separators only; a comma decimal mark
    // ("1.234,56", "1,5") yields null.
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
    if frac_part.contains(',') || int_part.split(',').skip(1).any(|g| g.len() != 3) {
        return None;
    }

    let digits: String = s.chars().filter(|c| *c != ',').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    let value: f64 = digits.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

fn strip_currency_prefix(s: &str) -> &str {
    if let Some(rest) = s.strip_prefix(&CURRENCY_SYMBOLS[..]) {
        return rest.trim_start();
    }
    match s.split_once(char::is_whitespace) {
        Some((code, rest)) if is_currency_code(code) => rest.trim_start(),
        _ => s,
    }
}

fn strip_currency_suffix(s: &str) -> &str {
    if let Some(rest) = s.strip_suffix(&CURRENCY_SYMBOLS[..]) {
        return rest.trim_end();
    }
    match s.rsplit_once(char::is_whitespace) {
        Some((rest, code)) if is_currency_code(code) => rest.trim_end(),
        _ => s,
    }
}

fn is_currency_code(s: &str) -> bool {
    s.len() == 3 && s.chars().all(|c| c.is_ascii_uppercase())
}

/// Comma-joined `description` values of the line items, capped at
/// [`LINE_ITEMS_SUMMARY_MAX_CHARS`].
fn summarize_line_items(items: &[Value]) -> Option<String> {
    let descriptions: Vec<String> = items
        .iter()
        .filter_map(|item| item.get("description"))
        .filter_map(coerce_text)
        .collect();
    if descriptions.is_empty() {
        return None;
    }
    Some(
        descriptions
            .join(", ")
            .chars()
            .take(LINE_ITEMS_SUMMARY_MAX_CHARS)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn numeric_coercion_examples() {
        assert_eq!(coerce_decimal(&json!("$1,234.56")), Some(1234.56));
        assert_eq!(coerce_decimal(&json!("1234.56")), Some(1234.56));
        assert_eq!(coerce_decimal(&Value::Null), None);
        assert_eq!(coerce_decimal(&json!("N/A")), None);
    }

    #[test]
    fn numeric_coercion_variants() {
        assert_eq!(coerce_decimal(&json!(99)), Some(99.0));
        assert_eq!(coerce_decimal(&json!(" € 12.50 ")), Some(12.5));
        assert_eq!(coerce_decimal(&json!("12.50 €")), Some(12.5));
        assert_eq!(coerce_decimal(&json!("USD 2,000")), Some(2000.0));
        assert_eq!(coerce_decimal(&json!("2,000.00 EUR")), Some(2000.0));
        assert_eq!(coerce_decimal(&json!("-$15.00")), Some(-15.0));
        assert_eq!(coerce_decimal(&json!("$-15.00")), Some(-15.0));
        assert_eq!(coerce_decimal(&json!("")), None);
        assert_eq!(coerce_decimal(&json!("inf")), None);
        assert_eq!(coerce_decimal(&json!("1e5")), None);
        assert_eq!(coerce_decimal(&json!("1.2.3")), None);
        assert_eq!(coerce_decimal(&json!(true)), None);
        assert_eq!(coerce_decimal(&json!([1])), None);
    }

    #[test]
    fn comma_decimal_mark_is_rejected() {
        assert_eq!(coerce_decimal(&json!("1.234,56")), None);
        assert_eq!(coerce_decimal(&json!("€ 1.234,56")), None);
        assert_eq!(coerce_decimal(&json!("12,5")), None);
        assert_eq!(coerce_decimal(&json!("1,234,567.8")), Some(1234567.8));
    }

    #[test]
    fn negative_totals_are_preserved() {
        let record = reconcile(&object(json!({"totalAmount": -250.0})));
        assert_eq!(record.total_amount, Some(-250.0));
    }

    #[test]
    fn count_truncates_and_clamps_negatives() {
        assert_eq!(coerce_count(&json!(3.9)), Some(3));
        assert_eq!(coerce_count(&json!("4")), Some(4));
        assert_eq!(coerce_count(&json!(-2)), None);
        assert_eq!(coerce_count(&json!("many")), None);
    }

    #[test]
    fn text_coercion() {
        assert_eq!(coerce_text(&json!("  INV-9 ")), Some("INV-9".into()));
        assert_eq!(coerce_text(&json!("")), None);
        assert_eq!(coerce_text(&json!("   ")), None);
        assert_eq!(coerce_text(&json!(12345)), Some("12345".into()));
        assert_eq!(coerce_text(&json!(false)), Some("false".into()));
        assert_eq!(coerce_text(&json!([])), None);
        assert_eq!(coerce_text(&json!({"name": "ACME"})), Some(r#"{"name":"ACME"}"#.into()));
    }

    #[test]
    fn empty_mapping_is_all_null() {
        let record = reconcile(&JsonObject::new());
        assert!(record.is_empty());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 10);
    }

    #[test]
    fn extra_keys_and_wrong_types_are_absorbed() {
        let record = reconcile(&object(json!({
            "invoiceNumber": 1001,
            "invoiceDate": "2024-03-01",
            "vendorName": "",
            "customerName": null,
            "totalAmount": "$1,100.00",
            "subtotal": "one thousand",
            "tax": {"rate": 0.1},
            "lineItemsCount": -1,
            "confidence": 0.93,
            "notes": ["extra"]
        })));
        assert_eq!(record.invoice_number.as_deref(), Some("1001"));
        assert_eq!(record.invoice_date.as_deref(), Some("2024-03-01"));
        assert_eq!(record.vendor_name, None);
        assert_eq!(record.customer_name, None);
        assert_eq!(record.total_amount, Some(1100.0));
        assert_eq!(record.subtotal, None);
        assert_eq!(record.tax, None);
        assert_eq!(record.line_items_count, None);
    }

    #[test]
    fn reconciling_a_canonical_record_is_identity() {
        let record = CanonicalRecord {
            invoice_number: Some("INV-1".into()),
            invoice_date: Some("2024-01-31".into()),
            vendor_name: Some("ACME Corp".into()),
            customer_name: Some("Globex".into()),
            total_amount: Some(1234.56),
            subtotal: Some(1100.0),
            tax: Some(134.56),
            due_date: Some("2024-02-29".into()),
            line_items_count: Some(4),
            line_items_summary: Some("Widgets, Gadgets".into()),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(reconcile(value.as_object().unwrap()), record);

        let empty = serde_json::to_value(CanonicalRecord::default()).unwrap();
        assert_eq!(reconcile(empty.as_object().unwrap()), CanonicalRecord::default());
    }

    #[test]
    fn line_items_fill_missing_count_and_summary() {
        let record = reconcile(&object(json!({
            "lineItems": [
                {"description": "Consulting", "amount": 500},
                {"amount": 20},
                {"description": "Travel", "amount": 80}
            ]
        })));
        assert_eq!(record.line_items_count, Some(3));
        assert_eq!(record.line_items_summary.as_deref(), Some("Consulting, Travel"));
    }

    #[test]
    fn explicit_line_item_fields_win() {
        let record = reconcile(&object(json!({
            "lineItemsCount": 7,
            "lineItemsSummary": "Seven things",
            "lineItems": [{"description": "Only one"}]
        })));
        assert_eq!(record.line_items_count, Some(7));
        assert_eq!(record.line_items_summary.as_deref(), Some("Seven things"));
    }

    #[test]
    fn derived_summary_is_truncated() {
        let items: Vec<Value> = (0..100)
            .map(|i| json!({"description": format!("Item number {i}")}))
            .collect();
        let record = reconcile(&object(json!({ "lineItems": items })));
        let summary = record.line_items_summary.unwrap();
        assert_eq!(summary.chars().count(), LINE_ITEMS_SUMMARY_MAX_CHARS);
        assert!(summary.starts_with("Item number 0, Item number 1"));
    }
}
