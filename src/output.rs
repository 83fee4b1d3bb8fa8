//! Output types: the canonical record, per-document outcomes and the batch
//! summary.
//!
//! Every type serialises with camelCase keys, matching the field names the
//! model is asked to produce, so a detailed JSON artifact reads the same as
//! the model's answer would have if it had been perfect.

use crate::error::DocumentErrorKind;
use serde::{Deserialize, Serialize};

/// The validated, fully-keyed record extracted from one invoice.
///
/// Missing information is always `None` (serialised as `null`), never an
/// empty string or an omitted key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub vendor_name: Option<String>,
    pub customer_name: Option<String>,
    pub total_amount: Option<f64>,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub due_date: Option<String>,
    pub line_items_count: Option<u64>,
    pub line_items_summary: Option<String>,
}

impl CanonicalRecord {
    /// The ten canonical keys, in summary-column order.
    pub const FIELDS: [&'static str; 10] = [
        "invoiceNumber",
        "invoiceDate",
        "vendorName",
        "customerName",
        "totalAmount",
        "subtotal",
        "tax",
        "dueDate",
        "lineItemsCount",
        "lineItemsSummary",
    ];

    /// `true` when no field carries a value.
    pub fn is_empty(&self) -> bool {
        *self == CanonicalRecord::default()
    }
}

/// The result of processing one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Outcome {
    #[serde(rename = "success")]
    Success {
        filename: String,
        record: CanonicalRecord,
    },
    #[serde(rename = "error", rename_all = "camelCase")]
    Failure {
        filename: String,
        error_kind: DocumentErrorKind,
        message: String,
        /// The model's verbatim answer, kept for `MalformedResponse` diagnostics.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_response: Option<String>,
    },
}

impl Outcome {
    pub fn success(filename: impl Into<String>, record: CanonicalRecord) -> Self {
        Outcome::Success {
            filename: filename.into(),
            record,
        }
    }

    pub fn failure(
        filename: impl Into<String>,
        error_kind: DocumentErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Outcome::Failure {
            filename: filename.into(),
            error_kind,
            message: message.into(),
            raw_response: None,
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            Outcome::Success { filename, .. } | Outcome::Failure { filename, .. } => filename,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn record(&self) -> Option<&CanonicalRecord> {
        match self {
            Outcome::Success { record, .. } => Some(record),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<DocumentErrorKind> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { error_kind, .. } => Some(*error_kind),
        }
    }
}

/// The detailed per-document artifact: the outcome plus diagnostics.
///
/// Written to `<stem>.json` for every input, success or failure, so failed
/// documents remain inspectable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedDocument {
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Pages rendered (0 when rendering failed).
    pub pages: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
}

impl ProcessedDocument {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            pages: 0,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
        }
    }
}

/// Row status in the batch summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Success,
    Error,
}

/// Column order of the summary table.
pub const SUMMARY_COLUMNS: [&str; 13] = [
    "filename",
    "status",
    "invoiceNumber",
    "invoiceDate",
    "vendorName",
    "customerName",
    "totalAmount",
    "subtotal",
    "tax",
    "dueDate",
    "lineItemsCount",
    "lineItemsSummary",
    "error",
];

/// One flattened summary row. Field order matches [`SUMMARY_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    pub filename: String,
    pub status: RowStatus,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub vendor_name: Option<String>,
    pub customer_name: Option<String>,
    pub total_amount: Option<f64>,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub due_date: Option<String>,
    pub line_items_count: Option<u64>,
    pub line_items_summary: Option<String>,
    pub error: Option<String>,
}

impl From<&Outcome> for SummaryRow {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Success { filename, record } => {
                let r = record.clone();
                SummaryRow {
                    filename: filename.clone(),
                    status: RowStatus::Success,
                    invoice_number: r.invoice_number,
                    invoice_date: r.invoice_date,
                    vendor_name: r.vendor_name,
                    customer_name: r.customer_name,
                    total_amount: r.total_amount,
                    subtotal: r.subtotal,
                    tax: r.tax,
                    due_date: r.due_date,
                    line_items_count: r.line_items_count,
                    line_items_summary: r.line_items_summary,
                    error: None,
                }
            }
            Outcome::Failure {
                filename,
                error_kind,
                message,
                ..
            } => SummaryRow {
                filename: filename.clone(),
                status: RowStatus::Error,
                invoice_number: None,
                invoice_date: None,
                vendor_name: None,
                customer_name: None,
                total_amount: None,
                subtotal: None,
                tax: None,
                due_date: None,
                line_items_count: None,
                line_items_summary: None,
                error: Some(format!("{error_kind}: {message}")),
            },
        }
    }
}

/// Totals for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    /// Documents handed to the batch.
    pub total_documents: usize,
    /// Documents that produced an outcome (less than total only when cancelled).
    pub processed_documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub cancelled: bool,
}

/// Everything a batch produced, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutput {
    /// One detailed artifact per processed document.
    pub documents: Vec<ProcessedDocument>,
    /// One summary row per processed document.
    pub summary: Vec<SummaryRow>,
    pub stats: BatchStats,
}
