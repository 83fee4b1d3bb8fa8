//! # edgequake-invoice
//!
//! Extract structured invoice records from PDF documents using Vision
//! Language Models (VLMs).
//!
//! Each PDF is rasterised, sent to a vision model with extraction
//! instructions, and the free-form answer is turned into a fixed, fully-keyed
//! [`CanonicalRecord`]. A batch over a directory produces one detailed JSON
//! file per document plus a CSV summary with one row per document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! directory of PDFs
//!  │
//!  ├─ 1. Input      list *.pdf in stable name order
//!  ├─ 2. Render     rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Encode     PNG → base64 ImageData
//!  ├─ 4. VLM        one call per document (or per page) to gpt-4o / claude / gemini / …
//!  ├─ 5. Normalize  fences, prose, trailing commas, truncation → JSON object
//!  ├─ 6. Reconcile  "$1,234.56" → 1234.56, missing → null
//!  └─ 7. Output     <stem>.json per document + invoices_summary.csv
//! ```
//!
//! A document that fails at any stage becomes an `error` row; it never
//! stops the batch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_invoice::{extract_directory, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let output = extract_directory("invoices", "extracted_data", &config).await?;
//!     for row in &output.summary {
//!         println!("{}: {:?} {:?}", row.filename, row.status, row.total_amount);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice-extract` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-invoice = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod sink;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{run_batch, CancelToken};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, ExtractionStrategy};
pub use edgequake_llm::ImageData;
pub use error::{DocumentErrorKind, InvoiceError, ModelError, ParseError, RenderError};
pub use extract::{
    extract_directory, extract_directory_sync, extract_directory_with, extract_documents,
    extract_file,
};
pub use output::{
    BatchOutput, BatchStats, CanonicalRecord, Outcome, ProcessedDocument, RowStatus, SummaryRow,
    SUMMARY_COLUMNS,
};
pub use pipeline::input::{discover_documents, InputDocument};
pub use pipeline::llm::{CompletionSettings, LlmModelClient, ModelClient, ModelResponse};
pub use pipeline::normalize::normalize;
pub use pipeline::reconcile::reconcile;
pub use pipeline::render::{DocumentRenderer, PdfiumRenderer};
pub use process::DocumentProcessor;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use sink::{write_outputs, SUMMARY_FILENAME};
