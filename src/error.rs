//! Error types for the edgequake-invoice library.
//!
//! Two tiers of failure exist:
//!
//! * [`InvoiceError`]: **Fatal**: the batch cannot run or its results cannot
//!   be stored (input directory missing, output directory not writable,
//!   provider not configured). Returned as `Err(InvoiceError)` from the
//!   top-level `extract*` functions.
//!
//! * [`DocumentErrorKind`]: **Per-document**: one invoice could not be
//!   extracted. It is recorded inside [`crate::output::Outcome::Failure`]
//!   and never aborts the batch.
//!
//! [`RenderError`], [`ModelError`] and [`ParseError`] are what the pipeline
//! stages return; the document processor classifies them into a
//! [`DocumentErrorKind`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-invoice library.
#[derive(Debug, Error)]
pub enum InvoiceError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input directory or file does not exist.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the input.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the output directory or write an artifact into it.
    #[error("Failed to write output '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a single document produced no record.
///
/// Every kind is terminal for its document and recovered at the
/// document-processor boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentErrorKind {
    /// The renderer produced no pages.
    EmptyDocument,
    /// The document could not be opened or rasterised.
    RenderFailed,
    /// Network, auth, quota or timeout failure from the model client.
    ModelRequestFailed,
    /// The model answered, but no JSON object could be recovered.
    MalformedResponse,
}

impl DocumentErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentErrorKind::EmptyDocument => "EmptyDocument",
            DocumentErrorKind::RenderFailed => "RenderFailed",
            DocumentErrorKind::ModelRequestFailed => "ModelRequestFailed",
            DocumentErrorKind::MalformedResponse => "MalformedResponse",
        }
    }
}

impl fmt::Display for DocumentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure from a [`crate::pipeline::render::DocumentRenderer`].
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// The PDF engine could not be loaded.
    #[error("PDF engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The document is not a readable PDF (corrupt, encrypted, truncated).
    #[error("cannot open '{path}': {detail}")]
    Unreadable { path: PathBuf, detail: String },

    /// A page could not be rasterised or encoded.
    #[error("page {page}: {detail}")]
    PageFailed { page: usize, detail: String },

    /// The renderer panicked.
    #[error("renderer panicked: {0}")]
    Panicked(String),
}

/// Failure from a [`crate::pipeline::llm::ModelClient`].
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// The call did not finish within the configured timeout.
    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider rejected the request or the network failed.
    #[error("model call failed after {retries} retries: {detail}")]
    RequestFailed { retries: u32, detail: String },

    /// The client implementation panicked.
    #[error("model client panicked: {0}")]
    Panicked(String),
}

/// The normaliser could not recover a JSON object from the model's text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{reason}: {snippet}")]
pub struct ParseError {
    /// Short machine-readable reason, always `"unparseable"` today.
    pub reason: String,
    /// The first 200 characters of the raw response.
    pub snippet: String,
    /// The last JSON parser error, for logs.
    pub detail: String,
}
