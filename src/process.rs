//! The document processor: one PDF in, one [`ProcessedDocument`] out.
//!
//! ```text
//! render ──▶ model call ──▶ normalize ──▶ [merge] ──▶ reconcile
//! ```
//!
//! [`DocumentProcessor::process`] never returns an error and never panics on
//! behalf of its collaborators: a failing renderer, a failing or panicking
//! model client and an unusable answer are all turned into a classified
//! [`Outcome::Failure`] for that one document.

use crate::config::{ExtractionConfig, ExtractionStrategy};
use crate::error::{DocumentErrorKind, InvoiceError, ModelError, RenderError};
use crate::output::{Outcome, ProcessedDocument};
use crate::pipeline::llm::{CompletionSettings, LlmModelClient, ModelClient, ModelResponse};
use crate::pipeline::merge::merge_pages;
use crate::pipeline::normalize::{normalize, JsonObject};
use crate::pipeline::reconcile::reconcile;
use crate::pipeline::render::{DocumentRenderer, PdfiumRenderer};
use crate::prompts::default_instructions;
use edgequake_llm::ImageData;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs the extraction pipeline for single documents.
///
/// Cheap to share: clone the `Arc`s or wrap the processor itself in an `Arc`.
pub struct DocumentProcessor {
    renderer: Arc<dyn DocumentRenderer>,
    client: Arc<dyn ModelClient>,
    instructions: String,
    settings: CompletionSettings,
    strategy: ExtractionStrategy,
}

/// A classified failure inside one document, before it becomes an Outcome.
struct StageFailure {
    kind: DocumentErrorKind,
    message: String,
    raw_response: Option<String>,
}

impl StageFailure {
    fn new(kind: DocumentErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raw_response: None,
        }
    }
}

impl DocumentProcessor {
    /// Build a processor around explicit collaborators. Instructions,
    /// sampling settings and strategy come from `config`.
    pub fn new(
        renderer: Arc<dyn DocumentRenderer>,
        client: Arc<dyn ModelClient>,
        config: &ExtractionConfig,
    ) -> Self {
        let instructions = config
            .instructions
            .clone()
            .unwrap_or_else(|| default_instructions(config.strategy).to_string());
        Self {
            renderer,
            client,
            instructions,
            settings: CompletionSettings::from_config(config),
            strategy: config.strategy,
        }
    }

    /// Build the production processor: pdfium rendering and an
    /// `edgequake_llm` provider resolved from `config`.
    ///
    /// # Errors
    /// [`InvoiceError::ProviderNotConfigured`] when no provider can be found.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, InvoiceError> {
        let renderer = Arc::new(PdfiumRenderer::from_config(config));
        let client = Arc::new(LlmModelClient::from_config(config)?);
        Ok(Self::new(renderer, client, config))
    }

    pub fn strategy(&self) -> ExtractionStrategy {
        self.strategy
    }

    /// Process one document. Always yields exactly one outcome.
    pub async fn process(&self, filename: &str, path: &Path) -> ProcessedDocument {
        let start = Instant::now();
        info!("Processing {}", filename);

        let mut doc = ProcessedDocument::new(Outcome::success(filename, Default::default()));

        let result = match self.render(path).await {
            Ok(pages) if pages.is_empty() => Err(StageFailure::new(
                DocumentErrorKind::EmptyDocument,
                "document has no pages",
            )),
            Ok(pages) => {
                doc.pages = pages.len();
                match self.strategy {
                    ExtractionStrategy::WholeDocument => {
                        self.extract_whole(filename, &pages, &mut doc).await
                    }
                    ExtractionStrategy::PerPage => {
                        self.extract_per_page(filename, &pages, &mut doc).await
                    }
                }
            }
            Err(e) => Err(StageFailure::new(DocumentErrorKind::RenderFailed, e.to_string())),
        };

        doc.outcome = match result {
            Ok(parsed) => Outcome::success(filename, reconcile(&parsed)),
            Err(failure) => {
                warn!("{}: {}: {}", filename, failure.kind, failure.message);
                Outcome::Failure {
                    filename: filename.to_string(),
                    error_kind: failure.kind,
                    message: failure.message,
                    raw_response: failure.raw_response,
                }
            }
        };
        doc.duration_ms = start.elapsed().as_millis() as u64;
        debug!(
            "{}: done in {}ms ({} in / {} out tokens)",
            filename, doc.duration_ms, doc.input_tokens, doc.output_tokens
        );
        doc
    }

    /// Rasterise on the blocking pool. A renderer panic surfaces as a
    /// `JoinError` and is reported as [`RenderError::Panicked`].
    async fn render(&self, path: &Path) -> Result<Vec<ImageData>, RenderError> {
        let renderer = Arc::clone(&self.renderer);
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || renderer.render(&path))
            .await
            .unwrap_or_else(|join_err| {
                let detail = if join_err.is_panic() {
                    panic_message(join_err.into_panic().as_ref())
                } else {
                    join_err.to_string()
                };
                Err(RenderError::Panicked(detail))
            })
    }

    async fn call_model(&self, images: &[ImageData]) -> Result<ModelResponse, ModelError> {
        AssertUnwindSafe(
            self.client
                .complete(images, &self.instructions, &self.settings),
        )
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(ModelError::Panicked(panic_message(payload.as_ref()))))
    }

    /// Call the model and normalize its answer into a JSON object.
    async fn ask(
        &self,
        images: &[ImageData],
        doc: &mut ProcessedDocument,
    ) -> Result<JsonObject, StageFailure> {
        let response = self
            .call_model(images)
            .await
            .map_err(|e| StageFailure::new(DocumentErrorKind::ModelRequestFailed, e.to_string()))?;

        doc.input_tokens += response.input_tokens;
        doc.output_tokens += response.output_tokens;

        normalize(&response.text).map_err(|e| {
            debug!("Unparseable answer ({})", e.detail);
            StageFailure {
                kind: DocumentErrorKind::MalformedResponse,
                message: e.to_string(),
                raw_response: Some(response.text.clone()),
            }
        })
    }

    async fn extract_whole(
        &self,
        filename: &str,
        pages: &[ImageData],
        doc: &mut ProcessedDocument,
    ) -> Result<JsonObject, StageFailure> {
        debug!("{}: sending {} pages in one request", filename, pages.len());
        self.ask(pages, doc).await
    }

    /// One request per page; failed pages are skipped and the surviving
    /// fragments merged. Fails only when every page failed.
    async fn extract_per_page(
        &self,
        filename: &str,
        pages: &[ImageData],
        doc: &mut ProcessedDocument,
    ) -> Result<JsonObject, StageFailure> {
        let mut fragments = Vec::with_capacity(pages.len());
        let mut first_failure: Option<StageFailure> = None;

        for (idx, page) in pages.iter().enumerate() {
            match self.ask(std::slice::from_ref(page), doc).await {
                Ok(fragment) => fragments.push(fragment),
                Err(failure) => {
                    warn!(
                        "{}: page {} skipped: {}: {}",
                        filename,
                        idx + 1,
                        failure.kind,
                        failure.message
                    );
                    first_failure.get_or_insert(failure);
                }
            }
        }

        if fragments.is_empty() {
            if let Some(failure) = first_failure {
                return Err(failure);
            }
        }

        let merged = merge_pages(&fragments);
        if merged.invoices_found > 1 {
            warn!(
                "{}: {} invoices detected, keeping the first",
                filename, merged.invoices_found
            );
        }
        Ok(merged.invoice)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
