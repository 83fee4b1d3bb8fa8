//! Batch aggregation: many documents in, one ordered [`BatchOutput`] out.
//!
//! Documents are processed with up to `config.concurrency` in flight via
//! `buffer_unordered`. Each result lands in the slot of its input position,
//! so summary and detail order always equal input order regardless of which
//! model call returns first.

use crate::config::ExtractionConfig;
use crate::output::{BatchOutput, BatchStats, Outcome, ProcessedDocument, SummaryRow};
use crate::pipeline::input::InputDocument;
use crate::process::DocumentProcessor;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Cooperative cancellation flag, checked before each document starts.
///
/// Clones share the same flag, so a clone can be handed to a signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Documents already started run to completion.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Process `documents` and aggregate their outcomes in input order.
///
/// Never fails: every started document yields exactly one summary row and one
/// detailed artifact. Documents that had not started when the cancel token
/// fired are omitted and `stats.cancelled` is set.
pub async fn run_batch(
    processor: &DocumentProcessor,
    documents: &[InputDocument],
    config: &ExtractionConfig,
) -> BatchOutput {
    let total = documents.len();
    let callback = config.progress_callback.as_deref();
    let cancel = config.cancel_token.as_ref();

    info!(
        "Processing {} documents ({} concurrent, {:?})",
        total,
        config.concurrency,
        processor.strategy()
    );
    if let Some(cb) = callback {
        cb.on_batch_start(total);
    }

    let mut slots: Vec<Option<ProcessedDocument>> = vec![None; total];

    let mut results = stream::iter(documents.iter().enumerate().map(|(idx, input)| async move {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return (idx, None);
        }
        if let Some(cb) = callback {
            cb.on_document_start(idx, total, &input.filename);
        }

        let doc = processor.process(&input.filename, &input.path).await;

        if let Some(cb) = callback {
            match &doc.outcome {
                Outcome::Success { .. } => cb.on_document_complete(idx, total, &input.filename),
                Outcome::Failure {
                    error_kind,
                    message,
                    ..
                } => cb.on_document_error(idx, total, &input.filename, *error_kind, message),
            }
        }
        (idx, Some(doc))
    }))
    .buffer_unordered(config.concurrency.max(1));

    while let Some((idx, doc)) = results.next().await {
        slots[idx] = doc;
    }

    let documents: Vec<ProcessedDocument> = slots.into_iter().flatten().collect();
    let cancelled = documents.len() < total;
    if cancelled {
        warn!(
            "Batch cancelled: {} of {} documents processed",
            documents.len(),
            total
        );
    }

    let output = aggregate(documents, total, cancelled);

    if let Some(cb) = callback {
        cb.on_batch_complete(
            total,
            output.stats.processed_documents,
            output.stats.succeeded,
        );
    }
    info!(
        "Batch done: {} succeeded, {} failed",
        output.stats.succeeded, output.stats.failed
    );
    output
}

/// Build summary rows and totals from ordered documents.
pub fn aggregate(
    documents: Vec<ProcessedDocument>,
    total_documents: usize,
    cancelled: bool,
) -> BatchOutput {
    let summary: Vec<SummaryRow> = documents
        .iter()
        .map(|d| SummaryRow::from(&d.outcome))
        .collect();

    let succeeded = documents.iter().filter(|d| d.outcome.is_success()).count();
    let stats = BatchStats {
        total_documents,
        processed_documents: documents.len(),
        succeeded,
        failed: documents.len() - succeeded,
        total_input_tokens: documents.iter().map(|d| d.input_tokens).sum(),
        total_output_tokens: documents.iter().map(|d| d.output_tokens).sum(),
        total_duration_ms: documents.iter().map(|d| d.duration_ms).sum(),
        cancelled,
    };

    BatchOutput {
        documents,
        summary,
        stats,
    }
}
