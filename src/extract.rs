//! Entry points: directory in, artifacts out.
//!
//! [`extract_directory`] is the primary API. It discovers the PDFs, builds
//! the production processor, runs the batch and writes the outputs. The
//! other functions expose the same pipeline in smaller pieces.

use crate::batch::{aggregate, run_batch};
use crate::config::ExtractionConfig;
use crate::error::InvoiceError;
use crate::output::{BatchOutput, ProcessedDocument};
use crate::pipeline::input::{discover_documents, InputDocument};
use crate::process::DocumentProcessor;
use crate::sink::write_outputs;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Extract every PDF in `input` and write the results to `output_dir`.
///
/// # Returns
/// `Ok(BatchOutput)` whenever the input was readable and the outputs were
/// written, even if every document failed (see `output.stats.failed`).
///
/// # Errors
/// Only fatal conditions:
/// - input missing or unreadable
/// - output directory cannot be created or written
/// - no LLM provider could be configured
///
/// # Example
/// ```rust,no_run
/// use edgequake_invoice::{extract_directory, ExtractionConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ExtractionConfig::default();
///     let output = extract_directory("invoices/", "extracted_data", &config).await?;
///     eprintln!("{} ok / {} failed", output.stats.succeeded, output.stats.failed);
///     Ok(())
/// }
/// ```
pub async fn extract_directory(
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<BatchOutput, InvoiceError> {
    let input = input.as_ref();
    let output_dir = output_dir.as_ref();

    let documents = discover_documents(input)?;
    prepare_output_dir(output_dir)?;

    if documents.is_empty() {
        info!("No PDF files found in {}", input.display());
        return write_in_background(output_dir, aggregate(Vec::new(), 0, false)).await;
    }

    let processor = DocumentProcessor::from_config(config)?;
    run_and_write(&processor, input, &documents, output_dir, config).await
}

/// Like [`extract_directory`], with a caller-supplied processor.
pub async fn extract_directory_with(
    processor: &DocumentProcessor,
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<BatchOutput, InvoiceError> {
    let input = input.as_ref();
    let output_dir = output_dir.as_ref();

    let documents = discover_documents(input)?;
    prepare_output_dir(output_dir)?;
    run_and_write(processor, input, &documents, output_dir, config).await
}

async fn run_and_write(
    processor: &DocumentProcessor,
    input: &Path,
    documents: &[InputDocument],
    output_dir: &Path,
    config: &ExtractionConfig,
) -> Result<BatchOutput, InvoiceError> {
    let start = Instant::now();
    let output = run_batch(processor, documents, config).await;
    let output = write_in_background(output_dir, output).await?;

    info!(
        "Extracted {} documents from {} in {}ms",
        output.stats.processed_documents,
        input.display(),
        start.elapsed().as_millis()
    );
    Ok(output)
}

/// Run a batch over `documents` without writing anything.
pub async fn extract_documents(
    documents: &[InputDocument],
    config: &ExtractionConfig,
) -> Result<BatchOutput, InvoiceError> {
    let processor = DocumentProcessor::from_config(config)?;
    Ok(run_batch(&processor, documents, config).await)
}

/// Extract a single PDF.
pub async fn extract_file(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ProcessedDocument, InvoiceError> {
    let path = path.as_ref();
    let document = discover_documents(path)?
        .into_iter()
        .next()
        .ok_or_else(|| InvoiceError::InputNotFound {
            path: path.to_path_buf(),
        })?;
    let processor = DocumentProcessor::from_config(config)?;
    Ok(processor.process(&document.filename, &document.path).await)
}

/// Synchronous wrapper around [`extract_directory`].
///
/// Creates its own Tokio runtime. Do not call from within an async context.
pub fn extract_directory_sync(
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<BatchOutput, InvoiceError> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| InvoiceError::Internal(format!("Failed to create runtime: {}", e)))?;
    rt.block_on(extract_directory(input, output_dir, config))
}

fn prepare_output_dir(output_dir: &Path) -> Result<(), InvoiceError> {
    fs::create_dir_all(output_dir).map_err(|source| InvoiceError::OutputWriteFailed {
        path: output_dir.to_path_buf(),
        source,
    })
}

/// File I/O runs on the blocking pool; the output is handed back afterwards.
async fn write_in_background(
    output_dir: &Path,
    output: BatchOutput,
) -> Result<BatchOutput, InvoiceError> {
    let dir: PathBuf = output_dir.to_path_buf();
    tokio::task::spawn_blocking(move || write_outputs(&dir, &output).map(|_| output))
        .await
        .map_err(|e| InvoiceError::Internal(format!("Output task panicked: {}", e)))?
}
