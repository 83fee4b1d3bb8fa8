//! Input discovery: turn a user-supplied path into an ordered list of PDFs.
//!
//! A directory yields every regular `.pdf` file directly inside it (extension
//! matched case-insensitively), sorted by file name so runs are reproducible.
//! A single file path yields just that file.

use crate::error::InvoiceError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One document queued for extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDocument {
    /// File name as it appears in the summary (`invoice_01.pdf`).
    pub filename: String,
    pub path: PathBuf,
}

impl InputDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { filename, path }
    }
}

/// `true` when the path has a `.pdf` extension in any letter case.
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// List the documents to process under `input`.
///
/// # Errors
/// * [`InvoiceError::InputNotFound`] when `input` does not exist.
/// * [`InvoiceError::PermissionDenied`] when it cannot be read.
pub fn discover_documents(input: &Path) -> Result<Vec<InputDocument>, InvoiceError> {
    let meta = fs::metadata(input).map_err(|e| io_to_input_error(input, e.kind()))?;

    if meta.is_file() {
        fs::File::open(input).map_err(|e| io_to_input_error(input, e.kind()))?;
        debug!("Single input file: {}", input.display());
        return Ok(vec![InputDocument::new(input)]);
    }

    let entries = fs::read_dir(input).map_err(|e| io_to_input_error(input, e.kind()))?;

    let mut documents = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_to_input_error(input, e.kind()))?;
        let path = entry.path();
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false)
            || fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false);
        if is_file && is_pdf(&path) {
            documents.push(InputDocument::new(path));
        }
    }
    documents.sort_by(|a, b| a.filename.cmp(&b.filename));

    info!("Found {} PDF files in {}", documents.len(), input.display());
    Ok(documents)
}

fn io_to_input_error(path: &Path, kind: ErrorKind) -> InvoiceError {
    match kind {
        ErrorKind::PermissionDenied => InvoiceError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => InvoiceError::InputNotFound {
            path: path.to_path_buf(),
        },
    }
}
