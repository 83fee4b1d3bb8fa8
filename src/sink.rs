//! Output sink: persist a [`BatchOutput`] to a directory.
//!
//! Writes one pretty-printed `<stem>.json` per document and
//! `invoices_summary.csv`. Every file is written to a temp file in the
//! destination directory and then renamed into place, so a crash never
//! leaves a half-written artifact behind.

use crate::error::InvoiceError;
use crate::output::{BatchOutput, SummaryRow, SUMMARY_COLUMNS};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// File name of the summary table inside the output directory.
pub const SUMMARY_FILENAME: &str = "invoices_summary.csv";

/// Paths of everything [`write_outputs`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenOutputs {
    pub summary_csv: PathBuf,
    /// One detail file per document, in input order.
    pub details: Vec<PathBuf>,
}

/// Create `output_dir` if needed and write every artifact into it.
///
/// # Errors
/// [`InvoiceError::OutputWriteFailed`] when the directory cannot be created or
/// any file cannot be written.
pub fn write_outputs(output_dir: &Path, output: &BatchOutput) -> Result<WrittenOutputs, InvoiceError> {
    fs::create_dir_all(output_dir).map_err(|source| InvoiceError::OutputWriteFailed {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let mut used = HashSet::new();
    let mut details = Vec::with_capacity(output.documents.len());
    for doc in &output.documents {
        let name = detail_filename(doc.outcome.filename(), &mut used);
        let path = output_dir.join(name);
        let json = serde_json::to_vec_pretty(doc)
            .map_err(|e| write_failed(&path, io::Error::other(e)))?;
        write_atomic(&path, &json)?;
        debug!("Wrote {}", path.display());
        details.push(path);
    }

    let summary_csv = output_dir.join(SUMMARY_FILENAME);
    let mut buf = Vec::new();
    write_summary_csv(&mut buf, &output.summary).map_err(|e| write_failed(&summary_csv, e))?;
    write_atomic(&summary_csv, &buf)?;

    info!(
        "Wrote {} detail files and {}",
        details.len(),
        summary_csv.display()
    );
    Ok(WrittenOutputs {
        summary_csv,
        details,
    })
}

/// Write the summary table: the fixed header row, then one row per document.
///
/// The header is always written, so an empty batch yields a header-only file.
pub fn write_summary_csv<W: Write>(writer: W, rows: &[SummaryRow]) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(SUMMARY_COLUMNS)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()
}

/// `<stem>.json`, falling back to `<filename>.json` when two inputs share a
/// stem (e.g. `a.pdf` and `a.PDF`), then to `<stem>-2.json`, `<stem>-3.json`...
fn detail_filename(filename: &str, used: &mut HashSet<String>) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());

    let mut candidate = format!("{stem}.json");
    if used.contains(&candidate) {
        candidate = format!("{filename}.json");
    }
    let mut n = 2;
    while used.contains(&candidate) {
        candidate = format!("{stem}-{n}.json");
        n += 1;
    }
    used.insert(candidate.clone());
    candidate
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), InvoiceError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| write_failed(path, e))?;
    tmp.write_all(bytes).map_err(|e| write_failed(path, e))?;
    tmp.as_file().sync_all().map_err(|e| write_failed(path, e))?;
    tmp.persist(path).map_err(|e| write_failed(path, e.error))?;
    Ok(())
}

fn write_failed(path: &Path, source: io::Error) -> InvoiceError {
    InvoiceError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    }
}
