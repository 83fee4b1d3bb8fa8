//! Progress-callback trait for per-document batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the batch processes each document.
//!
//! # Example
//!
//! ```rust
//! use edgequake_invoice::{BatchProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, index: usize, total: usize, filename: &str) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{}/{}] {}", index + 1, total, filename);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::DocumentErrorKind;
use std::sync::Arc;

/// Called by the batch aggregator as it processes each document.
///
/// With `concurrency > 1` the per-document methods may be called
/// concurrently and out of input order. Implementations must protect shared
/// mutable state (e.g. `Mutex`, `AtomicUsize`). All methods default to
/// no-ops.
///
/// `index` is the 0-based position of the document in the input order.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any document starts.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called just before a document is rendered.
    fn on_document_start(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// Called when a document produced a record.
    fn on_document_complete(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// Called when a document failed.
    fn on_document_error(
        &self,
        index: usize,
        total: usize,
        filename: &str,
        kind: DocumentErrorKind,
        message: &str,
    ) {
        let _ = (index, total, filename, kind, message);
    }

    /// Called once after every started document has finished.
    ///
    /// `processed` is less than `total_documents` only when the batch was
    /// cancelled.
    fn on_batch_complete(&self, total_documents: usize, processed: usize, succeeded: usize) {
        let _ = (total_documents, processed, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: Mutex<Vec<(String, DocumentErrorKind)>>,
        succeeded: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_document_start(&self, _index: usize, _total: usize, _filename: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _index: usize, _total: usize, _filename: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_error(
            &self,
            _index: usize,
            _total: usize,
            filename: &str,
            kind: DocumentErrorKind,
            _message: &str,
        ) {
            self.errors.lock().unwrap().push((filename.to_string(), kind));
        }

        fn on_batch_complete(&self, _total: usize, _processed: usize, succeeded: usize) {
            self.succeeded.store(succeeded, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_document_start(0, 2, "a.pdf");
        cb.on_document_complete(0, 2, "a.pdf");
        cb.on_document_error(1, 2, "b.pdf", DocumentErrorKind::RenderFailed, "bad xref");
        cb.on_batch_complete(2, 2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_document_start(0, 2, "a.pdf");
        tracker.on_document_complete(0, 2, "a.pdf");
        tracker.on_document_start(1, 2, "b.pdf");
        tracker.on_document_error(1, 2, "b.pdf", DocumentErrorKind::MalformedResponse, "x");
        tracker.on_batch_complete(2, 2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(
            *tracker.errors.lock().unwrap(),
            vec![("b.pdf".to_string(), DocumentErrorKind::MalformedResponse)]
        );
        assert_eq!(tracker.succeeded.load(Ordering::SeqCst), 1);
    }
}
