//! Batch-level integration tests with a scripted renderer and model client.
//!
//! No pdfium and no network: every "PDF" in these tests is a text file whose
//! content tells the fakes what to do.
//!
//! Renderer script (whole file content):
//!   `EMPTY`    → zero pages
//!   `CORRUPT`  → unreadable document
//!   otherwise  → one page per `\n---\n`-separated chunk
//!
//! Model script (the page content it receives):
//!   `FAIL`        → request error
//!   `GARBAGE`     → prose answer with no JSON
//!   `PANIC`       → the client panics
//!   `DELAY=<ms>;` → sleep, then interpret the rest
//!   otherwise     → the content is returned as the answer

use async_trait::async_trait;
use edgequake_invoice::{
    extract_directory, extract_directory_with, run_batch, BatchProgressCallback, CancelToken,
    CompletionSettings, DocumentErrorKind, DocumentProcessor, DocumentRenderer,
    ExtractionConfig, ExtractionStrategy, ImageData, InputDocument, InvoiceError, ModelClient,
    ModelError, ModelResponse, Outcome, RenderError, RowStatus, SUMMARY_COLUMNS,
    SUMMARY_FILENAME,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ── Fakes ────────────────────────────────────────────────────────────────────

struct ScriptedRenderer;

impl DocumentRenderer for ScriptedRenderer {
    fn render(&self, path: &Path) -> Result<Vec<ImageData>, RenderError> {
        let content = fs::read_to_string(path).map_err(|e| RenderError::Unreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        match content.as_str() {
            "EMPTY" => Ok(Vec::new()),
            "CORRUPT" => Err(RenderError::Unreadable {
                path: path.to_path_buf(),
                detail: "xref table damaged".into(),
            }),
            _ => Ok(content
                .split("\n---\n")
                .map(|page| ImageData::new(page.to_string(), "image/png"))
                .collect()),
        }
    }
}

struct ScriptedClient;

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn complete(
        &self,
        images: &[ImageData],
        _instructions: &str,
        _settings: &CompletionSettings,
    ) -> Result<ModelResponse, ModelError> {
        let mut script = images.first().map(|i| i.data.clone()).unwrap_or_default();

        if let Some(rest) = script.strip_prefix("DELAY=") {
            let (ms, tail) = rest.split_once(';').unwrap();
            tokio::time::sleep(Duration::from_millis(ms.parse().unwrap())).await;
            script = tail.to_string();
        }

        match script.as_str() {
            "FAIL" => Err(ModelError::RequestFailed {
                retries: 3,
                detail: "HTTP 503".into(),
            }),
            "GARBAGE" => Ok(response("I'm sorry, I can't read that invoice.")),
            "PANIC" => panic!("client blew up"),
            answer => Ok(response(answer)),
        }
    }
}

fn response(text: &str) -> ModelResponse {
    ModelResponse {
        text: text.to_string(),
        input_tokens: 100,
        output_tokens: 20,
    }
}

fn processor(config: &ExtractionConfig) -> DocumentProcessor {
    DocumentProcessor::new(Arc::new(ScriptedRenderer), Arc::new(ScriptedClient), config)
}

fn invoice_json(number: &str) -> String {
    format!(r#"{{"invoiceNumber": "{number}", "totalAmount": "$1,234.56", "vendorName": "ACME"}}"#)
}

fn write_docs(dir: &Path, docs: &[(&str, String)]) -> Vec<InputDocument> {
    docs.iter()
        .map(|(name, content)| {
            let path = dir.join(name);
            fs::write(&path, content).unwrap();
            InputDocument::new(path)
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn each_failure_kind_is_isolated_to_its_document() {
    let cases = [
        ("EMPTY", DocumentErrorKind::EmptyDocument),
        ("CORRUPT", DocumentErrorKind::RenderFailed),
        ("FAIL", DocumentErrorKind::ModelRequestFailed),
        ("PANIC", DocumentErrorKind::ModelRequestFailed),
        ("GARBAGE", DocumentErrorKind::MalformedResponse),
    ];
    let config = ExtractionConfig::builder().concurrency(2).build().unwrap();
    let processor = processor(&config);

    for (k, (script, kind)) in cases.iter().enumerate() {
        let tmp = TempDir::new().unwrap();
        let docs: Vec<(String, String)> = (0..5)
            .map(|i| {
                let content = if i == k {
                    script.to_string()
                } else {
                    invoice_json(&format!("INV-{i}"))
                };
                (format!("doc_{i}.pdf"), content)
            })
            .collect();
        let docs: Vec<(&str, String)> = docs.iter().map(|(n, c)| (n.as_str(), c.clone())).collect();
        let inputs = write_docs(tmp.path(), &docs);

        let out = run_batch(&processor, &inputs, &config).await;

        assert_eq!(out.summary.len(), 5, "case {script}");
        for (i, row) in out.summary.iter().enumerate() {
            if i == k {
                assert_eq!(row.status, RowStatus::Error, "case {script}");
                assert!(row.invoice_number.is_none());
                assert!(row.error.as_deref().unwrap().starts_with(kind.as_str()));
                assert_eq!(out.documents[i].outcome.error_kind(), Some(*kind));
            } else {
                assert_eq!(row.status, RowStatus::Success, "case {script} row {i}");
                assert_eq!(row.total_amount, Some(1234.56));
            }
        }
        assert_eq!(out.stats.succeeded, 4);
        assert_eq!(out.stats.failed, 1);
    }
}

#[tokio::test]
async fn malformed_response_keeps_raw_text_in_detail() {
    let tmp = TempDir::new().unwrap();
    let inputs = write_docs(tmp.path(), &[("x.pdf", "GARBAGE".to_string())]);
    let config = ExtractionConfig::default();
    let out = run_batch(&processor(&config), &inputs, &config).await;

    match &out.documents[0].outcome {
        Outcome::Failure {
            error_kind,
            message,
            raw_response,
            ..
        } => {
            assert_eq!(*error_kind, DocumentErrorKind::MalformedResponse);
            assert!(message.starts_with("unparseable: I'm sorry"));
            assert_eq!(
                raw_response.as_deref(),
                Some("I'm sorry, I can't read that invoice.")
            );
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rows_follow_input_order_not_completion_order() {
    let tmp = TempDir::new().unwrap();
    // Created b, a, c; a finishes last, c first.
    write_docs(
        tmp.path(),
        &[
            ("b.pdf", format!("DELAY=150;{}", invoice_json("B"))),
            ("a.pdf", format!("DELAY=300;{}", invoice_json("A"))),
            ("c.pdf", format!("DELAY=0;{}", invoice_json("C"))),
        ],
    );
    let out_dir = tmp.path().join("out");
    let config = ExtractionConfig::builder().concurrency(3).build().unwrap();

    let out = extract_directory_with(&processor(&config), tmp.path(), &out_dir, &config)
        .await
        .unwrap();

    let names: Vec<&str> = out.summary.iter().map(|r| r.filename.as_str()).collect();
    assert_eq!(names, ["a.pdf", "b.pdf", "c.pdf"]);
    let numbers: Vec<_> = out
        .summary
        .iter()
        .map(|r| r.invoice_number.clone().unwrap())
        .collect();
    assert_eq!(numbers, ["A", "B", "C"]);
}

#[tokio::test]
async fn sequential_and_parallel_runs_agree() {
    let tmp = TempDir::new().unwrap();
    let inputs = write_docs(
        tmp.path(),
        &[
            ("1.pdf", invoice_json("ONE")),
            ("2.pdf", "FAIL".to_string()),
            ("3.pdf", format!("DELAY=20;{}", invoice_json("THREE"))),
        ],
    );
    let seq = ExtractionConfig::builder().concurrency(1).build().unwrap();
    let par = ExtractionConfig::builder().concurrency(8).build().unwrap();

    let a = run_batch(&processor(&seq), &inputs, &seq).await;
    let b = run_batch(&processor(&par), &inputs, &par).await;
    assert_eq!(a.summary, b.summary);
}

#[tokio::test]
async fn writes_json_details_and_csv_summary() {
    let tmp = TempDir::new().unwrap();
    let in_dir = tmp.path().join("in");
    fs::create_dir(&in_dir).unwrap();
    write_docs(
        &in_dir,
        &[
            ("good.pdf", invoice_json("INV-9")),
            ("bad.pdf", "CORRUPT".to_string()),
            ("notes.txt", "ignored".to_string()),
        ],
    );
    let out_dir = tmp.path().join("extracted_data");
    let config = ExtractionConfig::default();

    let out = extract_directory_with(&processor(&config), &in_dir, &out_dir, &config)
        .await
        .unwrap();
    assert_eq!(out.stats.total_documents, 2);

    let csv = fs::read_to_string(out_dir.join(SUMMARY_FILENAME)).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], SUMMARY_COLUMNS.join(","));
    assert!(lines[1].starts_with("bad.pdf,error,"));
    assert!(lines[1].contains(",RenderFailed: cannot open"), "got {}", lines[1]);
    assert!(lines[1].ends_with("xref table damaged"), "got {}", lines[1]);
    assert!(lines[2].starts_with("good.pdf,success,INV-9,"));

    let good: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join("good.json")).unwrap()).unwrap();
    assert_eq!(good["status"], "success");
    assert_eq!(good["record"]["totalAmount"], 1234.56);
    assert!(good["record"]["dueDate"].is_null());
    assert_eq!(good["pages"], 1);

    let bad: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join("bad.json")).unwrap()).unwrap();
    assert_eq!(bad["errorKind"], "RenderFailed");
}

struct CancelOnFirstStart(CancelToken);

impl BatchProgressCallback for CancelOnFirstStart {
    fn on_document_start(&self, _index: usize, _total: usize, _filename: &str) {
        self.0.cancel();
    }
}

#[tokio::test]
async fn cancellation_omits_unstarted_documents() {
    let tmp = TempDir::new().unwrap();
    let inputs = write_docs(
        tmp.path(),
        &[
            ("a.pdf", invoice_json("A")),
            ("b.pdf", invoice_json("B")),
            ("c.pdf", invoice_json("C")),
        ],
    );
    let token = CancelToken::new();
    let config = ExtractionConfig::builder()
        .concurrency(1)
        .cancel_token(token.clone())
        .progress_callback(Arc::new(CancelOnFirstStart(token)))
        .build()
        .unwrap();

    let out = run_batch(&processor(&config), &inputs, &config).await;

    assert_eq!(out.summary.len(), 1);
    assert_eq!(out.summary[0].filename, "a.pdf");
    assert_eq!(out.summary[0].status, RowStatus::Success);
    assert!(out.stats.cancelled);
    assert_eq!(out.stats.total_documents, 3);
    assert_eq!(out.stats.processed_documents, 1);
}

#[tokio::test]
async fn per_page_strategy_stitches_pages() {
    let tmp = TempDir::new().unwrap();
    let pages = [
        r#"{"status": {"is_start_of_invoice": true}, "data": {"invoiceNumber": "MP-1", "lineItems": [{"description": "Design"}]}}"#,
        r#"{"status": {"is_continuation": true}, "data": {"lineItems": [{"description": "Build"}]}}"#,
        r#"{"status": {"is_blank_or_misc": true}, "data": {}}"#,
        r#"{"status": {"is_continuation": true, "is_end_of_invoice": true}, "data": {"totalAmount": 900, "lineItems": [{"description": "Deploy"}]}}"#,
    ]
    .join("\n---\n");
    let inputs = write_docs(tmp.path(), &[("multi.pdf", pages)]);
    let config = ExtractionConfig::builder()
        .strategy(ExtractionStrategy::PerPage)
        .build()
        .unwrap();

    let out = run_batch(&processor(&config), &inputs, &config).await;

    let doc = &out.documents[0];
    assert_eq!(doc.pages, 4);
    assert_eq!(doc.input_tokens, 400);
    let record = doc.outcome.record().unwrap();
    assert_eq!(record.invoice_number.as_deref(), Some("MP-1"));
    assert_eq!(record.total_amount, Some(900.0));
    assert_eq!(record.line_items_count, Some(3));
    assert_eq!(
        record.line_items_summary.as_deref(),
        Some("Design, Build, Deploy")
    );
}

#[tokio::test]
async fn empty_directory_writes_header_only_summary() {
    let tmp = TempDir::new().unwrap();
    let in_dir = tmp.path().join("empty");
    fs::create_dir(&in_dir).unwrap();
    let out_dir = tmp.path().join("out");

    // No documents means no provider is needed.
    let out = extract_directory(&in_dir, &out_dir, &ExtractionConfig::default())
        .await
        .unwrap();

    assert!(out.summary.is_empty());
    let csv = fs::read_to_string(out_dir.join(SUMMARY_FILENAME)).unwrap();
    assert_eq!(csv.trim_end(), SUMMARY_COLUMNS.join(","));
}

#[tokio::test]
async fn missing_input_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let config = ExtractionConfig::default();
    let err = extract_directory_with(
        &processor(&config),
        tmp.path().join("nope"),
        tmp.path().join("out"),
        &config,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, InvoiceError::InputNotFound { .. }));
}
