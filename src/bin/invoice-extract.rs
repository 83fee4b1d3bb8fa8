//! CLI binary for edgequake-invoice.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs the batch and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_invoice::{
    extract_directory, BatchOutput, BatchProgressCallback, CancelToken, DocumentErrorKind,
    ExtractionConfig, ExtractionStrategy, ProgressCallback, RowStatus, SUMMARY_FILENAME,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished document. Documents may
/// finish out of order when `--concurrency` > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-document wall-clock start times, keyed by input index.
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} invoices  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_documents} invoices…"))
        ));
    }

    fn on_document_start(&self, index: usize, _total: usize, filename: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(filename.to_string());
    }

    fn on_document_complete(&self, index: usize, total: usize, filename: &str) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index + 1,
            total,
            filename,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(
        &self,
        index: usize,
        total: usize,
        filename: &str,
        kind: DocumentErrorKind,
        message: &str,
    ) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Keep one line per document.
        let mut msg: String = message.lines().next().unwrap_or("").chars().take(79).collect();
        if msg.len() < message.len() {
            msg.push('\u{2026}');
        }

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index + 1,
            total,
            filename,
            red(&format!("{kind}: {msg}")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, processed: usize, succeeded: usize) {
        self.bar.finish_and_clear();
        let failed = processed.saturating_sub(succeeded);

        if processed < total_documents {
            eprintln!(
                "{} cancelled after {}/{} invoices",
                cyan("⚠"),
                bold(&processed.to_string()),
                total_documents
            );
        }
        if failed == 0 {
            eprintln!(
                "{} {} invoices extracted successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} invoices extracted  ({} failed)",
                if succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                processed,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract every PDF in ./invoices into ./extracted_data
  invoice-extract invoices

  # Custom output directory and a specific model
  invoice-extract invoices -o out --provider openai --model gpt-4o

  # Long multi-page invoices: one model call per page
  invoice-extract --per-page scans

  # Four documents at a time, machine-readable result on stdout
  invoice-extract --concurrency 4 --json invoices > batch.json

OUTPUT:
  <output>/<stem>.json           one detailed record per input PDF
  <output>/invoices_summary.csv  one row per input PDF, fixed columns:
      filename, status, invoiceNumber, invoiceDate, vendorName, customerName,
      totalAmount, subtotal, tax, dueDate, lineItemsCount, lineItemsSummary, error

  A failed document becomes an `error` row; the exit status is non-zero only
  when the input cannot be read or the output cannot be written.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium (skips auto-download)
  INVOICE_EXTRACT_*       Any flag below, e.g. INVOICE_EXTRACT_CONCURRENCY=8

  A `.env` file in the working directory is loaded first.
"#;

#[derive(Parser, Debug)]
#[command(
    name = "invoice-extract",
    version,
    about = "Extract structured invoice data from a folder of PDFs using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory of PDF invoices (or a single PDF).
    #[arg(env = "INVOICE_EXTRACT_INPUT")]
    input: PathBuf,

    /// Output directory for the JSON records and the CSV summary.
    #[arg(short, long, env = "INVOICE_EXTRACT_OUTPUT", default_value = "extracted_data")]
    output: PathBuf,

    /// Vision model (default: gpt-4o when an OpenAI key is present).
    #[arg(long, env = "INVOICE_EXTRACT_MODEL")]
    model: Option<String>,

    /// LLM provider. Auto-detected from API key env vars if not set.
    #[arg(long, env = "INVOICE_EXTRACT_PROVIDER")]
    provider: Option<String>,

    /// Documents processed at the same time.
    #[arg(short, long, env = "INVOICE_EXTRACT_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Rendering resolution.
    #[arg(long, env = "INVOICE_EXTRACT_DPI", default_value_t = 144,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Longest rendered edge in pixels.
    #[arg(long, env = "INVOICE_EXTRACT_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    #[arg(long, env = "INVOICE_EXTRACT_MAX_TOKENS", default_value_t = 1000)]
    max_tokens: usize,

    #[arg(long, env = "INVOICE_EXTRACT_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    #[arg(long, env = "INVOICE_EXTRACT_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "INVOICE_EXTRACT_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Send pages one at a time and stitch the answers together.
    #[arg(long, env = "INVOICE_EXTRACT_PER_PAGE")]
    per_page: bool,

    /// Password for encrypted PDFs.
    #[arg(long, env = "INVOICE_EXTRACT_PASSWORD")]
    password: Option<String>,

    /// File whose contents replace the built-in extraction instructions.
    #[arg(long, env = "INVOICE_EXTRACT_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Print the full batch result as JSON on stdout.
    #[arg(long, env = "INVOICE_EXTRACT_JSON")]
    json: bool,

    #[arg(long, env = "INVOICE_EXTRACT_NO_PROGRESS")]
    no_progress: bool,

    #[arg(short, long, env = "INVOICE_EXTRACT_VERBOSE")]
    verbose: bool,

    #[arg(short, long, env = "INVOICE_EXTRACT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar gives all the feedback that matters, so library INFO
    // logs are suppressed while it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Ensure PDFium engine is available ────────────────────────────────
    if !pdfium_auto::is_pdfium_cached() {
        if !cli.quiet {
            let dl_bar = ProgressBar::new(0);
            dl_bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} {prefix:.bold}  \
                     [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(TICKS),
            );
            dl_bar.set_prefix("PDF engine");
            dl_bar.enable_steady_tick(Duration::from_millis(80));

            let bar = dl_bar.clone();
            tokio::task::block_in_place(|| {
                pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
                    if let Some(t) = total {
                        if bar.length().unwrap_or(0) != t {
                            bar.set_length(t);
                        }
                    }
                    bar.set_position(downloaded);
                }))
            })
            .context("Failed to download PDFium engine")?;

            dl_bar.finish_with_message("ready ✓");
        } else {
            tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
                .context("Failed to download PDFium engine")?;
        }
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let cancel = CancelToken::new();
    let config = build_config(&cli, progress_cb, cancel.clone()).await?;

    // Ctrl-C stops new documents from starting; in-flight ones finish.
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} interrupt received, finishing in-flight invoices…", cyan("⚠"));
            cancel.cancel();
        }
    });

    // ── Run extraction ───────────────────────────────────────────────────
    let output = extract_directory(&cli.input, &cli.output, &config)
        .await
        .with_context(|| format!("Extraction of {} failed", cli.input.display()))?;
    ctrl_c.abort();

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }

    if !cli.quiet {
        print_summary(&cli, &output, show_progress);
    }

    Ok(())
}

fn print_summary(cli: &Cli, output: &BatchOutput, show_progress: bool) {
    let stats = &output.stats;
    if !show_progress {
        eprintln!(
            "Extracted {}/{} invoices in {}ms ({} failed)",
            stats.succeeded, stats.total_documents, stats.total_duration_ms, stats.failed
        );
        for row in output.summary.iter().filter(|r| r.status == RowStatus::Error) {
            eprintln!(
                "  {} {}: {}",
                red("✗"),
                row.filename,
                row.error.as_deref().unwrap_or("")
            );
        }
    }
    eprintln!(
        "{}  {}",
        if stats.failed == 0 { green("✔") } else { cyan("⚠") },
        bold(&cli.output.join(SUMMARY_FILENAME).display().to_string()),
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
    );
}

async fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    cancel: CancelToken,
) -> Result<ExtractionConfig> {
    let instructions = if let Some(ref path) = cli.prompt_file {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let strategy = if cli.per_page {
        ExtractionStrategy::PerPage
    } else {
        ExtractionStrategy::WholeDocument
    };

    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .max_rendered_pixels(cli.max_pixels)
        .concurrency(cli.concurrency)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .strategy(strategy)
        .cancel_token(cancel);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(prompt) = instructions {
        builder = builder.instructions(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
