//! CLI binary for edgequake-ocr-relay.
//!
//! A thin shim over the library crate: `serve` runs the HTTP relay, `submit`
//! and `estimate` act as a client of a running relay, `process` runs the
//! pipeline in-process, and `key` manages the stored credential.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgequake_ocr_relay::client::estimate::format_money;
use edgequake_ocr_relay::client::{
    AccessMode, ClientConfig, CredentialStore, FileEstimate, Orchestrator, PreviewMode,
    PreviewState, ProgressFrame, ProgressPlan, RateSource, SubmissionOutcome,
};
use edgequake_ocr_relay::config::redact_key;
use edgequake_ocr_relay::{
    process_upload, serve, AnnotationLocale, MarkdownEnvelope, PageSeparator, ProviderClient,
    RelayConfig, RelayState, Stage, StageProgressCallback, UploadRequest,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

/// Terminal stage callback for in-process runs: one bar with three steps and
/// a log line per finished stage.
struct CliStageCallback {
    bar: ProgressBar,
}

impl CliStageCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(Stage::ALL.len() as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:30.green/238}] {pos}/{len}  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Relaying");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl StageProgressCallback for CliStageCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage, duration_ms: u64) {
        self.bar.println(format!(
            "  {} Step {}/3  {:<12}  {}",
            green("✓"),
            stage.step(),
            stage.to_string(),
            dim(&format!("{:.1}s", duration_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_stage_failed(&self, stage: Stage, error: &str) {
        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Step {}/3  {:<12}  {}",
            red("✗"),
            stage.step(),
            stage.to_string(),
            red(&msg),
        ));
        self.bar.abandon();
    }

    fn on_pipeline_complete(&self, pages: usize, total_ms: u64) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages recognised in {}ms",
            green("✔"),
            bold(&pages.to_string()),
            total_ms
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the relay (clients send their own key in X-API-Key)
  ocr-relay serve --bind 0.0.0.0:8788

  # Run the relay with a server-side fallback key
  MISTRAL_API_KEY=... ocr-relay serve

  # Save your key once, then submit files to the relay
  ocr-relay key set sk-...
  ocr-relay submit invoice.pdf -o invoice.md

  # Try the flow without a key (canned result, nothing is sent)
  ocr-relay submit --test-mode scan.png

  # Price a document before sending it
  ocr-relay estimate thesis.pdf

  # Skip the relay and call the provider directly
  MISTRAL_API_KEY=... ocr-relay process receipt.jpg --json

SUPPORTED FILES:
  PDF, PNG, JPEG, WEBP, BMP, TIFF

PRICING:
  $1.00 per 1000 pages. Images count as one page.
  BRL conversion uses a live rate, falling back to 5.5.

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY          Provider key (server fallback, or for `process`)
  OCR_RELAY_BIND           Listen address for `serve`
  OCR_RELAY_API_BASE       Provider base URL (default https://api.mistral.ai/v1)
  OCR_RELAY_MODEL          OCR model (default mistral-ocr-latest)
  OCR_RELAY_MAX_UPLOAD_MB  Upload cap in MB (default 50)
  OCR_RELAY_LOCALE         Annotation language: pt-BR or en
  OCR_RELAY_URL            Relay URL for `submit`
  OCR_RELAY_CONFIG_DIR     Where the saved key lives
"#;

/// Relay documents and images to the Mistral OCR API and get Markdown back.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-relay",
    version,
    about = "Relay documents and images to the Mistral OCR API and get Markdown back",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OCR_RELAY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OCR_RELAY_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP relay.
    Serve(ServeArgs),
    /// Send a file to a running relay.
    Submit(SubmitArgs),
    /// Show the page count and price of a file.
    Estimate(EstimateArgs),
    /// Run the three provider stages in-process, without a relay.
    Process(ProcessArgs),
    /// Manage the stored API key.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
}

/// Provider-facing options shared by `serve` and `process`.
#[derive(clap::Args, Debug)]
struct ProviderArgs {
    /// Provider API base URL.
    #[arg(long, env = "OCR_RELAY_API_BASE")]
    api_base: Option<String>,

    /// OCR model ID.
    #[arg(long, env = "OCR_RELAY_MODEL")]
    model: Option<String>,

    /// Maximum upload size in MB.
    #[arg(long, env = "OCR_RELAY_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,

    /// Annotation language and page-header locale: pt-BR or en.
    #[arg(long, env = "OCR_RELAY_LOCALE", default_value = "pt-BR")]
    locale: String,

    /// Page separator: none, hr, comment, or custom string.
    #[arg(long, env = "OCR_RELAY_SEPARATOR", default_value = "hr")]
    separator: String,

    /// Skip structured image annotations.
    #[arg(long)]
    no_annotations: bool,

    /// Per-request provider timeout in seconds (default: none).
    #[arg(long, env = "OCR_RELAY_TIMEOUT")]
    timeout: Option<u64>,
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "OCR_RELAY_BIND", default_value = "0.0.0.0:8788")]
    bind: SocketAddr,

    /// Fallback key used when a request has no X-API-Key header.
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(flatten)]
    provider: ProviderArgs,
}

/// Client options shared by `submit` and `estimate`.
#[derive(clap::Args, Debug)]
struct ClientArgs {
    /// Relay base URL.
    #[arg(long, env = "OCR_RELAY_URL", default_value = "http://127.0.0.1:8788")]
    relay_url: String,

    /// Exchange-rate endpoint returning {"rates": {"BRL": …}}.
    #[arg(long, env = "OCR_RELAY_RATE_URL")]
    rate_url: Option<String>,
}

#[derive(clap::Args, Debug)]
struct SubmitArgs {
    /// File to process (PDF, PNG, JPEG, WEBP, BMP, TIFF).
    file: PathBuf,

    #[command(flatten)]
    client: ClientArgs,

    /// Use this key instead of the stored one.
    #[arg(long, hide_env_values = true)]
    api_key: Option<String>,

    /// Store --api-key for later runs.
    #[arg(long, requires = "api_key")]
    save_key: bool,

    /// Return a canned result without contacting the relay. Clears the stored key.
    #[arg(long, conflicts_with_all = ["api_key", "save_key"])]
    test_mode: bool,

    /// Print the Markdown as-is instead of styling it.
    #[arg(long)]
    raw: bool,

    /// Print the whole response envelope as JSON.
    #[arg(long)]
    json: bool,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct EstimateArgs {
    /// File to price.
    file: PathBuf,

    #[command(flatten)]
    client: ClientArgs,

    /// Print the estimate as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct ProcessArgs {
    /// File to process.
    file: PathBuf,

    /// Provider key.
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(flatten)]
    provider: ProviderArgs,

    /// Print the whole response envelope as JSON.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum KeyAction {
    /// Show the stored key (redacted) and where it lives.
    Show,
    /// Store a key.
    Set { key: String },
    /// Delete the stored key.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The in-process progress bar replaces INFO logs; the server keeps them.
    let bar_active = matches!(&cli.command, Command::Process(a) if !a.no_progress && !a.json);
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || bar_active {
        "error"
    } else {
        match cli.command {
            Command::Serve(_) => "info,tower_http=debug",
            _ => "warn",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Submit(args) => run_submit(args, cli.quiet).await,
        Command::Estimate(args) => run_estimate(args).await,
        Command::Process(args) => run_process(args, cli.quiet).await,
        Command::Key { action } => run_key(action),
    }
}

// ── serve ────────────────────────────────────────────────────────────────────

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = build_relay_config(&args.provider, args.api_key.clone(), None)?;
    eprintln!(
        "{} OCR relay on {}  model {}  max {}MB  fallback key {}",
        cyan("◆"),
        bold(&format!("http://{}", args.bind)),
        config.model,
        config.max_upload_mb(),
        config
            .api_key
            .as_deref()
            .map(redact_key)
            .unwrap_or_else(|| "none".to_string()),
    );
    let state = RelayState::new(config).context("Failed to initialise relay")?;
    serve(args.bind, state).await.context("Relay stopped")?;
    Ok(())
}

// ── submit ───────────────────────────────────────────────────────────────────

async fn run_submit(args: SubmitArgs, quiet: bool) -> Result<()> {
    let store = CredentialStore::default_location();
    let access = AccessMode::resolve(args.api_key.as_deref(), args.test_mode, store.as_ref())
        .context("No way to authenticate")?;

    if args.save_key {
        if let (Some(store), AccessMode::Credential(key)) = (&store, &access) {
            store.save(key).context("Failed to save API key")?;
            if !quiet {
                eprintln!("{} Key saved to {}", green("✔"), store.path().display());
            }
        }
    }
    if access.is_test_mode() && !quiet {
        eprintln!(
            "{} Test mode: nothing will be sent, results are simulated",
            yellow("⚠")
        );
    }

    let orch = Orchestrator::new(client_config(&args.client), access)
        .context("Failed to initialise client")?;

    let outcome = loop {
        let attempt = with_progress(orch.submit(&args.file), quiet || args.json, |r| {
            r.as_ref().ok().map(SubmissionOutcome::progress_plan)
        })
        .await;
        match attempt {
            Ok(outcome) => break outcome,
            Err(e) => {
                eprintln!("{} {}", red("✘"), e);
                if !ask_retry() {
                    return Err(anyhow::Error::new(e).context("Submission failed"));
                }
            }
        }
    };

    if !quiet && !args.json {
        print_estimate(&outcome.estimate);
        if outcome.large_file_notice() {
            eprintln!(
                "{} Large document: processed as a single request, this may take a while",
                yellow("⚠")
            );
        }
        print_timing(&outcome);
    }

    let mode = if args.raw || args.output.is_some() {
        PreviewMode::Raw
    } else {
        PreviewMode::Rendered
    };
    emit(&outcome.envelope, args.json, args.output.as_deref(), mode)?;

    let interactive = io::stdin().is_terminal() && io::stdout().is_terminal();
    if interactive && !quiet && !args.json && args.output.is_none() {
        let mut input = io::stdin().lock();
        preview_toggle_loop(&outcome.envelope.markdown, mode, &mut input, &mut io::stdout())?;
    }
    Ok(())
}

/// Re-render `markdown` each time the user enters `r`; anything else ends.
fn preview_toggle_loop(
    markdown: &str,
    mode: PreviewMode,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<PreviewMode> {
    let mut state = PreviewState::new(mode);
    loop {
        let other = match state.mode() {
            PreviewMode::Rendered => "raw",
            PreviewMode::Raw => "rendered",
        };
        eprint!("{}", dim(&format!("[r] show {other}, Enter to quit: ")));
        io::stderr().flush().ok();

        let mut line = String::new();
        if input.read_line(&mut line).context("Failed to read input")? == 0 {
            return Ok(state.mode());
        }
        if !line.trim().eq_ignore_ascii_case("r") {
            return Ok(state.mode());
        }
        state.toggle();
        let text = state.render(markdown);
        writeln!(out, "{}", text.trim_end()).context("Failed to write to stdout")?;
    }
}

/// Drive the two-step animation while `fut` runs.
///
/// The default plan animates the wait. Once the result is in, `reported`
/// supplies the plan from the real stage timings and the bar plays on
/// until that plan's total has elapsed. A canned test-mode result therefore
/// walks through both steps, while a live run that already took longer
/// finishes at once.
async fn with_progress<F, T, R>(fut: F, hidden: bool, reported: R) -> T
where
    F: std::future::Future<Output = T>,
    R: Fn(&T) -> Option<ProgressPlan>,
{
    if hidden {
        return fut.await;
    }

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  [{bar:30.green/238}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
    );
    bar.enable_steady_tick(Duration::from_millis(80));

    let start = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    tokio::pin!(fut);

    let waiting = ProgressPlan::default();
    let out = loop {
        tokio::select! {
            out = &mut fut => break out,
            _ = ticker.tick() => {
                let frame = waiting.frame_at(start.elapsed().as_millis() as u64);
                // Hold short of 100% until the relay answers.
                show_frame(&bar, &frame, 95.0);
            }
        }
    };

    if let Some(plan) = reported(&out) {
        loop {
            let frame = plan.frame_at(start.elapsed().as_millis() as u64);
            show_frame(&bar, &frame, 100.0);
            if frame.finished {
                break;
            }
            ticker.tick().await;
        }
    }
    bar.finish_and_clear();
    out
}

fn show_frame(bar: &ProgressBar, frame: &ProgressFrame, ceiling: f64) {
    bar.set_prefix(format!("Step {}/2", frame.step.index() + 1));
    bar.set_message(frame.step.label());
    bar.set_position((frame.overall * ceiling) as u64);
}

fn ask_retry() -> bool {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return false;
    }
    eprint!("Try again? [y/N] ");
    io::stderr().flush().ok();
    let mut line = String::new();
    if stdin.lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes" | "s" | "sim")
}

fn print_timing(outcome: &SubmissionOutcome) {
    let t = &outcome.envelope.timing;
    let plan = outcome.progress_plan();
    eprintln!(
        "{}  {} pages  {}ms total  {}",
        if outcome.envelope.is_real {
            green("✔")
        } else {
            yellow("✔")
        },
        outcome.envelope.stats.pages,
        t.total,
        dim(&format!(
            "upload {}ms / url {}ms / ocr {}ms  (step 1 {}ms, step 2 {}ms)",
            t.upload, t.url, t.ocr, plan.upload_ms, plan.ocr_ms
        )),
    );
}

// ── estimate ─────────────────────────────────────────────────────────────────

async fn run_estimate(args: EstimateArgs) -> Result<()> {
    let orch = Orchestrator::new(client_config(&args.client), AccessMode::TestMode)
        .context("Failed to initialise client")?;
    let estimate = orch
        .estimate(&args.file)
        .await
        .with_context(|| format!("Failed to estimate {}", args.file.display()))?;

    if args.json {
        let json = serde_json::json!({
            "file": args.file,
            "fileType": estimate.file_type.to_string(),
            "fileSize": estimate.file_size,
            "cost": estimate.cost.as_ref().ok(),
            "error": estimate.cost.as_ref().err().map(|e| e.to_string()),
            "value": estimate.value,
            "largeFileNotice": estimate.large_file_notice,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise estimate")?
        );
    } else {
        println!("File:         {}", args.file.display());
        println!("Type:         {}", estimate.file_type);
        println!("Size:         {} bytes", estimate.file_size);
        print_estimate(&estimate);
    }
    Ok(())
}

fn print_estimate(estimate: &FileEstimate) {
    match &estimate.cost {
        Ok(cost) => {
            eprintln!(
                "Pages:        {}\nCost:         {}  ({} at {:.2}{})",
                cost.pages,
                bold(&format_money("$", cost.usd)),
                format_money("R$", cost.local_currency),
                cost.exchange_rate,
                match cost.rate_source {
                    RateSource::Live => "",
                    RateSource::Fallback => " fallback",
                },
            );
            if let Some(ref v) = estimate.value {
                eprintln!(
                    "Manual:       ~{} of typing, about {}  {}",
                    v.manual_time_label(),
                    format_money("R$", v.manual_cost),
                    dim(&format!("({} saved)", format_money("R$", v.savings))),
                );
            }
        }
        Err(e) => eprintln!("Cost:         {}", red(&e.to_string())),
    }
    if estimate.large_file_notice {
        eprintln!(
            "{} Over the large-file threshold; the whole file is still sent in one request",
            yellow("⚠")
        );
    }
}

// ── process ──────────────────────────────────────────────────────────────────

async fn run_process(args: ProcessArgs, quiet: bool) -> Result<()> {
    let key = args
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .context("MISTRAL_API_KEY is not set (or pass --api-key)")?;

    let show_progress = !quiet && !args.no_progress && !args.json;
    let callback = show_progress
        .then(|| CliStageCallback::new() as Arc<dyn StageProgressCallback>);
    let config = build_relay_config(&args.provider, None, callback)?;

    let upload = UploadRequest::from_path(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let provider = ProviderClient::new(&config).context("Failed to build provider client")?;

    let envelope = process_upload(&provider, upload, &key, &config)
        .await
        .context("OCR failed")?;

    if !quiet && !show_progress && !args.json {
        eprintln!(
            "Recognised {} pages in {}ms",
            envelope.stats.pages, envelope.timing.total
        );
    }
    emit(&envelope, args.json, args.output.as_deref(), PreviewMode::Raw)
}

// ── key ──────────────────────────────────────────────────────────────────────

fn run_key(action: KeyAction) -> Result<()> {
    let store = CredentialStore::default_location()
        .context("No config directory on this platform; set OCR_RELAY_CONFIG_DIR")?;
    match action {
        KeyAction::Show => match store.load().context("Failed to read stored key")? {
            Some(key) => println!(
                "{}  {}",
                redact_key(&key),
                dim(&store.path().display().to_string())
            ),
            None => println!("No key stored ({})", store.path().display()),
        },
        KeyAction::Set { key } => {
            anyhow::ensure!(!key.trim().is_empty(), "Key must not be empty");
            store.save(&key).context("Failed to save API key")?;
            println!(
                "{} Saved {} to {}",
                green("✔"),
                redact_key(&key),
                store.path().display()
            );
        }
        KeyAction::Clear => {
            store.clear().context("Failed to clear API key")?;
            println!("{} Stored key removed", green("✔"));
        }
    }
    Ok(())
}

// ── shared helpers ───────────────────────────────────────────────────────────

/// Map CLI args to `RelayConfig`.
fn build_relay_config(
    args: &ProviderArgs,
    api_key: Option<String>,
    progress: Option<Arc<dyn StageProgressCallback>>,
) -> Result<RelayConfig> {
    let locale = AnnotationLocale::parse(&args.locale)
        .with_context(|| format!("Unknown locale '{}': use pt-BR or en", args.locale))?;

    let mut builder = RelayConfig::builder()
        .max_upload_mb(args.max_upload_mb)
        .locale(locale)
        .page_separator(PageSeparator::parse(&args.separator))
        .annotate_images(!args.no_annotations);

    if let Some(ref base) = args.api_base {
        builder = builder.api_base_url(base.clone());
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
        builder = builder.api_key(key);
    }
    if let Some(secs) = args.timeout {
        builder = builder.request_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn client_config(args: &ClientArgs) -> ClientConfig {
    let mut config = ClientConfig {
        relay_url: args.relay_url.clone(),
        ..Default::default()
    };
    if let Some(ref url) = args.rate_url {
        config.exchange_rate_url = url.clone();
    }
    config
}

/// Write the result as JSON, to a file, or to stdout in `mode`.
fn emit(
    envelope: &MarkdownEnvelope,
    json: bool,
    output: Option<&Path>,
    mode: PreviewMode,
) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(envelope).context("Failed to serialise output")?;
        println!("{out}");
        return Ok(());
    }

    if let Some(path) = output {
        std::fs::write(path, &envelope.markdown)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("{} {}", green("→"), bold(&path.display().to_string()));
        return Ok(());
    }

    let mode = if io::stdout().is_terminal() {
        mode
    } else {
        PreviewMode::Raw
    };
    let text = PreviewState::new(mode).render(&envelope.markdown);
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    // Ensure a trailing newline on stdout.
    if !text.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_toggle_loop_flips_mode_per_r() {
        let md = "# Title\n\n**bold** text";
        let mut input = io::Cursor::new(b"r\nR\nr\n\n".to_vec());
        let mut out = Vec::new();
        let last = preview_toggle_loop(md, PreviewMode::Rendered, &mut input, &mut out).unwrap();
        assert_eq!(last, PreviewMode::Raw);

        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed.matches("**bold** text").count(), 2, "got: {printed}");
    }

    #[test]
    fn preview_toggle_loop_stops_at_eof() {
        let mut input = io::Cursor::new(Vec::new());
        let mut out = Vec::new();
        let last = preview_toggle_loop("x", PreviewMode::Raw, &mut input, &mut out).unwrap();
        assert_eq!(last, PreviewMode::Raw);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn reported_plan_plays_out_after_instant_result() {
        let plan = ProgressPlan {
            upload_ms: 150,
            ocr_ms: 150,
        };
        let start = Instant::now();
        let out = with_progress(async { 7 }, false, |_| Some(plan)).await;
        assert_eq!(out, 7);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn failed_result_ends_without_replay() {
        let start = Instant::now();
        let out: Result<(), &str> = with_progress(async { Err("boom") }, false, |r| {
            r.as_ref().ok().map(|_| ProgressPlan::default())
        })
        .await;
        assert!(out.is_err());
        assert!(start.elapsed() < Duration::from_millis(ProgressPlan::default().total_ms()));
    }
}
