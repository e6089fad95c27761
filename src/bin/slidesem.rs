//! CLI binary for edgequake-slides.
//!
//! A thin shim over the library crate: maps flags to `SemanticConfig`,
//! keeps the review session in a JSON file between invocations and prints
//! results.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use edgequake_slides::{
    build_prompt, BatchCoordinator, BatchItem, BatchProgressCallback, BatchReport, ContentBlock,
    DirectoryScreenshots, EmbeddingBackend, EmbeddingCache, GeminiEmbedder, ItemStatus,
    JsonDeckStore, OpenAiEmbedder, ProgressCallback, ReviewSession, SemanticConfig, SimilarSlide,
    SimilarityIndex, SlideConverter, SlidePipeline,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per slide.
/// Slides may finish out of order when several workers run.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading deck…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} slides  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, ordinal: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&ordinal)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Starting semantic conversion of {total} slides…"))
        ));
    }

    fn on_item_start(&self, ordinal: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(ordinal, Instant::now());
        self.bar.set_message(format!("slide {ordinal}"));
    }

    fn on_item_complete(&self, ordinal: usize, _current: usize, total: usize) {
        let secs = self.elapsed_secs(ordinal);
        self.bar.println(format!(
            "  {} Slide {:>3}/{:<3}  {}",
            green("✓"),
            ordinal,
            total,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, ordinal: usize, _current: usize, total: usize, error: String) {
        let secs = self.elapsed_secs(ordinal);
        self.errors.fetch_add(1, Ordering::SeqCst);

        self.bar.println(format!(
            "  {} Slide {:>3}/{:<3}  {}  {}",
            red("✗"),
            ordinal,
            total,
            red(&truncate(&error, 80)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 && success_count == total {
            eprintln!(
                "{} {} slides ready for review",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} slides ready  ({} failed)",
                if success_count == 0 { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a whole deck; screenshots are screenshots/slide_<n>.png
  slidesem convert deck.json --screenshots screenshots/ --session review.json

  # Retry only the slides that failed last time
  slidesem convert deck.json --screenshots screenshots/ --session review.json --retry-failed

  # Inspect and decide
  slidesem review review.json status
  slidesem review review.json accept 3 --deck deck.json --title "Quarterly results"
  slidesem review review.json reject 4
  slidesem review review.json accept-all --deck deck.json

  # Show the prompt that would be sent for one slide (no API key needed)
  slidesem prompt deck.json --slide s-03

  # Slides similar to one slide, or to a free-text query
  slidesem similar deck.json --slide s-03 -k 5
  slidesem similar deck.json --query "pricing comparison" --embedder gemini

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (conversion and embeddings)
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key (conversion and embeddings)
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  OPENAI_EMBEDDING_MODEL  Embedding model for --embedder openai
  GEMINI_EMBEDDING_MODEL  Embedding model for --embedder gemini
"#;

/// Convert presentation slides into typed content blocks with Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "slidesem",
    version,
    about = "Convert presentation slides into typed content blocks using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "SLIDESEM_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "SLIDESEM_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the batch conversion and write a review session file.
    Convert(ConvertArgs),

    /// Inspect a review session and accept or reject converted slides.
    Review {
        /// Review session file written by `convert`.
        session: PathBuf,

        #[command(subcommand)]
        action: ReviewAction,
    },

    /// Print the prompt that would be sent for one slide.
    Prompt {
        /// Deck JSON file.
        deck: PathBuf,

        /// Slide id.
        #[arg(long)]
        slide: String,

        /// Path to a text file containing custom instructions.
        #[arg(long, env = "SLIDESEM_SYSTEM_PROMPT")]
        system_prompt: Option<PathBuf>,
    },

    /// Rank slides by embedding similarity.
    Similar(SimilarArgs),
}

#[derive(clap::Args, Debug)]
struct ConvertArgs {
    /// Deck JSON file.
    deck: PathBuf,

    /// Directory holding slide_<ordinal>.<png|jpg|webp> screenshots.
    #[arg(long, env = "SLIDESEM_SCREENSHOTS")]
    screenshots: PathBuf,

    /// Review session file to write.
    #[arg(long, env = "SLIDESEM_SESSION", default_value = "review.json")]
    session: PathBuf,

    /// Re-run only the slides in `error` from an existing session file.
    #[arg(long)]
    retry_failed: bool,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Restrict requests to these model ids (comma separated).
    #[arg(long, env = "SLIDESEM_KNOWN_MODELS", value_delimiter = ',')]
    known_models: Vec<String>,

    /// Number of concurrent VLM calls.
    #[arg(short, long, env = "SLIDESEM_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Path to a text file containing custom instructions.
    #[arg(long, env = "SLIDESEM_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per slide.
    #[arg(long, env = "SLIDESEM_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "SLIDESEM_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Per-slide LLM call timeout in seconds.
    #[arg(long, env = "SLIDESEM_API_TIMEOUT", default_value_t = 90)]
    api_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "SLIDESEM_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum ReviewAction {
    /// List items with their status.
    Status {
        /// Print the session as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Accept one ready item and apply it to the deck.
    Accept {
        /// Item index as shown by `status`.
        index: usize,

        /// Deck JSON file to update.
        #[arg(long)]
        deck: PathBuf,

        /// Replacement title.
        #[arg(long)]
        title: Option<String>,

        /// JSON file with an edited block list.
        #[arg(long)]
        blocks: Option<PathBuf>,
    },

    /// Reject one ready item.
    Reject { index: usize },

    /// Accept every ready item.
    AcceptAll {
        #[arg(long)]
        deck: PathBuf,
    },

    /// Reject every ready item.
    RejectAll,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EmbedderArg {
    Openai,
    Gemini,
}

#[derive(clap::Args, Debug)]
struct SimilarArgs {
    /// Deck JSON file.
    deck: PathBuf,

    /// Slide id to compare against.
    #[arg(long, conflicts_with = "query", required_unless_present = "query")]
    slide: Option<String>,

    /// Free-text query.
    #[arg(long)]
    query: Option<String>,

    /// Number of results.
    #[arg(short, default_value_t = 5)]
    k: usize,

    /// Embedding backend.
    #[arg(long, env = "SLIDESEM_EMBEDDER", value_enum, default_value = "openai")]
    embedder: EmbedderArg,

    /// Concurrent embedding requests while indexing.
    #[arg(long, env = "SLIDESEM_EMBED_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Embedding request timeout in seconds.
    #[arg(long, env = "SLIDESEM_EMBED_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Vector cache file [default: <deck>.embeddings.json next to the deck].
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Do not read or write the vector cache.
    #[arg(long)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs during conversion.
    let show_progress = match &cli.command {
        Command::Convert(args) => !cli.quiet && !args.no_progress,
        _ => false,
    };
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

    match cli.command {
        Command::Convert(args) => run_convert(args, show_progress, cli.quiet).await,
        Command::Review { session, action } => run_review(&session, action).await,
        Command::Prompt {
            deck,
            slide,
            system_prompt,
        } => run_prompt(&deck, &slide, system_prompt.as_deref()).await,
        Command::Similar(args) => run_similar(args).await,
    }
}

async fn run_convert(args: ConvertArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let store = JsonDeckStore::open(&args.deck)
        .await
        .context("Failed to open deck")?;

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = Arc::new(build_config(&args, progress).await?);

    let converter = SlideConverter::new(config.clone()).context("Failed to set up the model")?;
    let pipeline = SlidePipeline::new(
        converter,
        Arc::new(DirectoryScreenshots::new(&args.screenshots)),
    );

    let coordinator = BatchCoordinator::from_config(&config);
    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing in-flight slides");
            cancel.cancel();
        }
    });

    let (report, session) = if args.retry_failed {
        let previous = load_session(&args.session).await?;
        if previous.retry_candidates().is_empty() {
            if !quiet {
                eprintln!("{} no failed slides to retry", green("✔"));
            }
            return Ok(());
        }
        let report = coordinator
            .rerun_failed(previous.items().to_vec(), Arc::new(pipeline))
            .await;
        (summary_of(&report), ReviewSession::from_report(report))
    } else {
        let items = BatchItem::from_slides(store.deck().await.ordered());
        let report = coordinator.run(items, Arc::new(pipeline)).await;
        (summary_of(&report), ReviewSession::from_report(report))
    };

    save_session(&args.session, &session).await?;

    if !quiet {
        if !show_progress {
            eprintln!(
                "Converted {}/{} slides in {}ms",
                report.succeeded, report.total, report.duration_ms
            );
        }
        for line in session.failure_summary() {
            eprintln!("  {} {}", red("✗"), line);
        }
        if report.cancelled {
            eprintln!("  {} run cancelled; unstarted slides left pending", cyan("⚠"));
        }
        eprintln!(
            "   review session  →  {}",
            bold(&args.session.display().to_string())
        );
    }
    Ok(())
}

struct RunSummary {
    succeeded: usize,
    total: usize,
    duration_ms: u64,
    cancelled: bool,
}

fn summary_of(report: &BatchReport) -> RunSummary {
    RunSummary {
        succeeded: report.succeeded,
        total: report.total,
        duration_ms: report.duration_ms,
        cancelled: report.cancelled,
    }
}

/// Map CLI args to `SemanticConfig`.
async fn build_config(
    args: &ConvertArgs,
    progress: Option<ProgressCallback>,
) -> Result<SemanticConfig> {
    let mut builder = SemanticConfig::builder()
        .concurrency(args.concurrency)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .api_timeout_secs(args.api_timeout);

    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if !args.known_models.is_empty() {
        builder = builder.known_models(args.known_models.iter().cloned());
    }
    if let Some(ref path) = args.system_prompt {
        builder = builder.system_prompt(read_prompt_file(path).await?);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read system prompt from {:?}", path))
}

async fn load_session(path: &Path) -> Result<ReviewSession> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read review session {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Review session {:?} is malformed", path))
}

async fn save_session(path: &Path, session: &ReviewSession) -> Result<()> {
    let json = serde_json::to_string_pretty(session).context("Failed to serialise session")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write review session {:?}", path))
}

/// A missing or unreadable cache only costs a re-embed.
async fn load_embedding_cache(path: &Path) -> Option<EmbeddingCache> {
    let bytes = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("Ignoring embedding cache {:?}: {}", path, e);
            None
        }
    }
}

async fn save_embedding_cache(path: &Path, cache: &EmbeddingCache) -> Result<()> {
    let json = serde_json::to_vec(cache).context("Failed to serialise embedding cache")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write embedding cache {:?}", path))
}

async fn run_review(session_path: &Path, action: ReviewAction) -> Result<()> {
    let mut session = load_session(session_path).await?;

    match action {
        ReviewAction::Status { json } => {
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&session).context("Failed to serialise session")?
                );
            } else {
                print_status(&session);
            }
            return Ok(());
        }
        ReviewAction::Accept {
            index,
            deck,
            title,
            blocks,
        } => {
            let store = JsonDeckStore::open(&deck).await.context("Failed to open deck")?;
            let content = match blocks {
                Some(path) => Some(read_blocks(&path).await?),
                None => None,
            };
            session
                .accept(index, content, title, &store)
                .await
                .with_context(|| format!("Failed to accept item {index}"))?;
            eprintln!("{} item {index} accepted", green("✔"));
        }
        ReviewAction::Reject { index } => {
            session
                .reject(index)
                .with_context(|| format!("Failed to reject item {index}"))?;
            eprintln!("{} item {index} rejected", dim("✗"));
        }
        ReviewAction::AcceptAll { deck } => {
            let store = JsonDeckStore::open(&deck).await.context("Failed to open deck")?;
            let outcome = session.accept_all(&store).await;
            // Persist the items accepted before any store failure.
            save_session(session_path, &session).await?;
            let n = outcome.context("Accept-all stopped early")?;
            eprintln!("{} {n} items accepted", green("✔"));
            return Ok(());
        }
        ReviewAction::RejectAll => {
            let n = session.reject_all();
            eprintln!("{} {n} items rejected", dim("✗"));
        }
    }

    save_session(session_path, &session).await
}

async fn read_blocks(path: &Path) -> Result<Vec<ContentBlock>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read blocks from {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("{:?} is not a JSON block list", path))
}

fn print_status(session: &ReviewSession) {
    for item in session.items() {
        let marker = match item.status() {
            ItemStatus::Ready => cyan("●"),
            ItemStatus::Accepted => green("✓"),
            ItemStatus::Rejected => dim("–"),
            ItemStatus::Error => red("✗"),
            ItemStatus::Pending | ItemStatus::Converting => dim("○"),
        };
        let detail = match (item.ai_content(), item.error()) {
            (_, Some(err)) => red(&truncate(&err.to_string(), 60)),
            (Some(result), None) => dim(&format!(
                "{}, {} blocks",
                result.classification,
                result.blocks.len()
            )),
            (None, None) => String::new(),
        };
        println!(
            "{} {:>3}  slide {:>3}  {:<10}  {}  {}",
            marker,
            item.index(),
            item.ordinal(),
            item.status().as_str(),
            truncate(item.proposed_title().unwrap_or(item.title()), 40),
            detail,
        );
    }

    let counts = session
        .status_counts()
        .into_iter()
        .map(|(status, n)| format!("{n} {status}"))
        .collect::<Vec<_>>()
        .join(", ");
    println!("{}", dim(&counts));
    for line in session.failure_summary() {
        println!("{}", red(&line));
    }
}

async fn run_prompt(deck: &Path, slide_id: &str, system_prompt: Option<&Path>) -> Result<()> {
    let store = JsonDeckStore::open(deck).await.context("Failed to open deck")?;
    let deck = store.deck().await;
    let Some(slide) = deck.slide(slide_id) else {
        bail!("Slide '{slide_id}' is not in {:?}", store.path());
    };

    let mut builder = SemanticConfig::builder();
    if let Some(path) = system_prompt {
        builder = builder.system_prompt(read_prompt_file(path).await?);
    }
    let config = builder.build().context("Invalid configuration")?;

    println!(
        "{}",
        build_prompt(slide, &slide.image_inventory(), config.system_prompt.as_deref())
    );
    Ok(())
}

async fn run_similar(args: SimilarArgs) -> Result<()> {
    let store = JsonDeckStore::open(&args.deck)
        .await
        .context("Failed to open deck")?;
    let timeout = Duration::from_secs(args.timeout);
    let backend: Arc<dyn EmbeddingBackend> = match args.embedder {
        EmbedderArg::Openai => Arc::new(OpenAiEmbedder::from_env(timeout)?),
        EmbedderArg::Gemini => Arc::new(GeminiEmbedder::from_env(timeout)?),
    };

    let config = SemanticConfig::default();
    let index = SimilarityIndex::from_config(backend, &config).with_concurrency(args.concurrency);
    index.upsert_slides(store.deck().await.ordered());

    let cache_path = (!args.no_cache).then(|| {
        args.cache
            .clone()
            .unwrap_or_else(|| args.deck.with_extension("embeddings.json"))
    });
    if let Some(ref path) = cache_path {
        if let Some(cache) = load_embedding_cache(path).await {
            let n = index.import_cache(cache);
            debug!("Loaded {} cached vectors from {:?}", n, path);
        }
    }

    let stats = index.index_all(args.concurrency).await;
    if stats.failed > 0 {
        eprintln!(
            "{} {} slides could not be embedded and are left out",
            cyan("⚠"),
            stats.failed
        );
    }

    if let Some(ref path) = cache_path {
        save_embedding_cache(path, &index.export_cache()).await?;
    }

    let results: Vec<SimilarSlide> = match (args.slide, args.query) {
        (Some(id), _) => index.find_similar(&id, args.k).await?,
        (None, Some(q)) => index.search(&q, args.k).await?,
        (None, None) => bail!("Pass --slide or --query"),
    };

    let deck = store.deck().await;
    for hit in results {
        let title = deck.slide(&hit.slide_id).map(|s| s.title.as_str()).unwrap_or("");
        println!(
            "{:.3}  slide {:>3}  {:<12}  {}",
            hit.score,
            hit.ordinal,
            hit.slide_id,
            truncate(title, 50)
        );
    }
    Ok(())
}
