//! CLI binary for pdf2movie.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig`, picks a publisher and prints the run summary.

use anyhow::{Context, Result};
use clap::Parser;
use pdf2movie::pipeline::render::page_count;
use pdf2movie::pipeline::split::plan_chunks;
use pdf2movie::{
    Credentials, HfDatasetPublisher, LocalPublisher, MoviePipeline, PipelineConfig,
    PipelineProgressCallback, ProgramStyle, ProgressCallback, Publisher, RunStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
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

/// Resolution of the progress bar; stage fractions are scaled onto it.
const BAR_STEPS: u64 = 1000;

/// Terminal progress callback: one bar following the overall run fraction,
/// plus a log line per chunk and per page.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(BAR_STEPS);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {percent:>3}%  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize, total_chunks: usize) {
        self.bar.set_prefix("Producing");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Narrating {total_pages} pages in {total_chunks} chunk(s)…"
            ))
        ));
    }

    fn on_stage(&self, fraction: f32, label: &str) {
        self.bar.set_position((fraction * BAR_STEPS as f32) as u64);
        self.bar.set_message(label.to_string());
    }

    fn on_chunk_scripted(&self, chunk_index: usize, total_chunks: usize, fallback_pages: &[usize]) {
        let note = if fallback_pages.is_empty() {
            String::new()
        } else {
            red(&format!("  fallback: {fallback_pages:?}"))
        };
        self.bar.println(format!(
            "  {} Script {:>3}/{:<3}{}",
            green("✓"),
            chunk_index,
            total_chunks,
            note
        ));
    }

    fn on_page_audio(&self, page_num: usize, total_pages: usize, duration_secs: f64) {
        self.bar.println(format!(
            "  {} Audio  {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{duration_secs:.1}s"))
        ));
    }

    fn on_run_failed(&self, error: &str) {
        self.bar.finish_and_clear();
        let first = error.lines().next().unwrap_or(error);
        eprintln!("{} {}", red("✘"), first);
    }

    fn on_run_complete(&self, total_pages: usize, _publish_ref: &str) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages narrated",
            green("✔"),
            bold(&total_pages.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Narrate a deck as a solo radio show, publish to a local folder
  pdf2movie slides.pdf --publish-dir out/

  # Two-host podcast, faster delivery
  pdf2movie --style duo-podcast --speed 1.3 paper.pdf -o paper.mp4 --publish-dir out/

  # Publish to a Hugging Face dataset
  HF_TOKEN=hf_... HF_REPO_ID=me/narrated-pdfs pdf2movie report.pdf

  # Show the chunk plan without calling any service
  pdf2movie --plan report.pdf

  # List the built-in program styles
  pdf2movie --list-styles

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini key (speech; scripts with the default provider)
  HF_TOKEN                Hugging Face write token
  HF_REPO_ID              Hugging Face dataset repository (user/name)
  EDGEQUAKE_PROVIDER      Script provider override (gemini, openai, anthropic, …)
  EDGEQUAKE_MODEL         Script model override
  PDFIUM_LIB_PATH         Directory or file of the pdfium shared library

REQUIREMENTS:
  pdfium shared library and ffmpeg must be installed.
"#;

/// Turn PDF documents into narrated videos.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2movie",
    version,
    about = "Turn PDF documents into narrated videos",
    long_about = "Turn a PDF into a video: an LLM writes a narration (or a two-person dialogue) \
for every page, a TTS model speaks it, and each page is shown for exactly as long as its \
narration plays.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    #[arg(required_unless_present = "list_styles")]
    input: Option<PathBuf>,

    /// Keep a local copy of the final video at this path.
    #[arg(short, long, env = "PDF2MOVIE_OUTPUT")]
    output: Option<PathBuf>,

    /// Program style (see --list-styles).
    #[arg(long, env = "PDF2MOVIE_STYLE", default_value = pdf2movie::styles::DEFAULT_STYLE)]
    style: String,

    /// Print the built-in program styles and exit.
    #[arg(long)]
    list_styles: bool,

    /// Print page count and chunk plan, no service calls.
    #[arg(long)]
    plan: bool,

    /// Pages per script-generation request.
    #[arg(long, env = "PDF2MOVIE_CHUNK_SIZE", default_value_t = 5,
          value_parser = clap::value_parser!(u64).range(1..))]
    chunk_size: u64,

    /// Narration tempo multiplier.
    #[arg(long, env = "PDF2MOVIE_SPEED", default_value_t = 1.2)]
    speed: f64,

    /// Silence before each page's narration, in ms.
    #[arg(long, default_value_t = 1000)]
    silence_before: u32,

    /// Silence after each page's narration, in ms.
    #[arg(long, default_value_t = 500)]
    silence_after: u32,

    /// Output frame rate.
    #[arg(long, default_value_t = 24)]
    fps: u32,

    /// Output resolution as WIDTHxHEIGHT.
    #[arg(long, default_value = "1920x1080", value_parser = parse_resolution)]
    resolution: (u32, u32),

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2MOVIE_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Script provider: gemini, openai, anthropic, …
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Script model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Speech model ID.
    #[arg(long, env = "PDF2MOVIE_TTS_MODEL", default_value = pdf2movie::config::DEFAULT_TTS_MODEL)]
    tts_model: String,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    /// Hugging Face write token.
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    hf_token: Option<String>,

    /// Hugging Face dataset repository.
    #[arg(long, env = "HF_REPO_ID")]
    hf_repo: Option<String>,

    /// Publish into this local directory instead of Hugging Face.
    #[arg(long, env = "PDF2MOVIE_PUBLISH_DIR")]
    publish_dir: Option<PathBuf>,

    /// Synthesis attempts per page.
    #[arg(long, default_value_t = 5)]
    max_attempts: u32,

    /// Base delay of the rate-limit backoff, in ms.
    #[arg(long, default_value_t = 10_000)]
    retry_delay_ms: u64,

    /// ffmpeg executable.
    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// pdfium shared library location.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2MOVIE_PASSWORD")]
    password: Option<String>,

    /// Also keep each page's raw synthesised speech here as page_NNNN.wav.
    #[arg(long, value_name = "DIR")]
    keep_raw_audio: Option<PathBuf>,

    /// Output the run result as JSON.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2MOVIE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2MOVIE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2MOVIE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose is given.
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

    if cli.list_styles {
        print_styles();
        return Ok(());
    }
    let input = cli
        .input
        .clone()
        .context("An input PDF is required")?;

    // ── Plan-only mode ───────────────────────────────────────────────────
    if cli.plan {
        let pages = page_count(&input, cli.pdfium_lib.as_deref(), cli.password.as_deref())
            .await
            .context("Failed to open PDF")?;
        let chunks = plan_chunks(pages, cli.chunk_size as usize)?;
        println!("File:    {}", input.display());
        println!("Pages:   {pages}");
        println!("Chunks:  {}", chunks.len());
        for c in &chunks {
            println!("  {:>3}. pages {}-{}", c.index, c.start, c.end);
        }
        return Ok(());
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let publisher = build_publisher(&cli, &config.credentials)?;
    if !cli.quiet && !cli.json {
        eprintln!("{} Publishing to {}", dim("→"), publisher.describe());
    }

    let pipeline = MoviePipeline::from_config(config, publisher)?;

    match pipeline.execute(&input).await {
        RunStatus::Completed(output) => {
            if cli.json {
                let json = serde_json::to_string_pretty(&output)
                    .context("Failed to serialise output")?;
                println!("{json}");
            } else {
                println!("{}", output.summary.status_text());
                if cli.output.is_some() && !cli.quiet {
                    eprintln!(
                        "{} Local copy: {}",
                        dim("→"),
                        bold(&output.video_path.display().to_string())
                    );
                }
            }
            Ok(())
        }
        RunStatus::Failed { error, diagnostics } => {
            tracing::debug!("{}", diagnostics);
            Err(anyhow::Error::new(error).context("Run failed"))
        }
    }
}

fn print_styles() {
    for style in ProgramStyle::builtin() {
        let speakers: Vec<String> = style
            .speakers()
            .map(|s| format!("{} ({})", s.name, s.voice))
            .collect();
        println!(
            "{} {}\n{:<14} {}",
            bold(&format!("{:<14}", style.name)),
            style.description,
            "",
            dim(&speakers.join(", "))
        );
    }
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let credentials = Credentials {
        gemini_api_key: cli.gemini_api_key.clone(),
        hf_token: cli.hf_token.clone(),
        hf_repo_id: cli.hf_repo.clone(),
    }
    .or_defaults(Credentials::from_env());

    let (width, height) = cli.resolution;
    let mut builder = PipelineConfig::builder()
        .style_name(&cli.style)?
        .chunk_size(cli.chunk_size as usize)
        .audio_speed(cli.speed)
        .silence_before_ms(cli.silence_before)
        .silence_after_ms(cli.silence_after)
        .fps(cli.fps)
        .resolution(width, height)
        .dpi(cli.dpi)
        .tts_model(cli.tts_model.clone())
        .max_attempts(cli.max_attempts)
        .retry_base_delay_ms(cli.retry_delay_ms)
        .ffmpeg_path(cli.ffmpeg.clone())
        .credentials(credentials);

    if let Some(ref p) = cli.provider {
        builder = builder.provider_name(p.clone());
    }
    if let Some(ref m) = cli.model {
        builder = builder.model(m.clone());
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(lib.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref out) = cli.output {
        builder = builder.output_path(out.clone());
    }
    if let Some(ref dir) = cli.keep_raw_audio {
        builder = builder.raw_audio_dir(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn build_publisher(cli: &Cli, credentials: &Credentials) -> Result<Arc<dyn Publisher>> {
    Ok(match cli.publish_dir {
        Some(ref dir) => Arc::new(LocalPublisher::new(dir.clone())),
        None => Arc::new(HfDatasetPublisher::from_credentials(credentials)?),
    })
}

/// Parse `--resolution` as `WIDTHxHEIGHT`.
fn parse_resolution(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .trim()
        .to_lowercase()
        .split_once('x')
        .map(|(w, h)| (w.trim().to_string(), h.trim().to_string()))
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w: u32 = w.parse().map_err(|_| format!("invalid width '{w}'"))?;
    let h: u32 = h.parse().map_err(|_| format!("invalid height '{h}'"))?;
    Ok((w, h))
}
