//! # pdf2movie
//!
//! Turn a PDF document into a narrated video: one still per page, each shown
//! for exactly as long as a synthesized narration of that page plays.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Split     partition pages into chunks (chunk size, default 5)
//!  ├─ 2. Render    rasterise every page via pdfium (spawn_blocking)
//!  ├─ 3. Script    one LLM call per chunk, PDF attached → page scripts
//!  ├─ 4. Speech    one TTS call per page, rate-limit aware retry
//!  ├─ 5. Audio     tempo + silence padding, written as WAV
//!  ├─ 6. Compose   letterboxed still + audio → MP4 segment per page
//!  ├─ 7. Assemble  stream-copy concat, re-encode fallback
//!  └─ 8. Publish   Hugging Face dataset or local directory
//! ```
//!
//! Pages whose script the model did not return (or returned in an unusable
//! shape) get a short fallback narration, so the video always covers every
//! page exactly once, in order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2movie::{Credentials, LocalPublisher, MoviePipeline, PipelineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .style_name("duo-podcast")?
//!         .credentials(Credentials::from_env())
//!         .output_path("talk.mp4")
//!         .build()?;
//!     let pipeline = MoviePipeline::from_config(config, Arc::new(LocalPublisher::new("out")))?;
//!     let output = pipeline.run("slides.pdf").await?;
//!     println!("{}", output.summary.status_text());
//!     Ok(())
//! }
//! ```
//!
//! ## External requirements
//!
//! * a pdfium shared library (set `PDFIUM_LIB_PATH` if it is not on the
//!   system search path)
//! * `ffmpeg` on `PATH` (or pass its location)
//! * `GEMINI_API_KEY` for speech synthesis and, by default, script generation
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2movie` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod publish;
pub mod styles;

#[cfg(test)]
mod http_stub;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Credentials, PipelineConfig, PipelineConfigBuilder};
pub use error::{MovieError, SynthesisError};
pub use orchestrator::{DocumentScripts, MoviePipeline, PublishedVideo, RunStatus};
pub use output::{RunOutput, RunSummary};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use publish::{HfDatasetPublisher, LocalPublisher, Publisher};
pub use styles::ProgramStyle;
