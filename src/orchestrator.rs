//! End-to-end orchestration of one PDF-to-movie run.
//!
//! ```text
//! validate ─▶ split ─▶ rasterise ─▶ scripts (per chunk)
//!          ─▶ speech + post-process (per page) ─▶ compose (per page)
//!          ─▶ assemble ─▶ publish
//! ```
//!
//! Everything runs on one control flow, one external call at a time. Chunks
//! only shape script requests; from the script stage on, every artifact is
//! keyed by absolute page number and every stage checks it holds exactly
//! pages `1..=N` before handing over.

use crate::config::PipelineConfig;
use crate::error::MovieError;
use crate::output::{RunOutput, RunSummary};
use crate::pipeline::assemble::{AssemblyPath, SequenceAssembler};
use crate::pipeline::audio::{process_audio, save_pcm_as_wav, ProcessedAudio};
use crate::pipeline::compose::{PageCompositor, PageVideo};
use crate::pipeline::input::validate_pdf;
use crate::pipeline::media::{FfmpegTool, MediaTool};
use crate::pipeline::render::render_pages;
use crate::pipeline::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::pipeline::script::{LlmScriptService, PageScriptMap, ScriptGenerator, ScriptService};
use crate::pipeline::speech::{GeminiSpeechClient, SpeechService, SpeechSynthesizer};
use crate::pipeline::split::{split_document, ChunkDocument};
use crate::progress::ProgressTracker;
use crate::publish::{destination_name, Publisher};
use edgequake_llm::{GeminiProvider, LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::error::Error as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Terminal state of a run.
#[derive(Debug)]
pub enum RunStatus {
    Completed(RunOutput),
    Failed {
        error: MovieError,
        /// The error and its cause chain.
        diagnostics: String,
    },
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed(_))
    }

    /// Convert back into a `Result`, dropping the diagnostics.
    pub fn into_result(self) -> Result<RunOutput, MovieError> {
        match self {
            RunStatus::Completed(output) => Ok(output),
            RunStatus::Failed { error, .. } => Err(error),
        }
    }
}

/// Scripts for the whole document plus the pages that needed fallback.
#[derive(Debug, Clone, Default)]
pub struct DocumentScripts {
    pub scripts: PageScriptMap,
    pub fallback_pages: Vec<usize>,
}

/// The joined video and where it was published.
#[derive(Debug, Clone)]
pub struct PublishedVideo {
    /// Local copy of the final video.
    pub path: PathBuf,
    pub publish_ref: String,
    pub assembly: AssemblyPath,
    /// Sum of all page segment durations.
    pub duration_secs: f64,
}

/// The pipeline with its external collaborators.
pub struct MoviePipeline {
    config: PipelineConfig,
    scripts: Arc<dyn ScriptService>,
    speech: Arc<dyn SpeechService>,
    media: Arc<dyn MediaTool>,
    publisher: Arc<dyn Publisher>,
    sleeper: Arc<dyn Sleeper>,
}

impl MoviePipeline {
    /// Assemble a pipeline from explicit services.
    pub fn new(
        config: PipelineConfig,
        scripts: Arc<dyn ScriptService>,
        speech: Arc<dyn SpeechService>,
        media: Arc<dyn MediaTool>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            config,
            scripts,
            speech,
            media,
            publisher,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the clock used between synthesis retries.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Production pipeline: LLM scripts, Gemini speech, ffmpeg.
    ///
    /// Fails before any work if the Gemini key is missing or the script
    /// provider cannot be created.
    pub fn from_config(config: PipelineConfig, publisher: Arc<dyn Publisher>) -> Result<Self, MovieError> {
        let api_key = config.credentials.require_gemini_key()?.to_string();
        let provider = resolve_provider(&config, &api_key)?;
        info!(
            "Script provider: {} / {}, speech model: {}",
            config.script_provider_name(),
            config.script_model(),
            config.tts_model
        );

        let scripts = Arc::new(LlmScriptService::new(
            provider,
            config.temperature,
            config.max_tokens,
        ));
        let speech = Arc::new(GeminiSpeechClient::new(api_key, config.tts_model.clone()));
        let media = Arc::new(FfmpegTool::new(config.ffmpeg_path.clone()));
        Ok(Self::new(config, scripts, speech, media, publisher))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run and fold the outcome into a [`RunStatus`].
    pub async fn execute(&self, pdf: impl AsRef<Path>) -> RunStatus {
        match self.run(pdf).await {
            Ok(output) => RunStatus::Completed(output),
            Err(error) => {
                error!("Run failed: {}", error);
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_run_failed(&error.to_string());
                }
                let diagnostics = diagnostics(&error);
                RunStatus::Failed { error, diagnostics }
            }
        }
    }

    /// Turn the PDF at `pdf` into a published video.
    pub async fn run(&self, pdf: impl AsRef<Path>) -> Result<RunOutput, MovieError> {
        let started = Instant::now();
        let config = &self.config;
        let pdf_path = validate_pdf(pdf.as_ref())?;
        let mut progress = ProgressTracker::new(config.progress_callback.clone());
        info!("Starting run: {} ({})", pdf_path.display(), config.style.name);

        // ── Split ────────────────────────────────────────────────────────
        progress.stage(0.05, "Splitting PDF");
        let chunks = split_document(
            &pdf_path,
            config.chunk_size,
            config.pdfium_lib_path.as_deref(),
            config.password.as_deref(),
        )
        .await?;
        let total_pages: usize = chunks.iter().map(|c| c.chunk.page_count()).sum();
        let total_chunks = chunks.len();
        if let Some(cb) = progress.callback() {
            cb.on_run_start(total_pages, total_chunks);
        }

        // ── Rasterise ────────────────────────────────────────────────────
        progress.stage(0.10, "Rendering pages");
        let images = render_pages(
            &pdf_path,
            config.dpi,
            config.pdfium_lib_path.as_deref(),
            config.password.as_deref(),
        )
        .await?;
        ensure_pages(images.iter().map(|(p, _)| *p), total_pages, "rendered images")?;

        // ── Scripts ──────────────────────────────────────────────────────
        let scripts = self.scripts_stage(chunks, &mut progress).await?;
        ensure_pages(scripts.scripts.keys().copied(), total_pages, "scripts")?;

        // ── Speech ───────────────────────────────────────────────────────
        let audio = self.audio_stage(&scripts.scripts, &mut progress).await?;

        // ── Compose, assemble, publish ───────────────────────────────────
        let video = self.video_stage(images, audio, &mut progress).await?;

        progress.stage(1.0, "Done");
        if let Some(cb) = progress.callback() {
            cb.on_run_complete(total_pages, &video.publish_ref);
        }

        let summary = RunSummary {
            page_count: total_pages,
            chunk_count: total_chunks,
            style_name: config.style.name.clone(),
            speaker_count: config.style.speaker_count(),
            fallback_pages: scripts.fallback_pages,
            video_duration_secs: video.duration_secs,
            assembly: video.assembly,
            publish_ref: video.publish_ref.clone(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Run complete: {} pages, {:.1}s of video, {}",
            total_pages, video.duration_secs, video.publish_ref
        );

        Ok(RunOutput {
            video_path: video.path,
            publish_ref: video.publish_ref,
            summary,
        })
    }

    /// Generate scripts for every chunk, in order.
    ///
    /// Each chunk's sub-document is deleted as soon as its scripts are back.
    pub async fn generate_scripts(&self, chunks: Vec<ChunkDocument>) -> Result<DocumentScripts, MovieError> {
        let mut progress = ProgressTracker::new(self.config.progress_callback.clone());
        self.scripts_stage(chunks, &mut progress).await
    }

    /// Synthesise and post-process audio for every page, in page order.
    pub async fn synthesize_audio(
        &self,
        scripts: &PageScriptMap,
    ) -> Result<Vec<(usize, ProcessedAudio)>, MovieError> {
        let mut progress = ProgressTracker::new(self.config.progress_callback.clone());
        self.audio_stage(scripts, &mut progress).await
    }

    /// Compose one segment per page, join them and publish the result.
    ///
    /// `images` and `tracks` must both hold pages `1..=N` in order. Nothing is
    /// published unless assembly succeeds.
    pub async fn produce_video(
        &self,
        images: Vec<(usize, DynamicImage)>,
        tracks: Vec<(usize, ProcessedAudio)>,
    ) -> Result<PublishedVideo, MovieError> {
        let mut progress = ProgressTracker::new(self.config.progress_callback.clone());
        self.video_stage(images, tracks, &mut progress).await
    }

    async fn scripts_stage(
        &self,
        chunks: Vec<ChunkDocument>,
        progress: &mut ProgressTracker,
    ) -> Result<DocumentScripts, MovieError> {
        let generator = ScriptGenerator::new(self.scripts.clone(), self.config.style.clone());
        let total = chunks.len().max(1);
        let mut out = DocumentScripts::default();

        for (i, document) in chunks.into_iter().enumerate() {
            let chunk = document.chunk;
            progress.stage(
                0.10 + 0.30 * i as f32 / total as f32,
                &format!(
                    "Generating script for pages {}-{} ({}/{})",
                    chunk.start, chunk.end, chunk.index, chunk.total
                ),
            );
            let resolved = generator.generate_chunk(&document).await?;
            drop(document);

            if let Some(cb) = progress.callback() {
                cb.on_chunk_scripted(chunk.index, chunk.total, &resolved.fallback_pages);
            }
            out.scripts.extend(resolved.scripts);
            out.fallback_pages.extend(resolved.fallback_pages);
        }
        Ok(out)
    }

    async fn audio_stage(
        &self,
        scripts: &PageScriptMap,
        progress: &mut ProgressTracker,
    ) -> Result<Vec<(usize, ProcessedAudio)>, MovieError> {
        let config = &self.config;
        progress.stage(0.40, "Synthesising audio");

        let policy = RetryPolicy::new(
            config.max_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
        )
        .with_sleeper(self.sleeper.clone());
        let synthesizer = SpeechSynthesizer::new(self.speech.clone(), policy, config.style.clone());
        if let Some(dir) = &config.raw_audio_dir {
            std::fs::create_dir_all(dir).map_err(|source| MovieError::OutputWriteFailed {
                path: dir.clone(),
                source,
            })?;
        }

        let total = scripts.len();
        let mut tracks = Vec::with_capacity(total);
        for (i, (&page, script)) in scripts.iter().enumerate() {
            progress.stage(
                0.40 + 0.40 * i as f32 / total.max(1) as f32,
                &format!("Synthesising audio for page {page}/{total}"),
            );
            let raw = synthesizer.synthesize_page(page, script).await?;
            if let Some(dir) = &config.raw_audio_dir {
                save_pcm_as_wav(&raw, &dir.join(format!("page_{page:04}.wav")))?;
            }
            let track = process_audio(
                &raw,
                config.audio_speed,
                config.silence_before_ms,
                config.silence_after_ms,
            )?;
            if let Some(cb) = progress.callback() {
                cb.on_page_audio(page, total, track.duration_secs);
            }
            tracks.push((page, track));
        }
        Ok(tracks)
    }

    async fn video_stage(
        &self,
        images: Vec<(usize, DynamicImage)>,
        tracks: Vec<(usize, ProcessedAudio)>,
        progress: &mut ProgressTracker,
    ) -> Result<PublishedVideo, MovieError> {
        let config = &self.config;
        let total_pages = images.len();
        ensure_pages(images.iter().map(|(p, _)| *p), total_pages, "rendered images")?;
        ensure_pages(tracks.iter().map(|(p, _)| *p), total_pages, "audio tracks")?;

        // ── Compose ──────────────────────────────────────────────────────
        progress.stage(0.80, "Rendering page videos");
        let compositor = PageCompositor::new(self.media.clone(), config.width, config.height, config.fps);
        let mut videos: Vec<PageVideo> = Vec::with_capacity(total_pages);
        for (i, ((page, image), (_, track))) in images.into_iter().zip(tracks).enumerate() {
            progress.stage(
                0.80 + 0.15 * i as f32 / total_pages as f32,
                &format!("Rendering video for page {page}/{total_pages}"),
            );
            videos.push(compositor.compose_page(page, image, &track).await?);
            if let Some(cb) = progress.callback() {
                cb.on_page_video(page, total_pages);
            }
        }
        let duration_secs: f64 = videos.iter().map(|v| v.duration_secs).sum();

        // ── Assemble ─────────────────────────────────────────────────────
        progress.stage(0.95, "Joining videos");
        let path = self.output_path()?;
        let assembled = SequenceAssembler::new(self.media.clone(), config.fps)
            .assemble(&videos, &path)
            .await;
        drop(videos);
        let assembly = match assembled {
            Ok(assembly) => assembly,
            Err(e) => {
                if config.output_path.is_none() {
                    let _ = std::fs::remove_file(&path);
                }
                return Err(e);
            }
        };

        // ── Publish ──────────────────────────────────────────────────────
        progress.stage(0.98, "Publishing");
        let destination = destination_name(&chrono::Local::now());
        let publish_ref = self.publisher.publish(&path, &destination).await?;

        Ok(PublishedVideo {
            path,
            publish_ref,
            assembly,
            duration_secs,
        })
    }

    fn output_path(&self) -> Result<PathBuf, MovieError> {
        if let Some(path) = &self.config.output_path {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| MovieError::OutputWriteFailed {
                    path: path.clone(),
                    source,
                })?;
            }
            return Ok(path.clone());
        }

        let file = tempfile::Builder::new()
            .prefix("pdf_movie_")
            .suffix(".mp4")
            .tempfile()
            .map_err(|e| MovieError::Internal(format!("tempfile: {e}")))?;
        let (_, path) = file
            .keep()
            .map_err(|e| MovieError::Internal(format!("keeping output file: {e}")))?;
        Ok(path)
    }
}

/// Create the script provider: an injected one, else by name and model.
///
/// Gemini is built from the explicit key; other providers are left to the
/// factory and its own settings.
fn resolve_provider(
    config: &PipelineConfig,
    gemini_key: &str,
) -> Result<Arc<dyn LLMProvider>, MovieError> {
    if let Some(provider) = &config.provider {
        return Ok(Arc::clone(provider));
    }
    let name = config.script_provider_name();
    if name.eq_ignore_ascii_case("gemini") {
        let provider = GeminiProvider::new(gemini_key).with_model(config.script_model());
        return Ok(Arc::new(provider));
    }
    ProviderFactory::create_llm_provider(name, config.script_model()).map_err(|e| {
        MovieError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Fail unless `pages` is exactly `1..=total` in order.
fn ensure_pages(pages: impl Iterator<Item = usize>, total: usize, what: &str) -> Result<(), MovieError> {
    let pages: Vec<usize> = pages.collect();
    if pages.len() != total || pages.iter().enumerate().any(|(i, &p)| p != i + 1) {
        return Err(MovieError::Internal(format!(
            "Expected {what} for pages 1-{total}, got {} entries",
            pages.len()
        )));
    }
    Ok(())
}

/// The error followed by its `source()` chain, one cause per line.
fn diagnostics(error: &MovieError) -> String {
    let mut text = format!("error: {error}");
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(&format!("\ncaused by: {cause}"));
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SynthesisError;

    #[test]
    fn ensure_pages_accepts_exact_cover() {
        assert!(ensure_pages(1..=4, 4, "scripts").is_ok());
    }

    #[test]
    fn ensure_pages_rejects_gaps_and_extras() {
        assert!(ensure_pages([1, 2, 4].into_iter(), 3, "scripts").is_err());
        assert!(ensure_pages(1..=5, 4, "scripts").is_err());
        assert!(ensure_pages([2, 1].into_iter(), 2, "scripts").is_err());
    }

    #[test]
    fn diagnostics_include_cause_chain() {
        let err = MovieError::Synthesis {
            page: 2,
            source: SynthesisError::Auth("key revoked".into()),
        };
        let text = diagnostics(&err);
        assert!(text.starts_with("error: Speech synthesis failed for page 2"));
        assert!(text.contains("caused by: Authentication rejected: key revoked"));
        assert_eq!(text.lines().count(), 2);
        assert!(!text.contains("backtrace"));
    }

    #[test]
    fn status_converts_to_result() {
        let failed = RunStatus::Failed {
            error: MovieError::Internal("x".into()),
            diagnostics: String::new(),
        };
        assert!(!failed.is_completed());
        assert!(failed.into_result().is_err());
    }
}
