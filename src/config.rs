//! Configuration types for a PDF-to-movie run.
//!
//! Every knob lives in [`PipelineConfig`], built via [`PipelineConfigBuilder`].
//! Service credentials are carried in an explicit [`Credentials`] value that
//! is handed to the orchestrator once; the only place the environment is
//! consulted is [`Credentials::from_env`].

use crate::error::MovieError;
use crate::progress::ProgressCallback;
use crate::styles::ProgramStyle;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default provider for script generation. Gemini accepts PDF attachments natively.
pub const DEFAULT_SCRIPT_PROVIDER: &str = "gemini";
/// Default model for script generation.
pub const DEFAULT_SCRIPT_MODEL: &str = "gemini-2.5-flash";
/// Default model for speech synthesis.
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// Credentials for the external services.
///
/// Values passed explicitly win; [`Credentials::or_defaults`] fills the gaps
/// from a second set (typically [`Credentials::from_env`]).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Key for the Gemini speech (and, by default, script) service.
    pub gemini_api_key: Option<String>,
    /// Hugging Face write token for dataset publishing.
    pub hf_token: Option<String>,
    /// Hugging Face dataset repository, e.g. `user/narrated-pdfs`.
    pub hf_repo_id: Option<String>,
}

impl Credentials {
    /// Read `GEMINI_API_KEY`, `HF_TOKEN` and `HF_REPO_ID`. Empty values count as absent.
    pub fn from_env() -> Self {
        let read = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            gemini_api_key: read("GEMINI_API_KEY"),
            hf_token: read("HF_TOKEN"),
            hf_repo_id: read("HF_REPO_ID"),
        }
    }

    /// Keep explicit values, take anything missing from `defaults`.
    pub fn or_defaults(self, defaults: Credentials) -> Self {
        Self {
            gemini_api_key: non_empty(self.gemini_api_key).or(defaults.gemini_api_key),
            hf_token: non_empty(self.hf_token).or(defaults.hf_token),
            hf_repo_id: non_empty(self.hf_repo_id).or(defaults.hf_repo_id),
        }
    }

    /// The Gemini key, or the input error the run must stop with.
    pub fn require_gemini_key(&self) -> Result<&str, MovieError> {
        self.gemini_api_key
            .as_deref()
            .ok_or_else(|| MovieError::MissingCredential {
                name: "GEMINI_API_KEY".into(),
                hint: "Pass --gemini-api-key or export GEMINI_API_KEY.".into(),
            })
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("hf_token", &redact(&self.hf_token))
            .field("hf_repo_id", &self.hf_repo_id)
            .finish()
    }
}

/// Configuration for one PDF-to-movie run.
///
/// # Example
/// ```rust
/// use pdf2movie::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .chunk_size(4)
///     .audio_speed(1.1)
///     .style_name("duo-podcast")
///     .unwrap()
///     .build()
///     .unwrap();
/// assert_eq!(config.style.speaker_count(), 2);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Pages sent to the script generator per request. Default: 5.
    ///
    /// Larger chunks give the model more context per call but make a single
    /// malformed response cost more pages of fallback narration.
    pub chunk_size: usize,

    /// Playback tempo multiplier applied by resampling. Default: 1.2.
    pub audio_speed: f64,

    /// Silence prepended to every page's audio, in milliseconds. Default: 1000.
    pub silence_before_ms: u32,

    /// Silence appended to every page's audio, in milliseconds. Default: 500.
    pub silence_after_ms: u32,

    /// Output frame rate. Default: 24.
    pub fps: u32,

    /// Output frame width in pixels. Default: 1920.
    pub width: u32,

    /// Output frame height in pixels. Default: 1080.
    pub height: u32,

    /// Rasterisation DPI for page stills. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Program style for the whole run. Default: `solo-radio`.
    pub style: ProgramStyle,

    /// Script-generation model. If None, uses [`DEFAULT_SCRIPT_MODEL`].
    pub model: Option<String>,

    /// Script-generation provider name (e.g. "gemini", "openai").
    /// If None, uses [`DEFAULT_SCRIPT_PROVIDER`].
    pub provider_name: Option<String>,

    /// Pre-constructed script-generation provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for script generation. Default: 0.7.
    pub temperature: f32,

    /// Maximum tokens the script generator may produce per chunk. Default: 8192.
    pub max_tokens: usize,

    /// Speech-synthesis model. Default: [`DEFAULT_TTS_MODEL`].
    pub tts_model: String,

    /// Total synthesis attempts per page, including the first. Default: 5.
    pub max_attempts: u32,

    /// Base delay of the linear rate-limit backoff, in milliseconds. Default: 10 000.
    ///
    /// The wait before attempt `n + 1` is `retry_base_delay_ms × n`.
    pub retry_base_delay_ms: u64,

    /// Service credentials.
    pub credentials: Credentials,

    /// ffmpeg executable. Default: `ffmpeg` (resolved via PATH).
    pub ffmpeg_path: PathBuf,

    /// Directory (or full path) of the pdfium shared library. If None, the
    /// system library search path is used.
    pub pdfium_lib_path: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Where the final video is written. If None, a kept temp file is used.
    pub output_path: Option<PathBuf>,

    /// If set, each page's synthesised PCM is also kept here, unprocessed,
    /// as `page_NNNN.wav`.
    pub raw_audio_dir: Option<PathBuf>,

    /// Progress callback. If None, no events are emitted.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5,
            audio_speed: 1.2,
            silence_before_ms: 1000,
            silence_after_ms: 500,
            fps: 24,
            width: 1920,
            height: 1080,
            dpi: 150,
            style: ProgramStyle::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.7,
            max_tokens: 8192,
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            max_attempts: 5,
            retry_base_delay_ms: 10_000,
            credentials: Credentials::default(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            pdfium_lib_path: None,
            password: None,
            output_path: None,
            raw_audio_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("chunk_size", &self.chunk_size)
            .field("audio_speed", &self.audio_speed)
            .field("silence_before_ms", &self.silence_before_ms)
            .field("silence_after_ms", &self.silence_after_ms)
            .field("fps", &self.fps)
            .field("resolution", &format!("{}x{}", self.width, self.height))
            .field("dpi", &self.dpi)
            .field("style", &self.style.name)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("tts_model", &self.tts_model)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("credentials", &self.credentials)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("output_path", &self.output_path)
            .field("raw_audio_dir", &self.raw_audio_dir)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Provider name actually used for script generation.
    pub fn script_provider_name(&self) -> &str {
        self.provider_name
            .as_deref()
            .unwrap_or(DEFAULT_SCRIPT_PROVIDER)
    }

    /// Model actually used for script generation.
    pub fn script_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_SCRIPT_MODEL)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn chunk_size(mut self, pages: usize) -> Self {
        self.config.chunk_size = pages.max(1);
        self
    }

    pub fn audio_speed(mut self, speed: f64) -> Self {
        self.config.audio_speed = speed;
        self
    }

    pub fn silence_before_ms(mut self, ms: u32) -> Self {
        self.config.silence_before_ms = ms;
        self
    }

    pub fn silence_after_ms(mut self, ms: u32) -> Self {
        self.config.silence_after_ms = ms;
        self
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.config.fps = fps.clamp(1, 120);
        self
    }

    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.config.width = width;
        self.config.height = height;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn style(mut self, style: ProgramStyle) -> Self {
        self.config.style = style;
        self
    }

    /// Select a built-in style by name.
    pub fn style_name(self, name: &str) -> Result<Self, MovieError> {
        let style = ProgramStyle::by_name(name)?;
        Ok(self.style(style))
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn tts_model(mut self, model: impl Into<String>) -> Self {
        self.config.tts_model = model.into();
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_delay_ms = ms;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = credentials;
        self
    }

    pub fn ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ffmpeg_path = path.into();
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = Some(path.into());
        self
    }

    pub fn raw_audio_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.raw_audio_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, MovieError> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(MovieError::InvalidConfig("Chunk size must be ≥ 1".into()));
        }
        if !(c.audio_speed.is_finite() && c.audio_speed > 0.0) {
            return Err(MovieError::InvalidConfig(format!(
                "Audio speed must be a positive number, got {}",
                c.audio_speed
            )));
        }
        if c.width < 2 || c.height < 2 || c.width % 2 != 0 || c.height % 2 != 0 {
            // libx264 with yuv420p needs even dimensions.
            return Err(MovieError::InvalidConfig(format!(
                "Resolution must have even dimensions ≥ 2, got {}x{}",
                c.width, c.height
            )));
        }
        if c.max_attempts == 0 {
            return Err(MovieError::InvalidConfig(
                "Max attempts must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PipelineConfig::default();
        assert_eq!(c.chunk_size, 5);
        assert_eq!(c.audio_speed, 1.2);
        assert_eq!((c.silence_before_ms, c.silence_after_ms), (1000, 500));
        assert_eq!(c.fps, 24);
        assert_eq!((c.width, c.height), (1920, 1080));
        assert_eq!(c.script_provider_name(), DEFAULT_SCRIPT_PROVIDER);
        assert_eq!(c.script_model(), DEFAULT_SCRIPT_MODEL);
    }

    #[test]
    fn builder_clamps_and_validates() {
        let c = PipelineConfig::builder()
            .chunk_size(0)
            .dpi(1000)
            .max_attempts(0)
            .build()
            .unwrap();
        assert_eq!(c.chunk_size, 1);
        assert_eq!(c.dpi, 400);
        assert_eq!(c.max_attempts, 1);
    }

    #[test]
    fn builder_rejects_non_positive_speed() {
        let err = PipelineConfig::builder().audio_speed(0.0).build().unwrap_err();
        assert!(err.to_string().contains("Audio speed"));
    }

    #[test]
    fn builder_rejects_odd_resolution() {
        assert!(PipelineConfig::builder()
            .resolution(1921, 1080)
            .build()
            .is_err());
    }

    #[test]
    fn explicit_credentials_win_over_defaults() {
        let explicit = Credentials {
            gemini_api_key: Some("explicit".into()),
            hf_token: Some("  ".into()),
            hf_repo_id: None,
        };
        let env = Credentials {
            gemini_api_key: Some("env".into()),
            hf_token: Some("env-token".into()),
            hf_repo_id: Some("me/videos".into()),
        };
        let merged = explicit.or_defaults(env);
        assert_eq!(merged.gemini_api_key.as_deref(), Some("explicit"));
        assert_eq!(merged.hf_token.as_deref(), Some("env-token"));
        assert_eq!(merged.hf_repo_id.as_deref(), Some("me/videos"));
    }

    #[test]
    fn missing_gemini_key_is_an_input_error() {
        let err = Credentials::default().require_gemini_key().unwrap_err();
        assert!(matches!(err, MovieError::MissingCredential { .. }));
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = Credentials {
            gemini_api_key: Some("sk-secret".into()),
            hf_token: Some("hf_secret".into()),
            hf_repo_id: Some("me/videos".into()),
        };
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret"), "got: {dbg}");
        assert!(dbg.contains("me/videos"));
    }
}
