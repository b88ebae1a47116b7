//! Error types for the pdf2movie library.
//!
//! Three error types map onto three places where failures are handled:
//!
//! * [`MovieError`]: **fatal**. The run cannot continue (bad input file,
//!   missing credential, ffmpeg failure that has no fallback). Returned as
//!   `Err(MovieError)` from the orchestrator and translated into
//!   [`crate::orchestrator::RunStatus::Failed`].
//!
//! * [`SynthesisError`]: raised at the speech-service boundary. The retry
//!   policy inspects it to tell "try later" apart from everything else; only
//!   when retries are exhausted (or the error is not retryable) does it become
//!   a [`MovieError::Synthesis`].
//!
//! * [`ScriptDecodeError`]: the generation service answered, but not with a
//!   usable page map. Never leaves the script adapter: a deterministic
//!   fallback script replaces whatever could not be decoded.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2movie library.
#[derive(Debug, Error)]
pub enum MovieError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// A credential the run needs was neither passed in nor found in the environment.
    #[error("Missing credential '{name}'.\n{hint}")]
    MissingCredential { name: String, hint: String },

    /// The requested program style does not exist.
    #[error("Unknown program style '{name}'. Known styles: {known}")]
    UnknownStyle { name: String, known: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The document has no pages, so there is nothing to narrate.
    #[error("PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Splitting pages into a chunk sub-document failed.
    #[error("Failed to split pages {start}-{end}: {detail}")]
    SplitFailed {
        start: usize,
        end: usize,
        detail: String,
    },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH (or --pdfium-lib) to the directory holding libpdfium."
    )]
    PdfiumBindingFailed(String),

    // ── Service errors ────────────────────────────────────────────────────
    /// The script-generation provider is not initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The script-generation service returned an error.
    #[error("Script generation failed for pages {start}-{end}: {message}")]
    ScriptGenerationFailed {
        start: usize,
        end: usize,
        message: String,
    },

    /// Speech synthesis failed for a page (after retries, where applicable).
    #[error("Speech synthesis failed for page {page}: {source}")]
    Synthesis {
        page: usize,
        #[source]
        source: SynthesisError,
    },

    // ── Media errors ──────────────────────────────────────────────────────
    /// Audio could not be decoded, resampled or written.
    #[error("Audio processing failed: {0}")]
    AudioProcessing(String),

    /// An external media tool could not be started at all.
    #[error("Failed to launch '{tool}': {source}\nIs ffmpeg installed and on PATH?")]
    ToolLaunchFailed {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// An external media tool ran but exited unsuccessfully.
    #[error("'{tool}' failed ({status}): {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    // ── Publish errors ────────────────────────────────────────────────────
    /// The publish backend rejected or failed the upload.
    #[error("Publishing to '{destination}' failed: {detail}")]
    PublishFailed { destination: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create, write or move an output file.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by a [`crate::pipeline::speech::SpeechService`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SynthesisError {
    /// The service asked us to slow down (HTTP 429 / `RESOURCE_EXHAUSTED`).
    #[error("Rate limit exceeded{}", .retry_after_secs.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// The credential was rejected (401/403).
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// Any other non-success answer from the service.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The service answered 200 but without audio we can use.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The request never got an answer.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl SynthesisError {
    /// `true` for the "try later" condition, the only one worth retrying.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SynthesisError::RateLimited { .. })
    }
}

/// Why a generation response could not be turned into a page map.
#[derive(Debug, Error)]
pub enum ScriptDecodeError {
    /// No JSON object could be located anywhere in the response text.
    #[error("response contains no structured block")]
    NoStructuredBlock,

    /// A candidate block was found but is not valid JSON.
    #[error("structured block is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The JSON parsed, but the top level is not an object keyed by page.
    #[error("structured block is not a page map")]
    NotAPageMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_display_with_retry() {
        let e = SynthesisError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert_eq!(e.to_string(), "Rate limit exceeded, retry after 30s");
        assert!(e.is_rate_limited());
    }

    #[test]
    fn rate_limit_display_without_retry() {
        let e = SynthesisError::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(e.to_string(), "Rate limit exceeded");
    }

    #[test]
    fn only_rate_limit_is_retryable() {
        assert!(!SynthesisError::Auth("bad key".into()).is_rate_limited());
        assert!(!SynthesisError::Api {
            status: 500,
            message: "boom".into()
        }
        .is_rate_limited());
        assert!(!SynthesisError::Transport("reset".into()).is_rate_limited());
    }

    #[test]
    fn synthesis_error_carries_page() {
        let e = MovieError::Synthesis {
            page: 7,
            source: SynthesisError::Auth("invalid key".into()),
        };
        let msg = e.to_string();
        assert!(msg.contains("page 7"), "got: {msg}");
        assert!(msg.contains("invalid key"), "got: {msg}");
    }

    #[test]
    fn tool_failed_display() {
        let e = MovieError::ToolFailed {
            tool: "ffmpeg".into(),
            status: "exit status: 1".into(),
            stderr: "Invalid data".into(),
        };
        assert!(e.to_string().contains("ffmpeg"));
        assert!(e.to_string().contains("Invalid data"));
    }
}
