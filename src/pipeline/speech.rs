//! Speech synthesis: one request per page, single voice or two-speaker transcript.
//!
//! [`SpeechSynthesizer`] decides the request shape from the program style and
//! runs it through the injected [`RetryPolicy`]. [`GeminiSpeechClient`] is the
//! production [`SpeechService`], talking to the Gemini `generateContent` REST
//! endpoint with an audio response modality.

use crate::error::{MovieError, SynthesisError};
use crate::pipeline::audio::{RawAudio, SampleFormat};
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::script::{DialogueLine, PageScript};
use crate::prompts::{multi_speaker_prompt, single_speaker_prompt};
use crate::styles::{ProgramStyle, SpeakerProfile};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Base URL of the Gemini REST API.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// What to say and with which voices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechRequest {
    Single {
        text: String,
        voice: String,
        /// Delivery guidance.
        style: String,
    },
    Multi {
        lines: Vec<DialogueLine>,
        /// Host first, then guest.
        speakers: Vec<SpeakerProfile>,
    },
}

impl SpeechRequest {
    /// Request shape for `script` under `style`.
    ///
    /// A dialogue under a one-speaker style is read as narration; a narration
    /// under a two-speaker style becomes a single host line.
    pub fn for_script(script: &PageScript, style: &ProgramStyle) -> Self {
        match (&style.guest, script) {
            (None, script) => SpeechRequest::Single {
                text: script.as_narration(),
                voice: style.host.voice.clone(),
                style: style.host.tts_style.clone(),
            },
            (Some(_), PageScript::Dialogue(lines)) => SpeechRequest::Multi {
                lines: lines.clone(),
                speakers: style.speakers().cloned().collect(),
            },
            (Some(_), PageScript::Narration(text)) => SpeechRequest::Multi {
                lines: vec![DialogueLine::new(style.host.name.as_str(), text.as_str())],
                speakers: style.speakers().cloned().collect(),
            },
        }
    }

    /// Prompt text sent to the speech model.
    pub fn prompt(&self) -> String {
        match self {
            SpeechRequest::Single { text, style, .. } => single_speaker_prompt(style, text),
            SpeechRequest::Multi { lines, speakers } => multi_speaker_prompt(
                speakers,
                lines.iter().map(|l| (l.speaker.as_str(), l.text.as_str())),
            ),
        }
    }
}

/// A service that turns text into PCM audio.
#[async_trait]
pub trait SpeechService: Send + Sync {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<RawAudio, SynthesisError>;
}

/// Synthesises page scripts for a fixed style under a retry policy.
pub struct SpeechSynthesizer {
    service: Arc<dyn SpeechService>,
    policy: RetryPolicy,
    style: ProgramStyle,
}

impl SpeechSynthesizer {
    pub fn new(service: Arc<dyn SpeechService>, policy: RetryPolicy, style: ProgramStyle) -> Self {
        Self {
            service,
            policy,
            style,
        }
    }

    pub async fn synthesize_page(&self, page: usize, script: &PageScript) -> Result<RawAudio, MovieError> {
        let request = SpeechRequest::for_script(script, &self.style);
        self.policy
            .run(|attempt| {
                debug!("Page {}: synthesis attempt {}", page, attempt);
                self.service.synthesize(&request)
            })
            .await
            .map_err(|source| MovieError::Synthesis { page, source })
    }
}

/// [`SpeechService`] for the Gemini text-to-speech models.
pub struct GeminiSpeechClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiSpeechClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    /// Point the client at a different API root (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl SpeechService for GeminiSpeechClient {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<RawAudio, SynthesisError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| SynthesisError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| SynthesisError::Transport(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(classify_failure(status, retry_after.as_deref(), &body));
        }
        decode_audio_response(&body)
    }
}

/// JSON body of a `generateContent` request with audio output.
pub fn request_body(request: &SpeechRequest) -> Value {
    let speech_config = match request {
        SpeechRequest::Single { voice, .. } => json!({
            "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
        }),
        SpeechRequest::Multi { speakers, .. } => {
            let configs: Vec<Value> = speakers
                .iter()
                .map(|s| {
                    json!({
                        "speaker": s.name,
                        "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": s.voice } }
                    })
                })
                .collect();
            json!({ "multiSpeakerVoiceConfig": { "speakerVoiceConfigs": configs } })
        }
    };

    json!({
        "contents": [{ "parts": [{ "text": request.prompt() }] }],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": speech_config,
        }
    })
}

/// Map a non-success HTTP answer to a [`SynthesisError`].
pub fn classify_failure(status: u16, retry_after: Option<&str>, body: &str) -> SynthesisError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(500).collect());

    if status == 429 || body.contains("RESOURCE_EXHAUSTED") {
        return SynthesisError::RateLimited {
            retry_after_secs: retry_after.and_then(|v| v.trim().parse().ok()),
        };
    }
    match status {
        401 | 403 => SynthesisError::Auth(message),
        _ => SynthesisError::Api { status, message },
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

/// Extract the PCM payload from a successful response body.
pub fn decode_audio_response(body: &str) -> Result<RawAudio, SynthesisError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| SynthesisError::MalformedResponse(format!("invalid JSON: {e}")))?;

    let inline = parsed
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.inline_data)
        .ok_or_else(|| SynthesisError::MalformedResponse("no inline audio in response".into()))?;

    let pcm = STANDARD
        .decode(inline.data.as_bytes())
        .map_err(|e| SynthesisError::MalformedResponse(format!("invalid base64 audio: {e}")))?;
    if pcm.is_empty() {
        return Err(SynthesisError::MalformedResponse("empty audio payload".into()));
    }

    let mut format = SampleFormat::default();
    if let Some(rate) = mime_rate(&inline.mime_type) {
        format.sample_rate = rate;
    }
    Ok(RawAudio::new(pcm, format))
}

/// `audio/L16;codec=pcm;rate=24000` → 24000.
fn mime_rate(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|p| p.trim().strip_prefix("rate="))
        .find_map(|r| r.parse().ok())
}
