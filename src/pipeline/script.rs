//! Script generation: one request per chunk, decoded into one script per page.
//!
//! The generation service is unreliable in content but not in availability:
//! it usually answers, but what it answers may be fenced, prefixed with
//! chatter, missing pages or shaped for the wrong number of speakers. This
//! module turns whatever comes back into a [`PageScriptMap`] whose key set is
//! exactly the chunk's page set:
//!
//! 1. locate a JSON object (fenced ```` ```json ```` block, else the whole
//!    text, else the outermost `{...}` span),
//! 2. decode each `page_i` entry as a tagged union (string or line list),
//! 3. validate entries against the program style,
//! 4. fill every missing or invalid page with a deterministic fallback.
//!
//! Only service-level failures (transport, auth, provider errors) surface as
//! [`MovieError`]; malformed content never does.

use crate::error::{MovieError, ScriptDecodeError};
use crate::pipeline::split::{Chunk, ChunkDocument, ChunkPosition};
use crate::prompts::{script_prompt, SCRIPT_SYSTEM_PROMPT};
use crate::styles::ProgramStyle;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One spoken line of a two-speaker script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub speaker: String,
    pub text: String,
}

impl DialogueLine {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
        }
    }
}

/// The script for a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageScript {
    Narration(String),
    Dialogue(Vec<DialogueLine>),
}

impl PageScript {
    /// Deterministic script used when generation gave nothing usable for `page`.
    pub fn fallback(page: usize, style: &ProgramStyle) -> Self {
        match &style.guest {
            None => PageScript::Narration(format!("This is the content of page {page}.")),
            Some(guest) => PageScript::Dialogue(vec![
                DialogueLine::new(
                    style.host.name.as_str(),
                    format!("Let's take a look at page {page}."),
                ),
                DialogueLine::new(guest.name.as_str(), "Sounds good, go ahead."),
            ]),
        }
    }

    /// All spoken text as a single paragraph.
    pub fn as_narration(&self) -> String {
        match self {
            PageScript::Narration(text) => text.clone(),
            PageScript::Dialogue(lines) => lines
                .iter()
                .map(|l| l.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Scripts keyed by absolute page number.
pub type PageScriptMap = BTreeMap<usize, PageScript>;

/// Everything the generation service needs for one chunk.
#[derive(Debug, Clone, Copy)]
pub struct ScriptRequest<'a> {
    /// The chunk sub-document (a complete PDF).
    pub document: &'a [u8],
    /// Absolute page numbers contained in `document`, in order.
    pub page_numbers: &'a [usize],
    /// Full prompt text, see [`crate::prompts::script_prompt`].
    pub instructions: &'a str,
    pub position: ChunkPosition,
}

/// A service that writes narration for a PDF excerpt.
///
/// Returns the raw response text; decoding happens in [`ScriptGenerator`].
#[async_trait]
pub trait ScriptService: Send + Sync {
    async fn generate(&self, request: &ScriptRequest<'_>) -> Result<String, MovieError>;
}

/// [`ScriptService`] backed by an `edgequake-llm` provider.
///
/// The chunk PDF travels as an inline `application/pdf` attachment, which
/// Gemini models read natively (text, tables and figures alike).
pub struct LlmScriptService {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmScriptService {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl ScriptService for LlmScriptService {
    async fn generate(&self, request: &ScriptRequest<'_>) -> Result<String, MovieError> {
        let start = Instant::now();
        let attachment = ImageData::new(STANDARD.encode(request.document), "application/pdf");
        let messages = vec![
            ChatMessage::system(SCRIPT_SYSTEM_PROMPT),
            ChatMessage::user_with_images(request.instructions, vec![attachment]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| MovieError::ScriptGenerationFailed {
                start: request.page_numbers.first().copied().unwrap_or_default(),
                end: request.page_numbers.last().copied().unwrap_or_default(),
                message: e.to_string(),
            })?;

        debug!(
            "Script request for {} page(s): {} input tokens, {} output tokens, {:?}",
            request.page_numbers.len(),
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Resolved scripts for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkScripts {
    /// Exactly one script per page of the chunk.
    pub scripts: PageScriptMap,
    /// Pages that received the fallback script, ascending.
    pub fallback_pages: Vec<usize>,
}

/// Drives a [`ScriptService`] chunk by chunk for a fixed program style.
pub struct ScriptGenerator {
    service: Arc<dyn ScriptService>,
    style: ProgramStyle,
}

impl ScriptGenerator {
    pub fn new(service: Arc<dyn ScriptService>, style: ProgramStyle) -> Self {
        Self { service, style }
    }

    /// Generate scripts for a split chunk.
    pub async fn generate_chunk(&self, document: &ChunkDocument) -> Result<ChunkScripts, MovieError> {
        let bytes = document.read_bytes().await?;
        self.generate(document.chunk, &bytes).await
    }

    /// Generate scripts for `chunk` given its sub-document bytes.
    pub async fn generate(&self, chunk: Chunk, document: &[u8]) -> Result<ChunkScripts, MovieError> {
        let page_numbers: Vec<usize> = chunk.pages().collect();
        let position = chunk.position();
        let instructions = script_prompt(&self.style, &page_numbers, position);

        info!(
            "Generating scripts for chunk {}/{} (pages {}-{}, {:?})",
            chunk.index, chunk.total, chunk.start, chunk.end, position
        );
        let text = self
            .service
            .generate(&ScriptRequest {
                document,
                page_numbers: &page_numbers,
                instructions: &instructions,
                position,
            })
            .await?;

        let decoded = decode_scripts(&text, chunk, &self.style);
        if let Err(e) = &decoded {
            warn!(
                "Chunk {}/{}: unusable script response ({}); using fallback narration",
                chunk.index, chunk.total, e
            );
        }
        let resolved = resolve_scripts(decoded.unwrap_or_default(), chunk, &self.style);
        if !resolved.fallback_pages.is_empty() {
            warn!(
                "Chunk {}/{}: fallback script for page(s) {:?}",
                chunk.index, chunk.total, resolved.fallback_pages
            );
        }
        Ok(resolved)
    }
}

static JSON_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```json\s*([\s\S]*?)\s*```").unwrap());

/// Wire shape of one page entry before validation.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Narration(String),
    Dialogue(Vec<RawLine>),
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct RawLine {
    #[serde(default)]
    speaker: String,
    #[serde(default)]
    text: String,
}

/// Candidate JSON texts, most specific first.
fn candidates(text: &str) -> Vec<&str> {
    let mut out = Vec::with_capacity(3);
    if let Some(inner) = JSON_FENCE.captures(text).and_then(|c| c.get(1)) {
        out.push(inner.as_str());
    }
    out.push(text.trim());
    if let (Some(open), Some(close)) = (text.find('{'), text.rfind('}')) {
        if open < close {
            out.push(&text[open..=close]);
        }
    }
    out
}

/// Locate and parse the page object in a response.
fn parse_page_object(text: &str) -> Result<serde_json::Map<String, serde_json::Value>, ScriptDecodeError> {
    if text.trim().is_empty() {
        return Err(ScriptDecodeError::NoStructuredBlock);
    }

    let mut last_err = ScriptDecodeError::NoStructuredBlock;
    for candidate in candidates(text) {
        match serde_json::from_str::<serde_json::Value>(candidate) {
            Ok(serde_json::Value::Object(map)) => return Ok(map),
            Ok(_) => last_err = ScriptDecodeError::NotAPageMap,
            Err(e) => {
                if !matches!(last_err, ScriptDecodeError::NotAPageMap) {
                    last_err = ScriptDecodeError::InvalidJson(e);
                }
            }
        }
    }
    Err(last_err)
}

/// Parse a chunk-relative key (`page_3` → 3).
fn relative_index(key: &str) -> Option<usize> {
    key.trim()
        .strip_prefix("page_")?
        .parse::<usize>()
        .ok()
        .filter(|&i| i >= 1)
}

/// Decode a response into scripts keyed by absolute page.
///
/// Only valid entries for pages inside `chunk` are returned; keys outside the
/// chunk and entries of the wrong shape are dropped.
pub fn decode_scripts(
    text: &str,
    chunk: Chunk,
    style: &ProgramStyle,
) -> Result<PageScriptMap, ScriptDecodeError> {
    let object = parse_page_object(text)?;
    let mut scripts = PageScriptMap::new();

    for (key, value) in object {
        let Some(page) = relative_index(&key).and_then(|i| chunk.absolute_page(i)) else {
            debug!("Ignoring script key '{}' outside chunk {}-{}", key, chunk.start, chunk.end);
            continue;
        };
        let entry: RawEntry = serde_json::from_value(value)?;
        match validate_entry(entry, style) {
            Some(script) => {
                scripts.insert(page, script);
            }
            None => debug!("Page {}: script entry does not fit style '{}'", page, style.name),
        }
    }
    Ok(scripts)
}

fn validate_entry(entry: RawEntry, style: &ProgramStyle) -> Option<PageScript> {
    match (entry, &style.guest) {
        (RawEntry::Narration(text), None) => {
            let text = text.trim();
            (!text.is_empty()).then(|| PageScript::Narration(text.to_string()))
        }
        (RawEntry::Dialogue(lines), Some(guest)) => {
            let lines: Vec<DialogueLine> = lines
                .into_iter()
                .filter(|l| !l.text.trim().is_empty())
                .map(|l| {
                    // The multi-speaker transcript only knows the two configured names.
                    let speaker = if l.speaker.trim().eq_ignore_ascii_case(&guest.name) {
                        guest.name.clone()
                    } else {
                        style.host.name.clone()
                    };
                    DialogueLine::new(speaker, l.text.trim())
                })
                .collect();
            (!lines.is_empty()).then_some(PageScript::Dialogue(lines))
        }
        _ => None,
    }
}

/// Complete `decoded` so it covers exactly the pages of `chunk`.
pub fn resolve_scripts(mut decoded: PageScriptMap, chunk: Chunk, style: &ProgramStyle) -> ChunkScripts {
    let mut scripts = PageScriptMap::new();
    let mut fallback_pages = Vec::new();

    for page in chunk.pages() {
        let script = decoded.remove(&page).unwrap_or_else(|| {
            fallback_pages.push(page);
            PageScript::fallback(page, style)
        });
        scripts.insert(page, script);
    }

    ChunkScripts {
        scripts,
        fallback_pages,
    }
}
