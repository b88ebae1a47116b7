//! Prompt text for the script generator and the speech synthesiser.
//!
//! Every natural-language instruction sent to an external service is built
//! here so prompt wording can change without touching retry, decoding or
//! fallback logic, and so tests can inspect prompts without a live model.

use crate::pipeline::split::ChunkPosition;
use crate::styles::{ProgramStyle, SpeakerProfile};
use std::fmt::Write;

/// System message for script generation.
pub const SCRIPT_SYSTEM_PROMPT: &str = "You are an expert narration scriptwriter. \
You always answer with a single JSON object and nothing else.";

const SCRIPT_RULES: &str = r#"IMPORTANT
1. Read every page of the attached PDF carefully.
2. Take in every element: text, tables, figures, images and charts.
3. Write the narration only after you understand what each page actually says.

FORMAT REQUIREMENTS
- Each page's script should take 30 seconds to 1 minute to read aloud.
- Base the narration on the PDF's actual content; be specific and informative.
- Vague lines such as "This is the content of page X" are forbidden.
- Always include the concrete information, data and explanations on the page."#;

/// Instructions that depend on where the chunk sits in the program.
pub fn position_instructions(position: ChunkPosition) -> &'static str {
    match position {
        ChunkPosition::Only => {
            "This attachment is the whole document. Open page_1 with a short introduction \
             to the program and the document, and end the last page with a brief conclusion \
             that wraps up the program."
        }
        ChunkPosition::Opening => {
            "This attachment is the beginning of a longer document. Open page_1 with a short \
             introduction to the program and the document. Do not conclude: the program \
             continues after the last page."
        }
        ChunkPosition::Middle => {
            "This attachment comes from the middle of a longer document. Do not greet the \
             audience, do not introduce the program and do not conclude; continue as an \
             ongoing program."
        }
        ChunkPosition::Closing => {
            "This attachment is the end of a longer document. Do not re-introduce the \
             program. End the last page with a brief conclusion that wraps up the whole \
             program."
        }
    }
}

/// Output-format instructions for the style's speaker count.
pub fn format_instructions(style: &ProgramStyle) -> String {
    match &style.guest {
        None => r#"OUTPUT FORMAT: a JSON object. Each value is the full narration for one page.
```json
{
    "page_1": "Full narration...",
    "page_2": "Full narration..."
}
```"#
            .to_string(),
        Some(guest) => {
            let host = &style.host.name;
            let guest = &guest.name;
            format!(
                r#"OUTPUT FORMAT: a JSON object. Each value is the dialogue for one page.
Use exactly the speaker names "{host}" and "{guest}".
```json
{{
    "page_1": [
        {{"speaker": "{host}", "text": "Line 1"}},
        {{"speaker": "{guest}", "text": "Line 2"}}
    ],
    "page_2": [...]
}}
```"#
            )
        }
    }
}

/// Full user prompt for one chunk.
///
/// Keys are chunk-relative (`page_1` is the first page of the attachment)
/// because models count attachment pages reliably but not document offsets.
pub fn script_prompt(style: &ProgramStyle, page_numbers: &[usize], position: ChunkPosition) -> String {
    let mut prompt = String::with_capacity(2048);
    let _ = writeln!(prompt, "{SCRIPT_RULES}\n");
    let _ = writeln!(prompt, "SCRIPT STYLE\n{}\n", style.script_guidance);
    let _ = writeln!(prompt, "PROGRAM POSITION\n{}\n", position_instructions(position));
    let _ = writeln!(prompt, "{}\n", format_instructions(style));

    let listed = page_numbers
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(
        prompt,
        "The attachment has {} page(s), which are pages {} of the original document. \
         Return exactly the keys page_1 to page_{}.",
        page_numbers.len(),
        listed,
        page_numbers.len()
    );
    let _ = write!(
        prompt,
        "Analyse the PDF in detail and write a script that gives the audience real value."
    );
    prompt
}

/// Prompt for single-speaker synthesis.
pub fn single_speaker_prompt(tts_style: &str, text: &str) -> String {
    format!("{tts_style}\n\nRead the following text aloud:\n{text}")
}

/// Prompt for two-speaker synthesis. `transcript` is `(speaker, text)` lines.
pub fn multi_speaker_prompt<'a>(
    speakers: &[SpeakerProfile],
    transcript: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut prompt = format!(
        "Read the following conversation with {} speakers.\n\n",
        speakers.len()
    );
    for speaker in speakers {
        let _ = writeln!(prompt, "{}'s delivery: {}", speaker.name, speaker.tts_style);
    }
    prompt.push_str("\nConversation:\n");
    for (speaker, text) in transcript {
        let _ = writeln!(prompt, "{speaker}: {text}");
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solo_prompt_asks_for_strings() {
        let style = ProgramStyle::by_name("solo-news").unwrap();
        let prompt = script_prompt(&style, &[6, 7, 8], ChunkPosition::Middle);
        assert!(prompt.contains("pages 6, 7, 8"));
        assert!(prompt.contains("page_1 to page_3"));
        assert!(prompt.contains("Full narration"));
        assert!(prompt.contains(&style.script_guidance));
        assert!(prompt.contains("do not conclude"));
    }

    #[test]
    fn duo_prompt_names_both_speakers() {
        let style = ProgramStyle::by_name("duo-podcast").unwrap();
        let prompt = script_prompt(&style, &[1], ChunkPosition::Only);
        assert!(prompt.contains(r#""speaker": "Takeshi""#));
        assert!(prompt.contains(r#""speaker": "Yumi""#));
        assert!(prompt.contains("introduction"));
        assert!(prompt.contains("conclusion"));
    }

    #[test]
    fn position_wording_differs() {
        assert!(position_instructions(ChunkPosition::Opening).contains("introduction"));
        assert!(!position_instructions(ChunkPosition::Opening).contains("wraps up"));
        assert!(position_instructions(ChunkPosition::Closing).contains("conclusion"));
        assert!(position_instructions(ChunkPosition::Closing).contains("Do not re-introduce"));
    }

    #[test]
    fn multi_speaker_prompt_lists_transcript_in_order() {
        let style = ProgramStyle::by_name("duo-interview").unwrap();
        let speakers: Vec<_> = style.speakers().cloned().collect();
        let prompt = multi_speaker_prompt(
            &speakers,
            [("Interviewer", "What is this?"), ("Expert", "A chart.")],
        );
        let q = prompt.find("Interviewer: What is this?").unwrap();
        let a = prompt.find("Expert: A chart.").unwrap();
        assert!(q < a);
        assert!(prompt.contains("Expert's delivery"));
    }

    #[test]
    fn single_speaker_prompt_puts_style_first() {
        let p = single_speaker_prompt("Be calm.", "Hello.");
        assert!(p.starts_with("Be calm."));
        assert!(p.ends_with("Hello."));
    }
}
