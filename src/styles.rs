//! Program styles: who is speaking, with which voice, in what tone.
//!
//! A [`ProgramStyle`] is selected once per run and never mutated. It drives
//! three decisions downstream:
//!
//! * the script prompt (tone guidance and, for two speakers, the names the
//!   model must use in the dialogue),
//! * the synthesis mode (single voice vs. multi-speaker transcript),
//! * the deterministic fallback script used when generation output is unusable.

use crate::error::MovieError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the style used when the caller does not pick one.
pub const DEFAULT_STYLE: &str = "solo-radio";

/// The part a speaker plays in the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Guest,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => f.write_str("host"),
            Role::Guest => f.write_str("guest"),
        }
    }
}

/// A named role bound to a display name and a synthesis voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerProfile {
    pub role: Role,
    /// Name used in the dialogue script and in the multi-speaker transcript.
    pub name: String,
    /// Prebuilt voice identifier understood by the speech service.
    pub voice: String,
    /// Delivery guidance passed to the speech service for this speaker.
    pub tts_style: String,
}

impl SpeakerProfile {
    fn new(role: Role, name: &str, voice: &str, tts_style: &str) -> Self {
        Self {
            role,
            name: name.to_string(),
            voice: voice.to_string(),
            tts_style: tts_style.to_string(),
        }
    }
}

/// An immutable preset describing speakers, voices and tone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramStyle {
    pub name: String,
    /// One-line description shown by `--list-styles`.
    pub description: String,
    pub host: SpeakerProfile,
    /// Present exactly when the style has two speakers.
    pub guest: Option<SpeakerProfile>,
    /// Tone and format guidance for script generation.
    pub script_guidance: String,
}

impl ProgramStyle {
    /// Number of distinct voices: 1 or 2.
    pub fn speaker_count(&self) -> usize {
        if self.guest.is_some() {
            2
        } else {
            1
        }
    }

    /// Profile for `role`, if the style has one.
    pub fn speaker(&self, role: Role) -> Option<&SpeakerProfile> {
        match role {
            Role::Host => Some(&self.host),
            Role::Guest => self.guest.as_ref(),
        }
    }

    /// Speakers in script order (host first).
    pub fn speakers(&self) -> impl Iterator<Item = &SpeakerProfile> {
        std::iter::once(&self.host).chain(self.guest.iter())
    }

    /// All built-in presets, default first.
    pub fn builtin() -> Vec<ProgramStyle> {
        vec![
            solo(
                "solo-radio",
                "One friendly radio DJ talking to listeners",
                SpeakerProfile::new(
                    Role::Host,
                    "Host",
                    "Kore",
                    "Read this like a friendly radio DJ, warm and conversational.",
                ),
                "As a friendly radio DJ, explain the PDF content in a warm tone, \
                 as if talking directly to the listener.",
            ),
            duo(
                "duo-podcast",
                "Two-person podcast: a calm host and a curious assistant",
                SpeakerProfile::new(
                    Role::Host,
                    "Takeshi",
                    "Kore",
                    "Read as a calm, composed male podcaster.",
                ),
                SpeakerProfile::new(
                    Role::Guest,
                    "Yumi",
                    "Puck",
                    "Speak as a bright, curious female assistant.",
                ),
                "Explain the PDF content as a conversation between the host Takeshi and \
                 the assistant Yumi. Takeshi explains calmly; Yumi asks questions and \
                 shares reactions.",
            ),
            duo(
                "duo-comedy",
                "Comedy double act: the funny one misreads, the straight one corrects",
                SpeakerProfile::new(
                    Role::Host,
                    "Straight",
                    "Charon",
                    "Deliver sharp, well-timed corrections as the straight man of a comedy duo.",
                ),
                SpeakerProfile::new(
                    Role::Guest,
                    "Funny",
                    "Fenrir",
                    "Speak a little absent-mindedly as the funny man of a comedy duo.",
                ),
                "Explain the PDF content humorously as a comedy duo. The Funny one \
                 misunderstands the content and the Straight one corrects it.",
            ),
            solo(
                "solo-news",
                "A newscaster reporting the content objectively",
                SpeakerProfile::new(
                    Role::Host,
                    "Anchor",
                    "Alnilam",
                    "Read as a professional newscaster, clear and composed.",
                ),
                "As a newscaster, report the PDF content objectively and clearly.",
            ),
            solo(
                "solo-lecture",
                "A professor giving a lecture",
                SpeakerProfile::new(
                    Role::Host,
                    "Professor",
                    "Charon",
                    "Explain calmly and carefully as a knowledgeable professor.",
                ),
                "As a university professor, explain the PDF content clearly in lecture form.",
            ),
            duo(
                "duo-interview",
                "An interviewer questioning an expert",
                SpeakerProfile::new(
                    Role::Host,
                    "Interviewer",
                    "Aoede",
                    "Ask questions as a curious interviewer.",
                ),
                SpeakerProfile::new(
                    Role::Guest,
                    "Expert",
                    "Charon",
                    "Explain confidently and politely as an expert.",
                ),
                "The Interviewer asks the Expert about the PDF content and the Expert \
                 answers in detail.",
            ),
        ]
    }

    /// Look up a built-in preset by name (case-insensitive).
    pub fn by_name(name: &str) -> Result<ProgramStyle, MovieError> {
        let wanted = name.trim().to_lowercase();
        let styles = Self::builtin();
        let known = styles
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        styles
            .iter()
            .find(|s| s.name == wanted)
            .cloned()
            .ok_or_else(|| MovieError::UnknownStyle {
                name: name.to_string(),
                known,
            })
    }
}

impl Default for ProgramStyle {
    fn default() -> Self {
        // The first built-in is the default style.
        Self::builtin().swap_remove(0)
    }
}

fn solo(name: &str, description: &str, host: SpeakerProfile, guidance: &str) -> ProgramStyle {
    ProgramStyle {
        name: name.to_string(),
        description: description.to_string(),
        host,
        guest: None,
        script_guidance: guidance.to_string(),
    }
}

fn duo(
    name: &str,
    description: &str,
    host: SpeakerProfile,
    guest: SpeakerProfile,
    guidance: &str,
) -> ProgramStyle {
    ProgramStyle {
        name: name.to_string(),
        description: description.to_string(),
        host,
        guest: Some(guest),
        script_guidance: guidance.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_solo_radio() {
        let style = ProgramStyle::default();
        assert_eq!(style.name, DEFAULT_STYLE);
        assert_eq!(style.speaker_count(), 1);
        assert_eq!(style.host.voice, "Kore");
    }

    #[test]
    fn builtin_names_are_unique() {
        let styles = ProgramStyle::builtin();
        let mut names: Vec<_> = styles.iter().map(|s| s.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), styles.len());
    }

    #[test]
    fn every_style_has_one_or_two_speakers() {
        for style in ProgramStyle::builtin() {
            let n = style.speakers().count();
            assert_eq!(n, style.speaker_count(), "{}", style.name);
            assert!(n == 1 || n == 2);
            if let Some(guest) = &style.guest {
                assert_ne!(guest.name, style.host.name, "{}", style.name);
                assert_eq!(guest.role, Role::Guest);
            }
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let style = ProgramStyle::by_name("  Duo-Podcast ").unwrap();
        assert_eq!(style.speaker_count(), 2);
        assert_eq!(style.speaker(Role::Guest).unwrap().name, "Yumi");
    }

    #[test]
    fn unknown_style_lists_known_names() {
        let err = ProgramStyle::by_name("opera").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("opera"));
        assert!(msg.contains("duo-interview"), "got: {msg}");
    }
}
