//! Run results.

use crate::pipeline::assemble::AssemblyPath;
use serde::Serialize;
use std::path::PathBuf;

/// What a completed run produced, for display and JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Pages narrated; always equals the document's page count.
    pub page_count: usize,
    pub chunk_count: usize,
    pub style_name: String,
    pub speaker_count: usize,
    /// Pages narrated with the fallback script.
    pub fallback_pages: Vec<usize>,
    /// Sum of all page segment durations.
    pub video_duration_secs: f64,
    pub assembly: AssemblyPath,
    pub publish_ref: String,
    /// Wall-clock time of the whole run.
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// Multi-line status text shown to the user at the end of a run.
    pub fn status_text(&self) -> String {
        let mut text = format!(
            "Done.\n\nPages: {}\nProgram style: {}\nSpeakers: {}\nDuration: {}\nPublished: {}",
            self.page_count,
            self.style_name,
            self.speaker_count,
            format_duration(self.video_duration_secs),
            self.publish_ref
        );
        if !self.fallback_pages.is_empty() {
            text.push_str(&format!(
                "\nFallback narration on page(s): {}",
                self.fallback_pages
                    .iter()
                    .map(usize::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        text
    }
}

fn format_duration(secs: f64) -> String {
    let total = secs.round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// A completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    /// Local copy of the final video.
    pub video_path: PathBuf,
    pub publish_ref: String,
    pub summary: RunSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> RunSummary {
        RunSummary {
            page_count: 12,
            chunk_count: 3,
            style_name: "duo-podcast".into(),
            speaker_count: 2,
            fallback_pages: vec![],
            video_duration_secs: 125.4,
            assembly: AssemblyPath::StreamCopy,
            publish_ref: "https://huggingface.co/datasets/me/v/blob/main/videos/x.mp4".into(),
            elapsed_ms: 1000,
        }
    }

    #[test]
    fn status_text_lists_the_essentials() {
        let text = summary().status_text();
        assert!(text.contains("Pages: 12"));
        assert!(text.contains("Program style: duo-podcast"));
        assert!(text.contains("Speakers: 2"));
        assert!(text.contains("Duration: 2:05"));
        assert!(text.contains("videos/x.mp4"));
        assert!(!text.contains("Fallback"));
    }

    #[test]
    fn status_text_mentions_fallbacks() {
        let mut s = summary();
        s.fallback_pages = vec![6, 7];
        assert!(s.status_text().ends_with("Fallback narration on page(s): 6, 7"));
    }

    #[test]
    fn summary_serialises() {
        let json = serde_json::to_value(summary()).unwrap();
        assert_eq!(json["assembly"], "stream_copy");
        assert_eq!(json["speaker_count"], 2);
    }
}
