//! Sequence assembly: concatenate page segments into the final video.
//!
//! Segments produced by the compositor share codec parameters, so the concat
//! demuxer can join them without re-encoding. When it cannot (odd segment,
//! container quirk), the filter-graph concat re-encodes everything, which is
//! slow but tolerant.

use crate::error::MovieError;
use crate::pipeline::compose::PageVideo;
use crate::pipeline::media::{args, MediaTool};
use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Which strategy produced the final file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyPath {
    StreamCopy,
    Reencode,
}

impl fmt::Display for AssemblyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyPath::StreamCopy => f.write_str("stream copy"),
            AssemblyPath::Reencode => f.write_str("re-encode"),
        }
    }
}

/// Concat-demuxer list: one `file '<path>'` line per segment.
pub fn concat_list(segments: &[&Path]) -> String {
    segments
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}

fn stream_copy_args(list: &Path, out: &Path) -> Vec<OsString> {
    let mut a = args(&["-y", "-f", "concat", "-safe", "0", "-i"]);
    a.push(list.as_os_str().to_owned());
    a.extend(args(&["-c", "copy"]));
    a.push(out.as_os_str().to_owned());
    a
}

fn reencode_args(segments: &[&Path], fps: u32, out: &Path) -> Vec<OsString> {
    let mut a = args(&["-y"]);
    for seg in segments {
        a.push("-i".into());
        a.push(seg.as_os_str().to_owned());
    }
    let inputs: String = (0..segments.len()).map(|i| format!("[{i}:v][{i}:a]")).collect();
    let graph = format!("{inputs}concat=n={}:v=1:a=1[v][a]", segments.len());
    let fps = fps.to_string();
    a.extend(args(&[
        "-filter_complex",
        &graph,
        "-map",
        "[v]",
        "-map",
        "[a]",
        "-c:v",
        "libx264",
        "-pix_fmt",
        "yuv420p",
        "-c:a",
        "aac",
        "-r",
        &fps,
    ]));
    a.push(out.as_os_str().to_owned());
    a
}

/// Joins page segments with a stream-copy fast path and a re-encode fallback.
pub struct SequenceAssembler {
    tool: Arc<dyn MediaTool>,
    fps: u32,
}

impl SequenceAssembler {
    pub fn new(tool: Arc<dyn MediaTool>, fps: u32) -> Self {
        Self { tool, fps }
    }

    /// Concatenate `videos` (already in page order) into `output`.
    pub async fn assemble(&self, videos: &[PageVideo], output: &Path) -> Result<AssemblyPath, MovieError> {
        if videos.is_empty() {
            return Err(MovieError::InvalidConfig("No page segments to assemble".into()));
        }
        let segments: Vec<&Path> = videos.iter().map(PageVideo::path).collect();

        let mut list = tempfile::Builder::new()
            .prefix("pdf2movie-concat-")
            .suffix(".txt")
            .tempfile()
            .map_err(|e| MovieError::Internal(format!("tempfile: {e}")))?;
        list.write_all(concat_list(&segments).as_bytes())
            .and_then(|_| list.flush())
            .map_err(|e| MovieError::Internal(format!("concat list: {e}")))?;

        let fast = self.tool.run(&stream_copy_args(list.path(), output)).await?;
        if fast.success {
            info!("Assembled {} segments by stream copy", segments.len());
            return Ok(AssemblyPath::StreamCopy);
        }

        warn!(
            "Stream-copy concat failed ({}): {}; re-encoding",
            fast.status,
            fast.stderr.trim()
        );
        self.tool
            .run(&reencode_args(&segments, self.fps, output))
            .await?
            .into_result(self.tool.name())?;
        info!("Assembled {} segments by re-encode", segments.len());
        Ok(AssemblyPath::Reencode)
    }
}
