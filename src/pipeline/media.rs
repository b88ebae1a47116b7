//! External media tool invocation (ffmpeg).
//!
//! The compositor and assembler only build argument lists; running them goes
//! through [`MediaTool`], so tests can assert on the exact invocations and
//! script exit codes without ffmpeg installed.

use crate::error::MovieError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::debug;

/// Outcome of one tool invocation that got as far as running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    /// Human-readable exit status, e.g. `exit status: 1`.
    pub status: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Turn a failed run into [`MovieError::ToolFailed`].
    pub fn into_result(self, tool: &str) -> Result<(), MovieError> {
        if self.success {
            Ok(())
        } else {
            Err(MovieError::ToolFailed {
                tool: tool.to_string(),
                status: self.status,
                stderr: tail(&self.stderr, 2000),
            })
        }
    }
}

/// Keep the last `max` bytes of tool output, where the actual error usually is.
fn tail(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.trim().to_string();
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", s[start..].trim())
}

/// Something that runs a media command line.
///
/// Errors are reserved for "could not run at all"; a non-zero exit is a
/// successful call with `success == false`.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Display name used in errors.
    fn name(&self) -> &str;

    async fn run(&self, args: &[OsString]) -> Result<ToolOutput, MovieError>;
}

/// Runs the `ffmpeg` executable as a subprocess.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    path: PathBuf,
}

impl FfmpegTool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn run(&self, args: &[OsString]) -> Result<ToolOutput, MovieError> {
        debug!(
            "{} {}",
            self.path.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let output = tokio::process::Command::new(&self.path)
            .args(["-hide_banner", "-loglevel", "error"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| MovieError::ToolLaunchFailed {
                tool: self.path.display().to_string(),
                source,
            })?;

        Ok(ToolOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Owned argument list from string pieces; paths are pushed separately.
pub(crate) fn args(parts: &[&str]) -> Vec<OsString> {
    parts.iter().map(OsString::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_output_becomes_tool_failed() {
        let out = ToolOutput {
            success: false,
            status: "exit status: 1".into(),
            stderr: "  Unknown encoder 'libx264'\n".into(),
        };
        match out.into_result("ffmpeg") {
            Err(MovieError::ToolFailed { tool, stderr, .. }) => {
                assert_eq!(tool, "ffmpeg");
                assert_eq!(stderr, "Unknown encoder 'libx264'");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn long_stderr_keeps_the_tail() {
        let long = format!("{}THE ERROR", "x".repeat(5000));
        let t = tail(&long, 100);
        assert!(t.ends_with("THE ERROR"));
        assert!(t.chars().count() <= 101);
    }

    #[tokio::test]
    async fn missing_binary_is_a_launch_failure() {
        let tool = FfmpegTool::new("/nonexistent/ffmpeg-for-tests");
        let err = tool.run(&args(&["-version"])).await.unwrap_err();
        assert!(matches!(err, MovieError::ToolLaunchFailed { .. }));
    }
}
