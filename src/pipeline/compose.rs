//! Page composition: one letterboxed still plus one audio track → one MP4 segment.

use crate::error::MovieError;
use crate::pipeline::audio::ProcessedAudio;
use crate::pipeline::media::{args, MediaTool};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::debug;

/// Placement of a scaled page inside the output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

/// Fit `src_w × src_h` inside `target_w × target_h`, preserving aspect ratio.
///
/// The constrained side is filled exactly; the other is truncated, then the
/// result is centred (offsets rounded down).
pub fn letterbox_dims(src_w: u32, src_h: u32, target_w: u32, target_h: u32) -> Placement {
    let src_ratio = src_w.max(1) as f64 / src_h.max(1) as f64;
    let target_ratio = target_w as f64 / target_h as f64;

    let (width, height) = if src_ratio > target_ratio {
        (target_w, (target_w as f64 / src_ratio) as u32)
    } else {
        ((target_h as f64 * src_ratio) as u32, target_h)
    };
    let (width, height) = (width.clamp(1, target_w), height.clamp(1, target_h));

    Placement {
        width,
        height,
        x: (target_w - width) / 2,
        y: (target_h - height) / 2,
    }
}

/// Scale `image` into a black `width × height` frame without cropping.
pub fn letterbox(image: &DynamicImage, width: u32, height: u32) -> RgbImage {
    let place = letterbox_dims(image.width(), image.height(), width, height);
    let scaled = image
        .resize_exact(place.width, place.height, FilterType::Lanczos3)
        .to_rgb8();

    let mut frame = RgbImage::new(width, height);
    imageops::overlay(&mut frame, &scaled, place.x as i64, place.y as i64);
    frame
}

/// A rendered page segment. The file is deleted when this is dropped.
#[derive(Debug)]
pub struct PageVideo {
    pub page: usize,
    file: NamedTempFile,
    pub duration_secs: f64,
}

impl PageVideo {
    pub fn new(page: usize, file: NamedTempFile, duration_secs: f64) -> Self {
        Self {
            page,
            file,
            duration_secs,
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// ffmpeg arguments for a still-image segment of exactly `duration_secs`.
pub fn segment_args(frame: &Path, audio: &Path, duration_secs: f64, fps: u32, out: &Path) -> Vec<OsString> {
    let fps = fps.to_string();
    let duration = format!("{duration_secs:.3}");

    let mut a = args(&["-y", "-loop", "1", "-framerate", &fps, "-i"]);
    a.push(frame.as_os_str().to_owned());
    a.push("-i".into());
    a.push(audio.as_os_str().to_owned());
    a.extend(args(&[
        "-t",
        &duration,
        "-c:v",
        "libx264",
        "-tune",
        "stillimage",
        "-pix_fmt",
        "yuv420p",
        "-r",
        &fps,
        "-c:a",
        "aac",
    ]));
    a.push(out.as_os_str().to_owned());
    a
}

/// Renders page segments at a fixed resolution and frame rate.
pub struct PageCompositor {
    tool: Arc<dyn MediaTool>,
    width: u32,
    height: u32,
    fps: u32,
}

impl PageCompositor {
    pub fn new(tool: Arc<dyn MediaTool>, width: u32, height: u32, fps: u32) -> Self {
        Self {
            tool,
            width,
            height,
            fps,
        }
    }

    /// Compose page `page` from its still and its processed audio.
    pub async fn compose_page(
        &self,
        page: usize,
        image: DynamicImage,
        audio: &ProcessedAudio,
    ) -> Result<PageVideo, MovieError> {
        let (width, height) = (self.width, self.height);
        let frame = tokio::task::spawn_blocking(move || write_frame(&image, width, height))
            .await
            .map_err(|e| MovieError::Internal(format!("Frame task panicked: {e}")))??;

        let out = tempfile::Builder::new()
            .prefix(&format!("pdf2movie-page-{page:04}-"))
            .suffix(".mp4")
            .tempfile()
            .map_err(|e| MovieError::Internal(format!("tempfile: {e}")))?;

        let argv = segment_args(frame.path(), audio.path(), audio.duration_secs, self.fps, out.path());
        self.tool.run(&argv).await?.into_result(self.tool.name())?;
        debug!("Page {}: segment {:.2}s → {}", page, audio.duration_secs, out.path().display());

        // `frame` drops here, deleting the PNG.
        Ok(PageVideo {
            page,
            file: out,
            duration_secs: audio.duration_secs,
        })
    }
}

fn write_frame(image: &DynamicImage, width: u32, height: u32) -> Result<NamedTempFile, MovieError> {
    let frame = letterbox(image, width, height);
    let file = tempfile::Builder::new()
        .prefix("pdf2movie-frame-")
        .suffix(".png")
        .tempfile()
        .map_err(|e| MovieError::Internal(format!("tempfile: {e}")))?;
    frame
        .save_with_format(file.path(), ImageFormat::Png)
        .map_err(|e| MovieError::Internal(format!("Failed to write frame: {e}")))?;
    Ok(file)
}
