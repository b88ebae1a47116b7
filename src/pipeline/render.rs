//! PDF access via pdfium: binding, page count, and page rasterisation.
//!
//! pdfium keeps thread-local state and is not safe to drive from async
//! contexts, so every entry point here moves the work onto
//! `tokio::task::spawn_blocking`.

use crate::error::MovieError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Longest edge of a rasterised page, independent of DPI.
///
/// Keeps an A0 poster from allocating a 12 000 px bitmap; frames are 1080p
/// by default so nothing above this survives letterboxing anyway.
pub const MAX_RENDERED_PIXELS: i32 = 2400;

/// Bind to pdfium, either at an explicit location or via the system search path.
///
/// `lib_path` may name the library file itself or the directory containing it.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, MovieError> {
    let bindings = match lib_path {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
        }
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| MovieError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

/// Open a document, translating pdfium's error into a [`MovieError`].
pub(crate) fn open_document<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, MovieError> {
    pdfium
        .load_pdf_from_file(path, password)
        .map_err(|e| MovieError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })
}

/// Count the pages of a PDF.
pub async fn page_count(
    pdf_path: &Path,
    lib_path: Option<&Path>,
    password: Option<&str>,
) -> Result<usize, MovieError> {
    let path = pdf_path.to_path_buf();
    let lib = lib_path.map(Path::to_path_buf);
    let pwd = password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium(lib.as_deref())?;
        let document = open_document(&pdfium, &path, pwd.as_deref())?;
        Ok(document.pages().len() as usize)
    })
    .await
    .map_err(|e| MovieError::Internal(format!("Page-count task panicked: {e}")))?
}

/// Rasterise every page of a PDF, in page order.
///
/// # Returns
/// `(page_num_1based, image)` tuples covering pages `1..=N`.
pub async fn render_pages(
    pdf_path: &Path,
    dpi: u32,
    lib_path: Option<&Path>,
    password: Option<&str>,
) -> Result<Vec<(usize, DynamicImage)>, MovieError> {
    let path = pdf_path.to_path_buf();
    let lib: Option<PathBuf> = lib_path.map(Path::to_path_buf);
    let pwd = password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&path, dpi, lib.as_deref(), pwd.as_deref())
    })
    .await
    .map_err(|e| MovieError::Internal(format!("Render task panicked: {e}")))?
}

fn render_pages_blocking(
    pdf_path: &Path,
    dpi: u32,
    lib_path: Option<&Path>,
    password: Option<&str>,
) -> Result<Vec<(usize, DynamicImage)>, MovieError> {
    let pdfium = bind_pdfium(lib_path)?;
    let document = open_document(&pdfium, pdf_path, password)?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(MAX_RENDERED_PIXELS)
        .set_maximum_height(MAX_RENDERED_PIXELS);

    let pages = document.pages();
    let total = pages.len() as usize;
    let mut results = Vec::with_capacity(total);

    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx + 1;
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            MovieError::RasterisationFailed {
                page: page_num,
                detail: format!("{e:?}"),
            }
        })?;

        // Frames are opaque; dropping alpha halves the memory held until compose.
        let image = DynamicImage::ImageRgb8(bitmap.as_image().to_rgb8());
        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );
        results.push((page_num, image));
    }

    info!("Rasterised {} pages at {} DPI", results.len(), dpi);
    Ok(results)
}
