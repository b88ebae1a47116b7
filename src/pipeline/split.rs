//! Segment splitting: partition the document into ordered page chunks.
//!
//! Chunks only exist to bound the size of each script-generation request and
//! to tell the generator where in the program it is. They never influence
//! final page order: everything downstream is keyed by absolute page number.

use crate::error::MovieError;
use crate::pipeline::render::{bind_pdfium, open_document};
use pdfium_render::prelude::*;
use std::io::Write;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// A contiguous range of pages processed by one generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based position of this chunk in the run.
    pub index: usize,
    /// Total number of chunks in the run.
    pub total: usize,
    /// First page, 1-based, inclusive.
    pub start: usize,
    /// Last page, 1-based, inclusive.
    pub end: usize,
}

impl Chunk {
    /// Number of pages in the chunk; always at least 1.
    pub fn page_count(&self) -> usize {
        self.end + 1 - self.start
    }

    /// Absolute page numbers covered by this chunk.
    pub fn pages(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }

    /// Absolute page number of the chunk-relative position `i` (1-based).
    pub fn absolute_page(&self, i: usize) -> Option<usize> {
        (i >= 1 && i <= self.page_count()).then(|| self.start + i - 1)
    }

    pub fn position(&self) -> ChunkPosition {
        ChunkPosition::of(self.index, self.total)
    }
}

/// Where a chunk sits in the whole program.
///
/// Decides whether the narration should open the show, close it, both, or
/// simply carry on from the previous chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPosition {
    /// The only chunk: introduce and conclude.
    Only,
    /// First of several: introduce, do not conclude.
    Opening,
    /// Neither first nor last: continue without greetings or wrap-up.
    Middle,
    /// Last of several: conclude, do not re-introduce.
    Closing,
}

impl ChunkPosition {
    pub fn of(index: usize, total: usize) -> Self {
        match (index <= 1, index >= total) {
            (true, true) => ChunkPosition::Only,
            (true, false) => ChunkPosition::Opening,
            (false, true) => ChunkPosition::Closing,
            (false, false) => ChunkPosition::Middle,
        }
    }
}

/// Partition pages `1..=total_pages` into chunks of at most `chunk_size` pages.
pub fn plan_chunks(total_pages: usize, chunk_size: usize) -> Result<Vec<Chunk>, MovieError> {
    if total_pages == 0 {
        return Err(MovieError::EmptyDocument {
            path: PathBuf::new(),
        });
    }
    if chunk_size == 0 {
        return Err(MovieError::InvalidConfig("Chunk size must be ≥ 1".into()));
    }

    let total = total_pages.div_ceil(chunk_size);
    Ok((0..total)
        .map(|i| {
            let start = i * chunk_size + 1;
            Chunk {
                index: i + 1,
                total,
                start,
                end: (start + chunk_size - 1).min(total_pages),
            }
        })
        .collect())
}

/// A chunk together with its transient sub-document.
///
/// The sub-document lives in a temp file that is deleted when this value is
/// dropped, i.e. right after the chunk's scripts have been generated.
#[derive(Debug)]
pub struct ChunkDocument {
    pub chunk: Chunk,
    file: NamedTempFile,
}

impl ChunkDocument {
    /// Wrap already-split sub-document bytes for `chunk`.
    pub fn from_bytes(chunk: Chunk, bytes: &[u8]) -> Result<Self, MovieError> {
        let split_err = |detail: String| MovieError::SplitFailed {
            start: chunk.start,
            end: chunk.end,
            detail,
        };
        let mut file = tempfile::Builder::new()
            .prefix("pdf2movie-chunk-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| split_err(e.to_string()))?;
        file.write_all(bytes).map_err(|e| split_err(e.to_string()))?;
        Ok(Self { chunk, file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Read the sub-document bytes for the generation request.
    pub async fn read_bytes(&self) -> Result<Vec<u8>, MovieError> {
        tokio::fs::read(self.path())
            .await
            .map_err(|e| MovieError::Internal(format!("Failed to read chunk document: {e}")))
    }
}

/// Split the PDF at `pdf_path` into one sub-document per planned chunk.
pub async fn split_document(
    pdf_path: &Path,
    chunk_size: usize,
    lib_path: Option<&Path>,
    password: Option<&str>,
) -> Result<Vec<ChunkDocument>, MovieError> {
    let path = pdf_path.to_path_buf();
    let lib = lib_path.map(Path::to_path_buf);
    let pwd = password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        split_document_blocking(&path, chunk_size, lib.as_deref(), pwd.as_deref())
    })
    .await
    .map_err(|e| MovieError::Internal(format!("Split task panicked: {e}")))?
}

fn split_document_blocking(
    pdf_path: &Path,
    chunk_size: usize,
    lib_path: Option<&Path>,
    password: Option<&str>,
) -> Result<Vec<ChunkDocument>, MovieError> {
    let pdfium = bind_pdfium(lib_path)?;
    let source = open_document(&pdfium, pdf_path, password)?;
    let total_pages = source.pages().len() as usize;

    let chunks = plan_chunks(total_pages, chunk_size).map_err(|e| match e {
        MovieError::EmptyDocument { .. } => MovieError::EmptyDocument {
            path: pdf_path.to_path_buf(),
        },
        other => other,
    })?;
    info!(
        "Splitting {} pages into {} chunks of ≤{}",
        total_pages,
        chunks.len(),
        chunk_size
    );

    chunks
        .into_iter()
        .map(|chunk| {
            let split_err = |detail: String| MovieError::SplitFailed {
                start: chunk.start,
                end: chunk.end,
                detail,
            };

            let mut sub = pdfium
                .create_new_pdf()
                .map_err(|e| split_err(format!("{e:?}")))?;
            let range = (chunk.start - 1) as PdfPageIndex..=(chunk.end - 1) as PdfPageIndex;
            sub.pages_mut()
                .copy_page_range_from_document(&source, range, 0)
                .map_err(|e| split_err(format!("{e:?}")))?;
            let bytes = sub.save_to_bytes().map_err(|e| split_err(format!("{e:?}")))?;

            debug!(
                "Chunk {}/{}: pages {}-{} → {} bytes",
                chunk.index,
                chunk.total,
                chunk.start,
                chunk.end,
                bytes.len()
            );
            ChunkDocument::from_bytes(chunk, &bytes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(chunks: &[Chunk]) -> Vec<usize> {
        chunks.iter().map(Chunk::page_count).collect()
    }

    #[test]
    fn twelve_pages_by_five() {
        let chunks = plan_chunks(12, 5).unwrap();
        assert_eq!(sizes(&chunks), vec![5, 5, 2]);
        assert_eq!(chunks[2].pages(), 11..=12);
        assert!(chunks.iter().all(|c| c.total == 3));
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn partitions_exactly_for_all_small_inputs() {
        for n in 1..=40 {
            for s in 1..=12 {
                let chunks = plan_chunks(n, s).unwrap();
                let pages: Vec<usize> = chunks.iter().flat_map(|c| c.pages()).collect();
                assert_eq!(pages, (1..=n).collect::<Vec<_>>(), "n={n} s={s}");
                assert!(chunks
                    .iter()
                    .all(|c| c.page_count() <= s && c.page_count() >= 1));
                assert_eq!(chunks.len(), n.div_ceil(s));
            }
        }
    }

    #[test]
    fn planning_is_deterministic() {
        assert_eq!(plan_chunks(17, 4).unwrap(), plan_chunks(17, 4).unwrap());
    }

    #[test]
    fn empty_document_is_an_error() {
        assert!(matches!(
            plan_chunks(0, 5),
            Err(MovieError::EmptyDocument { .. })
        ));
    }

    #[test]
    fn zero_chunk_size_is_an_error() {
        assert!(matches!(plan_chunks(3, 0), Err(MovieError::InvalidConfig(_))));
    }

    #[test]
    fn relative_positions_map_to_absolute_pages() {
        let chunk = plan_chunks(8, 5).unwrap()[1];
        assert_eq!(chunk.pages(), 6..=8);
        assert_eq!(chunk.absolute_page(1), Some(6));
        assert_eq!(chunk.absolute_page(3), Some(8));
        assert_eq!(chunk.absolute_page(0), None);
        assert_eq!(chunk.absolute_page(4), None);
    }

    #[test]
    fn positions() {
        assert_eq!(ChunkPosition::of(1, 1), ChunkPosition::Only);
        assert_eq!(ChunkPosition::of(1, 3), ChunkPosition::Opening);
        assert_eq!(ChunkPosition::of(2, 3), ChunkPosition::Middle);
        assert_eq!(ChunkPosition::of(3, 3), ChunkPosition::Closing);
    }
}
