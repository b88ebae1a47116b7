//! Pipeline stages for PDF-to-movie conversion.
//!
//! Each submodule implements one step. External collaborators (script model,
//! speech service, ffmpeg) sit behind traits so the stages can be tested with
//! fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ split ──▶ script ──▶ speech ──▶ audio ──▶ compose ──▶ assemble
//!       └─▶ render ─────────────────────────────────────┘
//! ```
//!
//! 1. [`input`]   check the path points at a readable PDF
//! 2. [`split`]   plan page chunks and write one sub-document per chunk
//! 3. [`render`]  rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 4. [`script`]  one generation request per chunk, decoded into page scripts
//! 5. [`speech`]  one synthesis request per page, wrapped in [`retry`]
//! 6. [`audio`]   tempo change and silence padding
//! 7. [`compose`] letterboxed still plus audio into a page segment via [`media`]
//! 8. [`assemble`] concatenate segments into the final video

pub mod assemble;
pub mod audio;
pub mod compose;
pub mod input;
pub mod media;
pub mod render;
pub mod retry;
pub mod script;
pub mod speech;
pub mod split;
