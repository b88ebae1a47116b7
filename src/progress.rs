//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! stage transitions and per-chunk / per-page events as the run proceeds.
//!
//! # Example
//!
//! ```rust
//! use pdf2movie::{PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, Mutex};
//!
//! struct Labels(Mutex<Vec<String>>);
//!
//! impl PipelineProgressCallback for Labels {
//!     fn on_stage(&self, fraction: f32, label: &str) {
//!         self.0.lock().unwrap().push(format!("{:>3.0}% {label}", fraction * 100.0));
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(Labels(Mutex::new(Vec::new()))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as the run advances.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events arrive from a single control flow, in page
/// order, but implementations must still be `Send + Sync` so the callback can
/// be shared with a UI thread.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once the document is split, before any external call.
    fn on_run_start(&self, total_pages: usize, total_chunks: usize) {
        let _ = (total_pages, total_chunks);
    }

    /// Called on every stage transition. `fraction` never decreases within a run.
    fn on_stage(&self, fraction: f32, label: &str) {
        let _ = (fraction, label);
    }

    /// Called after a chunk's scripts are resolved.
    ///
    /// `fallback_pages` lists the pages whose script had to be synthesised
    /// locally because the generator's answer was missing or unusable.
    fn on_chunk_scripted(&self, chunk_index: usize, total_chunks: usize, fallback_pages: &[usize]) {
        let _ = (chunk_index, total_chunks, fallback_pages);
    }

    /// Called after a page's audio is synthesised and post-processed.
    fn on_page_audio(&self, page_num: usize, total_pages: usize, duration_secs: f64) {
        let _ = (page_num, total_pages, duration_secs);
    }

    /// Called after a page's video segment is rendered.
    fn on_page_video(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called once when the run ends in failure.
    fn on_run_failed(&self, error: &str) {
        let _ = error;
    }

    /// Called once when the run completes and the video is published.
    fn on_run_complete(&self, total_pages: usize, publish_ref: &str) {
        let _ = (total_pages, publish_ref);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

/// Forwards stage reports to an optional callback, clamping fractions so
/// the reported sequence is non-decreasing and stays within `[0, 1]`.
pub(crate) struct ProgressTracker {
    callback: Option<ProgressCallback>,
    last: f32,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            last: 0.0,
        }
    }

    /// Report a stage; returns the fraction actually reported.
    pub(crate) fn stage(&mut self, fraction: f32, label: &str) -> f32 {
        let fraction = fraction.clamp(0.0, 1.0).max(self.last);
        self.last = fraction;
        tracing::debug!("progress {:.3}: {}", fraction, label);
        if let Some(cb) = &self.callback {
            cb.on_stage(fraction, label);
        }
        fraction
    }

    pub(crate) fn callback(&self) -> Option<&ProgressCallback> {
        self.callback.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        fractions: Mutex<Vec<f32>>,
        audio: AtomicUsize,
    }

    impl PipelineProgressCallback for Recorder {
        fn on_stage(&self, fraction: f32, _label: &str) {
            self.fractions.lock().unwrap().push(fraction);
        }

        fn on_page_audio(&self, _page_num: usize, _total: usize, _duration: f64) {
            self.audio.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(12, 3);
        cb.on_stage(0.5, "half");
        cb.on_chunk_scripted(1, 3, &[2, 3]);
        cb.on_page_audio(1, 12, 4.2);
        cb.on_page_video(1, 12);
        cb.on_run_failed("boom");
        cb.on_run_complete(12, "https://example.com/v.mp4");
    }

    #[test]
    fn tracker_never_goes_backwards() {
        let recorder = Arc::new(Recorder::default());
        let mut tracker = ProgressTracker::new(Some(recorder.clone() as ProgressCallback));

        tracker.stage(0.1, "split");
        tracker.stage(0.4, "audio");
        let reported = tracker.stage(0.2, "late");
        tracker.stage(1.7, "done");

        assert_eq!(reported, 0.4);
        assert_eq!(*recorder.fractions.lock().unwrap(), vec![0.1, 0.4, 0.4, 1.0]);
    }

    #[test]
    fn tracker_without_callback_still_clamps() {
        let mut tracker = ProgressTracker::new(None);
        assert_eq!(tracker.stage(-1.0, "neg"), 0.0);
        assert_eq!(tracker.stage(0.3, "ok"), 0.3);
        assert!(tracker.callback().is_none());
    }

    #[test]
    fn arc_dyn_callback_works() {
        let recorder = Arc::new(Recorder::default());
        let cb: ProgressCallback = recorder.clone();
        cb.on_page_audio(1, 2, 3.0);
        cb.on_page_audio(2, 2, 3.0);
        assert_eq!(recorder.audio.load(Ordering::SeqCst), 2);
    }
}
