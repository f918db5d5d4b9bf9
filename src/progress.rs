//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn StageProgressCallback>`] via
//! [`crate::config::RelayConfigBuilder::progress_callback`] to observe each
//! transition of the three-stage pipeline (upload → signed URL → OCR).
//!
//! The CLI uses this to drive a live progress bar for in-process runs; a
//! server can forward events to metrics. The library itself only logs.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ocr_relay::{RelayConfig, Stage, StageProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl StageProgressCallback for CountingCallback {
//!     fn on_stage_complete(&self, stage: Stage, duration_ms: u64) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage} done in {duration_ms}ms");
//!     }
//! }
//!
//! let config = RelayConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::Stage;
use std::sync::Arc;

/// Called by the pipeline as it moves between stages.
///
/// Implementations must be `Send + Sync`: the server shares one config across
/// concurrent requests. All methods default to no-ops.
pub trait StageProgressCallback: Send + Sync {
    /// Called just before the request for `stage` is sent.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when `stage` returned a usable response.
    fn on_stage_complete(&self, stage: Stage, duration_ms: u64) {
        let _ = (stage, duration_ms);
    }

    /// Called when `stage` failed. No later stage will start.
    fn on_stage_failed(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }

    /// Called once after the OCR result has been assembled.
    ///
    /// # Arguments
    /// * `pages`    — number of pages the provider returned
    /// * `total_ms` — wall-clock time across all stages
    fn on_pipeline_complete(&self, pages: usize, total_ms: u64) {
        let _ = (pages, total_ms);
    }
}

/// A no-op implementation for callers that don't need stage events.
pub struct NoopStageCallback;

impl StageProgressCallback for NoopStageCallback {}

/// Convenience alias matching the type stored in [`crate::config::RelayConfig`].
pub type StageCallback = Arc<dyn StageProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCallback {
        events: Mutex<Vec<String>>,
    }

    impl StageProgressCallback for RecordingCallback {
        fn on_stage_start(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("start:{stage}"));
        }

        fn on_stage_complete(&self, stage: Stage, _duration_ms: u64) {
            self.events.lock().unwrap().push(format!("done:{stage}"));
        }

        fn on_stage_failed(&self, stage: Stage, _error: &str) {
            self.events.lock().unwrap().push(format!("failed:{stage}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopStageCallback;
        cb.on_stage_start(Stage::Upload);
        cb.on_stage_complete(Stage::Upload, 12);
        cb.on_stage_failed(Stage::SignedUrl, "boom");
        cb.on_pipeline_complete(3, 40);
    }

    #[test]
    fn recording_callback_keeps_order() {
        let cb = RecordingCallback::default();
        cb.on_stage_start(Stage::Upload);
        cb.on_stage_complete(Stage::Upload, 5);
        cb.on_stage_start(Stage::SignedUrl);
        cb.on_stage_failed(Stage::SignedUrl, "404");

        let events = cb.events.lock().unwrap();
        assert_eq!(
            *events,
            vec!["start:upload", "done:upload", "start:signed URL", "failed:signed URL"]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: StageCallback = Arc::new(NoopStageCallback);
        cb.on_stage_start(Stage::Ocr);
        cb.on_stage_complete(Stage::Ocr, 1000);
    }
}
