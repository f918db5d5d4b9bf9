//! Pipeline stages for relaying a document to the OCR provider.
//!
//! Each submodule implements exactly one concern:
//!
//! ```text
//! input ──▶ provider (upload ▶ signed URL ▶ OCR) ──▶ postprocess
//! (bytes)   (three sequential HTTP calls)            (Markdown)
//! ```
//!
//! 1. [`input`]       — validate the upload (size cap, non-empty) and carry its metadata
//! 2. [`provider`]    — the only stage with network I/O; one method per provider call
//! 3. [`postprocess`] — pure string transformations that turn OCR pages into Markdown
//!
//! The three provider calls are modelled by [`PipelineState`]: each state
//! holds exactly what the next call needs, so stage N+1 cannot start without
//! stage N's output.

pub mod input;
pub mod postprocess;
pub mod provider;

use crate::error::RelayError;
use crate::output::StageTimings;
use provider::OcrResponse;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Store the raw file with the provider.
    Upload,
    /// Obtain a time-bounded retrieval URL for the stored file.
    SignedUrl,
    /// Run OCR against the signed URL.
    Ocr,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 3] = [Stage::Upload, Stage::SignedUrl, Stage::Ocr];

    /// 1-based position, for "Step n/3" messages.
    pub fn step(&self) -> usize {
        match self {
            Stage::Upload => 1,
            Stage::SignedUrl => 2,
            Stage::Ocr => 3,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Upload => "upload",
            Stage::SignedUrl => "signed URL",
            Stage::Ocr => "OCR",
        })
    }
}

/// Where a single request is in the three-call sequence.
///
/// `Uploading → ResolvingUrl → RunningOcr → Done`, with `Failed` reachable
/// from any non-terminal state. Durations accumulate as the request moves.
#[derive(Debug)]
pub enum PipelineState {
    /// Stage 1 has not produced a file id yet.
    Uploading,
    /// The file is stored; a signed URL is needed.
    ResolvingUrl { file_id: String, upload_ms: u64 },
    /// The signed URL is known; OCR is running.
    RunningOcr {
        file_id: String,
        signed_url: String,
        upload_ms: u64,
        url_ms: u64,
    },
    /// All three calls succeeded.
    Done {
        result: Box<OcrResponse>,
        upload_ms: u64,
        url_ms: u64,
        ocr_ms: u64,
    },
    /// A call failed; no later call was made.
    Failed { stage: Stage, error: RelayError },
}

impl PipelineState {
    /// The stage whose call is pending in this state, if any.
    pub fn current_stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Uploading => Some(Stage::Upload),
            PipelineState::ResolvingUrl { .. } => Some(Stage::SignedUrl),
            PipelineState::RunningOcr { .. } => Some(Stage::Ocr),
            PipelineState::Done { .. } | PipelineState::Failed { .. } => None,
        }
    }

    /// `true` once the pipeline has succeeded or failed.
    pub fn is_terminal(&self) -> bool {
        self.current_stage().is_none()
    }

    /// Move to `Failed`, attributing the error to the pending stage.
    pub fn fail(self, error: RelayError) -> Self {
        let stage = self
            .current_stage()
            .or_else(|| error.stage())
            .unwrap_or(Stage::Upload);
        PipelineState::Failed { stage, error }
    }

    /// Stage timings of a finished pipeline, with `total` supplied by the caller.
    pub fn timings(&self, total_ms: u64) -> Option<StageTimings> {
        match self {
            PipelineState::Done {
                upload_ms,
                url_ms,
                ocr_ms,
                ..
            } => Some(StageTimings {
                upload: *upload_ms,
                url: *url_ms,
                ocr: *ocr_ms,
                total: total_ms.max(upload_ms + url_ms + ocr_ms),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_and_labels() {
        let steps: Vec<usize> = Stage::ALL.iter().map(Stage::step).collect();
        assert_eq!(steps, vec![1, 2, 3]);
        assert_eq!(Stage::SignedUrl.to_string(), "signed URL");
    }

    #[test]
    fn states_report_pending_stage() {
        assert_eq!(PipelineState::Uploading.current_stage(), Some(Stage::Upload));
        let s = PipelineState::ResolvingUrl {
            file_id: "f".into(),
            upload_ms: 1,
        };
        assert_eq!(s.current_stage(), Some(Stage::SignedUrl));
        assert!(!s.is_terminal());
    }

    #[test]
    fn fail_attributes_pending_stage() {
        let s = PipelineState::RunningOcr {
            file_id: "f".into(),
            signed_url: "https://signed".into(),
            upload_ms: 1,
            url_ms: 2,
        };
        match s.fail(RelayError::Internal("x".into())) {
            PipelineState::Failed { stage, .. } => assert_eq!(stage, Stage::Ocr),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn done_timings_never_undercut_stage_sum() {
        let s = PipelineState::Done {
            result: Box::default(),
            upload_ms: 10,
            url_ms: 5,
            ocr_ms: 30,
        };
        assert!(s.is_terminal());
        let t = s.timings(44).unwrap();
        assert_eq!(t.total, 45);
        let t = s.timings(60).unwrap();
        assert_eq!(t.total, 60);
    }
}
