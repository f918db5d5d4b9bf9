//! Two-step progress animation for relay submissions.
//!
//! The relay does not stream progress, so the client interpolates: step 1
//! (upload + signed URL) then step 2 (OCR), each over a duration taken from
//! the envelope timing when one is known, else from fixed defaults. Frames
//! are purely visual.

use crate::output::StageTimings;

/// Default duration of the upload + URL step.
pub const DEFAULT_UPLOAD_STEP_MS: u64 = 1500;

/// Default duration of the OCR step.
pub const DEFAULT_OCR_STEP_MS: u64 = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStep {
    UploadAndUrl,
    Ocr,
}

impl ProgressStep {
    pub fn index(&self) -> usize {
        match self {
            ProgressStep::UploadAndUrl => 0,
            ProgressStep::Ocr => 1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProgressStep::UploadAndUrl => "Uploading file",
            ProgressStep::Ocr => "Running OCR",
        }
    }
}

/// Durations of both steps, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressPlan {
    pub upload_ms: u64,
    pub ocr_ms: u64,
}

impl Default for ProgressPlan {
    fn default() -> Self {
        Self {
            upload_ms: DEFAULT_UPLOAD_STEP_MS,
            ocr_ms: DEFAULT_OCR_STEP_MS,
        }
    }
}

/// One animation frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressFrame {
    pub step: ProgressStep,
    /// Completion of the current step, `0.0..=1.0`.
    pub step_fraction: f64,
    /// Completion of the whole plan, `0.0..=1.0`.
    pub overall: f64,
    pub finished: bool,
}

impl ProgressPlan {
    /// Plan from reported timings; zero durations fall back per step.
    pub fn from_timing(timing: Option<&StageTimings>) -> Self {
        let defaults = Self::default();
        let Some(t) = timing else {
            return defaults;
        };
        let upload_ms = t.upload + t.url;
        Self {
            upload_ms: if upload_ms == 0 { defaults.upload_ms } else { upload_ms },
            ocr_ms: if t.ocr == 0 { defaults.ocr_ms } else { t.ocr },
        }
    }

    pub fn total_ms(&self) -> u64 {
        self.upload_ms + self.ocr_ms
    }

    /// Frame `elapsed_ms` into the animation. Past the end it stays on the
    /// last step at 100%.
    pub fn frame_at(&self, elapsed_ms: u64) -> ProgressFrame {
        let total = self.total_ms().max(1);
        let overall = (elapsed_ms as f64 / total as f64).min(1.0);

        if elapsed_ms < self.upload_ms {
            return ProgressFrame {
                step: ProgressStep::UploadAndUrl,
                step_fraction: elapsed_ms as f64 / self.upload_ms as f64,
                overall,
                finished: false,
            };
        }

        let into_ocr = elapsed_ms - self.upload_ms;
        let step_fraction = if self.ocr_ms == 0 {
            1.0
        } else {
            (into_ocr as f64 / self.ocr_ms as f64).min(1.0)
        };
        ProgressFrame {
            step: ProgressStep::Ocr,
            step_fraction,
            overall,
            finished: elapsed_ms >= self.total_ms(),
        }
    }
}
