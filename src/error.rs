//! Error types for the edgequake-ocr-relay library.
//!
//! Three error types reflect three distinct callers:
//!
//! * [`RelayError`] — raised by the relay pipeline and the HTTP server. Input
//!   variants (no credential, no file, oversize upload) map to HTTP 400;
//!   everything that happens after the first provider call maps to HTTP 500.
//!   Any variant aborts the request; there are no retries.
//!
//! * [`ClientError`] — raised by the client orchestrator before or while
//!   talking to a relay. Unsupported file types are rejected here, before any
//!   network call is made.
//!
//! * [`EstimationError`] — page counting failed. Only the cost widget
//!   degrades; submission is never blocked by it.

use crate::pipeline::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the relay pipeline and the `/process` endpoint.
#[derive(Debug, Error)]
pub enum RelayError {
    // ── Input errors (400) ────────────────────────────────────────────────
    /// Neither the `X-API-Key` header nor the server configuration supplied a credential.
    #[error("Mistral API key not configured. Set it in the client or use test mode.")]
    MissingCredential,

    /// The multipart body had no `file` field.
    #[error("No file uploaded")]
    MissingFile,

    /// The uploaded file carried zero bytes.
    #[error("Uploaded file '{filename}' is empty")]
    EmptyFile { filename: String },

    /// The uploaded file exceeds the configured cap.
    #[error("File too large: {size} bytes. Maximum allowed: {max_mb}MB")]
    FileTooLarge { size: usize, max_mb: usize },

    /// The multipart body could not be read.
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    // ── Provider errors (500) ─────────────────────────────────────────────
    /// Stage 1: the provider rejected the file upload.
    #[error("Upload failed: {status} - {message}")]
    UploadFailed { status: u16, message: String },

    /// Stage 2: the provider could not issue a signed URL.
    #[error("URL generation failed: {status} - {message}")]
    UrlFailed { status: u16, message: String },

    /// Stage 3: the provider rejected or failed the OCR job.
    #[error("OCR processing failed: {status} - {message}")]
    OcrFailed { status: u16, message: String },

    /// The request to the provider never produced an HTTP response.
    #[error("{stage} request failed: {detail}")]
    Transport { stage: Stage, detail: String },

    /// The provider answered 2xx with a body we could not decode.
    #[error("Unexpected {stage} response from provider: {detail}")]
    InvalidProviderResponse { stage: Stage, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// `true` for errors caused by the caller's request rather than the provider.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            RelayError::MissingCredential
                | RelayError::MissingFile
                | RelayError::EmptyFile { .. }
                | RelayError::FileTooLarge { .. }
                | RelayError::InvalidUpload(_)
        )
    }

    /// HTTP status the `/process` endpoint answers with for this error.
    pub fn status_code(&self) -> u16 {
        if self.is_input_error() {
            400
        } else {
            500
        }
    }

    /// The pipeline stage that failed, if the error came from a provider call.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RelayError::UploadFailed { .. } => Some(Stage::Upload),
            RelayError::UrlFailed { .. } => Some(Stage::SignedUrl),
            RelayError::OcrFailed { .. } => Some(Stage::Ocr),
            RelayError::Transport { stage, .. }
            | RelayError::InvalidProviderResponse { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Build the failure variant for `stage` from a non-success provider answer.
    pub fn provider_status(stage: Stage, status: u16, message: String) -> Self {
        match stage {
            Stage::Upload => RelayError::UploadFailed { status, message },
            Stage::SignedUrl => RelayError::UrlFailed { status, message },
            Stage::Ocr => RelayError::OcrFailed { status, message },
        }
    }
}

/// Errors raised by the client orchestrator.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The selected file's type is outside the allow-list.
    #[error("Unsupported file type '{mime}' for '{path}'. Use PDF, PNG, JPEG, WEBP, BMP or TIFF.")]
    UnsupportedFileType { path: PathBuf, mime: String },

    /// The selected file could not be read.
    #[error("Failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No credential stored or supplied, and test mode is off.
    #[error("No Mistral API key available.\nSave one with `ocr-relay key set <KEY>` or pass --test-mode.")]
    NoCredential,

    /// The relay answered with an error envelope.
    #[error("Relay returned {status}: {message}")]
    Relay { status: u16, message: String },

    /// The relay could not be reached or its answer was unreadable.
    #[error("Could not reach relay at '{url}': {detail}")]
    Transport { url: String, detail: String },

    /// Reading or writing the local credential store failed.
    #[error("Credential store error at '{path}': {source}")]
    CredentialStore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Page-count failures. Surfaced in the cost estimate only.
#[derive(Debug, Clone, Error)]
pub enum EstimationError {
    /// The PDF could not be parsed.
    #[error("Could not count pages: {0}")]
    PdfParse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_failure_display_carries_status_and_message() {
        let e = RelayError::UploadFailed {
            status: 413,
            message: "payload too large".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("413"), "got: {msg}");
        assert!(msg.contains("payload too large"), "got: {msg}");
    }

    #[test]
    fn input_errors_map_to_400() {
        assert_eq!(RelayError::MissingCredential.status_code(), 400);
        assert_eq!(RelayError::MissingFile.status_code(), 400);
        assert_eq!(
            RelayError::FileTooLarge {
                size: 60 * 1024 * 1024,
                max_mb: 50
            }
            .status_code(),
            400
        );
    }

    #[test]
    fn provider_errors_map_to_500() {
        let e = RelayError::OcrFailed {
            status: 422,
            message: "bad document".into(),
        };
        assert_eq!(e.status_code(), 500);
        assert!(!e.is_input_error());
    }

    #[test]
    fn stage_is_reported_for_provider_failures() {
        assert_eq!(
            RelayError::provider_status(Stage::SignedUrl, 404, "gone".into()).stage(),
            Some(Stage::SignedUrl)
        );
        let t = RelayError::Transport {
            stage: Stage::Ocr,
            detail: "connection reset".into(),
        };
        assert_eq!(t.stage(), Some(Stage::Ocr));
        assert_eq!(RelayError::MissingFile.stage(), None);
    }

    #[test]
    fn unsupported_type_names_the_mime() {
        let e = ClientError::UnsupportedFileType {
            path: PathBuf::from("notes.txt"),
            mime: "text/plain".into(),
        };
        assert!(e.to_string().contains("text/plain"));
    }
}
