//! Input normalisation: turn an uploaded file into a validated [`UploadRequest`].
//!
//! The server builds requests from multipart fields; the CLI builds them from
//! a path on disk. Both go through [`UploadRequest::validate`] so the size cap
//! and the empty-file check live in one place.

use crate::error::RelayError;
use crate::output::ChunkInfo;
use std::path::Path;
use tracing::{debug, warn};

/// Fallback MIME type when neither the client nor the file name tells us.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// A single document or image submitted for OCR.
///
/// The credential is not part of the request: it travels
/// alongside it and is never stored.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Original file name, forwarded to the provider and echoed in the envelope.
    pub filename: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Raw file bytes.
    pub bytes: Vec<u8>,
    /// Advisory chunk descriptor, echoed back untouched.
    pub chunk_info: Option<ChunkInfo>,
}

impl UploadRequest {
    /// Create a request from in-memory bytes.
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            bytes,
            chunk_info: None,
        }
    }

    /// Attach an advisory chunk descriptor.
    pub fn with_chunk_info(mut self, chunk_info: Option<ChunkInfo>) -> Self {
        self.chunk_info = chunk_info;
        self
    }

    /// Read a local file, guessing its MIME type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, RelayError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RelayError::MissingFile
            } else {
                RelayError::InvalidUpload(format!("failed to read '{}': {e}", path.display()))
            }
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(DEFAULT_MIME)
            .to_string();
        debug!("Read {} ({} bytes, {})", filename, bytes.len(), mime_type);
        Ok(Self::new(filename, mime_type, bytes))
    }

    /// Size of the payload in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Enforce the non-empty and size-cap rules.
    pub fn validate(&self, max_upload_bytes: usize) -> Result<(), RelayError> {
        if self.bytes.is_empty() {
            return Err(RelayError::EmptyFile {
                filename: self.filename.clone(),
            });
        }
        if self.bytes.len() > max_upload_bytes {
            return Err(RelayError::FileTooLarge {
                size: self.bytes.len(),
                max_mb: max_upload_bytes / (1024 * 1024),
            });
        }
        Ok(())
    }
}

/// Parse the optional `chunk_info` form field.
///
/// The descriptor is advisory, so malformed JSON is logged and dropped
/// rather than failing the request.
pub fn parse_chunk_info(raw: &str) -> Option<ChunkInfo> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str::<ChunkInfo>(raw) {
        Ok(info) => Some(info),
        Err(e) => {
            warn!("Ignoring malformed chunk_info ({}): {}", e, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty() {
        let req = UploadRequest::new("a.pdf", "application/pdf", vec![]);
        assert!(matches!(
            req.validate(10),
            Err(RelayError::EmptyFile { .. })
        ));
    }

    #[test]
    fn validate_rejects_oversize() {
        let req = UploadRequest::new("a.pdf", "application/pdf", vec![0u8; 11]);
        match req.validate(10) {
            Err(RelayError::FileTooLarge { size, .. }) => assert_eq!(size, 11),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(req.validate(11).is_ok());
    }

    #[test]
    fn chunk_info_is_advisory() {
        assert!(parse_chunk_info("").is_none());
        assert!(parse_chunk_info("{not json").is_none());
        let info = parse_chunk_info(
            r#"{"isChunked":true,"chunkNumber":2,"totalChunks":4,"startPage":11,"endPage":20}"#,
        )
        .unwrap();
        assert_eq!(info.chunk_number, 2);
        assert_eq!(info.start_page, 11);
    }

    #[tokio::test]
    async fn from_path_guesses_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, b"\x89PNG fake").unwrap();

        let req = UploadRequest::from_path(&path).await.unwrap();
        assert_eq!(req.filename, "scan.png");
        assert_eq!(req.mime_type, "image/png");
        assert_eq!(req.size(), 9);
    }

    #[tokio::test]
    async fn from_path_missing_file() {
        let err = UploadRequest::from_path(Path::new("/definitely/not/here.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MissingFile));
    }
}
