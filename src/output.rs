//! Response envelopes exchanged between the relay and its clients.
//!
//! Field names are camelCase on the wire (`fileSize`, `isReal`, `chunkInfo`)
//! because browser clients already consume this shape.

use serde::{Deserialize, Serialize};

/// Elapsed time per stage, in milliseconds.
///
/// `total` covers the whole sequence, so it is never below
/// `upload + url + ocr`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub upload: u64,
    pub url: u64,
    pub ocr: u64,
    pub total: u64,
}

impl StageTimings {
    /// Sum of the three stage timings.
    pub fn stage_sum(&self) -> u64 {
        self.upload + self.url + self.ocr
    }
}

/// Usage statistics for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeStats {
    /// Pages returned by the provider (0 when it returned no page array).
    pub pages: usize,
    /// Size of the uploaded file in bytes.
    pub file_size: usize,
    /// Provider usage block, passed through verbatim.
    #[serde(default)]
    pub usage: Option<serde_json::Value>,
}

/// Advisory chunk descriptor sent by clients for large files.
///
/// Never enforced: the relay always processes the whole file. It is echoed
/// back in the envelope so the client can label its result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkInfo {
    pub is_chunked: bool,
    pub chunk_number: u32,
    pub total_chunks: u32,
    pub start_page: u32,
    pub end_page: u32,
}

/// Successful `/process` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkdownEnvelope {
    pub success: bool,
    pub markdown: String,
    pub filename: String,
    /// `false` only for canned results produced in client test mode.
    pub is_real: bool,
    pub timing: StageTimings,
    pub stats: EnvelopeStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_info: Option<ChunkInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_chunked: Option<bool>,
}

/// Error body for a failed `/process` request.
///
/// Input errors carry only `error`; processing errors also carry
/// `success: false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    pub error: String,
}

impl ErrorEnvelope {
    /// Body for a 400 response.
    pub fn input(message: impl Into<String>) -> Self {
        Self {
            success: None,
            error: message.into(),
        }
    }

    /// Body for a 500 response.
    pub fn processing(message: impl Into<String>) -> Self {
        Self {
            success: Some(false),
            error: format!("Processing error: {}", message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_serialises_camel_case() {
        let env = MarkdownEnvelope {
            success: true,
            markdown: "# Hi".into(),
            filename: "a.pdf".into(),
            is_real: true,
            timing: StageTimings {
                upload: 1,
                url: 2,
                ocr: 3,
                total: 7,
            },
            stats: EnvelopeStats {
                pages: 1,
                file_size: 10,
                usage: Some(json!({"pages_processed": 1})),
            },
            chunk_info: None,
            is_chunked: None,
        };
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["isReal"], json!(true));
        assert_eq!(v["stats"]["fileSize"], json!(10));
        assert_eq!(v["timing"]["total"], json!(7));
        assert!(v.get("chunkInfo").is_none());
        assert!(v.get("isChunked").is_none());
    }

    #[test]
    fn chunk_info_parses_partial_json() {
        let c: ChunkInfo =
            serde_json::from_str(r#"{"isChunked":true,"chunkNumber":1,"totalChunks":3}"#).unwrap();
        assert!(c.is_chunked);
        assert_eq!(c.total_chunks, 3);
        assert_eq!(c.end_page, 0);
    }

    #[test]
    fn error_bodies() {
        let input = serde_json::to_value(ErrorEnvelope::input("No file uploaded")).unwrap();
        assert_eq!(input, json!({"error": "No file uploaded"}));

        let processing = serde_json::to_value(ErrorEnvelope::processing("Upload failed: 413")).unwrap();
        assert_eq!(processing["success"], json!(false));
        assert!(processing["error"].as_str().unwrap().contains("413"));
    }
}
