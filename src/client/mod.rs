//! Client orchestrator: the caller's side of the relay.
//!
//! ```text
//! file ─ 1. allow-list check   (no I/O past this point on failure)
//!      ─ 2. read + estimate    (page count, price, large-file notice)
//!      ─ 3. submit             test mode → canned envelope, no network
//!                              (the estimate uses the fallback rate)
//!                              otherwise → POST {relay}/process
//! ```
//!
//! Retry is manual: a failed submission returns its error and the caller
//! decides whether to submit again.

pub mod credentials;
pub mod estimate;
pub mod file_type;
pub mod preview;
pub mod progress;

pub use credentials::{AccessMode, CredentialStore};
pub use estimate::{CostEstimate, FileEstimate, RateSource, ValueComparison};
pub use file_type::SupportedFileType;
pub use preview::{PreviewMode, PreviewState};
pub use progress::{ProgressFrame, ProgressPlan, ProgressStep};

use crate::error::ClientError;
use crate::output::{ChunkInfo, EnvelopeStats, ErrorEnvelope, MarkdownEnvelope, StageTimings};
use crate::server::API_KEY_HEADER;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Relay address used when none is configured.
pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:8788";

/// Public USD rate table (`{"rates": {"BRL": …}}`).
pub const DEFAULT_EXCHANGE_RATE_URL: &str = "https://api.exchangerate-api.com/v4/latest/USD";

/// PDFs above this size get the large-file notice.
pub const DEFAULT_LARGE_FILE_THRESHOLD: usize = 20 * 1024 * 1024;

/// Client-side settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub relay_url: String,
    pub exchange_rate_url: String,
    pub fallback_exchange_rate: f64,
    pub large_file_threshold_bytes: usize,
    /// Hourly rate (BRL) of manual transcription, for the value comparison.
    pub manual_hourly_rate: f64,
    pub minutes_per_page: u32,
    /// Timeout for the relay request. `None` waits as long as the relay does.
    pub request_timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            exchange_rate_url: DEFAULT_EXCHANGE_RATE_URL.to_string(),
            fallback_exchange_rate: estimate::FALLBACK_EXCHANGE_RATE,
            large_file_threshold_bytes: DEFAULT_LARGE_FILE_THRESHOLD,
            manual_hourly_rate: 50.0,
            minutes_per_page: 5,
            request_timeout_secs: None,
        }
    }
}

/// Result of a submission: the envelope plus what was estimated beforehand.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub envelope: MarkdownEnvelope,
    pub estimate: FileEstimate,
}

impl SubmissionOutcome {
    pub fn large_file_notice(&self) -> bool {
        self.estimate.large_file_notice
    }

    /// Progress plan sized by this submission's real timings.
    pub fn progress_plan(&self) -> ProgressPlan {
        ProgressPlan::from_timing(Some(&self.envelope.timing))
    }
}

/// Drives validation, estimation and submission for one client.
pub struct Orchestrator {
    config: ClientConfig,
    access: AccessMode,
    http: reqwest::Client,
}

impl Orchestrator {
    pub fn new(config: ClientConfig, access: AccessMode) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build().map_err(|e| ClientError::Transport {
            url: config.relay_url.clone(),
            detail: format!("failed to build HTTP client: {e}"),
        })?;
        Ok(Self {
            config,
            access,
            http,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn access(&self) -> &AccessMode {
        &self.access
    }

    /// Estimate `path` without submitting it.
    pub async fn estimate(&self, path: &Path) -> Result<FileEstimate, ClientError> {
        let kind = SupportedFileType::detect(path)?;
        let bytes = read_file(path).await?;
        Ok(self.estimate_bytes(kind, &bytes).await)
    }

    /// Validate, estimate and submit `path`.
    ///
    /// # Errors
    /// * [`ClientError::UnsupportedFileType`] before anything is read or sent
    /// * [`ClientError::Relay`] with the relay's status and `error` text
    /// * [`ClientError::Transport`] when the relay is unreachable
    pub async fn submit(&self, path: &Path) -> Result<SubmissionOutcome, ClientError> {
        let kind = SupportedFileType::detect(path)?;
        let bytes = read_file(path).await?;
        let estimate = self.estimate_bytes(kind, &bytes).await;
        if estimate.large_file_notice {
            info!(
                "Large file ({} bytes): sending as a single request",
                estimate.file_size
            );
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        let envelope = match &self.access {
            AccessMode::TestMode => {
                debug!("Test mode: returning canned result for '{}'", filename);
                canned_envelope(&filename, &estimate)
            }
            AccessMode::Credential(key) => {
                self.post(key, &filename, kind, bytes, estimate.chunk_info())
                    .await?
            }
        };

        Ok(SubmissionOutcome { envelope, estimate })
    }

    async fn estimate_bytes(&self, kind: SupportedFileType, bytes: &[u8]) -> FileEstimate {
        let cost = match estimate::count_pages(bytes, kind) {
            Ok(pages) => {
                let (rate, source) = if self.access.is_test_mode() {
                    (self.config.fallback_exchange_rate, RateSource::Fallback)
                } else {
                    estimate::fetch_exchange_rate(
                        &self.http,
                        &self.config.exchange_rate_url,
                        self.config.fallback_exchange_rate,
                    )
                    .await
                };
                Ok(CostEstimate::new(pages, rate, source))
            }
            Err(e) => {
                warn!("Cost estimate unavailable: {}", e);
                Err(e)
            }
        };
        let value = cost.as_ref().ok().map(|c| {
            ValueComparison::new(c, self.config.minutes_per_page, self.config.manual_hourly_rate)
        });

        FileEstimate {
            file_type: kind,
            file_size: bytes.len(),
            cost,
            value,
            large_file_notice: estimate::needs_large_file_notice(
                kind,
                bytes.len(),
                self.config.large_file_threshold_bytes,
            ),
        }
    }

    async fn post(
        &self,
        key: &str,
        filename: &str,
        kind: SupportedFileType,
        bytes: Vec<u8>,
        chunk_info: Option<ChunkInfo>,
    ) -> Result<MarkdownEnvelope, ClientError> {
        let url = format!("{}/process", self.config.relay_url.trim_end_matches('/'));
        let transport = |detail: String| ClientError::Transport {
            url: url.clone(),
            detail,
        };

        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(kind.mime())
            .map_err(|e| transport(e.to_string()))?;
        let mut form = Form::new().part("file", part);
        if let Some(info) = chunk_info {
            let raw = serde_json::to_string(&info).map_err(|e| transport(e.to_string()))?;
            form = form.text("chunk_info", raw);
        }

        info!("Submitting '{}' to {}", filename, url);
        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(ClientError::Relay {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| transport(format!("unreadable response: {e}")))
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>, ClientError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| ClientError::FileRead {
            path: path.to_path_buf(),
            source,
        })
}

/// Envelope returned in test mode. Timings match the default progress plan.
fn canned_envelope(filename: &str, estimate: &FileEstimate) -> MarkdownEnvelope {
    let pages = estimate.pages().unwrap_or(1);
    let markdown = format!(
        "# Test mode\n\n\
         **File:** {filename}\n\
         **Estimated pages:** {pages}\n\n\
         This is a simulated result. Nothing was sent to the OCR provider.\n\
         Save an API key and turn test mode off to process real documents."
    );
    MarkdownEnvelope {
        success: true,
        markdown,
        filename: filename.to_string(),
        is_real: false,
        timing: StageTimings {
            upload: 1000,
            url: 500,
            ocr: progress::DEFAULT_OCR_STEP_MS,
            total: 1000 + 500 + progress::DEFAULT_OCR_STEP_MS,
        },
        stats: EnvelopeStats {
            pages,
            file_size: estimate.file_size,
            usage: None,
        },
        chunk_info: estimate.chunk_info(),
        is_chunked: estimate.large_file_notice.then_some(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> ClientConfig {
        ClientConfig {
            relay_url: "http://127.0.0.1:9".into(),
            exchange_rate_url: "http://127.0.0.1:9/rates".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn unsupported_type_rejected_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();

        let orch =
            Orchestrator::new(offline_config(), AccessMode::Credential("sk-test".into())).unwrap();
        let err = orch.submit(&path).await.unwrap_err();
        assert!(
            matches!(err, ClientError::UnsupportedFileType { .. }),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn test_mode_returns_canned_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, b"\x89PNG not really").unwrap();

        let orch = Orchestrator::new(offline_config(), AccessMode::TestMode).unwrap();
        let out = orch.submit(&path).await.unwrap();
        assert!(out.envelope.success);
        assert!(!out.envelope.is_real);
        assert_eq!(out.envelope.filename, "photo.png");
        assert_eq!(out.envelope.stats.pages, 1);
        assert!(out.envelope.timing.total >= out.envelope.timing.stage_sum());
        assert_eq!(out.progress_plan(), ProgressPlan::default());
        assert_eq!(
            out.estimate.cost.as_ref().unwrap().rate_source,
            RateSource::Fallback
        );
    }

    #[tokio::test]
    async fn test_mode_never_fetches_rate() {
        let mut server = mockito::Server::new_async().await;
        let rates = server
            .mock("GET", "/latest/USD")
            .with_status(200)
            .with_body(r#"{"rates":{"BRL":5.12}}"#)
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.jpg");
        std::fs::write(&path, b"\xff\xd8 not really").unwrap();

        let config = ClientConfig {
            exchange_rate_url: format!("{}/latest/USD", server.url()),
            ..offline_config()
        };
        let orch = Orchestrator::new(config, AccessMode::TestMode).unwrap();
        let est = orch.estimate(&path).await.unwrap();
        let cost = est.cost.as_ref().unwrap();
        assert_eq!(cost.rate_source, RateSource::Fallback);
        assert_eq!(cost.exchange_rate, estimate::FALLBACK_EXCHANGE_RATE);

        orch.submit(&path).await.unwrap();
        rates.assert_async().await;
    }

    #[tokio::test]
    async fn credential_mode_uses_live_rate() {
        let mut server = mockito::Server::new_async().await;
        let rates = server
            .mock("GET", "/latest/USD")
            .with_status(200)
            .with_body(r#"{"rates":{"BRL":5.12}}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.jpg");
        std::fs::write(&path, b"\xff\xd8 not really").unwrap();

        let config = ClientConfig {
            exchange_rate_url: format!("{}/latest/USD", server.url()),
            ..offline_config()
        };
        let orch = Orchestrator::new(config, AccessMode::Credential("sk-test".into())).unwrap();
        let est = orch.estimate(&path).await.unwrap();
        assert_eq!(est.cost.as_ref().unwrap().rate_source, RateSource::Live);
        rates.assert_async().await;
    }

    #[tokio::test]
    async fn unreadable_pdf_still_submits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        let orch = Orchestrator::new(offline_config(), AccessMode::TestMode).unwrap();
        let out = orch.submit(&path).await.unwrap();
        assert!(out.estimate.cost.is_err());
        assert!(out.envelope.success);
    }

    #[test]
    fn canned_envelope_flags_large_files() {
        let estimate = FileEstimate {
            file_type: SupportedFileType::Pdf,
            file_size: 25 * 1024 * 1024,
            cost: Ok(CostEstimate::new(300, 5.5, RateSource::Fallback)),
            value: None,
            large_file_notice: true,
        };
        let env = canned_envelope("big.pdf", &estimate);
        assert_eq!(env.is_chunked, Some(true));
        assert_eq!(env.chunk_info.unwrap().end_page, 300);
        assert_eq!(env.stats.pages, 300);
    }
}
