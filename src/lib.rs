//! # edgequake-ocr-relay
//!
//! Relay documents and images to the Mistral OCR API and get Markdown back.
//!
//! The provider needs three chained calls per document: store the file, ask
//! for a signed URL to it, then run OCR on that URL. This crate wraps the
//! sequence behind a single multipart endpoint so that browser and CLI
//! clients only ever make one request, carrying their own API key.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (multipart file + X-API-Key)
//!  │
//!  ├─ 1. Upload     POST /files          purpose=ocr
//!  ├─ 2. SignedUrl  GET  /files/{id}/url expiry=24h
//!  ├─ 3. OCR        POST /ocr            document_url + annotation schema
//!  ├─ 4. Assemble   page headers, image refs stripped, annotations quoted
//!  └─ 5. Envelope   markdown + per-stage timing + usage
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr_relay::{process_upload, ProviderClient, RelayConfig, UploadRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::default();
//!     let provider = ProviderClient::new(&config)?;
//!     let upload = UploadRequest::from_path("invoice.pdf".as_ref()).await?;
//!     let key = std::env::var("MISTRAL_API_KEY")?;
//!
//!     let envelope = process_upload(&provider, upload, &key, &config).await?;
//!     println!("{}", envelope.markdown);
//!     eprintln!("{} pages in {}ms", envelope.stats.pages, envelope.timing.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Serving
//!
//! ```rust,no_run
//! use edgequake_ocr_relay::{serve, RelayConfig, RelayState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = RelayState::new(RelayConfig::default())?;
//!     serve("0.0.0.0:8788".parse()?, state).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-relay` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when embedding the relay in another service:
//! ```toml
//! edgequake-ocr-relay = { version = "0.1", default-features = false }
//! ```
//!
//! ## Pricing
//!
//! The provider bills **$1 per 1000 pages**. Images count as one page.
//! [`client::estimate`] computes the figure before submission.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod annotations;
pub mod client;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod relay;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{AccessMode, ClientConfig, Orchestrator, SubmissionOutcome};
pub use config::{AnnotationLocale, PageSeparator, RelayConfig, RelayConfigBuilder};
pub use error::{ClientError, EstimationError, RelayError};
pub use output::{ChunkInfo, EnvelopeStats, ErrorEnvelope, MarkdownEnvelope, StageTimings};
pub use pipeline::input::UploadRequest;
pub use pipeline::provider::ProviderClient;
pub use pipeline::{PipelineState, Stage};
pub use progress::{NoopStageCallback, StageCallback, StageProgressCallback};
pub use relay::process_upload;
pub use server::{router, serve, RelayState};
