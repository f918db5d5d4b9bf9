//! HTTP surface of the relay: `POST /process`, `OPTIONS /process`, `GET /health`.
//!
//! `OPTIONS` preflights are answered by the CORS layer and never reach a
//! handler. Handlers stay thin. They resolve the credential, read the multipart body
//! into an [`UploadRequest`] and hand off to [`relay::process_upload`].
//! Errors render through the `IntoResponse` impl on [`RelayError`]:
//!
//! | Error class | Status | Body |
//! |---|---|---|
//! | input (no key, no file, oversize) | 400 | `{error}` |
//! | provider / processing | 500 | `{success:false, error}` |

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::output::{ErrorEnvelope, MarkdownEnvelope};
use crate::pipeline::input::{parse_chunk_info, UploadRequest, DEFAULT_MIME};
use crate::pipeline::provider::ProviderClient;
use crate::relay;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Header carrying the caller's provider credential.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Room for multipart boundaries and the `chunk_info` field on top of the file cap.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Shared, read-only state for all requests.
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<RelayConfig>,
    pub provider: ProviderClient,
}

impl RelayState {
    /// Build state from a configuration, creating the provider HTTP client.
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        let provider = ProviderClient::new(&config)?;
        Ok(Self {
            config: Arc::new(config),
            provider,
        })
    }
}

/// Create the relay router with CORS, tracing and the upload body limit.
pub fn router(state: RelayState) -> Router {
    let body_limit = state
        .config
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/process", post(process))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin; POST and OPTIONS; Content-Type and X-API-Key.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)])
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: RelayState) -> Result<(), RelayError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| RelayError::Internal(format!("Failed to bind {addr}: {e}")))?;
    info!("OCR relay listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| RelayError::Internal(format!("Server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// `POST /process`
async fn process(
    State(state): State<RelayState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<MarkdownEnvelope>, RelayError> {
    let header_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    debug!(
        client_key = header_key.is_some_and(|k| !k.trim().is_empty()),
        server_key = state.config.api_key.is_some(),
        "Resolving credential"
    );
    let credential = state
        .config
        .resolve_credential(header_key)
        .ok_or(RelayError::MissingCredential)?;

    let multipart = multipart.map_err(|e| RelayError::InvalidUpload(e.body_text()))?;
    let declared_len = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    let limits = UploadLimits {
        max_upload_bytes: state.config.max_upload_bytes,
        declared_len,
    };
    let upload = read_upload(multipart, limits).await?;

    let envelope =
        relay::process_upload(&state.provider, upload, &credential, &state.config).await?;
    Ok(Json(envelope))
}

/// Size facts used to report a body cut off by the request limit.
#[derive(Debug, Clone, Copy)]
struct UploadLimits {
    max_upload_bytes: usize,
    declared_len: Option<usize>,
}

impl UploadLimits {
    /// A body over the request limit reads as an oversize file, not a malformed one.
    fn reject(&self, e: MultipartError) -> RelayError {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            let body_limit = self
                .max_upload_bytes
                .saturating_add(MULTIPART_OVERHEAD_BYTES);
            RelayError::FileTooLarge {
                size: self.declared_len.unwrap_or(body_limit),
                max_mb: self.max_upload_bytes / (1024 * 1024),
            }
        } else {
            RelayError::InvalidUpload(e.body_text())
        }
    }
}

/// Collect the `file` and `chunk_info` fields; other fields are ignored.
async fn read_upload(
    mut multipart: Multipart,
    limits: UploadLimits,
) -> Result<UploadRequest, RelayError> {
    let mut upload: Option<UploadRequest> = None;
    let mut chunk_info = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| limits.reject(e))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .map(str::to_string)
                    .or_else(|| {
                        mime_guess::from_path(&filename)
                            .first_raw()
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| DEFAULT_MIME.to_string());
                let bytes = field.bytes().await.map_err(|e| limits.reject(e))?;
                upload = Some(UploadRequest::new(filename, mime_type, bytes.to_vec()));
            }
            Some("chunk_info") => {
                let raw = field.text().await.map_err(|e| limits.reject(e))?;
                chunk_info = parse_chunk_info(&raw);
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    upload
        .map(|u| u.with_chunk_info(chunk_info))
        .ok_or(RelayError::MissingFile)
}

/// `GET /health`
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = if self.is_input_error() {
            warn!(error = %self, "Rejected request");
            ErrorEnvelope::input(self.to_string())
        } else {
            error!(error = %self, stage = ?self.stage(), "Processing failed");
            ErrorEnvelope::processing(self.to_string())
        };
        (status, Json(body)).into_response()
    }
}
