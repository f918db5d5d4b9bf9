//! The relay pipeline: upload → signed URL → OCR → Markdown envelope.
//!
//! [`process_upload`] drives [`PipelineState`] from `Uploading` to a terminal
//! state. Each step performs exactly one provider call, so stage N+1 never
//! starts before stage N has answered, and the first failure ends the loop.
//! Nothing is retried and nothing outlives the request.

use crate::config::{redact_key, RelayConfig};
use crate::error::RelayError;
use crate::output::{EnvelopeStats, MarkdownEnvelope};
use crate::pipeline::input::UploadRequest;
use crate::pipeline::postprocess;
use crate::pipeline::provider::{OcrRequest, ProviderClient};
use crate::pipeline::{PipelineState, Stage};
use std::time::Instant;
use tracing::{debug, error, info};

/// Relay one upload to the provider and build the Markdown envelope.
///
/// # Arguments
/// * `provider`   — HTTP client bound to the provider base URL
/// * `upload`     — validated or unvalidated upload; validation runs first
/// * `credential` — provider API key for this request only
/// * `config`     — relay configuration
///
/// # Errors
/// Input errors (empty or oversize file) are returned before any network
/// call. Provider errors carry the failing stage's status and message.
pub async fn process_upload(
    provider: &ProviderClient,
    upload: UploadRequest,
    credential: &str,
    config: &RelayConfig,
) -> Result<MarkdownEnvelope, RelayError> {
    upload.validate(config.max_upload_bytes)?;

    info!(
        "Relaying '{}' ({} bytes, {}) with key {}",
        upload.filename,
        upload.size(),
        upload.mime_type,
        redact_key(credential)
    );

    let total_start = Instant::now();
    let mut state = PipelineState::Uploading;
    while !state.is_terminal() {
        state = advance(state, provider, &upload, credential, config).await;
    }
    let total_ms = elapsed_ms(total_start);

    let timing = state.timings(total_ms);

    let result = match state {
        PipelineState::Done { result, .. } => result,
        PipelineState::Failed { stage, error } => {
            debug!("Pipeline aborted at {} stage after {}ms", stage, total_ms);
            return Err(error);
        }
        other => {
            return Err(RelayError::Internal(format!(
                "pipeline stopped in non-terminal state {other:?}"
            )))
        }
    };
    let timing =
        timing.ok_or_else(|| RelayError::Internal("pipeline ended without timings".into()))?;

    let markdown = postprocess::assemble_markdown(&result, &config.page_separator, config.locale);
    let pages = result.pages().len();

    info!(
        "OCR complete: {} pages, upload {}ms / url {}ms / ocr {}ms, {}ms total",
        pages, timing.upload, timing.url, timing.ocr, timing.total
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_pipeline_complete(pages, timing.total);
    }

    let is_chunked = upload.chunk_info.as_ref().map(|c| c.is_chunked);
    Ok(MarkdownEnvelope {
        success: true,
        markdown,
        filename: upload.filename,
        is_real: true,
        timing,
        stats: EnvelopeStats {
            pages,
            file_size: upload.bytes.len(),
            usage: result.usage_info.clone(),
        },
        chunk_info: upload.chunk_info,
        is_chunked,
    })
}

/// Perform the provider call pending in `state` and return the next state.
async fn advance(
    state: PipelineState,
    provider: &ProviderClient,
    upload: &UploadRequest,
    credential: &str,
    config: &RelayConfig,
) -> PipelineState {
    let Some(stage) = state.current_stage() else {
        return state;
    };
    info!("Step {}/3: {}", stage.step(), stage);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(stage);
    }

    let start = Instant::now();
    let next = match state {
        PipelineState::Uploading => match provider.upload_file(credential, upload).await {
            Ok(file) => {
                debug!("Provider file id: {}", file.id);
                PipelineState::ResolvingUrl {
                    file_id: file.id,
                    upload_ms: elapsed_ms(start),
                }
            }
            Err(e) => PipelineState::Uploading.fail(e),
        },
        PipelineState::ResolvingUrl { file_id, upload_ms } => {
            match provider
                .signed_url(credential, &file_id, config.signed_url_expiry_hours)
                .await
            {
                Ok(signed) => PipelineState::RunningOcr {
                    file_id,
                    signed_url: signed.url,
                    upload_ms,
                    url_ms: elapsed_ms(start),
                },
                Err(e) => PipelineState::ResolvingUrl { file_id, upload_ms }.fail(e),
            }
        }
        PipelineState::RunningOcr {
            file_id,
            signed_url,
            upload_ms,
            url_ms,
        } => {
            let request = OcrRequest::for_signed_url(&signed_url, config);
            match provider.run_ocr(credential, &request).await {
                Ok(result) => PipelineState::Done {
                    result: Box::new(result),
                    upload_ms,
                    url_ms,
                    ocr_ms: elapsed_ms(start),
                },
                Err(e) => PipelineState::RunningOcr {
                    file_id,
                    signed_url,
                    upload_ms,
                    url_ms,
                }
                .fail(e),
            }
        }
        terminal => terminal,
    };

    report(&next, stage, elapsed_ms(start), config);
    next
}

fn report(next: &PipelineState, stage: Stage, duration_ms: u64, config: &RelayConfig) {
    match next {
        PipelineState::Failed { error, .. } => {
            error!("{} stage failed after {}ms: {}", stage, duration_ms, error);
            if let Some(ref cb) = config.progress_callback {
                cb.on_stage_failed(stage, &error.to_string());
            }
        }
        _ => {
            info!("{} stage completed in {}ms", stage, duration_ms);
            if let Some(ref cb) = config.progress_callback {
                cb.on_stage_complete(stage, duration_ms);
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
