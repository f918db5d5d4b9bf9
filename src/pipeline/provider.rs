//! Provider interaction: the three HTTP calls to the OCR API.
//!
//! This module is thin. It knows the provider's endpoints and
//! wire types and maps non-success answers to the stage-specific
//! [`RelayError`] variants; sequencing lives in [`crate::relay`] and text
//! assembly in [`super::postprocess`].
//!
//! No call is retried. A failure is terminal for the request, and the client
//! decides whether to submit again from scratch.

use crate::annotations::{self, ImageAnnotation};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::pipeline::input::UploadRequest;
use crate::pipeline::Stage;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

/// Provider-side reference to an uploaded file.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub bytes: Option<u64>,
}

/// Time-bounded retrieval URL for a [`RemoteFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct SignedUrl {
    pub url: String,
}

/// Document reference inside an OCR request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentRef {
    DocumentUrl { document_url: String },
}

/// Body of the OCR call.
#[derive(Debug, Clone, Serialize)]
pub struct OcrRequest {
    pub model: String,
    pub document: DocumentRef,
    pub include_image_base64: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox_annotation_format: Option<Value>,
}

impl OcrRequest {
    /// Build the OCR request for `signed_url` from the relay configuration.
    pub fn for_signed_url(signed_url: &str, config: &RelayConfig) -> Self {
        Self {
            model: config.model.clone(),
            document: DocumentRef::DocumentUrl {
                document_url: signed_url.to_string(),
            },
            include_image_base64: config.include_image_base64,
            bbox_annotation_format: config
                .annotate_images
                .then(|| annotations::annotation_format(config.locale)),
        }
    }
}

/// OCR result as returned by the provider.
///
/// Unknown top-level fields are kept in `extra` so the fallback text
/// extraction and the raw-JSON last resort can see them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<OcrPage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_info: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OcrResponse {
    /// Pages in provider order; empty when the provider sent none.
    pub fn pages(&self) -> &[OcrPage] {
        self.pages.as_deref().unwrap_or(&[])
    }
}

/// One page of OCR output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrPage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<OcrImage>>,
}

impl OcrPage {
    pub fn markdown(&self) -> &str {
        self.markdown.as_deref().unwrap_or("")
    }

    pub fn images(&self) -> &[OcrImage] {
        self.images.as_deref().unwrap_or(&[])
    }
}

/// An image extracted from a page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Either a JSON string matching the annotation schema or an object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_annotation: Option<Value>,
}

/// What the provider said about an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationContent {
    /// The annotation matched the schema.
    Structured(ImageAnnotation),
    /// Free text that did not parse as the schema.
    Text(String),
}

impl OcrImage {
    /// Decode the annotation, if the provider produced a non-empty one.
    pub fn annotation(&self) -> Option<AnnotationContent> {
        match self.image_annotation.as_ref()? {
            Value::String(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return None;
                }
                match serde_json::from_str::<ImageAnnotation>(s) {
                    Ok(a) if !a.is_empty() => Some(AnnotationContent::Structured(a)),
                    Ok(_) => None,
                    Err(_) => Some(AnnotationContent::Text(s.to_string())),
                }
            }
            Value::Object(_) => {
                let value = self.image_annotation.clone()?;
                serde_json::from_value::<ImageAnnotation>(value)
                    .ok()
                    .filter(|a| !a.is_empty())
                    .map(AnnotationContent::Structured)
            }
            Value::Null => None,
            other => Some(AnnotationContent::Text(other.to_string())),
        }
    }
}

/// HTTP client for the provider API.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
}

impl ProviderClient {
    /// Build a client honouring the configured base URL and optional timeout.
    pub fn new(config: &RelayConfig) -> Result<Self, RelayError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| RelayError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_http(http, &config.api_base_url))
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_http(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stage 1: store the file with the provider, tagged for OCR.
    pub async fn upload_file(
        &self,
        credential: &str,
        upload: &UploadRequest,
    ) -> Result<RemoteFile, RelayError> {
        let part = Part::bytes(upload.bytes.clone()).file_name(upload.filename.clone());
        let part = match part.mime_str(&upload.mime_type) {
            Ok(p) => p,
            Err(_) => Part::bytes(upload.bytes.clone()).file_name(upload.filename.clone()),
        };
        let form = Form::new().text("purpose", "ocr").part("file", part);

        let response = self
            .http
            .post(format!("{}/files", self.base_url))
            .bearer_auth(credential)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport(Stage::Upload, e))?;

        decode(Stage::Upload, response).await
    }

    /// Stage 2: request a signed retrieval URL valid for `expiry_hours`.
    pub async fn signed_url(
        &self,
        credential: &str,
        file_id: &str,
        expiry_hours: u32,
    ) -> Result<SignedUrl, RelayError> {
        let response = self
            .http
            .get(format!("{}/files/{}/url", self.base_url, file_id))
            .query(&[("expiry", expiry_hours)])
            .bearer_auth(credential)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| transport(Stage::SignedUrl, e))?;

        decode(Stage::SignedUrl, response).await
    }

    /// Stage 3: run OCR on the document behind the signed URL.
    pub async fn run_ocr(
        &self,
        credential: &str,
        request: &OcrRequest,
    ) -> Result<OcrResponse, RelayError> {
        let response = self
            .http
            .post(format!("{}/ocr", self.base_url))
            .bearer_auth(credential)
            .json(request)
            .send()
            .await
            .map_err(|e| transport(Stage::Ocr, e))?;

        decode(Stage::Ocr, response).await
    }
}

fn transport(stage: Stage, e: reqwest::Error) -> RelayError {
    RelayError::Transport {
        stage,
        detail: e.to_string(),
    }
}

/// Map a non-success status to the stage's failure, else decode the JSON body.
async fn decode<T: DeserializeOwned>(
    stage: Stage,
    response: reqwest::Response,
) -> Result<T, RelayError> {
    let status = response.status();
    let body = response.text().await.map_err(|e| transport(stage, e))?;

    if !status.is_success() {
        return Err(RelayError::provider_status(stage, status.as_u16(), body));
    }

    debug!("{} response: {} bytes", stage, body.len());
    serde_json::from_str(&body).map_err(|e| RelayError::InvalidProviderResponse {
        stage,
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ocr_request_shape() {
        let config = RelayConfig::default();
        let req = OcrRequest::for_signed_url("https://signed/abc", &config);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["model"], "mistral-ocr-latest");
        assert_eq!(v["document"]["type"], "document_url");
        assert_eq!(v["document"]["document_url"], "https://signed/abc");
        assert_eq!(v["include_image_base64"], true);
        assert_eq!(v["bbox_annotation_format"]["type"], "json_schema");
    }

    #[test]
    fn ocr_request_without_annotations() {
        let config = RelayConfig::builder().annotate_images(false).build().unwrap();
        let v = serde_json::to_value(OcrRequest::for_signed_url("u", &config)).unwrap();
        assert!(v.get("bbox_annotation_format").is_none());
    }

    #[test]
    fn response_tolerates_nulls_and_extra_fields() {
        let r: OcrResponse = serde_json::from_value(json!({
            "pages": [{"index": 0, "markdown": null, "images": null}],
            "model": "mistral-ocr-2505",
            "usage_info": {"pages_processed": 1}
        }))
        .unwrap();
        assert_eq!(r.pages().len(), 1);
        assert_eq!(r.pages()[0].markdown(), "");
        assert!(r.pages()[0].images().is_empty());
        assert_eq!(r.extra["model"], "mistral-ocr-2505");
    }

    #[test]
    fn annotation_from_json_string() {
        let img = OcrImage {
            id: Some("img-0.jpeg".into()),
            image_annotation: Some(json!(
                "{\"image_type\":\"chart\",\"short_description\":\"Sales\",\"summary\":\"Up\"}"
            )),
        };
        match img.annotation() {
            Some(AnnotationContent::Structured(a)) => assert_eq!(a.image_type, "chart"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn annotation_free_text_and_empty() {
        let text = OcrImage {
            id: None,
            image_annotation: Some(json!("a photo of a cat")),
        };
        assert_eq!(
            text.annotation(),
            Some(AnnotationContent::Text("a photo of a cat".into()))
        );
        let empty = OcrImage {
            id: None,
            image_annotation: Some(json!("  ")),
        };
        assert_eq!(empty.annotation(), None);
        assert_eq!(OcrImage::default().annotation(), None);
    }

    #[test]
    fn client_trims_base_url() {
        let c = ProviderClient::with_http(reqwest::Client::new(), "http://x/v1/");
        assert_eq!(c.base_url(), "http://x/v1");
    }
}
