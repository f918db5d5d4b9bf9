//! Configuration types for the OCR relay.
//!
//! All relay behaviour is controlled through [`RelayConfig`], built via its
//! [`RelayConfigBuilder`]. The server holds one config behind an `Arc` and
//! shares it with every request; nothing in it changes after startup.
//!
//! The server-side credential lives here as an explicit value. A request's
//! `X-API-Key` header still takes precedence over it.

use crate::error::RelayError;
use crate::progress::StageCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default provider endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.mistral.ai/v1";

/// Default OCR model.
pub const DEFAULT_MODEL: &str = "mistral-ocr-latest";

/// Default upload cap: 50 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Configuration for the relay pipeline.
///
/// # Example
/// ```rust
/// use edgequake_ocr_relay::RelayConfig;
///
/// let config = RelayConfig::builder()
///     .api_base_url("http://localhost:9000/v1")
///     .max_upload_mb(10)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
/// ```
#[derive(Clone)]
pub struct RelayConfig {
    /// Base URL of the provider API, without a trailing slash.
    pub api_base_url: String,

    /// OCR model identifier. Default: `mistral-ocr-latest`.
    pub model: String,

    /// Server-side fallback credential. Used only when a request carries no
    /// `X-API-Key` header.
    pub api_key: Option<String>,

    /// Lifetime of the signed retrieval URL, in hours. Default: 24.
    ///
    /// The URL is read once by the OCR stage of the same request.
    pub signed_url_expiry_hours: u32,

    /// Ask the provider to embed extracted images as base64. Default: true.
    pub include_image_base64: bool,

    /// Request structured annotations for detected figures. Default: true.
    pub annotate_images: bool,

    /// Language of the annotation schema and of page headers. Default: pt-BR.
    pub locale: AnnotationLocale,

    /// Separator inserted between pages. Default: horizontal rule.
    pub page_separator: PageSeparator,

    /// Largest accepted upload in bytes. Default: 50 MiB.
    pub max_upload_bytes: usize,

    /// Per-call timeout for provider requests. Default: none (transport default).
    pub request_timeout_secs: Option<u64>,

    /// Observer notified on every stage transition.
    pub progress_callback: Option<StageCallback>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            signed_url_expiry_hours: 24,
            include_image_base64: true,
            annotate_images: true,
            locale: AnnotationLocale::default(),
            page_separator: PageSeparator::HorizontalRule,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            request_timeout_secs: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("api_base_url", &self.api_base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_deref().map(redact_key))
            .field("signed_url_expiry_hours", &self.signed_url_expiry_hours)
            .field("include_image_base64", &self.include_image_base64)
            .field("annotate_images", &self.annotate_images)
            .field("locale", &self.locale)
            .field("page_separator", &self.page_separator)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn StageProgressCallback>"),
            )
            .finish()
    }
}

impl RelayConfig {
    /// Create a new builder for `RelayConfig`.
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder {
            config: Self::default(),
        }
    }

    /// Upload cap expressed in whole MiB, for error messages.
    pub fn max_upload_mb(&self) -> usize {
        self.max_upload_bytes / (1024 * 1024)
    }

    /// Pick the credential for a request: header first, then configuration.
    ///
    /// Empty strings count as absent.
    pub fn resolve_credential(&self, header_key: Option<&str>) -> Option<String> {
        header_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.api_key
                    .as_deref()
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
            })
    }
}

/// Builder for [`RelayConfig`].
#[derive(Debug)]
pub struct RelayConfigBuilder {
    config: RelayConfig,
}

impl RelayConfigBuilder {
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn signed_url_expiry_hours(mut self, hours: u32) -> Self {
        self.config.signed_url_expiry_hours = hours;
        self
    }

    pub fn include_image_base64(mut self, v: bool) -> Self {
        self.config.include_image_base64 = v;
        self
    }

    pub fn annotate_images(mut self, v: bool) -> Self {
        self.config.annotate_images = v;
        self
    }

    pub fn locale(mut self, locale: AnnotationLocale) -> Self {
        self.config.locale = locale;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn max_upload_mb(mut self, mb: usize) -> Self {
        self.config.max_upload_bytes = mb.saturating_mul(1024 * 1024);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    pub fn progress_callback(mut self, cb: StageCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RelayConfig, RelayError> {
        let c = &self.config;
        if !c.api_base_url.starts_with("http://") && !c.api_base_url.starts_with("https://") {
            return Err(RelayError::InvalidConfig(format!(
                "API base URL must be http(s), got '{}'",
                c.api_base_url
            )));
        }
        if c.model.trim().is_empty() {
            return Err(RelayError::InvalidConfig("Model must not be empty".into()));
        }
        if c.signed_url_expiry_hours == 0 {
            return Err(RelayError::InvalidConfig(
                "Signed URL expiry must be ≥ 1 hour".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(RelayError::InvalidConfig(
                "Upload cap must be ≥ 1 byte".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Show only the first four characters of a credential.
pub fn redact_key(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    format!("{visible}…")
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Language used for the image-annotation schema and page headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AnnotationLocale {
    /// Brazilian Portuguese (default).
    #[default]
    PtBr,
    /// English.
    En,
}

impl AnnotationLocale {
    /// Parse `pt-BR`, `pt`, `en`, `en-US` and friends.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pt" | "pt-br" | "pt_br" | "ptbr" => Some(AnnotationLocale::PtBr),
            "en" | "en-us" | "en_us" | "en-gb" => Some(AnnotationLocale::En),
            _ => None,
        }
    }

    /// Header emitted before each page body (1-indexed page number).
    pub fn page_header(&self, page_num: usize) -> String {
        match self {
            AnnotationLocale::PtBr => format!("## Página {page_num}"),
            AnnotationLocale::En => format!("## Page {page_num}"),
        }
    }
}

/// How to separate pages in the assembled Markdown output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSeparator {
    /// No separator; pages joined with "\n\n".
    None,
    /// Horizontal rule: "\n\n---\n\n" (default)
    #[default]
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator string placed before the given page (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }

    /// Parse `none`, `hr`, `comment`, or a custom string.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" => PageSeparator::None,
            "hr" | "---" => PageSeparator::HorizontalRule,
            "comment" => PageSeparator::Comment,
            _ => PageSeparator::Custom(s.to_string()),
        }
    }
}
