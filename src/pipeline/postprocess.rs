//! Post-processing: turn provider OCR pages into one Markdown document.
//!
//! Everything here is a pure function (`&str → String` or pages → `String`)
//! with no network access, so each rule is testable in isolation.
//!
//! ## Why strip image references?
//!
//! The provider's page Markdown points at extracted rasters by id
//! (`![img-0.jpeg](img-0.jpeg)`). The relay does not ship those bytes to the
//! client, so the links would render as broken images. They are removed and
//! the image's structured annotation is rendered in their place under the
//! page text.
//!
//! ## Rule Order (per page)
//!
//! 1. Normalise line endings (CRLF → LF)
//! 2. Strip references to extracted raster images
//! 3. Trim trailing whitespace per line
//! 4. Collapse 3+ consecutive blank lines down to 2
//! 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)

use crate::annotations;
use crate::config::{AnnotationLocale, PageSeparator};
use crate::pipeline::provider::{AnnotationContent, OcrPage, OcrResponse};
use once_cell::sync::Lazy;
use regex::Regex;

/// Assemble the final Markdown for an OCR result.
///
/// Pages are emitted in provider order, each under a 1-indexed header, and
/// joined with `separator`. Without a page array the fallback chain of
/// [`fallback_text`] applies, so the output is never empty for a
/// non-empty provider answer.
pub fn assemble_markdown(
    result: &OcrResponse,
    separator: &PageSeparator,
    locale: AnnotationLocale,
) -> String {
    let pages = result.pages();
    if pages.is_empty() {
        return fallback_text(result);
    }

    let mut out = String::new();
    for (i, page) in pages.iter().enumerate() {
        let page_num = i + 1;
        if i > 0 {
            out.push_str(&separator.render(page_num));
        }
        out.push_str(&render_page(page, page_num, locale));
    }
    out
}

/// Header, cleaned body, then annotation blocks for one page.
pub fn render_page(page: &OcrPage, page_num: usize, locale: AnnotationLocale) -> String {
    let mut out = locale.page_header(page_num);
    out.push_str("\n\n");

    let body = clean_page_markdown(page.markdown());
    if !body.is_empty() {
        out.push_str(&body);
    }

    let blocks: Vec<String> = page
        .images()
        .iter()
        .enumerate()
        .filter_map(|(n, img)| {
            img.annotation()
                .map(|a| render_annotation(&a, img.id.as_deref(), n + 1, locale))
        })
        .collect();

    if !blocks.is_empty() {
        if !body.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&blocks.join("\n\n"));
    }
    out
}

/// Render one annotation as a labeled blockquote.
pub fn render_annotation(
    annotation: &AnnotationContent,
    image_id: Option<&str>,
    ordinal: usize,
    locale: AnnotationLocale,
) -> String {
    let (image, kind, description, summary) = annotations::labels(locale);
    let title = match image_id {
        Some(id) if !id.trim().is_empty() => format!("> **🖼️ {image} {ordinal}** (`{id}`)"),
        _ => format!("> **🖼️ {image} {ordinal}**"),
    };

    let mut lines = vec![title];
    match annotation {
        AnnotationContent::Structured(a) => {
            for (label, value) in [
                (kind, &a.image_type),
                (description, &a.short_description),
                (summary, &a.summary),
            ] {
                let value = value.trim();
                if !value.is_empty() {
                    lines.push(">".to_string());
                    lines.push(format!("> **{label}:** {}", quote_continuation(value)));
                }
            }
        }
        AnnotationContent::Text(text) => {
            lines.push(">".to_string());
            lines.push(format!("> {}", quote_continuation(text.trim())));
        }
    }
    lines.join("\n")
}

/// Keep multi-line values inside the blockquote.
fn quote_continuation(value: &str) -> String {
    value.lines().collect::<Vec<_>>().join("\n> ")
}

/// Text used when the provider returned no page array.
///
/// Tries the top-level `content`, `text` and `markdown` string fields in that
/// order, then falls back to the pretty-printed raw result.
pub fn fallback_text(result: &OcrResponse) -> String {
    for key in ["content", "text", "markdown"] {
        if let Some(s) = result.extra.get(key).and_then(|v| v.as_str()) {
            if !s.trim().is_empty() {
                return s.to_string();
            }
        }
    }
    serde_json::to_string_pretty(result).unwrap_or_else(|_| "{}".to_string())
}

/// Apply the per-page cleanup rules in order.
pub fn clean_page_markdown(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_image_references(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip extracted-image references ─────────────────────────────────
//
// Keep `![alt](url)` only when the url is an absolute http(s) link that points
// somewhere real. Provider-local ids (`img-0.jpeg`), data URIs and empty
// targets are removed along with their alt text, which is just the id again.

static RE_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").expect("valid image regex"));

static RE_EMPTY_LINES_LEFT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]+$").expect("valid blank-line regex"));

fn is_external_url(url: &str) -> bool {
    let u = url.trim();
    u.starts_with("http://") || u.starts_with("https://")
}

/// Remove inline references to extracted raster images.
pub fn strip_image_references(input: &str) -> String {
    let stripped = RE_IMAGE.replace_all(input, |caps: &regex::Captures<'_>| {
        if is_external_url(&caps[2]) {
            caps[0].to_string()
        } else {
            String::new()
        }
    });
    RE_EMPTY_LINES_LEFT.replace_all(&stripped, "").to_string()
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank-lines regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 5: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::provider::OcrImage;
    use serde_json::json;

    fn page(md: &str) -> OcrPage {
        OcrPage {
            index: None,
            markdown: Some(md.to_string()),
            images: None,
        }
    }

    fn response(pages: Vec<OcrPage>) -> OcrResponse {
        OcrResponse {
            pages: Some(pages),
            ..Default::default()
        }
    }

    #[test]
    fn pages_joined_in_order_with_separator() {
        let md = assemble_markdown(
            &response(vec![page("A"), page("B")]),
            &PageSeparator::HorizontalRule,
            AnnotationLocale::En,
        );
        let a = md.find('A').unwrap();
        let sep = md.find("\n\n---\n\n").unwrap();
        let b = md.rfind('B').unwrap();
        assert!(a < sep && sep < b, "got: {md:?}");
        assert_eq!(md, "## Page 1\n\nA\n\n---\n\n## Page 2\n\nB");
    }

    #[test]
    fn strips_local_image_refs_keeps_external() {
        let input = "Intro\n\n![img-0.jpeg](img-0.jpeg)\n\nSee ![logo](https://cdn.example.org/logo.png)";
        let out = strip_image_references(input);
        assert!(!out.contains("img-0.jpeg"), "got: {out}");
        assert!(out.contains("![logo](https://cdn.example.org/logo.png)"));
    }

    #[test]
    fn strips_data_uri_and_empty_targets() {
        let out = strip_image_references("a ![x](data:image/png;base64,AAAA) b ![]() c");
        assert_eq!(out, "a  b  c");
    }

    #[test]
    fn clean_page_collapses_leftover_gaps() {
        let out = clean_page_markdown("Line one\r\n\r\n![img-1.png](img-1.png)\r\n\r\nLine two   ");
        assert_eq!(out, "Line one\n\nLine two");
    }

    #[test]
    fn remove_invisible() {
        assert_eq!(
            remove_invisible_chars("hello\u{200B}world\u{FEFF}foo\u{00AD}bar"),
            "helloworldfoobar"
        );
    }

    #[test]
    fn annotations_rendered_after_body() {
        let p = OcrPage {
            index: Some(0),
            markdown: Some("Revenue grew.\n\n![img-0.jpeg](img-0.jpeg)".into()),
            images: Some(vec![OcrImage {
                id: Some("img-0.jpeg".into()),
                image_annotation: Some(json!(
                    "{\"image_type\":\"bar chart\",\"short_description\":\"Revenue by year\",\"summary\":\"Steady growth\\nfrom 2019 to 2023\"}"
                )),
            }]),
        };
        let out = render_page(&p, 1, AnnotationLocale::En);
        assert!(out.starts_with("## Page 1\n\nRevenue grew."));
        assert!(out.contains("> **🖼️ Image 1** (`img-0.jpeg`)"));
        assert!(out.contains("> **Type:** bar chart"));
        assert!(out.contains("> **Description:** Revenue by year"));
        assert!(out.contains("> **Summary:** Steady growth\n> from 2019 to 2023"));
        assert!(out.find("Revenue grew.").unwrap() < out.find("> **Type:**").unwrap());
    }

    #[test]
    fn portuguese_labels() {
        let a = AnnotationContent::Text("uma foto".into());
        let out = render_annotation(&a, None, 2, AnnotationLocale::PtBr);
        assert_eq!(out, "> **🖼️ Imagem 2**\n>\n> uma foto");
    }

    #[test]
    fn fallback_prefers_content_then_text() {
        let r: OcrResponse = serde_json::from_value(json!({"text": "plain", "content": "rich"})).unwrap();
        assert_eq!(fallback_text(&r), "rich");
        let r: OcrResponse = serde_json::from_value(json!({"markdown": "# md"})).unwrap();
        assert_eq!(fallback_text(&r), "# md");
    }

    #[test]
    fn fallback_serialises_raw_result() {
        let r: OcrResponse = serde_json::from_value(json!({"model": "m", "pages": []})).unwrap();
        let out = assemble_markdown(&r, &PageSeparator::HorizontalRule, AnnotationLocale::En);
        assert!(out.contains("\"model\": \"m\""), "got: {out}");
    }

    #[test]
    fn empty_page_keeps_header() {
        let out = render_page(&page(""), 3, AnnotationLocale::En);
        assert_eq!(out, "## Page 3\n\n");
    }
}
