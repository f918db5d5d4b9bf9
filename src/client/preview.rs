//! Result preview: rendered (ANSI-styled) or raw Markdown.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreviewMode {
    #[default]
    Rendered,
    Raw,
}

/// Which view of the Markdown is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreviewState {
    mode: PreviewMode,
}

impl PreviewState {
    pub fn new(mode: PreviewMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> PreviewMode {
        self.mode
    }

    /// Flip between rendered and raw; returns the new mode.
    pub fn toggle(&mut self) -> PreviewMode {
        self.mode = match self.mode {
            PreviewMode::Rendered => PreviewMode::Raw,
            PreviewMode::Raw => PreviewMode::Rendered,
        };
        self.mode
    }

    /// Text to display for `markdown` in the current mode.
    pub fn render(&self, markdown: &str) -> String {
        match self.mode {
            PreviewMode::Rendered => render_for_terminal(markdown),
            PreviewMode::Raw => markdown.to_string(),
        }
    }
}

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

static RE_STRONG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*([^*\n]+)\*\*").expect("valid strong regex"));

static RE_CODE_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([^`\n]+)`").expect("valid code-span regex"));

/// Style Markdown for a terminal: bold cyan headings, dim quotes and code,
/// bold `**strong**`, box-drawing rules.
pub fn render_for_terminal(markdown: &str) -> String {
    let mut in_fence = false;
    markdown
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") {
                in_fence = !in_fence;
                return format!("{DIM}{line}{RESET}");
            }
            if in_fence {
                return format!("{DIM}{line}{RESET}");
            }
            if trimmed.starts_with('#') {
                let text = trimmed.trim_start_matches('#').trim();
                return format!("{BOLD}{CYAN}{text}{RESET}");
            }
            if matches!(trimmed, "---" | "***" | "___") {
                return format!("{DIM}{}{RESET}", "─".repeat(40));
            }
            if let Some(body) = trimmed.strip_prefix('>') {
                return format!("{DIM}│{RESET} {}", inline(body.trim_start()));
            }
            inline(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn inline(text: &str) -> String {
    let s = RE_STRONG.replace_all(text, format!("{BOLD}$1{RESET}").as_str());
    RE_CODE_SPAN
        .replace_all(&s, format!("{DIM}$1{RESET}").as_str())
        .to_string()
}
