//! Content cleanup applied to fetched page text

use glossa_core::entities::unescape;
use once_cell::sync::Lazy;
use regex::Regex;

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"<!--[\s\S]*?-->").expect("static pattern"));
static NOINCLUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*noinclude\s*>[\s\S]*?<\s*/\s*noinclude\s*>").expect("static pattern")
});
static INCLUDEONLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*includeonly\s*>([\s\S]*?)<\s*/\s*includeonly\s*>").expect("static pattern")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContentFilter {
    /// Store text as fetched.
    #[default]
    Raw,
    /// Keep only what a transclusion sees: comments and `<noinclude>`
    /// blocks removed, `<includeonly>` unwrapped, entities decoded.
    TemplateBody,
}

impl ContentFilter {
    pub fn apply(&self, text: String) -> String {
        match self {
            ContentFilter::Raw => text,
            ContentFilter::TemplateBody => {
                let text = COMMENT.replace_all(&text, "");
                let text = NOINCLUDE.replace_all(&text, "");
                let text = INCLUDEONLY.replace_all(&text, "$1");
                unescape(&text)
            }
        }
    }
}
