//! Per-page parse state
//!
//! One [`ParseContext`] lives for exactly one page. It is threaded through
//! the expansion and section walkers by `&mut`; nothing about a page is
//! kept on the engine itself.

use std::collections::{HashMap, HashSet};

use glossa_core::entities::unescape;
use glossa_core::{Force, GlossaResult, HeaderSegment, Params, Token, TokenParams};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::resolver::TemplateResolver;

static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ _]+").expect("static pattern"));

// ============================================================================
// TEMPLATE MEMO
// ============================================================================

/// Template bodies looked up while parsing one page, misses included,
/// plus the names the resolver knows locally, listed on first need.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: HashMap<String, Option<String>>,
    known: Option<HashSet<String>>,
    lookups: usize,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memo key: runs of spaces and underscores collapse to one space.
    pub fn key(name: &str) -> String {
        SPACES.replace_all(name.trim(), " ").into_owned()
    }

    /// Body of template `name`, asking `resolver` on first use.
    pub fn resolve<R>(&mut self, resolver: &R, name: &str, force: Force) -> GlossaResult<Option<String>>
    where
        R: TemplateResolver + ?Sized,
    {
        let key = Self::key(name);
        if let Some(hit) = self.entries.get(&key) {
            return Ok(hit.clone());
        }
        self.lookups += 1;
        let body = resolver.resolve(&key, force.nested())?;
        self.entries.insert(key, body.clone());
        Ok(body)
    }

    /// Whether template `name` exists.
    ///
    /// A name already resolved on this page answers from the memo. Otherwise
    /// the resolver's local name list decides; `ForceAll` resolves the name
    /// instead, so the answer reflects upstream.
    pub fn contains<R>(&mut self, resolver: &R, name: &str, force: Force) -> GlossaResult<bool>
    where
        R: TemplateResolver + ?Sized,
    {
        let key = Self::key(name);
        if let Some(hit) = self.entries.get(&key) {
            return Ok(hit.is_some());
        }
        if force == Force::ForceAll {
            return Ok(self.resolve(resolver, &key, force)?.is_some());
        }
        if self.known.is_none() {
            let names = resolver.names()?;
            self.known = Some(names.iter().map(|n| Self::key(n)).collect());
        }
        Ok(self.known.as_ref().is_some_and(|known| known.contains(&key)))
    }

    /// Resolver calls made so far.
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}

// ============================================================================
// CONTEXT
// ============================================================================

/// Mutable state of one page parse.
#[derive(Debug)]
pub struct ParseContext {
    pub page_title: String,
    pub header: Vec<HeaderSegment>,
    pub tokens: Vec<Token>,
    pub warnings: Vec<String>,
    pub templates: TemplateCache,
    pub force: Force,
}

impl ParseContext {
    pub fn new(page_title: impl Into<String>, force: Force) -> Self {
        Self {
            page_title: page_title.into(),
            header: Vec::new(),
            tokens: Vec::new(),
            warnings: Vec::new(),
            templates: TemplateCache::new(),
            force,
        }
    }

    /// Emit a token with named parameters at the current header. Entity
    /// references in values are decoded.
    pub fn emit_named(&mut self, name: impl Into<String>, params: Params) {
        let params = params.into_iter().map(|(k, v)| (k, unescape(&v))).collect();
        self.tokens
            .push(Token::new(self.header.clone(), name, TokenParams::Named(params)));
    }

    pub fn emit_text(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.tokens
            .push(Token::new(self.header.clone(), name, TokenParams::Text(text.into())));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(page = %self.page_title, %message, "parse warning");
        self.warnings.push(message);
    }

    /// Header path as a short label for warnings.
    pub fn header_label(&self) -> String {
        let parts: Vec<String> = self
            .header
            .iter()
            .map(|segment| match segment {
                HeaderSegment::Placeholder => "-".to_string(),
                HeaderSegment::Text(text) => text.clone(),
                HeaderSegment::Meaning { template, params, .. } => {
                    let args: Vec<&str> = params.values().map(String::as_str).collect();
                    format!("{{{{{}|{}}}}}", template, args.join("|"))
                }
            })
            .collect();
        format!("[{}]", parts.join(" / "))
    }
}

/// Argument frame of one template expansion.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Dotted path of enclosing template names, for diagnostics.
    pub name: String,
    pub args: Params,
    pub depth: usize,
}

impl Frame {
    /// The page itself: no arguments bound.
    pub fn page() -> Self {
        Self::default()
    }

    pub fn with_args(args: Params) -> Self {
        Self {
            args,
            ..Self::default()
        }
    }

    /// Frame for the body of template `name` invoked from this frame.
    pub fn enter(&self, name: &str, args: Params) -> Self {
        let name = if self.name.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.name, name)
        };
        Self {
            name,
            args,
            depth: self.depth + 1,
        }
    }

    /// Where an error occurred, for messages.
    pub fn context(&self, page_title: &str) -> String {
        if self.name.is_empty() {
            page_title.to_string()
        } else {
            format!("{} ({})", page_title, self.name)
        }
    }
}
