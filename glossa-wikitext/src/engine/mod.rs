//! Macro-expansion engine
//!
//! The engine owns the compiled [`Rules`] and a [`TemplateResolver`]; all
//! per-page state lives in a [`ParseContext`] created for each call, so one
//! engine serves any number of pages.

use std::sync::Arc;

use glossa_core::{Force, GlossaResult, Params, Token};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::render::render;
use crate::resolver::TemplateResolver;
use crate::rules::Rules;

pub mod context;
pub mod expand;
pub mod section;

pub use context::{Frame, ParseContext, TemplateCache};
pub use expand::{params_to_dict, Expansion};
pub use section::Flow;

/// Invocation names as written in raw text.
static INVOCATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}|]+?)\s*(?:\||\}\})").expect("static pattern"));

/// Result of parsing one page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    /// A skip-page template was found; nothing is emitted.
    Skipped,
    Parsed {
        tokens: Vec<Token>,
        warnings: Vec<String>,
    },
}

/// Result of expanding a piece of text outside a page walk.
#[derive(Debug, Clone, PartialEq)]
pub struct Expanded {
    pub text: String,
    pub tokens: Vec<Token>,
    pub warnings: Vec<String>,
}

pub struct Engine<R> {
    rules: Arc<Rules>,
    resolver: R,
}

impl<R: TemplateResolver> Engine<R> {
    pub fn new(rules: Arc<Rules>, resolver: R) -> Self {
        Self { rules, resolver }
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Cheap pre-check on raw text: the page mentions one of the
    /// must-contain strings and invokes a root or pass-through template.
    pub fn is_valid_page(&self, text: &str) -> bool {
        if !self.rules.must_contain().iter().any(|needle| text.contains(needle.as_str())) {
            return false;
        }
        INVOCATION.captures_iter(text).any(|caps| {
            let name = self.rules.strip_namespace(&caps[1]);
            self.rules.is_root(name) || self.rules.is_pass_through(name)
        })
    }

    /// Parse one page into its token stream.
    pub fn parse_page(&self, title: &str, text: &str, force: Force) -> GlossaResult<PageOutcome> {
        let mut ctx = ParseContext::new(title, force);
        if self.walk_page(&mut ctx, text)? == Flow::SkipPage {
            return Ok(PageOutcome::Skipped);
        }
        tracing::debug!(
            page = %title,
            tokens = ctx.tokens.len(),
            warnings = ctx.warnings.len(),
            lookups = ctx.templates.lookups(),
            "page parsed"
        );
        Ok(PageOutcome::Parsed {
            tokens: ctx.tokens,
            warnings: ctx.warnings,
        })
    }

    /// Expand `text` as if it were a template body called with `args`.
    pub fn expand_text(&self, title: &str, text: &str, args: Params, force: Force) -> GlossaResult<Expanded> {
        let mut ctx = ParseContext::new(title, force);
        let frame = Frame::with_args(args);
        let nodes = self.expand_nodes(&mut ctx, &frame, crate::parser::parse(text))?;
        Ok(Expanded {
            text: render(&nodes),
            tokens: ctx.tokens,
            warnings: ctx.warnings,
        })
    }
}
