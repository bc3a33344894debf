//! Engine rules file
//!
//! Everything language-specific the engine needs: which templates are
//! terminal tokens, which are expanded for their output, which are noise,
//! and the small rewrite table for magic words. Loaded from TOML and
//! compiled into [`Rules`](crate::rules::Rules) once.

use glossa_core::{ConfigError, GlossaError, GlossaResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Replacement applied to a template invocation instead of expanding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteAction {
    /// Replace with fixed text.
    Literal(String),
    /// Replace with the title of the page being parsed.
    PageTitle,
    /// Drop the invocation.
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewriteRule {
    pub name: String,
    /// Match any name starting with `name`.
    #[serde(default)]
    pub prefix: bool,
    pub action: RewriteAction,
}

impl RewriteRule {
    pub fn exact(name: impl Into<String>, action: RewriteAction) -> Self {
        Self {
            name: name.into(),
            prefix: false,
            action,
        }
    }

    pub fn prefix(name: impl Into<String>, action: RewriteAction) -> Self {
        Self {
            name: name.into(),
            prefix: true,
            action,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        if self.prefix {
            name.starts_with(&self.name)
        } else {
            name == self.name
        }
    }
}

/// A template that is left as an opaque invocation. With `unless_param`
/// set, it is expanded once that parameter has a non-blank value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoExpandRule {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unless_param: Option<String>,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Pattern searched in level-1 heading titles to pick sections.
    pub section_marker: String,
    /// Promote lines holding only a section marker to level-1 headings.
    pub wrap_marker_lines: bool,
    /// A page is parsed only if it contains one of these strings.
    pub must_contain: Vec<String>,
    /// Prefixes stripped from template names, e.g. `Template:`.
    pub template_namespaces: Vec<String>,
    /// Stripped from template names, case-insensitively.
    pub safe_subst_prefix: String,
    /// Tag whose contents never render.
    pub no_render_tag: String,
    /// Templates emitted as terminal tokens.
    pub root_templates: Vec<String>,
    /// Patterns for templates whose expansion is parsed like page text.
    pub pass_through: Vec<String>,
    pub ignore_templates: Vec<String>,
    pub ignore_prefixes: Vec<String>,
    /// Templates marking a page that must not be parsed at all.
    pub skip_page_templates: Vec<String>,
    pub meaning_headers: Vec<String>,
    /// Parameters of root templates that may hold text or root templates.
    pub well_known_params: Vec<String>,
    /// Text allowed next to root templates inside a well-known parameter.
    pub allowed_separators: String,
    pub max_depth: usize,
    #[serde(rename = "rewrite")]
    pub rewrites: Vec<RewriteRule>,
    pub no_expand: Vec<NoExpandRule>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            section_marker: r"(?i)\{\{\s*-ru-\s*\}\}".to_string(),
            wrap_marker_lines: false,
            must_contain: Vec::new(),
            template_namespaces: ["Шаблон:", "шаблон:", "Template:", "template:"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            safe_subst_prefix: "safesubst:".to_string(),
            no_render_tag: "noinclude".to_string(),
            root_templates: Vec::new(),
            pass_through: Vec::new(),
            ignore_templates: Vec::new(),
            ignore_prefixes: Vec::new(),
            skip_page_templates: Vec::new(),
            meaning_headers: Vec::new(),
            well_known_params: Vec::new(),
            allowed_separators: r"^[и, \n/!]+$".to_string(),
            max_depth: 40,
            rewrites: vec![
                RewriteRule::exact("-", RewriteAction::Literal("\u{a0}— ".to_string())),
                RewriteRule::exact("PAGENAME", RewriteAction::PageTitle),
                RewriteRule::exact("NAMESPACE", RewriteAction::Remove),
                RewriteRule::prefix("anchorencode:", RewriteAction::Remove),
                RewriteRule::exact("ns:0", RewriteAction::Remove),
                RewriteRule::exact("ns:Template", RewriteAction::Literal("10".to_string())),
            ],
            no_expand: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> GlossaResult<Self> {
        let config: EngineConfig = toml::from_str(source).map_err(|e| ConfigError::InvalidValue {
            field: "rules".to_string(),
            value: String::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> GlossaResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }

    /// Check values the compiled rules cannot express. Patterns are checked
    /// when compiling.
    pub fn validate(&self) -> GlossaResult<()> {
        if self.max_depth == 0 {
            return Err(GlossaError::Config(ConfigError::InvalidValue {
                field: "max_depth".to_string(),
                value: "0".to_string(),
                reason: "must be greater than 0".to_string(),
            }));
        }
        if self.section_marker.is_empty() {
            return Err(GlossaError::Config(ConfigError::MissingRequired {
                field: "section_marker".to_string(),
            }));
        }
        for rule in &self.rewrites {
            if rule.name.is_empty() {
                return Err(GlossaError::Config(ConfigError::InvalidValue {
                    field: "rewrite.name".to_string(),
                    value: String::new(),
                    reason: "must not be empty".to_string(),
                }));
            }
        }
        Ok(())
    }

    pub fn with_root_templates<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.root_templates = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_pass_through(mut self, pattern: impl Into<String>) -> Self {
        self.pass_through.push(pattern.into());
        self
    }

    pub fn with_must_contain(mut self, needle: impl Into<String>) -> Self {
        self.must_contain.push(needle.into());
        self
    }

    pub fn with_well_known_param(mut self, name: impl Into<String>) -> Self {
        self.well_known_params.push(name.into());
        self
    }

    pub fn with_meaning_header(mut self, name: impl Into<String>) -> Self {
        self.meaning_headers.push(name.into());
        self
    }

    pub fn with_no_expand(mut self, name: impl Into<String>, unless_param: Option<&str>) -> Self {
        self.no_expand.push(NoExpandRule {
            name: name.into(),
            unless_param: unless_param.map(str::to_string),
        });
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}
