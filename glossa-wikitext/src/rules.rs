//! Compiled engine rules

use std::collections::{HashMap, HashSet};

use glossa_core::{ConfigError, GlossaResult};
use regex::Regex;

use crate::config::{EngineConfig, RewriteAction, RewriteRule};
use crate::parser::Template;

/// How a do-not-expand rule decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoExpand {
    Never,
    /// Expand only when this parameter has a non-blank value.
    UnlessParam(String),
}

impl NoExpand {
    fn blocks(&self, template: &Template) -> bool {
        match self {
            NoExpand::Never => true,
            NoExpand::UnlessParam(param) => template
                .get(param)
                .map_or(true, |p| p.value_text().is_empty()),
        }
    }
}

/// Template names compare with their first letter case-folded, the way
/// wiki titles do.
pub fn fold(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// [`EngineConfig`] with patterns compiled and name sets folded.
#[derive(Debug, Clone)]
pub struct Rules {
    section_marker: Regex,
    wrap_marker_lines: bool,
    must_contain: Vec<String>,
    template_namespaces: Vec<String>,
    safe_subst_prefix: String,
    no_render_tag: String,
    root: HashSet<String>,
    pass_through: Vec<Regex>,
    ignore: HashSet<String>,
    ignore_prefixes: Vec<String>,
    skip_page: HashSet<String>,
    meaning_headers: HashSet<String>,
    well_known: Vec<String>,
    allowed_separators: Regex,
    max_depth: usize,
    rewrites: Vec<RewriteRule>,
    no_expand: HashMap<String, NoExpand>,
}

impl Rules {
    pub fn compile(config: &EngineConfig) -> GlossaResult<Self> {
        config.validate()?;
        let folded = |names: &[String]| names.iter().map(|n| fold(n.trim())).collect::<HashSet<_>>();
        let pass_through = config
            .pass_through
            .iter()
            .map(|p| pattern("pass_through", p))
            .collect::<GlossaResult<Vec<_>>>()?;
        let no_expand = config
            .no_expand
            .iter()
            .map(|rule| {
                let decision = match &rule.unless_param {
                    Some(param) => NoExpand::UnlessParam(param.clone()),
                    None => NoExpand::Never,
                };
                (fold(rule.name.trim()), decision)
            })
            .collect();

        Ok(Self {
            section_marker: pattern("section_marker", &config.section_marker)?,
            wrap_marker_lines: config.wrap_marker_lines,
            must_contain: config.must_contain.clone(),
            template_namespaces: config.template_namespaces.clone(),
            safe_subst_prefix: config.safe_subst_prefix.clone(),
            no_render_tag: config.no_render_tag.to_ascii_lowercase(),
            root: folded(&config.root_templates),
            pass_through,
            ignore: folded(&config.ignore_templates),
            ignore_prefixes: config.ignore_prefixes.iter().map(|p| fold(p)).collect(),
            skip_page: folded(&config.skip_page_templates),
            meaning_headers: folded(&config.meaning_headers),
            well_known: config.well_known_params.iter().map(|p| p.trim().to_string()).collect(),
            allowed_separators: pattern("allowed_separators", &config.allowed_separators)?,
            max_depth: config.max_depth,
            rewrites: config.rewrites.clone(),
            no_expand,
        })
    }

    // ========================================================================
    // NAMES
    // ========================================================================

    /// Drop a leading template namespace, if any.
    pub fn strip_namespace<'n>(&self, name: &'n str) -> &'n str {
        self.template_namespaces
            .iter()
            .find_map(|ns| name.strip_prefix(ns.as_str()))
            .unwrap_or(name)
    }

    /// Trim, drop the namespace and the safe-substitution prefix.
    pub fn normalize_name<'n>(&self, raw: &'n str) -> &'n str {
        let name = self.strip_namespace(raw.trim());
        let prefix = self.safe_subst_prefix.as_str();
        match name.get(..prefix.len()) {
            Some(head) if !prefix.is_empty() && head.eq_ignore_ascii_case(prefix) => name[prefix.len()..].trim(),
            _ => name.trim(),
        }
    }

    pub fn is_root(&self, name: &str) -> bool {
        self.root.contains(&fold(name))
    }

    pub fn is_pass_through(&self, name: &str) -> bool {
        self.pass_through.iter().any(|re| re.find(name).is_some_and(|m| m.start() == 0))
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.contains(&fold(name))
    }

    pub fn has_ignored_prefix(&self, name: &str) -> bool {
        let name = fold(name);
        self.ignore_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    pub fn skips_page(&self, name: &str) -> bool {
        self.skip_page.contains(&fold(name))
    }

    pub fn is_meaning_header(&self, name: &str) -> bool {
        self.meaning_headers.contains(&fold(name))
    }

    pub fn is_well_known(&self, key: &str) -> bool {
        self.well_known.iter().any(|w| w == key)
    }

    pub fn rewrite(&self, name: &str) -> Option<&RewriteAction> {
        self.rewrites.iter().find(|r| r.matches(name)).map(|r| &r.action)
    }

    /// Whether an invocation stays as written instead of being expanded.
    /// A do-not-expand rule for the name overrides the root set.
    pub fn keeps_unexpanded(&self, name: &str, template: &Template) -> bool {
        let folded = fold(name);
        let blocked = match self.no_expand.get(&folded) {
            Some(rule) => rule.blocks(template),
            None => self.root.contains(&folded) || self.meaning_headers.contains(&folded),
        };
        blocked || self.ignore.contains(&folded)
    }

    // ========================================================================
    // PAGES
    // ========================================================================

    pub fn section_marker(&self) -> &Regex {
        &self.section_marker
    }

    pub fn wrap_marker_lines(&self) -> bool {
        self.wrap_marker_lines
    }

    pub fn must_contain(&self) -> &[String] {
        &self.must_contain
    }

    pub fn no_render_tag(&self) -> &str {
        &self.no_render_tag
    }

    pub fn allows_separator(&self, text: &str) -> bool {
        self.allowed_separators.is_match(text)
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

fn pattern(field: &str, source: &str) -> GlossaResult<Regex> {
    Regex::new(source).map_err(|e| {
        ConfigError::InvalidPattern {
            field: field.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Node, Param};
    use glossa_core::GlossaError;

    fn rules() -> Rules {
        let config = EngineConfig::default()
            .with_root_templates(["по-слогам", "inflection сущ ru"])
            .with_pass_through(r"^([iI]nflection )?[сС]ущ[- _]ru($|[ +][^/]*$)")
            .with_no_expand("inflection сущ ru", Some("form"));
        Rules::compile(&config).unwrap()
    }

    #[test]
    fn test_names_fold_first_letter() {
        let rules = rules();
        assert!(rules.is_root("по-слогам"));
        assert!(rules.is_root("По-слогам"));
        assert!(!rules.is_root("ПО-СЛОГАМ"));
    }

    #[test]
    fn test_normalize_strips_namespace_and_safesubst() {
        let rules = rules();
        assert_eq!(rules.normalize_name("  Шаблон:сущ ru "), "сущ ru");
        assert_eq!(rules.normalize_name("SafeSubst: сущ ru"), "сущ ru");
        assert_eq!(rules.normalize_name("Template:safesubst:x"), "x");
    }

    #[test]
    fn test_pass_through_matches_at_start() {
        let rules = rules();
        assert!(rules.is_pass_through("сущ ru f a 1a"));
        assert!(rules.is_pass_through("Inflection сущ ru"));
        assert!(!rules.is_pass_through("не сущ ru"));
    }

    #[test]
    fn test_conditional_no_expand() {
        let rules = rules();
        let bare = Template::new("inflection сущ ru");
        assert!(rules.keeps_unexpanded("inflection сущ ru", &bare));
        let blank = bare.clone().with_param(Param::keyed("form", vec![Node::text("  ")]));
        assert!(rules.keeps_unexpanded("inflection сущ ru", &blank));
        let given = bare.with_param(Param::keyed("form", vec![Node::text("Sg")]));
        assert!(!rules.keeps_unexpanded("inflection сущ ru", &given));
        assert!(rules.keeps_unexpanded("по-слогам", &Template::new("по-слогам")));
    }

    #[test]
    fn test_rewrites() {
        let rules = rules();
        assert_eq!(rules.rewrite("PAGENAME"), Some(&RewriteAction::PageTitle));
        assert_eq!(rules.rewrite("anchorencode:x"), Some(&RewriteAction::Remove));
        assert_eq!(rules.rewrite("pagename"), None);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let config = EngineConfig::default().with_pass_through("(");
        let err = Rules::compile(&config).unwrap_err();
        assert!(matches!(
            err,
            GlossaError::Config(ConfigError::InvalidPattern { ref field, .. }) if field == "pass_through"
        ));
    }
}
