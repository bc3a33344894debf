//! Wikitext node tree.
//!
//! The grammar is closed: every construct the lexer recognises maps to one
//! [`Node`] variant, and anything that fails to parse is kept as `Text`.

use crate::render::render;

// ============================================================================
// NODES
// ============================================================================

/// A run of wikitext nodes.
pub type Wikicode = Vec<Node>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Heading {
        level: u8,
        title: Wikicode,
    },
    Template(Template),
    /// `{{{name|default}}}`
    Argument {
        name: Wikicode,
        default: Option<Wikicode>,
    },
    Tag(Tag),
    /// `[[title|text]]`
    Link {
        title: Wikicode,
        text: Option<Wikicode>,
    },
    /// Character reference body, e.g. `nbsp` or `#160`.
    Entity(String),
    Comment(String),
    /// `[url title]`
    ExternalLink {
        url: String,
        title: Option<Wikicode>,
    },
}

impl Node {
    pub fn text(value: impl Into<String>) -> Self {
        Node::Text(value.into())
    }

    pub fn as_template(&self) -> Option<&Template> {
        match self {
            Node::Template(t) => Some(t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Lowercased tag name.
    pub name: String,
    pub attrs: String,
    pub contents: Wikicode,
    pub self_closing: bool,
    /// Contents were read verbatim (`nowiki` and friends).
    pub raw: bool,
}

// ============================================================================
// TEMPLATES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: Wikicode,
    pub params: Vec<Param>,
}

/// One template parameter. Positional parameters are numbered from 1 and
/// have `showkey == false`; their `name` is the position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Name as written (untrimmed) for keyed params, the position otherwise.
    pub name: String,
    pub value: Wikicode,
    pub showkey: bool,
}

impl Param {
    pub fn positional(index: usize, value: Wikicode) -> Self {
        Self {
            name: index.to_string(),
            value,
            showkey: false,
        }
    }

    pub fn keyed(name: impl Into<String>, value: Wikicode) -> Self {
        Self {
            name: name.into(),
            value,
            showkey: true,
        }
    }

    /// Name used for lookups.
    pub fn key(&self) -> &str {
        self.name.trim()
    }

    /// Rendered value, trimmed.
    pub fn value_text(&self) -> String {
        render(&self.value).trim().to_string()
    }
}

impl Template {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: vec![Node::Text(name.into())],
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Rendered name, trimmed.
    pub fn name_text(&self) -> String {
        render(&self.name).trim().to_string()
    }

    pub fn has(&self, key: &str) -> bool {
        self.params.iter().any(|p| p.key() == key)
    }

    /// The last parameter named `key`; later duplicates win.
    pub fn get(&self, key: &str) -> Option<&Param> {
        self.params.iter().rev().find(|p| p.key() == key)
    }

    /// Remove every parameter named `key`.
    pub fn remove(&mut self, key: &str) {
        self.params.retain(|p| p.key() != key);
    }
}

/// Templates directly in `nodes` (not nested inside other nodes).
pub fn top_level_templates(nodes: &[Node]) -> impl Iterator<Item = &Template> {
    nodes.iter().filter_map(Node::as_template)
}
