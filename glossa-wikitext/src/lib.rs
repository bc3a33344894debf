//! glossa wikitext - parser, macro-expansion engine and page tokenizer
//!
//! Architecture:
//! ```text
//! Raw page text
//!     ↓
//! Lexer (brace pairing, markup tokens)
//!     ↓
//! Parser (node tree, never fails)
//!     ↓
//! Engine (argument binding, directives, template expansion)
//!     ↓
//! Section walker (header path, root templates → tokens)
//!     ↓
//! PageParser (record with token stream + warnings)
//! ```

pub mod config;
pub mod engine;
pub mod lexer;
pub mod parser;
pub mod render;
pub mod resolver;
pub mod rules;
pub mod transform;

// Re-export key types for convenience
pub use config::{EngineConfig, NoExpandRule, RewriteAction, RewriteRule};
pub use engine::{Engine, Expanded, Expansion, Flow, Frame, PageOutcome, ParseContext, TemplateCache};
pub use parser::{parse, Node, Param, Tag, Template, Wikicode};
pub use render::render;
pub use resolver::{CacheTemplateResolver, TemplateResolver};
pub use rules::{fold, NoExpand, Rules};
pub use transform::PageParser;
