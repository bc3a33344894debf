//! Wikitext parser

pub mod ast;
#[allow(clippy::module_inception)]
pub mod parser;

pub use ast::*;
pub use parser::*;
