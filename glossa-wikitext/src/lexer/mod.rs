//! Lexer module for wikitext

pub mod scanner;
pub mod token;

pub use scanner::*;
pub use token::*;
