//! Fuzz test for the wikitext lexer
//!
//! Arbitrary text must tokenize without panicking, end in `Eof`, and every
//! span must lie inside the source on character boundaries.
//!
//! Run with: cargo +nightly fuzz run lexer_fuzz -- -max_total_time=60

#![no_main]

use glossa_wikitext::lexer::{Lexer, TokenKind};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let tokens = Lexer::new(input).tokenize();

        assert!(!tokens.is_empty(), "Tokenization should produce at least Eof");
        assert_eq!(tokens.last().map(|t| &t.kind), Some(&TokenKind::Eof));

        for token in &tokens {
            assert!(token.span.start <= token.span.end, "Span start should be <= end");
            assert!(token.span.end <= input.len(), "Span should stay inside the source");
            assert!(input.is_char_boundary(token.span.start));
            assert!(input.is_char_boundary(token.span.end));
            assert!(token.span.line >= 1, "Line numbers should be >= 1");
        }
    }
});
