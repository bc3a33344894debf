//! Fuzz test for the wikitext parser
//!
//! The parser never fails, so the property checked is stability: rendering
//! a parsed tree and parsing it again yields the same tree.
//!
//! Run with: cargo +nightly fuzz run parser_fuzz -- -max_total_time=60

#![no_main]

use glossa_wikitext::{parse, render};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let first = parse(input);
        let rendered = render(&first);
        let second = parse(&rendered);
        assert_eq!(first, second, "render/parse changed the tree for {:?}", input);
    }
});
