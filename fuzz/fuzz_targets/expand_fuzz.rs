//! Fuzz test for page expansion
//!
//! Pages built from arbitrary text under a Russian section header must
//! expand to tokens or to an error, never panic or recurse without bound.
//!
//! Run with: cargo +nightly fuzz run expand_fuzz -- -max_total_time=60

#![no_main]

use std::collections::BTreeMap;
use std::sync::Arc;

use glossa_core::Force;
use glossa_wikitext::{Engine, EngineConfig, Rules};
use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;

static ENGINE: Lazy<Option<Engine<BTreeMap<String, String>>>> = Lazy::new(|| {
    let config = EngineConfig::from_toml_str(include_str!("../../glossa-wikitext/rules/ru.toml")).ok()?;
    let rules = Rules::compile(&config).ok()?;
    let templates: BTreeMap<String, String> = [
        ("кавычки", "«{{{1}}}»"),
        ("слог", "{{#if:{{{2|}}}|{{{1}}}-{{{2}}}|{{{1}}}}}"),
        ("сущ ru f a 1a", "{{inflection сущ ru|основа={{{основа}}}|nom-sg={{{основа}}}а}}"),
        ("loop", "{{loop}}"),
        ("a", "{{b|{{{1|}}}}}"),
        ("b", "{{a|{{{1|}}}x}}"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    Some(Engine::new(Arc::new(rules), templates))
});

fuzz_target!(|data: &[u8]| {
    let Some(engine) = ENGINE.as_ref() else {
        return;
    };
    if let Ok(input) = std::str::from_utf8(data) {
        let page = format!("= {{{{-ru-}}}} =\n{}", input);
        let _ = engine.parse_page("fuzz", &page, Force::UseCache);
    }
});
