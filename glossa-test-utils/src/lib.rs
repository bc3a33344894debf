//! glossa Test Utilities
//!
//! This crate provides test infrastructure for the glossa workspace:
//! - Proptest generators for records, titles and wikitext fragments
//! - Fixtures: the reference rule set, a template library and sample pages
//! - A counting template resolver
//! - Assertion helpers for the error taxonomy

// Re-export core types for convenience in tests
pub use glossa_core::{
    CacheConfig, Force, GlossaError, GlossaResult, HeaderSegment, Params, Record, StructuralError,
    Timestamp, Token, TokenParams, ValidationError,
};
pub use glossa_storage::{ContentCache, InMemoryRecordStore, MockSource, SourceCapability};
pub use glossa_wikitext::{Engine, EngineConfig, PageOutcome, Rules, TemplateResolver};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

/// Proptest strategies for generating test data.
pub mod generators {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    /// Timestamps within 2024, second precision.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (0i64..31_536_000).prop_map(|offset| {
            Utc.timestamp_opt(1_704_067_200 + offset, 0)
                .single()
                .unwrap_or_else(Utc::now)
        })
    }

    /// Page titles: short Cyrillic or Latin words, sometimes with a space.
    pub fn arb_title() -> impl Strategy<Value = String> {
        prop_oneof![
            "[а-я]{1,10}",
            "[a-z]{1,10}",
            "[а-я]{1,6} [а-я]{1,6}",
        ]
    }

    /// Text free of any wikitext markup.
    pub fn arb_plain_text() -> impl Strategy<Value = String> {
        "[a-zа-я0-9 ,.]{0,40}"
    }

    /// Fragments that exercise every lexer construct, including unbalanced
    /// and interleaved ones.
    pub fn arb_markup_piece() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec![
            "{{", "}}", "{{{", "}}}", "|", "=", "[[", "]]", "[", "]", "[http://a.org ", "<!--",
            "-->", "<ref>", "</ref>", "<br/>", "<nowiki>", "</nowiki>", "&amp;", "&nbsp;", "\n",
            "\n== ", " ==\n", "кот", "x", " ", "#if:", "=a=",
        ])
    }

    /// Wikitext assembled from markup pieces.
    pub fn arb_markup() -> impl Strategy<Value = String> {
        prop::collection::vec(arb_markup_piece(), 0..40).prop_map(|pieces| pieces.concat())
    }

    pub fn arb_record() -> impl Strategy<Value = Record> {
        (arb_title(), arb_timestamp(), arb_plain_text(), 0u64..10_000)
            .prop_map(|(title, ts, content, rev)| Record::new(title, ts, content).with_revision(rev))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

/// Pre-built test fixtures.
pub mod fixtures {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    /// Rules for the Russian section of the reference wiki.
    pub const REFERENCE_RULES: &str = include_str!("../../glossa-wikitext/rules/ru.toml");

    pub fn reference_config() -> EngineConfig {
        EngineConfig::from_toml_str(REFERENCE_RULES).expect("reference rules parse")
    }

    pub fn reference_rules() -> Arc<Rules> {
        Arc::new(Rules::compile(&reference_config()).expect("reference rules compile"))
    }

    /// A fixed instant; tests offset from it instead of reading the clock.
    pub fn epoch() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
            .single()
            .expect("valid date")
    }

    pub fn at(minutes: i64) -> Timestamp {
        epoch() + Duration::minutes(minutes)
    }

    /// Template bodies keyed by name without namespace.
    pub fn template_library() -> BTreeMap<String, String> {
        [
            (
                "сущ ru f a 1a",
                "{{inflection сущ ru\n|основа={{{основа}}}\n|nom-sg={{{основа}}}а\n|gen-sg={{{основа}}}и\n|слоги={{{слоги|}}}\n}}",
            ),
            (
                "сущ ru m a 1a",
                "{{inflection сущ ru\n|основа={{{основа}}}\n|nom-sg={{{основа}}}\n|gen-sg={{{основа}}}а\n|слоги={{{слоги|}}}\n}}",
            ),
            ("кавычки", "«{{{1}}}»"),
            ("слог", "{{#if:{{{2|}}}|{{{1}}}-{{{2}}}|{{{1}}}}}"),
            ("loop", "{{loop}}"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// A page using a pass-through declension template.
    pub fn cat_page() -> &'static str {
        "= {{-ru-}} =\n\n=== Морфологические и синтаксические свойства ===\n{{сущ ru f a 1a\n|основа=кошк\n|слоги={{по-слогам|кош|ка}}\n}}\n{{морфо-ru|кошк|а}}\n\n=== Семантические свойства ===\n==== Значение ====\n"
    }

    /// A page excluded by a skip-page template.
    pub fn deleted_page() -> &'static str {
        "= {{-ru-}} =\n{{к удалению|2024-03-01}}\n{{морфо-ru|кот}}\n"
    }

    /// A page without a Russian section.
    pub fn foreign_page() -> &'static str {
        "= {{-en-}} =\n{{en-noun}}\n"
    }

    pub fn page(title: &str, minutes: i64, text: &str) -> Record {
        Record::new(title, at(minutes), text).with_namespace(0)
    }

    pub fn template(name: &str, minutes: i64, body: &str) -> Record {
        Record::new(format!("Шаблон:{}", name), at(minutes), body).with_namespace(10)
    }

    /// A mock upstream seeded with the template library under its namespace.
    pub fn template_source() -> Arc<MockSource> {
        let source = Arc::new(MockSource::new("templates"));
        for (name, body) in template_library() {
            source.insert(template(&name, 0, &body));
        }
        source
    }

    /// An in-memory cache over `source`.
    pub fn memory_cache<S: SourceCapability + 'static>(name: &str, source: Arc<S>) -> Arc<ContentCache> {
        Arc::new(ContentCache::new(
            name,
            Box::new(InMemoryRecordStore::new()),
            source,
            CacheConfig::default(),
        ))
    }
}

// ============================================================================
// TEST RESOLVERS
// ============================================================================

/// Template resolver over a fixed map that records every lookup.
#[derive(Debug, Default)]
pub struct CountingResolver {
    templates: BTreeMap<String, String>,
    calls: AtomicUsize,
    forces: Mutex<Vec<Force>>,
}

impl CountingResolver {
    pub fn new(templates: BTreeMap<String, String>) -> Self {
        Self {
            templates,
            calls: AtomicUsize::new(0),
            forces: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Force levels seen, in call order.
    pub fn forces(&self) -> Vec<Force> {
        self.forces.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl TemplateResolver for CountingResolver {
    fn resolve(&self, name: &str, force: Force) -> GlossaResult<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut forces) = self.forces.lock() {
            forces.push(force);
        }
        Ok(self.templates.get(name).cloned())
    }

    fn names(&self) -> GlossaResult<Vec<String>> {
        Ok(self.templates.keys().cloned().collect())
    }
}

// ============================================================================
// ASSERTION HELPERS
// ============================================================================

/// Custom assertions for glossa types.
pub mod assertions {
    use super::*;
    use std::fmt::Debug;

    /// Assert that a result is an error caught at the derived-cache boundary.
    #[track_caller]
    pub fn assert_recoverable<T: Debug>(result: &GlossaResult<T>) {
        match result {
            Err(e) if e.is_recoverable() => {}
            Err(e) => panic!("Expected recoverable error, got {:?}", e),
            Ok(v) => panic!("Expected recoverable error, got Ok({:?})", v),
        }
    }

    /// Assert that a result is a grammar violation.
    #[track_caller]
    pub fn assert_structural<T: Debug>(result: &GlossaResult<T>) {
        match result {
            Err(GlossaError::Structural(_)) => {}
            Err(e) => panic!("Expected structural error, got {:?}", e),
            Ok(v) => panic!("Expected structural error, got Ok({:?})", v),
        }
    }

    /// Assert token names, in order.
    #[track_caller]
    pub fn assert_token_names(tokens: &[Token], expected: &[&str]) {
        let names: Vec<&str> = tokens.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, expected, "token names differ");
    }

    /// Assert a named parameter of a token.
    #[track_caller]
    pub fn assert_param(token: &Token, key: &str, expected: &str) {
        let params = token
            .params
            .as_named()
            .unwrap_or_else(|| panic!("token {} carries text, not parameters", token.name));
        assert_eq!(
            params.get(key).map(String::as_str),
            Some(expected),
            "parameter {} of {}",
            key,
            token.name
        );
    }

    /// Unwrap a parsed page outcome.
    #[track_caller]
    pub fn parsed(outcome: PageOutcome) -> (Vec<Token>, Vec<String>) {
        match outcome {
            PageOutcome::Parsed { tokens, warnings } => (tokens, warnings),
            PageOutcome::Skipped => panic!("Expected a parsed page, got Skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_rules_compile() {
        let rules = fixtures::reference_rules();
        assert!(rules.is_root("морфо-ru"));
        assert!(rules.is_pass_through("сущ ru f a 1a"));
    }

    #[test]
    fn test_counting_resolver_counts() {
        let resolver = CountingResolver::new(fixtures::template_library());
        assert!(resolver.resolve("кавычки", Force::UseCache).unwrap().is_some());
        assert!(resolver.resolve("нет", Force::ForceAll).unwrap().is_none());
        assert_eq!(resolver.calls(), 2);
        assert_eq!(resolver.forces(), vec![Force::UseCache, Force::ForceAll]);
    }
}
