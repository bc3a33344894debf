//! Page parsing against the reference rule set
//!
//! Walks realistic pages through the engine and through the derived-cache
//! boundary, checking the token stream, header paths, warnings and the
//! recoverable-error contract.

use glossa_core::token::tokens_from_value;
use glossa_core::{Force, HeaderSegment, Params, Record, TokenParams};
use glossa_storage::{DerivedSource, PageTransform};
use glossa_test_utils::assertions::{assert_param, assert_recoverable, assert_token_names, parsed};
use glossa_test_utils::fixtures::{self, reference_rules, template_library};
use glossa_test_utils::CountingResolver;
use glossa_wikitext::{CacheTemplateResolver, Engine, PageOutcome, PageParser};
use std::sync::Arc;

fn engine() -> Engine<Arc<CountingResolver>> {
    Engine::new(reference_rules(), Arc::new(CountingResolver::new(template_library())))
}

fn morphology_header() -> Vec<HeaderSegment> {
    vec![
        HeaderSegment::Placeholder,
        HeaderSegment::Text("Морфологические и синтаксические свойства".to_string()),
    ]
}

// ============================================================================
// ENGINE
// ============================================================================

#[test]
fn test_reference_page_token_stream() {
    let engine = engine();
    let text = fixtures::cat_page();
    assert!(engine.is_valid_page(text));

    let (tokens, warnings) = parsed(engine.parse_page("кошка", text, Force::UseCache).unwrap());
    assert_token_names(
        &tokens,
        &["по-слогам", "_сущ ru f a 1a", "inflection сущ ru", "морфо-ru"],
    );
    for token in &tokens {
        assert_eq!(token.header, morphology_header(), "header of {}", token.name);
    }

    assert_param(&tokens[0], "1", "кош");
    assert_param(&tokens[0], "2", "ка");
    assert_param(&tokens[1], "основа", "кошк");
    assert_param(&tokens[2], "nom-sg", "кошка");
    assert_param(&tokens[2], "gen-sg", "кошки");
    assert!(!tokens[2].params.as_named().unwrap().contains_key("слоги"));
    assert_param(&tokens[3], "2", "а");

    assert_eq!(warnings.len(), 1, "{warnings:?}");
    assert!(warnings[0].contains("skips a level"));
}

#[test]
fn test_template_bodies_are_memoized_per_page() {
    let resolver = Arc::new(CountingResolver::new(template_library()));
    let engine = Engine::new(reference_rules(), resolver.clone());
    let text = "= {{-ru-}} =\n{{сущ ru f a 1a|основа=кошк}}\n{{сущ ru f a 1a|основа=мышк}}\n{{сущ ru n a 1a}}\n{{сущ ru n a 1a}}";

    let (tokens, warnings) = parsed(engine.parse_page("кошка", text, Force::UseCache).unwrap());
    assert_eq!(resolver.calls(), 2);
    assert_eq!(tokens.len(), 4);
    // Unknown pass-through bodies warn on every invocation; only the lookup is memoized.
    assert_eq!(warnings.len(), 2, "{warnings:?}");

    engine.parse_page("мышка", text, Force::UseCache).unwrap();
    assert_eq!(resolver.calls(), 4, "memo does not outlive a page");
}

#[test]
fn test_force_levels_reach_the_resolver_nested() {
    for (force, seen) in [
        (Force::UseCache, Force::UseCache),
        (Force::ForceLocalOnly, Force::UseCache),
        (Force::ForceAll, Force::ForceAll),
    ] {
        let resolver = Arc::new(CountingResolver::new(template_library()));
        let engine = Engine::new(reference_rules(), resolver.clone());
        engine.parse_page("кошка", fixtures::cat_page(), force).unwrap();
        assert_eq!(resolver.forces(), vec![seen], "for {force:?}");
    }
}

#[test]
fn test_skip_and_foreign_pages() {
    let engine = engine();
    assert!(engine.is_valid_page(fixtures::deleted_page()));
    assert_eq!(
        engine.parse_page("кот", fixtures::deleted_page(), Force::UseCache).unwrap(),
        PageOutcome::Skipped
    );
    assert!(!engine.is_valid_page(fixtures::foreign_page()));
}

#[test]
fn test_meaning_headers_and_homonyms() {
    let engine = engine();
    let text = "= {{-ru-}} =\n== {{з|животное}} ==\n=== Морфология ===\n{{морфо-ru|кош|а}}\n== {{заголовок|мужчина|ка}} ==\n=== Морфология ===\n{{морфо-ru|кош|а}}";
    let (tokens, warnings) = parsed(engine.parse_page("кошка", text, Force::UseCache).unwrap());
    assert!(warnings.is_empty(), "{warnings:?}");
    assert_eq!(tokens.len(), 2);

    let mut animal = Params::new();
    animal.insert("1".to_string(), "животное".to_string());
    assert_eq!(
        tokens[0].header[0],
        HeaderSegment::Meaning {
            template: "з".to_string(),
            params: animal,
            text: None,
        }
    );
    assert_eq!(tokens[0].header[1], HeaderSegment::Text("Морфология".to_string()));
    match &tokens[1].header[0] {
        HeaderSegment::Meaning { template, params, .. } => {
            assert_eq!(template, "заголовок");
            assert_eq!(params.len(), 2);
        }
        other => panic!("expected meaning header, got {other:?}"),
    }
}

#[test]
fn test_separator_between_syllable_templates() {
    let engine = engine();
    let text = "= {{-ru-}} =\n{{морфо-ru|кош|а|слоги={{по-слогам|кош|ка}} и {{по-слогам|ко|шка}}}}";
    let (tokens, _) = parsed(engine.parse_page("кошка", text, Force::UseCache).unwrap());
    assert_token_names(&tokens, &["по-слогам", "по-слогам", "морфо-ru"]);
}

#[test]
fn test_well_known_text_is_synthetic() {
    let engine = engine();
    let text = "= {{-ru-}} =\n{{морфо-ru|кош|а|дореф=кошка}}";
    let (tokens, _) = parsed(engine.parse_page("кошка", text, Force::UseCache).unwrap());
    assert!(tokens[0].is_synthetic());
    assert_eq!(tokens[0].name, "_дореф");
    assert_eq!(tokens[0].params, TokenParams::Text("кошка".to_string()));
}

#[test]
fn test_ambiguous_parameter_is_recoverable() {
    let engine = engine();
    let text = "= {{-ru-}} =\n{{морфо-ru|кош|а|слоги={{по-слогам|кош|ка}} или кошка}}";
    assert_recoverable(&engine.parse_page("кошка", text, Force::UseCache));
}

// ============================================================================
// DERIVED CACHE BOUNDARY
// ============================================================================

fn page_parser() -> PageParser<CacheTemplateResolver> {
    let templates = fixtures::memory_cache("templates", fixtures::template_source());
    let resolver = CacheTemplateResolver::new(templates, "Шаблон:");
    PageParser::new(Engine::new(reference_rules(), resolver))
}

#[test]
fn test_page_parser_reads_templates_from_cache() {
    let record = fixtures::page("кошка", 5, fixtures::cat_page()).with_revision(42);
    let out = page_parser().transform(&record, Force::UseCache).unwrap().unwrap();
    assert_eq!(out.revision, Some(42));
    assert_eq!(out.namespace, Some(0));

    let tokens = tokens_from_value(out.data.as_ref().unwrap()).unwrap();
    assert_eq!(tokens.len(), 4);
    assert_eq!(tokens[2].name, "inflection сущ ru");
    assert!(out.content.unwrap().contains("skips a level"));
}

#[test]
fn test_ambiguity_becomes_error_record() {
    let pages = fixtures::memory_cache("pages", Arc::new(glossa_storage::MockSource::new("pages")));
    let derived = DerivedSource::new(pages, page_parser());
    let record = fixtures::page(
        "кошка",
        5,
        "= {{-ru-}} =\n{{морфо-ru|кош|а|слоги={{по-слогам|кош|ка}} или кошка}}",
    );

    let out = derived.apply(&record, Force::UseCache).unwrap().unwrap();
    assert_eq!(out.title, "кошка");
    assert_eq!(out.data, None);
    assert!(out.content.unwrap().contains("ambiguous"));
}

#[test]
fn test_structural_error_aborts_by_default() {
    let pages = fixtures::memory_cache("pages", Arc::new(glossa_storage::MockSource::new("pages")));
    let derived = DerivedSource::new(pages, page_parser());
    let record = Record::new(
        "кошка",
        fixtures::at(0),
        "= {{-ru-}} =\n{{кавычки|{{#expr:1+1}}}}",
    );
    let err = derived.apply(&record, Force::UseCache).unwrap_err();
    assert!(!err.is_recoverable());
}
