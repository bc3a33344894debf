//! Property-Based Tests for Parsing and Expansion
//!
//! Property: parsing SHALL never fail and re-parsing rendered output SHALL
//! give the same tree; text without markup SHALL expand to itself; a
//! conditional SHALL splice exactly one branch; a self-referencing template
//! SHALL stop at the depth bound with a recoverable error.

use glossa_core::{Force, Params};
use glossa_test_utils::assertions::assert_recoverable;
use glossa_test_utils::fixtures::{reference_rules, template_library};
use glossa_test_utils::generators::{arb_markup, arb_plain_text, arb_title};
use glossa_test_utils::CountingResolver;
use glossa_wikitext::{parse, render, Engine};
use proptest::prelude::*;
use std::sync::Arc;

fn engine() -> Engine<Arc<CountingResolver>> {
    Engine::new(reference_rules(), Arc::new(CountingResolver::new(template_library())))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_rendered_tree_reparses_to_itself(text in arb_markup()) {
        let tree = parse(&text);
        prop_assert_eq!(parse(&render(&tree)), tree);
    }

    #[test]
    fn prop_plain_text_expands_to_itself(title in arb_title(), text in arb_plain_text()) {
        let expanded = engine().expand_text(&title, &text, Params::new(), Force::UseCache).unwrap();
        prop_assert_eq!(expanded.text, text);
        prop_assert!(expanded.tokens.is_empty());
        prop_assert!(expanded.warnings.is_empty());
    }

    #[test]
    fn prop_if_selects_one_branch(
        cond in "[a-zа-я ]{0,6}",
        then in "[a-zа-я]{0,8}",
        otherwise in "[a-zа-я]{0,8}",
    ) {
        let text = format!("{{{{#if:{}|{}|{}}}}}", cond, then, otherwise);
        let expanded = engine().expand_text("x", &text, Params::new(), Force::UseCache).unwrap();
        let expected = if cond.trim().is_empty() { &otherwise } else { &then };
        prop_assert_eq!(&expanded.text, expected);
    }

    #[test]
    fn prop_arguments_bind_from_caller(value in "[a-zа-я]{1,10}", fallback in "[a-z]{0,5}") {
        let mut args = Params::new();
        args.insert("основа".to_string(), value.clone());
        let text = format!("{{{{{{основа|{}}}}}}}-{{{{{{нет|{}}}}}}}", fallback, fallback);
        let expanded = engine().expand_text("x", &text, args, Force::UseCache).unwrap();
        prop_assert_eq!(expanded.text, format!("{}-{}", value, fallback));
    }
}

#[test]
fn test_self_reference_stops_at_depth_bound() {
    let resolver = Arc::new(CountingResolver::new(template_library()));
    let engine = Engine::new(reference_rules(), resolver.clone());
    let result = engine.expand_text("x", "{{loop}}", Params::new(), Force::UseCache);
    assert_recoverable(&result);
    assert_eq!(resolver.calls(), 1);
}

#[test]
fn test_pass_through_text_template() {
    let expanded = engine()
        .expand_text("кошка", "{{кавычки|{{PAGENAME}}}}{{-}}{{слог|кош|ка}}", Params::new(), Force::UseCache)
        .unwrap();
    assert_eq!(expanded.text, "«кошка»\u{00A0}— кош-ка");
    let names: Vec<&str> = expanded.tokens.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["_кавычки", "_слог"]);
}

#[test]
fn test_pathological_nesting_does_not_blow_up() {
    let text = format!("{}{}", "[[{{".repeat(200), "x");
    let tree = parse(&text);
    assert_eq!(render(&tree), text);
}
