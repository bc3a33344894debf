//! MediaWiki source against recorded API responses
//!
//! A scripted transport replays JSON fixtures in order and records every
//! request, so discovery, fetch and full-scan logic run without a network.

use chrono::{TimeZone, Utc};
use glossa_core::{Force, GlossaError, GlossaResult, Record, SourceError, Timestamp};
use glossa_remote::{ApiTransport, ContentFilter, MediaWikiSource};
use glossa_storage::{SourceCapability, SourceDescriptor, Stamps};
use glossa_test_utils::fixtures::memory_cache;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

// ============================================================================
// SCRIPTED TRANSPORT
// ============================================================================

#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<VecDeque<Value>>,
    requests: Mutex<Vec<Vec<(String, String)>>>,
}

impl ScriptedTransport {
    fn new(fixtures: &[&str]) -> Self {
        let responses = fixtures
            .iter()
            .map(|json| serde_json::from_str(json).expect("fixture is valid JSON"))
            .collect();
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::default(),
        }
    }

    fn requests(&self) -> Vec<Vec<(String, String)>> {
        self.requests.lock().unwrap().clone()
    }

    fn param(&self, request: usize, key: &str) -> Option<String> {
        self.requests()[request]
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }
}

impl ApiTransport for ScriptedTransport {
    fn endpoint(&self) -> &str {
        "scripted"
    }

    fn query(&self, params: &[(String, String)]) -> GlossaResult<Value> {
        self.requests.lock().unwrap().push(params.to_vec());
        self.responses.lock().unwrap().pop_front().ok_or_else(|| {
            SourceError::InvalidResponse {
                endpoint: "scripted".to_string(),
                reason: "no response left".to_string(),
            }
            .into()
        })
    }
}

const RECENT_1: &str = include_str!("fixtures/recentchanges_page1.json");
const RECENT_2: &str = include_str!("fixtures/recentchanges_page2.json");
const REVISIONS: &str = include_str!("fixtures/revisions.json");
const TEMPLATE_REVISIONS: &str = include_str!("fixtures/template_revisions.json");
const ALLPAGES: &str = include_str!("fixtures/allpages.json");
const SCAN_REVISIONS: &str = include_str!("fixtures/scan_revisions.json");
const ERROR: &str = include_str!("fixtures/error_badvalue.json");

fn ts(hour: u32, minute: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap()
}

fn source(fixtures: &[&str]) -> MediaWikiSource<ScriptedTransport> {
    MediaWikiSource::new("pages", ScriptedTransport::new(fixtures), 0)
}

// ============================================================================
// DISCOVERY
// ============================================================================

#[test]
fn test_discovery_follows_continue_and_keeps_latest_change() {
    let source = source(&[RECENT_1, RECENT_2]);
    let changes = source.discover_changes(ts(11, 0)).unwrap();

    assert_eq!(
        changes,
        vec![
            ("кот".to_string(), ts(12, 30)),
            ("пёс".to_string(), ts(12, 45)),
            ("собака".to_string(), ts(12, 45)),
            ("кошка".to_string(), ts(13, 0)),
        ]
    );

    let transport = source.transport();
    assert_eq!(transport.requests().len(), 2);
    assert_eq!(transport.param(0, "rcstart").as_deref(), Some("2024-03-01T11:00:00Z"));
    assert_eq!(transport.param(0, "rcnamespace").as_deref(), Some("0"));
    assert_eq!(transport.param(0, "rccontinue"), None);
    assert_eq!(transport.param(1, "rccontinue").as_deref(), Some("20240301124500|103"));
}

#[test]
fn test_api_error_aborts_discovery() {
    let err = source(&[ERROR]).discover_changes(ts(11, 0)).unwrap_err();
    match err {
        GlossaError::Source(SourceError::RequestFailed { message, .. }) => {
            assert!(message.starts_with("badvalue"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

// ============================================================================
// FETCH
// ============================================================================

#[test]
fn test_fetch_returns_records_tombstones_and_redirects() {
    let source = source(&[REVISIONS]);
    let titles = vec!["кошечка".to_string(), "нет такого".to_string()];
    let records = source.fetch(&titles, Force::UseCache).unwrap();

    assert_eq!(records.len(), 3);
    let cat = &records[0];
    assert_eq!(cat.title, "кошка");
    assert_eq!(cat.revision, Some(555));
    assert_eq!(cat.editor.as_deref(), Some("Бот"));
    assert_eq!(cat.timestamp, Some(ts(13, 0)));
    assert!(cat.content.as_deref().unwrap().contains("морфо-ru"));
    assert!(records[1].is_tombstone());
    assert_eq!(records[2].title, "кошечка");
    assert!(records[2].is_tombstone(), "redirects are dropped unless retained");

    let transport = source.transport();
    assert_eq!(transport.param(0, "titles").as_deref(), Some("кошечка|нет такого"));
    assert_eq!(transport.param(0, "redirects").as_deref(), Some("1"));
}

#[test]
fn test_fetch_batches_titles() {
    let source = source(&[REVISIONS, REVISIONS, REVISIONS]).with_titles_per_request(2);
    let titles: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
    source.fetch(&titles, Force::UseCache).unwrap();

    let transport = source.transport();
    assert_eq!(transport.requests().len(), 3);
    assert_eq!(transport.param(2, "titles").as_deref(), Some("e"));
}

#[test]
fn test_template_source_cleans_bodies_and_retains_redirects() {
    let source = MediaWikiSource::new("templates", ScriptedTransport::new(&[TEMPLATE_REVISIONS]), 10)
        .with_descriptor(
            SourceDescriptor::new("templates")
                .with_follow_redirects(false)
                .with_retain_redirects(true),
        )
        .with_filter(ContentFilter::TemplateBody);
    let records = source.fetch(&["Шаблон:кавычки".to_string()], Force::UseCache).unwrap();

    assert_eq!(records[0].content.as_deref(), Some("«{{{1}}}»"));
    assert_eq!(records[0].namespace, Some(10));
    assert_eq!(source.transport().param(0, "redirects"), None);
}

// ============================================================================
// FULL SCAN
// ============================================================================

#[test]
fn test_full_scan_skips_excluded_titles() {
    let source = source(&[ALLPAGES, SCAN_REVISIONS]);
    let mut exclude = Stamps::new();
    exclude.insert("кот".to_string(), Some(ts(9, 0)));

    let mut batches = Vec::new();
    let present = source
        .full_scan(&exclude, &mut |records: Vec<Record>| {
            batches.push(records);
            Ok(())
        })
        .unwrap();

    assert_eq!(present.len(), 3);
    assert!(present.contains("кот"));
    assert_eq!(batches.len(), 1);
    let titles: Vec<&str> = batches[0].iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["кошка", "мышь"]);
    assert_eq!(source.transport().param(1, "titles").as_deref(), Some("кошка|мышь"));
}

// ============================================================================
// CACHE WIRING
// ============================================================================

#[test]
fn test_leaf_cache_over_remote_source() {
    let source = Arc::new(source(&[REVISIONS]));
    let cache = memory_cache("pages", source.clone());

    let records = cache.get_multiple(&["кошечка".to_string()], Force::UseCache).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "кошка");

    // Served locally the second time.
    let again = cache.get_multiple(&["кошка".to_string()], Force::UseCache).unwrap();
    assert_eq!(again, records);
    assert_eq!(source.transport().requests().len(), 1);
}
