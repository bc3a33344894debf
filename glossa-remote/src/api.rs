//! MediaWiki action API response types (`formatversion=2`)

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Envelope of every `action=query` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "Q: Deserialize<'de>"))]
pub struct ApiResponse<Q> {
    #[serde(default)]
    pub query: Option<Q>,
    /// Parameters to merge into the next request, if more results exist.
    #[serde(default, rename = "continue")]
    pub cont: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    #[serde(default)]
    pub info: String,
}

impl ApiErrorBody {
    /// Server-side throttling; safe to retry.
    pub fn is_transient(&self) -> bool {
        matches!(self.code.as_str(), "maxlag" | "ratelimited" | "readonly")
    }
}

// ============================================================================
// list=recentchanges
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecentChangesQuery {
    #[serde(default)]
    pub recentchanges: Vec<RecentChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecentChange {
    /// Missing for suppressed log entries.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ns: i32,
    pub timestamp: DateTime<Utc>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub logparams: Option<LogParams>,
}

/// Log details; page moves name the new title here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogParams {
    #[serde(default)]
    pub target_title: Option<String>,
    #[serde(default)]
    pub target_ns: Option<i32>,
}

// ============================================================================
// prop=revisions|info
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PagesQuery {
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub normalized: Vec<TitleMapping>,
    #[serde(default)]
    pub redirects: Vec<TitleMapping>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub title: String,
    #[serde(default)]
    pub ns: i32,
    #[serde(default)]
    pub missing: bool,
    #[serde(default)]
    pub invalid: bool,
    #[serde(default)]
    pub revisions: Vec<Revision>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Revision {
    pub revid: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<String>,
    pub slots: Slots,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Slots {
    pub main: Slot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Slot {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TitleMapping {
    pub from: String,
    pub to: String,
}

// ============================================================================
// list=allpages
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AllPagesQuery {
    #[serde(default)]
    pub allpages: Vec<PageRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageRef {
    pub title: String,
    #[serde(default)]
    pub ns: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continue_and_error_envelope() {
        let json = r#"{"continue":{"rccontinue":"20240301120000|42","continue":"-||"},"query":{"recentchanges":[]}}"#;
        let resp: ApiResponse<RecentChangesQuery> = serde_json::from_str(json).unwrap();
        let cont = resp.cont.unwrap();
        assert_eq!(cont["rccontinue"], "20240301120000|42");
        assert!(resp.error.is_none());

        let json = r#"{"error":{"code":"maxlag","info":"Waiting for a database server"}}"#;
        let resp: ApiResponse<PagesQuery> = serde_json::from_str(json).unwrap();
        assert!(resp.query.is_none());
        assert!(resp.error.unwrap().is_transient());
    }

    #[test]
    fn test_page_with_revision() {
        let json = r#"{"title":"кошка","ns":0,"revisions":[{"revid":7,"timestamp":"2024-03-01T12:00:00Z","user":"Bot","slots":{"main":{"content":"text"}}}]}"#;
        let page: Page = serde_json::from_str(json).unwrap();
        assert!(!page.missing);
        assert_eq!(page.revisions[0].revid, 7);
        assert_eq!(page.revisions[0].slots.main.content.as_deref(), Some("text"));
    }
}
