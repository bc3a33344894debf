//! Cached record type

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// One cached item keyed by title.
///
/// A record is either live or a tombstone. Tombstones carry only the title
/// (plus whatever identity metadata the source still reported) and mean the
/// title no longer exists upstream. A redirect record owns no content of its
/// own; it points at its target by title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Record {
    /// A live record holding raw content.
    pub fn new(title: impl Into<String>, timestamp: Timestamp, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            timestamp: Some(timestamp),
            namespace: None,
            revision: None,
            editor: None,
            redirect: None,
            content: Some(content.into()),
            data: None,
        }
    }

    pub fn tombstone(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            timestamp: None,
            namespace: None,
            revision: None,
            editor: None,
            redirect: None,
            content: None,
            data: None,
        }
    }

    /// A redirect marker pointing at `target`.
    pub fn redirect_to(
        title: impl Into<String>,
        target: impl Into<String>,
        timestamp: Option<Timestamp>,
    ) -> Self {
        Self {
            redirect: Some(target.into()),
            timestamp,
            ..Self::tombstone(title)
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.timestamp.is_none()
            && self.redirect.is_none()
            && self.content.is_none()
            && self.data.is_none()
    }

    pub fn is_redirect(&self) -> bool {
        self.redirect.is_some()
    }

    pub fn with_namespace(mut self, namespace: i32) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn with_editor(mut self, editor: impl Into<String>) -> Self {
        self.editor = Some(editor.into());
        self
    }

    /// Derive a record that keeps this record's identity but replaces the
    /// payload. `content` carries warnings or error text, if any.
    pub fn derive(&self, data: Option<serde_json::Value>, content: Option<String>) -> Self {
        Self {
            title: self.title.clone(),
            timestamp: self.timestamp,
            namespace: self.namespace,
            revision: self.revision,
            editor: self.editor.clone(),
            redirect: None,
            content,
            data,
        }
    }

    /// Derive an error marker: error text in `content`, no `data`.
    pub fn derive_error(&self, error: impl ToString) -> Self {
        self.derive(None, Some(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_tombstone_has_no_payload() {
        let record = Record::tombstone("слово");
        assert!(record.is_tombstone());
        assert!(!record.is_redirect());
    }

    #[test]
    fn test_live_and_redirect_are_not_tombstones() {
        assert!(!Record::new("a", ts(), "text").is_tombstone());
        let redirect = Record::redirect_to("a", "b", None);
        assert!(redirect.is_redirect());
        assert!(!redirect.is_tombstone());
        assert!(redirect.content.is_none());
    }

    #[test]
    fn test_derive_error_keeps_identity() {
        let source = Record::new("кот", ts(), "{{сущ ru}}")
            .with_namespace(0)
            .with_revision(42)
            .with_editor("bot");
        let derived = source.derive_error("ambiguous");
        assert_eq!(derived.title, "кот");
        assert_eq!(derived.revision, Some(42));
        assert_eq!(derived.timestamp, Some(ts()));
        assert_eq!(derived.content.as_deref(), Some("ambiguous"));
        assert!(derived.data.is_none());
    }

    #[test]
    fn test_serialization_skips_absent_fields() {
        let json = serde_json::to_string(&Record::tombstone("x")).unwrap();
        assert_eq!(json, r#"{"title":"x"}"#);
        let back: Record = serde_json::from_str(&json).unwrap();
        assert!(back.is_tombstone());
    }
}
