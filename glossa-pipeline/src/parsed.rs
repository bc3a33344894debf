//! Reading token streams back out of the parsed cache

use glossa_core::token::tokens_from_value;
use glossa_core::{GlossaResult, Record, StorageError, Token};

/// One record of the parsed cache, decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPage {
    /// The page expanded; `warnings` may be empty.
    Tokens { tokens: Vec<Token>, warnings: Vec<String> },
    /// The page failed validation and was cached with its error text.
    Failed { error: String },
}

impl ParsedPage {
    pub fn from_record(record: &Record) -> GlossaResult<Self> {
        match &record.data {
            Some(data) => {
                let tokens = tokens_from_value(data).map_err(|e| StorageError::Serialization {
                    reason: format!("{}: {}", record.title, e),
                })?;
                let warnings = record
                    .content
                    .as_deref()
                    .map(|text| text.lines().map(str::to_string).collect())
                    .unwrap_or_default();
                Ok(ParsedPage::Tokens { tokens, warnings })
            }
            None => Ok(ParsedPage::Failed {
                error: record.content.clone().unwrap_or_default(),
            }),
        }
    }

    pub fn tokens(&self) -> &[Token] {
        match self {
            ParsedPage::Tokens { tokens, .. } => tokens,
            ParsedPage::Failed { .. } => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ParsedPage::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use glossa_core::token::tokens_to_value;
    use glossa_core::{HeaderSegment, TokenParams};

    fn source() -> Record {
        Record::new("кошка", Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(), "raw")
    }

    #[test]
    fn test_tokens_and_warnings_decode() {
        let tokens = vec![Token::new(
            vec![HeaderSegment::Text("Морфология".to_string())],
            "_слоги",
            TokenParams::Text("кош-ка".to_string()),
        )];
        let record = source().derive(
            Some(tokens_to_value(&tokens).unwrap()),
            Some("first\nsecond".to_string()),
        );

        let page = ParsedPage::from_record(&record).unwrap();
        assert_eq!(page.tokens(), tokens.as_slice());
        match page {
            ParsedPage::Tokens { warnings, .. } => assert_eq!(warnings, vec!["first", "second"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_error_marker_decodes_as_failure() {
        let record = source().derive_error("ambiguous parameter");
        let page = ParsedPage::from_record(&record).unwrap();
        assert!(page.is_failed());
        assert!(page.tokens().is_empty());
    }
}
