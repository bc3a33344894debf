//! Page parser as a derived-cache transform

use glossa_core::token::tokens_to_value;
use glossa_core::{Force, GlossaResult, Record, StorageError};
use glossa_storage::PageTransform;

use crate::engine::{Engine, PageOutcome};
use crate::resolver::TemplateResolver;

/// Turns raw page records into token-stream records.
///
/// Output records carry the tokens as JSON in `data` and the joined
/// warnings, if any, in `content`. Pages that fail the pre-check or carry a
/// skip-page template produce no record.
pub struct PageParser<R> {
    engine: Engine<R>,
    name: String,
}

impl<R: TemplateResolver> PageParser<R> {
    pub fn new(engine: Engine<R>) -> Self {
        Self {
            engine,
            name: "parsed".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn engine(&self) -> &Engine<R> {
        &self.engine
    }
}

impl<R: TemplateResolver> PageTransform for PageParser<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, record: &Record, force: Force) -> GlossaResult<Option<Record>> {
        let Some(text) = record.content.as_deref() else {
            return Ok(None);
        };
        if !self.engine.is_valid_page(text) {
            return Ok(None);
        }

        match self.engine.parse_page(&record.title, text, force)? {
            PageOutcome::Skipped => Ok(None),
            PageOutcome::Parsed { tokens, warnings } => {
                let data = tokens_to_value(&tokens).map_err(|e| StorageError::Serialization {
                    reason: e.to_string(),
                })?;
                let content = if warnings.is_empty() {
                    None
                } else {
                    tracing::warn!(
                        page = %record.title,
                        count = warnings.len(),
                        "page parsed with warnings:\n  {}",
                        warnings.join("\n  ")
                    );
                    Some(warnings.join("\n"))
                };
                Ok(Some(record.derive(Some(data), content)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::rules::Rules;
    use chrono::Utc;
    use glossa_core::token::tokens_from_value;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn parser() -> PageParser<BTreeMap<String, String>> {
        let config = EngineConfig::default()
            .with_root_templates(["морфо-ru"])
            .with_must_contain("-ru-");
        PageParser::new(Engine::new(Arc::new(Rules::compile(&config).unwrap()), BTreeMap::new()))
    }

    #[test]
    fn test_tokens_land_in_data() {
        let record = Record::new("кошка", Utc::now(), "= {{-ru-}} =\n{{морфо-ru|кош|а}}").with_revision(7);
        let out = parser().transform(&record, Force::UseCache).unwrap().unwrap();
        assert_eq!(out.title, "кошка");
        assert_eq!(out.revision, Some(7));
        assert_eq!(out.content, None);
        let tokens = tokens_from_value(out.data.as_ref().unwrap()).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].name, "морфо-ru");
    }

    #[test]
    fn test_warnings_land_in_content_next_to_partial_data() {
        let record = Record::new("кошка", Utc::now(), "= {{-ru-}} =\n{{морфо-ru|a}}{{странный}}");
        let out = parser().transform(&record, Force::UseCache).unwrap().unwrap();
        assert!(out.content.unwrap().contains("Unknown template"));
        assert!(out.data.is_some());
    }

    #[test]
    fn test_invalid_pages_produce_nothing() {
        let parser = parser();
        let other = Record::new("cat", Utc::now(), "= {{-en-}} =\n{{морфо-ru|a}}");
        assert!(parser.transform(&other, Force::UseCache).unwrap().is_none());
        assert!(parser.transform(&Record::tombstone("x"), Force::UseCache).unwrap().is_none());
    }
}
