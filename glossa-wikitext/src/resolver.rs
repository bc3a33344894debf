//! Template body lookup

use std::collections::BTreeMap;
use std::sync::Arc;

use glossa_core::{Force, GlossaResult};
use glossa_storage::ContentCache;

/// Resolves a normalized template name to its body text.
pub trait TemplateResolver: Send + Sync {
    fn resolve(&self, name: &str, force: Force) -> GlossaResult<Option<String>>;

    /// Every template name known locally, without namespace.
    fn names(&self) -> GlossaResult<Vec<String>>;
}

/// Fixed template library, keyed by name without namespace.
impl TemplateResolver for BTreeMap<String, String> {
    fn resolve(&self, name: &str, _force: Force) -> GlossaResult<Option<String>> {
        Ok(self.get(name).cloned())
    }

    fn names(&self) -> GlossaResult<Vec<String>> {
        Ok(self.keys().cloned().collect())
    }
}

impl<R: TemplateResolver + ?Sized> TemplateResolver for Arc<R> {
    fn resolve(&self, name: &str, force: Force) -> GlossaResult<Option<String>> {
        (**self).resolve(name, force)
    }

    fn names(&self) -> GlossaResult<Vec<String>> {
        (**self).names()
    }
}

/// Reads template bodies from a content cache of template pages.
#[derive(Debug, Clone)]
pub struct CacheTemplateResolver {
    cache: Arc<ContentCache>,
    /// Namespace prefix of the cached titles, e.g. `Шаблон:`.
    prefix: String,
}

impl CacheTemplateResolver {
    pub fn new(cache: Arc<ContentCache>, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
        }
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }
}

impl TemplateResolver for CacheTemplateResolver {
    fn resolve(&self, name: &str, force: Force) -> GlossaResult<Option<String>> {
        let title = format!("{}{}", self.prefix, name);
        let records = self.cache.get_multiple(&[title], force)?;
        Ok(records.into_iter().next().and_then(|record| record.content))
    }

    /// Titles in the template cache, redirect aliases included.
    fn names(&self) -> GlossaResult<Vec<String>> {
        let titles = self.cache.stamps(None)?;
        Ok(titles
            .into_keys()
            .filter_map(|title| title.strip_prefix(self.prefix.as_str()).map(str::to_string))
            .collect())
    }
}
