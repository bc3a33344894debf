//! glossa pipeline - pages, templates and parsed tokens in one place
//!
//! ```text
//! wiki (ns 10) → templates ─┐ template bodies
//!                           ↓
//! wiki (ns 0)  → pages ──→ parsed (PageParser over DerivedSource)
//! ```
//!
//! Refreshing runs leaves first so the parsed cache always derives from
//! template bodies and pages at least as new as its own watermark.

pub mod layout;
pub mod parsed;

pub use layout::{StoreLayout, DEFAULT_MAP_SIZE_MB};
pub use parsed::ParsedPage;

use std::collections::BTreeSet;
use std::sync::Arc;

use glossa_core::{Force, GlossaConfig, GlossaResult, Record};
use glossa_remote::{ContentFilter, MediaWikiSource};
use glossa_storage::{
    CacheStats, ContentCache, DerivedSource, RefreshMode, SourceCapability, SourceDescriptor,
    StructuralErrorPolicy,
};
use glossa_wikitext::{CacheTemplateResolver, Engine, EngineConfig, PageParser, Rules};

pub const PAGES: &str = "pages";
pub const TEMPLATES: &str = "templates";
pub const PARSED: &str = "parsed";

/// Derived source behind the parsed cache.
pub type ParsedSource = DerivedSource<PageParser<CacheTemplateResolver>>;

/// Titles touched by one [`Pipeline::refresh_all`], per cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub templates: BTreeSet<String>,
    pub pages: BTreeSet<String>,
    pub parsed: BTreeSet<String>,
}

impl RefreshReport {
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty() && self.pages.is_empty() && self.parsed.is_empty()
    }
}

/// Upstreams of the two leaf caches.
pub struct Sources {
    pub pages: Arc<dyn SourceCapability>,
    pub templates: Arc<dyn SourceCapability>,
}

impl Sources {
    /// Both namespaces of the wiki in `config.remote`.
    ///
    /// Template bodies are cleaned for transclusion and their redirects are
    /// kept as markers, so a template reached through an alias still
    /// resolves.
    pub fn remote(config: &GlossaConfig) -> GlossaResult<Self> {
        let pages = MediaWikiSource::from_config(PAGES, &config.remote, config.content_namespace)?;
        let templates =
            MediaWikiSource::from_config(TEMPLATES, &config.remote, config.template_namespace)?
                .with_descriptor(SourceDescriptor::new(TEMPLATES).with_retain_redirects(true))
                .with_filter(ContentFilter::TemplateBody);
        Ok(Self {
            pages: Arc::new(pages),
            templates: Arc::new(templates),
        })
    }
}

pub struct Pipeline {
    templates: Arc<ContentCache>,
    pages: Arc<ContentCache>,
    parsed: Arc<ContentCache>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("templates", &self.templates.name())
            .field("pages", &self.pages.name())
            .field("parsed", &self.parsed.name())
            .finish()
    }
}

impl Pipeline {
    /// Open the on-disk pipeline for the wiki described by `config`.
    pub fn open(config: GlossaConfig, engine: EngineConfig) -> GlossaResult<Self> {
        config.validate()?;
        let rules = Arc::new(Rules::compile(&engine)?);
        let sources = Sources::remote(&config)?;
        let layout = StoreLayout::lmdb(config.cache.cache_dir.clone());
        tracing::info!(
            api = %config.remote.api_url,
            cache_dir = %config.cache.cache_dir.display(),
            "opening pipeline"
        );
        Self::assemble(&config, rules, sources, &layout, StructuralErrorPolicy::Abort)
    }

    /// Build the three caches over arbitrary sources and stores.
    pub fn assemble(
        config: &GlossaConfig,
        rules: Arc<Rules>,
        sources: Sources,
        layout: &StoreLayout,
        policy: StructuralErrorPolicy,
    ) -> GlossaResult<Self> {
        let cache = |name: &str, source: Arc<dyn SourceCapability>| -> GlossaResult<Arc<ContentCache>> {
            Ok(Arc::new(ContentCache::new(
                name,
                layout.open(name)?,
                source,
                config.cache.clone(),
            )))
        };

        let templates = cache(TEMPLATES, sources.templates)?;
        let pages = cache(PAGES, sources.pages)?;

        let resolver = CacheTemplateResolver::new(templates.clone(), config.template_prefix.clone());
        let parser = PageParser::new(Engine::new(rules, resolver)).with_name(PARSED);
        let derived: ParsedSource = DerivedSource::new(pages.clone(), parser).with_policy(policy);
        let parsed = cache(PARSED, Arc::new(derived))?;

        Ok(Self {
            templates,
            pages,
            parsed,
        })
    }

    pub fn templates(&self) -> &Arc<ContentCache> {
        &self.templates
    }

    pub fn pages(&self) -> &Arc<ContentCache> {
        &self.pages
    }

    pub fn parsed(&self) -> &Arc<ContentCache> {
        &self.parsed
    }

    /// Incremental refresh of every cache, leaves first.
    pub fn refresh_all(&self) -> GlossaResult<RefreshReport> {
        self.refresh_all_with(RefreshMode::Incremental)
    }

    /// Refresh every cache with `mode`.
    ///
    /// A failure stops the run; caches refreshed before it keep their new
    /// watermark, the rest keep their old one.
    pub fn refresh_all_with(&self, mode: RefreshMode) -> GlossaResult<RefreshReport> {
        let templates = self.templates.refresh_with(mode)?;
        tracing::info!(cache = TEMPLATES, touched = templates.len(), "cache refreshed");
        let pages = self.pages.refresh_with(mode)?;
        tracing::info!(cache = PAGES, touched = pages.len(), "cache refreshed");
        let parsed = self.parsed.refresh_with(mode)?;
        tracing::info!(cache = PARSED, touched = parsed.len(), "cache refreshed");
        Ok(RefreshReport {
            templates,
            pages,
            parsed,
        })
    }

    /// Parsed records for `titles`, deriving whatever is missing.
    ///
    /// `ForceAll` also re-reads every template body the expansion touches;
    /// `ForceLocalOnly` re-derives the pages against cached templates.
    pub fn parse_titles(&self, titles: &[String], force: Force) -> GlossaResult<Vec<Record>> {
        tracing::debug!(count = titles.len(), ?force, "parsing titles");
        self.parsed.get_multiple(titles, force)
    }

    /// Decoded token stream of one page.
    pub fn page(&self, title: &str, force: Force) -> GlossaResult<Option<ParsedPage>> {
        let records = self.parse_titles(&[title.to_string()], force)?;
        records.first().map(ParsedPage::from_record).transpose()
    }

    pub fn stats(&self) -> Vec<(&str, CacheStats)> {
        [&self.templates, &self.pages, &self.parsed]
            .into_iter()
            .map(|cache| (cache.name(), cache.stats()))
            .collect()
    }
}
