//! MediaWiki leaf source
//!
//! Implements the cache's upstream contract on top of three API queries:
//! `list=recentchanges` for change discovery, `prop=revisions` for fetches
//! and `list=allpages` for full scans.

use std::collections::{BTreeMap, BTreeSet};

use chrono::SecondsFormat;
use glossa_core::{Force, GlossaResult, Record, RemoteConfig, SourceError, Timestamp};
use glossa_storage::{ScanSink, SourceCapability, SourceDescriptor, Stamps};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::{AllPagesQuery, ApiResponse, PagesQuery, RecentChangesQuery};
use crate::client::{ApiTransport, MediaWikiClient};
use crate::filter::ContentFilter;

const DEFAULT_TITLES_PER_REQUEST: usize = 50;

pub struct MediaWikiSource<T = MediaWikiClient> {
    descriptor: SourceDescriptor,
    transport: T,
    namespace: i32,
    titles_per_request: usize,
    filter: ContentFilter,
}

impl MediaWikiSource<MediaWikiClient> {
    /// A source over the live API described by `config`.
    pub fn from_config(name: impl Into<String>, config: &RemoteConfig, namespace: i32) -> GlossaResult<Self> {
        Ok(MediaWikiSource::new(name, MediaWikiClient::new(config)?, namespace)
            .with_titles_per_request(config.titles_per_request))
    }
}

impl<T: ApiTransport> MediaWikiSource<T> {
    pub fn new(name: impl Into<String>, transport: T, namespace: i32) -> Self {
        Self {
            descriptor: SourceDescriptor::new(name),
            transport,
            namespace,
            titles_per_request: DEFAULT_TITLES_PER_REQUEST,
            filter: ContentFilter::Raw,
        }
    }

    pub fn with_descriptor(mut self, descriptor: SourceDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn with_titles_per_request(mut self, count: usize) -> Self {
        self.titles_per_request = count.max(1);
        self
    }

    pub fn with_filter(mut self, filter: ContentFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn namespace(&self) -> i32 {
        self.namespace
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one query, following `continue` until the result is complete.
    fn query_all<Q: DeserializeOwned>(
        &self,
        params: Vec<(String, String)>,
        mut each: impl FnMut(Q) -> GlossaResult<()>,
    ) -> GlossaResult<()> {
        let mut cont: BTreeMap<String, Value> = BTreeMap::new();
        loop {
            let mut request = params.clone();
            request.extend(cont.iter().map(|(k, v)| (k.clone(), param_value(v))));
            let body = self.transport.query(&request)?;
            let response: ApiResponse<Q> =
                serde_json::from_value(body).map_err(|e| SourceError::InvalidResponse {
                    endpoint: self.transport.endpoint().to_string(),
                    reason: e.to_string(),
                })?;
            if let Some(error) = response.error {
                return Err(SourceError::RequestFailed {
                    endpoint: self.transport.endpoint().to_string(),
                    status: 200,
                    message: format!("{}: {}", error.code, error.info),
                }
                .into());
            }
            if let Some(query) = response.query {
                each(query)?;
            }
            match response.cont {
                Some(next) if next != cont => cont = next,
                Some(_) => {
                    return Err(SourceError::InvalidResponse {
                        endpoint: self.transport.endpoint().to_string(),
                        reason: "continuation did not advance".to_string(),
                    }
                    .into())
                }
                None => return Ok(()),
            }
        }
    }
}

impl<T: ApiTransport> SourceCapability for MediaWikiSource<T> {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn supports_refresh(&self) -> bool {
        true
    }

    fn discover_changes(&self, since: Timestamp) -> GlossaResult<Vec<(String, Timestamp)>> {
        tracing::debug!(source = %self.descriptor.name, %since, "querying recent changes");
        let params = params(&[
            ("list", "recentchanges"),
            ("rcdir", "newer"),
            ("rctype", "edit|new|log"),
            ("rcprop", "title|timestamp|loginfo"),
            ("rclimit", "max"),
            ("rcnamespace", &self.namespace.to_string()),
            ("rcstart", &since.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ]);

        let mut latest: BTreeMap<String, Timestamp> = BTreeMap::new();
        let mut note = |title: String, at: Timestamp| {
            let entry = latest.entry(title).or_insert(at);
            if at > *entry {
                *entry = at;
            }
        };
        self.query_all::<RecentChangesQuery>(params, |query| {
            for change in query.recentchanges {
                if change.ns != self.namespace {
                    continue;
                }
                // Moves also touch the new title.
                if let Some(log) = &change.logparams {
                    if let (Some(target), Some(ns)) = (&log.target_title, log.target_ns) {
                        if ns == self.namespace {
                            note(target.clone(), change.timestamp);
                        }
                    }
                }
                if let Some(title) = change.title {
                    note(title, change.timestamp);
                }
            }
            Ok(())
        })?;

        let mut changes: Vec<(String, Timestamp)> = latest.into_iter().collect();
        changes.sort_by_key(|(_, at)| *at);
        tracing::debug!(source = %self.descriptor.name, count = changes.len(), "recent changes found");
        Ok(changes)
    }

    fn fetch(&self, titles: &[String], _force: Force) -> GlossaResult<Vec<Record>> {
        let mut out = Vec::with_capacity(titles.len());
        for batch in titles.chunks(self.titles_per_request) {
            tracing::debug!(
                source = %self.descriptor.name,
                count = batch.len(),
                first = %batch[0],
                "fetching titles"
            );
            let mut request = params(&[
                ("prop", "revisions|info"),
                ("rvprop", "content|ids|timestamp|user"),
                ("rvslots", "main"),
            ]);
            request.push(("titles".to_string(), batch.join("|")));
            if self.descriptor.follows_redirects {
                request.push(("redirects".to_string(), "1".to_string()));
            }
            self.query_all::<PagesQuery>(request, |query| {
                out.extend(records_from_pages(
                    query,
                    self.namespace,
                    self.descriptor.retains_redirects,
                    self.filter,
                ));
                Ok(())
            })?;
        }
        Ok(out)
    }

    fn full_scan(&self, exclude: &Stamps, sink: &mut ScanSink<'_>) -> GlossaResult<BTreeSet<String>> {
        tracing::info!(source = %self.descriptor.name, namespace = self.namespace, "listing all pages");
        let request = params(&[
            ("list", "allpages"),
            ("apnamespace", &self.namespace.to_string()),
            ("aplimit", "max"),
        ]);

        let mut present = BTreeSet::new();
        let mut pending: Vec<String> = Vec::new();
        self.query_all::<AllPagesQuery>(request, |query| {
            for page in query.allpages {
                if page.ns != self.namespace || !present.insert(page.title.clone()) {
                    continue;
                }
                // No timestamps here, so anything already stored is current.
                if !exclude.contains_key(&page.title) {
                    pending.push(page.title);
                }
            }
            while pending.len() >= self.titles_per_request {
                let batch: Vec<String> = pending.drain(..self.titles_per_request).collect();
                sink(self.fetch(&batch, Force::UseCache)?)?;
            }
            Ok(())
        })?;
        if !pending.is_empty() {
            sink(self.fetch(&pending, Force::UseCache)?)?;
        }
        Ok(present)
    }
}

/// Records for one `prop=revisions` response.
///
/// Missing pages and pages outside `namespace` become tombstones; titles
/// that were normalized or redirected become redirect markers when
/// `retain_redirects` is set and tombstones otherwise.
pub fn records_from_pages(
    query: PagesQuery,
    namespace: i32,
    retain_redirects: bool,
    filter: ContentFilter,
) -> Vec<Record> {
    let mut out = Vec::with_capacity(query.pages.len());
    for page in query.pages {
        if page.missing || page.invalid || page.ns != namespace {
            out.push(Record::tombstone(page.title));
            continue;
        }
        let Some(revision) = page.revisions.into_iter().next() else {
            // Continued responses carry revisions for some pages only.
            tracing::debug!(title = %page.title, "page without revision in this chunk");
            continue;
        };
        let Some(content) = revision.slots.main.content else {
            tracing::warn!(title = %page.title, revision = revision.revid, "revision has no content");
            continue;
        };
        let mut record = Record::new(page.title, revision.timestamp, filter.apply(content))
            .with_namespace(page.ns)
            .with_revision(revision.revid);
        if let Some(user) = revision.user {
            record = record.with_editor(user);
        }
        out.push(record);
    }

    for mapping in query.normalized.into_iter().chain(query.redirects) {
        out.push(if retain_redirects {
            Record::redirect_to(mapping.from, mapping.to, None)
        } else {
            Record::tombstone(mapping.from)
        });
    }
    out
}

fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
