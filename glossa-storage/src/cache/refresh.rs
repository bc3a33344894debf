//! Refresh algorithm.
//!
//! - No watermark: full scan through the source, then delete every stored
//!   title the scan did not report.
//! - Leaf source: discover changes since `watermark - skew`, fetch them, and
//!   advance the watermark to the newest observed timestamp minus the
//!   trailing margin (never backwards).
//! - Composed source: skip when the upstream cache's watermark has not moved
//!   past ours; otherwise re-derive only titles whose upstream stamp is newer
//!   than ours, drop titles gone upstream, and inherit the upstream watermark.
//!
//! Records are always persisted before the watermark moves, so a failed
//! refresh leaves the old watermark in place and the next run re-applies
//! the same changes idempotently.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::Utc;
use glossa_core::{Force, GlossaResult, Record, SourceError, Timestamp};

use super::ContentCache;
use crate::progress::ProgressReporter;
use crate::source::is_current;
use crate::store::Stamps;
use crate::watermark::Watermark;

/// How far a refresh looks back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshMode {
    /// Continue from the stored watermark.
    #[default]
    Incremental,
    /// Move the watermark back by this much first. Skips the debounce.
    Rewind(Duration),
    /// Ignore the watermark and rescan everything. Skips the debounce.
    Full,
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero())
}

impl ContentCache {
    /// Incremental refresh. Returns the titles saved or deleted.
    pub fn refresh(&self) -> GlossaResult<BTreeSet<String>> {
        self.refresh_with(RefreshMode::Incremental)
    }

    pub fn refresh_with(&self, mode: RefreshMode) -> GlossaResult<BTreeSet<String>> {
        if !self.source.supports_refresh() {
            return Err(SourceError::RefreshUnsupported {
                cache: self.name.clone(),
            }
            .into());
        }

        let stored = self.store.watermark()?;
        let effective = match mode {
            RefreshMode::Incremental => stored,
            RefreshMode::Rewind(by) => stored.map(|wm| wm.rewound(by)),
            RefreshMode::Full => None,
        };
        let Some(watermark) = effective else {
            tracing::info!(cache = %self.name, ?mode, "no watermark, running full refresh");
            return self.full_refresh(mode == RefreshMode::Full, stored.as_ref());
        };

        if let Some(upstream) = self.source.upstream() {
            match upstream.watermark()? {
                Some(up) if !watermark.is_at_least(&up) => {}
                _ => {
                    tracing::info!(
                        cache = %self.name,
                        upstream = %upstream.name(),
                        "upstream unchanged, skipping refresh"
                    );
                    return Ok(BTreeSet::new());
                }
            }
        }

        if mode == RefreshMode::Incremental
            && watermark.is_recent(self.config.refresh_debounce(), Utc::now())
        {
            tracing::info!(cache = %self.name, "refreshed less than a debounce window ago, skipping");
            return Ok(BTreeSet::new());
        }

        match self.source.upstream() {
            Some(upstream) => self.composed_refresh(upstream, &watermark),
            None => self.leaf_refresh(&watermark, stored.as_ref()),
        }
    }

    fn full_refresh(&self, rescan: bool, prior: Option<&Watermark>) -> GlossaResult<BTreeSet<String>> {
        let existing = self.store.stamps(None)?;
        let exclude = if rescan { Stamps::new() } else { existing.clone() };
        let mut progress = ProgressReporter::new(self.name.clone());
        let mut touched = BTreeSet::new();
        let mut newest: Option<Timestamp> = existing.values().flatten().max().copied();

        let present = self.source.full_scan(&exclude, &mut |batch: Vec<Record>| {
            for record in &batch {
                progress.tick(&record.title);
            }
            let outcome = self.save_records(batch)?;
            progress.add_saved(outcome.saved.len());
            for record in &outcome.saved {
                newest = newest.max(record.timestamp);
                touched.insert(record.title.clone());
            }
            touched.extend(outcome.deleted);
            Ok(())
        })?;

        let gone: Vec<String> = existing
            .keys()
            .filter(|title| !present.contains(*title))
            .cloned()
            .collect();
        if !gone.is_empty() {
            tracing::info!(cache = %self.name, count = gone.len(), "removing titles absent upstream");
        }
        touched.extend(self.delete_titles(&gone)?);

        let watermark = match self.source.upstream() {
            Some(upstream) => upstream
                .watermark()?
                .map(|up| Watermark::new(up.timestamp)),
            None => {
                let base = newest.unwrap_or_else(Utc::now);
                let candidate = base - to_chrono(self.config.trailing_margin());
                Some(Watermark::advanced_to(prior, candidate))
            }
        };
        if let Some(watermark) = watermark {
            self.store.set_watermark(&watermark)?;
        }
        progress.finish();
        Ok(touched)
    }

    fn leaf_refresh(
        &self,
        watermark: &Watermark,
        prior: Option<&Watermark>,
    ) -> GlossaResult<BTreeSet<String>> {
        let since = watermark.timestamp - to_chrono(self.config.discovery_skew());
        let changes = self.source.discover_changes(since)?;

        // Latest change time per title, in first-seen order.
        let mut order: Vec<String> = Vec::new();
        let mut latest: BTreeMap<String, Timestamp> = BTreeMap::new();
        for (title, ts) in changes {
            match latest.get_mut(&title) {
                Some(seen) => *seen = (*seen).max(ts),
                None => {
                    latest.insert(title.clone(), ts);
                    order.push(title);
                }
            }
        }
        tracing::info!(
            cache = %self.name,
            since = %since,
            changed = order.len(),
            "refreshing changed titles"
        );

        let mut newest: Option<Timestamp> = latest.values().max().copied();
        let mut progress = ProgressReporter::new(self.name.clone());
        let mut touched = BTreeSet::new();
        for chunk in order.chunks(self.config.lookup_batch_size.max(1)) {
            let outcome = self.fetch_and_save(chunk, Force::UseCache)?;
            for title in chunk {
                progress.tick(title);
            }
            progress.add_saved(outcome.saved.len());
            for record in &outcome.saved {
                newest = newest.max(record.timestamp);
                touched.insert(record.title.clone());
            }
            touched.extend(outcome.deleted);
        }

        let next = match newest {
            Some(ts) => {
                Watermark::advanced_to(prior, ts - to_chrono(self.config.trailing_margin()))
            }
            None => Watermark::new(prior.map_or(watermark.timestamp, |p| p.timestamp)),
        };
        self.store.set_watermark(&next)?;
        progress.finish();
        Ok(touched)
    }

    fn composed_refresh(
        &self,
        upstream: &ContentCache,
        watermark: &Watermark,
    ) -> GlossaResult<BTreeSet<String>> {
        let upstream_all = upstream.stamps(None)?;
        let existing = self.store.stamps(None)?;
        let delta: Vec<String> = upstream_all
            .iter()
            .filter(|(_, ts)| ts.is_some_and(|ts| ts > watermark.timestamp))
            .filter(|(title, ts)| !is_current(existing.get(*title), **ts))
            .map(|(title, _)| title.clone())
            .collect();
        tracing::info!(
            cache = %self.name,
            upstream = %upstream.name(),
            delta = delta.len(),
            "re-deriving changed titles"
        );

        let mut progress = ProgressReporter::new(self.name.clone());
        let mut touched = BTreeSet::new();
        for chunk in delta.chunks(self.config.lookup_batch_size.max(1)) {
            let outcome = self.fetch_and_save(chunk, Force::UseCache)?;
            for title in chunk {
                progress.tick(title);
            }
            progress.add_saved(outcome.saved.len());
            touched.extend(outcome.saved.into_iter().map(|r| r.title));
            touched.extend(outcome.deleted);
        }

        let gone: Vec<String> = existing
            .keys()
            .filter(|title| !upstream_all.contains_key(*title))
            .cloned()
            .collect();
        touched.extend(self.delete_titles(&gone)?);

        if let Some(up) = upstream.watermark()? {
            self.store.set_watermark(&Watermark::new(up.timestamp))?;
        }
        progress.finish();
        Ok(touched)
    }
}
