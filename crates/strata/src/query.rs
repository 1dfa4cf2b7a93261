//! Query layer consumed by presentation code: serial and stand search,
//! cached per-serial Bronze lookup, and test-type filtering.
//!
//! Errors from the catalog surface as `StrataError::Store` so callers can
//! render them as a non-fatal message.

use crate::cache::{BronzePathCache, CachedPaths, SilverFingerprint};
use crate::error::Result;
use crate::label::SerialLabel;
use crate::silver::read_silver_paths;
use crate::task::run_blocking;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use strata_db::CatalogDb;
use tracing::{debug, warn};

pub const DEFAULT_SEARCH_LIMIT: usize = 50;
pub const DEFAULT_PATH_LIMIT: usize = 500;

pub struct QueryService {
    db: CatalogDb,
    cache: BronzePathCache,
}

impl QueryService {
    pub fn new(db: CatalogDb, cache_capacity: usize) -> Self {
        Self::with_cache(db, BronzePathCache::new(cache_capacity))
    }

    pub fn with_cache(db: CatalogDb, cache: BronzePathCache) -> Self {
        Self { db, cache }
    }

    pub fn cache(&self) -> &BronzePathCache {
        &self.cache
    }

    pub fn db(&self) -> &CatalogDb {
        &self.db
    }

    /// Serial labels whose serial number contains `prefix`, ordered by
    /// (serial_number, test_stand). A blank prefix returns nothing without
    /// touching the catalog.
    pub async fn search_serials(
        &self,
        prefix: &str,
        limit: usize,
        test_stands: Option<&[String]>,
    ) -> Result<Vec<SerialLabel>> {
        let q = prefix.trim();
        if q.is_empty() {
            return Ok(Vec::new());
        }
        let matches = self.db.search_serials(q, limit, test_stands).await?;
        Ok(matches.into_iter().map(SerialLabel::from).collect())
    }

    /// Distinct test stands containing `prefix`. Blank prefix short-circuits.
    pub async fn search_teststands(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let q = prefix.trim();
        if q.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.db.search_test_stands(q, limit).await?)
    }

    /// Sorted, de-duplicated Bronze paths for a serial label, capped at
    /// `limit`. Non-empty results are cached per label.
    pub async fn bronze_paths_for_serial(&self, label: &str, limit: usize) -> Result<Vec<String>> {
        let key = label.trim();
        if key.is_empty() {
            return Ok(Vec::new());
        }
        let label = SerialLabel::parse(key);

        let listing = if self.cache.wants_listing() {
            Some(self.silver_listing(&label).await?)
        } else {
            None
        };

        if let Some(hit) = self.cache.get_checked(key, listing.as_deref()) {
            return Ok(hit.paths.iter().take(limit).cloned().collect());
        }

        let silver_paths = match listing {
            Some(listing) => listing,
            None => self.silver_listing(&label).await?,
        };
        let entry = run_blocking(move || Ok(load_bronze_paths(&label, silver_paths))).await?;
        let out = entry.paths.iter().take(limit).cloned().collect();
        // Only non-empty results are cached.
        if !entry.paths.is_empty() {
            self.cache.insert(key.to_string(), entry);
        }
        Ok(out)
    }

    async fn silver_listing(&self, label: &SerialLabel) -> Result<Vec<String>> {
        Ok(self
            .db
            .silver_paths_for_serial(&label.serial_number, label.test_stand.as_deref())
            .await?)
    }

    /// Union of the Bronze paths of several selected labels, sorted and
    /// capped at `limit` after merging.
    pub async fn bronze_paths_for_selection(
        &self,
        labels: &[String],
        limit: usize,
    ) -> Result<Vec<String>> {
        let mut all = BTreeSet::new();
        for label in labels {
            all.extend(self.bronze_paths_for_serial(label, limit).await?);
        }
        Ok(all.into_iter().take(limit).collect())
    }

    /// Keep paths whose test type is requested or is the unfiltered `"None"`.
    ///
    /// No requested types means no filtering; no paths means no query.
    pub async fn filter_by_testtype(
        &self,
        bronze_paths: &[String],
        test_types: &[String],
    ) -> Result<Vec<String>> {
        if bronze_paths.is_empty() {
            return Ok(Vec::new());
        }
        if test_types.is_empty() {
            return Ok(bronze_paths.to_vec());
        }
        Ok(self.db.filter_bronze_by_test_type(bronze_paths, test_types).await?)
    }
}

fn load_bronze_paths(label: &SerialLabel, silver_paths: Vec<String>) -> CachedPaths {
    let mut bronze = BTreeSet::new();
    let mut sources = Vec::with_capacity(silver_paths.len());
    for silver in &silver_paths {
        let path = Path::new(silver);
        sources.push(SilverFingerprint::capture(path));
        match read_silver_paths(path) {
            Ok(paths) => bronze.extend(paths),
            Err(e) => warn!(path = %silver, error = %e, "Could not read bronze refs"),
        }
    }

    debug!(
        serial = %label.serial_number,
        silver = silver_paths.len(),
        bronze = bronze.len(),
        "Loaded Bronze paths"
    );
    CachedPaths {
        paths: Arc::new(bronze.into_iter().collect()),
        sources,
    }
}

/// Selected items first, in selection order, then the remaining matches in
/// their original order.
pub fn pin_selected(selected: &[String], matches: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(selected.len() + matches.len());
    for item in selected.iter().chain(matches) {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

/// Ordered, duplicate-free selection carried between requests as a
/// comma-separated string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    items: Vec<String>,
}

impl SelectionState {
    pub fn parse(csv: &str) -> Self {
        let mut state = Self::default();
        for item in csv.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if !state.contains(item) {
                state.items.push(item.to_string());
            }
        }
        state
    }

    pub fn to_csv(&self) -> String {
        self.items.join(",")
    }

    /// Remove `item` if selected, otherwise select it at the front.
    pub fn toggle(&mut self, item: &str) {
        let item = item.trim();
        if item.is_empty() {
            return;
        }
        if self.contains(item) {
            self.items.retain(|s| s != item);
        } else {
            self.items.insert(0, item.to_string());
        }
    }

    pub fn contains(&self, item: &str) -> bool {
        self.items.iter().any(|s| s == item)
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Pin this selection ahead of `matches`.
    pub fn pin(&self, matches: &[String]) -> Vec<String> {
        pin_selected(&self.items, matches)
    }
}
