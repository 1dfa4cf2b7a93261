//! Catalog synchronizer.
//!
//! Reconciles footer metadata on disk into the catalog tables. Files on disk
//! are authoritative, so [`sync_catalog`] doubles as the rebuild path after
//! catalog loss. Rows are never removed here; see [`prune_missing`].

use crate::error::Result;
use crate::metadata::{read_silver_metadata, read_test_type, SilverMetadata};
use crate::paths::{list_parquet_files, path_key};
use crate::task::run_blocking;
use serde::Serialize;
use std::path::{Path, PathBuf};
use strata_db::{CatalogDb, UpsertCounts};
use tracing::{info, warn};

/// Upsert tallies for one synchronizer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub silver: UpsertCounts,
    pub bronze: UpsertCounts,
    /// Files whose footer could not be read; they were not upserted.
    pub unreadable: u64,
}

/// Rows removed by an explicit prune.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub silver_removed: u64,
    pub bronze_removed: u64,
}

/// Footer metadata gathered off the async executor.
#[derive(Debug, Default)]
struct Footers {
    silver: Vec<(String, SilverMetadata)>,
    bronze: Vec<(String, Option<String>)>,
    unreadable: u64,
}

fn read_footers(silver: &[PathBuf], bronze: &[PathBuf]) -> Footers {
    let mut footers = Footers::default();

    for path in silver {
        match read_silver_metadata(path) {
            Ok(meta) => footers.silver.push((path_key(path), meta)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable Silver metadata");
                footers.unreadable += 1;
            }
        }
    }

    for path in bronze {
        match read_test_type(path) {
            Ok(test_type) => footers.bronze.push((path_key(path), test_type)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable Bronze metadata");
                footers.unreadable += 1;
            }
        }
    }

    footers
}

/// Walk both tiers and upsert a catalog row for every file found.
pub async fn sync_catalog(
    db: &CatalogDb,
    silver_root: &Path,
    bronze_root: &Path,
) -> Result<SyncReport> {
    let (silver_root, bronze_root) = (silver_root.to_path_buf(), bronze_root.to_path_buf());
    let footers = run_blocking(move || {
        let silver = list_parquet_files(&silver_root)?;
        let bronze = list_parquet_files(&bronze_root)?;
        info!(
            silver_root = %silver_root.display(),
            bronze_root = %bronze_root.display(),
            silver = silver.len(),
            bronze = bronze.len(),
            "Synchronizing catalog"
        );
        Ok(read_footers(&silver, &bronze))
    })
    .await?;
    upsert_footers(db, footers).await
}

/// Upsert catalog rows for exactly the given files.
pub async fn sync_paths(
    db: &CatalogDb,
    silver: &[PathBuf],
    bronze: &[PathBuf],
) -> Result<SyncReport> {
    let (silver, bronze) = (silver.to_vec(), bronze.to_vec());
    let footers = run_blocking(move || Ok(read_footers(&silver, &bronze))).await?;
    upsert_footers(db, footers).await
}

async fn upsert_footers(db: &CatalogDb, footers: Footers) -> Result<SyncReport> {
    let mut report = SyncReport {
        unreadable: footers.unreadable,
        ..SyncReport::default()
    };

    for (key, meta) in &footers.silver {
        let outcome = db
            .upsert_silver_file(key, meta.serial_number.as_deref(), meta.test_stand.as_deref())
            .await?;
        report.silver.record(outcome);
    }

    for (key, test_type) in &footers.bronze {
        let outcome = db.upsert_bronze_file(key, test_type.as_deref()).await?;
        report.bronze.record(outcome);
    }

    info!(
        silver_new = report.silver.new,
        silver_updated = report.silver.updated,
        silver_skipped = report.silver.skipped,
        bronze_new = report.bronze.new,
        bronze_updated = report.bronze.updated,
        bronze_skipped = report.bronze.skipped,
        unreadable = report.unreadable,
        "Catalog sync complete"
    );
    Ok(report)
}

/// Remove catalog rows whose file no longer exists on disk.
pub async fn prune_missing(db: &CatalogDb) -> Result<PruneReport> {
    let silver: Vec<String> = db
        .list_silver_files()
        .await?
        .into_iter()
        .map(|r| r.file_path)
        .collect();
    let bronze: Vec<String> = db
        .list_bronze_files()
        .await?
        .into_iter()
        .map(|r| r.file_path)
        .collect();
    let (silver, bronze) = run_blocking(move || Ok((missing(silver), missing(bronze)))).await?;

    let mut report = PruneReport::default();
    for path in &silver {
        if db.delete_silver_file(path).await? {
            report.silver_removed += 1;
        }
    }
    for path in &bronze {
        if db.delete_bronze_file(path).await? {
            report.bronze_removed += 1;
        }
    }

    info!(
        silver_removed = report.silver_removed,
        bronze_removed = report.bronze_removed,
        "Catalog pruned"
    );
    Ok(report)
}

fn missing(paths: Vec<String>) -> Vec<String> {
    paths.into_iter().filter(|p| !Path::new(p).exists()).collect()
}
