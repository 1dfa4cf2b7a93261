//! Batch and staging ingestion: Bronze conversion, Silver aggregation and
//! the catalog update that follows.

use crate::bronze::write_bronze_snapshots;
use crate::classify::TestTypeClassifier;
use crate::config::StrataConfig;
use crate::error::Result;
use crate::paths::list_subdirs;
use crate::silver::{build_silver, is_silver_current, silver_path};
use crate::sync::{sync_catalog, sync_paths, SyncReport};
use crate::task::run_blocking;
use serde::Serialize;
use std::path::{Path, PathBuf};
use strata_db::CatalogDb;
use tracing::{info, warn};

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub serials_converted: u64,
    /// Serials whose Silver index already recorded the same stand
    pub serials_skipped: u64,
    pub serials_failed: u64,
    pub bronze_written: u64,
    pub silver_written: Vec<PathBuf>,
    pub bronze_paths: Vec<PathBuf>,
    pub sync: SyncReport,
}

/// Convert one serial directory: Bronze snapshots, then its Silver index.
///
/// Returns the Silver path and the Bronze snapshots it references.
pub fn convert_serial(
    serial_dir: &Path,
    serial: &str,
    test_stand: &str,
    config: &StrataConfig,
    classifier: &TestTypeClassifier,
) -> Result<(PathBuf, Vec<PathBuf>)> {
    let bronze = write_bronze_snapshots(serial_dir, test_stand, &config.bronze_root, classifier)?;
    let silver = build_silver(&config.silver_root, serial, &bronze, test_stand)?;
    Ok((silver, bronze))
}

fn convert_stand_tree(
    stand: &str,
    stand_dir: &Path,
    gate: bool,
    config: &StrataConfig,
    classifier: &TestTypeClassifier,
    report: &mut IngestReport,
) -> Result<()> {
    for (serial, serial_dir) in list_subdirs(stand_dir)? {
        if gate && is_silver_current(&silver_path(&config.silver_root, stand, &serial), stand) {
            info!(serial = %serial, test_stand = stand, "Already loaded, skipping");
            report.serials_skipped += 1;
            continue;
        }

        match convert_serial(&serial_dir, &serial, stand, config, classifier) {
            Ok((silver, bronze)) => {
                report.serials_converted += 1;
                report.bronze_written += bronze.len() as u64;
                report.silver_written.push(silver);
                report.bronze_paths.extend(bronze);
            }
            Err(e) => {
                warn!(dir = %serial_dir.display(), error = %e, "Serial conversion failed");
                report.serials_failed += 1;
            }
        }
    }
    Ok(())
}

/// Convert every configured stand's serial directories, skipping serials
/// whose Silver index is already current. Does not touch the catalog.
pub fn convert_stands(
    config: &StrataConfig,
    classifier: &TestTypeClassifier,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    for stand in &config.stands {
        if !stand.path.is_dir() {
            warn!(
                test_stand = %stand.name,
                path = %stand.path.display(),
                "Stand source missing, skipping"
            );
            continue;
        }
        convert_stand_tree(&stand.name, &stand.path, true, config, classifier, &mut report)?;
        info!(test_stand = %stand.name, "Completed parquet files for stand");
    }
    Ok(report)
}

/// Batch ingester: convert all configured stands, then run a full sync.
pub async fn ingest_stands(
    db: &CatalogDb,
    config: &StrataConfig,
    classifier: &TestTypeClassifier,
) -> Result<IngestReport> {
    let (owned, rules) = (config.clone(), classifier.clone());
    let mut report = run_blocking(move || convert_stands(&owned, &rules)).await?;
    report.sync = sync_catalog(db, &config.silver_root, &config.bronze_root).await?;
    Ok(report)
}

/// Convert every `<staging_root>/<stand>/<serial>/` directory unconditionally.
pub fn convert_staging(
    config: &StrataConfig,
    classifier: &TestTypeClassifier,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    if !config.staging_root.is_dir() {
        warn!(path = %config.staging_root.display(), "Staging root missing, nothing to ingest");
        return Ok(report);
    }
    for (stand, stand_dir) in list_subdirs(&config.staging_root)? {
        convert_stand_tree(&stand, &stand_dir, false, config, classifier, &mut report)?;
    }
    Ok(report)
}

/// Staging ingester: convert the staging tree, then upsert exactly the
/// produced files.
pub async fn ingest_staging(
    db: &CatalogDb,
    config: &StrataConfig,
    classifier: &TestTypeClassifier,
) -> Result<IngestReport> {
    let (owned, rules) = (config.clone(), classifier.clone());
    let mut report = run_blocking(move || convert_staging(&owned, &rules)).await?;
    report.sync = sync_paths(db, &report.silver_written, &report.bronze_paths).await?;
    Ok(report)
}
