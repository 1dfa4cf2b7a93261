//! End-to-end ingestion: raw CSV trees → Bronze/Silver files → catalog.

use std::fs;
use std::path::{Path, PathBuf};
use strata::bronze::write_bronze_snapshots;
use strata::classify::{TestTypeClassifier, TestTypeRule};
use strata::config::{StandSource, StrataConfig};
use strata::ingest::{ingest_staging, ingest_stands};
use strata::metadata::{read_silver_metadata, read_test_type};
use strata::silver::{read_silver_paths, silver_path};
use strata::sync::{prune_missing, sync_catalog};
use strata_db::{CatalogDb, UpsertCounts};
use tempfile::TempDir;

struct Workspace {
    temp: TempDir,
    config: StrataConfig,
}

impl Workspace {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = temp.path();
        let config = StrataConfig {
            database_path: root.join("catalog.sqlite3"),
            bronze_root: root.join("bronze"),
            silver_root: root.join("silver"),
            staging_root: root.join("staging"),
            test_types: vec![TestTypeRule {
                pattern: "stability".into(),
                test_type: "Stability".into(),
            }],
            ..StrataConfig::default()
        };
        Self { temp, config }
    }

    fn write(&self, rel: &str, body: &str) -> PathBuf {
        let path = self.temp.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        path
    }

    fn add_stand(&mut self, name: &str) {
        self.config.stands.push(StandSource {
            name: name.to_string(),
            path: self.temp.path().join("sources").join(name),
        });
    }

    async fn catalog(&self) -> CatalogDb {
        CatalogDb::open(&self.config.database_path).await.unwrap()
    }

    fn classifier(&self) -> TestTypeClassifier {
        self.config.validate().unwrap()
    }
}

fn counts(new: u64, updated: u64, skipped: u64) -> UpsertCounts {
    UpsertCounts {
        new,
        updated,
        skipped,
    }
}

#[test]
fn bronze_conversion_skips_unparseable_file() {
    let ws = Workspace::new();
    ws.write("sources/StandA/SN123/run1.csv", "time,pressure\n0,1.5\n1,1.6\n");
    ws.write("sources/StandA/SN123/bad.csv", "");

    let written = write_bronze_snapshots(
        &ws.temp.path().join("sources/StandA/SN123"),
        "StandA",
        &ws.config.bronze_root,
        &ws.classifier(),
    )
    .unwrap();

    assert_eq!(written.len(), 1);
    assert!(written[0].ends_with("StandA/run1.parquet"));
    assert_eq!(read_test_type(&written[0]).unwrap().as_deref(), Some("None"));
    assert!(!ws.config.bronze_root.join("StandA/bad.parquet").exists());
}

#[test]
fn bronze_conversion_records_test_type() {
    let ws = Workspace::new();
    ws.write("in/SN1_Stability_run.csv", "a\n1\n");

    let written = write_bronze_snapshots(
        &ws.temp.path().join("in"),
        "StandA",
        &ws.config.bronze_root,
        &ws.classifier(),
    )
    .unwrap();

    assert_eq!(read_test_type(&written[0]).unwrap().as_deref(), Some("Stability"));
}

#[test]
fn bronze_conversion_of_missing_dir_is_an_error() {
    let ws = Workspace::new();
    let result = write_bronze_snapshots(
        &ws.temp.path().join("nope"),
        "StandA",
        &ws.config.bronze_root,
        &ws.classifier(),
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn batch_ingest_is_gated_and_sync_is_idempotent() {
    let mut ws = Workspace::new();
    ws.add_stand("StandA");
    ws.write("sources/StandA/SN123/run1.csv", "a,b\n1,2\n");
    ws.write("sources/StandA/SN123/run2_stability.csv", "a,b\n3,4\n");
    ws.write("sources/StandA/SN124/run3.csv", "a\nx\n");
    let db = ws.catalog().await;
    let classifier = ws.classifier();

    let first = ingest_stands(&db, &ws.config, &classifier).await.unwrap();
    assert_eq!(first.serials_converted, 2);
    assert_eq!(first.serials_skipped, 0);
    assert_eq!(first.bronze_written, 3);
    assert_eq!(first.sync.silver, counts(2, 0, 0));
    assert_eq!(first.sync.bronze, counts(3, 0, 0));

    let silver = silver_path(&ws.config.silver_root, "StandA", "SN123");
    let meta = read_silver_metadata(&silver).unwrap();
    assert_eq!(meta.serial_number.as_deref(), Some("SN123"));
    assert_eq!(meta.test_stand.as_deref(), Some("StandA"));
    assert_eq!(read_silver_paths(&silver).unwrap().len(), 2);

    let second = ingest_stands(&db, &ws.config, &classifier).await.unwrap();
    assert_eq!(second.serials_converted, 0);
    assert_eq!(second.serials_skipped, 2);
    assert_eq!(second.sync.silver, counts(0, 0, 2));
    assert_eq!(second.sync.bronze, counts(0, 0, 3));

    let again = sync_catalog(&db, &ws.config.silver_root, &ws.config.bronze_root)
        .await
        .unwrap();
    assert_eq!(again.silver, counts(0, 0, 2));
    assert_eq!(again.bronze, counts(0, 0, 3));
}

#[tokio::test]
async fn missing_stand_source_is_skipped() {
    let mut ws = Workspace::new();
    ws.add_stand("Ghost");
    let db = ws.catalog().await;

    let report = ingest_stands(&db, &ws.config, &ws.classifier()).await.unwrap();
    assert_eq!(report.serials_converted, 0);
    assert_eq!(report.sync.silver.total(), 0);
}

#[tokio::test]
async fn staging_ingest_catalogs_exactly_what_it_produced() {
    let ws = Workspace::new();
    ws.write("staging/StandB/SN9/a_stability.csv", "v\n1\n");
    ws.write("staging/StandB/SN9/b.csv", "v\n2\n");
    ws.write("staging/StandB/loose.csv", "v\n3\n");
    // Pre-existing Bronze file not produced by this run.
    ws.write("bronze/Other/old.parquet", "junk");
    let db = ws.catalog().await;

    let report = ingest_staging(&db, &ws.config, &ws.classifier()).await.unwrap();
    assert_eq!(report.serials_converted, 1);
    assert_eq!(report.sync.silver, counts(1, 0, 0));
    assert_eq!(report.sync.bronze, counts(2, 0, 0));

    let mut rows = db.list_bronze_files().await.unwrap();
    rows.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    let types: Vec<_> = rows.iter().map(|r| r.test_type.as_deref()).collect();
    assert_eq!(types, vec![Some("Stability"), Some("None")]);

    // Staging runs are not gated.
    let rerun = ingest_staging(&db, &ws.config, &ws.classifier()).await.unwrap();
    assert_eq!(rerun.serials_converted, 1);
    assert_eq!(rerun.sync.bronze, counts(0, 0, 2));
}

#[tokio::test]
async fn unreadable_files_are_counted_not_fatal() {
    let ws = Workspace::new();
    ws.write("silver/StandA/broken.parquet", "not parquet");
    let db = ws.catalog().await;

    let report = sync_catalog(&db, &ws.config.silver_root, &ws.config.bronze_root)
        .await
        .unwrap();
    assert_eq!(report.unreadable, 1);
    assert_eq!(report.silver.total(), 0);
}

#[tokio::test]
async fn prune_is_explicit() {
    let mut ws = Workspace::new();
    ws.add_stand("StandA");
    ws.write("sources/StandA/SN1/run1.csv", "a\n1\n");
    ws.write("sources/StandA/SN1/run2.csv", "a\n2\n");
    let db = ws.catalog().await;
    ingest_stands(&db, &ws.config, &ws.classifier()).await.unwrap();

    fs::remove_file(ws.config.bronze_root.join("StandA/run2.parquet")).unwrap();

    let report = sync_catalog(&db, &ws.config.silver_root, &ws.config.bronze_root)
        .await
        .unwrap();
    assert_eq!(report.bronze, counts(0, 0, 1));
    assert_eq!(db.list_bronze_files().await.unwrap().len(), 2);

    let pruned = prune_missing(&db).await.unwrap();
    assert_eq!(pruned.bronze_removed, 1);
    assert_eq!(pruned.silver_removed, 0);
    assert_eq!(db.list_bronze_files().await.unwrap().len(), 1);
}

#[tokio::test]
async fn catalog_keys_are_absolute_paths() {
    let mut ws = Workspace::new();
    ws.add_stand("StandA");
    ws.write("sources/StandA/SN1/run1.csv", "a\n1\n");
    let db = ws.catalog().await;
    ingest_stands(&db, &ws.config, &ws.classifier()).await.unwrap();

    for row in db.list_silver_files().await.unwrap() {
        assert!(Path::new(&row.file_path).is_absolute());
    }
    let bronze = db.list_bronze_files().await.unwrap();
    let silver = silver_path(&ws.config.silver_root, "StandA", "SN1");
    assert_eq!(read_silver_paths(&silver).unwrap(), vec![bronze[0].file_path.clone()]);
}
