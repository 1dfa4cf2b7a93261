//! Strata: a two-tier parquet archive for test-stand data.
//!
//! Raw CSV output from test stands is mirrored into a staging tree, converted
//! into per-file Bronze snapshots, and indexed per serial number by Silver
//! files. A SQLite catalog mirrors the footer metadata of both tiers for
//! search; [`query::QueryService`] serves lookups over it.
//!
//! ```text
//! sources ──mirror──▶ staging ──bronze──▶ <bronze_root>/<stand>/<stem>.parquet
//!                                 └─silver─▶ <silver_root>/<stand>/<serial>.parquet
//!                                                   │
//!                                   sync ──▶ catalog (SilverFiles, BronzeFiles)
//! ```

pub mod bronze;
pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod label;
pub mod metadata;
pub mod mirror;
pub mod parquet_file;
pub mod paths;
pub mod query;
pub mod silver;
pub mod sync;
mod task;

pub use cache::{BronzePathCache, CacheStats, NeverStale, SilverMtimeCheck, StalenessCheck};
pub use classify::{TestTypeClassifier, TestTypeRule};
pub use config::StrataConfig;
pub use error::{Result, StrataError};
pub use export::{export_as_tabular_bundle, export_bundle, ExportBundle};
pub use label::SerialLabel;
pub use query::{pin_selected, QueryService, SelectionState};
pub use sync::{prune_missing, sync_catalog, PruneReport, SyncReport};
