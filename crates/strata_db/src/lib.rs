//! Relational catalog for the Strata archive.
//!
//! The catalog mirrors metadata embedded in Bronze and Silver parquet files
//! so that serial numbers and test stands can be searched without opening
//! every file. It is derived data: the files on disk are authoritative and the
//! catalog can always be rebuilt from them.
//!
//! # Usage
//!
//! ```rust,ignore
//! use strata_db::CatalogDb;
//!
//! let db = CatalogDb::open("~/.strata/catalog.sqlite3").await?;
//! let hits = db.search_serials("SN12", 50, None).await?;
//! ```

mod catalog;
mod error;
mod schema;
mod search;
mod types;

pub use error::{DbError, Result};
pub use types::*;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

/// Handle to the catalog database.
///
/// This is the only type in the workspace that issues SQL.
#[derive(Clone)]
pub struct CatalogDb {
    pool: SqlitePool,
}

impl CatalogDb {
    /// Open or create a catalog at the given path.
    ///
    /// Creates and widens the catalog tables as needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;

        info!(path = %path.display(), "Catalog opened");

        Ok(db)
    }

    /// Open an existing catalog (fails if not exists).
    ///
    /// Used by the read-only query paths, which must not conjure an empty
    /// catalog when the configured path is wrong.
    pub async fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(DbError::not_found(format!(
                "Catalog not found: {}",
                path.display()
            )));
        }

        let url = format!("sqlite:{}?mode=rw", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        Ok(Self { pool })
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the catalog connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_catalog() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nested").join("catalog.sqlite3");

        let db = CatalogDb::open(&db_path).await.unwrap();
        assert!(db_path.exists());

        db.close().await;
    }

    #[tokio::test]
    async fn test_open_existing_fails_if_not_exists() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("missing.sqlite3");

        let result = CatalogDb::open_existing(&db_path).await;
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }
}
