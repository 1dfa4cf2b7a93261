//! Catalog schema creation and widening.
//!
//! Both steps are idempotent: tables are created only when absent, and
//! columns are added only when `pragma_table_info` does not list them.

use crate::error::Result;
use crate::CatalogDb;
use sqlx::Row;
use tracing::{info, warn};

/// Columns every catalog table must carry, beyond its primary key.
const SILVER_COLUMNS: &[(&str, &str)] = &[("serial_number", "TEXT"), ("test_stand", "TEXT")];
const BRONZE_COLUMNS: &[(&str, &str)] = &[("test_type", "TEXT")];

impl CatalogDb {
    /// Ensure both catalog tables and their indexes exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS SilverFiles (
                file_path TEXT NOT NULL PRIMARY KEY,
                serial_number TEXT NULL,
                test_stand TEXT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;
        self.ensure_columns("SilverFiles", SILVER_COLUMNS).await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS BronzeFiles (
                file_path TEXT NOT NULL PRIMARY KEY,
                test_type TEXT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;
        self.ensure_columns("BronzeFiles", BRONZE_COLUMNS).await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_silver_serial ON SilverFiles(serial_number)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_silver_stand ON SilverFiles(test_stand)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bronze_type ON BronzeFiles(test_type)")
            .execute(&self.pool)
            .await?;

        info!("Catalog schema verified");
        Ok(())
    }

    /// Add any of `columns` missing from `table`. Returns how many were added.
    async fn ensure_columns(&self, table: &str, columns: &[(&str, &str)]) -> Result<usize> {
        let existing: Vec<String> = sqlx::query(&format!(
            "SELECT name FROM pragma_table_info('{}')",
            table
        ))
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| row.get::<String, _>("name"))
        .collect();

        let mut added = 0;
        for (name, decl) in columns {
            if existing.iter().any(|col| col.eq_ignore_ascii_case(name)) {
                continue;
            }
            warn!(table, column = *name, "Widening catalog table");
            sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} {} NULL", table, name, decl))
                .execute(&self.pool)
                .await?;
            added += 1;
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use crate::CatalogDb;
    use sqlx::Row;
    use tempfile::TempDir;

    #[tokio::test]
    async fn ensure_schema_is_repeatable() {
        let tmp = TempDir::new().unwrap();
        let db = CatalogDb::open(tmp.path().join("catalog.sqlite3")).await.unwrap();

        db.ensure_schema().await.unwrap();
        db.ensure_schema().await.unwrap();

        let tables: Vec<String> = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap()
        .iter()
        .map(|r| r.get("name"))
        .collect();
        assert!(tables.contains(&"SilverFiles".to_string()));
        assert!(tables.contains(&"BronzeFiles".to_string()));
    }

    #[tokio::test]
    async fn ensure_schema_widens_legacy_tables() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog.sqlite3");

        // A catalog created before test_stand and test_type were tracked.
        {
            let url = format!("sqlite:{}?mode=rwc", path.display());
            let pool = sqlx::sqlite::SqlitePoolOptions::new()
                .connect(&url)
                .await
                .unwrap();
            sqlx::query("CREATE TABLE SilverFiles (file_path TEXT NOT NULL PRIMARY KEY, serial_number TEXT)")
                .execute(&pool)
                .await
                .unwrap();
            sqlx::query("CREATE TABLE BronzeFiles (file_path TEXT NOT NULL PRIMARY KEY)")
                .execute(&pool)
                .await
                .unwrap();
            pool.close().await;
        }

        let db = CatalogDb::open(&path).await.unwrap();
        let added = db
            .ensure_columns("SilverFiles", super::SILVER_COLUMNS)
            .await
            .unwrap();
        assert_eq!(added, 0, "open() should already have widened the table");

        let cols: Vec<String> = sqlx::query("SELECT name FROM pragma_table_info('BronzeFiles')")
            .fetch_all(db.pool())
            .await
            .unwrap()
            .iter()
            .map(|r| r.get("name"))
            .collect();
        assert_eq!(cols, vec!["file_path".to_string(), "test_type".to_string()]);
    }
}
