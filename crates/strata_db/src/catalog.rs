//! Catalog row maintenance: upserts, listings and explicit removal.
//!
//! Each upsert is a read-then-write pair on a single row. There is no
//! transaction spanning rows, so two synchronizer runs racing on the same
//! path resolve as last-writer-wins.

use crate::error::Result;
use crate::types::*;
use crate::CatalogDb;
use sqlx::Row;
use tracing::debug;

impl CatalogDb {
    // ========================================================================
    // Silver rows
    // ========================================================================

    /// Insert or update the catalog row for a Silver index file.
    pub async fn upsert_silver_file(
        &self,
        file_path: &str,
        serial_number: Option<&str>,
        test_stand: Option<&str>,
    ) -> Result<UpsertOutcome> {
        let existing = sqlx::query(
            "SELECT serial_number, test_stand FROM SilverFiles WHERE file_path = ?",
        )
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await?;

        let outcome = match existing {
            None => {
                sqlx::query(
                    "INSERT INTO SilverFiles (file_path, serial_number, test_stand) VALUES (?, ?, ?)",
                )
                .bind(file_path)
                .bind(serial_number)
                .bind(test_stand)
                .execute(&self.pool)
                .await?;
                UpsertOutcome::Inserted
            }
            Some(row) => {
                let current_serial: Option<String> = row.get("serial_number");
                let current_stand: Option<String> = row.get("test_stand");
                if current_serial.as_deref() == serial_number
                    && current_stand.as_deref() == test_stand
                {
                    UpsertOutcome::Unchanged
                } else {
                    sqlx::query(
                        "UPDATE SilverFiles SET serial_number = ?, test_stand = ? WHERE file_path = ?",
                    )
                    .bind(serial_number)
                    .bind(test_stand)
                    .bind(file_path)
                    .execute(&self.pool)
                    .await?;
                    UpsertOutcome::Updated
                }
            }
        };

        debug!(file_path, ?outcome, "Silver row upserted");
        Ok(outcome)
    }

    /// All Silver rows ordered by path.
    pub async fn list_silver_files(&self) -> Result<Vec<SilverFileRow>> {
        let rows = sqlx::query(
            "SELECT file_path, serial_number, test_stand FROM SilverFiles ORDER BY file_path",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SilverFileRow {
                file_path: row.get("file_path"),
                serial_number: row.get("serial_number"),
                test_stand: row.get("test_stand"),
            })
            .collect())
    }

    /// Remove a Silver row. Returns true when a row was deleted.
    pub async fn delete_silver_file(&self, file_path: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM SilverFiles WHERE file_path = ?")
            .bind(file_path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Bronze rows
    // ========================================================================

    /// Insert or update the catalog row for a Bronze snapshot file.
    pub async fn upsert_bronze_file(
        &self,
        file_path: &str,
        test_type: Option<&str>,
    ) -> Result<UpsertOutcome> {
        let existing = sqlx::query("SELECT test_type FROM BronzeFiles WHERE file_path = ?")
            .bind(file_path)
            .fetch_optional(&self.pool)
            .await?;

        let outcome = match existing {
            None => {
                sqlx::query("INSERT INTO BronzeFiles (file_path, test_type) VALUES (?, ?)")
                    .bind(file_path)
                    .bind(test_type)
                    .execute(&self.pool)
                    .await?;
                UpsertOutcome::Inserted
            }
            Some(row) => {
                let current: Option<String> = row.get("test_type");
                if current.as_deref() == test_type {
                    UpsertOutcome::Unchanged
                } else {
                    sqlx::query("UPDATE BronzeFiles SET test_type = ? WHERE file_path = ?")
                        .bind(test_type)
                        .bind(file_path)
                        .execute(&self.pool)
                        .await?;
                    UpsertOutcome::Updated
                }
            }
        };

        debug!(file_path, ?outcome, "Bronze row upserted");
        Ok(outcome)
    }

    /// All Bronze rows ordered by path.
    pub async fn list_bronze_files(&self) -> Result<Vec<BronzeFileRow>> {
        let rows = sqlx::query("SELECT file_path, test_type FROM BronzeFiles ORDER BY file_path")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| BronzeFileRow {
                file_path: row.get("file_path"),
                test_type: row.get("test_type"),
            })
            .collect())
    }

    /// Remove a Bronze row. Returns true when a row was deleted.
    pub async fn delete_bronze_file(&self, file_path: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM BronzeFiles WHERE file_path = ?")
            .bind(file_path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub async fn stats(&self) -> Result<CatalogStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM SilverFiles) AS silver_files,
                (SELECT COUNT(*) FROM BronzeFiles) AS bronze_files,
                (SELECT COUNT(DISTINCT serial_number) FROM SilverFiles) AS serials,
                (SELECT COUNT(DISTINCT test_stand) FROM SilverFiles) AS test_stands
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CatalogStats {
            silver_files: row.get("silver_files"),
            bronze_files: row.get("bronze_files"),
            serials: row.get("serials"),
            test_stands: row.get("test_stands"),
        })
    }
}
