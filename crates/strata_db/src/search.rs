//! Catalog lookups backing serial/stand search and test-type filtering.

use crate::error::{DbError, Result};
use crate::types::{SerialMatch, UNFILTERED_TEST_TYPE};
use crate::CatalogDb;
use sqlx::{QueryBuilder, Row, Sqlite};

/// Bronze paths bound per `IN (...)` list; keeps well under SQLite's
/// host-parameter limit even with a long test-type list appended.
const PATH_CHUNK: usize = 400;

/// Build a `LIKE` pattern matching `needle` anywhere, with wildcards in the
/// needle itself escaped so they match literally.
pub(crate) fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn check_limit(limit: usize) -> Result<i64> {
    i64::try_from(limit).map_err(|_| DbError::invalid_input(format!("limit too large: {}", limit)))
}

impl CatalogDb {
    /// Serials whose number contains `substring`, optionally restricted to a
    /// set of test stands, ordered by (serial_number, test_stand).
    ///
    /// An empty `test_stands` slice means no stand restriction.
    pub async fn search_serials(
        &self,
        substring: &str,
        limit: usize,
        test_stands: Option<&[String]>,
    ) -> Result<Vec<SerialMatch>> {
        let limit = check_limit(limit)?;
        let pattern = contains_pattern(substring);

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT DISTINCT serial_number, test_stand FROM SilverFiles \
             WHERE serial_number IS NOT NULL AND serial_number LIKE ",
        );
        qb.push_bind(pattern);
        qb.push(r" ESCAPE '\'");

        if let Some(stands) = test_stands.filter(|s| !s.is_empty()) {
            qb.push(" AND test_stand IN (");
            let mut separated = qb.separated(", ");
            for stand in stands {
                separated.push_bind(stand.as_str());
            }
            separated.push_unseparated(")");
        }

        qb.push(" ORDER BY serial_number, test_stand LIMIT ");
        qb.push_bind(limit);

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| SerialMatch {
                serial_number: row.get("serial_number"),
                test_stand: row.get("test_stand"),
            })
            .collect())
    }

    /// Distinct test stands containing `substring`, ascending.
    pub async fn search_test_stands(&self, substring: &str, limit: usize) -> Result<Vec<String>> {
        let limit = check_limit(limit)?;
        let rows = sqlx::query(
            r"SELECT DISTINCT test_stand FROM SilverFiles
              WHERE test_stand IS NOT NULL AND test_stand LIKE ? ESCAPE '\'
              ORDER BY test_stand
              LIMIT ?",
        )
        .bind(contains_pattern(substring))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("test_stand")).collect())
    }

    /// Silver index paths for an exact serial number, optionally pinned to a
    /// test stand, ordered by path.
    pub async fn silver_paths_for_serial(
        &self,
        serial_number: &str,
        test_stand: Option<&str>,
    ) -> Result<Vec<String>> {
        let rows = match test_stand {
            Some(stand) => {
                sqlx::query(
                    r"SELECT file_path FROM SilverFiles
                      WHERE serial_number = ? AND test_stand = ?
                      ORDER BY file_path",
                )
                .bind(serial_number)
                .bind(stand)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT file_path FROM SilverFiles WHERE serial_number = ? ORDER BY file_path",
                )
                .bind(serial_number)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.iter().map(|row| row.get("file_path")).collect())
    }

    /// Keep the Bronze paths whose catalog test type is in `test_types` or is
    /// the unfiltered sentinel. Paths without a catalog row are dropped.
    ///
    /// The result is sorted and de-duplicated.
    pub async fn filter_bronze_by_test_type(
        &self,
        bronze_paths: &[String],
        test_types: &[String],
    ) -> Result<Vec<String>> {
        let mut kept: Vec<String> = Vec::new();

        for chunk in bronze_paths.chunks(PATH_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT file_path FROM BronzeFiles WHERE file_path IN (");
            let mut separated = qb.separated(", ");
            for path in chunk {
                separated.push_bind(path.as_str());
            }
            separated.push_unseparated(") AND (test_type = ");
            qb.push_bind(UNFILTERED_TEST_TYPE);

            if !test_types.is_empty() {
                qb.push(" OR test_type IN (");
                let mut separated = qb.separated(", ");
                for test_type in test_types {
                    separated.push_bind(test_type.as_str());
                }
                separated.push_unseparated(")");
            }
            qb.push(") ORDER BY file_path");

            let rows = qb.build().fetch_all(&self.pool).await?;
            kept.extend(rows.iter().map(|row| row.get::<String, _>("file_path")));
        }

        kept.sort();
        kept.dedup();
        Ok(kept)
    }
}
