//! Row types for the `SilverFiles` and `BronzeFiles` catalog tables.

use serde::{Deserialize, Serialize};

/// Test type recorded for Bronze files that apply to every test type.
pub const UNFILTERED_TEST_TYPE: &str = "None";

/// Relational projection of a Silver index file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SilverFileRow {
    pub file_path: String,
    pub serial_number: Option<String>,
    pub test_stand: Option<String>,
}

/// Relational projection of a Bronze snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BronzeFileRow {
    pub file_path: String,
    pub test_type: Option<String>,
}

/// A serial number as it appears in the catalog, with its owning stand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerialMatch {
    pub serial_number: String,
    pub test_stand: Option<String>,
}

/// What a single upsert did to its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    /// Row was absent and has been inserted
    Inserted,
    /// Row existed with different fields and has been rewritten
    Updated,
    /// Row existed with identical fields; nothing was written
    Unchanged,
}

/// Per-table tally of upsert outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertCounts {
    pub new: u64,
    pub updated: u64,
    pub skipped: u64,
}

impl UpsertCounts {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.new += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.skipped += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.new + self.updated + self.skipped
    }
}

/// Row counts across the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub silver_files: i64,
    pub bronze_files: i64,
    pub serials: i64,
    pub test_stands: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_record_each_outcome() {
        let mut counts = UpsertCounts::default();
        counts.record(UpsertOutcome::Inserted);
        counts.record(UpsertOutcome::Inserted);
        counts.record(UpsertOutcome::Updated);
        counts.record(UpsertOutcome::Unchanged);

        assert_eq!(
            counts,
            UpsertCounts {
                new: 2,
                updated: 1,
                skipped: 1
            }
        );
        assert_eq!(counts.total(), 4);
    }
}
