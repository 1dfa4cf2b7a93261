//! Bronze converter: raw CSV files → per-file parquet snapshots.
//!
//! Each CSV directly inside a staged serial directory becomes
//! `<bronze_root>/<test_stand>/<stem>.parquet` with its test type embedded in
//! the footer. Malformed rows are dropped. A file that cannot be read or
//! written is logged and skipped without stopping the directory.

use crate::classify::TestTypeClassifier;
use crate::error::{Result, StrataError};
use crate::metadata::{TEST_STAND_KEY, TEST_TYPE_KEY};
use crate::parquet_file::write_batch_atomic;
use crate::paths::{absolute_path, list_csv_files};
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use csv::ReaderBuilder;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tracks which value kinds a column has seen.
#[derive(Debug, Clone, Default)]
struct TypeTracker {
    has_integers: bool,
    has_floats: bool,
    has_booleans: bool,
    has_strings: bool,
}

impl TypeTracker {
    fn observe(&mut self, value: &str) {
        if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
            self.has_booleans = true;
        } else if value.parse::<i64>().is_ok() {
            self.has_integers = true;
        } else if value.parse::<f64>().is_ok() {
            self.has_floats = true;
        } else {
            self.has_strings = true;
        }
    }

    fn data_type(&self) -> DataType {
        let numeric = self.has_integers || self.has_floats;
        if self.has_strings || (self.has_booleans && numeric) {
            DataType::Utf8
        } else if self.has_booleans {
            DataType::Boolean
        } else if self.has_floats {
            DataType::Float64
        } else if self.has_integers {
            DataType::Int64
        } else {
            DataType::Utf8
        }
    }
}

/// Blank headers become `column_<n>`; repeats get a `_<n>` suffix.
fn unique_headers(raw: &csv::StringRecord) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    raw.iter()
        .enumerate()
        .map(|(i, h)| {
            let base = match h.trim() {
                "" => format!("column_{}", i + 1),
                name => name.to_string(),
            };
            let mut name = base.clone();
            let mut n = 1;
            while !seen.insert(name.clone()) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
            name
        })
        .collect()
}

fn build_column(values: &[Option<String>], data_type: &DataType) -> ArrayRef {
    match data_type {
        DataType::Int64 => Arc::new(
            values
                .iter()
                .map(|v| v.as_deref().and_then(|s| s.parse::<i64>().ok()))
                .collect::<Int64Array>(),
        ),
        DataType::Float64 => Arc::new(
            values
                .iter()
                .map(|v| v.as_deref().and_then(|s| s.parse::<f64>().ok()))
                .collect::<Float64Array>(),
        ),
        DataType::Boolean => Arc::new(
            values
                .iter()
                .map(|v| v.as_deref().map(|s| s.eq_ignore_ascii_case("true")))
                .collect::<BooleanArray>(),
        ),
        _ => Arc::new(values.iter().map(|v| v.as_deref()).collect::<StringArray>()),
    }
}

/// Parse a CSV file into a single typed batch.
///
/// Ragged rows are truncated or padded with nulls; rows the reader cannot
/// decode are dropped. A file without a header line is an error.
pub fn read_raw_table(path: &Path) -> Result<RecordBatch> {
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;

    let raw_headers = reader.headers()?.clone();
    if raw_headers.is_empty() {
        return Err(StrataError::EmptyInput(format!(
            "{} has no header row",
            path.display()
        )));
    }
    let headers = unique_headers(&raw_headers);
    let width = headers.len();

    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); width];
    let mut trackers = vec![TypeTracker::default(); width];
    let mut dropped = 0usize;

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                dropped += 1;
                debug!(path = %path.display(), error = %e, "Dropping malformed row");
                continue;
            }
        };
        for (i, column) in columns.iter_mut().enumerate() {
            let value = record
                .get(i)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            if let Some(v) = &value {
                trackers[i].observe(v);
            }
            column.push(value);
        }
    }

    if dropped > 0 {
        warn!(path = %path.display(), dropped, "Dropped malformed CSV rows");
    }

    let mut fields = Vec::with_capacity(width);
    let mut arrays = Vec::with_capacity(width);
    for ((name, values), tracker) in headers.into_iter().zip(&columns).zip(&trackers) {
        let data_type = tracker.data_type();
        arrays.push(build_column(values, &data_type));
        fields.push(Field::new(name, data_type, true));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// Snapshot location for a raw file.
pub fn bronze_path(bronze_root: &Path, test_stand: &str, raw_file: &Path) -> PathBuf {
    let stem = raw_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    bronze_root.join(test_stand).join(format!("{}.parquet", stem))
}

fn convert_one(
    csv_path: &Path,
    test_stand: &str,
    bronze_root: &Path,
    classifier: &TestTypeClassifier,
) -> Result<PathBuf> {
    let batch = read_raw_table(csv_path)?;
    let test_type = classifier.classify(csv_path);
    let out = bronze_path(bronze_root, test_stand, csv_path);
    write_batch_atomic(
        &out,
        &batch,
        &[(TEST_TYPE_KEY, test_type), (TEST_STAND_KEY, test_stand)],
    )?;
    debug!(
        source = %csv_path.display(),
        snapshot = %out.display(),
        test_type,
        rows = batch.num_rows(),
        "Bronze snapshot written"
    );
    Ok(absolute_path(&out))
}

/// Convert every CSV in `in_dir` and return the snapshots that were written.
///
/// Only a failure to list `in_dir` is returned as an error.
pub fn write_bronze_snapshots(
    in_dir: &Path,
    test_stand: &str,
    bronze_root: &Path,
    classifier: &TestTypeClassifier,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for csv_path in list_csv_files(in_dir)? {
        match convert_one(&csv_path, test_stand, bronze_root, classifier) {
            Ok(path) => written.push(path),
            Err(e) => {
                warn!(path = %csv_path.display(), error = %e, "Skipping raw file");
            }
        }
    }

    info!(
        dir = %in_dir.display(),
        test_stand,
        written = written.len(),
        "Bronze conversion complete"
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn infers_column_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "run.csv",
            "id,pressure,ok,label\n1,1.5,true,a\n2,2,FALSE,b\n",
        );

        let batch = read_raw_table(&path).unwrap();
        let types: Vec<_> = batch.schema().fields().iter().map(|f| f.data_type().clone()).collect();
        assert_eq!(
            types,
            vec![DataType::Int64, DataType::Float64, DataType::Boolean, DataType::Utf8]
        );
        assert_eq!(batch.num_rows(), 2);
    }

    #[test]
    fn ragged_rows_are_truncated_or_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "ragged.csv", "a,b\n1,2,3\n4\n5,6\n");

        let batch = read_raw_table(&path).unwrap();
        assert_eq!(batch.num_columns(), 2);
        assert_eq!(batch.num_rows(), 3);
        let b = batch.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(b.value(0), 2);
        assert!(b.is_null(1));
        assert_eq!(b.value(2), 6);
    }

    #[test]
    fn invalid_utf8_rows_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.csv");
        let mut body = b"a,b\n1,x\n".to_vec();
        body.extend_from_slice(b"2,\xff\xfe\n3,z\n");
        fs::write(&path, body).unwrap();

        let batch = read_raw_table(&path).unwrap();
        assert_eq!(batch.num_rows(), 2);
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bad.csv", "");
        assert!(matches!(read_raw_table(&path), Err(StrataError::EmptyInput(_))));
    }

    #[test]
    fn headers_are_made_unique() {
        let record = csv::StringRecord::from(vec!["t", "", "t", "t"]);
        assert_eq!(unique_headers(&record), vec!["t", "column_2", "t_1", "t_2"]);
    }

    #[test]
    fn snapshot_path_uses_stand_and_stem() {
        let path = bronze_path(Path::new("/bronze"), "StandA", Path::new("/in/SN1/run1.csv"));
        assert_eq!(path, PathBuf::from("/bronze/StandA/run1.parquet"));
    }
}
