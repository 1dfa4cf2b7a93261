//! Atomic parquet output shared by the Bronze and Silver tiers.
//!
//! Files are written to a hidden `.<name>.tmp` sibling and renamed into
//! place, so readers never observe a half-written snapshot or index.

use crate::error::Result;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Hidden sibling used while `path` is being written.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

/// True for in-flight temp files left by [`write_batch_atomic`].
pub fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') && n.ends_with(".tmp"))
        .unwrap_or(false)
}

/// Removes the temp file unless the write was published.
struct TempGuard {
    path: PathBuf,
    published: bool,
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if !self.published && self.path.exists() {
            let _ = std::fs::remove_file(&self.path);
            warn!(path = %self.path.display(), "Cleaned up orphaned temp file");
        }
    }
}

/// Write one batch to `path` with footer key-value metadata, replacing any
/// existing file.
pub fn write_batch_atomic(
    path: &Path,
    batch: &RecordBatch,
    metadata: &[(&str, &str)],
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut guard = TempGuard {
        path: temp_path_for(path),
        published: false,
    };

    let kv: Vec<KeyValue> = metadata
        .iter()
        .map(|(k, v)| KeyValue::new(k.to_string(), v.to_string()))
        .collect();
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .set_key_value_metadata(Some(kv))
        .build();

    let file = File::create(&guard.path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;

    std::fs::rename(&guard.path, path)?;
    guard.published = true;

    debug!(path = %path.display(), rows = batch.num_rows(), "Parquet file written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    #[test]
    fn temp_names_are_hidden_siblings() {
        let tmp = temp_path_for(Path::new("/a/b/SN1.parquet"));
        assert_eq!(tmp, PathBuf::from("/a/b/.SN1.parquet.tmp"));
        assert!(is_temp_file(&tmp));
        assert!(!is_temp_file(Path::new("/a/b/SN1.parquet")));
    }

    #[test]
    fn write_replaces_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.parquet");
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, true)]));

        for n in [1_i64, 2] {
            let batch = RecordBatch::try_new(
                schema.clone(),
                vec![Arc::new(Int64Array::from(vec![n; n as usize]))],
            )
            .unwrap();
            write_batch_atomic(&path, &batch, &[("k", "v")]).unwrap();
        }

        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("out.parquet")]);

        let file = File::open(&path).unwrap();
        let reader = parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 2);
    }
}
