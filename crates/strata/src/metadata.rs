//! Key-value metadata embedded in Bronze and Silver parquet footers.
//!
//! The footer metadata is the authoritative record of a file's serial,
//! stand and test type; the catalog only mirrors it.

use crate::error::Result;
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

pub const SERIAL_NUMBER_KEY: &str = "Serial Number";
pub const TEST_STAND_KEY: &str = "Test Stand";
pub const TEST_TYPE_KEY: &str = "Test Type";

/// Header metadata of a Silver index file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SilverMetadata {
    pub serial_number: Option<String>,
    pub test_stand: Option<String>,
}

/// All key-value pairs in a parquet footer. Keys without a value are omitted.
pub fn read_file_metadata(path: &Path) -> Result<HashMap<String, String>> {
    let file = File::open(path)?;
    let reader = SerializedFileReader::new(file)?;
    let mut out = HashMap::new();
    if let Some(kvs) = reader.metadata().file_metadata().key_value_metadata() {
        for kv in kvs {
            if let Some(value) = &kv.value {
                out.insert(kv.key.clone(), value.clone());
            }
        }
    }
    Ok(out)
}

pub fn read_silver_metadata(path: &Path) -> Result<SilverMetadata> {
    let mut kv = read_file_metadata(path)?;
    Ok(SilverMetadata {
        serial_number: kv.remove(SERIAL_NUMBER_KEY),
        test_stand: kv.remove(TEST_STAND_KEY),
    })
}

/// Test type recorded in a Bronze snapshot, if any.
pub fn read_test_type(path: &Path) -> Result<Option<String>> {
    Ok(read_file_metadata(path)?.remove(TEST_TYPE_KEY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parquet_file::write_batch_atomic;
    use arrow::array::StringArray;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    fn tiny_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Utf8, true)]));
        RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(vec!["x"]))]).unwrap()
    }

    #[test]
    fn reads_embedded_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SN1.parquet");
        write_batch_atomic(
            &path,
            &tiny_batch(),
            &[(SERIAL_NUMBER_KEY, "SN1"), (TEST_STAND_KEY, "StandA")],
        )
        .unwrap();

        let meta = read_silver_metadata(&path).unwrap();
        assert_eq!(meta.serial_number.as_deref(), Some("SN1"));
        assert_eq!(meta.test_stand.as_deref(), Some("StandA"));
        assert_eq!(read_test_type(&path).unwrap(), None);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.parquet");
        std::fs::write(&path, b"not parquet").unwrap();
        assert!(read_file_metadata(&path).is_err());
        assert!(read_test_type(&dir.path().join("missing.parquet")).is_err());
    }
}
