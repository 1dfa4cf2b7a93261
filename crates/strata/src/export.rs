//! Export of Bronze snapshots as a zip of CSV files.

use crate::error::Result;
use arrow::csv::WriterBuilder;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Data,
    ErrorNote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportEntry {
    pub name: String,
    pub source: String,
    pub kind: EntryKind,
}

/// A finished archive and what went into it.
#[derive(Debug, Clone)]
pub struct ExportBundle {
    pub bytes: Vec<u8>,
    pub entries: Vec<ExportEntry>,
}

impl ExportBundle {
    pub fn data_entries(&self) -> usize {
        self.entries.iter().filter(|e| e.kind == EntryKind::Data).count()
    }

    pub fn failed_entries(&self) -> usize {
        self.entries.len() - self.data_entries()
    }
}

/// Hands out archive names, suffixing `_<n>` before the extension on reuse.
#[derive(Default)]
struct EntryNames {
    used: HashSet<String>,
}

impl EntryNames {
    fn claim(&mut self, stem: &str, ext: &str) -> String {
        let mut name = format!("{}.{}", stem, ext);
        let mut n = 1;
        while !self.used.insert(name.clone()) {
            name = format!("{}_{}.{}", stem, n, ext);
            n += 1;
        }
        name
    }
}

fn parquet_to_csv(path: &Path) -> Result<Vec<u8>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?.build()?;
    let mut out = Vec::new();
    {
        let mut writer = WriterBuilder::new().with_header(true).build(&mut out);
        for batch in reader {
            writer.write(&batch?)?;
        }
    }
    Ok(out)
}

/// Build a zip with one CSV per readable snapshot and a `FAILED_<name>.txt`
/// note per unreadable one. Blank paths are ignored.
pub fn export_bundle(paths: &[String]) -> Result<ExportBundle> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut names = EntryNames::default();
    let mut entries = Vec::new();

    for raw in paths {
        let source = raw.trim();
        if source.is_empty() {
            continue;
        }
        let path = Path::new(source);

        let (name, kind, body) = match parquet_to_csv(path) {
            Ok(csv) => {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "export".to_string());
                (names.claim(&stem, "csv"), EntryKind::Data, csv)
            }
            Err(e) => {
                warn!(path = source, error = %e, "Export read failed, adding error note");
                let file_name = path
                    .file_name()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "export".to_string());
                let note = format!("Failed to read parquet {}: {}\n", source, e);
                (
                    names.claim(&format!("FAILED_{}", file_name), "txt"),
                    EntryKind::ErrorNote,
                    note.into_bytes(),
                )
            }
        };

        zip.start_file(name.as_str(), options)?;
        zip.write_all(&body)?;
        entries.push(ExportEntry {
            name,
            source: source.to_string(),
            kind,
        });
    }

    let bytes = zip.finish()?.into_inner();
    let bundle = ExportBundle { bytes, entries };
    info!(
        data = bundle.data_entries(),
        failed = bundle.failed_entries(),
        size = bundle.bytes.len(),
        "Export bundle built"
    );
    Ok(bundle)
}

/// Archive bytes for [`export_bundle`].
pub fn export_as_tabular_bundle(paths: &[String]) -> Result<Vec<u8>> {
    Ok(export_bundle(paths)?.bytes)
}
