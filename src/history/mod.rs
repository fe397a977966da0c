// src/history/mod.rs
pub mod checkpoint;
pub mod failures;

use anyhow::{Context, Result};
use arrow::{compute::concat_batches, record_batch::RecordBatch};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

pub use checkpoint::Checkpoints;
pub use failures::{FailureRecord, YearReport};

/// `<name>.tmp` next to `path`; written first, then renamed into place.
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `batch` to `path` as a single Snappy-compressed Parquet file.
/// Readers never observe a half-written file.
pub fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let tmp = tmp_path(path);
    let file = File::create(&tmp)
        .with_context(|| format!("could not create temporary file `{}`", tmp.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))
        .context("creating ArrowWriter")?;
    writer
        .write(batch)
        .with_context(|| format!("writing batch to `{}`", tmp.display()))?;
    writer.close().context("closing ArrowWriter")?;

    fs::rename(&tmp, path).with_context(|| {
        format!(
            "failed to rename `{}` to `{}`",
            tmp.display(),
            path.display()
        )
    })
}

/// Read every batch of a Parquet file into one `RecordBatch`.
pub fn read_parquet(path: &Path) -> Result<RecordBatch> {
    let file = File::open(path).with_context(|| format!("failed to open `{}`", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading Parquet metadata of `{}`", path.display()))?;
    let schema = builder.schema().clone();
    let reader = builder
        .with_batch_size(8192)
        .build()
        .with_context(|| format!("failed to build RecordBatchReader for `{}`", path.display()))?;

    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("error reading RecordBatch from `{}`", path.display()))?;
    concat_batches(&schema, &batches).context("joining Parquet batches")
}

/// Write `text` to `path` through a temporary file.
pub(crate) fn write_atomic(path: &Path, text: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let tmp = tmp_path(path);
    fs::write(&tmp, text).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Int32Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn parquet_round_trip_leaves_no_tmp() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("t.parquet");

        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, true),
            Field::new("year", DataType::Int32, false),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec![Some("a"), None])),
            Arc::new(Int32Array::from(vec![2010, 2010])),
        ];
        let batch = RecordBatch::try_new(schema, columns).unwrap();

        write_parquet(&path, &batch).unwrap();
        assert!(path.exists());
        assert!(!tmp_path(&path).exists());

        let back = read_parquet(&path).unwrap();
        assert_eq!(back.num_rows(), 2);
        assert_eq!(back.columns(), batch.columns());
    }

    #[test]
    fn tmp_path_appends_suffix() {
        assert_eq!(
            tmp_path(Path::new("/a/b/acs_2010.parquet")),
            PathBuf::from("/a/b/acs_2010.parquet.tmp")
        );
    }
}
