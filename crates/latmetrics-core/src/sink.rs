//! Parquet output with atomic tmp→rename, and whole-table reads

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::{Schema, SchemaRef};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

/// `foo.parquet` → `foo.parquet.tmp`
pub fn tmp_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    final_path.with_file_name(name)
}

/// Buffered parquet writer with atomic tmp→rename.
///
/// Nothing is visible at the final path until [`finalize`](Self::finalize)
/// succeeds; a crash leaves at most a stale `.tmp` sibling.
pub struct ParquetSink {
    writer: ArrowWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_count: usize,
}

impl std::fmt::Debug for ParquetSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetSink")
            .field("final_path", &self.final_path)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl ParquetSink {
    /// Create a sink that will replace `final_path` on finalize
    pub fn create(final_path: &Path, schema: &Schema, zstd_level: i32) -> io::Result<Self> {
        let final_path = final_path.to_path_buf();
        let tmp_path = tmp_path_for(&final_path);

        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let file = File::create(&tmp_path)?;
        let level = ZstdLevel::try_new(zstd_level)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(level))
            .build();

        let writer = ArrowWriter::try_new(file, Arc::new(schema.clone()), Some(props))
            .map_err(io::Error::other)?;

        Ok(Self {
            writer,
            tmp_path,
            final_path,
            row_count: 0,
        })
    }

    /// Write a record batch
    pub fn write_batch(&mut self, batch: &RecordBatch) -> io::Result<()> {
        self.row_count += batch.num_rows();
        self.writer.write(batch).map_err(io::Error::other)
    }

    /// Flush footer, fsync, and rename tmp → final
    pub fn finalize(self) -> io::Result<usize> {
        let row_count = self.row_count;
        let file = self.writer.into_inner().map_err(io::Error::other)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(row_count)
    }
}

/// Read every batch of a parquet file
pub fn read_parquet(path: &Path) -> io::Result<(SchemaRef, Vec<RecordBatch>)> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(io::Error::other)?;
    let schema = builder.schema().clone();
    let reader = builder.build().map_err(io::Error::other)?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(io::Error::other)?;
    Ok((schema, batches))
}

/// Check if a completed parquet file exists and has a valid footer
pub fn is_valid_parquet(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    parquet::file::reader::SerializedFileReader::new(file).is_ok()
}

/// Remove stale .tmp files left by an interrupted write
pub fn cleanup_tmp_files(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field};
    use tempfile::TempDir;

    fn sample_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("country_code", DataType::Utf8, false),
            Field::new("fwci_avg", DataType::Float64, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["AR", "BR", "MX"])),
                Arc::new(Float64Array::from(vec![0.81, 0.64, 0.72])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn tmp_path_appends_suffix() {
        let p = tmp_path_for(Path::new("/cache/metrics_country_annual.parquet"));
        assert_eq!(p, PathBuf::from("/cache/metrics_country_annual.parquet.tmp"));
    }

    #[test]
    fn finalize_renames_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.parquet");
        let batch = sample_batch();

        let mut sink = ParquetSink::create(&path, batch.schema().as_ref(), 3).unwrap();
        sink.write_batch(&batch).unwrap();
        assert!(!path.exists(), "final path must not exist before finalize");
        assert_eq!(sink.finalize().unwrap(), 3);

        assert!(path.exists());
        assert!(!tmp_path_for(&path).exists());
        assert!(is_valid_parquet(&path));

        let (schema, batches) = read_parquet(&path).unwrap();
        assert_eq!(schema.fields().len(), 2);
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 3);
    }

    #[test]
    fn dropped_sink_leaves_previous_file_intact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.parquet");
        std::fs::write(&path, b"previous").unwrap();

        let batch = sample_batch();
        let mut sink = ParquetSink::create(&path, batch.schema().as_ref(), 3).unwrap();
        sink.write_batch(&batch).unwrap();
        drop(sink);

        assert_eq!(std::fs::read(&path).unwrap(), b"previous");
    }

    #[test]
    fn is_valid_parquet_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        assert!(!is_valid_parquet(&dir.path().join("missing.parquet")));
        let bad = dir.path().join("bad.parquet");
        std::fs::write(&bad, b"not parquet").unwrap();
        assert!(!is_valid_parquet(&bad));
    }

    #[test]
    fn read_parquet_missing_file_errors() {
        let dir = TempDir::new().unwrap();
        let err = read_parquet(&dir.path().join("nope.parquet")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn cleanup_tmp_files_removes_only_tmp() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.parquet.tmp"), b"stale").unwrap();
        std::fs::write(dir.path().join("b.parquet"), b"keep").unwrap();

        assert_eq!(cleanup_tmp_files(dir.path()).unwrap(), 1);
        assert!(!dir.path().join("a.parquet.tmp").exists());
        assert!(dir.path().join("b.parquet").exists());
    }
}
