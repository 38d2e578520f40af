// src/store/mod.rs
//
// Directory-per-dataset chunked store. Each append lands as one parquet
// part file named by its time bounds, written to a `.tmp` path and renamed
// into place. Parts are never rewritten or truncated; the time axis only
// ever extends forward.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use arrow::array::TimestampMicrosecondArray;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use glob::glob;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Name of the append dimension in every stored dataset.
pub const TIME_COLUMN: &str = "time";

#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Existence is directory presence; checked explicitly before writing,
    /// never inferred from write errors.
    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// Append one batch along time. The first write creates the store;
    /// subsequent writes must match the stored schema and start strictly
    /// after the largest committed timestamp. A directory without any
    /// committed parts (e.g. after a crash before the first rename) counts
    /// as a first write, not an existing store.
    pub fn append(&self, batch: &RecordBatch) -> Result<()> {
        let (first, last) = time_bounds_of(batch, &self.dir)?;

        let parts = self.part_paths()?;
        match parts.first() {
            Some(oldest) => {
                let stored = read_schema(oldest)?;
                if stored.fields() != batch.schema().fields() {
                    return Err(Error::SchemaMismatch {
                        store: self.dir.clone(),
                    });
                }
                let max = parts.last().and_then(|p| part_bounds(p)).map(|(_, last)| last);
                if let Some(max) = max {
                    if first <= max {
                        return Err(Error::TimeNotMonotonic {
                            store: self.dir.clone(),
                        });
                    }
                }
            }
            None => {
                fs::create_dir_all(&self.dir)?;
                info!(store = %self.dir.display(), "created store");
            }
        }

        let name = format!("part-{first:020}-{last:020}.parquet");
        let tmp_path = self.dir.join(format!("{name}.tmp"));
        let final_path = self.dir.join(&name);

        let file = File::create(&tmp_path)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))?;
        writer.write(batch)?;
        writer.close()?;
        fs::rename(&tmp_path, &final_path)?;

        debug!(part = %name, rows = batch.num_rows(), "appended part");
        Ok(())
    }

    /// Arrow schema of the stored dataset, read from the oldest part.
    pub fn schema(&self) -> Result<SchemaRef> {
        let part = self
            .part_paths()?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Parse(format!("store {} has no parts", self.dir.display())))?;
        read_schema(&part)
    }

    /// Largest committed timestamp, decoded from the part file names.
    pub fn last_time(&self) -> Result<Option<i64>> {
        Ok(self
            .part_paths()?
            .last()
            .and_then(|p| part_bounds(p))
            .map(|(_, last)| last))
    }

    /// Read every part back, oldest first.
    pub fn open(&self) -> Result<Vec<RecordBatch>> {
        let mut batches = Vec::new();
        for part in self.part_paths()? {
            let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&part)?)?
                .with_batch_size(8192)
                .build()?;
            for batch in reader {
                batches.push(batch?);
            }
        }
        Ok(batches)
    }

    /// The full time axis across all parts, microseconds since the epoch.
    pub fn time_axis(&self) -> Result<Vec<i64>> {
        let mut axis = Vec::new();
        for batch in self.open()? {
            let times = time_column(&batch, &self.dir)?;
            axis.extend(times.values().iter().copied());
        }
        Ok(axis)
    }

    /// Write a JSON metadata sidecar next to the parts (e.g. the coordinate
    /// vectors of a gridded dataset).
    pub fn put_meta(&self, name: &str, value: &Value) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(
            self.dir.join(format!("{name}.json")),
            serde_json::to_vec_pretty(value)?,
        )?;
        Ok(())
    }

    pub fn get_meta(&self, name: &str) -> Result<Option<Value>> {
        let path = self.dir.join(format!("{name}.json"));
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&fs::read(path)?)?))
    }

    /// Part files in time order. Zero-padded bounds in the names make
    /// lexical order chronological.
    fn part_paths(&self) -> Result<Vec<PathBuf>> {
        if !self.exists() {
            return Ok(Vec::new());
        }
        let pattern = format!("{}/part-*.parquet", self.dir.display());
        let mut paths: Vec<PathBuf> = glob(&pattern)
            .map_err(|e| Error::Parse(format!("bad store glob: {e}")))?
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .collect();
        paths.sort_unstable();
        Ok(paths)
    }
}

fn read_schema(part: &Path) -> Result<SchemaRef> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(part)?)?;
    Ok(reader.schema().clone())
}

/// Decode `(first, last)` from a `part-<first>-<last>.parquet` file name.
fn part_bounds(path: &Path) -> Option<(i64, i64)> {
    let stem = path.file_stem()?.to_str()?;
    let rest = stem.strip_prefix("part-")?;
    let (first, last) = rest.split_once('-')?;
    Some((first.parse().ok()?, last.parse().ok()?))
}

fn time_column<'a>(
    batch: &'a RecordBatch,
    store: &Path,
) -> Result<&'a TimestampMicrosecondArray> {
    batch
        .column_by_name(TIME_COLUMN)
        .and_then(|col| col.as_any().downcast_ref::<TimestampMicrosecondArray>())
        .ok_or_else(|| {
            Error::Parse(format!(
                "dataset for store {} lacks a microsecond `{TIME_COLUMN}` column",
                store.display()
            ))
        })
}

/// Validate the batch's own time column (present, non-empty, sorted
/// non-decreasing) and return its bounds.
fn time_bounds_of(batch: &RecordBatch, store: &Path) -> Result<(i64, i64)> {
    let times = time_column(batch, store)?;
    if times.is_empty() {
        return Err(Error::EmptyDay);
    }
    let values = times.values();
    if values.windows(2).any(|w| w[0] > w[1]) {
        return Err(Error::TimeNotMonotonic {
            store: store.to_path_buf(),
        });
    }
    Ok((values[0], values[values.len() - 1]))
}
