//! Cache tables: metric records to Arrow batches and back, loading,
//! stale-row removal and atomic replacement.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int32Array, Int64Array, RecordBatch, StringArray,
};
use arrow::compute::filter_record_batch;
use arrow::error::ArrowError;
use rustc_hash::FxHashSet;

use latmetrics_core::{ParquetSink, read_parquet};

use crate::formula::{Indexing, IndexingCoverage, IndexingFlags, OaShares, PerformanceMetrics};
use crate::record::{Granularity, Level, Window};
use crate::schema::{self, COVERAGE_COLUMNS, FLAG_COLUMNS, METRIC_COLUMNS};

/// One (key, window) row of a cache table
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub key: String,
    pub window: Window,
    pub metrics: PerformanceMetrics,
    pub indexing: Indexing,
}

/// `<dir>/metrics_<level>_<granularity>.parquet`
pub fn cache_path(dir: &Path, level: Level, granularity: Granularity) -> PathBuf {
    dir.join(format!(
        "metrics_{}_{}.parquet",
        level.name(),
        granularity.name()
    ))
}

// ---------------------------------------------------------------------------
// Records → RecordBatch
// ---------------------------------------------------------------------------

/// Column buffers for one cache table
pub struct TableAccumulator {
    level: Level,
    granularity: Granularity,
    key: Vec<String>,
    year: Vec<i32>,
    period: Vec<String>,
    num_documents: Vec<i64>,
    floats: [Vec<f64>; METRIC_COLUMNS.len()],
    num_journals: Vec<i64>,
    coverage: [Vec<f64>; 3],
    flags: [Vec<bool>; 3],
}

impl TableAccumulator {
    pub fn new(level: Level, granularity: Granularity) -> Self {
        Self {
            level,
            granularity,
            key: Vec::new(),
            year: Vec::new(),
            period: Vec::new(),
            num_documents: Vec::new(),
            floats: Default::default(),
            num_journals: Vec::new(),
            coverage: Default::default(),
            flags: Default::default(),
        }
    }

    /// Records whose window is of another granularity are skipped
    pub fn push(&mut self, r: &MetricRecord) {
        match r.window {
            Window::Annual(y) if self.granularity == Granularity::Annual => self.year.push(y),
            Window::Period { .. } if self.granularity == Granularity::Period => {
                self.period.push(r.window.to_string())
            }
            _ => return,
        }
        self.key.push(r.key.clone());

        let m = &r.metrics;
        self.num_documents.push(m.num_documents as i64);
        let values = [
            m.fwci_avg,
            m.avg_percentile,
            m.pct_top_10,
            m.pct_top_1,
            m.oa.gold,
            m.oa.diamond,
            m.oa.green,
            m.oa.hybrid,
            m.oa.bronze,
            m.oa.closed,
        ];
        for (col, v) in self.floats.iter_mut().zip(values) {
            col.push(v);
        }

        match r.indexing {
            Indexing::Coverage(c) => {
                self.num_journals.push(c.num_journals as i64);
                for (col, v) in self
                    .coverage
                    .iter_mut()
                    .zip([c.pct_scopus, c.pct_core, c.pct_doaj])
                {
                    col.push(v);
                }
            }
            Indexing::Flags(f) => {
                for (col, v) in self.flags.iter_mut().zip([f.is_scopus, f.is_core, f.is_doaj]) {
                    col.push(v);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }

    /// Fails when a record carried indexing columns of the wrong level
    pub fn finish(self) -> Result<RecordBatch, ArrowError> {
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(18);
        columns.push(Arc::new(StringArray::from(self.key)));
        columns.push(match self.granularity {
            Granularity::Annual => Arc::new(Int32Array::from(self.year)),
            Granularity::Period => Arc::new(StringArray::from(self.period)),
        });
        columns.push(Arc::new(Int64Array::from(self.num_documents)));
        for col in self.floats {
            columns.push(Arc::new(Float64Array::from(col)));
        }
        match self.level {
            Level::Region | Level::Country => {
                columns.push(Arc::new(Int64Array::from(self.num_journals)));
                for col in self.coverage {
                    columns.push(Arc::new(Float64Array::from(col)));
                }
            }
            Level::Journal => {
                for col in self.flags {
                    columns.push(Arc::new(BooleanArray::from(col)));
                }
            }
        }
        RecordBatch::try_new(
            schema::metrics(self.level, self.granularity).clone(),
            columns,
        )
    }
}

// ---------------------------------------------------------------------------
// RecordBatch → records
// ---------------------------------------------------------------------------

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, ArrowError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| ArrowError::SchemaError(format!("column '{name}' missing or mistyped")))
}

#[derive(Clone, Copy)]
enum WindowColumn<'a> {
    Year(&'a Int32Array),
    Period(&'a StringArray),
}

/// Decode the rows of a cache batch
pub fn decode_batch(
    batch: &RecordBatch,
    level: Level,
    granularity: Granularity,
) -> Result<Vec<MetricRecord>, ArrowError> {
    let keys: &StringArray = column(batch, level.key_column())?;
    let docs: &Int64Array = column(batch, "num_documents")?;
    let floats = METRIC_COLUMNS
        .iter()
        .map(|name| column::<Float64Array>(batch, name))
        .collect::<Result<Vec<_>, _>>()?;

    let windows = match granularity {
        Granularity::Annual => WindowColumn::Year(column(batch, "year")?),
        Granularity::Period => WindowColumn::Period(column(batch, "period")?),
    };
    let (journals, coverage, flags) = match level {
        Level::Region | Level::Country => (
            Some(column::<Int64Array>(batch, COVERAGE_COLUMNS[0])?),
            COVERAGE_COLUMNS[1..]
                .iter()
                .map(|name| column::<Float64Array>(batch, name))
                .collect::<Result<Vec<_>, _>>()?,
            Vec::new(),
        ),
        Level::Journal => (
            None,
            Vec::new(),
            FLAG_COLUMNS
                .iter()
                .map(|name| column::<BooleanArray>(batch, name))
                .collect::<Result<Vec<_>, _>>()?,
        ),
    };

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let window = match windows {
            WindowColumn::Year(y) => Window::Annual(y.value(i)),
            WindowColumn::Period(p) => {
                Window::parse_period(p.value(i)).map_err(ArrowError::ParseError)?
            }
        };
        let f = |c: usize| floats[c].value(i);
        let metrics = PerformanceMetrics {
            num_documents: docs.value(i).max(0) as u64,
            fwci_avg: f(0),
            avg_percentile: f(1),
            pct_top_10: f(2),
            pct_top_1: f(3),
            oa: OaShares {
                gold: f(4),
                diamond: f(5),
                green: f(6),
                hybrid: f(7),
                bronze: f(8),
                closed: f(9),
            },
        };
        let indexing = match journals {
            Some(n) => Indexing::Coverage(IndexingCoverage {
                num_journals: n.value(i).max(0) as u64,
                pct_scopus: coverage[0].value(i),
                pct_core: coverage[1].value(i),
                pct_doaj: coverage[2].value(i),
            }),
            None => Indexing::Flags(IndexingFlags {
                is_scopus: flags[0].value(i),
                is_core: flags[1].value(i),
                is_doaj: flags[2].value(i),
            }),
        };
        out.push(MetricRecord {
            key: keys.value(i).to_string(),
            window,
            metrics,
            indexing,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Loaded cache table
// ---------------------------------------------------------------------------

/// A previously written cache table held in memory for merging
#[derive(Debug)]
pub struct CacheTable {
    level: Level,
    granularity: Granularity,
    batches: Vec<RecordBatch>,
    keys: FxHashSet<String>,
    rows: usize,
}

impl CacheTable {
    /// Read and validate a cache table; errors on unreadable files and
    /// schema mismatches.
    pub fn open(path: &Path, level: Level, granularity: Granularity) -> Result<Self> {
        let (actual, batches) =
            read_parquet(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let expected = schema::metrics(level, granularity);
        if !schema::matches(&actual, expected) {
            bail!("{}: schema does not match {level} {granularity} table", path.display());
        }

        let mut keys = FxHashSet::default();
        let mut rows = 0;
        for batch in &batches {
            rows += batch.num_rows();
            let col: &StringArray = column(batch, level.key_column())?;
            keys.extend(col.iter().flatten().map(str::to_string));
        }
        Ok(Self {
            level,
            granularity,
            batches,
            keys,
            rows,
        })
    }

    /// Like [`open`](Self::open), but a missing or invalid table is `None`.
    pub fn load(path: &Path, level: Level, granularity: Granularity) -> Option<Self> {
        if !path.exists() {
            log::debug!("No cache at {}", path.display());
            return None;
        }
        match Self::open(path, level, granularity) {
            Ok(t) => {
                log::debug!(
                    "Cache {}: {} rows, {} keys",
                    path.display(),
                    t.rows,
                    t.keys.len()
                );
                Some(t)
            }
            Err(e) => {
                log::warn!("Ignoring cache table: {e:#}");
                None
            }
        }
    }

    pub fn keys(&self) -> &FxHashSet<String> {
        &self.keys
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Batches restricted to the rows whose key satisfies `keep`
    pub fn retain_keys(&self, keep: impl Fn(&str) -> bool) -> Result<Vec<RecordBatch>, ArrowError> {
        let mut out = Vec::with_capacity(self.batches.len());
        for batch in &self.batches {
            let keys: &StringArray = column(batch, self.level.key_column())?;
            let mask: BooleanArray = keys.iter().map(|k| Some(k.is_some_and(&keep))).collect();
            let kept = filter_record_batch(batch, &mask)?;
            if kept.num_rows() > 0 {
                out.push(kept);
            }
        }
        Ok(out)
    }

    /// Every row decoded into records
    pub fn records(&self) -> Result<Vec<MetricRecord>, ArrowError> {
        let mut out = Vec::with_capacity(self.rows);
        for batch in &self.batches {
            out.extend(decode_batch(batch, self.level, self.granularity)?);
        }
        Ok(out)
    }
}

/// Write `kept` batches followed by the `fresh` records of `granularity`
/// to `path`, replacing it atomically.
///
/// Returns the number of rows written.
pub fn write_table(
    path: &Path,
    level: Level,
    granularity: Granularity,
    kept: &[RecordBatch],
    fresh: &[MetricRecord],
    zstd_level: i32,
) -> Result<usize> {
    let schema = schema::metrics(level, granularity);

    let mut acc = TableAccumulator::new(level, granularity);
    for r in fresh {
        acc.push(r);
    }
    let new_batch = acc
        .finish()
        .with_context(|| format!("Failed to build {level} {granularity} batch"))?;

    let mut sink = ParquetSink::create(path, schema, zstd_level)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for batch in kept {
        // Re-wrap under the canonical schema (field metadata may differ)
        let batch = RecordBatch::try_new(schema.clone(), batch.columns().to_vec())?;
        sink.write_batch(&batch)?;
    }
    if new_batch.num_rows() > 0 {
        sink.write_batch(&new_batch)?;
    }
    let rows = sink
        .finalize()
        .with_context(|| format!("Failed to finalize {}", path.display()))?;
    log::debug!("Wrote {} ({rows} rows)", path.display());
    Ok(rows)
}
