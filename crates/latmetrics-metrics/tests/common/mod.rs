//! Shared fixtures: parquet inputs written into a temp directory

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{BooleanArray, Float64Array, Int32Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use latmetrics_core::ParquetSink;
use latmetrics_metrics::Config;
use latmetrics_metrics::record::Window;

pub struct Work {
    pub id: &'static str,
    pub year: Option<i32>,
    pub journal: &'static str,
    pub fwci: Option<f64>,
    pub top_10: bool,
    pub oa: Option<&'static str>,
}

pub fn work(id: &'static str, year: i32, journal: &'static str, fwci: f64) -> Work {
    Work {
        id,
        year: Some(year),
        journal,
        fwci: Some(fwci),
        top_10: false,
        oa: Some("gold"),
    }
}

pub fn write_works(path: &Path, works: &[Work]) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("publication_year", DataType::Int32, true),
        Field::new("journal_id", DataType::Utf8, true),
        Field::new("fwci", DataType::Float64, true),
        Field::new("citation_normalized_percentile", DataType::Float64, true),
        Field::new("is_in_top_10_percent", DataType::Boolean, true),
        Field::new("is_in_top_1_percent", DataType::Boolean, true),
        Field::new("oa_status", DataType::Utf8, true),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from_iter_values(works.iter().map(|w| w.id))),
            Arc::new(Int32Array::from_iter(works.iter().map(|w| w.year))),
            Arc::new(StringArray::from_iter_values(works.iter().map(|w| w.journal))),
            Arc::new(Float64Array::from_iter(works.iter().map(|w| w.fwci))),
            Arc::new(Float64Array::from_iter(works.iter().map(|_| Some(50.0)))),
            Arc::new(BooleanArray::from_iter(works.iter().map(|w| Some(w.top_10)))),
            Arc::new(BooleanArray::from_iter(works.iter().map(|_| None::<bool>))),
            Arc::new(StringArray::from_iter(works.iter().map(|w| w.oa))),
        ],
    )
    .unwrap();
    let mut sink = ParquetSink::create(path, &schema, 1).unwrap();
    sink.write_batch(&batch).unwrap();
    sink.finalize().unwrap();
}

/// `(id, country_code, is_indexed_in_scopus)`
pub fn write_journals(path: &Path, journals: &[(&str, &str, bool)]) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("country_code", DataType::Utf8, true),
        Field::new("is_indexed_in_scopus", DataType::Boolean, true),
        Field::new("is_core", DataType::Boolean, true),
        Field::new("is_in_doaj", DataType::Boolean, true),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from_iter_values(journals.iter().map(|j| j.0))),
            Arc::new(StringArray::from_iter_values(journals.iter().map(|j| j.1))),
            Arc::new(BooleanArray::from_iter(journals.iter().map(|j| Some(j.2)))),
            Arc::new(BooleanArray::from_iter(journals.iter().map(|_| Some(false)))),
            Arc::new(BooleanArray::from_iter(journals.iter().map(|_| None::<bool>))),
        ],
    )
    .unwrap();
    let mut sink = ParquetSink::create(path, &schema, 1).unwrap();
    sink.write_batch(&batch).unwrap();
    sink.finalize().unwrap();
}

pub fn config(dir: &Path) -> Config {
    Config {
        articles: dir.join("works.parquet"),
        journals: dir.join("journals.parquet"),
        cache_dir: dir.join("cache"),
        force: false,
        verify: false,
        workers: 2,
        country_batches: 2,
        journal_batches: 3,
        extra_periods: vec![Window::Period {
            start: 2021,
            end: 2025,
        }],
        key_timeout: None,
        max_retries: 0,
        zstd_level: 3,
    }
}

pub fn cache_file(config: &Config, name: &str) -> PathBuf {
    config.cache_dir.join(name)
}
