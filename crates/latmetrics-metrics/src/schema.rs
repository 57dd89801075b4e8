//! Arrow schemas of the six cache tables
//!
//! `metrics_{level}_{granularity}.parquet`: key column, window column, the
//! performance indicators, then level-dependent indexing columns.

use std::sync::{Arc, LazyLock};

use arrow::datatypes::{DataType, Field, Schema};

use crate::record::{Granularity, Level};

/// Float indicator columns shared by every table, after `num_documents`
pub const METRIC_COLUMNS: [&str; 10] = [
    "fwci_avg",
    "avg_percentile",
    "pct_top_10",
    "pct_top_1",
    "pct_oa_gold",
    "pct_oa_diamond",
    "pct_oa_green",
    "pct_oa_hybrid",
    "pct_oa_bronze",
    "pct_oa_closed",
];

pub const COVERAGE_COLUMNS: [&str; 4] = ["num_journals", "pct_scopus", "pct_core", "pct_doaj"];

pub const FLAG_COLUMNS: [&str; 3] = ["is_scopus", "is_core", "is_doaj"];

fn build(level: Level, granularity: Granularity) -> Arc<Schema> {
    let mut fields = vec![
        Field::new(level.key_column(), DataType::Utf8, false),
        match granularity {
            Granularity::Annual => Field::new("year", DataType::Int32, false),
            Granularity::Period => Field::new("period", DataType::Utf8, false), // "YYYY-YYYY"
        },
        Field::new("num_documents", DataType::Int64, false),
    ];
    for name in METRIC_COLUMNS {
        fields.push(Field::new(name, DataType::Float64, false));
    }
    match level {
        Level::Region | Level::Country => {
            fields.push(Field::new("num_journals", DataType::Int64, false));
            for name in &COVERAGE_COLUMNS[1..] {
                fields.push(Field::new(*name, DataType::Float64, false));
            }
        }
        Level::Journal => {
            for name in FLAG_COLUMNS {
                fields.push(Field::new(name, DataType::Boolean, false));
            }
        }
    }
    Arc::new(Schema::new(fields))
}

/// Schema of the `(level, granularity)` table
pub fn metrics(level: Level, granularity: Granularity) -> &'static Arc<Schema> {
    static SCHEMAS: LazyLock<Vec<Arc<Schema>>> = LazyLock::new(|| {
        Level::ALL
            .iter()
            .flat_map(|&l| Granularity::ALL.iter().map(move |&g| build(l, g)))
            .collect()
    });
    let slot = level as usize * Granularity::ALL.len() + granularity as usize;
    &SCHEMAS[slot]
}

/// Same column names and types, ignoring metadata and nullability
pub fn matches(actual: &Schema, expected: &Schema) -> bool {
    actual.fields().len() == expected.fields().len()
        && actual
            .fields()
            .iter()
            .zip(expected.fields().iter())
            .all(|(a, e)| a.name() == e.name() && a.data_type() == e.data_type())
}
