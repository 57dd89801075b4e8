use std::sync::Arc;

use arrow::array::{Float64Array, Int32Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use latmetrics_core::ParquetSink;

fn synthetic_batch(n: usize) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("journal_id", DataType::Utf8, false),
        Field::new("year", DataType::Int32, false),
        Field::new("fwci_avg", DataType::Float64, false),
    ]));
    let ids = StringArray::from((0..n).map(|i| format!("S{i}")).collect::<Vec<_>>());
    let years = Int32Array::from((0..n).map(|i| 2000 + (i % 25) as i32).collect::<Vec<_>>());
    let fwci = Float64Array::from((0..n).map(|i| (i % 300) as f64 / 100.0).collect::<Vec<_>>());
    RecordBatch::try_new(schema, vec![Arc::new(ids), Arc::new(years), Arc::new(fwci)]).unwrap()
}

#[divan::bench(args = [1, 3, 6])]
fn metrics_table_write(bencher: divan::Bencher, zstd_level: i32) {
    let batch = synthetic_batch(50_000);
    let schema = batch.schema();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics_journal_annual.parquet");
    bencher.bench(|| {
        let mut sink = ParquetSink::create(&path, schema.as_ref(), zstd_level).unwrap();
        sink.write_batch(&batch).unwrap();
        sink.finalize().unwrap();
    });
}

fn main() {
    divan::main();
}
