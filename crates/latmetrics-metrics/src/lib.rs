//! Latmetrics Metrics - Incremental bibliometric aggregation
//!
//! Computes citation-impact, open-access and indexing indicators for Latin
//! American journals at region, country and journal level, per year and per
//! multi-year period, and keeps them in six Parquet cache tables.
//!
//! # Example
//!
//! ```no_run
//! use latmetrics_core::ProgressContext;
//! use latmetrics_metrics::{ComputeArgs, Config, run};
//!
//! let config = Config::try_from(ComputeArgs {
//!     articles: "data/works.parquet".into(),
//!     journals: "data/journals.parquet".into(),
//!     cache_dir: "cache".into(),
//!     force: false,
//!     verify: false,
//!     workers: 4,
//!     country_batches: 4,
//!     journal_batches: 20,
//!     periods: vec!["2021-2025".into()],
//!     key_timeout_secs: None,
//!     max_retries: 1,
//!     zstd_level: 3,
//! })
//! .expect("invalid configuration");
//!
//! let summary = run(&config, &ProgressContext::new()).expect("Pipeline failed");
//! println!("Computed {} keys", summary.computed());
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod formula;
pub mod partition;
pub mod reconcile;
pub mod record;
pub mod retry;
pub mod runner;
pub mod schema;
pub mod stats;
pub mod store;
pub mod worker;

// Re-exports for convenience
pub use cache::{CacheTable, MetricRecord, cache_path};
pub use config::{ComputeArgs, Config};
pub use error::KeyError;
pub use formula::{Indexing, PerformanceMetrics};
pub use record::{Granularity, Level, REGION_KEY, Window};
pub use runner::run;
pub use stats::RunSummary;
pub use store::RecordStore;
