//! Latmetrics Core - Shared infrastructure for the metrics pipeline
//!
//! Logging, progress reporting, graceful shutdown, atomic Parquet output
//! and content hashing used by the aggregation crates and the CLI.

pub mod hash;
pub mod logging;
pub mod progress;
pub mod shutdown;
pub mod sink;

// Re-exports for convenience
pub use hash::{Fingerprinter, short_hash};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use shutdown::{install_signal_handlers, is_shutdown_requested, request_shutdown};
pub use sink::{ParquetSink, cleanup_tmp_files, is_valid_parquet, read_parquet, tmp_path_for};
