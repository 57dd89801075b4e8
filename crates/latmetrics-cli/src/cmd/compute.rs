//! Compute subcommand - build or update the metrics cache

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use latmetrics_core::SharedProgress;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct ComputeArgs {
    /// Recompute every key, ignoring cached results
    #[arg(long)]
    pub force: bool,

    /// Number of parallel workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Number of sequential batches per level (country and journal)
    #[arg(short, long)]
    pub batches: Option<usize>,

    /// Recompute cached keys whose input rows changed (content fingerprints)
    #[arg(long)]
    pub verify: bool,

    /// Extra period window, repeatable (replaces configured periods)
    #[arg(long = "period", value_name = "YYYY-YYYY")]
    pub periods: Vec<String>,

    /// Article (works) parquet table
    #[arg(long)]
    pub articles: Option<PathBuf>,

    /// Journal parquet table
    #[arg(long)]
    pub journals: Option<PathBuf>,

    /// Cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Per-key wall-clock budget in seconds
    #[arg(long, value_name = "SECS")]
    pub key_timeout: Option<f64>,

    /// Retries for timed-out or panicked keys
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Zstd compression level (1-22)
    #[arg(short, long)]
    pub zstd_level: Option<i32>,
}

pub fn run(args: ComputeArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let periods = if args.periods.is_empty() {
        config.compute.periods.clone()
    } else {
        args.periods
    };

    let compute_args = latmetrics_metrics::ComputeArgs {
        articles: args.articles.unwrap_or_else(|| config.data.articles.clone()),
        journals: args.journals.unwrap_or_else(|| config.data.journals.clone()),
        cache_dir: args.cache_dir.unwrap_or_else(|| config.cache.dir.clone()),
        force: args.force,
        verify: args.verify || config.compute.verify,
        workers: args.workers.unwrap_or_else(|| config.workers.resolve()),
        country_batches: args.batches.unwrap_or(config.compute.country_batches),
        journal_batches: args.batches.unwrap_or(config.compute.journal_batches),
        periods,
        key_timeout_secs: args.key_timeout.or(config.compute.key_timeout_secs),
        max_retries: args.max_retries.unwrap_or(config.compute.max_retries),
        zstd_level: args.zstd_level.unwrap_or(config.cache.compression_level),
    };

    log::info!("Computing metrics");
    log::info!("  Articles: {}", compute_args.articles.display());
    log::info!("  Journals: {}", compute_args.journals.display());
    log::info!("  Cache: {}", compute_args.cache_dir.display());

    let metrics_config = latmetrics_metrics::Config::try_from(compute_args)?;
    let summary = latmetrics_metrics::run(&metrics_config, progress)?;

    if progress.is_tty() {
        progress.println(summary.format_table());
    } else {
        summary.log();
    }

    let code = summary.exit_code();
    if summary.interrupted {
        log::warn!("Interrupted, completed keys were saved; rerun to continue");
    } else if !summary.failures.is_empty() {
        log::error!("{} keys failed", summary.failures.len());
    }
    Ok(code)
}
