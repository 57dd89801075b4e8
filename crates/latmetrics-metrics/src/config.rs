//! Pipeline configuration

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, ensure};

use crate::record::Window;

/// Share of logical cores used by default
pub const DEFAULT_WORKER_FRACTION: f64 = 0.25;
/// Upper bound of the default worker count
pub const DEFAULT_MAX_WORKERS: usize = 8;
pub const DEFAULT_COUNTRY_BATCHES: usize = 4;
pub const DEFAULT_JOURNAL_BATCHES: usize = 20;
/// Recent window computed besides the full range
pub const DEFAULT_EXTRA_PERIOD: &str = "2021-2025";

/// `fraction` of the logical cores, capped at `max`, never below 1
pub fn default_workers(fraction: f64, max: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    ((cpus as f64 * fraction) as usize).min(max).max(1)
}

/// CLI-facing arguments for the compute command (plain struct, no clap derive).
#[derive(Debug, Clone)]
pub struct ComputeArgs {
    pub articles: PathBuf,
    pub journals: PathBuf,
    pub cache_dir: PathBuf,
    pub force: bool,
    pub verify: bool,
    pub workers: usize,
    pub country_batches: usize,
    pub journal_batches: usize,
    /// `YYYY-YYYY` labels
    pub periods: Vec<String>,
    pub key_timeout_secs: Option<f64>,
    pub max_retries: u32,
    pub zstd_level: i32,
}

/// Runtime configuration of a compute run
#[derive(Debug, Clone)]
pub struct Config {
    pub articles: PathBuf,
    pub journals: PathBuf,
    pub cache_dir: PathBuf,
    /// Ignore cached keys and recompute everything
    pub force: bool,
    /// Recompute cached keys whose input fingerprint changed
    pub verify: bool,
    pub workers: usize,
    pub country_batches: usize,
    pub journal_batches: usize,
    pub extra_periods: Vec<Window>,
    pub key_timeout: Option<Duration>,
    pub max_retries: u32,
    pub zstd_level: i32,
}

impl TryFrom<ComputeArgs> for Config {
    type Error = anyhow::Error;

    fn try_from(args: ComputeArgs) -> Result<Self, Self::Error> {
        ensure!(
            (1..=22).contains(&args.zstd_level),
            "zstd level must be within 1..=22, got {}",
            args.zstd_level
        );
        let extra_periods = args
            .periods
            .iter()
            .map(|p| Window::parse_period(p).map_err(anyhow::Error::msg))
            .collect::<anyhow::Result<Vec<_>>>()
            .context("Invalid --period")?;
        let key_timeout = match args.key_timeout_secs {
            Some(secs) => {
                ensure!(
                    secs.is_finite() && secs > 0.0,
                    "key timeout must be positive, got {secs}"
                );
                Some(Duration::from_secs_f64(secs))
            }
            None => None,
        };

        Ok(Self {
            articles: args.articles,
            journals: args.journals,
            cache_dir: args.cache_dir,
            force: args.force,
            verify: args.verify,
            workers: args.workers.max(1),
            country_batches: args.country_batches.max(1),
            journal_batches: args.journal_batches.max(1),
            extra_periods,
            key_timeout,
            max_retries: args.max_retries,
            zstd_level: args.zstd_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ComputeArgs {
        ComputeArgs {
            articles: "works.parquet".into(),
            journals: "journals.parquet".into(),
            cache_dir: "cache".into(),
            force: false,
            verify: false,
            workers: 0,
            country_batches: 0,
            journal_batches: DEFAULT_JOURNAL_BATCHES,
            periods: vec![DEFAULT_EXTRA_PERIOD.to_string()],
            key_timeout_secs: Some(2.5),
            max_retries: 1,
            zstd_level: 3,
        }
    }

    #[test]
    fn default_workers_bounds() {
        let n = default_workers(DEFAULT_WORKER_FRACTION, DEFAULT_MAX_WORKERS);
        assert!((1..=DEFAULT_MAX_WORKERS).contains(&n));
        assert_eq!(default_workers(0.0, 8), 1);
        assert_eq!(default_workers(1.0, 1), 1);
    }

    #[test]
    fn config_from_args() {
        let config = Config::try_from(args()).unwrap();
        assert_eq!(config.workers, 1);
        assert_eq!(config.country_batches, 1);
        assert_eq!(config.journal_batches, 20);
        assert_eq!(
            config.extra_periods,
            vec![Window::Period {
                start: 2021,
                end: 2025
            }]
        );
        assert_eq!(config.key_timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn invalid_args_rejected() {
        let mut a = args();
        a.periods = vec!["2025-2021".into()];
        assert!(Config::try_from(a).is_err());

        let mut a = args();
        a.key_timeout_secs = Some(0.0);
        assert!(Config::try_from(a).is_err());

        let mut a = args();
        a.zstd_level = 0;
        assert!(Config::try_from(a).is_err());
    }
}
