//! Compute run: load, enumerate, reconcile, compute, merge, write

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;

use latmetrics_core::{
    ProgressContext, cleanup_tmp_files, fmt_num, is_shutdown_requested, short_hash,
};

use crate::cache::{CacheTable, MetricRecord, cache_path, write_table};
use crate::config::Config;
use crate::engine::{EngineConfig, KeyFailure, run_batches};
use crate::fingerprint::{FingerprintFile, changed_keys, fingerprints};
use crate::partition::{Partitions, WindowPlan};
use crate::reconcile::{cached_keys, reconcile};
use crate::record::{Granularity, Level};
use crate::stats::{LevelStats, RunReport, RunSummary};
use crate::store::RecordStore;
use crate::worker::WorkerContext;

/// Main entry point for the compute command
pub fn run(config: &Config, progress: &ProgressContext) -> Result<RunSummary> {
    let start = Instant::now();
    std::fs::create_dir_all(&config.cache_dir).with_context(|| {
        format!(
            "Cannot create cache directory {}",
            config.cache_dir.display()
        )
    })?;
    cleanup_tmp_files(&config.cache_dir).context("Failed to clean stale tmp files")?;

    log::info!(
        "latmetrics starting: mode={}, verify={}, workers={}, batches={}/{}",
        if config.force { "force" } else { "incremental" },
        config.verify,
        config.workers,
        config.country_batches,
        config.journal_batches
    );

    let stage = progress.stage_line("load");
    stage.set_message(format!("reading {}", config.articles.display()));
    let store = Arc::new(RecordStore::load(&config.articles, &config.journals)?);
    stage.finish_and_clear();

    let partitions = Partitions::enumerate(&store, &config.extra_periods);
    let windows = Arc::new(partitions.windows.clone());
    log::info!(
        "{} countries, {} journals, {} windows per key",
        partitions.countries.len(),
        fmt_num(partitions.journals.len()),
        windows.len()
    );

    let mut summary = RunSummary {
        force: config.force,
        verify: config.verify,
        articles: store.stats().articles,
        journals: store.stats().journals,
        ..RunSummary::empty()
    };

    for level in Level::ALL {
        if is_shutdown_requested() {
            summary.interrupted = true;
            break;
        }
        let level_run = LevelRun {
            level,
            config,
            store: &store,
            windows: &windows,
            partitions: &partitions,
        };
        let outcome = level_run.run(progress)?;
        outcome.stats.log();
        summary.levels.push(outcome.stats);
        summary.failures.extend(outcome.failures);
        if outcome.interrupted {
            summary.interrupted = true;
            break;
        }
    }

    summary.elapsed = start.elapsed();
    let report_path = RunReport::path(&config.cache_dir);
    summary.report().save(&report_path)?;
    log::debug!("Run report written to {}", report_path.display());
    Ok(summary)
}

struct LevelOutcome {
    stats: LevelStats,
    failures: Vec<KeyFailure>,
    interrupted: bool,
}

/// Everything one level needs from the run
struct LevelRun<'a> {
    level: Level,
    config: &'a Config,
    store: &'a Arc<RecordStore>,
    windows: &'a Arc<WindowPlan>,
    partitions: &'a Partitions,
}

impl LevelRun<'_> {
    fn engine_config(&self) -> EngineConfig {
        let (workers, batches) = match self.level {
            // a single key
            Level::Region => (1, 1),
            Level::Country => (self.config.workers, self.config.country_batches),
            Level::Journal => (self.config.workers, self.config.journal_batches),
        };
        EngineConfig {
            workers,
            batches,
            max_retries: self.config.max_retries,
        }
    }

    fn run(&self, progress: &ProgressContext) -> Result<LevelOutcome> {
        let start = Instant::now();
        let level = self.level;
        let config = self.config;
        let keys = self.partitions.keys(level);
        let mut stats = LevelStats::new(level);
        stats.keys = keys.len();

        let annual_path = cache_path(&config.cache_dir, level, Granularity::Annual);
        let period_path = cache_path(&config.cache_dir, level, Granularity::Period);
        let annual = CacheTable::load(&annual_path, level, Granularity::Annual);
        let period = CacheTable::load(&period_path, level, Granularity::Period);

        // The region level is always recomputed in full
        let force = config.force || level == Level::Region;
        let cached = cached_keys(annual.as_ref(), period.as_ref());

        let verify = config.verify && level != Level::Region;
        let fp_path = FingerprintFile::path(&config.cache_dir, level);
        let current_fp = if verify {
            Some(fingerprints(self.store, level, &keys, config.workers)?)
        } else {
            None
        };
        let changed = current_fp.as_ref().map(|current| {
            let stored = FingerprintFile::load(&fp_path);
            let changed = changed_keys(current, &stored.entries);
            for (key, hash) in current.iter().filter(|(k, _)| changed.contains(*k)) {
                if let Some(old) = stored.entries.get(key) {
                    log::debug!(
                        "{level} {key}: content changed ({} -> {})",
                        short_hash(old),
                        short_hash(hash)
                    );
                }
            }
            changed
        });

        let plan = reconcile(&keys, cached.as_ref(), changed.as_ref(), force);
        stats.cached = plan.cached;
        stats.changed = plan.changed;
        log::info!(
            "{level}: {} keys, {} cached, {} to compute{}",
            fmt_num(keys.len()),
            fmt_num(plan.cached),
            fmt_num(plan.pending.len()),
            if plan.changed > 0 {
                format!(" ({} changed)", plan.changed)
            } else {
                String::new()
            }
        );

        let store = self.store;
        let windows = self.windows;
        let budget = config.key_timeout;
        let out = run_batches(
            level,
            &plan.pending,
            &self.engine_config(),
            progress,
            || WorkerContext::new(Arc::clone(store), Arc::clone(windows), budget),
            |ctx, key| ctx.compute(level, key),
        )?;

        let mut completed = out.completed;
        completed.sort_by(|a, b| a.key.cmp(&b.key));
        stats.computed = completed.len();
        stats.failed = out.failures.len();

        let recomputed: FxHashSet<String> = completed.iter().map(|o| o.key.clone()).collect();
        let enumerated: FxHashSet<&str> = keys.iter().map(String::as_str).collect();
        let records: Vec<MetricRecord> = completed.into_iter().flat_map(|o| o.records).collect();

        // Cached rows survive unless their key was recomputed. A forced run
        // also drops keys that are no longer enumerated; failed keys keep
        // their previous rows.
        let keep = |k: &str| !recomputed.contains(k) && (!force || enumerated.contains(k));

        for (granularity, table, path) in [
            (Granularity::Annual, annual.as_ref(), &annual_path),
            (Granularity::Period, period.as_ref(), &period_path),
        ] {
            let kept = match table {
                Some(t) => t.retain_keys(&keep)?,
                None => Vec::new(),
            };
            let kept_rows: usize = kept.iter().map(|b| b.num_rows()).sum();
            let fresh_rows = records
                .iter()
                .filter(|r| r.window.granularity() == granularity)
                .count();

            let unchanged = table.is_some_and(|t| fresh_rows == 0 && kept_rows == t.rows());
            let rows = if unchanged {
                log::debug!("{level} {granularity}: cache unchanged");
                kept_rows
            } else {
                write_table(path, level, granularity, &kept, &records, config.zstd_level)?
            };
            match granularity {
                Granularity::Annual => stats.annual_rows = rows,
                Granularity::Period => stats.period_rows = rows,
            }
        }

        if let Some(current) = current_fp {
            // Pending keys that did not complete get no fingerprint, so the
            // next verified run retries them.
            let pending: FxHashSet<&str> = plan.pending.iter().map(String::as_str).collect();
            let entries = current
                .into_iter()
                .filter(|(k, _)| recomputed.contains(k) || !pending.contains(k.as_str()))
                .collect();
            FingerprintFile {
                level: level.name().to_string(),
                updated_at: Some(chrono::Utc::now()),
                entries,
            }
            .save(&fp_path)?;
        }

        stats.elapsed = start.elapsed();
        Ok(LevelOutcome {
            stats,
            failures: out.failures,
            interrupted: out.interrupted,
        })
    }
}
