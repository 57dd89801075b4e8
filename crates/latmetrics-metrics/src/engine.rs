//! Batch-synchronous parallel dispatch of per-key work.
//!
//! Keys are split into sequential batches. Each batch runs on a fresh rayon
//! pool; every worker builds its context once through `init`, then claims
//! keys from a shared atomic cursor until the batch is drained. The pool and
//! the worker contexts are dropped before the next batch starts.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use anyhow::{Context, Result};

use latmetrics_core::{ProgressContext, fmt_num, is_shutdown_requested};

use crate::error::{KeyError, panic_message};
use crate::record::Level;
use crate::retry::retry_with_backoff;

/// Dispatch settings for one level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub workers: usize,
    pub batches: usize,
    pub max_retries: u32,
}

/// A key whose computation failed after all retries
#[derive(Debug, Clone, PartialEq)]
pub struct KeyFailure {
    pub level: Level,
    pub error: KeyError,
}

impl KeyFailure {
    pub fn key(&self) -> &str {
        self.error.key()
    }
}

/// Results of every batch that ran
#[derive(Debug)]
pub struct EngineOutput<T> {
    pub completed: Vec<T>,
    pub failures: Vec<KeyFailure>,
    pub batches_run: usize,
    /// Shutdown was requested before every key was claimed
    pub interrupted: bool,
}

/// Keys per batch so that `keys` splits into at most `batches` batches
pub fn batch_size(keys: usize, batches: usize) -> usize {
    keys.div_ceil(batches.max(1)).max(1)
}

/// Compute every key, `config.batches` batches in sequence.
///
/// A failing key (error, panic, timeout) is recorded in
/// [`EngineOutput::failures`] and does not affect its siblings. After a
/// panic the worker rebuilds its context before claiming the next key.
pub fn run_batches<C, T>(
    level: Level,
    keys: &[String],
    config: &EngineConfig,
    progress: &ProgressContext,
    init: impl Fn() -> C + Sync,
    task: impl Fn(&mut C, &str) -> Result<T, KeyError> + Sync,
) -> Result<EngineOutput<T>>
where
    T: Send,
{
    let mut out = EngineOutput {
        completed: Vec::with_capacity(keys.len()),
        failures: Vec::new(),
        batches_run: 0,
        interrupted: false,
    };
    if keys.is_empty() {
        return Ok(out);
    }

    let size = batch_size(keys.len(), config.batches);
    let total = keys.len().div_ceil(size);

    for (b, batch) in keys.chunks(size).enumerate() {
        if is_shutdown_requested() {
            log::warn!("{level}: shutdown requested, skipping {} remaining batches", total - b);
            out.interrupted = true;
            break;
        }

        let start = Instant::now();
        let workers = config.workers.clamp(1, batch.len());
        log::info!(
            "{level} batch {}/{total}: {} keys on {workers} workers",
            b + 1,
            fmt_num(batch.len())
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(move |i| format!("{level}-worker-{i}"))
            .build()
            .context("Failed to create thread pool")?;

        let pb = progress.key_bar(&format!("{level} {}/{total}", b + 1), batch.len());
        let next_idx = AtomicUsize::new(0);
        let done: Mutex<Vec<T>> = Mutex::new(Vec::with_capacity(batch.len()));
        let failed: Mutex<Vec<KeyFailure>> = Mutex::new(Vec::new());

        pool.scope(|s| {
            for _ in 0..workers {
                s.spawn(|_| {
                    let mut ctx = init();
                    loop {
                        if is_shutdown_requested() {
                            break;
                        }
                        // Atomically claim the next key
                        let idx = next_idx.fetch_add(1, Ordering::SeqCst);
                        let Some(key) = batch.get(idx) else {
                            break;
                        };

                        let result = retry_with_backoff(key, config.max_retries, || {
                            let attempt =
                                panic::catch_unwind(AssertUnwindSafe(|| task(&mut ctx, key)));
                            match attempt {
                                Ok(r) => r,
                                Err(payload) => {
                                    ctx = init();
                                    Err(KeyError::Panic {
                                        key: key.clone(),
                                        message: panic_message(payload.as_ref()),
                                    })
                                }
                            }
                        });

                        match result {
                            Ok(v) => done.lock().unwrap_or_else(PoisonError::into_inner).push(v),
                            Err(error) => failed
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .push(KeyFailure { level, error }),
                        }
                        pb.inc(1);
                    }
                });
            }
        });
        drop(pool);
        pb.finish_and_clear();

        let done = done.into_inner().unwrap_or_else(PoisonError::into_inner);
        let failed = failed.into_inner().unwrap_or_else(PoisonError::into_inner);
        log::info!(
            "{level} batch {}/{total}: {} done, {} failed in {:.1}s",
            b + 1,
            fmt_num(done.len()),
            failed.len(),
            start.elapsed().as_secs_f64()
        );

        out.batches_run += 1;
        let claimed = done.len() + failed.len();
        out.completed.extend(done);
        out.failures.extend(failed);

        if claimed < batch.len() {
            log::warn!(
                "{level}: interrupted with {} keys unclaimed in batch {}",
                batch.len() - claimed,
                b + 1
            );
            out.interrupted = true;
            break;
        }
    }

    Ok(out)
}
