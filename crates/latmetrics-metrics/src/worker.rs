//! Per-worker computation context

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::MetricRecord;
use crate::error::KeyError;
use crate::formula::{Indexing, IndexingCoverage, IndexingFlags, MetricsAccumulator};
use crate::partition::WindowPlan;
use crate::record::{Article, Level, Window};
use crate::store::RecordStore;

/// Articles scanned between two budget checks
const DEADLINE_STRIDE: usize = 4096;

/// Every record computed for one key (annual and period windows)
#[derive(Debug, Clone, PartialEq)]
pub struct KeyOutput {
    pub key: String,
    pub records: Vec<MetricRecord>,
}

/// State a worker builds once and reuses for every key it claims.
///
/// Holds the shared store and one accumulator per window, reset between keys.
pub struct WorkerContext {
    store: Arc<RecordStore>,
    windows: Arc<WindowPlan>,
    budget: Option<Duration>,
    annual: Vec<MetricsAccumulator>,
    periods: Vec<MetricsAccumulator>,
}

impl WorkerContext {
    pub fn new(store: Arc<RecordStore>, windows: Arc<WindowPlan>, budget: Option<Duration>) -> Self {
        let annual = vec![MetricsAccumulator::default(); windows.num_years()];
        let periods = vec![MetricsAccumulator::default(); windows.periods().len()];
        Self {
            store,
            windows,
            budget,
            annual,
            periods,
        }
    }

    /// Compute every window of `key` at `level`.
    ///
    /// Keys without articles produce zero-valued records.
    pub fn compute(&mut self, level: Level, key: &str) -> Result<KeyOutput, KeyError> {
        let started = Instant::now();
        self.reset();

        let store = Arc::clone(&self.store);
        let indexing = match level {
            Level::Region => {
                self.scan(key, started, store.articles())?;
                Indexing::Coverage(IndexingCoverage::from_journals(store.journals()))
            }
            Level::Country => {
                let journals = store.journals_of_country(key).ok_or_else(|| unknown(level, key))?;
                let coverage = IndexingCoverage::from_journals(journals);
                self.scan(key, started, store.articles_of_country(key))?;
                Indexing::Coverage(coverage)
            }
            Level::Journal => {
                let journal = store.journal(key).ok_or_else(|| unknown(level, key))?;
                self.scan(key, started, store.articles_of_journal(key))?;
                Indexing::Flags(IndexingFlags::from_journal(journal))
            }
        };

        let windows = Arc::clone(&self.windows);
        let cells = windows
            .annual()
            .zip(&self.annual)
            .chain(windows.periods().iter().copied().zip(&self.periods));

        let mut records = Vec::with_capacity(windows.len());
        for (window, acc) in cells {
            self.check_deadline(key, window, started)?;
            let metrics = acc.finish();
            metrics.check().map_err(|detail| KeyError::Invariant {
                key: key.to_string(),
                window: window.to_string(),
                detail,
            })?;
            records.push(MetricRecord {
                key: key.to_string(),
                window,
                metrics,
                indexing,
            });
        }

        Ok(KeyOutput {
            key: key.to_string(),
            records,
        })
    }

    fn reset(&mut self) {
        self.annual.fill(MetricsAccumulator::default());
        self.periods.fill(MetricsAccumulator::default());
    }

    /// Single pass over the partition, feeding every window the article falls in.
    /// Articles without a year belong to no window.
    fn scan<'a>(
        &mut self,
        key: &str,
        started: Instant,
        articles: impl IntoIterator<Item = &'a Article>,
    ) -> Result<(), KeyError> {
        let windows = Arc::clone(&self.windows);
        for (i, a) in articles.into_iter().enumerate() {
            if i % DEADLINE_STRIDE == DEADLINE_STRIDE - 1 {
                if let Some(&full) = windows.periods().first() {
                    self.check_deadline(key, full, started)?;
                }
            }
            let Some(year) = a.publication_year else {
                continue;
            };
            if let Some(slot) = windows.year_slot(year) {
                self.annual[slot].push(a);
            }
            for (acc, w) in self.periods.iter_mut().zip(windows.periods()) {
                if w.contains(year) {
                    acc.push(a);
                }
            }
        }
        Ok(())
    }

    fn check_deadline(&self, key: &str, window: Window, started: Instant) -> Result<(), KeyError> {
        match self.budget {
            Some(budget) if started.elapsed() > budget => Err(KeyError::Timeout {
                key: key.to_string(),
                window: window.to_string(),
                budget,
            }),
            _ => Ok(()),
        }
    }
}

fn unknown(level: Level, key: &str) -> KeyError {
    KeyError::UnknownKey {
        level,
        key: key.to_string(),
    }
}
