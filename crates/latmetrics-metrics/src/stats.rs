//! Run statistics, summary table and the `last_run.json` report

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use serde::Serialize;

use latmetrics_core::{fmt_num, tmp_path_for};

use crate::engine::KeyFailure;
use crate::record::Level;

/// Per-level counters
#[derive(Debug, Clone, PartialEq)]
pub struct LevelStats {
    pub level: Level,
    /// Enumerated keys
    pub keys: usize,
    /// Keys reused from the cache
    pub cached: usize,
    /// Cached keys recomputed because their fingerprint changed
    pub changed: usize,
    pub computed: usize,
    pub failed: usize,
    pub annual_rows: usize,
    pub period_rows: usize,
    pub elapsed: Duration,
}

impl LevelStats {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            keys: 0,
            cached: 0,
            changed: 0,
            computed: 0,
            failed: 0,
            annual_rows: 0,
            period_rows: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn log(&self) {
        log::info!(
            "{}: {} keys, {} cached, {} computed, {} failed [{:.1}s]",
            self.level,
            fmt_num(self.keys),
            fmt_num(self.cached),
            fmt_num(self.computed),
            self.failed,
            self.elapsed.as_secs_f64()
        );
    }
}

/// Outcome of a whole compute run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub force: bool,
    pub verify: bool,
    pub articles: usize,
    pub journals: usize,
    pub levels: Vec<LevelStats>,
    pub failures: Vec<KeyFailure>,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn empty() -> Self {
        Self {
            force: false,
            verify: false,
            articles: 0,
            journals: 0,
            levels: Vec::new(),
            failures: Vec::new(),
            interrupted: false,
            elapsed: Duration::ZERO,
        }
    }

    pub fn computed(&self) -> usize {
        self.levels.iter().map(|l| l.computed).sum()
    }

    pub fn cached(&self) -> usize {
        self.levels.iter().map(|l| l.cached).sum()
    }

    /// 130 when interrupted, 1 when any key failed, 0 otherwise
    pub fn exit_code(&self) -> ExitCode {
        if self.interrupted {
            ExitCode::from(130)
        } else if !self.failures.is_empty() {
            ExitCode::from(1)
        } else {
            ExitCode::SUCCESS
        }
    }

    /// Format summary table as a string.
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Level")
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Keys").fg(Color::Cyan),
                Cell::new("Cached").fg(Color::Cyan),
                Cell::new("Computed").fg(Color::Cyan),
                Cell::new("Failed").fg(Color::Cyan),
                Cell::new("Rows (annual/period)").fg(Color::Cyan),
                Cell::new("Time").fg(Color::Cyan),
            ]);

        for l in &self.levels {
            let failed = Cell::new(l.failed);
            table.add_row(vec![
                Cell::new(l.level),
                Cell::new(fmt_num(l.keys)),
                Cell::new(fmt_num(l.cached)),
                Cell::new(fmt_num(l.computed)).fg(Color::Green),
                if l.failed > 0 { failed.fg(Color::Red) } else { failed },
                Cell::new(format!(
                    "{} / {}",
                    fmt_num(l.annual_rows),
                    fmt_num(l.period_rows)
                )),
                Cell::new(format!("{:.1}s", l.elapsed.as_secs_f64())),
            ]);
        }

        let mut out = format!("\n{table}");
        if !self.failures.is_empty() {
            out.push_str("\nFailed keys:");
            for f in &self.failures {
                out.push_str(&format!("\n  [{}] {}", f.level, f.error));
            }
        }
        if self.interrupted {
            out.push_str("\nInterrupted: rerun to compute the remaining keys");
        }
        out
    }

    /// Log minimal summary (non-TTY mode).
    pub fn log(&self) {
        log::info!("=== Run Summary ===");
        for l in &self.levels {
            l.log();
        }
        for f in &self.failures {
            log::error!("Failed [{}] {}", f.level, f.error);
        }
        log::info!(
            "Keys: {} computed, {} cached, {} failed in {:.1}s",
            fmt_num(self.computed()),
            fmt_num(self.cached()),
            self.failures.len(),
            self.elapsed.as_secs_f64()
        );
        if self.interrupted {
            log::warn!("Run interrupted, completed keys were saved");
        }
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            finished_at: Utc::now(),
            mode: if self.force { "force" } else { "incremental" },
            verify: self.verify,
            interrupted: self.interrupted,
            elapsed_secs: self.elapsed.as_secs_f64(),
            articles: self.articles,
            journals: self.journals,
            levels: self
                .levels
                .iter()
                .map(|l| LevelReport {
                    level: l.level.name(),
                    keys: l.keys,
                    cached: l.cached,
                    changed: l.changed,
                    computed: l.computed,
                    failed: l.failed,
                    annual_rows: l.annual_rows,
                    period_rows: l.period_rows,
                })
                .collect(),
            failed_keys: self
                .failures
                .iter()
                .map(|f| FailedKey {
                    level: f.level.name(),
                    key: f.key().to_string(),
                    kind: f.error.kind(),
                    error: f.error.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LevelReport {
    pub level: &'static str,
    pub keys: usize,
    pub cached: usize,
    pub changed: usize,
    pub computed: usize,
    pub failed: usize,
    pub annual_rows: usize,
    pub period_rows: usize,
}

#[derive(Debug, Serialize)]
pub struct FailedKey {
    pub level: &'static str,
    pub key: String,
    pub kind: &'static str,
    pub error: String,
}

/// Machine-readable record of the last run
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub finished_at: DateTime<Utc>,
    pub mode: &'static str,
    pub verify: bool,
    pub interrupted: bool,
    pub elapsed_secs: f64,
    pub articles: usize,
    pub journals: usize,
    pub levels: Vec<LevelReport>,
    pub failed_keys: Vec<FailedKey>,
}

impl RunReport {
    pub fn path(cache_dir: &Path) -> PathBuf {
        cache_dir.join("last_run.json")
    }

    /// Write atomically (tmp + rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = tmp_path_for(path);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}
