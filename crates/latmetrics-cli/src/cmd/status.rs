//! Status subcommand - inspect the metrics cache

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use latmetrics_core::{fmt_num, is_valid_parquet};
use latmetrics_metrics::{CacheTable, Granularity, Level, cache_path};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Cache directory (default: from config)
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, PartialEq)]
enum TableState {
    Missing,
    Invalid(String),
    Valid { rows: usize, keys: usize, bytes: u64 },
}

/// State of every cache table, in level then granularity order
fn table_states(dir: &Path) -> Vec<(String, TableState)> {
    let mut out = Vec::new();
    for level in Level::ALL {
        for granularity in Granularity::ALL {
            let path = cache_path(dir, level, granularity);
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let state = if !path.exists() {
                TableState::Missing
            } else if !is_valid_parquet(&path) {
                TableState::Invalid(format!("{}: not a complete parquet file", path.display()))
            } else {
                match CacheTable::open(&path, level, granularity) {
                    Ok(t) => TableState::Valid {
                        rows: t.rows(),
                        keys: t.keys().len(),
                        bytes: std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0),
                    },
                    Err(e) => TableState::Invalid(format!("{e:#}")),
                }
            };
            out.push((name, state));
        }
    }
    out
}

/// Leftovers of interrupted writes
fn stale_tmp_files(dir: &Path) -> Vec<PathBuf> {
    let pattern = dir.join("*.tmp");
    glob::glob(&pattern.to_string_lossy())
        .map(|paths| paths.flatten().collect())
        .unwrap_or_default()
}

fn fmt_bytes(bytes: u64) -> String {
    match bytes {
        b if b >= 1 << 30 => format!("{:.1} GiB", b as f64 / (1u64 << 30) as f64),
        b if b >= 1 << 20 => format!("{:.1} MiB", b as f64 / (1u64 << 20) as f64),
        b if b >= 1 << 10 => format!("{:.1} KiB", b as f64 / (1u64 << 10) as f64),
        b => format!("{b} B"),
    }
}

pub fn run(args: StatusArgs, config: &Config) -> Result<()> {
    let dir = args.cache_dir.unwrap_or_else(|| config.cache.dir.clone());

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Table").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
            Cell::new("Rows").fg(Color::Cyan),
            Cell::new("Keys").fg(Color::Cyan),
            Cell::new("Size").fg(Color::Cyan),
        ]);

    for (name, state) in table_states(&dir) {
        let row = match state {
            TableState::Missing => vec![
                Cell::new(name),
                Cell::new("missing").fg(Color::Yellow),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
            ],
            TableState::Invalid(reason) => {
                log::warn!("{reason}");
                vec![
                    Cell::new(name),
                    Cell::new("invalid").fg(Color::Red),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                ]
            }
            TableState::Valid { rows, keys, bytes } => vec![
                Cell::new(name),
                Cell::new("ok").fg(Color::Green),
                Cell::new(fmt_num(rows)),
                Cell::new(fmt_num(keys)),
                Cell::new(fmt_bytes(bytes)),
            ],
        };
        table.add_row(row);
    }

    eprintln!("\nCache: {}", dir.display());
    eprintln!("{table}");

    let stale = stale_tmp_files(&dir);
    if !stale.is_empty() {
        eprintln!(
            "{} stale tmp files (removed on the next compute run)",
            stale.len()
        );
    }

    let report = dir.join("last_run.json");
    if let Ok(content) = std::fs::read_to_string(&report) {
        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(v) => eprintln!(
                "Last run: {} ({}, {} failed keys)",
                v["finished_at"].as_str().unwrap_or("?"),
                v["mode"].as_str().unwrap_or("?"),
                v["failed_keys"].as_array().map_or(0, Vec::len)
            ),
            Err(e) => log::warn!("Unreadable run report {}: {e}", report.display()),
        }
    }
    Ok(())
}
