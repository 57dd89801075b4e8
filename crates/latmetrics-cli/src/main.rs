//! latmetrics - Bibliometric indicators for Latin American journals
//!
//! Aggregates article and journal tables into region, country and journal
//! level metrics, kept incrementally in Parquet cache tables.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "latmetrics")]
#[command(about = "Incremental bibliometric metrics for Latin American journals")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./latmetrics.toml or ~/.config/latmetrics/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Compute metrics for new keys and update the cache
    Compute(cmd::compute::ComputeArgs),
    /// Show cache tables with row and key counts
    Status(cmd::status::StatusArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(latmetrics_core::ProgressContext::new());

    // Logging:
    //   TTY:     warn unless --debug (progress bars show activity)
    //   non-TTY: info unless --debug (logs are the only progress indicator)
    let multi = progress.is_tty().then(|| progress.multi());
    latmetrics_core::init_logging(cli.debug, multi);

    let config = match cli.config {
        Some(path) => Config::from_file(&path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Compute(args) => {
            latmetrics_core::install_signal_handlers()
                .context("Failed to install signal handlers")?;
            cmd::compute::run(args, &config, &progress)
        }
        Command::Status(args) => cmd::status::run(args, &config).map(|()| ExitCode::SUCCESS),
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec!["Articles", &config.data.articles.display().to_string()]);
            table.add_row(vec!["Journals", &config.data.journals.display().to_string()]);
            table.add_row(vec!["Cache directory", &config.cache.dir.display().to_string()]);
            table.add_row(vec![
                "Compression level",
                &config.cache.compression_level.to_string(),
            ]);
            table.add_row(vec![
                "Workers",
                &match config.workers.count {
                    Some(n) => n.to_string(),
                    None => format!(
                        "{} ({:.0}% of cores, max: {})",
                        config.workers.resolve(),
                        config.workers.fraction * 100.0,
                        config.workers.max
                    ),
                },
            ]);
            table.add_row(vec![
                "Batches (country/journal)",
                &format!(
                    "{}/{}",
                    config.compute.country_batches, config.compute.journal_batches
                ),
            ]);
            table.add_row(vec!["Extra periods", &config.compute.periods.join(", ")]);
            table.add_row(vec![
                "Key timeout",
                &config
                    .compute
                    .key_timeout_secs
                    .map_or_else(|| "none".to_string(), |s| format!("{s}s")),
            ]);
            table.add_row(vec!["Max retries", &config.compute.max_retries.to_string()]);
            table.add_row(vec![
                "Verify",
                if config.compute.verify { "on" } else { "off" },
            ]);

            eprintln!("\n{table}");
            Ok(ExitCode::SUCCESS)
        }
    }
}
