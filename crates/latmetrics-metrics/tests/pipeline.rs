//! End-to-end compute runs over small parquet inputs

mod common;

use std::process::ExitCode;
use std::time::Duration;

use latmetrics_core::ProgressContext;
use latmetrics_metrics::record::Window;
use latmetrics_metrics::{
    CacheTable, Granularity, Indexing, KeyError, Level, MetricRecord, REGION_KEY, cache_path, run,
};
use tempfile::TempDir;

use common::{Work, cache_file, config, work, write_journals, write_works};

const JOURNALS: &[(&str, &str, bool)] = &[("S1", "BR", true), ("S2", "BR", false)];

fn base_works() -> Vec<Work> {
    vec![
        work("W1", 2020, "S1", 2.5),
        Work {
            fwci: None,
            ..work("W2", 2020, "S1", 0.0)
        },
        work("W3", 2021, "S1", 3.0),
        Work {
            oa: None,
            top_10: true,
            ..work("W4", 2022, "S2", 1.0)
        },
    ]
}

fn records(config: &latmetrics_metrics::Config, level: Level, g: Granularity) -> Vec<MetricRecord> {
    let mut recs = CacheTable::open(&cache_path(&config.cache_dir, level, g), level, g)
        .unwrap()
        .records()
        .unwrap();
    recs.sort_by(|a, b| (&a.key, a.window.to_string()).cmp(&(&b.key, b.window.to_string())));
    recs
}

fn find<'a>(recs: &'a [MetricRecord], key: &str, window: Window) -> &'a MetricRecord {
    recs.iter()
        .find(|r| r.key == key && r.window == window)
        .unwrap_or_else(|| panic!("no record for {key} {window}"))
}

const FULL: Window = Window::Period {
    start: 2020,
    end: 2022,
};

#[test]
fn writes_all_six_tables() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    write_journals(&config.journals, JOURNALS);
    write_works(&config.articles, &base_works());

    let summary = run(&config, &ProgressContext::with_tty(false)).unwrap();
    assert_eq!(summary.exit_code(), ExitCode::SUCCESS);
    assert!(summary.failures.is_empty());

    for level in ["region", "country", "journal"] {
        for g in ["annual", "period"] {
            let name = format!("metrics_{level}_{g}.parquet");
            assert!(cache_file(&config, &name).exists(), "{name} missing");
        }
    }
    assert!(cache_file(&config, "last_run.json").exists());

    let region = records(&config, Level::Region, Granularity::Period);
    let full = find(&region, REGION_KEY, FULL);
    assert_eq!(full.metrics.num_documents, 4);
    // (2.5 + 0 + 3.0 + 1.0) / 4
    assert_eq!(full.metrics.fwci_avg, 1.63);
    assert_eq!(full.metrics.oa.gold, 75.0);
    assert_eq!(full.metrics.oa.closed, 25.0);
    match full.indexing {
        Indexing::Coverage(c) => {
            assert_eq!(c.num_journals, 2);
            assert_eq!(c.pct_scopus, 50.0);
        }
        Indexing::Flags(_) => panic!("region rows carry coverage"),
    }
    let recent = Window::Period {
        start: 2021,
        end: 2025,
    };
    assert_eq!(find(&region, REGION_KEY, recent).metrics.num_documents, 2);

    let annual = records(&config, Level::Journal, Granularity::Annual);
    let s1_2020 = find(&annual, "S1", Window::Annual(2020));
    assert_eq!(s1_2020.metrics.num_documents, 2);
    assert_eq!(s1_2020.metrics.fwci_avg, 1.25);
    // S2 has no 2020 articles but still gets a zero row
    assert_eq!(find(&annual, "S2", Window::Annual(2020)).metrics.num_documents, 0);
    // 2 journals × 3 years
    assert_eq!(annual.len(), 6);

    let country = records(&config, Level::Country, Granularity::Period);
    assert_eq!(country.len(), 2);
    assert_eq!(find(&country, "BR", FULL).metrics.pct_top_10, 25.0);
}

#[test]
fn forced_runs_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path());
    config.force = true;
    write_journals(&config.journals, JOURNALS);
    write_works(&config.articles, &base_works());

    let progress = ProgressContext::with_tty(false);
    run(&config, &progress).unwrap();
    let first = all_tables(&config);

    let summary = run(&config, &progress).unwrap();
    assert_eq!(summary.cached(), 0);
    let second = all_tables(&config);
    assert_eq!(first, second);
}

#[test]
fn incremental_run_computes_only_new_keys() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    write_journals(&config.journals, JOURNALS);
    write_works(&config.articles, &base_works());

    let progress = ProgressContext::with_tty(false);
    run(&config, &progress).unwrap();

    // S1 content changes, S3 (new country AR) appears
    let mut works = base_works();
    works[0].fwci = Some(10.0);
    works.push(work("W5", 2021, "S3", 4.0));
    write_works(&config.articles, &works);
    write_journals(
        &config.journals,
        &[("S1", "BR", true), ("S2", "BR", false), ("S3", "AR", false)],
    );

    let summary = run(&config, &progress).unwrap();
    let journal = summary
        .levels
        .iter()
        .find(|l| l.level == Level::Journal)
        .unwrap();
    assert_eq!(journal.computed, 1);
    assert_eq!(journal.cached, 2);
    let country = summary
        .levels
        .iter()
        .find(|l| l.level == Level::Country)
        .unwrap();
    assert_eq!(country.computed, 1);

    let period = records(&config, Level::Journal, Granularity::Period);
    let keys: Vec<_> = period
        .iter()
        .filter(|r| r.window == FULL)
        .map(|r| r.key.as_str())
        .collect();
    assert_eq!(keys, vec!["S1", "S2", "S3"]);
    // S1 kept its cached value (key presence only)
    assert_eq!(find(&period, "S1", FULL).metrics.fwci_avg, 1.83);
    assert_eq!(find(&period, "S3", FULL).metrics.fwci_avg, 4.0);

    // the region level always reflects the current input
    let region = records(&config, Level::Region, Granularity::Period);
    assert_eq!(find(&region, REGION_KEY, FULL).metrics.num_documents, 5);
}

#[test]
fn verify_recomputes_changed_partitions() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path());
    config.verify = true;
    write_journals(&config.journals, JOURNALS);
    write_works(&config.articles, &base_works());

    let progress = ProgressContext::with_tty(false);
    run(&config, &progress).unwrap();
    assert!(cache_file(&config, "fingerprints_journal.json").exists());
    assert!(cache_file(&config, "fingerprints_country.json").exists());

    let mut works = base_works();
    works[0].fwci = Some(10.0);
    write_works(&config.articles, &works);

    let summary = run(&config, &progress).unwrap();
    let journal = summary
        .levels
        .iter()
        .find(|l| l.level == Level::Journal)
        .unwrap();
    assert_eq!(journal.changed, 1);
    assert_eq!(journal.computed, 1);

    let period = records(&config, Level::Journal, Granularity::Period);
    // (10 + 0 + 3) / 3
    assert_eq!(find(&period, "S1", FULL).metrics.fwci_avg, 4.33);
    assert_eq!(
        period.iter().filter(|r| r.key == "S1").count(),
        2,
        "stale S1 rows must be replaced"
    );
}

#[test]
fn force_picks_up_changed_content() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path());
    write_journals(&config.journals, JOURNALS);
    write_works(&config.articles, &base_works());
    let progress = ProgressContext::with_tty(false);
    run(&config, &progress).unwrap();

    let mut works = base_works();
    works[0].fwci = Some(10.0);
    write_works(&config.articles, &works);
    config.force = true;
    run(&config, &progress).unwrap();

    let period = records(&config, Level::Journal, Granularity::Period);
    assert_eq!(find(&period, "S1", FULL).metrics.fwci_avg, 4.33);
    assert_eq!(period.iter().filter(|r| r.key == "S1").count(), 2);
}

fn all_tables(config: &latmetrics_metrics::Config) -> Vec<Vec<MetricRecord>> {
    Level::ALL
        .iter()
        .flat_map(|&l| Granularity::ALL.map(|g| records(config, l, g)))
        .collect()
}

#[test]
fn failed_keys_keep_previous_rows() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path());
    write_journals(&config.journals, JOURNALS);
    write_works(&config.articles, &base_works());
    let progress = ProgressContext::with_tty(false);
    run(&config, &progress).unwrap();
    let before = all_tables(&config);

    // every key exceeds its budget at the first deadline check
    let mut works = base_works();
    works[0].fwci = Some(10.0);
    write_works(&config.articles, &works);
    config.force = true;
    config.key_timeout = Some(Duration::from_nanos(1));

    let summary = run(&config, &progress).unwrap();
    assert_eq!(summary.exit_code(), ExitCode::FAILURE);
    assert!(!summary.interrupted);
    let mut failed: Vec<_> = summary.failures.iter().map(|f| f.key().to_string()).collect();
    failed.sort();
    assert_eq!(failed, vec!["BR", "S1", "S2", REGION_KEY]);
    assert!(
        summary
            .failures
            .iter()
            .all(|f| matches!(f.error, KeyError::Timeout { .. }))
    );
    assert_eq!(summary.computed(), 0);

    // no partial rows, nothing dropped
    assert_eq!(all_tables(&config), before);

    let report: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(cache_file(&config, "last_run.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report["mode"], "force");
    let listed = report["failed_keys"].as_array().unwrap();
    assert_eq!(listed.len(), 4);
    assert!(listed.iter().all(|k| k["kind"] == "timeout"));
    assert!(listed.iter().any(|k| k["key"] == "S1" && k["level"] == "journal"));
}

#[test]
fn missing_input_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    write_journals(&config.journals, JOURNALS);

    let err = run(&config, &ProgressContext::with_tty(false)).unwrap_err();
    assert!(format!("{err:#}").contains("works.parquet"));
    assert!(!cache_file(&config, "metrics_region_annual.parquet").exists());
}

#[test]
fn corrupt_cache_is_rebuilt() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    write_journals(&config.journals, JOURNALS);
    write_works(&config.articles, &base_works());
    let progress = ProgressContext::with_tty(false);
    run(&config, &progress).unwrap();

    std::fs::write(cache_file(&config, "metrics_journal_annual.parquet"), b"garbage").unwrap();
    std::fs::write(cache_file(&config, "metrics_journal_annual.parquet.tmp"), b"stale").unwrap();

    let summary = run(&config, &progress).unwrap();
    let journal = summary
        .levels
        .iter()
        .find(|l| l.level == Level::Journal)
        .unwrap();
    assert_eq!(journal.computed, 2);
    assert!(!cache_file(&config, "metrics_journal_annual.parquet.tmp").exists());
    assert_eq!(records(&config, Level::Journal, Granularity::Annual).len(), 6);
    // the intact period table holds each key once per window
    assert_eq!(records(&config, Level::Journal, Granularity::Period).len(), 4);
}
