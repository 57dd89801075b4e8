//! Content fingerprints of country and journal partitions.
//!
//! Opt-in (`--verify`): detects partitions whose input rows changed since
//! their cached metrics were computed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use latmetrics_core::{Fingerprinter, tmp_path_for};

use crate::record::{Article, Journal, Level};
use crate::store::RecordStore;

fn hash_journal(fp: &mut Fingerprinter, j: &Journal) {
    fp.str(Some(&j.id))
        .str(j.country_code.as_deref())
        .bool(j.is_indexed_in_scopus)
        .bool(j.is_core)
        .bool(j.is_in_doaj);
}

fn hash_article(fp: &mut Fingerprinter, a: &Article) {
    fp.str(a.id.as_deref())
        .i32(a.publication_year)
        .f64(a.fwci)
        .f64(a.percentile)
        .bool(a.top_10)
        .bool(a.top_1)
        .str(a.oa_status.map(|s| s.as_str()));
}

/// Fingerprint of every input row contributing to `key`.
///
/// Region keys are always recomputed and have no fingerprint.
pub fn partition_fingerprint(store: &RecordStore, level: Level, key: &str) -> Option<String> {
    let mut fp = Fingerprinter::new();
    match level {
        Level::Region => return None,
        Level::Country => {
            for j in store.journals_of_country(key)? {
                hash_journal(&mut fp, j);
                for a in store.articles_of_journal(&j.id) {
                    hash_article(&mut fp, a);
                }
            }
        }
        Level::Journal => {
            hash_journal(&mut fp, store.journal(key)?);
            for a in store.articles_of_journal(key) {
                hash_article(&mut fp, a);
            }
        }
    }
    Some(fp.finish())
}

fn fingerprint_pool(level: Level, workers: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(move |i| format!("{level}-fingerprint-{i}"))
        .build()
        .context("Failed to create fingerprint pool")
}

/// Fingerprints of `keys`, computed on `workers` threads
pub fn fingerprints(
    store: &RecordStore,
    level: Level,
    keys: &[String],
    workers: usize,
) -> Result<BTreeMap<String, String>> {
    let pool = fingerprint_pool(level, workers)?;
    Ok(pool.install(|| {
        keys.par_iter()
            .filter_map(|k| partition_fingerprint(store, level, k).map(|h| (k.clone(), h)))
            .collect()
    }))
}

/// Keys whose current fingerprint is missing from or differs in `stored`
pub fn changed_keys(
    current: &BTreeMap<String, String>,
    stored: &BTreeMap<String, String>,
) -> FxHashSet<String> {
    current
        .iter()
        .filter(|(k, h)| stored.get(*k) != Some(*h))
        .map(|(k, _)| k.clone())
        .collect()
}

/// `fingerprints_<level>.json` sidecar next to the cache tables
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FingerprintFile {
    pub level: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub entries: BTreeMap<String, String>,
}

impl FingerprintFile {
    pub fn path(dir: &Path, level: Level) -> PathBuf {
        dir.join(format!("fingerprints_{}.json", level.name()))
    }

    /// Missing or unparseable files load as empty
    pub fn load(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("Ignoring invalid fingerprint file {}: {e}", path.display());
            Self::default()
        })
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(fwci: f64) -> RecordStore {
        RecordStore::from_records(
            vec![
                Article {
                    id: Some("W1".into()),
                    publication_year: Some(2020),
                    journal_id: Some("S1".into()),
                    fwci: Some(fwci),
                    ..Default::default()
                },
                Article {
                    id: Some("W2".into()),
                    publication_year: Some(2020),
                    journal_id: Some("S2".into()),
                    ..Default::default()
                },
            ],
            vec![
                Journal {
                    id: "S1".into(),
                    country_code: Some("BR".into()),
                    ..Default::default()
                },
                Journal {
                    id: "S2".into(),
                    country_code: Some("AR".into()),
                    ..Default::default()
                },
            ],
        )
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = store(1.0);
        let b = store(2.0);
        let fa = partition_fingerprint(&a, Level::Journal, "S1").unwrap();
        assert_eq!(fa.len(), 64);
        assert_eq!(Some(fa.clone()), partition_fingerprint(&a, Level::Journal, "S1"));
        assert_ne!(Some(fa), partition_fingerprint(&b, Level::Journal, "S1"));
        assert_eq!(
            partition_fingerprint(&a, Level::Country, "AR"),
            partition_fingerprint(&b, Level::Country, "AR")
        );
        assert_eq!(partition_fingerprint(&a, Level::Region, "all"), None);
        assert_eq!(partition_fingerprint(&a, Level::Journal, "S9"), None);
    }

    #[test]
    fn changed_keys_detects_new_and_modified() {
        let keys = vec!["AR".to_string(), "BR".to_string()];
        let before = fingerprints(&store(1.0), Level::Country, &keys, 2).unwrap();
        let after = fingerprints(&store(2.0), Level::Country, &keys, 2).unwrap();
        assert!(changed_keys(&before, &before).is_empty());

        let changed = changed_keys(&after, &before);
        assert_eq!(changed.len(), 1);
        assert!(changed.contains("BR"));

        let all = changed_keys(&after, &BTreeMap::new());
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn pool_is_bounded_by_worker_count() {
        let pool = fingerprint_pool(Level::Journal, 2).unwrap();
        assert_eq!(pool.current_num_threads(), 2);
        assert_eq!(pool.install(rayon::current_num_threads), 2);
        assert_eq!(fingerprint_pool(Level::Journal, 0).unwrap().current_num_threads(), 1);

        let keys = vec!["S1".to_string(), "S2".to_string(), "S9".to_string()];
        let s = store(1.0);
        let single = fingerprints(&s, Level::Journal, &keys, 1).unwrap();
        assert_eq!(single.len(), 2);
        assert_eq!(single, fingerprints(&s, Level::Journal, &keys, 3).unwrap());
    }

    #[test]
    fn sidecar_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = FingerprintFile::path(dir.path(), Level::Journal);
        assert!(path.ends_with("fingerprints_journal.json"));
        assert_eq!(FingerprintFile::load(&path), FingerprintFile::default());

        let file = FingerprintFile {
            level: "journal".into(),
            updated_at: Some(Utc::now()),
            entries: [("S1".to_string(), "ab".repeat(32))].into_iter().collect(),
        };
        file.save(&path).unwrap();
        assert_eq!(FingerprintFile::load(&path), file);

        fs::write(&path, "{ broken").unwrap();
        assert_eq!(FingerprintFile::load(&path), FingerprintFile::default());
    }
}
