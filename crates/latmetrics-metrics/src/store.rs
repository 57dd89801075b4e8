//! Record store: article and journal tables loaded once per run.
//!
//! Columns are coerced to their expected types with Arrow's safe cast, so a
//! malformed value becomes null instead of failing the load. Only a missing
//! file or a missing identifying column is fatal.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int32Array, RecordBatch, StringArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int32Type};
use rustc_hash::FxHashMap;

use latmetrics_core::{fmt_num, read_parquet};

use crate::record::{Article, Journal, OaStatus};

/// Counters gathered while loading, logged once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub articles: usize,
    pub journals: usize,
    pub null_year: usize,
    pub null_journal: usize,
    /// Articles pointing at a journal id absent from the journal table
    pub orphan: usize,
    /// Non-null OA status values that are not one of the six known ones
    pub unknown_oa: usize,
    pub duplicate_journals: usize,
}

/// Immutable, indexed view of the input tables.
///
/// Shared read-only by every worker behind an `Arc`.
#[derive(Debug, Default)]
pub struct RecordStore {
    articles: Vec<Article>,
    journals: Vec<Journal>,
    journal_index: FxHashMap<String, u32>,
    /// Article indices per journal (parallel to `journals`)
    articles_by_journal: Vec<Vec<u32>>,
    /// Journal indices per country code, sorted by code
    journals_by_country: BTreeMap<String, Vec<u32>>,
    year_range: Option<(i32, i32)>,
    stats: LoadStats,
}

impl RecordStore {
    /// Load both tables from parquet files.
    pub fn load(articles_path: &Path, journals_path: &Path) -> Result<Self> {
        if !journals_path.exists() {
            bail!("Journal table not found: {}", journals_path.display());
        }
        if !articles_path.exists() {
            bail!("Article table not found: {}", articles_path.display());
        }

        let (_, journal_batches) = read_parquet(journals_path)
            .with_context(|| format!("Failed to read journals from {}", journals_path.display()))?;
        let mut journals = Vec::new();
        for batch in &journal_batches {
            read_journals(batch, &mut journals)
                .with_context(|| format!("Invalid journal table {}", journals_path.display()))?;
        }
        drop(journal_batches);

        let (_, article_batches) = read_parquet(articles_path)
            .with_context(|| format!("Failed to read articles from {}", articles_path.display()))?;
        let mut articles = Vec::new();
        let mut unknown_oa = 0;
        for batch in &article_batches {
            unknown_oa += read_articles(batch, &mut articles)
                .with_context(|| format!("Invalid article table {}", articles_path.display()))?;
        }
        drop(article_batches);

        let mut store = Self::from_records(articles, journals);
        store.stats.unknown_oa = unknown_oa;
        store.log_diagnostics();
        Ok(store)
    }

    /// Build the store and its indexes from in-memory records.
    ///
    /// Duplicate journal ids keep their first occurrence.
    pub fn from_records(articles: Vec<Article>, journals: Vec<Journal>) -> Self {
        let mut stats = LoadStats {
            articles: articles.len(),
            ..Default::default()
        };

        let mut unique = Vec::with_capacity(journals.len());
        let mut journal_index = FxHashMap::default();
        for journal in journals {
            if journal_index.contains_key(&journal.id) {
                stats.duplicate_journals += 1;
                continue;
            }
            journal_index.insert(journal.id.clone(), unique.len() as u32);
            unique.push(journal);
        }
        stats.journals = unique.len();

        let mut journals_by_country: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for (i, journal) in unique.iter().enumerate() {
            if let Some(code) = journal.country_code.as_deref() {
                journals_by_country
                    .entry(code.to_string())
                    .or_default()
                    .push(i as u32);
            }
        }

        let mut articles_by_journal = vec![Vec::new(); unique.len()];
        let mut year_range: Option<(i32, i32)> = None;
        for (i, article) in articles.iter().enumerate() {
            match article.publication_year {
                Some(y) => {
                    year_range = Some(match year_range {
                        Some((lo, hi)) => (lo.min(y), hi.max(y)),
                        None => (y, y),
                    });
                }
                None => stats.null_year += 1,
            }
            match article.journal_id.as_deref() {
                Some(jid) => match journal_index.get(jid) {
                    Some(&j) => articles_by_journal[j as usize].push(i as u32),
                    None => stats.orphan += 1,
                },
                None => stats.null_journal += 1,
            }
        }

        Self {
            articles,
            journals: unique,
            journal_index,
            articles_by_journal,
            journals_by_country,
            year_range,
            stats,
        }
    }

    fn log_diagnostics(&self) {
        let s = &self.stats;
        log::info!(
            "Loaded {} articles, {} journals ({} countries)",
            fmt_num(s.articles),
            fmt_num(s.journals),
            self.journals_by_country.len()
        );
        match self.year_range {
            Some((lo, hi)) => log::info!("Publication years {lo}-{hi}"),
            None => log::warn!("No article has a publication year"),
        }
        if s.null_year > 0 {
            log::warn!("{} articles without publication year", fmt_num(s.null_year));
        }
        if s.null_journal > 0 {
            log::info!("{} articles without journal", fmt_num(s.null_journal));
        }
        if s.orphan > 0 {
            log::warn!(
                "{} articles reference journals missing from the journal table",
                fmt_num(s.orphan)
            );
        }
        if s.unknown_oa > 0 {
            log::warn!(
                "{} articles with unrecognized oa_status (counted as closed)",
                fmt_num(s.unknown_oa)
            );
        }
        if s.duplicate_journals > 0 {
            log::warn!("{} duplicate journal ids ignored", s.duplicate_journals);
        }
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn journals(&self) -> &[Journal] {
        &self.journals
    }

    pub fn journal(&self, id: &str) -> Option<&Journal> {
        self.journal_index
            .get(id)
            .map(|&i| &self.journals[i as usize])
    }

    /// Articles published in journal `id` (empty for unknown ids)
    pub fn articles_of_journal(&self, id: &str) -> impl Iterator<Item = &Article> + '_ {
        let indices = match self.journal_index.get(id) {
            Some(&j) => self.articles_by_journal[j as usize].as_slice(),
            None => &[],
        };
        indices.iter().map(|&i| &self.articles[i as usize])
    }

    /// Journals registered under `code`, `None` when the country is unknown
    pub fn journals_of_country(&self, code: &str) -> Option<impl Iterator<Item = &Journal> + '_> {
        self.journals_by_country
            .get(code)
            .map(|ids| ids.iter().map(|&j| &self.journals[j as usize]))
    }

    /// Articles of every journal registered under `code`
    pub fn articles_of_country(&self, code: &str) -> impl Iterator<Item = &Article> + '_ {
        self.journals_by_country
            .get(code)
            .into_iter()
            .flatten()
            .flat_map(|&j| self.articles_by_journal[j as usize].iter())
            .map(|&i| &self.articles[i as usize])
    }

    /// Sorted distinct country codes
    pub fn countries(&self) -> impl Iterator<Item = &str> + '_ {
        self.journals_by_country.keys().map(String::as_str)
    }

    /// Min and max publication year over all articles
    pub fn year_range(&self) -> Option<(i32, i32)> {
        self.year_range
    }

    pub fn stats(&self) -> LoadStats {
        self.stats
    }
}

// ---------------------------------------------------------------------------
// Column coercion
// ---------------------------------------------------------------------------

/// Cast column `name` to `to`; `None` when absent or not castable.
fn coerce(batch: &RecordBatch, name: &str, to: &DataType) -> Option<ArrayRef> {
    let col = batch.column_by_name(name)?;
    match cast(col.as_ref(), to) {
        Ok(arr) => Some(arr),
        Err(e) => {
            log::warn!("Column '{name}' cannot be read as {to}, treating as null: {e}");
            None
        }
    }
}

fn utf8_col(batch: &RecordBatch, name: &str) -> Option<StringArray> {
    coerce(batch, name, &DataType::Utf8).map(|a| a.as_string::<i32>().clone())
}

fn f64_col(batch: &RecordBatch, name: &str) -> Option<Float64Array> {
    coerce(batch, name, &DataType::Float64).map(|a| a.as_primitive::<Float64Type>().clone())
}

fn i32_col(batch: &RecordBatch, name: &str) -> Option<Int32Array> {
    coerce(batch, name, &DataType::Int32).map(|a| a.as_primitive::<Int32Type>().clone())
}

fn bool_col(batch: &RecordBatch, name: &str) -> Option<BooleanArray> {
    coerce(batch, name, &DataType::Boolean).map(|a| a.as_boolean().clone())
}

fn str_at(col: Option<&StringArray>, i: usize) -> Option<&str> {
    col.filter(|c| c.is_valid(i))
        .map(|c| c.value(i).trim())
        .filter(|s| !s.is_empty())
}

/// Non-finite values (NaN, inf) are treated as missing
fn f64_at(col: Option<&Float64Array>, i: usize) -> Option<f64> {
    col.filter(|c| c.is_valid(i))
        .map(|c| c.value(i))
        .filter(|v| v.is_finite())
}

fn i32_at(col: Option<&Int32Array>, i: usize) -> Option<i32> {
    col.filter(|c| c.is_valid(i)).map(|c| c.value(i))
}

fn bool_at(col: Option<&BooleanArray>, i: usize) -> Option<bool> {
    col.filter(|c| c.is_valid(i)).map(|c| c.value(i))
}

fn require(batch: &RecordBatch, name: &str) -> Result<()> {
    if batch.column_by_name(name).is_none() {
        bail!("missing required column '{name}'");
    }
    Ok(())
}

fn read_journals(batch: &RecordBatch, out: &mut Vec<Journal>) -> Result<()> {
    require(batch, "id")?;
    let id = utf8_col(batch, "id");
    let country = utf8_col(batch, "country_code");
    let scopus = bool_col(batch, "is_indexed_in_scopus");
    let core = bool_col(batch, "is_core");
    let doaj = bool_col(batch, "is_in_doaj");

    out.reserve(batch.num_rows());
    for i in 0..batch.num_rows() {
        let Some(jid) = str_at(id.as_ref(), i) else {
            continue;
        };
        out.push(Journal {
            id: jid.to_string(),
            country_code: str_at(country.as_ref(), i).map(str::to_string),
            is_indexed_in_scopus: bool_at(scopus.as_ref(), i),
            is_core: bool_at(core.as_ref(), i),
            is_in_doaj: bool_at(doaj.as_ref(), i),
        });
    }
    Ok(())
}

/// Returns the number of unrecognized OA status values
fn read_articles(batch: &RecordBatch, out: &mut Vec<Article>) -> Result<usize> {
    require(batch, "journal_id")?;
    require(batch, "publication_year")?;
    let id = utf8_col(batch, "id");
    let year = i32_col(batch, "publication_year");
    let journal = utf8_col(batch, "journal_id");
    let fwci = f64_col(batch, "fwci");
    let percentile = f64_col(batch, "citation_normalized_percentile");
    let top_10 = bool_col(batch, "is_in_top_10_percent");
    let top_1 = bool_col(batch, "is_in_top_1_percent");
    let oa = utf8_col(batch, "oa_status");

    let mut unknown_oa = 0;
    out.reserve(batch.num_rows());
    for i in 0..batch.num_rows() {
        let raw_oa = str_at(oa.as_ref(), i);
        let oa_status = raw_oa.and_then(OaStatus::parse);
        if raw_oa.is_some() && oa_status.is_none() {
            unknown_oa += 1;
        }
        out.push(Article {
            id: str_at(id.as_ref(), i).map(str::to_string),
            publication_year: i32_at(year.as_ref(), i),
            journal_id: str_at(journal.as_ref(), i).map(str::to_string),
            fwci: f64_at(fwci.as_ref(), i),
            percentile: f64_at(percentile.as_ref(), i),
            top_10: bool_at(top_10.as_ref(), i),
            top_1: bool_at(top_1.as_ref(), i),
            oa_status,
        });
    }
    Ok(unknown_oa)
}
