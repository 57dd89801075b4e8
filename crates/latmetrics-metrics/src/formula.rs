//! Indicator formulas.
//!
//! Everything here is pure: an article (or journal) collection in, rounded
//! indicators out. Empty collections yield zeros, never an error.

use crate::record::{Article, Journal, OaStatus};

/// Allowed deviation of the OA share total from 100
pub const OA_SUM_TOLERANCE: f64 = 0.1;

/// Relative nudge lifting decimal ties stored just below the half
/// (`0.145` is `0.14499999999999999` in binary) onto it
const TIE_NUDGE: f64 = 4.0 * f64::EPSILON;

/// Round to 2 decimals, half-up on the decimal value for the non-negative
/// values produced here
pub fn round2(x: f64) -> f64 {
    (x * 100.0 * (1.0 + TIE_NUDGE)).round() / 100.0
}

fn pct(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(part as f64 / total as f64 * 100.0)
    }
}

fn avg(sum: f64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(sum / total as f64)
    }
}

/// Share of documents per OA status, in percent
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OaShares {
    pub gold: f64,
    pub diamond: f64,
    pub green: f64,
    pub hybrid: f64,
    pub bronze: f64,
    pub closed: f64,
}

impl OaShares {
    pub fn sum(&self) -> f64 {
        self.gold + self.diamond + self.green + self.hybrid + self.bronze + self.closed
    }
}

/// Citation-impact and OA indicators of one (key, window) cell
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerformanceMetrics {
    pub num_documents: u64,
    pub fwci_avg: f64,
    pub avg_percentile: f64,
    pub pct_top_10: f64,
    pub pct_top_1: f64,
    pub oa: OaShares,
}

impl PerformanceMetrics {
    pub fn from_articles<'a>(articles: impl IntoIterator<Item = &'a Article>) -> Self {
        let mut acc = MetricsAccumulator::default();
        for a in articles {
            acc.push(a);
        }
        acc.finish()
    }

    /// Check the cross-field invariants, returning a description of the
    /// first violation.
    pub fn check(&self) -> Result<(), String> {
        if self.pct_top_1 > self.pct_top_10 {
            return Err(format!(
                "pct_top_1 {} exceeds pct_top_10 {}",
                self.pct_top_1, self.pct_top_10
            ));
        }
        if self.num_documents > 0 {
            let sum = self.oa.sum();
            if (sum - 100.0).abs() > OA_SUM_TOLERANCE {
                return Err(format!("OA shares sum to {sum:.2}, expected 100"));
            }
        }
        Ok(())
    }
}

/// Running sums for [`PerformanceMetrics`].
///
/// Null impact scores and percentiles count as zero but stay in the
/// denominator. Null flags are false. A null or unrecognized OA status
/// counts as closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsAccumulator {
    documents: u64,
    fwci_sum: f64,
    percentile_sum: f64,
    top_10: u64,
    top_1: u64,
    oa: [u64; OaStatus::ALL.len()],
}

impl MetricsAccumulator {
    #[inline]
    pub fn push(&mut self, a: &Article) {
        self.documents += 1;
        self.fwci_sum += a.fwci.unwrap_or(0.0);
        self.percentile_sum += a.percentile.unwrap_or(0.0);

        let top_1 = a.top_1.unwrap_or(false);
        if top_1 {
            self.top_1 += 1;
        }
        // top-1% documents are inside the top-10% bracket
        if top_1 || a.top_10.unwrap_or(false) {
            self.top_10 += 1;
        }

        let status = a.oa_status.unwrap_or(OaStatus::Closed);
        self.oa[status.index()] += 1;
    }

    pub fn finish(&self) -> PerformanceMetrics {
        let n = self.documents;
        let share = |s: OaStatus| pct(self.oa[s.index()], n);
        PerformanceMetrics {
            num_documents: n,
            fwci_avg: avg(self.fwci_sum, n),
            avg_percentile: avg(self.percentile_sum, n),
            pct_top_10: pct(self.top_10, n),
            pct_top_1: pct(self.top_1, n),
            oa: OaShares {
                gold: share(OaStatus::Gold),
                diamond: share(OaStatus::Diamond),
                green: share(OaStatus::Green),
                hybrid: share(OaStatus::Hybrid),
                bronze: share(OaStatus::Bronze),
                closed: share(OaStatus::Closed),
            },
        }
    }
}

/// Indexing coverage over the journals of a region or country
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IndexingCoverage {
    pub num_journals: u64,
    pub pct_scopus: f64,
    pub pct_core: f64,
    pub pct_doaj: f64,
}

impl IndexingCoverage {
    pub fn from_journals<'a>(journals: impl IntoIterator<Item = &'a Journal>) -> Self {
        let (mut n, mut scopus, mut core, mut doaj) = (0u64, 0u64, 0u64, 0u64);
        for j in journals {
            n += 1;
            scopus += u64::from(j.scopus());
            core += u64::from(j.core());
            doaj += u64::from(j.doaj());
        }
        Self {
            num_journals: n,
            pct_scopus: pct(scopus, n),
            pct_core: pct(core, n),
            pct_doaj: pct(doaj, n),
        }
    }
}

/// Raw indexing flags of a single journal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexingFlags {
    pub is_scopus: bool,
    pub is_core: bool,
    pub is_doaj: bool,
}

impl IndexingFlags {
    pub fn from_journal(j: &Journal) -> Self {
        Self {
            is_scopus: j.scopus(),
            is_core: j.core(),
            is_doaj: j.doaj(),
        }
    }
}

/// Level-dependent indexing columns of a metric record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Indexing {
    Coverage(IndexingCoverage),
    Flags(IndexingFlags),
}
