//! Input records, aggregation levels and time windows

use std::fmt;

/// Aggregation key of the whole-region partition
pub const REGION_KEY: &str = "all";

/// How an article's free-to-read status is achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OaStatus {
    Gold,
    /// Gold OA without author charges
    Diamond,
    Green,
    Hybrid,
    Bronze,
    Closed,
}

impl OaStatus {
    pub const ALL: [OaStatus; 6] = [
        Self::Gold,
        Self::Diamond,
        Self::Green,
        Self::Hybrid,
        Self::Bronze,
        Self::Closed,
    ];

    /// Parse an OpenAlex `oa_status` value (case-insensitive).
    ///
    /// Unrecognized values return `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gold" => Some(Self::Gold),
            "diamond" => Some(Self::Diamond),
            "green" => Some(Self::Green),
            "hybrid" => Some(Self::Hybrid),
            "bronze" => Some(Self::Bronze),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gold => "gold",
            Self::Diamond => "diamond",
            Self::Green => "green",
            Self::Hybrid => "hybrid",
            Self::Bronze => "bronze",
            Self::Closed => "closed",
        }
    }

    /// Position in [`OaStatus::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One scholarly publication (row of the works table)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Article {
    pub id: Option<String>,
    pub publication_year: Option<i32>,
    pub journal_id: Option<String>,
    /// Field-weighted citation impact
    pub fwci: Option<f64>,
    /// Citation normalized percentile (0-100)
    pub percentile: Option<f64>,
    pub top_10: Option<bool>,
    pub top_1: Option<bool>,
    pub oa_status: Option<OaStatus>,
}

/// One publication outlet (row of the journals table)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Journal {
    pub id: String,
    pub country_code: Option<String>,
    pub is_indexed_in_scopus: Option<bool>,
    pub is_core: Option<bool>,
    pub is_in_doaj: Option<bool>,
}

impl Journal {
    pub fn scopus(&self) -> bool {
        self.is_indexed_in_scopus.unwrap_or(false)
    }

    pub fn core(&self) -> bool {
        self.is_core.unwrap_or(false)
    }

    pub fn doaj(&self) -> bool {
        self.is_in_doaj.unwrap_or(false)
    }
}

/// Aggregation granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    /// Every article and journal (single sentinel key)
    Region,
    /// Journals grouped by `country_code`
    Country,
    /// A single journal
    Journal,
}

impl Level {
    pub const ALL: [Level; 3] = [Self::Region, Self::Country, Self::Journal];

    /// Name used in cache file names and logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::Country => "country",
            Self::Journal => "journal",
        }
    }

    /// Column holding the aggregation key in cache tables
    pub fn key_column(&self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::Country => "country_code",
            Self::Journal => "journal_id",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Window granularity of a cache table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Annual,
    Period,
}

impl Granularity {
    pub const ALL: [Granularity; 2] = [Self::Annual, Self::Period];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Annual => "annual",
            Self::Period => "period",
        }
    }

    /// Column holding the window in cache tables
    pub fn window_column(&self) -> &'static str {
        match self {
            Self::Annual => "year",
            Self::Period => "period",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Time window a metric record covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    Annual(i32),
    /// Inclusive year range
    Period { start: i32, end: i32 },
}

impl Window {
    pub fn granularity(&self) -> Granularity {
        match self {
            Self::Annual(_) => Granularity::Annual,
            Self::Period { .. } => Granularity::Period,
        }
    }

    pub fn contains(&self, year: i32) -> bool {
        match *self {
            Self::Annual(y) => y == year,
            Self::Period { start, end } => (start..=end).contains(&year),
        }
    }

    /// Parse a `YYYY-YYYY` period label
    pub fn parse_period(s: &str) -> Result<Self, String> {
        let (a, b) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("invalid period '{s}': expected YYYY-YYYY"))?;
        let start: i32 = a
            .trim()
            .parse()
            .map_err(|_| format!("invalid period start in '{s}'"))?;
        let end: i32 = b
            .trim()
            .parse()
            .map_err(|_| format!("invalid period end in '{s}'"))?;
        if start > end {
            return Err(format!("invalid period '{s}': start after end"));
        }
        Ok(Self::Period { start, end })
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Annual(y) => write!(f, "{y}"),
            Self::Period { start, end } => write!(f, "{start}-{end}"),
        }
    }
}
