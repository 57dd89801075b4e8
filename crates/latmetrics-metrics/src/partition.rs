//! Aggregation keys and time windows

use crate::record::{Level, REGION_KEY, Window};
use crate::store::RecordStore;

/// Windows computed for every key: each year of the range, the full
/// period, then any extra periods.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowPlan {
    range: Option<(i32, i32)>,
    periods: Vec<Window>,
}

impl WindowPlan {
    /// `range` is the inclusive publication-year range; `None` when no article
    /// carries a year, in which case only the extra periods remain.
    pub fn new(range: Option<(i32, i32)>, extra: &[Window]) -> Self {
        let mut periods = Vec::with_capacity(extra.len() + 1);
        if let Some((start, end)) = range {
            periods.push(Window::Period { start, end });
        }
        for w in extra {
            if matches!(w, Window::Period { .. }) && !periods.contains(w) {
                periods.push(*w);
            }
        }
        Self { range, periods }
    }

    /// Annual windows in ascending year order
    pub fn annual(&self) -> impl Iterator<Item = Window> + '_ {
        self.range
            .into_iter()
            .flat_map(|(start, end)| (start..=end).map(Window::Annual))
    }

    pub fn num_years(&self) -> usize {
        self.range
            .map(|(start, end)| (end - start + 1) as usize)
            .unwrap_or(0)
    }

    /// Period windows, full range first
    pub fn periods(&self) -> &[Window] {
        &self.periods
    }

    /// Slot of `year` among the annual windows
    #[inline]
    pub fn year_slot(&self, year: i32) -> Option<usize> {
        let (start, end) = self.range?;
        (start..=end)
            .contains(&year)
            .then(|| (year - start) as usize)
    }

    pub fn len(&self) -> usize {
        self.num_years() + self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Every aggregation key per level plus the shared window plan
#[derive(Debug, Clone)]
pub struct Partitions {
    pub countries: Vec<String>,
    pub journals: Vec<String>,
    pub windows: WindowPlan,
}

impl Partitions {
    /// Countries are the sorted distinct non-null codes; journals the sorted
    /// distinct ids.
    pub fn enumerate(store: &RecordStore, extra_periods: &[Window]) -> Self {
        let countries = store.countries().map(str::to_string).collect();
        let mut journals: Vec<String> = store.journals().iter().map(|j| j.id.clone()).collect();
        journals.sort_unstable();
        Self {
            countries,
            journals,
            windows: WindowPlan::new(store.year_range(), extra_periods),
        }
    }

    pub fn keys(&self, level: Level) -> Vec<String> {
        match level {
            Level::Region => vec![REGION_KEY.to_string()],
            Level::Country => self.countries.clone(),
            Level::Journal => self.journals.clone(),
        }
    }
}
