//! Index-space rectangles and the loaded/loading bookkeeping behind fetch dedup

use web_time::{Duration, Instant};

/// Identifier handed out for every dispatched range fetch
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct FetchId(pub u64);

/// Inclusive span of tile indices along one axis
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct AxisRange {
    pub min: i32,
    pub max: i32,
}

impl AxisRange {
    pub fn new(a: i32, b: i32) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Bounding span of a set of indices, `None` when the set is empty
    pub fn from_indices(indices: &[i32]) -> Option<Self> {
        let min = *indices.iter().min()?;
        let max = *indices.iter().max()?;
        Some(Self { min, max })
    }

    pub fn contains(&self, index: i32) -> bool {
        index >= self.min && index <= self.max
    }

    pub fn len(&self) -> usize {
        (self.max as i64 - self.min as i64 + 1) as usize
    }

    pub fn union(&self, other: &AxisRange) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Grow the span by `by` indices on both ends
    pub fn expand(&self, by: i32) -> Self {
        Self {
            min: self.min.saturating_sub(by),
            max: self.max.saturating_add(by),
        }
    }

    pub fn indices(&self) -> std::ops::RangeInclusive<i32> {
        self.min..=self.max
    }

    pub fn to_vec(&self) -> Vec<i32> {
        self.indices().collect()
    }
}

/// Axis-aligned rectangle over row/column tile indices
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct IndexRange {
    pub rows: AxisRange,
    pub cols: AxisRange,
}

impl IndexRange {
    pub fn new(rows: AxisRange, cols: AxisRange) -> Self {
        Self { rows, cols }
    }

    /// Bounding rectangle of the given row and column indices.
    /// Only exists when both index sets are non-empty.
    pub fn from_indices(rows: &[i32], cols: &[i32]) -> Option<Self> {
        Some(Self {
            rows: AxisRange::from_indices(rows)?,
            cols: AxisRange::from_indices(cols)?,
        })
    }

    pub fn overlaps(&self, other: &IndexRange) -> bool {
        overlaps(self, other)
    }

    pub fn contains(&self, row: i32, col: i32) -> bool {
        self.rows.contains(row) && self.cols.contains(col)
    }

    pub fn union(&self, other: &IndexRange) -> Self {
        Self {
            rows: self.rows.union(&other.rows),
            cols: self.cols.union(&other.cols),
        }
    }

    pub fn expand(&self, margin: i32) -> Self {
        Self {
            rows: self.rows.expand(margin),
            cols: self.cols.expand(margin),
        }
    }

    pub fn tile_count(&self) -> usize {
        self.rows.len() * self.cols.len()
    }
}

/// Standard 2D rectangle-overlap test; touching edges count as overlap
pub fn overlaps(a: &IndexRange, b: &IndexRange) -> bool {
    !(a.rows.max < b.rows.min
        || a.rows.min > b.rows.max
        || a.cols.max < b.cols.min
        || a.cols.min > b.cols.max)
}

/// Provisional record of an in-flight fetch's target range
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoadingArea {
    pub id: FetchId,
    pub range: IndexRange,
    pub started: Instant,
}

impl LoadingArea {
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.started) >= timeout
    }
}

/// Tracks which index rectangles are already fetched and which are in flight.
///
/// The loaded coverage is a single bounding box (the "loaded grid") that only
/// ever grows. It can contain holes when two disjoint regions were fetched,
/// so `is_already_loaded` may report a region inside the box as covered.
#[derive(Debug)]
pub struct RangeTracker {
    loaded: Option<IndexRange>,
    loading: Vec<LoadingArea>,
    loading_timeout: Duration,
}

impl RangeTracker {
    pub fn new(loading_timeout: Duration) -> Self {
        Self {
            loaded: None,
            loading: Vec::new(),
            loading_timeout,
        }
    }

    /// True if the candidate's bounding range overlaps any live loading area.
    /// Areas past the loading timeout are treated as abandoned.
    pub fn is_already_loading(&self, rows: &[i32], cols: &[i32], now: Instant) -> bool {
        let Some(candidate) = IndexRange::from_indices(rows, cols) else {
            return false;
        };
        self.loading
            .iter()
            .filter(|area| !area.is_expired(now, self.loading_timeout))
            .any(|area| overlaps(&area.range, &candidate))
    }

    /// True only if every requested row and column lies within the loaded grid
    /// widened by `gap` tiles on each side.
    pub fn is_already_loaded(&self, rows: &[i32], cols: &[i32], gap: i32) -> bool {
        let Some(loaded) = self.loaded else {
            return false;
        };
        if rows.is_empty() || cols.is_empty() {
            return false;
        }
        let slack = loaded.expand(gap.max(0));
        rows.iter().all(|r| slack.rows.contains(*r)) && cols.iter().all(|c| slack.cols.contains(*c))
    }

    /// Expand the loaded grid to include the given indices. Never shrinks.
    pub fn grow_loaded_grid(&mut self, rows: &[i32], cols: &[i32]) {
        let Some(range) = IndexRange::from_indices(rows, cols) else {
            return;
        };
        self.loaded = Some(match self.loaded {
            Some(existing) => existing.union(&range),
            None => range,
        });
    }

    pub fn register_loading(&mut self, id: FetchId, range: IndexRange, now: Instant) {
        self.loading.push(LoadingArea {
            id,
            range,
            started: now,
        });
    }

    /// Drop the loading area for a finished fetch. Returns false if it had
    /// already expired.
    pub fn complete_loading(&mut self, id: FetchId) -> bool {
        let before = self.loading.len();
        self.loading.retain(|area| area.id != id);
        self.loading.len() != before
    }

    /// Sweep loading areas older than the timeout, returning how many were dropped
    pub fn expire_loading(&mut self, now: Instant) -> usize {
        let timeout = self.loading_timeout;
        let before = self.loading.len();
        self.loading.retain(|area| !area.is_expired(now, timeout));
        before - self.loading.len()
    }

    pub fn loaded_grid(&self) -> Option<IndexRange> {
        self.loaded
    }

    pub fn loading_areas(&self) -> &[LoadingArea] {
        &self.loading
    }

    pub fn loading_count(&self) -> usize {
        self.loading.len()
    }

    pub fn loading_timeout(&self) -> Duration {
        self.loading_timeout
    }
}

impl Default for RangeTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}
