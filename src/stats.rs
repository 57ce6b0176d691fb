use hashbrown::HashMap;

/// Key to statistics. `hashbrown` with its default `ahash` hasher.
pub type StatsMap = HashMap<String, Stats>;

/// Running min/max/sum/count for one key.
///
/// A fresh value holds sentinels (`min = +inf`, `max = -inf`) that are only
/// ever observed before the first [`Stats::fold`]. Entries in a [`StatsMap`]
/// are always folded at least once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    min: f32,
    max: f32,
    // An f32 count stops incrementing at 2^24, so the count is an exact
    // integer and the sum widens to f64 to keep the mean stable past that.
    sum: f64,
    count: u64,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
            sum: 0.,
            count: 0,
        }
    }
}

impl Stats {
    pub fn fold(&mut self, value: f32) -> &mut Self {
        debug_assert!(value.is_finite());
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += f64::from(value);
        self.count += 1;
        self
    }

    /// Combines two partial aggregates of the same key.
    pub fn merge(&mut self, other: &Stats) -> &mut Self {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.count += other.count;
        self
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// `None` until the first fold.
    pub fn mean(&self) -> Option<f32> {
        (self.count > 0).then(|| (self.sum / self.count as f64) as f32)
    }
}
