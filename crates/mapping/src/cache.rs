//! Stamped interpolation cache.
//!
//! The matcher reads the same cell probabilities many times per iteration and
//! every read costs a log-odds to probability conversion. The cache stores one
//! `(value, stamp)` pair per grid cell; a cached value is valid only while its
//! stamp equals the cache's current stamp, so invalidating the whole cache is
//! a single counter increment.

#[derive(Debug, Clone, Copy, Default)]
struct CacheEntry {
    value: f64,
    stamp: u64,
}

#[derive(Debug, Default)]
pub struct InterpCache {
    entries: Vec<CacheEntry>,
    stamp: u64,
}

impl InterpCache {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            // Zero is the stamp of freshly allocated entries
            stamp: 1,
        }
    }

    /// Grow the cache to match the grid's cell count. Allocation is lazy and
    /// the cache never shrinks.
    pub fn ensure_size(&mut self, cell_count: usize) {
        if self.entries.len() < cell_count {
            self.entries.resize(cell_count, CacheEntry::default());
        }
    }

    /// Invalidate all cached values.
    pub fn reset(&mut self) {
        self.stamp = self
            .stamp
            .checked_add(1)
            .expect("interpolation cache stamp overflow");
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        let entry = self.entries[index];
        (entry.stamp == self.stamp).then_some(entry.value)
    }

    pub fn put(&mut self, index: usize, value: f64) {
        self.entries[index] = CacheEntry {
            value,
            stamp: self.stamp,
        };
    }
}
