//! Result caching for operation evaluation.
//!
//! Provides an LRU cache of evaluated cells keyed by
//! (code, entity, survey), invalidated by data type code.
//! Thread-safe using `parking_lot::RwLock` for LRU operations.
//!
//! Every code carries a generation that moves on each invalidation. An
//! evaluator reads the generation before computing a cell and stores the
//! result with [`ResultCache::put_if_current`], so a value computed from
//! answers that were overwritten mid-flight is dropped instead of cached.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::CacheConfig;
use crate::entity::{EntityRef, SurveyId};

/// Value of one evaluated cell; `None` is a computed null.
pub type CellValue = Option<f64>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    code: String,
    entity: EntityRef,
    survey: SurveyId,
}

impl CacheKey {
    fn new(code: &str, entity: &EntityRef, survey: SurveyId) -> Self {
        Self {
            code: code.to_string(),
            entity: *entity,
            survey,
        }
    }
}

/// Cells plus the invalidation counters guarding them.
struct CacheState {
    cells: LruCache<CacheKey, CellValue>,
    generations: HashMap<String, u64>,
    clears: u64,
}

impl CacheState {
    fn generation(&self, code: &str) -> u64 {
        self.clears + self.generations.get(code).copied().unwrap_or(0)
    }
}

/// Thread-safe LRU cache of evaluated operation cells.
///
/// # Features
///
/// - **LRU Eviction**: When the cache is full, the least recently used cell is evicted.
/// - **No expiry**: Cells stay valid until [`invalidate`](Self::invalidate) removes them.
/// - **Broad invalidation**: Invalidating a code drops its cells for every entity and survey.
/// - **Generations**: [`put_if_current`](Self::put_if_current) refuses cells
///   computed before the latest invalidation of their code.
///
/// # Example
///
/// ```rust
/// use survey_formula_executor::{EntityRef, ResultCache};
///
/// let cache = ResultCache::with_capacity(100);
/// let entity = EntityRef::establishment(1);
///
/// cache.put("Z", &entity, 2024, Some(15.0));
/// assert_eq!(cache.get("Z", &entity, 2024), Some(Some(15.0)));
///
/// cache.invalidate("Z");
/// assert_eq!(cache.get("Z", &entity, 2024), None);
/// ```
pub struct ResultCache {
    inner: RwLock<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl ResultCache {
    /// Creates a new result cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_capacity(config.max_entries)
    }

    /// Creates a cache holding at most `max_entries` cells (at least one).
    pub fn with_capacity(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: RwLock::new(CacheState {
                cells: LruCache::new(capacity),
                generations: HashMap::new(),
                clears: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Gets a cached cell.
    ///
    /// Returns `None` on a miss and `Some(value)` on a hit, where `value`
    /// itself may be a cached null. A hit promotes the cell to most recently
    /// used.
    pub fn get(&self, code: &str, entity: &EntityRef, survey: SurveyId) -> Option<CellValue> {
        let key = CacheKey::new(code, entity, survey);
        let cached = self.inner.write().cells.get(&key).copied();

        match cached {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        cached
    }

    /// Stores a cell, evicting the least recently used one if full.
    pub fn put(&self, code: &str, entity: &EntityRef, survey: SurveyId, value: CellValue) {
        let key = CacheKey::new(code, entity, survey);
        self.inner.write().cells.put(key, value);
    }

    /// Returns the current generation of `code`.
    ///
    /// The generation changes whenever `code` is invalidated or the cache is
    /// cleared.
    pub fn generation(&self, code: &str) -> u64 {
        self.inner.read().generation(code)
    }

    /// Stores a cell only if `code` has not been invalidated since
    /// `generation` was read.
    ///
    /// Returns `false` when the cell was refused.
    pub fn put_if_current(
        &self,
        code: &str,
        entity: &EntityRef,
        survey: SurveyId,
        value: CellValue,
        generation: u64,
    ) -> bool {
        let mut state = self.inner.write();
        if state.generation(code) != generation {
            debug!(code, %entity, survey, "cell computed before invalidation, not cached");
            return false;
        }
        state.cells.put(CacheKey::new(code, entity, survey), value);
        true
    }

    /// Checks if a cell is cached (without affecting LRU order).
    pub fn contains(&self, code: &str, entity: &EntityRef, survey: SurveyId) -> bool {
        self.inner
            .read()
            .cells
            .contains(&CacheKey::new(code, entity, survey))
    }

    /// Removes every cached cell of `code`, across all entities and surveys.
    ///
    /// Returns the number of cells removed.
    pub fn invalidate(&self, code: &str) -> usize {
        let mut state = self.inner.write();
        *state.generations.entry(code.to_string()).or_default() += 1;
        let keys: Vec<CacheKey> = state
            .cells
            .iter()
            .filter(|(key, _)| key.code == code)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            state.cells.pop(key);
        }
        drop(state);

        self.invalidations.fetch_add(1, Ordering::Relaxed);
        debug!(code, removed = keys.len(), "invalidated cached cells");
        keys.len()
    }

    /// Invalidates several codes; returns the total number of cells removed.
    pub fn invalidate_all<I, S>(&self, codes: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        codes
            .into_iter()
            .map(|code| self.invalidate(code.as_ref()))
            .sum()
    }

    /// Returns the number of cached cells.
    pub fn len(&self) -> usize {
        self.inner.read().cells.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all cells and moves every generation forward.
    pub fn clear(&self) {
        let mut state = self.inner.write();
        state.cells.clear();
        state.clears += 1;
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.inner.read();
        CacheStats {
            entries: state.cells.len(),
            capacity: state.cells.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ResultCache")
            .field("entries", &stats.entries)
            .field("capacity", &stats.capacity)
            .finish()
    }
}

/// Statistics about the cache state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached cells.
    pub entries: usize,
    /// Maximum number of cells.
    pub capacity: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that missed.
    pub misses: u64,
    /// Calls to `invalidate`.
    pub invalidations: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0.0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
