//! Bounded bitmap cache
//!
//! Caches rendered tiles keyed by (view, page, rotation, zoom, tile).
//! Entries are handed out as `Arc<CacheEntry>` so a tile being painted
//! stays alive even if it is evicted mid-paint; the table itself never
//! exceeds its configured capacity.

use crate::tile::TilePosition;
use folio_engine::Bitmap;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Identity of one registered document view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub(crate) u64);

/// Identity of a cacheable render result or a pending request
#[derive(Debug, Clone, Copy)]
pub struct RenderKey {
    pub view: ViewId,
    pub page_no: usize,
    pub rotation: i32,
    pub zoom: f32,
    pub tile: TilePosition,
}

impl PartialEq for RenderKey {
    fn eq(&self, other: &Self) -> bool {
        self.view == other.view
            && self.page_no == other.page_no
            && self.rotation == other.rotation
            && self.zoom.to_bits() == other.zoom.to_bits()
            && self.tile == other.tile
    }
}

impl Eq for RenderKey {}

impl Hash for RenderKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.view.hash(state);
        self.page_no.hash(state);
        self.rotation.hash(state);
        self.zoom.to_bits().hash(state);
        self.tile.hash(state);
    }
}

impl RenderKey {
    /// Whether the keys name the same page, ignoring zoom, rotation and
    /// tile
    pub fn same_page(&self, other: &Self) -> bool {
        self.view == other.view && self.page_no == other.page_no
    }

    /// Whether the keys name the same tile slot, ignoring zoom and
    /// rotation (the granularity at which requests supersede each other)
    pub fn same_slot(&self, other: &Self) -> bool {
        self.same_page(other) && self.tile == other.tile
    }

    /// Match against a cached key, optionally wildcarding the zoom
    pub(crate) fn matches(&self, cached: &Self, zoom: ZoomMatch) -> bool {
        self.same_page(cached)
            && self.rotation == cached.rotation
            && self.tile == cached.tile
            && match zoom {
                ZoomMatch::Exact => self.zoom.to_bits() == cached.zoom.to_bits(),
                ZoomMatch::Any => true,
            }
    }
}

/// Zoom matching policy for cache lookups.
///
/// `Any` fetches a stale bitmap at whatever zoom is cached, so the painter
/// can show something immediately while the right zoom renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomMatch {
    Exact,
    Any,
}

/// One cached rendered tile.
///
/// Shared-ownership handle: painters hold an `Arc` while blitting, the
/// cache table holds another. Eviction drops the table's reference only.
pub struct CacheEntry {
    pub key: RenderKey,
    pub bitmap: Bitmap,
    outdated: AtomicBool,
}

impl CacheEntry {
    pub fn new(key: RenderKey, bitmap: Bitmap) -> Self {
        Self { key, bitmap, outdated: AtomicBool::new(false) }
    }

    /// The underlying document content changed since this was rendered;
    /// still paintable, but a re-render is wanted.
    pub fn is_outdated(&self) -> bool {
        self.outdated.load(Ordering::Acquire)
    }

    pub fn mark_outdated(&self) {
        self.outdated.store(true, Ordering::Release);
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries currently in the table
    pub entry_count: usize,

    /// Configured maximum entry count
    pub capacity: usize,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Number of entries evicted to make room
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Internal cache table, guarded by the owning `TileRenderCache` mutex.
///
/// Insertion order doubles as age order: index 0 is the oldest entry.
pub(crate) struct CacheState {
    entries: Vec<Arc<CacheEntry>>,
    capacity: usize,

    /// Keys whose last render produced no bitmap; distinct from "pending"
    /// so the UI can show a failure indicator instead of a spinner.
    failed: HashSet<RenderKey>,

    stats: CacheStats,
}

impl CacheState {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            failed: HashSet::new(),
            stats: CacheStats { capacity: capacity.max(1), ..Default::default() },
        }
    }

    /// Look up a cached tile, optionally accepting any zoom
    pub(crate) fn find(&mut self, key: &RenderKey, zoom: ZoomMatch) -> Option<Arc<CacheEntry>> {
        // Prefer an exact-zoom entry even under a wildcard lookup.
        let hit = self
            .entries
            .iter()
            .find(|e| key.matches(&e.key, ZoomMatch::Exact))
            .or_else(|| {
                if zoom == ZoomMatch::Any {
                    self.entries.iter().find(|e| key.matches(&e.key, ZoomMatch::Any))
                } else {
                    None
                }
            })
            .cloned();

        if hit.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        hit
    }

    /// Store a rendered tile, evicting if the table is full.
    ///
    /// Eviction prefers a same-view page listed in `invisible` (its
    /// bitmaps are the least likely to be needed soon), then falls back to
    /// the oldest entry overall. `invisible` is plain data gathered by the
    /// caller before taking the cache lock; no host callback runs under
    /// it. An evicted entry stays alive for as long as a painter still
    /// holds its handle.
    pub(crate) fn add(&mut self, entry: Arc<CacheEntry>, invisible: &HashSet<usize>) {
        self.failed.remove(&entry.key);

        if let Some(i) = self.entries.iter().position(|e| e.key == entry.key) {
            self.entries.remove(i);
        } else if self.entries.len() >= self.capacity {
            let victim = self
                .entries
                .iter()
                .position(|e| {
                    e.key.view == entry.key.view && invisible.contains(&e.key.page_no)
                })
                .unwrap_or(0);
            self.entries.remove(victim);
            self.stats.evictions += 1;
        }

        self.entries.push(entry);
        self.stats.entry_count = self.entries.len();
    }

    /// Distinct page numbers this view has entries for; the store path
    /// snapshots these to ask the host about visibility outside the lock
    pub(crate) fn view_pages(&self, view: ViewId) -> Vec<usize> {
        let mut pages: Vec<usize> = self
            .entries
            .iter()
            .filter(|e| e.key.view == view)
            .map(|e| e.key.page_no)
            .collect();
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    /// Whether an up-to-date entry already satisfies the key
    pub(crate) fn is_fresh(&self, key: &RenderKey) -> bool {
        self.entries
            .iter()
            .any(|e| key.matches(&e.key, ZoomMatch::Exact) && !e.is_outdated())
    }

    /// Mark entries intersecting `pred` as outdated
    pub(crate) fn mark_outdated(&self, pred: &dyn Fn(&CacheEntry) -> bool) {
        for entry in &self.entries {
            if pred(entry) {
                entry.mark_outdated();
            }
        }
    }

    /// Drop entries matching the predicate
    pub(crate) fn drop_where(&mut self, pred: &dyn Fn(&CacheEntry) -> bool) {
        self.entries.retain(|e| !pred(e));
        self.stats.entry_count = self.entries.len();
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.failed.clear();
        self.stats.entry_count = 0;
    }

    pub(crate) fn mark_failed(&mut self, key: RenderKey) {
        self.failed.insert(key);
    }

    pub(crate) fn clear_failed(&mut self, key: &RenderKey) {
        self.failed.remove(key);
    }

    pub(crate) fn clear_failed_for_page(&mut self, view: ViewId, page_no: usize) {
        self.failed.retain(|k| !(k.view == view && k.page_no == page_no));
    }

    pub(crate) fn has_failed(&self, key: &RenderKey) -> bool {
        self.failed.contains(key)
    }

    pub(crate) fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(view: u64, page_no: usize, zoom: f32) -> RenderKey {
        RenderKey {
            view: ViewId(view),
            page_no,
            rotation: 0,
            zoom,
            tile: TilePosition::whole_page(),
        }
    }

    fn entry(key: RenderKey) -> Arc<CacheEntry> {
        Arc::new(CacheEntry::new(key, Bitmap::solid(8, 8, [255; 4])))
    }

    fn all_visible() -> HashSet<usize> {
        HashSet::new()
    }

    #[test]
    fn test_find_exact_and_wildcard_zoom() {
        let mut cache = CacheState::new(8);
        cache.add(entry(key(1, 1, 1.0)), &all_visible());

        assert!(cache.find(&key(1, 1, 1.0), ZoomMatch::Exact).is_some());
        assert!(cache.find(&key(1, 1, 2.0), ZoomMatch::Exact).is_none());

        // Wildcard returns the stale-zoom bitmap.
        let stale = cache.find(&key(1, 1, 2.0), ZoomMatch::Any).unwrap();
        assert_eq!(stale.key.zoom, 1.0);
    }

    #[test]
    fn test_capacity_is_never_exceeded() {
        let mut cache = CacheState::new(4);
        for page_no in 1..=20 {
            cache.add(entry(key(1, page_no, 1.0)), &all_visible());
            assert!(cache.stats().entry_count <= 4);
        }
        assert_eq!(cache.stats().evictions, 16);
    }

    #[test]
    fn test_eviction_prefers_same_view_invisible_page() {
        // Scenario: cache full of view-1 pages, only page 5 visible, plus
        // one entry from view 2. A new view-1 render must evict a view-1
        // invisible page, never the other view's entry.
        let mut cache = CacheState::new(5);
        cache.add(entry(key(2, 1, 1.0)), &all_visible());
        for page_no in 4..=7 {
            cache.add(entry(key(1, page_no, 1.0)), &all_visible());
        }

        let invisible: HashSet<usize> = [4, 6, 7].into_iter().collect();
        cache.add(entry(key(1, 9, 1.0)), &invisible);

        assert!(cache.find(&key(2, 1, 1.0), ZoomMatch::Exact).is_some());
        assert!(cache.find(&key(1, 5, 1.0), ZoomMatch::Exact).is_some());
        assert!(cache.find(&key(1, 9, 1.0), ZoomMatch::Exact).is_some());
        // Page 4 was the oldest invisible page of view 1.
        assert!(cache.find(&key(1, 4, 1.0), ZoomMatch::Exact).is_none());
    }

    #[test]
    fn test_view_pages_deduplicates_per_view() {
        let mut cache = CacheState::new(8);
        cache.add(entry(key(1, 2, 1.0)), &all_visible());
        cache.add(entry(key(1, 2, 2.0)), &all_visible());
        cache.add(entry(key(1, 5, 1.0)), &all_visible());
        cache.add(entry(key(2, 7, 1.0)), &all_visible());

        assert_eq!(cache.view_pages(ViewId(1)), vec![2, 5]);
        assert_eq!(cache.view_pages(ViewId(2)), vec![7]);
        assert!(cache.view_pages(ViewId(3)).is_empty());
    }

    #[test]
    fn test_evicted_entry_survives_while_held() {
        let mut cache = CacheState::new(1);
        cache.add(entry(key(1, 1, 1.0)), &all_visible());

        let held = cache.find(&key(1, 1, 1.0), ZoomMatch::Exact).unwrap();
        cache.add(entry(key(1, 2, 1.0)), &all_visible());

        // The table no longer holds page 1, but the painter's handle does.
        assert!(cache.find(&key(1, 1, 1.0), ZoomMatch::Exact).is_none());
        assert_eq!(held.key.page_no, 1);
        assert_eq!(held.bitmap.width, 8);
    }

    #[test]
    fn test_replacing_same_key_does_not_evict() {
        let mut cache = CacheState::new(2);
        cache.add(entry(key(1, 1, 1.0)), &all_visible());
        cache.add(entry(key(1, 2, 1.0)), &all_visible());
        cache.add(entry(key(1, 1, 1.0)), &all_visible());

        assert_eq!(cache.stats().entry_count, 2);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_outdated_entry_is_found_but_not_fresh() {
        let mut cache = CacheState::new(4);
        cache.add(entry(key(1, 1, 1.0)), &all_visible());
        assert!(cache.is_fresh(&key(1, 1, 1.0)));

        cache.mark_outdated(&|e| e.key.page_no == 1);

        // Still paintable, but no longer satisfies a freshness check.
        let hit = cache.find(&key(1, 1, 1.0), ZoomMatch::Exact).unwrap();
        assert!(hit.is_outdated());
        assert!(!cache.is_fresh(&key(1, 1, 1.0)));
    }

    #[test]
    fn test_random_workload_keeps_invariants() {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let mut cache = CacheState::new(16);
        let mut held = Vec::new();

        for _ in 0..2000 {
            let k = key(rng.gen_range(1..=3), rng.gen_range(1..=40), 1.0);
            match rng.gen_range(0..10) {
                0..=5 => cache.add(entry(k), &all_visible()),
                6..=8 => {
                    if let Some(e) = cache.find(&k, ZoomMatch::Exact) {
                        // Simulate a painter holding entries across evictions.
                        if held.len() < 8 {
                            held.push(e);
                        }
                    }
                }
                _ => held.clear(),
            }
            assert!(cache.stats().entry_count <= 16);
        }

        // Held handles stayed valid regardless of eviction.
        for e in &held {
            assert!(!e.bitmap.pixels.is_empty());
        }
    }

    #[test]
    fn test_failed_marker_is_cleared_by_store() {
        let mut cache = CacheState::new(4);
        let k = key(1, 1, 1.0);
        cache.mark_failed(k);
        assert!(cache.has_failed(&k));

        cache.add(entry(k), &all_visible());
        assert!(!cache.has_failed(&k));
    }
}
