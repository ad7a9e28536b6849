//! The tile render cache and its background worker
//!
//! One `TileRenderCache` serves any number of registered document views.
//! Requests go into a bounded queue; a single dedicated worker thread pops
//! them, renders through the view's `DocumentEngine`, and either delivers
//! the bitmap to a one-off callback or stores it in the bounded cache and
//! asks the view to repaint.
//!
//! Lock ordering: the queue mutex may be taken before the cache mutex,
//! never the other way around. Host callbacks run with no lock held, so
//! a host may call back into the cache from any of them.

use crate::cache::{CacheEntry, CacheState, CacheStats, RenderKey, ViewId, ZoomMatch};
use crate::queue::{QueueStats, RenderRequest, RequestQueue};
use crate::tile::select_tile_resolution;
use folio_engine::geom::{Rect, Size};
use folio_engine::{Bitmap, DocumentEngine, RenderArgs, RenderError};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Callbacks from the render cache to a view's owner
pub trait RenderHost: Send + Sync {
    /// A bitmap for this view changed; schedule a redraw
    fn repaint(&self) {}

    /// Whether the page is currently on screen; invisible pages are the
    /// preferred eviction victims
    fn is_page_visible(&self, _page_no: usize) -> bool {
        true
    }
}

/// Host that ignores every notification
pub struct NoopRenderHost;

impl RenderHost for NoopRenderHost {}

/// Tunables for the render cache
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Maximum number of cached bitmaps
    pub cache_capacity: usize,

    /// Maximum number of queued requests
    pub queue_capacity: usize,

    /// Maximum tile dimension in device pixels; halved under memory
    /// pressure, see [`TileRenderCache::reduce_tile_size`]
    pub max_tile_size: f32,

    /// Tile-size reduction floor
    pub min_tile_size: f32,

    /// How long a cancellation waits for the worker's acknowledgment
    pub cancel_deadline: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 64,
            queue_capacity: 8,
            max_tile_size: 2048.0,
            min_tile_size: 128.0,
            cancel_deadline: Duration::from_secs(5),
        }
    }
}

impl RenderConfig {
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_max_tile_size(mut self, size: f32) -> Self {
        self.max_tile_size = size;
        self
    }
}

/// Render progress of one identity, distinguishing "still loading" from
/// "permanently broken"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderDelay {
    /// An up-to-date bitmap is cached
    Cached,

    /// Queued or executing for this long
    Pending(Duration),

    /// The last render produced no bitmap
    Failed,

    /// Nothing cached, queued or failed
    Unrequested,
}

#[derive(Clone)]
struct ViewEntry {
    engine: Arc<dyn DocumentEngine>,
    host: Arc<dyn RenderHost>,
}

struct Executing {
    key: RenderKey,
    abort: folio_engine::CancellationToken,
    started_at: Instant,
}

struct QueueInner {
    queue: RequestQueue,
    executing: Option<Executing>,
    views: HashMap<ViewId, ViewEntry>,
    max_tile_size: f32,
}

struct Shared {
    config: RenderConfig,
    cache: Mutex<CacheState>,
    queue: Mutex<QueueInner>,

    /// Signals the worker that work arrived or shutdown began
    work_cv: Condvar,

    /// Signals waiters that the worker finished (or abandoned) a request
    ack_cv: Condvar,

    shutdown: AtomicBool,
    next_view_id: AtomicU64,
}

/// Bounded bitmap cache with a single background render worker.
///
/// # Example
///
/// ```
/// use folio_render::{RenderConfig, RenderKey, TileRenderCache, TilePosition, NoopRenderHost, ZoomMatch};
/// use folio_engine::StaticDocument;
/// use std::sync::Arc;
///
/// let cache = TileRenderCache::new(RenderConfig::default());
/// let doc = Arc::new(StaticDocument::uniform(1, 612.0, 792.0));
/// let view = cache.register_view(doc, Arc::new(NoopRenderHost));
///
/// let key = RenderKey {
///     view,
///     page_no: 1,
///     rotation: 0,
///     zoom: 1.0,
///     tile: TilePosition::whole_page(),
/// };
/// cache.request_rendering(key);
/// // ... the worker renders in the background; later:
/// let _maybe = cache.find(&key, ZoomMatch::Exact);
/// cache.close_view(view);
/// ```
pub struct TileRenderCache {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl TileRenderCache {
    pub fn new(config: RenderConfig) -> Self {
        let shared = Arc::new(Shared {
            cache: Mutex::new(CacheState::new(config.cache_capacity)),
            queue: Mutex::new(QueueInner {
                queue: RequestQueue::new(config.queue_capacity),
                executing: None,
                views: HashMap::new(),
                max_tile_size: config.max_tile_size,
            }),
            work_cv: Condvar::new(),
            ack_cv: Condvar::new(),
            shutdown: AtomicBool::new(false),
            next_view_id: AtomicU64::new(0),
            config,
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("folio-render".into())
            .spawn(move || worker_loop(&worker_shared))
            .expect("failed to spawn render worker thread");

        Self { shared, worker: Some(worker) }
    }

    /// Register a document view; the returned id scopes every request,
    /// cache entry and cancellation for that view.
    pub fn register_view(
        &self,
        engine: Arc<dyn DocumentEngine>,
        host: Arc<dyn RenderHost>,
    ) -> ViewId {
        let id = ViewId(self.shared.next_view_id.fetch_add(1, Ordering::Relaxed) + 1);
        let mut queue = self.shared.queue.lock().unwrap();
        queue.views.insert(id, ViewEntry { engine, host });
        id
    }

    /// Cancel the view's outstanding work and drop its cache entries.
    /// Must be called before the view is destroyed.
    pub fn close_view(&self, view: ViewId) {
        self.cancel_rendering(view);
        {
            let mut queue = self.shared.queue.lock().unwrap();
            queue.views.remove(&view);
        }
        let mut cache = self.shared.cache.lock().unwrap();
        cache.drop_where(&|e| e.key.view == view);
    }

    /// Look up a cached tile; `ZoomMatch::Any` accepts a stale zoom so the
    /// painter can show something while the right bitmap renders.
    pub fn find(&self, key: &RenderKey, zoom: ZoomMatch) -> Option<Arc<CacheEntry>> {
        self.shared.cache.lock().unwrap().find(key, zoom)
    }

    /// Schedule a background render.
    ///
    /// Idempotent: an identical queued request is promoted, a queued or
    /// in-flight request for the same page slot with different parameters
    /// is superseded, and nothing is enqueued while an up-to-date cache
    /// entry satisfies the key.
    pub fn request_rendering(&self, key: RenderKey) {
        self.submit(RenderRequest::new(key, None));
    }

    /// One-off, non-cached render delivered through `callback`, which
    /// fires exactly once, with `None` on abort or failure.
    pub fn render_thumbnail(
        &self,
        view: ViewId,
        page_no: usize,
        zoom: f32,
        callback: impl FnOnce(Option<Bitmap>) + Send + 'static,
    ) {
        let key = RenderKey {
            view,
            page_no,
            rotation: 0,
            zoom,
            tile: crate::tile::TilePosition::whole_page(),
        };
        self.submit(RenderRequest::new(key, Some(Box::new(callback))));
    }

    fn submit(&self, request: RenderRequest) {
        let displaced;
        {
            let mut queue = self.shared.queue.lock().unwrap();
            if !request.is_one_off() {
                {
                    let mut cache = self.shared.cache.lock().unwrap();
                    if cache.is_fresh(&request.key) {
                        return;
                    }
                    cache.clear_failed(&request.key);
                }
                if let Some(exec) = &queue.executing {
                    if exec.key == request.key && !exec.abort.is_cancelled() {
                        // Already being rendered.
                        return;
                    }
                    if exec.key.same_slot(&request.key) && exec.key != request.key {
                        // Stale parameters in flight: abort and supersede.
                        exec.abort.cancel();
                    }
                }
            }
            let (_, old) = queue.queue.push(request);
            displaced = old;
            self.shared.work_cv.notify_one();
        }
        for old in displaced {
            old.resolve(None);
        }
    }

    /// How far along a render identity is; `Failed` is permanent for the
    /// identity and distinct from `Pending`.
    pub fn render_delay(&self, key: &RenderKey) -> RenderDelay {
        {
            let queue = self.shared.queue.lock().unwrap();
            if let Some(exec) = &queue.executing {
                if exec.key == *key {
                    return RenderDelay::Pending(exec.started_at.elapsed());
                }
            }
            if let Some(queued_at) = queue.queue.queued_at(key) {
                return RenderDelay::Pending(queued_at.elapsed());
            }
        }
        let cache = self.shared.cache.lock().unwrap();
        if cache.is_fresh(key) {
            RenderDelay::Cached
        } else if cache.has_failed(key) {
            RenderDelay::Failed
        } else {
            RenderDelay::Unrequested
        }
    }

    /// The document content under `rect` (page units) changed: flag
    /// intersecting cached tiles as outdated and drop the page's queued
    /// and in-flight work.
    pub fn invalidate(&self, view: ViewId, page_no: usize, rect: Rect) {
        let orphans;
        let entry;
        {
            let mut queue = self.shared.queue.lock().unwrap();
            orphans = queue
                .queue
                .drain_where(|r| r.key.view == view && r.key.page_no == page_no);
            if let Some(exec) = &queue.executing {
                if exec.key.view == view && exec.key.page_no == page_no {
                    exec.abort.cancel();
                }
            }
            entry = queue.views.get(&view).cloned();
        }

        if let Some(view_entry) = &entry {
            let mediabox = view_entry.engine.page_mediabox(page_no);
            let mut cache = self.shared.cache.lock().unwrap();
            cache.mark_outdated(&|e| {
                e.key.view == view
                    && e.key.page_no == page_no
                    && !e.key.tile.rect_on(&mediabox).intersect(&rect).is_empty()
            });
            cache.clear_failed_for_page(view, page_no);
        }

        for request in orphans {
            request.resolve(None);
        }
        if let Some(view_entry) = entry {
            view_entry.host.repaint();
        }
    }

    /// Cancel everything outstanding for a view, blocking until the worker
    /// acknowledges an in-flight abort (bounded by the configured
    /// deadline). Queued requests resolve their callbacks with `None`.
    pub fn cancel_rendering(&self, view: ViewId) {
        let orphans;
        {
            let mut queue = self.shared.queue.lock().unwrap();
            orphans = queue.queue.drain_where(|r| r.key.view == view);
            if let Some(exec) = &queue.executing {
                if exec.key.view == view {
                    exec.abort.cancel();
                }
            }

            let deadline = Instant::now() + self.shared.config.cancel_deadline;
            while queue.executing.as_ref().map_or(false, |e| e.key.view == view) {
                let now = Instant::now();
                if now >= deadline {
                    warn!("render worker did not acknowledge abort in time");
                    break;
                }
                let (guard, _) = self.shared.ack_cv.wait_timeout(queue, deadline - now).unwrap();
                queue = guard;
            }
        }
        for request in orphans {
            request.resolve(None);
        }
    }

    /// Halve the maximum tile dimension after resource exhaustion,
    /// dropping all cached bitmaps and queued work. Returns `false` once
    /// the floor is reached.
    pub fn reduce_tile_size(&self) -> bool {
        reduce_tile_size_inner(&self.shared)
    }

    /// Current maximum tile dimension in device pixels
    pub fn max_tile_size(&self) -> f32 {
        self.shared.queue.lock().unwrap().max_tile_size
    }

    /// Tile resolution for a page of this view at the given zoom
    pub fn tile_resolution(
        &self,
        view: ViewId,
        page_no: usize,
        zoom: f32,
        rotation: i32,
        fit_zoom: bool,
        viewport: Size,
    ) -> u32 {
        let (engine, max_tile) = {
            let queue = self.shared.queue.lock().unwrap();
            (queue.views.get(&view).map(|v| v.engine.clone()), queue.max_tile_size)
        };
        let Some(engine) = engine else {
            return 0;
        };

        let size = engine.page_mediabox(page_no).size();
        let size = if rotation % 180 == 90 { size.transposed() } else { size };
        let device = Size::new(size.width * zoom, size.height * zoom);
        select_tile_resolution(
            device,
            viewport,
            max_tile,
            fit_zoom,
            engine.has_clip_optimizations(page_no),
        )
    }

    pub fn pending_count(&self) -> usize {
        self.shared.queue.lock().unwrap().queue.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.shared.cache.lock().unwrap().stats()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.shared.queue.lock().unwrap().queue.stats()
    }

    pub(crate) fn view_engine(&self, view: ViewId) -> Option<Arc<dyn DocumentEngine>> {
        self.shared.queue.lock().unwrap().views.get(&view).map(|v| v.engine.clone())
    }

    pub(crate) fn drop_other_resolutions(&self, view: ViewId, page_no: usize) {
        let mut cache = self.shared.cache.lock().unwrap();
        cache.drop_where(&|e| {
            e.key.view == view && e.key.page_no == page_no && e.key.tile.res > 0
        });
    }
}

impl Drop for TileRenderCache {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        {
            let queue = self.shared.queue.lock().unwrap();
            if let Some(exec) = &queue.executing {
                exec.abort.cancel();
            }
        }
        self.shared.work_cv.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn reduce_tile_size_inner(shared: &Shared) -> bool {
    let orphans;
    {
        let mut queue = shared.queue.lock().unwrap();
        if queue.max_tile_size / 2.0 < shared.config.min_tile_size {
            return false;
        }
        queue.max_tile_size /= 2.0;
        debug!("reduced max tile size to {}", queue.max_tile_size);
        orphans = queue.queue.drain_all();
        if let Some(exec) = &queue.executing {
            exec.abort.cancel();
        }
    }
    shared.cache.lock().unwrap().clear();
    for request in orphans {
        request.resolve(None);
    }
    true
}

fn render_args(engine: &dyn DocumentEngine, key: &RenderKey) -> RenderArgs {
    if key.tile.res == 0 {
        return RenderArgs::full_page(key.page_no, key.zoom, key.rotation);
    }
    let size = engine.page_mediabox(key.page_no).size();
    let size = if key.rotation % 180 == 90 { size.transposed() } else { size };
    let device = Rect::new(0.0, 0.0, size.width * key.zoom, size.height * key.zoom);
    RenderArgs {
        page_no: key.page_no,
        zoom: key.zoom,
        rotation: key.rotation,
        target: Some(key.tile.rect_on(&device)),
    }
}

/// Cached pages of this view the host reports as off screen, gathered as
/// eviction candidates for the next store. Evaluated with no lock held:
/// `is_page_visible` may call back into the cache.
fn invisible_pages(shared: &Shared, host: &dyn RenderHost, view: ViewId) -> HashSet<usize> {
    let pages = shared.cache.lock().unwrap().view_pages(view);
    pages.into_iter().filter(|&p| !host.is_page_visible(p)).collect()
}

fn clear_executing(shared: &Shared, aborted: bool) {
    let mut queue = shared.queue.lock().unwrap();
    queue.executing = None;
    if aborted {
        queue.queue.record_aborted();
    } else {
        queue.queue.record_completed();
    }
    shared.ack_cv.notify_all();
}

fn worker_loop(shared: &Shared) {
    loop {
        let mut queue = shared.queue.lock().unwrap();
        let request = loop {
            if shared.shutdown.load(Ordering::Acquire) {
                let orphans = queue.queue.drain_all();
                drop(queue);
                for request in orphans {
                    request.resolve(None);
                }
                return;
            }
            if let Some(request) = queue.queue.pop() {
                break request;
            }
            shared.ack_cv.notify_all();
            queue = shared.work_cv.wait(queue).unwrap();
        };

        let view = queue.views.get(&request.key.view).cloned();
        queue.executing = Some(Executing {
            key: request.key,
            abort: request.abort.clone(),
            started_at: Instant::now(),
        });
        drop(queue);

        let Some(view) = view else {
            // The view was closed while this request was queued.
            clear_executing(shared, true);
            request.resolve(None);
            continue;
        };

        let key = request.key;
        let args = render_args(&*view.engine, &key);
        let result = view.engine.render_page(&args, &request.abort);

        // `executing` stays set until the outcome has reached the cache,
        // so a cancel/close waiter acknowledged below can never race ahead
        // of the store it expects to have been suppressed or purged.
        match result {
            Ok(bitmap) if !request.abort.is_cancelled() => {
                if request.is_one_off() {
                    clear_executing(shared, false);
                    request.resolve(Some(bitmap));
                } else {
                    let invisible = invisible_pages(shared, &*view.host, key.view);
                    let entry = Arc::new(CacheEntry::new(key, bitmap));
                    let stored = {
                        let mut cache = shared.cache.lock().unwrap();
                        // A cancellation may have landed while visibility
                        // was being queried.
                        if request.abort.is_cancelled() {
                            false
                        } else {
                            cache.add(entry, &invisible);
                            true
                        }
                    };
                    clear_executing(shared, !stored);
                    request.resolve(None);
                    if stored {
                        view.host.repaint();
                    }
                }
            }
            Ok(_) | Err(RenderError::Cancelled) => {
                debug!("render of page {} aborted", key.page_no);
                clear_executing(shared, true);
                request.resolve(None);
            }
            Err(RenderError::OutOfMemory { page_no }) => {
                warn!("out of memory rendering page {page_no}, reducing tile size");
                clear_executing(shared, false);
                reduce_tile_size_inner(shared);
                request.resolve(None);
                view.host.repaint();
            }
            Err(RenderError::Failed { page_no }) => {
                warn!("page {page_no} failed to render");
                shared.cache.lock().unwrap().mark_failed(key);
                clear_executing(shared, false);
                request.resolve(None);
                view.host.repaint();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TilePosition;
    use folio_engine::StaticDocument;
    use std::sync::atomic::AtomicUsize;

    fn whole_page(view: ViewId, page_no: usize, zoom: f32) -> RenderKey {
        RenderKey { view, page_no, rotation: 0, zoom, tile: TilePosition::whole_page() }
    }

    fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[derive(Default)]
    struct CountingHost {
        repaints: AtomicUsize,
        visible_pages: Mutex<Vec<usize>>,
    }

    impl RenderHost for CountingHost {
        fn repaint(&self) {
            self.repaints.fetch_add(1, Ordering::SeqCst);
        }
        fn is_page_visible(&self, page_no: usize) -> bool {
            self.visible_pages.lock().unwrap().contains(&page_no)
        }
    }

    #[test]
    fn test_render_populates_cache_and_repaints() {
        let cache = TileRenderCache::new(RenderConfig::default());
        let host = Arc::new(CountingHost::default());
        let doc = Arc::new(StaticDocument::uniform(3, 612.0, 792.0));
        let view = cache.register_view(doc, host.clone());

        let key = whole_page(view, 1, 1.0);
        cache.request_rendering(key);

        assert!(wait_until(Duration::from_secs(2), || {
            cache.find(&key, ZoomMatch::Exact).is_some()
        }));
        assert!(host.repaints.load(Ordering::SeqCst) > 0);
        assert_eq!(cache.render_delay(&key), RenderDelay::Cached);
    }

    #[test]
    fn test_burst_requests_leave_one_queued() {
        // Scenario: the worker is busy with page 1; two requests for the
        // same page-2 tile arrive before it finishes.
        let cache = TileRenderCache::new(RenderConfig::default());
        let doc = Arc::new(
            StaticDocument::uniform(3, 612.0, 792.0)
                .with_render_delay(Duration::from_millis(300)),
        );
        let view = cache.register_view(doc, Arc::new(NoopRenderHost));

        cache.request_rendering(whole_page(view, 1, 1.0));
        assert!(wait_until(Duration::from_secs(2), || cache.pending_count() == 0));

        let key = whole_page(view, 2, 1.0);
        cache.request_rendering(key);
        cache.request_rendering(key);
        assert_eq!(cache.pending_count(), 1);

        cache.cancel_rendering(view);
    }

    #[test]
    fn test_cancelled_render_fires_callback_once_without_bitmap() {
        let cache = TileRenderCache::new(RenderConfig::default());
        let doc = Arc::new(
            StaticDocument::uniform(1, 612.0, 792.0)
                .with_render_delay(Duration::from_millis(500)),
        );
        let view = cache.register_view(doc, Arc::new(NoopRenderHost));

        let calls = Arc::new(AtomicUsize::new(0));
        let got_bitmap = Arc::new(AtomicBool::new(false));
        let calls_cb = calls.clone();
        let got_cb = got_bitmap.clone();
        cache.render_thumbnail(view, 1, 0.25, move |bitmap| {
            calls_cb.fetch_add(1, Ordering::SeqCst);
            got_cb.store(bitmap.is_some(), Ordering::SeqCst);
        });

        // Let the worker pick the request up, then abort it.
        thread::sleep(Duration::from_millis(50));
        cache.cancel_rendering(view);

        assert!(wait_until(Duration::from_secs(2), || {
            calls.load(Ordering::SeqCst) == 1
        }));
        assert!(!got_bitmap.load(Ordering::SeqCst));

        // No cache entry for the aborted identity.
        let key = whole_page(view, 1, 0.25);
        assert!(cache.find(&key, ZoomMatch::Any).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_thumbnail_is_delivered_but_not_cached() {
        let cache = TileRenderCache::new(RenderConfig::default());
        let doc = Arc::new(StaticDocument::uniform(1, 612.0, 792.0));
        let view = cache.register_view(doc, Arc::new(NoopRenderHost));

        let delivered = Arc::new(AtomicBool::new(false));
        let delivered_cb = delivered.clone();
        cache.render_thumbnail(view, 1, 0.25, move |bitmap| {
            delivered_cb.store(bitmap.is_some(), Ordering::SeqCst);
        });

        assert!(wait_until(Duration::from_secs(2), || delivered.load(Ordering::SeqCst)));
        assert_eq!(cache.cache_stats().entry_count, 0);
    }

    #[test]
    fn test_failed_render_is_distinct_from_pending() {
        let cache = TileRenderCache::new(RenderConfig::default());
        let doc = Arc::new(StaticDocument::uniform(2, 612.0, 792.0).with_failing_page(2));
        let view = cache.register_view(doc, Arc::new(NoopRenderHost));

        let key = whole_page(view, 2, 1.0);
        assert_eq!(cache.render_delay(&key), RenderDelay::Unrequested);

        cache.request_rendering(key);
        assert!(wait_until(Duration::from_secs(2), || {
            cache.render_delay(&key) == RenderDelay::Failed
        }));
        assert!(cache.find(&key, ZoomMatch::Any).is_none());
    }

    #[test]
    fn test_oom_halves_tile_size() {
        let cache = TileRenderCache::new(RenderConfig::default());
        let doc = Arc::new(StaticDocument::uniform(1, 612.0, 792.0).with_oom_page(1));
        let view = cache.register_view(doc, Arc::new(NoopRenderHost));

        let before = cache.max_tile_size();
        cache.request_rendering(whole_page(view, 1, 1.0));

        assert!(wait_until(Duration::from_secs(2), || {
            cache.max_tile_size() == before / 2.0
        }));
    }

    #[test]
    fn test_reduce_tile_size_stops_at_floor() {
        let cache = TileRenderCache::new(RenderConfig::default());

        let mut reductions = 0;
        while cache.reduce_tile_size() {
            reductions += 1;
            assert!(reductions < 32, "tile size reduction never hit the floor");
        }
        assert!(cache.max_tile_size() >= 128.0);
        assert!(!cache.reduce_tile_size());
    }

    #[test]
    fn test_fresh_entry_suppresses_re_request() {
        let cache = TileRenderCache::new(RenderConfig::default());
        let doc = Arc::new(StaticDocument::uniform(1, 612.0, 792.0));
        let view = cache.register_view(doc, Arc::new(NoopRenderHost));

        let key = whole_page(view, 1, 1.0);
        cache.request_rendering(key);
        assert!(wait_until(Duration::from_secs(2), || {
            cache.find(&key, ZoomMatch::Exact).is_some()
        }));

        let requested = cache.queue_stats().requested;
        cache.request_rendering(key);
        assert_eq!(cache.queue_stats().requested, requested);
        assert_eq!(cache.pending_count(), 0);
    }

    #[test]
    fn test_invalidate_marks_outdated_and_allows_re_render() {
        let cache = TileRenderCache::new(RenderConfig::default());
        let doc = Arc::new(StaticDocument::uniform(1, 612.0, 792.0));
        let view = cache.register_view(doc, Arc::new(NoopRenderHost));

        let key = whole_page(view, 1, 1.0);
        cache.request_rendering(key);
        assert!(wait_until(Duration::from_secs(2), || {
            cache.find(&key, ZoomMatch::Exact).is_some()
        }));

        cache.invalidate(view, 1, Rect::new(0.0, 0.0, 612.0, 792.0));

        // Still paintable, but stale; a new request is accepted again.
        let entry = cache.find(&key, ZoomMatch::Exact).unwrap();
        assert!(entry.is_outdated());

        let requested = cache.queue_stats().requested;
        cache.request_rendering(key);
        assert_eq!(cache.queue_stats().requested, requested + 1);

        cache.cancel_rendering(view);
    }

    #[test]
    fn test_in_flight_superseded_by_new_zoom() {
        let cache = TileRenderCache::new(RenderConfig::default());
        let doc = Arc::new(
            StaticDocument::uniform(1, 612.0, 792.0)
                .with_render_delay(Duration::from_millis(300)),
        );
        let view = cache.register_view(doc, Arc::new(NoopRenderHost));

        cache.request_rendering(whole_page(view, 1, 1.0));
        thread::sleep(Duration::from_millis(50));
        cache.request_rendering(whole_page(view, 1, 2.0));

        let new_key = whole_page(view, 1, 2.0);
        assert!(wait_until(Duration::from_secs(3), || {
            cache.find(&new_key, ZoomMatch::Exact).is_some()
        }));
        // The aborted 1.0 render never landed in the cache.
        assert!(cache.find(&whole_page(view, 1, 1.0), ZoomMatch::Exact).is_none());
    }

    #[test]
    fn test_close_view_drops_entries_and_work() {
        let cache = TileRenderCache::new(RenderConfig::default());
        let doc = Arc::new(StaticDocument::uniform(2, 612.0, 792.0));
        let view = cache.register_view(doc, Arc::new(NoopRenderHost));

        let key = whole_page(view, 1, 1.0);
        cache.request_rendering(key);
        assert!(wait_until(Duration::from_secs(2), || {
            cache.find(&key, ZoomMatch::Exact).is_some()
        }));

        cache.close_view(view);
        assert!(cache.find(&key, ZoomMatch::Any).is_none());
        assert_eq!(cache.cache_stats().entry_count, 0);
    }

    /// Host whose visibility answer consults the cache it belongs to.
    struct ReentrantHost {
        cache: Mutex<Option<std::sync::Weak<TileRenderCache>>>,
        queries: AtomicUsize,
    }

    impl RenderHost for ReentrantHost {
        fn is_page_visible(&self, _page_no: usize) -> bool {
            let cache = self.cache.lock().unwrap().as_ref().and_then(|w| w.upgrade());
            if let Some(cache) = cache {
                let _ = cache.cache_stats();
                self.queries.fetch_add(1, Ordering::SeqCst);
            }
            false
        }
    }

    #[test]
    fn test_host_may_query_cache_from_visibility_callback() {
        let cache = Arc::new(TileRenderCache::new(
            RenderConfig::default().with_cache_capacity(1),
        ));
        let host = Arc::new(ReentrantHost {
            cache: Mutex::new(Some(Arc::downgrade(&cache))),
            queries: AtomicUsize::new(0),
        });
        let doc = Arc::new(StaticDocument::uniform(2, 612.0, 792.0));
        let view = cache.register_view(doc, host.clone());

        cache.request_rendering(whole_page(view, 1, 1.0));
        assert!(wait_until(Duration::from_secs(2), || {
            cache.find(&whole_page(view, 1, 1.0), ZoomMatch::Exact).is_some()
        }));

        // Storing page 2 evicts page 1 and asks the host about visibility;
        // the host calls back into the cache while answering.
        cache.request_rendering(whole_page(view, 2, 1.0));
        assert!(wait_until(Duration::from_secs(2), || {
            cache.find(&whole_page(view, 2, 1.0), ZoomMatch::Exact).is_some()
        }));
        assert!(host.queries.load(Ordering::SeqCst) > 0);

        // The worker is still serving requests afterwards.
        let delivered = Arc::new(AtomicBool::new(false));
        let delivered_cb = delivered.clone();
        cache.render_thumbnail(view, 1, 0.25, move |bitmap| {
            delivered_cb.store(bitmap.is_some(), Ordering::SeqCst);
        });
        assert!(wait_until(Duration::from_secs(2), || delivered.load(Ordering::SeqCst)));
    }

    /// Host that, once armed, stalls the worker's visibility query until
    /// released, holding it between rendering and storing.
    struct GateHost {
        armed: AtomicBool,
        entered: AtomicBool,
        release: AtomicBool,
    }

    impl RenderHost for GateHost {
        fn is_page_visible(&self, _page_no: usize) -> bool {
            if self.armed.load(Ordering::SeqCst) {
                self.entered.store(true, Ordering::SeqCst);
                while !self.release.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
            }
            true
        }
    }

    #[test]
    fn test_cancel_between_render_and_store_keeps_bitmap_out() {
        let cache = Arc::new(TileRenderCache::new(RenderConfig::default()));
        let host = Arc::new(GateHost {
            armed: AtomicBool::new(false),
            entered: AtomicBool::new(false),
            release: AtomicBool::new(false),
        });
        let doc = Arc::new(StaticDocument::uniform(2, 612.0, 792.0));
        let view = cache.register_view(doc, host.clone());

        cache.request_rendering(whole_page(view, 1, 1.0));
        assert!(wait_until(Duration::from_secs(2), || {
            cache.find(&whole_page(view, 1, 1.0), ZoomMatch::Exact).is_some()
        }));

        // Page 2 renders, then the worker stalls in the visibility query.
        host.armed.store(true, Ordering::SeqCst);
        let key = whole_page(view, 2, 1.0);
        cache.request_rendering(key);
        assert!(wait_until(Duration::from_secs(2), || {
            host.entered.load(Ordering::SeqCst)
        }));

        // Cancellation lands inside that window. It must block until the
        // worker acknowledges, and the already-rendered bitmap must not
        // reach the cache afterwards.
        let cancel_cache = cache.clone();
        let canceller = thread::spawn(move || cancel_cache.cancel_rendering(view));
        thread::sleep(Duration::from_millis(100));
        host.release.store(true, Ordering::SeqCst);
        canceller.join().unwrap();

        assert!(cache.find(&key, ZoomMatch::Any).is_none());
        assert_eq!(cache.cache_stats().entry_count, 1);
    }
}
