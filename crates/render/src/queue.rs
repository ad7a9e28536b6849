//! Pending render requests
//!
//! A bounded queue served from the front, with burst (stack) semantics:
//! new requests are pushed at the serving end, so the most recent request
//! wins priority. Requests are idempotent per identity and supersede older
//! requests for the same page slot.

use crate::cache::RenderKey;
use folio_engine::{Bitmap, CancellationToken};
use std::collections::VecDeque;
use std::time::Instant;

/// Completion callback for one-off (non-cached) renders; receives `None`
/// when the render was aborted, cleared or failed.
pub type RenderCallback = Box<dyn FnOnce(Option<Bitmap>) + Send>;

/// A pending unit of render work
pub struct RenderRequest {
    pub key: RenderKey,

    /// One-off path: deliver the bitmap here instead of caching it
    callback: Option<RenderCallback>,

    /// Cooperative abort flag, honored by the engine mid-render
    pub abort: CancellationToken,

    pub queued_at: Instant,
}

impl RenderRequest {
    pub fn new(key: RenderKey, callback: Option<RenderCallback>) -> Self {
        Self { key, callback, abort: CancellationToken::new(), queued_at: Instant::now() }
    }

    /// Whether this is a one-off render delivered through a callback
    pub fn is_one_off(&self) -> bool {
        self.callback.is_some()
    }

    /// Invoke the completion callback, if any. Consumes the request so the
    /// callback fires at most once on every path (completion, abort,
    /// supersede, queue clear).
    pub fn resolve(mut self, bitmap: Option<Bitmap>) {
        if let Some(callback) = self.callback.take() {
            callback(bitmap);
        }
    }
}

/// What `RequestQueue::push` did with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Enqueued as new work
    Queued,

    /// An identical request already existed and was promoted to the front
    Promoted,

    /// Replaced a queued request for the same page slot
    Superseded,
}

/// Statistics about queue activity
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    /// Requests currently waiting
    pub pending: usize,

    /// Total requests accepted
    pub requested: u64,

    /// Requests that completed with a bitmap
    pub completed: u64,

    /// Requests aborted mid-render
    pub aborted: u64,

    /// Requests displaced by a newer request for the same slot
    pub superseded: u64,
}

/// Bounded request queue, guarded by the owning `TileRenderCache` mutex
pub(crate) struct RequestQueue {
    pending: VecDeque<RenderRequest>,
    capacity: usize,
    stats: QueueStats,
}

impl RequestQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            stats: QueueStats::default(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Accept a request.
    ///
    /// Identical queued requests are promoted instead of duplicated; a
    /// queued cacheable request for the same page slot with different
    /// parameters is replaced. One-off requests never match or displace
    /// cacheable ones. Displaced requests are returned so the caller can
    /// resolve their callbacks outside the lock.
    pub(crate) fn push(
        &mut self,
        request: RenderRequest,
    ) -> (PushOutcome, Vec<RenderRequest>) {
        let mut displaced = Vec::new();

        if let Some(i) = self.pending.iter().position(|r| {
            r.key == request.key && r.is_one_off() == request.is_one_off()
        }) {
            // Idempotent: promote the existing request to the serving end.
            let existing = self.pending.remove(i).unwrap();
            displaced.push(request);
            self.pending.push_front(existing);
            self.stats.pending = self.pending.len();
            return (PushOutcome::Promoted, displaced);
        }

        let mut outcome = PushOutcome::Queued;
        if !request.is_one_off() {
            if let Some(i) = self
                .pending
                .iter()
                .position(|r| !r.is_one_off() && r.key.same_slot(&request.key))
            {
                if let Some(old) = self.pending.remove(i) {
                    displaced.push(old);
                    self.stats.superseded += 1;
                    outcome = PushOutcome::Superseded;
                }
            }
        }

        if self.pending.len() >= self.capacity {
            // Drop the oldest request to stay bounded.
            if let Some(old) = self.pending.pop_back() {
                displaced.push(old);
                self.stats.superseded += 1;
            }
        }

        self.pending.push_front(request);
        self.stats.requested += 1;
        self.stats.pending = self.pending.len();
        (outcome, displaced)
    }

    /// When the request for `key` was queued, if it is still pending
    pub(crate) fn queued_at(&self, key: &RenderKey) -> Option<Instant> {
        self.pending.iter().find(|r| r.key == *key).map(|r| r.queued_at)
    }

    /// Take the next request to serve
    pub(crate) fn pop(&mut self) -> Option<RenderRequest> {
        let request = self.pending.pop_front();
        self.stats.pending = self.pending.len();
        request
    }

    /// Remove every request matching the predicate
    pub(crate) fn drain_where(
        &mut self,
        pred: impl Fn(&RenderRequest) -> bool,
    ) -> Vec<RenderRequest> {
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.pending.len());
        for request in self.pending.drain(..) {
            if pred(&request) {
                removed.push(request);
            } else {
                kept.push_back(request);
            }
        }
        self.pending = kept;
        self.stats.pending = self.pending.len();
        removed
    }

    /// Remove everything
    pub(crate) fn drain_all(&mut self) -> Vec<RenderRequest> {
        let removed = self.pending.drain(..).collect();
        self.stats.pending = 0;
        removed
    }

    pub(crate) fn record_completed(&mut self) {
        self.stats.completed += 1;
    }

    pub(crate) fn record_aborted(&mut self) {
        self.stats.aborted += 1;
    }

    pub(crate) fn stats(&self) -> QueueStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ViewId;
    use crate::tile::TilePosition;

    fn key(page_no: usize, zoom: f32) -> RenderKey {
        RenderKey {
            view: ViewId(1),
            page_no,
            rotation: 0,
            zoom,
            tile: TilePosition::whole_page(),
        }
    }

    #[test]
    fn test_duplicate_request_is_promoted_not_duplicated() {
        // Scenario: the same tile requested twice before the first render
        // completes leaves exactly one queued request.
        let mut queue = RequestQueue::new(8);
        queue.push(RenderRequest::new(key(1, 1.0), None));
        let (outcome, displaced) = queue.push(RenderRequest::new(key(1, 1.0), None));

        assert_eq!(outcome, PushOutcome::Promoted);
        assert_eq!(queue.len(), 1);
        assert_eq!(displaced.len(), 1);
    }

    #[test]
    fn test_newer_request_is_served_first() {
        let mut queue = RequestQueue::new(8);
        queue.push(RenderRequest::new(key(1, 1.0), None));
        queue.push(RenderRequest::new(key(2, 1.0), None));
        queue.push(RenderRequest::new(key(3, 1.0), None));

        // Burst semantics: most recent first.
        assert_eq!(queue.pop().unwrap().key.page_no, 3);
        assert_eq!(queue.pop().unwrap().key.page_no, 2);
        assert_eq!(queue.pop().unwrap().key.page_no, 1);
    }

    #[test]
    fn test_promote_moves_to_serving_end() {
        let mut queue = RequestQueue::new(8);
        queue.push(RenderRequest::new(key(1, 1.0), None));
        queue.push(RenderRequest::new(key(2, 1.0), None));
        queue.push(RenderRequest::new(key(1, 1.0), None));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().key.page_no, 1);
    }

    #[test]
    fn test_same_page_different_zoom_supersedes() {
        let mut queue = RequestQueue::new(8);
        queue.push(RenderRequest::new(key(1, 1.0), None));
        let (outcome, displaced) = queue.push(RenderRequest::new(key(1, 2.0), None));

        assert_eq!(outcome, PushOutcome::Superseded);
        assert_eq!(queue.len(), 1);
        assert_eq!(displaced.len(), 1);
        assert_eq!(queue.pop().unwrap().key.zoom, 2.0);
    }

    #[test]
    fn test_different_tiles_of_one_page_coexist() {
        // Progressive tiling queues sibling tiles of one page; they must
        // not displace each other.
        let mut queue = RequestQueue::new(8);
        for (row, col) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            let mut k = key(1, 1.0);
            k.tile = TilePosition::new(1, row, col);
            queue.push(RenderRequest::new(k, None));
        }
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_one_off_does_not_displace_cacheable() {
        let mut queue = RequestQueue::new(8);
        queue.push(RenderRequest::new(key(1, 1.0), None));
        let (outcome, _) =
            queue.push(RenderRequest::new(key(1, 0.25), Some(Box::new(|_| {}))));

        // A thumbnail for the same page rides alongside the page render.
        assert_eq!(outcome, PushOutcome::Queued);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut queue = RequestQueue::new(3);
        for page_no in 1..=4 {
            queue.push(RenderRequest::new(key(page_no, 1.0), None));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().unwrap().key.page_no, 4);
        assert_eq!(queue.pop().unwrap().key.page_no, 3);
        assert_eq!(queue.pop().unwrap().key.page_no, 2);
    }

    #[test]
    fn test_drain_where_removes_matching() {
        let mut queue = RequestQueue::new(8);
        queue.push(RenderRequest::new(key(1, 1.0), None));
        queue.push(RenderRequest::new(key(2, 1.0), None));
        queue.push(RenderRequest::new(key(3, 1.0), None));

        let removed = queue.drain_where(|r| r.key.page_no == 2);
        assert_eq!(removed.len(), 1);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_resolve_fires_callback_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let request = RenderRequest::new(
            key(1, 1.0),
            Some(Box::new(move |bitmap| {
                assert!(bitmap.is_none());
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })),
        );

        request.resolve(None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
