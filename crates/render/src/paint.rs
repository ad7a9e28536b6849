//! Progressive tiled paint planning
//!
//! The painter asks for a plan instead of blocking on renders: cached
//! tiles are painted immediately (coarse placeholders first, so something
//! is always on screen), missing tiles at the target resolution are
//! enqueued for the background worker, and the plan is re-requested on the
//! repaint that follows each completion.

use crate::cache::{CacheEntry, RenderKey, ViewId, ZoomMatch};
use crate::tile::{TilePosition, MAX_TILE_RES};
use crate::worker::TileRenderCache;
use folio_engine::geom::Rect;
use std::collections::VecDeque;
use std::sync::Arc;

/// One painting step: blit `entry` (or leave the placeholder background if
/// `None`) into `rect` on screen
pub struct PaintOp {
    pub tile: TilePosition,

    /// Where the tile lands on screen, device pixels
    pub rect: Rect,

    /// The bitmap to paint; `None` when nothing usable is cached yet
    pub entry: Option<Arc<CacheEntry>>,

    /// Whether `entry` is the tile at the requested resolution and zoom;
    /// inexact entries are stale placeholders
    pub exact: bool,
}

impl TileRenderCache {
    /// Plan the paint of one page.
    ///
    /// Walks the tile tree breadth-first from the whole-page tile, so ops
    /// are ordered resolution-ascending: coarse placeholders paint before
    /// fine detail. Missing or outdated tiles at `target_res` are
    /// scheduled for rendering. After an exact full-page paint at
    /// resolution 0, the page's subdivided tiles are dropped since the
    /// whole page fit in a single bitmap.
    pub fn paint_plan(
        &self,
        view: ViewId,
        page_no: usize,
        rotation: i32,
        zoom: f32,
        page_on_screen: Rect,
        viewport: Rect,
        target_res: u32,
    ) -> Vec<PaintOp> {
        let target_res = target_res.min(MAX_TILE_RES);
        let mut ops = Vec::new();
        let mut missing = Vec::new();
        let mut full_page_exact = false;

        let mut frontier = VecDeque::from([TilePosition::whole_page()]);
        while let Some(tile) = frontier.pop_front() {
            let rect = tile.rect_on(&page_on_screen);
            if rect.intersect(&viewport).is_empty() {
                continue;
            }

            let key = RenderKey { view, page_no, rotation, zoom, tile };
            if tile.res == target_res {
                match self.find(&key, ZoomMatch::Exact) {
                    Some(entry) => {
                        if entry.is_outdated() {
                            missing.push(key);
                        } else if target_res == 0 {
                            full_page_exact = true;
                        }
                        ops.push(PaintOp { tile, rect, entry: Some(entry), exact: true });
                    }
                    None => {
                        // Show a stale zoom if one is cached, and schedule
                        // the real render.
                        let stale = self.find(&key, ZoomMatch::Any);
                        ops.push(PaintOp { tile, rect, entry: stale, exact: false });
                        missing.push(key);
                    }
                }
            } else {
                // An intermediate resolution: paint it as a placeholder if
                // cached, then descend.
                if let Some(entry) = self.find(&key, ZoomMatch::Exact) {
                    ops.push(PaintOp { tile, rect, entry: Some(entry), exact: false });
                }
                for child in tile.children() {
                    frontier.push_back(child);
                }
            }
        }

        for key in missing {
            self.request_rendering(key);
        }
        if full_page_exact {
            self.drop_other_resolutions(view, page_no);
        }
        ops
    }
}
