//! Power-of-two tile addressing
//!
//! A page at resolution `res` is divided into `2^res x 2^res` tiles;
//! `res = 0` is the whole page. Tiles bound per-render memory and time on
//! very large pages: instead of one enormous bitmap, the painter asks for
//! the few tiles intersecting the viewport.

use folio_engine::geom::{Rect, Size};

/// Upper bound on the tile resolution (2^res must fit comfortably in u32)
pub const MAX_TILE_RES: u32 = 30;

/// Position of one tile within a page's tile grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TilePosition {
    /// Resolution level; the page is split into `2^res x 2^res` tiles
    pub res: u32,

    /// Row within the grid, `< 2^res`
    pub row: u32,

    /// Column within the grid, `< 2^res`
    pub col: u32,
}

impl TilePosition {
    pub fn new(res: u32, row: u32, col: u32) -> Self {
        debug_assert!(res <= MAX_TILE_RES);
        debug_assert!(row < (1u32 << res.min(MAX_TILE_RES)) || res == 0 && row == 0);
        debug_assert!(col < (1u32 << res.min(MAX_TILE_RES)) || res == 0 && col == 0);
        Self { res, row, col }
    }

    /// The whole-page tile
    pub fn whole_page() -> Self {
        Self { res: 0, row: 0, col: 0 }
    }

    /// Number of tiles per side at this resolution
    pub fn side(self) -> u32 {
        1u32 << self.res
    }

    /// The four tiles covering this one at the next resolution
    pub fn children(self) -> [TilePosition; 4] {
        let res = self.res + 1;
        let row = self.row * 2;
        let col = self.col * 2;
        [
            TilePosition { res, row, col },
            TilePosition { res, row, col: col + 1 },
            TilePosition { res, row: row + 1, col },
            TilePosition { res, row: row + 1, col: col + 1 },
        ]
    }

    /// The fraction of the page this tile covers, all coordinates in 0..=1
    pub fn fraction(self) -> Rect {
        let side = self.side() as f32;
        Rect::new(
            self.col as f32 / side,
            self.row as f32 / side,
            1.0 / side,
            1.0 / side,
        )
    }

    /// This tile's rectangle within a concrete page rectangle
    pub fn rect_on(self, page: &Rect) -> Rect {
        let f = self.fraction();
        Rect::new(
            page.x + f.x * page.width,
            page.y + f.y * page.height,
            f.width * page.width,
            f.height * page.height,
        )
    }
}

/// Pick the tile resolution for a page rendered at `page_device` pixels.
///
/// The factor is the geometric mean of the per-axis ratios against the
/// maximum tile size, so an extreme aspect ratio does not shrink tiles
/// aggressively on one axis. The factor is halved when the page already
/// fits the viewport on an axis, when the zoom is a fit policy (the page
/// is about to be rezoomed anyway), or when the backend cannot render a
/// clipped region efficiently.
pub fn select_tile_resolution(
    page_device: Size,
    viewport: Size,
    max_tile_size: f32,
    fit_zoom: bool,
    clip_optimized: bool,
) -> u32 {
    if page_device.is_empty() || max_tile_size <= 0.0 {
        return 0;
    }

    let factor_w = page_device.width / max_tile_size;
    let factor_h = page_device.height / max_tile_size;
    let mut factor = (factor_w * factor_h).sqrt();

    let fits_axis =
        page_device.width <= viewport.width || page_device.height <= viewport.height;
    if fits_axis || fit_zoom || !clip_optimized {
        factor /= 2.0;
    }

    if factor <= 1.5 {
        return 0;
    }
    (factor.log2().ceil() as u32).min(MAX_TILE_RES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_page_tile() {
        let tile = TilePosition::whole_page();
        assert_eq!(tile.side(), 1);
        assert_eq!(tile.fraction(), Rect::new(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn test_children_cover_parent() {
        let tile = TilePosition::new(1, 1, 0);
        let children = tile.children();

        let parent = tile.fraction();
        let mut area = 0.0;
        for child in children {
            assert_eq!(child.res, 2);
            let f = child.fraction();
            assert_eq!(f.intersect(&parent), f, "child inside parent");
            area += f.width * f.height;
        }
        assert!((area - parent.width * parent.height).abs() < 1e-6);
    }

    #[test]
    fn test_grid_covers_page_without_overlap() {
        // At any resolution the tile grid partitions the page exactly.
        let page = Rect::new(0.0, 0.0, 1024.0, 2048.0);
        for res in [1u32, 2, 3] {
            let side = 1u32 << res;
            let mut area = 0.0;
            for row in 0..side {
                for col in 0..side {
                    let rect = TilePosition::new(res, row, col).rect_on(&page);
                    area += rect.width * rect.height;

                    // No overlap with the horizontally adjacent tile.
                    if col + 1 < side {
                        let next = TilePosition::new(res, row, col + 1).rect_on(&page);
                        assert!(rect.intersect(&next).is_empty());
                        assert_eq!(rect.right(), next.x);
                    }
                }
            }
            assert!((area - page.width * page.height).abs() < 0.5, "res {res}");
        }
    }

    #[test]
    fn test_small_page_needs_no_tiling() {
        let res = select_tile_resolution(
            Size::new(612.0, 792.0),
            Size::new(800.0, 600.0),
            2048.0,
            false,
            true,
        );
        assert_eq!(res, 0);
    }

    #[test]
    fn test_large_page_subdivides() {
        let res = select_tile_resolution(
            Size::new(16384.0, 16384.0),
            Size::new(800.0, 600.0),
            2048.0,
            false,
            true,
        );
        // factor = 8 -> res 3
        assert_eq!(res, 3);
    }

    #[test]
    fn test_fit_zoom_halves_factor() {
        let page = Size::new(8192.0, 8192.0);
        let viewport = Size::new(800.0, 600.0);
        let normal = select_tile_resolution(page, viewport, 2048.0, false, true);
        let fitting = select_tile_resolution(page, viewport, 2048.0, true, true);
        assert_eq!(normal, 2);
        assert_eq!(fitting, 1);
    }

    #[test]
    fn test_no_clip_optimizations_halves_factor() {
        let page = Size::new(8192.0, 8192.0);
        let viewport = Size::new(800.0, 600.0);
        assert_eq!(select_tile_resolution(page, viewport, 2048.0, false, false), 1);
    }

    #[test]
    fn test_resolution_is_clamped() {
        let res = select_tile_resolution(
            Size::new(f32::MAX / 4.0, f32::MAX / 4.0),
            Size::new(1.0, 1.0),
            1.0,
            false,
            true,
        );
        assert!(res <= MAX_TILE_RES);
    }

    #[test]
    fn test_geometric_mean_balances_axes() {
        // A 32768x1024 strip: width alone would demand res 4, but the
        // geometric mean keeps tiles coarse because the height is small.
        let res = select_tile_resolution(
            Size::new(32768.0, 1024.0),
            Size::new(800.0, 600.0),
            2048.0,
            false,
            true,
        );
        // factor = sqrt(16 * 0.5) ~ 2.83 -> res 2
        assert_eq!(res, 2);
    }
}
