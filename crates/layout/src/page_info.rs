//! Per-page layout bookkeeping

use folio_engine::geom::{Rect, Size};

/// Layout state of one page, owned by the layout engine.
///
/// One entry per page for the life of the document. `pos` and `zoom_real`
/// are rewritten by every layout pass; `visible_ratio` and
/// `page_on_screen` by every visibility recomputation; `content_box` is
/// filled lazily the first time fit-to-content geometry is needed.
#[derive(Debug, Clone)]
pub struct PageInfo {
    /// Page size before rotation, in page units
    pub size: Size,

    /// Cached tight content bounding box (page units); `None` until first use
    pub content_box: Option<Rect>,

    /// Whether the page participates in the current display mode
    pub shown: bool,

    /// Fraction of the page area inside the viewport, 0..=1
    pub visible_ratio: f32,

    /// The page's rectangle on the canvas, device pixels
    pub pos: Rect,

    /// Resolved zoom for this page (1.0 = 100%)
    pub zoom_real: f32,

    /// `pos` projected into viewport coordinates; only meaningful while
    /// `visible_ratio > 0`
    pub page_on_screen: Rect,
}

impl PageInfo {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            content_box: None,
            shown: false,
            visible_ratio: 0.0,
            pos: Rect::default(),
            zoom_real: 0.0,
            page_on_screen: Rect::default(),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.shown && self.visible_ratio > 0.0
    }
}
