//! Page layout engine
//!
//! Maps (display mode, virtual zoom, rotation, viewport) to per-page
//! rectangles on a single logical canvas, tracks the scroll position and
//! page visibility, and owns the navigation history. All geometry is
//! computed here; pixels are somebody else's problem.

use crate::mode::{DisplayMode, ZoomVirtual};
use crate::nav::NavigationHistory;
use crate::page_info::PageInfo;
use crate::state::{DisplayState, ScrollState};
use folio_engine::geom::{normalize_rotation, PageTransform, Point, Rect, Size};
use folio_engine::DocumentEngine;
use log::{debug, warn};
use std::ops::RangeInclusive;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by layout construction
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    /// A valid document has at least one page; anything else is fatal to
    /// the caller that opened it.
    #[error("document has no pages")]
    EmptyDocument,
}

/// Margins around the canvas content, device pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Margins {
    pub fn uniform(v: f32) -> Self {
        Self { top: v, right: v, bottom: v, left: v }
    }

    pub fn horizontal(&self) -> f32 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f32 {
        self.top + self.bottom
    }
}

/// Tunables for the layout engine
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    /// Space between canvas edge and pages
    pub margin: Margins,

    /// Horizontal/vertical gap between adjacent pages
    pub page_spacing: Size,

    /// Thickness a scrollbar steals from the viewport; 0 for overlay
    /// scrollbars or windowless hosts
    pub scrollbar_size: f32,

    /// Display scaling applied to percentage zooms
    pub dpi_factor: f32,

    /// Percentage zoom bounds
    pub zoom_min_percent: f32,
    pub zoom_max_percent: f32,

    /// FitContent cap; content never zooms beyond this factor.
    /// Empirically tuned, not structural.
    pub fit_content_max_zoom: f32,

    /// FitContent keeps the previous zoom for relative growth below this
    /// threshold (anti-flicker). Empirically tuned, not structural.
    pub fit_content_hysteresis: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            margin: Margins::uniform(8.0),
            page_spacing: Size::new(8.0, 8.0),
            scrollbar_size: 0.0,
            dpi_factor: 1.0,
            zoom_min_percent: 8.33,
            zoom_max_percent: 6400.0,
            fit_content_max_zoom: 8.0,
            fit_content_hysteresis: 0.05,
        }
    }
}

impl LayoutConfig {
    pub fn with_margin(mut self, margin: Margins) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_page_spacing(mut self, spacing: Size) -> Self {
        self.page_spacing = spacing;
        self
    }

    pub fn with_scrollbar_size(mut self, size: f32) -> Self {
        self.scrollbar_size = size;
        self
    }

    pub fn with_dpi_factor(mut self, dpi_factor: f32) -> Self {
        self.dpi_factor = dpi_factor;
        self
    }
}

/// Callbacks from the layout engine to its owner.
///
/// Never invoked re-entrantly from inside a lock; the layout engine is
/// single-threaded and these fire at the tail of an operation.
pub trait ViewHost: Send + Sync {
    /// Request a redraw without a layout change
    fn repaint(&self) {}

    /// The scrollable extent changed
    fn update_scrollbars(&self, _canvas: Size) {}

    /// The current page changed (sync a table of contents, title bar, ...)
    fn page_no_changed(&self, _page_no: usize) {}

    /// A page became relevant; schedule its render
    fn request_rendering(&self, _page_no: usize) {}

    /// The view is being destroyed; drop anything tied to it
    fn cleanup(&self) {}
}

/// Host that ignores every notification
pub struct NoopHost;

impl ViewHost for NoopHost {}

/// The page layout engine
///
/// Owned and mutated by a single (UI) thread. Rendering and search run
/// elsewhere and only read snapshots handed to them.
pub struct PageLayoutEngine {
    engine: Arc<dyn DocumentEngine>,
    host: Arc<dyn ViewHost>,
    config: LayoutConfig,

    pages: Vec<PageInfo>,
    mode: DisplayMode,
    rotation: i32,
    zoom_virtual: ZoomVirtual,
    zoom_real: f32,
    rtl: bool,

    viewport: Size,
    scroll: Point,
    canvas: Size,

    /// Anchor page: the shown page in non-continuous modes, the last
    /// observed current page in continuous ones
    current_page: usize,
    last_notified_page: usize,

    nav: NavigationHistory,
    presentation: Option<(DisplayMode, ZoomVirtual)>,
}

impl PageLayoutEngine {
    /// Build the layout state for a freshly opened document and perform
    /// the initial FitPage layout.
    pub fn new(
        engine: Arc<dyn DocumentEngine>,
        host: Arc<dyn ViewHost>,
        mode: DisplayMode,
        viewport: Size,
        config: LayoutConfig,
    ) -> Result<Self, LayoutError> {
        let page_count = engine.page_count();
        if page_count == 0 {
            return Err(LayoutError::EmptyDocument);
        }

        let pages = (1..=page_count)
            .map(|page_no| PageInfo::new(engine.page_mediabox(page_no).size()))
            .collect();

        let mode = match mode {
            DisplayMode::Automatic => DisplayMode::from_preferred(engine.preferred_layout()),
            other => other,
        };
        let rtl = engine.is_rtl();

        let mut layout = Self {
            engine,
            host,
            config,
            pages,
            mode,
            rotation: 0,
            zoom_virtual: ZoomVirtual::default(),
            zoom_real: 0.0,
            rtl,
            viewport,
            scroll: Point::default(),
            canvas: Size::default(),
            current_page: 1,
            last_notified_page: 0,
            nav: NavigationHistory::default(),
            presentation: None,
        };

        layout.set_shown_pages(1);
        layout.relayout(ZoomVirtual::default(), 0);
        Ok(layout)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn zoom_virtual(&self) -> ZoomVirtual {
        self.zoom_virtual
    }

    /// Resolved zoom of the current page
    pub fn zoom_real(&self) -> f32 {
        self.zoom_real
    }

    pub fn rotation(&self) -> i32 {
        self.rotation
    }

    pub fn is_rtl(&self) -> bool {
        self.rtl
    }

    pub fn canvas_size(&self) -> Size {
        self.canvas
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn scroll_pos(&self) -> Point {
        self.scroll
    }

    pub fn page_info(&self, page_no: usize) -> Option<&PageInfo> {
        page_no.checked_sub(1).and_then(|i| self.pages.get(i))
    }

    fn valid_page_no(&self, page_no: usize) -> bool {
        page_no >= 1 && page_no <= self.pages.len()
    }

    /// The pages sharing a row with `page_no` in the current mode
    fn row_range(&self, page_no: usize) -> RangeInclusive<usize> {
        let count = self.pages.len();
        if self.mode.columns() == 1 {
            return page_no..=page_no;
        }
        if self.mode.show_cover() {
            if page_no == 1 {
                return 1..=1;
            }
            let first = if page_no % 2 == 0 { page_no } else { page_no - 1 };
            return first..=(first + 1).min(count);
        }
        let first = if page_no % 2 == 1 { page_no } else { page_no - 1 };
        first..=(first + 1).min(count)
    }

    fn set_shown_pages(&mut self, page_no: usize) {
        if self.mode.is_continuous() {
            for page in &mut self.pages {
                page.shown = true;
            }
        } else {
            let row = self.row_range(page_no);
            for (i, page) in self.pages.iter_mut().enumerate() {
                page.shown = row.contains(&(i + 1));
            }
        }
        self.current_page = page_no;
    }

    /// Rotated (unzoomed) size of a page under the current rotation
    fn rotated_size(&self, page_no: usize) -> Size {
        let size = self.pages[page_no - 1].size;
        if self.rotation % 180 == 90 {
            size.transposed()
        } else {
            size
        }
    }

    fn page_size_px(&self, page_no: usize) -> Size {
        self.rotated_size(page_no).scaled_round(self.pages[page_no - 1].zoom_real)
    }

    /// Lazily computed content bounding box, clipped to the mediabox
    fn content_box(&mut self, page_no: usize) -> Rect {
        if let Some(cached) = self.pages[page_no - 1].content_box {
            return cached;
        }
        let mediabox = self.engine.page_mediabox(page_no);
        let mut content = self.engine.page_content_box(page_no).intersect(&mediabox);
        if content.is_empty() {
            content = mediabox;
        }
        self.pages[page_no - 1].content_box = Some(content);
        content
    }

    /// Zoom at which one page fits the width (and, for `fit_page`, also
    /// the height) of its layout slot
    fn fit_zoom_for_page(&self, page_no: usize, avail: Size, fit_page: bool) -> f32 {
        let cols = self.mode.columns() as f32;
        let inner_w = (avail.width
            - self.config.margin.horizontal()
            - self.config.page_spacing.width * (cols - 1.0))
            .max(1.0);
        let col_w = inner_w / cols;
        let inner_h = (avail.height - self.config.margin.vertical()).max(1.0);

        let size = self.rotated_size(page_no);
        if size.is_empty() {
            return 1.0;
        }
        let zx = col_w / size.width;
        let zy = inner_h / size.height;
        if fit_page {
            zx.min(zy)
        } else {
            zx
        }
    }

    /// Minimum fit zoom across all shown pages, so the largest page fits
    fn fit_zoom_all_shown(&self, avail: Size, fit_page: bool) -> f32 {
        let mut zoom = f32::MAX;
        for page_no in 1..=self.pages.len() {
            if self.pages[page_no - 1].shown {
                zoom = zoom.min(self.fit_zoom_for_page(page_no, avail, fit_page));
            }
        }
        if zoom == f32::MAX {
            1.0
        } else {
            zoom
        }
    }

    fn fit_content_zoom(&mut self, avail: Size) -> f32 {
        let page_no = self.current_page.clamp(1, self.pages.len());
        let content = self.content_box(page_no);
        let size = if self.rotation % 180 == 90 {
            content.size().transposed()
        } else {
            content.size()
        };

        let cols = self.mode.columns() as f32;
        let inner_w = (avail.width
            - self.config.margin.horizontal()
            - self.config.page_spacing.width * (cols - 1.0))
            .max(1.0);
        let col_w = inner_w / cols;
        let inner_h = (avail.height - self.config.margin.vertical()).max(1.0);

        let mut zoom = if size.is_empty() {
            self.fit_zoom_for_page(page_no, avail, true)
        } else {
            (col_w / size.width).min(inner_h / size.height)
        };
        zoom = zoom.min(self.config.fit_content_max_zoom);

        // Anti-flicker: tiny growth does not replace the previous zoom,
        // unless the previous zoom was below the plain FitPage zoom.
        let prev = self.pages[page_no - 1].zoom_real;
        if prev > 0.0 && zoom > prev {
            let fit_page = self.fit_zoom_for_page(page_no, avail, true);
            if zoom / prev < 1.0 + self.config.fit_content_hysteresis && zoom >= fit_page {
                return prev;
            }
        }
        zoom
    }

    fn zoom_real_from_virtual(&mut self, zoom: ZoomVirtual, avail: Size) -> f32 {
        match zoom {
            ZoomVirtual::FitWidth => self.fit_zoom_all_shown(avail, false),
            ZoomVirtual::FitPage => self.fit_zoom_all_shown(avail, true),
            ZoomVirtual::FitContent => self.fit_content_zoom(avail),
            ZoomVirtual::Percent(v) => {
                let v = v.clamp(self.config.zoom_min_percent, self.config.zoom_max_percent);
                v / 100.0 * self.config.dpi_factor
            }
        }
    }

    fn available_viewport(&self, assume_v: bool, assume_h: bool) -> Size {
        Size::new(
            (self.viewport.width - if assume_v { self.config.scrollbar_size } else { 0.0 })
                .max(1.0),
            (self.viewport.height - if assume_h { self.config.scrollbar_size } else { 0.0 })
                .max(1.0),
        )
    }

    /// Recompute every shown page's canvas rectangle and the canvas size.
    ///
    /// Restarts with a reduced viewport when the finished layout turns out
    /// to need a scrollbar the pass didn't account for, at most once per
    /// axis.
    pub fn relayout(&mut self, zoom: ZoomVirtual, rotation: i32) {
        if self.pages.is_empty() {
            return;
        }
        self.rotation = normalize_rotation(rotation);
        self.zoom_virtual = zoom;

        let scroll_ratio_x =
            if self.canvas.width > 0.0 { self.scroll.x / self.canvas.width } else { 0.0 };
        let scroll_y = self.scroll.y;

        let mut assume_v = false;
        let mut assume_h = false;
        for _ in 0..3 {
            let avail = self.available_viewport(assume_v, assume_h);
            self.layout_pass(avail);

            let need_v = self.canvas.height > self.viewport.height;
            let need_h = self.canvas.width > self.viewport.width;
            if (need_v && !assume_v) || (need_h && !assume_h) {
                assume_v |= need_v;
                assume_h |= need_h;
                continue;
            }
            break;
        }

        self.zoom_real = self.pages[self.current_page - 1].zoom_real;
        debug!(
            "relayout: mode={:?} zoom={:?} rotation={} canvas={}x{}",
            self.mode, self.zoom_virtual, self.rotation, self.canvas.width, self.canvas.height
        );

        // Keep the proportional horizontal position across a rezoom; the
        // vertical offset is re-anchored by the caller (goto/fixed-point).
        self.scroll.x = (scroll_ratio_x * self.canvas.width).clamp(0.0, self.max_scroll().x);
        self.scroll.y = scroll_y.clamp(0.0, self.max_scroll().y);

        self.host.update_scrollbars(self.canvas);
        self.recalc_visible_parts();
    }

    fn layout_pass(&mut self, avail: Size) {
        let shown: Vec<usize> =
            (1..=self.pages.len()).filter(|&p| self.pages[p - 1].shown).collect();
        if shown.is_empty() {
            self.canvas = avail;
            return;
        }

        for &page_no in &shown {
            let zoom = self.zoom_real_from_virtual(self.zoom_virtual, avail);
            self.pages[page_no - 1].zoom_real = zoom;
        }

        let cols = self.mode.columns();
        let margin = self.config.margin;
        let spacing = self.config.page_spacing;

        // Assign each shown page a (row, col) slot; a cover row leaves
        // slot 0 empty so page 1 sits in the right-hand column.
        let mut slot = if cols == 2 && self.mode.show_cover() && shown[0] == 1 { 1 } else { 0 };
        let mut placed: Vec<(usize, usize, usize)> = Vec::with_capacity(shown.len());
        for &page_no in &shown {
            placed.push((page_no, slot / cols, slot % cols));
            slot += 1;
        }
        let row_count = placed.last().map(|&(_, row, _)| row + 1).unwrap_or(0);

        let mut col_widths = vec![0.0f32; cols];
        let mut row_heights = vec![0.0f32; row_count];
        for &(page_no, row, col) in &placed {
            let size = self.page_size_px(page_no);
            col_widths[col] = col_widths[col].max(size.width);
            row_heights[row] = row_heights[row].max(size.height);
        }

        // A lone page in a two-column layout would sit half-centered if
        // the empty column collapsed; force both columns equally wide.
        if cols == 2 {
            if col_widths[0] <= 0.0 {
                col_widths[0] = col_widths[1];
            }
            if col_widths[1] <= 0.0 {
                col_widths[1] = col_widths[0];
            }
        }

        for &(page_no, row, col) in &placed {
            let size = self.page_size_px(page_no);
            let col_x = margin.left
                + col_widths[..col].iter().sum::<f32>()
                + spacing.width * col as f32;
            // Right-align the left column and left-align the right one so
            // facing pages meet at the spine; center a single column.
            let offset = if cols == 1 {
                (col_widths[col] - size.width) / 2.0
            } else if col == 0 {
                col_widths[col] - size.width
            } else {
                0.0
            };
            let y = margin.top
                + row_heights[..row].iter().sum::<f32>()
                + spacing.height * row as f32
                + (row_heights[row] - size.height) / 2.0;

            self.pages[page_no - 1].pos = Rect::new(col_x + offset, y, size.width, size.height);
        }

        let content_width =
            col_widths.iter().sum::<f32>() + spacing.width * (cols as f32 - 1.0);
        let content_height =
            row_heights.iter().sum::<f32>() + spacing.height * (row_count as f32 - 1.0);
        self.canvas = Size::new(
            margin.left + content_width + margin.right,
            margin.top + content_height + margin.bottom,
        );

        // Center a canvas smaller than the viewport on both axes.
        if self.canvas.width < avail.width {
            let dx = (avail.width - self.canvas.width) / 2.0;
            for &(page_no, _, _) in &placed {
                self.pages[page_no - 1].pos.x += dx;
            }
            self.canvas.width = avail.width;
        }
        if self.canvas.height < avail.height {
            let dy = (avail.height - self.canvas.height) / 2.0;
            for &(page_no, _, _) in &placed {
                self.pages[page_no - 1].pos.y += dy;
            }
            self.canvas.height = avail.height;
        }

        // Right-to-left documents mirror the horizontal layout.
        if self.rtl && cols > 1 {
            for &(page_no, _, _) in &placed {
                let pos = self.pages[page_no - 1].pos;
                self.pages[page_no - 1].pos.x = self.canvas.width - pos.x - pos.width;
            }
        }
    }

    fn max_scroll(&self) -> Point {
        Point::new(
            (self.canvas.width - self.viewport.width).max(0.0),
            (self.canvas.height - self.viewport.height).max(0.0),
        )
    }

    /// Intersect every shown page with the viewport and update visibility
    pub fn recalc_visible_parts(&mut self) {
        let view =
            Rect::new(self.scroll.x, self.scroll.y, self.viewport.width, self.viewport.height);
        for page in &mut self.pages {
            if !page.shown || page.pos.is_empty() {
                page.visible_ratio = 0.0;
                page.page_on_screen = Rect::default();
                continue;
            }
            let intersection = page.pos.intersect(&view);
            page.visible_ratio =
                ((intersection.area() / page.pos.area()) as f32).clamp(0.0, 1.0);
            page.page_on_screen = page.pos.translated(-self.scroll.x, -self.scroll.y);
        }

        if self.mode.is_continuous() {
            let page_no = self.current_page_no();
            self.current_page = page_no;
        }
    }

    /// The page the user is "on": the most visible page in continuous
    /// modes, the anchor page otherwise.
    pub fn current_page_no(&self) -> usize {
        if !self.mode.is_continuous() {
            return self.current_page;
        }

        let mut best = 0usize;
        let mut best_ratio = 0.0f32;
        for (i, page) in self.pages.iter().enumerate() {
            if page.shown && page.visible_ratio > best_ratio {
                best = i + 1;
                best_ratio = page.visible_ratio;
            }
        }
        if best > 0 {
            return best;
        }

        // Nothing visible: scrolled above all pages defaults to the
        // first page, below them to the last.
        if let Some(first) = self.pages.iter().position(|p| p.shown) {
            if self.scroll.y < self.pages[first].pos.y {
                return first + 1;
            }
        }
        self.pages.iter().rposition(|p| p.shown).map(|i| i + 1).unwrap_or(1)
    }

    pub fn first_visible_page_no(&self) -> usize {
        self.pages
            .iter()
            .position(|p| p.is_visible())
            .map(|i| i + 1)
            .unwrap_or_else(|| self.current_page_no())
    }

    fn notify_view_changed(&mut self) {
        for (i, page) in self.pages.iter().enumerate() {
            if page.is_visible() {
                self.host.request_rendering(i + 1);
            }
        }
        let page_no = self.current_page_no();
        if page_no != self.last_notified_page {
            self.last_notified_page = page_no;
            self.host.page_no_changed(page_no);
        }
        self.host.repaint();
    }

    /// Navigate to a page. `scroll_y`/`scroll_x` are device-pixel offsets
    /// into the page; out-of-range pages are a contract violation and
    /// ignored.
    pub fn go_to_page(
        &mut self,
        page_no: usize,
        scroll_y: f32,
        add_nav_point: bool,
        scroll_x: Option<f32>,
    ) {
        if !self.valid_page_no(page_no) {
            debug_assert!(false, "go_to_page: page {page_no} out of range");
            warn!("go_to_page: page {page_no} out of range");
            return;
        }
        if add_nav_point {
            self.add_nav_point();
        }

        if !self.mode.is_continuous() && !self.pages[page_no - 1].shown {
            self.set_shown_pages(page_no);
            self.relayout(self.zoom_virtual, self.rotation);
        } else {
            self.current_page = page_no;
        }

        let pos = self.pages[page_no - 1].pos;
        let mut target_x = match scroll_x {
            Some(x) => pos.x + x,
            None => self.scroll.x,
        };
        let mut target_y = pos.y - self.config.margin.top + scroll_y;

        // Under FitContent a bare "go to page" aligns with the content
        // box, so trimmed margins don't eat the viewport; facing rows
        // align with whichever sibling's content starts higher.
        if self.zoom_virtual == ZoomVirtual::FitContent && scroll_x.is_none() && scroll_y == 0.0 {
            let row = self.row_range(page_no);
            let mut top = f32::MAX;
            let mut left = f32::MAX;
            for sibling in row {
                let content = self.content_box(sibling);
                let info = &self.pages[sibling - 1];
                let tx = PageTransform::new(
                    self.engine.page_mediabox(sibling),
                    info.zoom_real,
                    self.rotation,
                );
                let device = tx.apply_rect(content);
                top = top.min(info.pos.y + device.y);
                left = left.min(info.pos.x + device.x);
            }
            if top != f32::MAX {
                target_y = top - self.config.margin.top;
                target_x = left - self.config.margin.left;
            }
        }

        let max = self.max_scroll();
        self.scroll.x = target_x.clamp(0.0, max.x);
        self.scroll.y = target_y.clamp(0.0, max.y);

        self.recalc_visible_parts();
        self.current_page = page_no;
        self.notify_view_changed();
    }

    pub fn scroll_x_to(&mut self, x: f32) {
        self.scroll.x = x.clamp(0.0, self.max_scroll().x);
        self.recalc_visible_parts();
        self.notify_view_changed();
    }

    pub fn scroll_x_by(&mut self, dx: f32) {
        self.scroll_x_to(self.scroll.x + dx);
    }

    pub fn scroll_y_to(&mut self, y: f32) {
        self.scroll.y = y.clamp(0.0, self.max_scroll().y);
        self.recalc_visible_parts();
        self.notify_view_changed();
    }

    /// Vertical scroll; in non-continuous modes, overscrolling past a page
    /// boundary turns the page when `change_page` is set.
    pub fn scroll_y_by(&mut self, dy: f32, change_page: bool) {
        if !self.mode.is_continuous() && change_page {
            let max_y = self.max_scroll().y;
            if dy < 0.0 && self.scroll.y <= 0.0 {
                let first = *self.row_range(self.current_page).start();
                if first > 1 {
                    self.go_to_page(first - 1, 0.0, false, None);
                    let bottom = self.max_scroll().y;
                    self.scroll.y = bottom;
                    self.recalc_visible_parts();
                    self.host.repaint();
                    return;
                }
            } else if dy > 0.0 && self.scroll.y >= max_y {
                let last = *self.row_range(self.current_page).end();
                if last < self.pages.len() {
                    self.go_to_page(last + 1, 0.0, false, None);
                    return;
                }
            }
        }
        self.scroll_y_to(self.scroll.y + dy);
    }

    /// Change the zoom; when `fixed` names a viewport point, the document
    /// location under it stays put.
    pub fn set_zoom_virtual(&mut self, zoom: ZoomVirtual, fixed: Option<Point>) {
        if let Some(point) = fixed {
            if let Some(page_no) = self.page_at_point(point) {
                let page_pt = self.cvt_from_screen(point, page_no);
                self.relayout(zoom, self.rotation);
                let moved = self.cvt_to_screen(page_no, page_pt);
                let max = self.max_scroll();
                self.scroll.x = (self.scroll.x + moved.x - point.x).clamp(0.0, max.x);
                self.scroll.y = (self.scroll.y + moved.y - point.y).clamp(0.0, max.y);
                self.recalc_visible_parts();
                self.notify_view_changed();
                return;
            }
        }
        self.relayout(zoom, self.rotation);
        self.notify_view_changed();
    }

    /// Change the display mode, staying on the same page
    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        let mode = match mode {
            DisplayMode::Automatic => DisplayMode::from_preferred(self.engine.preferred_layout()),
            other => other,
        };
        if mode == self.mode {
            return;
        }
        let page_no = self.current_page_no();
        self.mode = mode;
        self.set_shown_pages(page_no);
        self.relayout(self.zoom_virtual, self.rotation);
        self.go_to_page(page_no, 0.0, false, None);
    }

    /// Resize the viewport, preserving the current position
    pub fn set_viewport(&mut self, viewport: Size) {
        if viewport == self.viewport {
            return;
        }
        let state = self.get_scroll_state();
        self.viewport = viewport;
        self.relayout(self.zoom_virtual, self.rotation);
        self.set_scroll_state(state);
    }

    /// Enter presentation mode (single page, fit to screen), remembering
    /// the previous mode and zoom
    pub fn enter_presentation(&mut self) {
        if self.presentation.is_some() {
            return;
        }
        self.presentation = Some((self.mode, self.zoom_virtual));
        let page_no = self.current_page_no();
        self.mode = DisplayMode::SinglePage;
        self.set_shown_pages(page_no);
        self.relayout(ZoomVirtual::FitPage, self.rotation);
        self.go_to_page(page_no, 0.0, false, None);
    }

    /// Restore the mode and zoom saved by `enter_presentation`
    pub fn leave_presentation(&mut self) {
        if let Some((mode, zoom)) = self.presentation.take() {
            let page_no = self.current_page_no();
            self.mode = mode;
            self.set_shown_pages(page_no);
            self.relayout(zoom, self.rotation);
            self.go_to_page(page_no, 0.0, false, None);
        }
    }

    pub fn in_presentation(&self) -> bool {
        self.presentation.is_some()
    }

    // ---- coordinate mapping ----------------------------------------

    /// The shown page under a viewport point, if any
    pub fn page_at_point(&self, screen: Point) -> Option<usize> {
        let canvas_pt = Point::new(screen.x + self.scroll.x, screen.y + self.scroll.y);
        self.pages
            .iter()
            .position(|p| p.shown && p.pos.contains(canvas_pt))
            .map(|i| i + 1)
    }

    fn page_transform(&self, page_no: usize) -> PageTransform {
        PageTransform::new(
            self.engine.page_mediabox(page_no),
            self.pages[page_no - 1].zoom_real,
            self.rotation,
        )
    }

    /// Viewport point to page user-space point
    pub fn cvt_from_screen(&self, screen: Point, page_no: usize) -> Point {
        let pos = self.pages[page_no - 1].pos;
        let device = Point::new(
            screen.x + self.scroll.x - pos.x,
            screen.y + self.scroll.y - pos.y,
        );
        self.page_transform(page_no).inverse(device)
    }

    /// Page user-space point to viewport point
    pub fn cvt_to_screen(&self, page_no: usize, page_pt: Point) -> Point {
        let pos = self.pages[page_no - 1].pos;
        let device = self.page_transform(page_no).apply(page_pt);
        Point::new(device.x + pos.x - self.scroll.x, device.y + pos.y - self.scroll.y)
    }

    /// Page rectangle to viewport rectangle
    pub fn cvt_rect_to_screen(&self, page_no: usize, rect: Rect) -> Rect {
        let pos = self.pages[page_no - 1].pos;
        self.page_transform(page_no)
            .apply_rect(rect)
            .translated(pos.x - self.scroll.x, pos.y - self.scroll.y)
    }

    // ---- persisted state -------------------------------------------

    /// Snapshot the current position in page units
    pub fn get_scroll_state(&self) -> ScrollState {
        let page_no = self.current_page_no();
        let info = &self.pages[page_no - 1];
        let zoom = info.zoom_real.max(f32::EPSILON);
        let dx = self.scroll.x - info.pos.x;
        let dy = self.scroll.y - info.pos.y;
        ScrollState::new(
            page_no,
            (dx > 0.0).then(|| dx / zoom),
            (dy > 0.0).then(|| dy / zoom),
        )
    }

    /// Restore a snapshot taken by `get_scroll_state`
    pub fn set_scroll_state(&mut self, state: ScrollState) {
        if !self.valid_page_no(state.page) {
            debug_assert!(false, "set_scroll_state: page {} out of range", state.page);
            warn!("set_scroll_state: page {} out of range", state.page);
            return;
        }

        if !self.mode.is_continuous() && !self.pages[state.page - 1].shown {
            self.set_shown_pages(state.page);
            self.relayout(self.zoom_virtual, self.rotation);
        }
        self.current_page = state.page;

        let info = &self.pages[state.page - 1];
        let zoom = info.zoom_real;
        let target_x = match state.x {
            Some(x) => info.pos.x + x * zoom,
            None => info.pos.x - self.config.margin.left,
        };
        let target_y = match state.y {
            Some(y) => info.pos.y + y * zoom,
            None => info.pos.y - self.config.margin.top,
        };

        let max = self.max_scroll();
        self.scroll.x = target_x.clamp(0.0, max.x);
        self.scroll.y = target_y.clamp(0.0, max.y);
        self.recalc_visible_parts();
        self.current_page = state.page;
        self.notify_view_changed();
    }

    /// Everything session persistence stores for this view
    pub fn get_display_state(&self) -> DisplayState {
        DisplayState {
            mode: self.mode,
            zoom: self.zoom_virtual,
            rotation: self.rotation,
            rtl: self.rtl,
            scroll: self.get_scroll_state(),
        }
    }

    // ---- navigation history ----------------------------------------

    /// Record the current position before a jump
    pub fn add_nav_point(&mut self) {
        let state = self.get_scroll_state();
        self.nav.add(state);
    }

    pub fn can_navigate(&self, dir: isize) -> bool {
        self.nav.can_navigate(dir)
    }

    /// Move through the navigation history (negative = back)
    pub fn navigate(&mut self, dir: isize) {
        let current = self.get_scroll_state();
        if let Some(target) = self.nav.navigate(dir, current) {
            self.set_scroll_state(target);
        }
    }

    /// Must be called before the view is destroyed
    pub fn close(&mut self) {
        self.host.cleanup();
    }
}
