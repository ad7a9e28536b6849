//! In-memory document engine
//!
//! A `DocumentEngine` backed by a static list of page sizes and optional
//! page text. Renders solid-color bitmaps sized by the page transform.
//! Used by the tests across the workspace and handy as a blank-document
//! placeholder; it deliberately has no parsing or decoding of its own.

use crate::geom::{Rect, Size};
use crate::{
    Bitmap, CancellationToken, DocumentEngine, PageText, PreferredLayout, RenderArgs,
    RenderError, RenderResult,
};
use std::collections::HashSet;
use std::time::Duration;

/// Glyph metrics for auto-generated page text
const GLYPH_WIDTH: f32 = 6.0;
const GLYPH_HEIGHT: f32 = 10.0;
const LINE_HEIGHT: f32 = 12.0;
const TEXT_MARGIN: f32 = 10.0;

struct StaticPage {
    size: Size,
    content_box: Option<Rect>,
    text: PageText,
}

/// A static in-memory document
///
/// Build with page sizes, then attach text or failure behavior per page:
///
/// ```
/// use folio_engine::{StaticDocument, DocumentEngine};
///
/// let doc = StaticDocument::with_page_sizes(&[(600.0, 800.0); 3])
///     .with_page_text(2, "hello world");
/// assert_eq!(doc.page_count(), 3);
/// assert!(!doc.extract_page_text(2).is_empty());
/// ```
pub struct StaticDocument {
    pages: Vec<StaticPage>,
    rtl: bool,
    layout: PreferredLayout,
    clip_optimizations: bool,
    failing_pages: HashSet<usize>,
    oom_pages: HashSet<usize>,
    render_delay: Duration,
}

impl StaticDocument {
    /// One page per (width, height) pair, in page units
    pub fn with_page_sizes(sizes: &[(f32, f32)]) -> Self {
        let pages = sizes
            .iter()
            .map(|&(width, height)| StaticPage {
                size: Size::new(width, height),
                content_box: None,
                text: PageText::default(),
            })
            .collect();

        Self {
            pages,
            rtl: false,
            layout: PreferredLayout::Single,
            clip_optimizations: true,
            failing_pages: HashSet::new(),
            oom_pages: HashSet::new(),
            render_delay: Duration::ZERO,
        }
    }

    /// `count` identical pages of the given size
    pub fn uniform(count: usize, width: f32, height: f32) -> Self {
        Self::with_page_sizes(&vec![(width, height); count])
    }

    /// Attach text to a page, laying the glyphs out in rows. Whitespace
    /// glyphs get boxes too, so selection ranges stay contiguous.
    pub fn with_page_text(mut self, page_no: usize, text: &str) -> Self {
        let page = &self.pages[page_no - 1];
        let max_x = page.size.width - TEXT_MARGIN;

        let mut chars = Vec::new();
        let mut boxes = Vec::new();
        let mut x = TEXT_MARGIN;
        let mut y = TEXT_MARGIN;

        for c in text.chars() {
            if c == '\n' {
                chars.push(c);
                boxes.push(Rect::new(x, y, 0.0, GLYPH_HEIGHT));
                x = TEXT_MARGIN;
                y += LINE_HEIGHT;
                continue;
            }
            if x + GLYPH_WIDTH > max_x {
                x = TEXT_MARGIN;
                y += LINE_HEIGHT;
            }
            chars.push(c);
            boxes.push(Rect::new(x, y, GLYPH_WIDTH, GLYPH_HEIGHT));
            x += GLYPH_WIDTH;
        }

        self.pages[page_no - 1].text = PageText { chars, boxes };
        self
    }

    /// Attach text with caller-supplied glyph boxes (e.g. boxes outside
    /// the mediabox, to exercise clipped-hit handling)
    pub fn with_page_text_boxes(mut self, page_no: usize, text: &str, boxes: Vec<Rect>) -> Self {
        let chars: Vec<char> = text.chars().collect();
        debug_assert_eq!(chars.len(), boxes.len());
        self.pages[page_no - 1].text = PageText { chars, boxes };
        self
    }

    /// Override the lazy content box for a page
    pub fn with_content_box(mut self, page_no: usize, content_box: Rect) -> Self {
        self.pages[page_no - 1].content_box = Some(content_box);
        self
    }

    pub fn with_rtl(mut self, rtl: bool) -> Self {
        self.rtl = rtl;
        self
    }

    pub fn with_preferred_layout(mut self, layout: PreferredLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn without_clip_optimizations(mut self) -> Self {
        self.clip_optimizations = false;
        self
    }

    /// Make a page permanently fail to render
    pub fn with_failing_page(mut self, page_no: usize) -> Self {
        self.failing_pages.insert(page_no);
        self
    }

    /// Make a page report bitmap allocation failure
    pub fn with_oom_page(mut self, page_no: usize) -> Self {
        self.oom_pages.insert(page_no);
        self
    }

    /// Make every render take at least `delay`, observing the abort token
    /// in 1 ms slices (for cancellation tests)
    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    fn page(&self, page_no: usize) -> Option<&StaticPage> {
        page_no.checked_sub(1).and_then(|i| self.pages.get(i))
    }
}

impl DocumentEngine for StaticDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_mediabox(&self, page_no: usize) -> Rect {
        match self.page(page_no) {
            Some(page) => Rect::from_size(page.size),
            None => {
                debug_assert!(false, "page {page_no} out of range");
                Rect::default()
            }
        }
    }

    fn page_content_box(&self, page_no: usize) -> Rect {
        match self.page(page_no) {
            Some(page) => page.content_box.unwrap_or_else(|| Rect::from_size(page.size)),
            None => Rect::default(),
        }
    }

    fn render_page(&self, args: &RenderArgs, abort: &CancellationToken) -> RenderResult {
        if self.failing_pages.contains(&args.page_no) {
            return Err(RenderError::Failed { page_no: args.page_no });
        }
        if self.oom_pages.contains(&args.page_no) {
            return Err(RenderError::OutOfMemory { page_no: args.page_no });
        }

        if !self.render_delay.is_zero() {
            let mut remaining = self.render_delay;
            let slice = Duration::from_millis(1);
            while !remaining.is_zero() {
                if abort.is_cancelled() {
                    return Err(RenderError::Cancelled);
                }
                let step = slice.min(remaining);
                std::thread::sleep(step);
                remaining -= step;
            }
        }
        if abort.is_cancelled() {
            return Err(RenderError::Cancelled);
        }

        let full = self.transform(args.page_no, args.zoom, args.rotation).target_size();
        let target = args
            .target
            .unwrap_or_else(|| Rect::from_size(full))
            .intersect(&Rect::from_size(full));
        if target.is_empty() {
            return Err(RenderError::Failed { page_no: args.page_no });
        }

        Ok(Bitmap::solid(
            target.width.round().max(1.0) as u32,
            target.height.round().max(1.0) as u32,
            [255, 255, 255, 255],
        ))
    }

    fn extract_page_text(&self, page_no: usize) -> PageText {
        match self.page(page_no) {
            Some(page) => page.text.clone(),
            None => PageText::default(),
        }
    }

    fn has_clip_optimizations(&self, _page_no: usize) -> bool {
        self.clip_optimizations
    }

    fn preferred_layout(&self) -> PreferredLayout {
        self.layout
    }

    fn is_rtl(&self) -> bool {
        self.rtl
    }
}
