//! Folio Engine Library
//!
//! The collaborator contract between the viewer core and a concrete
//! document backend. A `DocumentEngine` decodes pages into bitmaps and
//! extracts positioned text; everything above it (layout, render cache,
//! search) is backend-agnostic and talks to this trait only.
//!
//! Pages are numbered 1..=page_count throughout the workspace.

pub mod cancel;
pub mod geom;
pub mod mem;

pub use cancel::CancellationToken;
pub use geom::{normalize_rotation, PageTransform, Point, Rect, Size};
pub use mem::StaticDocument;

use thiserror::Error;

/// Why a page failed to render
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    /// The abort token was honored mid-render. Not a failure; the caller
    /// resolves the pending request as cancelled.
    #[error("rendering was cancelled")]
    Cancelled,

    /// The backend could not allocate the target bitmap. Recoverable by
    /// rendering smaller tiles.
    #[error("out of memory while rendering page {page_no}")]
    OutOfMemory { page_no: usize },

    /// The backend produced no bitmap for this page. Permanent for this
    /// identity; distinct from "still pending".
    #[error("page {page_no} could not be rendered")]
    Failed { page_no: usize },
}

pub type RenderResult = Result<Bitmap, RenderError>;

/// A rendered page or tile, RGBA, 4 bytes per pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Bitmap {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(pixels.len(), (width * height * 4) as usize);
        Self { pixels, width, height }
    }

    /// A solid-color bitmap (blank pages, test fixtures)
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            pixels.extend_from_slice(&rgba);
        }
        Self { pixels, width, height }
    }

    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

/// Extracted text of one page: one entry per glyph, with its bounding box
/// in page coordinates. The two arrays are parallel and equally long.
#[derive(Debug, Clone, Default)]
pub struct PageText {
    pub chars: Vec<char>,
    pub boxes: Vec<Rect>,
}

impl PageText {
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Collect the glyphs in [start, end) into a string
    pub fn text_between(&self, start: usize, end: usize) -> String {
        let end = end.min(self.chars.len());
        if start >= end {
            return String::new();
        }
        self.chars[start..end].iter().collect()
    }
}

/// What a render call should produce
#[derive(Debug, Clone, Copy)]
pub struct RenderArgs {
    /// Page to render, 1-based
    pub page_no: usize,

    /// Real zoom factor (1.0 = 100%)
    pub zoom: f32,

    /// Rotation in degrees, normalized to 0/90/180/270
    pub rotation: i32,

    /// Portion of the zoomed, rotated page to render, in device pixels.
    /// `None` renders the whole page.
    pub target: Option<Rect>,
}

impl RenderArgs {
    pub fn full_page(page_no: usize, zoom: f32, rotation: i32) -> Self {
        Self { page_no, zoom, rotation, target: None }
    }
}

/// Layout hint a document may carry (e.g. from PDF viewer preferences)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreferredLayout {
    #[default]
    Single,
    Continuous,
    Facing,
    ContinuousFacing,
    Book,
}

/// A document backend: page geometry, rendering and text extraction.
///
/// Implementations must be callable from background threads; rendering and
/// text extraction run off the UI thread.
pub trait DocumentEngine: Send + Sync {
    /// Number of pages; a valid document has at least one
    fn page_count(&self) -> usize;

    /// Untransformed page box in page coordinates, 1-based page number
    fn page_mediabox(&self, page_no: usize) -> Rect;

    /// Tight bounding box of the page content. May be expensive; callers
    /// cache the result per page.
    fn page_content_box(&self, page_no: usize) -> Rect {
        self.page_mediabox(page_no)
    }

    /// Render a page (or a tile of it). Honors `abort` cooperatively and
    /// returns `RenderError::Cancelled` when it observed the flag.
    fn render_page(&self, args: &RenderArgs, abort: &CancellationToken) -> RenderResult;

    /// Extract the page's text with per-glyph bounding boxes
    fn extract_page_text(&self, page_no: usize) -> PageText;

    /// Whether the backend renders a clipped target rect faster than the
    /// full page. Backends without this path get coarser tiles.
    fn has_clip_optimizations(&self, _page_no: usize) -> bool {
        true
    }

    /// The document's preferred display layout, if it declares one
    fn preferred_layout(&self) -> PreferredLayout {
        PreferredLayout::Single
    }

    /// Whether the document reads right-to-left (mirrors multi-column layout)
    fn is_rtl(&self) -> bool {
        false
    }

    /// Page-to-device transform for this page at the given zoom/rotation
    fn transform(&self, page_no: usize, zoom: f32, rotation: i32) -> PageTransform {
        PageTransform::new(self.page_mediabox(page_no), zoom, rotation)
    }
}
