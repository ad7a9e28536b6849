//! Glyph-range selection
//!
//! A selection is (start page, start glyph) .. (end page, end glyph) over
//! the extracted text, used both for user selection and for search-hit
//! highlighting. Ordering is normalized lazily: dragging a selection
//! upwards leaves start > end, and every consumer tolerates that by
//! swapping on read.

use crate::text_cache::DocumentTextCache;
use folio_engine::geom::Rect;
use std::sync::Arc;

#[derive(Clone)]
pub struct TextSel {
    cache: Arc<DocumentTextCache>,
    start_page: usize,
    start_glyph: usize,
    end_page: usize,
    end_glyph: usize,
    active: bool,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

impl TextSel {
    pub fn new(cache: Arc<DocumentTextCache>) -> Self {
        Self {
            cache,
            start_page: 1,
            start_glyph: 0,
            end_page: 1,
            end_glyph: 0,
            active: false,
        }
    }

    pub(crate) fn from_range(
        cache: Arc<DocumentTextCache>,
        start: (usize, usize),
        end: (usize, usize),
    ) -> Self {
        Self {
            cache,
            start_page: start.0,
            start_glyph: start.1,
            end_page: end.0,
            end_glyph: end.1,
            active: true,
        }
    }

    pub fn reset(&mut self) {
        self.active = false;
    }

    pub fn is_empty(&self) -> bool {
        !self.active
            || (self.start_page == self.end_page && self.start_glyph == self.end_glyph)
    }

    /// Anchor the selection at a glyph; the other end follows via
    /// `select_up_to`.
    pub fn start_at(&mut self, page_no: usize, glyph: usize) {
        self.start_page = page_no;
        self.start_glyph = glyph;
        self.end_page = page_no;
        self.end_glyph = glyph;
        self.active = true;
    }

    /// Extend the selection to a glyph; may precede the anchor.
    pub fn select_up_to(&mut self, page_no: usize, glyph: usize) {
        if !self.active {
            self.start_at(page_no, glyph);
            return;
        }
        self.end_page = page_no;
        self.end_glyph = glyph;
    }

    /// Select the whole word under a glyph (the glyph itself when it is
    /// not a word character)
    pub fn select_word_at(&mut self, page_no: usize, glyph: usize) {
        let text = self.cache.page_text(page_no);
        if glyph >= text.len() {
            return;
        }

        let mut start = glyph;
        let mut end = glyph + 1;
        if is_word_char(text.chars[glyph]) {
            while start > 0 && is_word_char(text.chars[start - 1]) {
                start -= 1;
            }
            while end < text.len() && is_word_char(text.chars[end]) {
                end += 1;
            }
        }
        self.start_at(page_no, start);
        self.select_up_to(page_no, end);
    }

    /// The selection endpoints in document order
    pub fn normalized(&self) -> ((usize, usize), (usize, usize)) {
        let a = (self.start_page, self.start_glyph);
        let b = (self.end_page, self.end_glyph);
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn start(&self) -> (usize, usize) {
        self.normalized().0
    }

    pub fn end(&self) -> (usize, usize) {
        self.normalized().1
    }

    /// Concatenate the selected text, inserting `line_sep` at page
    /// boundaries
    pub fn extract_text(&self, line_sep: &str) -> String {
        if self.is_empty() {
            return String::new();
        }
        let ((p0, g0), (p1, g1)) = self.normalized();

        let mut out = String::new();
        for page_no in p0..=p1 {
            let text = self.cache.page_text(page_no);
            let from = if page_no == p0 { g0 } else { 0 };
            let to = if page_no == p1 { g1 } else { text.len() };
            if page_no > p0 {
                out.push_str(line_sep);
            }
            out.push_str(&text.text_between(from, to));
        }
        out
    }

    /// The selection as (page, rectangle) pairs, one rectangle per text
    /// line, in page coordinates
    pub fn result(&self) -> Vec<(usize, Rect)> {
        if self.is_empty() {
            return Vec::new();
        }
        let ((p0, g0), (p1, g1)) = self.normalized();

        let mut rects = Vec::new();
        for page_no in p0..=p1 {
            let text = self.cache.page_text(page_no);
            let from = if page_no == p0 { g0 } else { 0 };
            let to = if page_no == p1 { g1 } else { text.len() };

            let mut line: Option<Rect> = None;
            for glyph in from..to.min(text.boxes.len()) {
                let b = text.boxes[glyph];
                if b.is_empty() {
                    continue;
                }
                match line {
                    // Same baseline: grow the line rectangle.
                    Some(rect) if (rect.y - b.y).abs() < b.height * 0.5 => {
                        line = Some(rect.union(&b));
                    }
                    Some(rect) => {
                        rects.push((page_no, rect));
                        line = Some(b);
                    }
                    None => line = Some(b),
                }
            }
            if let Some(rect) = line {
                rects.push((page_no, rect));
            }
        }
        rects
    }
}
