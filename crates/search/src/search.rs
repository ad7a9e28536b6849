//! Whitespace-tolerant incremental text search
//!
//! A query is matched against the extracted page text in lockstep:
//! whitespace in the query matches any run of whitespace in the text, and
//! the page boundary itself counts as whitespace, so a hit may span two
//! pages. ASCII hyphens and quotes also match their typographic
//! counterparts. Leading/trailing single spaces in the query turn on
//! match-word-start/-end.
//!
//! The search is stateful and directional: `find_first` positions it,
//! `find_next` resumes from the previous hit. Pages proven empty for the
//! current query are remembered in a per-page skip cache.

use crate::selection::TextSel;
use crate::text_cache::DocumentTextCache;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// Page-granular progress reporting. Returning `false` stops the scan at
/// the next page boundary; a partially scanned page is never abandoned
/// mid-page.
pub trait SearchProgress: Send + Sync {
    fn on_progress(&self, _current_page: usize, _total_pages: usize) -> bool {
        true
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

pub struct TextSearch {
    cache: Arc<DocumentTextCache>,
    query: Vec<char>,
    /// First word of the query (or its first non-word character), compared
    /// verbatim to pre-filter candidate positions before the full
    /// whitespace-tolerant walk.
    anchor: Vec<char>,
    sensitive: bool,
    match_word_start: bool,
    match_word_end: bool,
    direction: Direction,
    find_page: usize,
    find_index: usize,
    /// Pages known to contain no match for the current query and flags.
    skip: Vec<bool>,
    progress: Option<Arc<dyn SearchProgress>>,
}

impl TextSearch {
    pub fn new(cache: Arc<DocumentTextCache>) -> Self {
        let pages = cache.page_count();
        Self {
            cache,
            query: Vec::new(),
            anchor: Vec::new(),
            sensitive: false,
            match_word_start: false,
            match_word_end: false,
            direction: Direction::Forward,
            find_page: 1,
            find_index: 0,
            skip: vec![false; pages],
            progress: None,
        }
    }

    pub fn page_count(&self) -> usize {
        self.cache.page_count()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The page the next scan starts on. `page_count + 1` (forward) and
    /// `0` (backward) signal an exhausted scan; the caller wraps around by
    /// calling `find_first` from the opposite boundary.
    pub fn find_page(&self) -> usize {
        self.find_page
    }

    /// Set the query. A single leading space means "match word start", a
    /// single trailing space "match word end"; the spaces themselves are
    /// not part of the stored query.
    pub fn set_text(&mut self, text: &str) {
        let match_word_start = text.starts_with(' ') && !text.starts_with("  ");
        let match_word_end = text.ends_with(' ') && !text.ends_with("  ");
        let query: Vec<char> = text.trim().chars().collect();

        if query == self.query
            && match_word_start == self.match_word_start
            && match_word_end == self.match_word_end
        {
            return;
        }
        self.query = query;
        self.match_word_start = match_word_start;
        self.match_word_end = match_word_end;
        self.anchor = anchor_of(&self.query);
        self.reset_skip();
    }

    pub fn set_sensitive(&mut self, sensitive: bool) {
        if sensitive != self.sensitive {
            self.sensitive = sensitive;
            self.reset_skip();
        }
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn set_progress(&mut self, progress: Option<Arc<dyn SearchProgress>>) {
        self.progress = progress;
    }

    /// Seed the scan position from an existing selection, so search
    /// continues from user-driven selection without re-running a query.
    pub fn set_last_result(&mut self, sel: &TextSel) {
        let (page, glyph) = match self.direction {
            Direction::Forward => sel.end(),
            Direction::Backward => sel.start(),
        };
        self.find_page = page;
        self.find_index = glyph;
    }

    /// Position the search at `page_no` and scan for the first hit. An
    /// empty query finds nothing.
    pub fn find_first(&mut self, page_no: usize, text: &str) -> Option<TextSel> {
        self.set_text(text);
        if self.query.is_empty() {
            return None;
        }
        self.find_page = page_no.clamp(1, self.page_count());
        self.find_index = match self.direction {
            Direction::Forward => 0,
            Direction::Backward => usize::MAX,
        };
        self.find_next()
    }

    /// Scan for the next hit from the current position.
    pub fn find_next(&mut self) -> Option<TextSel> {
        if self.query.is_empty() {
            return None;
        }
        let total = self.page_count();
        loop {
            match self.direction {
                Direction::Forward if self.find_page > total => return None,
                Direction::Backward if self.find_page < 1 => return None,
                _ => {}
            }
            if let Some(progress) = &self.progress {
                if !progress.on_progress(self.find_page, total) {
                    return None;
                }
            }

            let hit = match self.direction {
                Direction::Forward => self.scan_page_forward(),
                Direction::Backward => self.scan_page_backward(),
            };
            if hit.is_some() {
                return hit;
            }
            match self.direction {
                Direction::Forward => {
                    self.find_page += 1;
                    self.find_index = 0;
                }
                Direction::Backward => {
                    self.find_page -= 1;
                    self.find_index = usize::MAX;
                }
            }
        }
    }

    fn scan_page_forward(&mut self) -> Option<TextSel> {
        let page = self.find_page;
        let whole_page = self.find_index == 0;
        if whole_page && self.skip[page - 1] {
            return None;
        }
        let text = self.cache.page_text(page);

        let mut start = self.find_index;
        while start + self.anchor.len() <= text.len() {
            if let Some(end) = self.try_match(page, &text, start) {
                // Resume past the hit; cross-page hits resume on the end
                // page.
                self.find_page = end.0;
                self.find_index = end.1;
                return Some(TextSel::from_range(self.cache.clone(), (page, start), end));
            }
            start += 1;
        }
        if whole_page {
            self.skip[page - 1] = true;
        }
        None
    }

    fn scan_page_backward(&mut self) -> Option<TextSel> {
        let page = self.find_page;
        let whole_page = self.find_index == usize::MAX;
        if whole_page && self.skip[page - 1] {
            return None;
        }
        let text = self.cache.page_text(page);
        let limit = self.find_index.min(text.len());

        // Scan forward, keep the last hit starting before the limit.
        let mut last: Option<((usize, usize), (usize, usize))> = None;
        let mut start = 0;
        while start < limit && start + self.anchor.len() <= text.len() {
            if let Some(end) = self.try_match(page, &text, start) {
                last = Some(((page, start), end));
            }
            start += 1;
        }
        if let Some((hit_start, hit_end)) = last {
            self.find_index = hit_start.1;
            return Some(TextSel::from_range(self.cache.clone(), hit_start, hit_end));
        }
        if whole_page {
            self.skip[page - 1] = true;
        }
        None
    }

    /// Full match attempt at a candidate position: anchor pre-filter,
    /// lockstep walk, word-boundary checks, visible-rectangle check.
    fn try_match(
        &self,
        page: usize,
        text: &Arc<folio_engine::PageText>,
        start: usize,
    ) -> Option<(usize, usize)> {
        for (i, &a) in self.anchor.iter().enumerate() {
            if !self.chars_match(a, text.chars[start + i]) {
                return None;
            }
        }
        let end = self.match_end(page, text, start)?;
        if !self.has_visible_box(page, text, start, end) {
            return None;
        }
        Some(end)
    }

    /// Walk query and text in lockstep from `start`; returns the exclusive
    /// end position of the match.
    fn match_end(
        &self,
        start_page: usize,
        start_text: &Arc<folio_engine::PageText>,
        start: usize,
    ) -> Option<(usize, usize)> {
        debug_assert!(!self.query.is_empty());

        if self.match_word_start
            && start > 0
            && is_word_char(start_text.chars[start - 1])
            && is_word_char(self.query[0])
        {
            return None;
        }

        let mut page = start_page;
        let mut text = start_text.clone();
        let mut idx = start;
        for qi in 0..self.query.len() {
            let q = self.query[qi];
            if q.is_whitespace() {
                // One whitespace in the query eats a whole run in the
                // text; the page boundary counts as whitespace too.
                let mut consumed = 0usize;
                loop {
                    if idx >= text.len() {
                        if page >= self.page_count() {
                            break;
                        }
                        page += 1;
                        idx = 0;
                        text = self.cache.page_text(page);
                        consumed += 1;
                        continue;
                    }
                    if text.chars[idx].is_whitespace() {
                        idx += 1;
                        consumed += 1;
                    } else {
                        break;
                    }
                }
                if consumed == 0 {
                    return None;
                }
            } else {
                if idx >= text.len() || !self.chars_match(q, text.chars[idx]) {
                    return None;
                }
                idx += 1;
            }
        }

        if self.match_word_end
            && idx < text.len()
            && is_word_char(text.chars[idx])
            && is_word_char(*self.query.last().unwrap())
        {
            return None;
        }
        Some((page, idx))
    }

    /// A hit whose glyphs are all off-page (empty boxes) is not shown to
    /// the user and is skipped.
    fn has_visible_box(
        &self,
        start_page: usize,
        start_text: &Arc<folio_engine::PageText>,
        start: usize,
        end: (usize, usize),
    ) -> bool {
        let first_end = if end.0 == start_page { end.1 } else { start_text.len() };
        for i in start..first_end.min(start_text.boxes.len()) {
            if !start_text.boxes[i].is_empty() {
                return true;
            }
        }
        if end.0 != start_page {
            let text = self.cache.page_text(end.0);
            for i in 0..end.1.min(text.boxes.len()) {
                if !text.boxes[i].is_empty() {
                    return true;
                }
            }
        }
        false
    }

    fn chars_match(&self, q: char, c: char) -> bool {
        let (q, c) = if self.sensitive { (q, c) } else { (fold(q), fold(c)) };
        if q == c {
            return true;
        }
        match q {
            '-' => matches!(c, '\u{2010}' | '\u{2011}' | '\u{2013}' | '\u{2014}' | '\u{2212}'),
            '\'' => matches!(c, '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}'),
            '"' => matches!(c, '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}'),
            _ => false,
        }
    }

    fn reset_skip(&mut self) {
        self.skip.iter_mut().for_each(|s| *s = false);
    }
}

/// The query's first word (or its first non-word character)
fn anchor_of(query: &[char]) -> Vec<char> {
    match query.first() {
        None => Vec::new(),
        Some(&c) if !is_word_char(c) => vec![c],
        _ => query.iter().copied().take_while(|&c| is_word_char(c)).collect(),
    }
}
