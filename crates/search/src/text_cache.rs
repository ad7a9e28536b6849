//! Per-page extracted text cache
//!
//! Text extraction is synchronous and potentially slow on the first touch
//! of a page; after that the page's glyphs and boxes live here for the
//! rest of the document's life. Unlike the bitmap cache this one is not
//! bounded: extracted text is cheap compared to bitmaps.

use folio_engine::{DocumentEngine, PageText};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub struct DocumentTextCache {
    engine: Arc<dyn DocumentEngine>,
    pages: RwLock<HashMap<usize, Arc<PageText>>>,
}

impl DocumentTextCache {
    pub fn new(engine: Arc<dyn DocumentEngine>) -> Self {
        Self { engine, pages: RwLock::new(HashMap::new()) }
    }

    pub fn page_count(&self) -> usize {
        self.engine.page_count()
    }

    /// The extracted text of a page, extracting it on first use.
    ///
    /// Out-of-range pages yield empty text rather than a panic; callers
    /// iterate page ranges that may briefly overshoot at the wrap point.
    pub fn page_text(&self, page_no: usize) -> Arc<PageText> {
        if page_no < 1 || page_no > self.engine.page_count() {
            return Arc::new(PageText::default());
        }

        if let Some(text) = self.pages.read().unwrap().get(&page_no) {
            return text.clone();
        }

        let extracted = Arc::new(self.engine.extract_page_text(page_no));
        let mut pages = self.pages.write().unwrap();
        // Another thread may have extracted concurrently; keep the first.
        pages.entry(page_no).or_insert(extracted).clone()
    }

    /// Whether a page's text has already been extracted
    pub fn is_cached(&self, page_no: usize) -> bool {
        self.pages.read().unwrap().contains_key(&page_no)
    }
}
