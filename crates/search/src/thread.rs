//! Background search driver
//!
//! One search runs at a time: starting a new one cancels and joins the
//! previous thread first. Cancellation is honored at page boundaries via
//! the progress callback; wrap-around is driven here by restarting the
//! scan from the opposite boundary page when the first pass exhausts the
//! document.
//!
//! Results are delivered through `SearchObserver` from the search thread;
//! marshalling back to a UI thread is the caller's concern.

use crate::search::{Direction, SearchProgress, TextSearch};
use crate::selection::TextSel;
use crate::text_cache::DocumentTextCache;
use folio_engine::CancellationToken;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Clone)]
pub enum SearchOutcome {
    Found { selection: TextSel, wrapped: bool },
    NotFound { wrapped: bool },
    Cancelled,
}

pub trait SearchObserver: Send + Sync {
    fn search_progress(&self, _current_page: usize, _total_pages: usize) {}
    fn search_finished(&self, outcome: SearchOutcome);
}

/// Bridges the page-boundary progress hook to the observer and the
/// cancellation token.
struct ProgressBridge {
    observer: Arc<dyn SearchObserver>,
    cancel: CancellationToken,
}

impl SearchProgress for ProgressBridge {
    fn on_progress(&self, current_page: usize, total_pages: usize) -> bool {
        self.observer.search_progress(current_page, total_pages);
        !self.cancel.is_cancelled()
    }
}

pub struct SearchThread {
    cache: Arc<DocumentTextCache>,
    handle: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl SearchThread {
    pub fn new(cache: Arc<DocumentTextCache>) -> Self {
        Self { cache, handle: None, cancel: CancellationToken::new() }
    }

    /// Start a search from `page_no`. A search already in flight is
    /// cancelled and joined first.
    pub fn start(
        &mut self,
        page_no: usize,
        text: &str,
        direction: Direction,
        sensitive: bool,
        observer: Arc<dyn SearchObserver>,
    ) {
        self.cancel_and_join();

        let cache = self.cache.clone();
        let cancel = self.cancel.clone();
        let text = text.to_owned();
        log::debug!("searching for {text:?} from page {page_no}");

        let handle = thread::Builder::new()
            .name("folio-search".into())
            .spawn(move || {
                run_search(cache, cancel, page_no, &text, direction, sensitive, observer);
            })
            .expect("failed to spawn search thread");
        self.handle = Some(handle);
    }

    /// Cancel the in-flight search, if any, and wait for it to finish.
    pub fn cancel_and_join(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.cancel.reset();
    }
}

impl Drop for SearchThread {
    fn drop(&mut self) {
        self.cancel_and_join();
    }
}

fn run_search(
    cache: Arc<DocumentTextCache>,
    cancel: CancellationToken,
    page_no: usize,
    text: &str,
    direction: Direction,
    sensitive: bool,
    observer: Arc<dyn SearchObserver>,
) {
    let mut search = TextSearch::new(cache);
    search.set_direction(direction);
    search.set_sensitive(sensitive);
    search.set_progress(Some(Arc::new(ProgressBridge {
        observer: observer.clone(),
        cancel: cancel.clone(),
    })));

    let mut wrapped = false;
    let mut result = search.find_first(page_no, text);
    if result.is_none() && !cancel.is_cancelled() {
        wrapped = true;
        let boundary = match direction {
            Direction::Forward => 1,
            Direction::Backward => search.page_count(),
        };
        result = search.find_first(boundary, text);
    }

    let outcome = if cancel.is_cancelled() {
        log::debug!("search cancelled on page {}", search.find_page());
        SearchOutcome::Cancelled
    } else {
        match result {
            Some(selection) => SearchOutcome::Found { selection, wrapped },
            None => SearchOutcome::NotFound { wrapped },
        }
    };
    observer.search_finished(outcome);
}
