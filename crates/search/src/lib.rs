//! Folio Search Library
//!
//! Text search and selection over extracted page text: a lazy per-page
//! text cache, a glyph-range selection model, a whitespace-tolerant
//! incremental search with per-page skip caching, and a cancellable
//! background search driver.

pub mod search;
pub mod selection;
pub mod text_cache;
pub mod thread;

pub use search::{Direction, SearchProgress, TextSearch};
pub use selection::TextSel;
pub use text_cache::DocumentTextCache;
pub use thread::{SearchObserver, SearchOutcome, SearchThread};
