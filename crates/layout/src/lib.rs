//! Folio Layout Library
//!
//! Pure geometry for the document viewer: display modes, virtual zoom,
//! page placement on a scrollable canvas, visibility tracking, navigation
//! history and persisted view state. No rendering happens here.

pub mod layout;
pub mod mode;
pub mod nav;
pub mod page_info;
pub mod state;

pub use layout::{LayoutConfig, LayoutError, Margins, NoopHost, PageLayoutEngine, ViewHost};
pub use mode::{DisplayMode, ZoomVirtual};
pub use nav::{NavigationHistory, NAV_HISTORY_LEN};
pub use page_info::PageInfo;
pub use state::{DisplayState, ScrollState};
