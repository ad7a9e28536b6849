//! Display modes and virtual zoom
//!
//! A display mode decides which pages are shown together and how many
//! columns the canvas has; a virtual zoom is either a percentage or a
//! symbolic fit policy resolved against the viewport at layout time.

use folio_engine::PreferredLayout;
use serde::{Deserialize, Serialize};

/// How pages are arranged on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DisplayMode {
    /// Resolve to the document's preferred layout at open time
    #[default]
    Automatic,

    /// One page at a time
    SinglePage,

    /// Two pages side by side
    Facing,

    /// Two pages side by side, page 1 alone on the cover row
    BookView,

    /// All pages in one scrollable column
    Continuous,

    /// All pages, two columns
    ContinuousFacing,

    /// All pages, two columns, cover row
    ContinuousBookView,
}

impl DisplayMode {
    pub fn is_continuous(self) -> bool {
        matches!(
            self,
            DisplayMode::Continuous
                | DisplayMode::ContinuousFacing
                | DisplayMode::ContinuousBookView
        )
    }

    /// Number of layout columns (1 or 2)
    pub fn columns(self) -> usize {
        match self {
            DisplayMode::Facing
            | DisplayMode::BookView
            | DisplayMode::ContinuousFacing
            | DisplayMode::ContinuousBookView => 2,
            _ => 1,
        }
    }

    /// Whether page 1 sits alone in the first row
    pub fn show_cover(self) -> bool {
        matches!(self, DisplayMode::BookView | DisplayMode::ContinuousBookView)
    }

    /// Map a document's preferred layout to a concrete display mode
    pub fn from_preferred(layout: PreferredLayout) -> Self {
        match layout {
            PreferredLayout::Single => DisplayMode::SinglePage,
            PreferredLayout::Continuous => DisplayMode::Continuous,
            PreferredLayout::Facing => DisplayMode::Facing,
            PreferredLayout::ContinuousFacing => DisplayMode::ContinuousFacing,
            PreferredLayout::Book => DisplayMode::BookView,
        }
    }
}

/// Virtual zoom: a percentage or a symbolic fit policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ZoomVirtual {
    /// Largest zoom at which the whole page fits the viewport
    FitPage,

    /// Largest zoom at which the page width fits the viewport
    FitWidth,

    /// Fit the page's content bounding box instead of the full page
    FitContent,

    /// Fixed percentage (100.0 = 100%)
    Percent(f32),
}

impl Default for ZoomVirtual {
    fn default() -> Self {
        ZoomVirtual::FitPage
    }
}

impl ZoomVirtual {
    pub fn is_fit(self) -> bool {
        !matches!(self, ZoomVirtual::Percent(_))
    }
}
