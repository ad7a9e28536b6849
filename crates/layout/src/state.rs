//! Persisted view state
//!
//! `ScrollState` is the portable snapshot of "where the user is": a page
//! number plus an offset into that page in page units, so it survives
//! zoom, rotation and window-size changes. `DisplayState` wraps it with
//! the rest of what session persistence stores per document.

use crate::mode::{DisplayMode, ZoomVirtual};
use serde::{Deserialize, Serialize};

/// A position within the document, in page user-space units.
///
/// `x`/`y` are `None` when the viewport edge does not cut into the page
/// (the page top/left is fully visible), so restoring snaps cleanly to
/// the page origin instead of a stale offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollState {
    /// Page number, 1-based
    pub page: usize,

    /// Horizontal offset into the page, page units
    pub x: Option<f32>,

    /// Vertical offset into the page, page units
    pub y: Option<f32>,
}

impl ScrollState {
    pub fn new(page: usize, x: Option<f32>, y: Option<f32>) -> Self {
        Self { page, x, y }
    }

    /// Snapshot pointing at the top of a page
    pub fn page_top(page: usize) -> Self {
        Self { page, x: None, y: None }
    }
}

/// Everything session persistence stores about an open view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayState {
    pub mode: DisplayMode,
    pub zoom: ZoomVirtual,
    pub rotation: i32,
    pub rtl: bool,
    pub scroll: ScrollState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_state_round_trips_through_json() {
        let state = DisplayState {
            mode: DisplayMode::ContinuousFacing,
            zoom: ZoomVirtual::Percent(125.0),
            rotation: 90,
            rtl: true,
            scroll: ScrollState::new(7, Some(12.5), None),
        };

        let json = serde_json::to_string(&state).unwrap();
        let back: DisplayState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_symbolic_zoom_round_trips() {
        for zoom in [ZoomVirtual::FitPage, ZoomVirtual::FitWidth, ZoomVirtual::FitContent] {
            let json = serde_json::to_string(&zoom).unwrap();
            let back: ZoomVirtual = serde_json::from_str(&json).unwrap();
            assert_eq!(back, zoom);
        }
    }
}
