//! Navigation history
//!
//! A bounded back/forward stack of `ScrollState` snapshots. The cursor
//! sits in [0, len]; `cursor == len` means "at the live position" with no
//! forward history. A new navigation event discards everything beyond the
//! cursor, so the stack behaves like a browser history.

use crate::state::ScrollState;

/// Default number of remembered positions
pub const NAV_HISTORY_LEN: usize = 50;

#[derive(Debug)]
pub struct NavigationHistory {
    entries: Vec<ScrollState>,
    cursor: usize,
    capacity: usize,
}

impl Default for NavigationHistory {
    fn default() -> Self {
        Self::new(NAV_HISTORY_LEN)
    }
}

impl NavigationHistory {
    pub fn new(capacity: usize) -> Self {
        Self { entries: Vec::new(), cursor: 0, capacity: capacity.max(1) }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record the current position before a jump.
    ///
    /// Truncates forward history, suppresses a duplicate of the entry at
    /// the cursor, and drops the oldest entry once at capacity.
    pub fn add(&mut self, state: ScrollState) {
        // Keep the entry the cursor stands on; drop the forward tail.
        if self.cursor < self.entries.len() {
            self.entries.truncate(self.cursor + 1);
        }

        if self.entries.last() != Some(&state) {
            if self.entries.len() == self.capacity {
                self.entries.remove(0);
            }
            self.entries.push(state);
        }
        self.cursor = self.entries.len();
    }

    /// Whether `navigate` can move by `dir` (negative = back)
    pub fn can_navigate(&self, dir: isize) -> bool {
        if dir == 0 {
            return false;
        }
        let target = self.cursor as isize + dir;
        target >= 0 && (target as usize) < self.entries.len()
    }

    /// Move by `dir` and return the state to restore.
    ///
    /// When leaving the live position backwards, `current` is pushed so a
    /// forward navigation can return to it.
    pub fn navigate(&mut self, dir: isize, current: ScrollState) -> Option<ScrollState> {
        if !self.can_navigate(dir) {
            return None;
        }

        if dir < 0 && self.cursor == self.entries.len() {
            // Remember where we are; keep the cursor on the pre-push index.
            if self.entries.last() != Some(&current) {
                if self.entries.len() == self.capacity {
                    self.entries.remove(0);
                    self.cursor -= 1;
                }
                self.entries.push(current);
            }
        }

        self.cursor = (self.cursor as isize + dir) as usize;
        self.entries.get(self.cursor).copied()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(page: usize) -> ScrollState {
        ScrollState::page_top(page)
    }

    #[test]
    fn test_add_and_navigate_back_forward() {
        let mut nav = NavigationHistory::default();
        nav.add(at(1));
        nav.add(at(5));

        assert!(nav.can_navigate(-1));
        assert!(!nav.can_navigate(1));

        // Jumped from page 9; going back lands on 5 and remembers 9.
        assert_eq!(nav.navigate(-1, at(9)), Some(at(5)));
        assert_eq!(nav.navigate(-1, at(5)), Some(at(1)));
        assert!(!nav.can_navigate(-1));

        assert_eq!(nav.navigate(1, at(1)), Some(at(5)));
        assert_eq!(nav.navigate(1, at(5)), Some(at(9)));
        assert!(!nav.can_navigate(1));
    }

    #[test]
    fn test_new_event_discards_forward_history() {
        let mut nav = NavigationHistory::default();
        nav.add(at(1));
        nav.add(at(2));
        nav.navigate(-1, at(3));
        nav.navigate(-1, at(2));

        nav.add(at(7));
        assert_eq!(nav.len(), 2); // [1, 7]
        assert!(!nav.can_navigate(1));
        assert_eq!(nav.navigate(-1, at(8)), Some(at(7)));
    }

    #[test]
    fn test_duplicate_entries_suppressed() {
        let mut nav = NavigationHistory::default();
        nav.add(at(3));
        nav.add(at(3));
        assert_eq!(nav.len(), 1);
    }

    #[test]
    fn test_capacity_bound() {
        let mut nav = NavigationHistory::new(3);
        for page in 1..=10 {
            nav.add(at(page));
        }
        assert_eq!(nav.len(), 3);

        // Oldest entries were dropped; the most recent three survive.
        assert_eq!(nav.navigate(-1, at(11)), Some(at(10)));
        assert_eq!(nav.navigate(-1, at(10)), Some(at(9)));
    }

    #[test]
    fn test_zero_dir_is_noop() {
        let mut nav = NavigationHistory::default();
        nav.add(at(1));
        assert!(!nav.can_navigate(0));
        assert_eq!(nav.navigate(0, at(2)), None);
    }
}
