//! Which page buttons a pager shows.
//!
//! The first and last pages are always present, the pages within `delta` of
//! the current one are listed, and gaps collapse into a single ellipsis.

use serde::{Serialize, Serializer};
use std::fmt;

/// One entry of a pager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSlot {
    Page(usize),
    Ellipsis,
}

impl fmt::Display for PageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSlot::Page(page) => write!(f, "{}", page),
            PageSlot::Ellipsis => f.write_str("..."),
        }
    }
}

impl Serialize for PageSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PageSlot::Page(page) => serializer.serialize_u64(*page as u64),
            PageSlot::Ellipsis => serializer.serialize_str("..."),
        }
    }
}

/// Pager window with a configurable neighbourhood size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    delta: usize,
}

impl Default for PageWindow {
    fn default() -> Self {
        Self { delta: 2 }
    }
}

impl PageWindow {
    pub fn new(delta: usize) -> Self {
        Self { delta }
    }

    pub fn delta(&self) -> usize {
        self.delta
    }

    /// Slots to show for `current` out of `total` pages. Empty when there is
    /// at most one page, since no pager is shown then.
    pub fn slots(&self, current: usize, total: usize) -> Vec<PageSlot> {
        if total <= 1 {
            return Vec::new();
        }

        let delta = self.delta;
        let mut slots = vec![PageSlot::Page(1)];

        if current.saturating_sub(delta) > 2 {
            slots.push(PageSlot::Ellipsis);
        }

        let start = current.saturating_sub(delta).max(2);
        let end = current.saturating_add(delta).min(total - 1);
        slots.extend((start..=end).map(PageSlot::Page));

        if current.saturating_add(delta) < total - 1 {
            slots.push(PageSlot::Ellipsis);
        }
        slots.push(PageSlot::Page(total));

        slots
    }
}

/// [`PageWindow::slots`] with the default neighbourhood of 2
pub fn window_of(current: usize, total: usize) -> Vec<PageSlot> {
    PageWindow::default().slots(current, total)
}
