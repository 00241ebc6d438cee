//! Observable page state

use serde::{Deserialize, Serialize};

use crate::remote::{ChangeEvent, Record};

/// Where the page is in its load cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum LoadStatus {
    Idle,
    Loading,
    Ready,
    Failed(String),
}

impl LoadStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, LoadStatus::Failed(_))
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            LoadStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// The window of records currently shown plus its bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageState<R> {
    /// Records on the current page, in canonical order
    pub items: Vec<R>,
    pub page_size: usize,
    /// 1-based
    pub current_page: usize,
    /// Collection size as last observed
    pub total_count: usize,
    pub status: LoadStatus,
    /// Whether the change-event stream is attached
    pub live: bool,
}

impl<R: Record> PageState<R> {
    pub fn new(page_size: usize) -> Self {
        Self {
            items: Vec::new(),
            page_size: page_size.max(1),
            current_page: 1,
            total_count: 0,
            status: LoadStatus::Idle,
            live: false,
        }
    }

    /// `ceil(total_count / page_size)`
    pub fn total_pages(&self) -> usize {
        self.total_count.div_ceil(self.page_size)
    }

    /// Page count for pager display: an empty collection is one empty page
    pub fn display_pages(&self) -> usize {
        self.total_pages().max(1)
    }

    pub fn has_next_page(&self) -> bool {
        self.current_page < self.total_pages()
    }

    pub fn has_prev_page(&self) -> bool {
        self.current_page > 1
    }

    /// The current page lies past the end, e.g. after deletes shrank the
    /// collection underneath it
    pub fn is_stale(&self) -> bool {
        self.current_page > self.display_pages()
    }

    pub fn is_loading(&self) -> bool {
        self.status == LoadStatus::Loading
    }

    /// 1-based positions of the first and last shown record within the
    /// collection, or `None` when nothing is shown
    pub fn showing_range(&self) -> Option<(usize, usize)> {
        if self.items.is_empty() {
            return None;
        }
        let first = self
            .current_page
            .saturating_sub(1)
            .saturating_mul(self.page_size)
            .saturating_add(1);
        let last = first
            .saturating_add(self.items.len() - 1)
            .min(self.total_count.max(first));
        Some((first, last))
    }

    /// Apply one change event to the local window without a round trip.
    ///
    /// Created records are assumed to sort first, which only holds while the
    /// store's creation clock is monotonic. Off page 1 the window is left
    /// alone and only the count moves, so `items` can drift from what a
    /// reload would return until the next reload.
    pub fn reconcile(&mut self, event: ChangeEvent<R>) {
        match event {
            ChangeEvent::Created { record } => {
                if self.current_page == 1 {
                    self.items.insert(0, record);
                    self.items.truncate(self.page_size);
                }
                self.total_count += 1;
            }
            ChangeEvent::Updated { record } => {
                if let Some(slot) = self.items.iter_mut().find(|item| item.id() == record.id()) {
                    *slot = record;
                }
            }
            ChangeEvent::Deleted { id } => {
                self.items.retain(|item| item.id() != id);
                self.total_count = self.total_count.saturating_sub(1);
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|item| item.id() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Course;

    fn page_of(count: usize) -> PageState<Course> {
        let mut state = PageState::new(10);
        state.items = (0..count).map(|i| Course::sample(&format!("Course {}", i))).collect();
        state.total_count = count;
        state
    }

    #[test]
    fn test_total_pages_is_ceiling() {
        let mut state: PageState<Course> = PageState::new(10);
        for (count, pages) in [(0, 0), (1, 1), (10, 1), (11, 2), (100, 10), (101, 11)] {
            state.total_count = count;
            assert_eq!(state.total_pages(), pages, "count {}", count);
        }
        state.total_count = 0;
        assert_eq!(state.display_pages(), 1);
    }

    #[test]
    fn test_navigation_flags_and_staleness() {
        let mut state = page_of(10);
        state.total_count = 25;
        assert!(state.has_next_page());
        assert!(!state.has_prev_page());

        state.current_page = 3;
        assert!(!state.has_next_page());
        assert!(state.has_prev_page());
        assert!(!state.is_stale());

        state.total_count = 15;
        assert!(state.is_stale());
    }

    #[test]
    fn test_showing_range() {
        let mut state = page_of(10);
        state.total_count = 42;
        assert_eq!(state.showing_range(), Some((1, 10)));

        state.current_page = 5;
        state.items.truncate(2);
        assert_eq!(state.showing_range(), Some((41, 42)));

        state.items.clear();
        assert_eq!(state.showing_range(), None);
    }

    #[test]
    fn test_showing_range_saturates_on_huge_page() {
        let mut state = page_of(1);
        state.current_page = usize::MAX;
        assert_eq!(state.showing_range(), Some((usize::MAX, usize::MAX)));
    }

    #[test]
    fn test_created_on_full_first_page_drops_last() {
        let mut state = page_of(10);
        let last_id = state.items[9].id.clone();
        let fresh = Course::sample("Fresh");

        state.reconcile(ChangeEvent::Created { record: fresh.clone() });

        assert_eq!(state.items.len(), 10);
        assert_eq!(state.items[0], fresh);
        assert_eq!(state.total_count, 11);
        assert!(!state.contains(&last_id));
    }

    #[test]
    fn test_created_off_first_page_only_counts() {
        let mut state = page_of(3);
        state.current_page = 2;
        let before = state.items.clone();

        state.reconcile(ChangeEvent::Created { record: Course::sample("Fresh") });

        assert_eq!(state.items, before);
        assert_eq!(state.total_count, 4);
    }

    #[test]
    fn test_updated_replaces_in_place() {
        let mut state = page_of(3);
        let mut changed = state.items[1].clone();
        changed.price = 99;

        state.reconcile(ChangeEvent::Updated { record: changed.clone() });
        assert_eq!(state.items[1], changed);

        let before = state.items.clone();
        state.reconcile(ChangeEvent::Updated { record: Course::sample("Elsewhere") });
        assert_eq!(state.items, before);
        assert_eq!(state.total_count, 3);
    }

    #[test]
    fn test_deleted_off_page_still_decrements() {
        let mut state = page_of(3);
        let before = state.items.clone();

        state.reconcile(ChangeEvent::Deleted { id: "not-here".to_string() });
        assert_eq!(state.items, before);
        assert_eq!(state.total_count, 2);

        let doomed = state.items[1].id.clone();
        state.reconcile(ChangeEvent::Deleted { id: doomed.clone() });
        assert_eq!(state.items.len(), 2);
        assert_eq!(state.items[0], before[0]);
        assert_eq!(state.items[1], before[2]);
        assert_eq!(state.total_count, 1);
    }

    #[test]
    fn test_deleted_count_floors_at_zero() {
        let mut state: PageState<Course> = PageState::new(10);
        state.reconcile(ChangeEvent::Deleted { id: "ghost".to_string() });
        assert_eq!(state.total_count, 0);
    }
}
