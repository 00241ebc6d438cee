//! Paginated, live view over a collection
//!
//! [`PagedCollectionController`] keeps one page of records current while
//! change notices stream in; [`PageWindow`] decides which page numbers a pager
//! shows.

pub mod controller;
pub mod state;
pub mod window;

pub use controller::{ControllerOptions, PagedCollectionController, STREAM_DISCONNECTED};
pub use state::{LoadStatus, PageState};
pub use window::{window_of, PageSlot, PageWindow};
