//! Live, paginated browsing over a real-time course collection.
//!
//! The [`pager`] module holds the page controller that keeps a bounded window
//! of records in step with a remote collection, and the pager window math.
//! The [`remote`] module defines the collection service boundary and ships an
//! in-memory and a SQLite-backed implementation.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod pager;
pub mod remote;

pub use pager::{PageSlot, PageState, PageWindow, PagedCollectionController, LoadStatus};
pub use remote::{ChangeEvent, Record, RemoteCollectionService, RemoteError, RemoteResult};
