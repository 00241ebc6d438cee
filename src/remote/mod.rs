//! Collection service boundary
//!
//! A [`RemoteCollectionService`] answers count and range queries over a named
//! collection and pushes change notices to subscribers. The page controller
//! only ever talks to this trait.

mod errors;
pub mod memory;
pub mod sqlite;

pub use errors::{RemoteError, RemoteResult};
pub use memory::{MemoryCollection, Operation};
pub use sqlite::SqliteCourseStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// An entity stored in a collection
pub trait Record: Clone + Send + Sync + 'static {
    /// Unique identifier
    fn id(&self) -> &str;

    /// Creation timestamp, the primary ordering key
    fn created_at(&self) -> DateTime<Utc>;
}

/// Sort order for range queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    /// Creation time descending, ties broken by id descending
    #[default]
    NewestFirst,
    /// Creation time ascending, ties broken by id ascending
    OldestFirst,
}

impl OrderBy {
    pub fn compare<R: Record>(self, a: &R, b: &R) -> Ordering {
        let newest_first = b
            .created_at()
            .cmp(&a.created_at())
            .then_with(|| b.id().cmp(a.id()));
        match self {
            OrderBy::NewestFirst => newest_first,
            OrderBy::OldestFirst => newest_first.reverse(),
        }
    }
}

/// A mutation observed on a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEvent<R> {
    Created { record: R },
    Updated { record: R },
    Deleted { id: String },
}

impl<R: Record> ChangeEvent<R> {
    /// Id of the record this event concerns
    pub fn record_id(&self) -> &str {
        match self {
            ChangeEvent::Created { record } | ChangeEvent::Updated { record } => record.id(),
            ChangeEvent::Deleted { id } => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Created { .. } => "created",
            ChangeEvent::Updated { .. } => "updated",
            ChangeEvent::Deleted { .. } => "deleted",
        }
    }
}

/// Everything a subscription can deliver
#[derive(Debug, Clone, PartialEq)]
pub enum StreamNotice<R> {
    Change(ChangeEvent<R>),
    /// The stream is gone; no further notices arrive on this subscription
    Disconnected { reason: String },
}

/// Callback invoked for every notice, in delivery order
pub type EventHandler<R> = Arc<dyn Fn(StreamNotice<R>) + Send + Sync>;

/// Handle to a live change-event registration.
///
/// Cancelling runs the release hook at most once; dropping the handle
/// cancels it.
pub struct Subscription {
    id: Uuid,
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Release the registration. Returns `true` only for the call that
    /// actually released it.
    pub fn cancel(&self) -> bool {
        let release = lock(&self.release).take();
        match release {
            Some(release) => {
                release();
                true
            }
            None => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        lock(&self.release).is_none()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A queryable, observable collection store
#[async_trait]
pub trait RemoteCollectionService<R: Record>: Send + Sync {
    /// Total number of records in the collection
    async fn count(&self, collection: &str) -> RemoteResult<usize>;

    /// Up to `limit` records starting at `offset` in the given order
    async fn range(
        &self,
        collection: &str,
        order: OrderBy,
        offset: usize,
        limit: usize,
    ) -> RemoteResult<Vec<R>>;

    /// Register a handler for every change to the collection
    async fn subscribe(&self, collection: &str, handler: EventHandler<R>)
        -> RemoteResult<Subscription>;
}
