//! In-process collection store
//!
//! Keeps every collection in memory and fans change notices out to
//! subscribers synchronously, in mutation order, also across writer threads.
//! Handlers may read the store but must not write to it. Faults can be
//! queued per operation to exercise failure paths of callers.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;
use uuid::Uuid;

use super::{
    lock, ChangeEvent, EventHandler, OrderBy, Record, RemoteCollectionService, RemoteError,
    RemoteResult, StreamNotice, Subscription,
};

/// Service operations that can have a fault queued against them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Count,
    Range,
    Subscribe,
}

struct Subscriber<R> {
    collection: String,
    handler: EventHandler<R>,
}

type SubscriberMap<R> = HashMap<Uuid, Subscriber<R>>;

struct Collections<R> {
    records: HashMap<String, Vec<R>>,
    faults: HashMap<Operation, VecDeque<RemoteError>>,
}

/// Memory-backed [`RemoteCollectionService`]
pub struct MemoryCollection<R: Record> {
    /// Held across a mutation and its fan-out so notices keep write order
    writes: Mutex<()>,
    collections: Mutex<Collections<R>>,
    subscribers: Arc<Mutex<SubscriberMap<R>>>,
}

impl<R: Record> MemoryCollection<R> {
    pub fn new() -> Self {
        Self {
            writes: Mutex::new(()),
            collections: Mutex::new(Collections {
                records: HashMap::new(),
                faults: HashMap::new(),
            }),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a store that already holds an empty collection
    pub fn with_collection(name: &str) -> Self {
        let store = Self::new();
        store.create_collection(name);
        store
    }

    /// Create an empty collection; existing collections are left untouched
    pub fn create_collection(&self, name: &str) {
        lock(&self.collections)
            .records
            .entry(name.to_string())
            .or_default();
    }

    /// Queue a fault returned by the next call to `operation`
    pub fn fail_next(&self, operation: Operation, error: RemoteError) {
        lock(&self.collections)
            .faults
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    pub fn insert(&self, collection: &str, record: R) -> RemoteResult<()> {
        let _order = lock(&self.writes);
        {
            let mut state = lock(&self.collections);
            let records = state
                .records
                .get_mut(collection)
                .ok_or_else(|| RemoteError::NotFound(collection.to_string()))?;
            if records.iter().any(|existing| existing.id() == record.id()) {
                return Err(RemoteError::Unknown(format!(
                    "duplicate id {} in {}",
                    record.id(),
                    collection
                )));
            }
            records.push(record.clone());
        }

        self.notify(collection, StreamNotice::Change(ChangeEvent::Created { record }));
        Ok(())
    }

    /// Replace the record with the same id. Returns whether it existed.
    pub fn update(&self, collection: &str, record: R) -> RemoteResult<bool> {
        let _order = lock(&self.writes);
        let found = {
            let mut state = lock(&self.collections);
            let records = state
                .records
                .get_mut(collection)
                .ok_or_else(|| RemoteError::NotFound(collection.to_string()))?;
            match records.iter_mut().find(|existing| existing.id() == record.id()) {
                Some(slot) => {
                    *slot = record.clone();
                    true
                }
                None => false,
            }
        };

        if found {
            self.notify(collection, StreamNotice::Change(ChangeEvent::Updated { record }));
        }
        Ok(found)
    }

    /// Remove the record with `id`. Returns whether it existed.
    pub fn delete(&self, collection: &str, id: &str) -> RemoteResult<bool> {
        let _order = lock(&self.writes);
        let removed = {
            let mut state = lock(&self.collections);
            let records = state
                .records
                .get_mut(collection)
                .ok_or_else(|| RemoteError::NotFound(collection.to_string()))?;
            let before = records.len();
            records.retain(|existing| existing.id() != id);
            records.len() != before
        };

        if removed {
            self.notify(
                collection,
                StreamNotice::Change(ChangeEvent::Deleted { id: id.to_string() }),
            );
        }
        Ok(removed)
    }

    /// Drop every subscriber of `collection` after telling it the stream is gone
    pub fn disconnect(&self, collection: &str, reason: &str) {
        let dropped: Vec<EventHandler<R>> = {
            let mut subscribers = lock(&self.subscribers);
            let keys: Vec<Uuid> = subscribers
                .iter()
                .filter(|(_, sub)| sub.collection == collection)
                .map(|(key, _)| *key)
                .collect();
            keys.into_iter()
                .filter_map(|key| subscribers.remove(&key))
                .map(|sub| sub.handler)
                .collect()
        };

        debug!("Disconnecting {} subscriber(s) from {}", dropped.len(), collection);
        for handler in dropped {
            handler(StreamNotice::Disconnected {
                reason: reason.to_string(),
            });
        }
    }

    pub fn subscriber_count(&self, collection: &str) -> usize {
        lock(&self.subscribers)
            .values()
            .filter(|sub| sub.collection == collection)
            .count()
    }

    fn take_fault(&self, operation: Operation) -> RemoteResult<()> {
        let fault = lock(&self.collections)
            .faults
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        match fault {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn ensure_collection(&self, collection: &str) -> RemoteResult<()> {
        if lock(&self.collections).records.contains_key(collection) {
            Ok(())
        } else {
            Err(RemoteError::NotFound(collection.to_string()))
        }
    }

    fn notify(&self, collection: &str, notice: StreamNotice<R>) {
        // Handlers run outside the collections lock so they may read the store
        let handlers: Vec<EventHandler<R>> = lock(&self.subscribers)
            .values()
            .filter(|sub| sub.collection == collection)
            .map(|sub| Arc::clone(&sub.handler))
            .collect();

        for handler in handlers {
            handler(notice.clone());
        }
    }
}

impl<R: Record> Default for MemoryCollection<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> RemoteCollectionService<R> for MemoryCollection<R> {
    async fn count(&self, collection: &str) -> RemoteResult<usize> {
        self.take_fault(Operation::Count)?;
        lock(&self.collections)
            .records
            .get(collection)
            .map(Vec::len)
            .ok_or_else(|| RemoteError::NotFound(collection.to_string()))
    }

    async fn range(
        &self,
        collection: &str,
        order: OrderBy,
        offset: usize,
        limit: usize,
    ) -> RemoteResult<Vec<R>> {
        self.take_fault(Operation::Range)?;
        if limit == 0 {
            return Err(RemoteError::InvalidRange { offset, limit });
        }

        let mut records = lock(&self.collections)
            .records
            .get(collection)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(collection.to_string()))?;
        records.sort_by(|a, b| order.compare(a, b));
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    async fn subscribe(
        &self,
        collection: &str,
        handler: EventHandler<R>,
    ) -> RemoteResult<Subscription> {
        self.take_fault(Operation::Subscribe)?;
        self.ensure_collection(collection)?;

        let key = Uuid::new_v4();
        lock(&self.subscribers).insert(
            key,
            Subscriber {
                collection: collection.to_string(),
                handler,
            },
        );
        debug!("Subscribed {} to {}", key, collection);

        let registry: Weak<Mutex<SubscriberMap<R>>> = Arc::downgrade(&self.subscribers);
        Ok(Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                lock(&registry).remove(&key);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Course;
    use chrono::{Duration, Utc};

    fn course(title: &str, minutes_ago: i64) -> Course {
        let mut course = Course::sample(title);
        course.created_at = Utc::now() - Duration::minutes(minutes_ago);
        course
    }

    #[tokio::test]
    async fn test_range_orders_newest_first() {
        let store = MemoryCollection::with_collection("courses");
        store.insert("courses", course("old", 30)).unwrap();
        store.insert("courses", course("new", 1)).unwrap();
        store.insert("courses", course("mid", 10)).unwrap();

        let page = store.range("courses", OrderBy::NewestFirst, 0, 2).await.unwrap();
        let titles: Vec<_> = page.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "mid"]);

        let rest = store.range("courses", OrderBy::NewestFirst, 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].title, "old");

        let past_end = store.range("courses", OrderBy::NewestFirst, 10, 2).await.unwrap();
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn test_missing_collection_and_bad_range() {
        let store: MemoryCollection<Course> = MemoryCollection::with_collection("courses");
        assert_eq!(
            store.count("modules").await,
            Err(RemoteError::NotFound("modules".to_string()))
        );
        assert_eq!(
            store.range("courses", OrderBy::NewestFirst, 0, 0).await,
            Err(RemoteError::InvalidRange { offset: 0, limit: 0 })
        );
    }

    #[tokio::test]
    async fn test_faults_fire_once() {
        let store: MemoryCollection<Course> = MemoryCollection::with_collection("courses");
        store.fail_next(Operation::Count, RemoteError::Unavailable("offline".to_string()));

        assert!(store.count("courses").await.is_err());
        assert_eq!(store.count("courses").await, Ok(0));
    }

    #[tokio::test]
    async fn test_subscribers_receive_changes_until_cancelled() {
        let store = MemoryCollection::with_collection("courses");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: EventHandler<Course> = Arc::new(move |notice| {
            if let StreamNotice::Change(event) = notice {
                lock(&sink).push(event.kind());
            }
        });

        let subscription = store.subscribe("courses", handler).await.unwrap();
        let record = course("Linux", 5);
        store.insert("courses", record.clone()).unwrap();
        assert!(store.update("courses", record.clone()).unwrap());
        assert!(store.delete("courses", record.id()).unwrap());
        assert!(!store.delete("courses", record.id()).unwrap());

        subscription.cancel();
        assert_eq!(store.subscriber_count("courses"), 0);
        store.insert("courses", course("Welding", 2)).unwrap();

        assert_eq!(*lock(&seen), vec!["created", "updated", "deleted"]);
    }

    #[tokio::test]
    async fn test_concurrent_writers_notify_in_write_order() {
        let store = Arc::new(MemoryCollection::with_collection("courses"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: EventHandler<Course> = Arc::new(move |notice| {
            if let StreamNotice::Change(event) = notice {
                lock(&sink).push(event.record_id().to_string());
            }
        });
        let _subscription = store.subscribe("courses", handler).await.unwrap();

        std::thread::scope(|scope| {
            for writer in 0..4 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for i in 0..25 {
                        let title = format!("Course {}-{}", writer, i);
                        store.insert("courses", course(&title, i)).unwrap();
                    }
                });
            }
        });

        let stored: Vec<String> = lock(&store.collections).records["courses"]
            .iter()
            .map(|c| c.id.clone())
            .collect();
        assert_eq!(stored.len(), 100);
        assert_eq!(*lock(&seen), stored);
    }

    #[tokio::test]
    async fn test_disconnect_drops_subscribers() {
        let store: MemoryCollection<Course> = MemoryCollection::with_collection("courses");
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reasons);
        let handler: EventHandler<Course> = Arc::new(move |notice| {
            if let StreamNotice::Disconnected { reason } = notice {
                lock(&sink).push(reason);
            }
        });

        let _subscription = store.subscribe("courses", handler).await.unwrap();
        store.disconnect("courses", "socket closed");

        assert_eq!(store.subscriber_count("courses"), 0);
        assert_eq!(*lock(&reasons), vec!["socket closed".to_string()]);
    }
}
