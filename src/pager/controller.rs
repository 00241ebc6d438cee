//! Paged view over a live collection.
//!
//! The controller owns a [`PageState`] and keeps it in step with a
//! [`RemoteCollectionService`]: page navigation triggers a full reload of
//! count and window, while change notices are folded into the window locally.
//!
//! Reloads are tagged with a generation number and only the latest one is
//! applied. Notices that arrive while that reload is in flight are journaled
//! and replayed on top of its snapshot, so a reload never rolls back a newer
//! local change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::state::{LoadStatus, PageState};
use crate::remote::{
    lock, ChangeEvent, EventHandler, OrderBy, Record, RemoteCollectionService, StreamNotice,
    Subscription,
};

/// Status reason used when the change stream drops
pub const STREAM_DISCONNECTED: &str = "stream disconnected";

/// Controller settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Collection to page through
    pub collection: String,
    /// Records per page
    pub page_size: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            collection: "courses".to_string(),
            page_size: 10,
        }
    }
}

struct Book<R> {
    state: PageState<R>,
    /// Tag of the most recently issued reload
    generation: u64,
    /// Whether the latest reload has not completed yet
    in_flight: bool,
    /// Events received since the latest reload was issued
    journal: Vec<ChangeEvent<R>>,
    /// Tag of the handler currently allowed to deliver notices
    stream_epoch: u64,
    /// Why the change stream is unusable, if it is
    stream_error: Option<String>,
}

impl<R: Record> Book<R> {
    /// Reapply a journaled event onto a fresh snapshot. A created record that
    /// the snapshot already holds is not counted twice. Creations off page 1
    /// and deletions leave nothing in the window to match, so they are
    /// counted again when the snapshot already reflects them.
    fn replay(&mut self, event: ChangeEvent<R>) {
        if let ChangeEvent::Created { record } = &event {
            if self.state.contains(record.id()) {
                return;
            }
        }
        self.state.reconcile(event);
    }
}

struct Shared<R: Record> {
    service: Arc<dyn RemoteCollectionService<R>>,
    collection: String,
    book: Mutex<Book<R>>,
    subscription: Mutex<Option<Subscription>>,
    disposed: AtomicBool,
    revision: watch::Sender<u64>,
}

impl<R: Record> Shared<R> {
    fn touch(&self) {
        self.revision.send_modify(|revision| *revision = revision.wrapping_add(1));
    }

    fn apply_notice(&self, epoch: Option<u64>, notice: StreamNotice<R>) {
        {
            let mut book = lock(&self.book);
            if let Some(epoch) = epoch {
                if epoch != book.stream_epoch {
                    debug!("Ignoring notice from released subscription {}", epoch);
                    return;
                }
            }

            match notice {
                StreamNotice::Change(event) => {
                    debug!("Applying {} event for {}", event.kind(), event.record_id());
                    if book.in_flight {
                        book.journal.push(event.clone());
                    }
                    book.state.reconcile(event);
                }
                StreamNotice::Disconnected { reason } => {
                    warn!("Change stream for {} disconnected: {}", self.collection, reason);
                    book.state.live = false;
                    book.stream_error = Some(STREAM_DISCONNECTED.to_string());
                    book.state.status = LoadStatus::Failed(STREAM_DISCONNECTED.to_string());
                }
            }
        }
        self.touch();
    }

    async fn reload(&self, page: usize) {
        let page_size;
        let generation = {
            let mut book = lock(&self.book);
            book.generation += 1;
            book.in_flight = true;
            book.journal.clear();
            book.state.current_page = page;
            book.state.status = LoadStatus::Loading;
            page_size = book.state.page_size;
            book.generation
        };
        self.touch();

        let offset = (page - 1).saturating_mul(page_size);
        debug!(
            "Reload {} of {}: page {} (offset {}, limit {})",
            generation, self.collection, page, offset, page_size
        );

        let (count, range) = tokio::join!(
            self.service.count(&self.collection),
            self.service
                .range(&self.collection, OrderBy::NewestFirst, offset, page_size),
        );

        {
            let mut book = lock(&self.book);
            if book.generation != generation {
                debug!(
                    "Discarding reload {} superseded by {}",
                    generation, book.generation
                );
                return;
            }

            book.in_flight = false;
            let journal = std::mem::take(&mut book.journal);

            match count.and_then(|total| range.map(|items| (total, items))) {
                Ok((total, mut items)) => {
                    items.truncate(page_size);
                    book.state.items = items;
                    book.state.total_count = total;
                    if !journal.is_empty() {
                        debug!("Replaying {} event(s) onto reload {}", journal.len(), generation);
                    }
                    for event in journal {
                        book.replay(event);
                    }
                    book.state.status = match &book.stream_error {
                        Some(reason) => LoadStatus::Failed(reason.clone()),
                        None => LoadStatus::Ready,
                    };
                    info!(
                        "Loaded page {} of {} ({} of {} records)",
                        page,
                        book.state.display_pages(),
                        book.state.items.len(),
                        total
                    );
                }
                Err(err) => {
                    warn!("Reload of page {} failed: {}", page, err);
                    book.state.status = LoadStatus::Failed(err.to_string());
                }
            }
        }
        self.touch();
    }
}

/// Keeps one page of a remote collection current.
///
/// Cloning yields another handle to the same controller. The change
/// subscription is released by [`dispose`](Self::dispose) or when the last
/// handle is dropped.
pub struct PagedCollectionController<R: Record> {
    shared: Arc<Shared<R>>,
}

impl<R: Record> Clone for PagedCollectionController<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R: Record> PagedCollectionController<R> {
    pub fn new(service: Arc<dyn RemoteCollectionService<R>>, options: ControllerOptions) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                service,
                collection: options.collection,
                book: Mutex::new(Book {
                    state: PageState::new(options.page_size),
                    generation: 0,
                    in_flight: false,
                    journal: Vec::new(),
                    stream_epoch: 0,
                    stream_error: None,
                }),
                subscription: Mutex::new(None),
                disposed: AtomicBool::new(false),
                revision,
            }),
        }
    }

    /// Attach to the change stream, then load the current page
    pub async fn start(&self) {
        info!("Starting paged view of {}", self.shared.collection);
        self.resubscribe().await;
        self.refetch().await;
    }

    /// Load page `page`, even if it is already the current one. Page 0 is
    /// treated as page 1.
    pub async fn go_to_page(&self, page: usize) {
        let page = if page == 0 {
            warn!("Page 0 requested, loading page 1 instead");
            1
        } else {
            page
        };
        self.shared.reload(page).await;
    }

    /// Returns `false` without loading when already on the last page
    pub async fn next_page(&self) -> bool {
        let target = {
            let book = lock(&self.shared.book);
            if !book.state.has_next_page() {
                return false;
            }
            book.state.current_page + 1
        };
        self.shared.reload(target).await;
        true
    }

    /// Returns `false` without loading when already on page 1
    pub async fn prev_page(&self) -> bool {
        let target = {
            let book = lock(&self.shared.book);
            if !book.state.has_prev_page() {
                return false;
            }
            book.state.current_page - 1
        };
        self.shared.reload(target).await;
        true
    }

    /// Reload the current page
    pub async fn refetch(&self) {
        let page = lock(&self.shared.book).state.current_page;
        self.shared.reload(page).await;
    }

    /// Replace the change subscription. The previous handler is released
    /// first and any notice it still delivers is ignored.
    pub async fn resubscribe(&self) {
        if self.shared.disposed.load(Ordering::SeqCst) {
            debug!("Controller disposed, not subscribing");
            return;
        }

        let previous = lock(&self.shared.subscription).take();
        if let Some(previous) = previous {
            previous.cancel();
        }

        let epoch = {
            let mut book = lock(&self.shared.book);
            book.stream_epoch += 1;
            book.state.live = false;
            book.stream_epoch
        };

        let weak: Weak<Shared<R>> = Arc::downgrade(&self.shared);
        let handler: EventHandler<R> = Arc::new(move |notice| {
            if let Some(shared) = weak.upgrade() {
                shared.apply_notice(Some(epoch), notice);
            }
        });

        match self
            .shared
            .service
            .subscribe(&self.shared.collection, handler)
            .await
        {
            Ok(subscription) => {
                if self.shared.disposed.load(Ordering::SeqCst) {
                    subscription.cancel();
                    return;
                }
                debug!("Subscribed to {} ({})", self.shared.collection, subscription.id());
                *lock(&self.shared.subscription) = Some(subscription);

                let mut book = lock(&self.shared.book);
                book.state.live = true;
                if let Some(previous) = book.stream_error.take() {
                    if book.state.status.failure() == Some(previous.as_str()) {
                        book.state.status = LoadStatus::Ready;
                    }
                }
            }
            Err(err) => {
                warn!("Subscribing to {} failed: {}", self.shared.collection, err);
                let reason = format!("subscription failed: {}", err);
                let mut book = lock(&self.shared.book);
                book.stream_error = Some(reason.clone());
                book.state.status = LoadStatus::Failed(reason);
            }
        }
        self.shared.touch();
    }

    /// Feed a notice straight into the reconciliation path
    pub fn dispatch(&self, notice: StreamNotice<R>) {
        self.shared.apply_notice(None, notice);
    }

    /// Release the change subscription. Returns `true` only on the call that
    /// released it.
    pub fn dispose(&self) -> bool {
        self.shared.disposed.store(true, Ordering::SeqCst);
        let subscription = lock(&self.shared.subscription).take();
        let released = subscription.map_or(false, |subscription| subscription.cancel());
        if released {
            info!("Released change subscription for {}", self.shared.collection);
            lock(&self.shared.book).state.live = false;
            self.shared.touch();
        }
        released
    }

    pub fn snapshot(&self) -> PageState<R> {
        lock(&self.shared.book).state.clone()
    }

    pub fn current_page(&self) -> usize {
        lock(&self.shared.book).state.current_page
    }

    pub fn total_pages(&self) -> usize {
        lock(&self.shared.book).state.total_pages()
    }

    pub fn has_next_page(&self) -> bool {
        lock(&self.shared.book).state.has_next_page()
    }

    pub fn has_prev_page(&self) -> bool {
        lock(&self.shared.book).state.has_prev_page()
    }

    pub fn status(&self) -> LoadStatus {
        lock(&self.shared.book).state.status.clone()
    }

    pub fn collection(&self) -> &str {
        &self.shared.collection
    }

    /// Revision counter bumped on every state change
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }
}
