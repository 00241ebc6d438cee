//! SQLite-backed course collection
//!
//! Writes are journaled by triggers into `course_changes`, together with a
//! JSON copy of the written row. Each subscription runs a poller that reads
//! the journal past its cursor and delivers the entries as change notices, so
//! writers in other processes are observed too, even when the row is gone by
//! the time the poller reads it. Entries older than the retention window are
//! pruned by `prune_journal` and periodically by the pollers.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    lock, ChangeEvent, EventHandler, OrderBy, RemoteCollectionService, RemoteError, RemoteResult,
    StreamNotice, Subscription,
};
use crate::catalog::{Course, DurationBand};

const COURSE_COLUMNS: &str =
    "id, title, description, branch, program, technology, duration, price, created_at";

/// How long journal entries are kept unless configured otherwise
pub const DEFAULT_JOURNAL_RETENTION: Duration = Duration::from_secs(600);

/// Poller ticks between two journal prunes
const PRUNE_EVERY_TICKS: u64 = 120;

/// Course store persisted in a SQLite database
pub struct SqliteCourseStore {
    conn: Arc<Mutex<Connection>>,
    poll_interval: Duration,
    journal_retention: Duration,
}

impl SqliteCourseStore {
    /// The single collection this store serves
    pub const COLLECTION: &'static str = "courses";

    pub fn open<P: AsRef<Path>>(path: P) -> RemoteResult<Self> {
        info!("Opening course store at {}", path.as_ref().display());
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> RemoteResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> RemoteResult<Self> {
        migrate_journal(&conn)?;
        create_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            poll_interval: Duration::from_millis(500),
            journal_retention: DEFAULT_JOURNAL_RETENTION,
        })
    }

    /// How often subscriptions read the change journal
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// How long journal entries are kept. Must comfortably exceed the poll
    /// interval of every reader, including readers in other processes.
    pub fn with_journal_retention(mut self, retention: Duration) -> Self {
        self.journal_retention = retention;
        self
    }

    /// Drop journal entries older than the retention window. Returns how
    /// many were removed.
    pub fn prune_journal(&self) -> RemoteResult<usize> {
        prune_journal(&self.conn, self.journal_retention)
    }

    pub fn insert(&self, course: &Course) -> RemoteResult<()> {
        lock(&self.conn).execute(
            "INSERT INTO courses (
                id, title, description, branch, program, technology, duration, price, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                course.id,
                course.title,
                course.description,
                course.branch,
                course.program,
                course.technology,
                course.duration.label(),
                course.price,
                format_timestamp(course.created_at),
            ],
        )?;
        debug!("Inserted course {}", course.id);
        Ok(())
    }

    /// Overwrite every mutable field of the course. Returns whether it existed.
    pub fn update(&self, course: &Course) -> RemoteResult<bool> {
        let changed = lock(&self.conn).execute(
            "UPDATE courses SET title = ?2, description = ?3, branch = ?4, program = ?5,
                    technology = ?6, duration = ?7, price = ?8
             WHERE id = ?1",
            params![
                course.id,
                course.title,
                course.description,
                course.branch,
                course.program,
                course.technology,
                course.duration.label(),
                course.price,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Returns whether a course was removed
    pub fn delete(&self, id: &str) -> RemoteResult<bool> {
        let changed = lock(&self.conn).execute("DELETE FROM courses WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    pub fn get(&self, id: &str) -> RemoteResult<Option<Course>> {
        let conn = lock(&self.conn);
        let course = conn
            .query_row(
                &format!("SELECT {} FROM courses WHERE id = ?1", COURSE_COLUMNS),
                [id],
                course_from_row,
            )
            .optional()?;
        Ok(course)
    }

    fn check_collection(&self, collection: &str) -> RemoteResult<()> {
        if collection == Self::COLLECTION {
            Ok(())
        } else {
            Err(RemoteError::NotFound(collection.to_string()))
        }
    }
}

#[async_trait]
impl RemoteCollectionService<Course> for SqliteCourseStore {
    async fn count(&self, collection: &str) -> RemoteResult<usize> {
        self.check_collection(collection)?;
        let count: i64 =
            lock(&self.conn).query_row("SELECT COUNT(*) FROM courses", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    async fn range(
        &self,
        collection: &str,
        order: OrderBy,
        offset: usize,
        limit: usize,
    ) -> RemoteResult<Vec<Course>> {
        self.check_collection(collection)?;
        if limit == 0 || i64::try_from(offset).is_err() || i64::try_from(limit).is_err() {
            return Err(RemoteError::InvalidRange { offset, limit });
        }

        let direction = match order {
            OrderBy::NewestFirst => "DESC",
            OrderBy::OldestFirst => "ASC",
        };
        let query = format!(
            "SELECT {columns} FROM courses
             ORDER BY created_at {dir}, id {dir}
             LIMIT ?1 OFFSET ?2",
            columns = COURSE_COLUMNS,
            dir = direction,
        );

        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], course_from_row)?;

        let mut courses = Vec::new();
        for course in rows {
            courses.push(course?);
        }
        Ok(courses)
    }

    async fn subscribe(
        &self,
        collection: &str,
        handler: EventHandler<Course>,
    ) -> RemoteResult<Subscription> {
        self.check_collection(collection)?;
        let start: i64 = lock(&self.conn).query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM course_changes",
            [],
            |row| row.get(0),
        )?;

        let conn = Arc::clone(&self.conn);
        let interval = self.poll_interval;
        let retention = self.journal_retention;
        debug!("Starting change poller at journal seq {}", start);

        let poller = tokio::spawn(async move {
            let mut cursor = start;
            let mut ticker = tokio::time::interval(interval);
            let mut ticks: u64 = 0;
            loop {
                ticker.tick().await;
                ticks = ticks.wrapping_add(1);
                let changes = match read_changes(&conn, cursor) {
                    Ok(changes) => changes,
                    Err(err) => {
                        warn!("Change journal read failed: {}", err);
                        handler(StreamNotice::Disconnected {
                            reason: err.to_string(),
                        });
                        break;
                    }
                };
                for (seq, event) in changes {
                    cursor = seq;
                    if let Some(event) = event {
                        handler(StreamNotice::Change(event));
                    }
                }

                if ticks % PRUNE_EVERY_TICKS == 0 {
                    if let Err(err) = prune_journal(&conn, retention) {
                        warn!("Change journal prune failed: {}", err);
                    }
                }
            }
        });

        Ok(Subscription::new(move || poller.abort()))
    }
}

/// Journal tables written before entries carried a row payload are dropped
/// together with their triggers; `create_tables` recreates them.
fn migrate_journal(conn: &Connection) -> RemoteResult<()> {
    let (columns, with_payload): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(name = 'payload'), 0)
         FROM pragma_table_info('course_changes')",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    if columns > 0 && with_payload == 0 {
        info!("Rebuilding course change journal with row payloads");
        conn.execute_batch(
            "DROP TRIGGER IF EXISTS courses_journal_insert;
             DROP TRIGGER IF EXISTS courses_journal_update;
             DROP TRIGGER IF EXISTS courses_journal_delete;
             DROP TABLE course_changes;",
        )?;
    }
    Ok(())
}

fn create_tables(conn: &Connection) -> RemoteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS courses (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            branch TEXT NOT NULL,
            program TEXT NOT NULL,
            technology TEXT NOT NULL,
            duration TEXT NOT NULL,
            price INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_courses_created_at ON courses (created_at, id);

        CREATE TABLE IF NOT EXISTS course_changes (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            course_id TEXT NOT NULL,
            payload TEXT,
            recorded_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER))
        );

        CREATE INDEX IF NOT EXISTS idx_course_changes_recorded_at
            ON course_changes (recorded_at);

        CREATE TRIGGER IF NOT EXISTS courses_journal_insert AFTER INSERT ON courses BEGIN
            INSERT INTO course_changes (kind, course_id, payload) VALUES ('created', NEW.id,
                json_object('id', NEW.id, 'title', NEW.title, 'description', NEW.description,
                    'branch', NEW.branch, 'program', NEW.program, 'technology', NEW.technology,
                    'duration', NEW.duration, 'price', NEW.price, 'created_at', NEW.created_at));
        END;

        CREATE TRIGGER IF NOT EXISTS courses_journal_update AFTER UPDATE ON courses BEGIN
            INSERT INTO course_changes (kind, course_id, payload) VALUES ('updated', NEW.id,
                json_object('id', NEW.id, 'title', NEW.title, 'description', NEW.description,
                    'branch', NEW.branch, 'program', NEW.program, 'technology', NEW.technology,
                    'duration', NEW.duration, 'price', NEW.price, 'created_at', NEW.created_at));
        END;

        CREATE TRIGGER IF NOT EXISTS courses_journal_delete AFTER DELETE ON courses BEGIN
            INSERT INTO course_changes (kind, course_id) VALUES ('deleted', OLD.id);
        END;",
    )?;
    Ok(())
}

fn prune_journal(conn: &Mutex<Connection>, retention: Duration) -> RemoteResult<usize> {
    let retention = i64::try_from(retention.as_secs()).unwrap_or(i64::MAX);
    let pruned = lock(conn).execute(
        "DELETE FROM course_changes
         WHERE recorded_at < CAST(strftime('%s', 'now') AS INTEGER) - ?1",
        [retention],
    )?;
    if pruned > 0 {
        debug!("Pruned {} change journal entries", pruned);
    }
    Ok(pruned)
}

/// Row copy stored with created and updated journal entries
#[derive(Deserialize)]
struct JournalPayload {
    id: String,
    title: String,
    description: String,
    branch: String,
    program: String,
    technology: String,
    duration: String,
    price: u32,
    created_at: String,
}

impl JournalPayload {
    fn into_course(self) -> Option<Course> {
        Some(Course {
            duration: self.duration.parse().ok()?,
            created_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            title: self.title,
            description: self.description,
            branch: self.branch,
            program: self.program,
            technology: self.technology,
            price: self.price,
        })
    }
}

/// Journal entries after `cursor`, in journal order. Entries of an unknown
/// kind, or written without a payload, map to `None`.
fn read_changes(
    conn: &Mutex<Connection>,
    cursor: i64,
) -> RemoteResult<Vec<(i64, Option<ChangeEvent<Course>>)>> {
    let entries = {
        let conn = lock(conn);
        let mut stmt = conn.prepare(
            "SELECT seq, kind, course_id, payload FROM course_changes
             WHERE seq > ?1
             ORDER BY seq",
        )?;
        let rows = stmt.query_map([cursor], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut entries = Vec::new();
        for entry in rows {
            entries.push(entry?);
        }
        entries
    };

    entries
        .into_iter()
        .map(|(seq, kind, course_id, payload)| {
            let event = match (kind.as_str(), payload) {
                ("deleted", _) => Some(ChangeEvent::Deleted { id: course_id }),
                ("created", Some(payload)) => Some(ChangeEvent::Created {
                    record: course_from_payload(seq, &payload)?,
                }),
                ("updated", Some(payload)) => Some(ChangeEvent::Updated {
                    record: course_from_payload(seq, &payload)?,
                }),
                _ => None,
            };
            Ok((seq, event))
        })
        .collect()
}

fn course_from_payload(seq: i64, payload: &str) -> RemoteResult<Course> {
    serde_json::from_str::<JournalPayload>(payload)
        .ok()
        .and_then(JournalPayload::into_course)
        .ok_or_else(|| RemoteError::Unknown(format!("malformed journal entry {}", seq)))
}

/// Stored with nanosecond precision so a course reads back exactly as written
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Map a row selected with `COURSE_COLUMNS`
fn course_from_row(row: &Row) -> rusqlite::Result<Course> {
    let duration_str: String = row.get(6)?;
    let created_at_str: String = row.get(8)?;

    let duration = duration_str.parse::<DurationBand>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(6, "duration".to_string(), rusqlite::types::Type::Text)
    })?;
    let created_at = parse_timestamp(&created_at_str).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(8, "created_at".to_string(), rusqlite::types::Type::Text)
    })?;

    Ok(Course {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        branch: row.get(3)?,
        program: row.get(4)?,
        technology: row.get(5)?,
        duration,
        price: row.get(7)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::{ControllerOptions, LoadStatus, PagedCollectionController, STREAM_DISCONNECTED};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use tokio::sync::mpsc;

    fn course(title: &str, minutes_ago: i64) -> Course {
        let mut course = Course::sample(title);
        course.created_at = Utc::now() - ChronoDuration::minutes(minutes_ago);
        course
    }

    #[tokio::test]
    async fn test_count_and_range_order() {
        let store = SqliteCourseStore::open_in_memory().unwrap();
        for (title, age) in [("Welding", 30), ("Linux", 1), ("Electronics", 10)] {
            store.insert(&course(title, age)).unwrap();
        }

        assert_eq!(store.count("courses").await.unwrap(), 3);

        let newest = store.range("courses", OrderBy::NewestFirst, 0, 2).await.unwrap();
        let titles: Vec<_> = newest.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Linux", "Electronics"]);

        let oldest = store.range("courses", OrderBy::OldestFirst, 0, 1).await.unwrap();
        assert_eq!(oldest[0].title, "Welding");

        let tail = store.range("courses", OrderBy::NewestFirst, 2, 10).await.unwrap();
        assert_eq!(tail.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_collection_and_empty_limit() {
        let store = SqliteCourseStore::open_in_memory().unwrap();
        assert!(matches!(store.count("modules").await, Err(RemoteError::NotFound(_))));
        assert_eq!(
            store.range("courses", OrderBy::NewestFirst, 0, 0).await.unwrap_err(),
            RemoteError::InvalidRange { offset: 0, limit: 0 }
        );
    }

    #[test]
    fn test_update_delete_and_get() {
        let store = SqliteCourseStore::open_in_memory().unwrap();
        let mut linux = course("Linux", 5);
        store.insert(&linux).unwrap();

        linux.price = 12_000;
        assert!(store.update(&linux).unwrap());
        assert_eq!(store.get(&linux.id).unwrap().unwrap().price, 12_000);

        assert!(store.delete(&linux.id).unwrap());
        assert!(!store.delete(&linux.id).unwrap());
        assert!(store.get(&linux.id).unwrap().is_none());
        assert!(!store.update(&linux).unwrap());
    }

    #[test]
    fn test_reopen_keeps_courses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courses.db");

        let original = course("Databases", 3);
        {
            let store = SqliteCourseStore::open(&path).unwrap();
            store.insert(&original).unwrap();
        }

        let store = SqliteCourseStore::open(&path).unwrap();
        assert_eq!(store.get(&original.id).unwrap(), Some(original));
    }

    #[tokio::test]
    async fn test_subscription_delivers_journal_in_order() {
        let store = SqliteCourseStore::open_in_memory()
            .unwrap()
            .with_poll_interval(Duration::from_millis(10));
        let before = course("Before", 9);
        store.insert(&before).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler: EventHandler<Course> = Arc::new(move |notice| {
            let _ = tx.send(notice);
        });
        let subscription = store.subscribe("courses", handler).await.unwrap();

        let mut linux = course("Linux", 1);
        store.insert(&linux).unwrap();
        linux.title = "Linux Administration".to_string();
        store.update(&linux).unwrap();
        store.delete(&before.id).unwrap();

        let mut kinds = Vec::new();
        while kinds.len() < 3 {
            let notice = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("change notice")
                .expect("open channel");
            match notice {
                StreamNotice::Change(ChangeEvent::Created { record }) => {
                    assert_eq!(record.title, "Linux");
                    assert_eq!(record.created_at, linux.created_at);
                    kinds.push("created");
                }
                StreamNotice::Change(ChangeEvent::Updated { record }) => {
                    assert_eq!(record.title, "Linux Administration");
                    kinds.push("updated");
                }
                StreamNotice::Change(ChangeEvent::Deleted { id }) => {
                    assert_eq!(id, before.id);
                    kinds.push("deleted");
                }
                other => panic!("unexpected notice: {:?}", other),
            }
        }
        assert_eq!(kinds, vec!["created", "updated", "deleted"]);

        assert!(subscription.cancel());
        assert!(!subscription.cancel());
    }

    fn channel_handler() -> (EventHandler<Course>, mpsc::UnboundedReceiver<StreamNotice<Course>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: EventHandler<Course> = Arc::new(move |notice| {
            let _ = tx.send(notice);
        });
        (handler, rx)
    }

    async fn next_notice(rx: &mut mpsc::UnboundedReceiver<StreamNotice<Course>>) -> StreamNotice<Course> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("change notice")
            .expect("open channel")
    }

    fn fast_store() -> Arc<SqliteCourseStore> {
        Arc::new(
            SqliteCourseStore::open_in_memory()
                .unwrap()
                .with_poll_interval(Duration::from_millis(10)),
        )
    }

    async fn wait_for(
        controller: &PagedCollectionController<Course>,
        ready: impl Fn(&crate::pager::PageState<Course>) -> bool,
    ) {
        let mut changes = controller.changes();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !ready(&controller.snapshot()) {
                changes.changed().await.expect("controller alive");
            }
        })
        .await
        .expect("controller state");
    }

    #[tokio::test]
    async fn test_range_returns_courses_exactly_as_inserted() {
        let store = SqliteCourseStore::open_in_memory().unwrap();
        let mut linux = Course::sample("Linux");
        linux.created_at = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        store.insert(&linux).unwrap();

        let page = store.range("courses", OrderBy::NewestFirst, 0, 10).await.unwrap();
        assert_eq!(page, vec![linux]);
    }

    #[tokio::test]
    async fn test_course_removed_before_poll_still_reports_creation() {
        let store = fast_store();
        let (handler, mut rx) = channel_handler();
        let _subscription = store.subscribe("courses", handler).await.unwrap();

        let short_lived = Course::sample("Short-lived");
        store.insert(&short_lived).unwrap();
        store.delete(&short_lived.id).unwrap();

        match next_notice(&mut rx).await {
            StreamNotice::Change(ChangeEvent::Created { record }) => assert_eq!(record, short_lived),
            other => panic!("expected creation, got {:?}", other),
        }
        match next_notice(&mut rx).await {
            StreamNotice::Change(ChangeEvent::Deleted { id }) => assert_eq!(id, short_lived.id),
            other => panic!("expected deletion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_controller_count_survives_create_and_delete_between_polls() {
        let store = fast_store();
        for i in 0..5 {
            store.insert(&course(&format!("Course {}", i), 10 + i)).unwrap();
        }
        let controller = PagedCollectionController::new(store.clone(), ControllerOptions::default());
        controller.start().await;
        assert_eq!(controller.snapshot().total_count, 5);

        let short_lived = course("Short-lived", 1);
        store.insert(&short_lived).unwrap();
        store.delete(&short_lived.id).unwrap();
        let marker = course("Marker", 0);
        store.insert(&marker).unwrap();

        wait_for(&controller, |state| state.contains(&marker.id)).await;
        let state = controller.snapshot();
        assert_eq!(state.total_count, 6);
        assert!(!state.contains(&short_lived.id));
        assert_eq!(store.count("courses").await.unwrap(), 6);
        controller.dispose();
    }

    #[test]
    fn test_prune_drops_only_aged_entries() {
        let store = SqliteCourseStore::open_in_memory()
            .unwrap()
            .with_journal_retention(Duration::from_secs(600));
        for title in ["Linux", "Databases", "Welding"] {
            store.insert(&Course::sample(title)).unwrap();
        }
        lock(&store.conn)
            .execute("UPDATE course_changes SET recorded_at = recorded_at - 3600 WHERE seq <= 2", [])
            .unwrap();

        assert_eq!(store.prune_journal().unwrap(), 2);
        assert_eq!(store.prune_journal().unwrap(), 0);
        let left: i64 = lock(&store.conn)
            .query_row("SELECT COUNT(*) FROM course_changes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(left, 1);
    }

    #[tokio::test]
    async fn test_subscription_after_full_prune_sees_new_writes() {
        let store = fast_store();
        store.insert(&Course::sample("Linux")).unwrap();
        lock(&store.conn)
            .execute("UPDATE course_changes SET recorded_at = recorded_at - 3600", [])
            .unwrap();
        assert_eq!(store.prune_journal().unwrap(), 1);

        let (handler, mut rx) = channel_handler();
        let _subscription = store.subscribe("courses", handler).await.unwrap();
        let databases = Course::sample("Databases");
        store.insert(&databases).unwrap();

        match next_notice(&mut rx).await {
            StreamNotice::Change(ChangeEvent::Created { record }) => assert_eq!(record.id, databases.id),
            other => panic!("expected creation, got {:?}", other),
        }
    }

    #[test]
    fn test_open_rebuilds_journal_without_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courses.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE course_changes (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    kind TEXT NOT NULL,
                    course_id TEXT NOT NULL
                );
                INSERT INTO course_changes (kind, course_id) VALUES ('created', 'legacy');",
            )
            .unwrap();
        }

        let store = SqliteCourseStore::open(&path).unwrap();
        let legacy: i64 = lock(&store.conn)
            .query_row("SELECT COUNT(*) FROM course_changes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(legacy, 0);

        store.insert(&Course::sample("Linux")).unwrap();
        let payload: Option<String> = lock(&store.conn)
            .query_row("SELECT payload FROM course_changes", [], |row| row.get(0))
            .unwrap();
        assert!(payload.is_some());
    }

    #[tokio::test]
    async fn test_journal_read_failure_disconnects() {
        let store = fast_store();
        let (handler, mut rx) = channel_handler();
        let _subscription = store.subscribe("courses", handler).await.unwrap();

        lock(&store.conn).execute_batch("DROP TABLE course_changes").unwrap();

        match next_notice(&mut rx).await {
            StreamNotice::Disconnected { reason } => assert!(reason.contains("course_changes")),
            other => panic!("expected disconnect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_controller_keeps_items_when_journal_fails() {
        let store = fast_store();
        for i in 0..3 {
            store.insert(&course(&format!("Course {}", i), i)).unwrap();
        }
        let controller = PagedCollectionController::new(store.clone(), ControllerOptions::default());
        controller.start().await;
        assert_eq!(controller.snapshot().items.len(), 3);

        lock(&store.conn).execute_batch("DROP TABLE course_changes").unwrap();

        wait_for(&controller, |state| state.status.is_failed()).await;
        let state = controller.snapshot();
        assert_eq!(state.status, LoadStatus::Failed(STREAM_DISCONNECTED.to_string()));
        assert!(!state.live);
        assert_eq!(state.items.len(), 3);
        assert_eq!(state.total_count, 3);
    }
}
