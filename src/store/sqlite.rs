//! SQLite-backed log storage
//!
//! A log file is a single SQLite database with four tables:
//!
//! - `migrations`: schema version history; the newest `to_version` row is the
//!   file's version.
//! - `message_types`: interned message type names.
//! - `topics`: `(name, message_type_id)` pairs; one topic name may appear
//!   once per type it carries.
//! - `messages`: the messages themselves, stamped with `time_recv` in
//!   nanoseconds on a clock that is monotonic within the file.
//!
//! Playback opens files read-only; the recorder opens them read-write and
//! creates the schema in fresh files. Batches page through the message
//! cursor in keyset-ordered chunks so a large log is never fully resident.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::{debug, error};

use crate::error::{Result, RewindError};

use super::batch::Batch;
use super::descriptor::Descriptor;
use super::message::Message;
use super::Store;

/// The only schema version this build reads and writes.
pub const SCHEMA_VERSION: &str = "0.1.0";

/// Rows fetched per page while iterating a batch.
const PAGE_SIZE: usize = 512;

const SCHEMA: &str = "
BEGIN;
CREATE TABLE migrations (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  from_version TEXT,
  to_version TEXT NOT NULL
);
INSERT INTO migrations (to_version) VALUES ('0.1.0');
CREATE TABLE message_types (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL UNIQUE
);
CREATE TABLE topics (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  message_type_id INTEGER NOT NULL,
  FOREIGN KEY (message_type_id) REFERENCES message_types (id),
  UNIQUE (name, message_type_id)
);
CREATE TABLE messages (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  time_recv INTEGER NOT NULL,
  topic_id INTEGER NOT NULL,
  message BLOB NOT NULL,
  FOREIGN KEY (topic_id) REFERENCES topics (id)
);
CREATE INDEX idx_messages_time ON messages (time_recv, id);
COMMIT;
";

/// SQLite implementation of the [`Store`] contract.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    /// Rebuilt lazily, invalidated when a new topic is inserted.
    descriptor: Mutex<Option<Descriptor>>,
    /// `(topic, type) -> topics.id`, the recorder's hot path.
    topic_ids: Mutex<HashMap<(String, String), i64>>,
}

impl SqliteStore {
    /// Open an existing log read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let store = Self::wrap(conn, path);
        store.check_version()?;
        debug!(path = %store.path.display(), "opened log");
        Ok(store)
    }

    /// Open a log read-write, creating it (and its schema) if missing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;

        let fresh = !table_exists(&conn, "migrations")?;
        if fresh {
            conn.execute_batch(SCHEMA)?;
            debug!(path = %path.display(), "initialized log schema");
        }

        let store = Self::wrap(conn, path);
        store.check_version()?;
        Ok(store)
    }

    fn wrap(conn: Connection, path: &Path) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
            descriptor: Mutex::new(None),
            topic_ids: Mutex::new(HashMap::new()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema version recorded in the file; empty if the file has none.
    pub fn version(&self) -> String {
        let conn = self.conn.lock();
        read_version(&conn)
    }

    fn check_version(&self) -> Result<()> {
        let version = self.version();
        if version != SCHEMA_VERSION {
            error!(path = %self.path.display(), version = %version, "unsupported log file version");
            return Err(RewindError::UnsupportedVersion(version));
        }
        Ok(())
    }

    /// Insert one message, interning its topic and type on first sight.
    ///
    /// `time_received` is nanoseconds on the log's monotonic clock and must
    /// be non-decreasing across calls for playback to reproduce cadence.
    pub fn insert_message(
        &self,
        time_received: i64,
        topic: &str,
        type_name: &str,
        data: &[u8],
    ) -> Result<()> {
        let topic_id = self.insert_or_get_topic_id(topic, type_name)?;
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("INSERT INTO messages (time_recv, topic_id, message) VALUES (?1, ?2, ?3)")?;
        stmt.execute(rusqlite::params![time_received, topic_id, data])?;
        Ok(())
    }

    fn insert_or_get_topic_id(&self, topic: &str, type_name: &str) -> Result<i64> {
        let key = (topic.to_string(), type_name.to_string());
        if let Some(id) = self.topic_ids.lock().get(&key) {
            return Ok(*id);
        }

        let conn = self.conn.lock();
        conn.prepare_cached("INSERT OR IGNORE INTO message_types (name) VALUES (?1)")?
            .execute([type_name])?;
        conn.prepare_cached(
            "INSERT OR IGNORE INTO topics (name, message_type_id)
             SELECT ?1, id FROM message_types WHERE name = ?2",
        )?
        .execute([topic, type_name])?;
        let id: i64 = conn
            .prepare_cached(
                "SELECT topics.id FROM topics
                 JOIN message_types ON message_types.id = topics.message_type_id
                 WHERE topics.name = ?1 AND message_types.name = ?2",
            )?
            .query_row([topic, type_name], |row| row.get(0))?;
        drop(conn);

        self.topic_ids.lock().insert(key, id);
        // The catalog changed shape.
        *self.descriptor.lock() = None;
        Ok(id)
    }

    fn load_descriptor(&self) -> Result<Descriptor> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT topics.name, message_types.name FROM topics
             JOIN message_types ON topics.message_type_id = message_types.id",
        )?;
        let mut descriptor = Descriptor::default();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (topic, type_name) = row?;
            descriptor.insert(topic, type_name);
        }
        Ok(descriptor)
    }
}

impl Store for SqliteStore {
    fn valid(&self) -> bool {
        true
    }

    fn descriptor(&self) -> Descriptor {
        if let Some(cached) = self.descriptor.lock().as_ref() {
            return cached.clone();
        }
        match self.load_descriptor() {
            Ok(descriptor) => {
                *self.descriptor.lock() = Some(descriptor.clone());
                descriptor
            }
            Err(e) => {
                error!(error = %e, "failed to read log descriptor");
                Descriptor::default()
            }
        }
    }

    fn query_messages(&self, topics: &BTreeSet<String>) -> Result<Batch> {
        if topics.is_empty() {
            return Ok(Batch::empty());
        }
        Ok(Batch::new(PagedMessages {
            conn: Arc::clone(&self.conn),
            topics: topics.iter().cloned().collect(),
            cursor: (i64::MIN, i64::MIN),
            buffered: VecDeque::new(),
            done: false,
        }))
    }

    // sqlite3 may have been compiled without multi-threading support. This
    // only reflects the compile-time capability; runtime configuration
    // changes are not detected.
    fn threadsafe(&self) -> bool {
        unsafe { rusqlite::ffi::sqlite3_threadsafe() != 0 }
    }
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn read_version(conn: &Connection) -> String {
    let result = conn
        .query_row(
            "SELECT to_version FROM migrations ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional();
    match result {
        Ok(Some(version)) => version,
        Ok(None) | Err(_) => String::new(),
    }
}

/// Streams messages for a topic list in `(time_recv, id)` order, one page
/// at a time.
struct PagedMessages {
    conn: Arc<Mutex<Connection>>,
    topics: Vec<String>,
    cursor: (i64, i64),
    buffered: VecDeque<Message>,
    done: bool,
}

impl PagedMessages {
    fn fetch_page(&mut self) {
        let placeholders = vec!["?"; self.topics.len()].join(", ");
        let sql = format!(
            "SELECT messages.id, messages.time_recv, topics.name, message_types.name, messages.message
             FROM messages
             JOIN topics ON topics.id = messages.topic_id
             JOIN message_types ON message_types.id = topics.message_type_id
             WHERE topics.name IN ({placeholders})
               AND (messages.time_recv > ? OR (messages.time_recv = ? AND messages.id > ?))
             ORDER BY messages.time_recv, messages.id
             LIMIT ?"
        );

        let mut params: Vec<rusqlite::types::Value> = self
            .topics
            .iter()
            .map(|t| rusqlite::types::Value::Text(t.clone()))
            .collect();
        params.push(self.cursor.0.into());
        params.push(self.cursor.0.into());
        params.push(self.cursor.1.into());
        params.push((PAGE_SIZE as i64).into());

        let conn = self.conn.lock();
        let result = conn.prepare(&sql).and_then(|mut stmt| {
            let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    Message {
                        time_received: row.get(1)?,
                        topic: row.get(2)?,
                        type_name: row.get(3)?,
                        data: row.get::<_, Vec<u8>>(4)?.into(),
                    },
                ))
            })?;
            let mut page = Vec::with_capacity(PAGE_SIZE);
            for row in rows {
                page.push(row?);
            }
            Ok(page)
        });

        match result {
            Ok(page) => {
                if page.len() < PAGE_SIZE {
                    self.done = true;
                }
                if let Some((id, msg)) = page.last() {
                    self.cursor = (msg.time_received, *id);
                }
                self.buffered.extend(page.into_iter().map(|(_, msg)| msg));
            }
            Err(e) => {
                error!(error = %e, "failed to query messages");
                self.done = true;
            }
        }
    }
}

impl Iterator for PagedMessages {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        if self.buffered.is_empty() && !self.done {
            self.fetch_page();
        }
        self.buffered.pop_front()
    }
}
