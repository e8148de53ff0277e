//! SQLite-backed repository.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use eventshub_core::{Event, Source, TemporalCodec};
use eventshub_protocol::REPOSITORY_VERSION;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info, instrument};

use super::{
    EncodedEvent, EventRepository, PasswordHasher, StatusRecord, StorageError, StorageResult,
    Upsert, UpsertOutcome,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        version TEXT NOT NULL DEFAULT '',
        uuid TEXT NOT NULL,
        title TEXT NOT NULL DEFAULT '',
        starts_at INTEGER NOT NULL,
        ends_at INTEGER NOT NULL,
        address TEXT NOT NULL DEFAULT '',
        info TEXT NOT NULL DEFAULT '',
        reminder INTEGER NOT NULL DEFAULT 0,
        done INTEGER NOT NULL DEFAULT 0,
        important INTEGER NOT NULL DEFAULT 0,
        urgent INTEGER NOT NULL DEFAULT 0,
        source TEXT NOT NULL DEFAULT ''
    );
    CREATE UNIQUE INDEX IF NOT EXISTS events_uuid_idx ON events(uuid);
    CREATE INDEX IF NOT EXISTS events_span_idx ON events(starts_at, ends_at);
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS status (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp INTEGER NOT NULL,
        version TEXT NOT NULL
    );
";

const EVENT_COLUMNS: &str = "id, version, uuid, title, starts_at, ends_at, address, info, \
                             reminder, done, important, urgent, source";

/// An event row before its moments are decoded.
struct EventRow {
    id: i64,
    version: String,
    uuid: String,
    title: String,
    starts_at: i64,
    ends_at: i64,
    address: String,
    info: String,
    reminder: i32,
    done: bool,
    important: bool,
    urgent: bool,
    source: String,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            version: row.get(1)?,
            uuid: row.get(2)?,
            title: row.get(3)?,
            starts_at: row.get(4)?,
            ends_at: row.get(5)?,
            address: row.get(6)?,
            info: row.get(7)?,
            reminder: row.get(8)?,
            done: row.get(9)?,
            important: row.get(10)?,
            urgent: row.get(11)?,
            source: row.get(12)?,
        })
    }

    fn into_event(self, codec: &TemporalCodec) -> StorageResult<Event> {
        Ok(Event {
            id: self.id,
            version: self.version,
            uuid: self.uuid,
            title: self.title,
            start: codec.decode(self.starts_at)?,
            end: codec.decode(self.ends_at)?,
            address: self.address,
            info: self.info,
            reminder: self.reminder,
            done: self.done,
            important: self.important,
            urgent: self.urgent,
            source: Source::from(self.source),
            ..Default::default()
        })
    }
}

/// Event repository over a single SQLite connection.
///
/// The connection sits behind a mutex; each call takes the lock for its
/// whole duration.
pub struct SqliteRepository {
    conn: Mutex<Option<Connection>>,
    codec: TemporalCodec,
    hasher: PasswordHasher,
}

impl SqliteRepository {
    /// Opens (or creates) a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>, codec: TemporalCodec) -> StorageResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        info!(path = %path.display(), "Opened event database");
        Ok(Self::from_connection(conn, codec))
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn in_memory(codec: TemporalCodec) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        debug!("Opened in-memory event database");
        Ok(Self::from_connection(conn, codec))
    }

    fn from_connection(conn: Connection, codec: TemporalCodec) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
            codec,
            hasher: PasswordHasher::new(bcrypt::DEFAULT_COST),
        }
    }

    /// Builder: set the bcrypt cost used by [`EventRepository::add_credential`].
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.hasher = PasswordHasher::new(cost);
        self
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StorageResult<T>) -> StorageResult<T> {
        let guard = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let conn = guard.as_ref().ok_or(StorageError::Closed)?;
        f(conn)
    }

    fn append_status(conn: &Connection) -> StorageResult<()> {
        conn.execute(
            "INSERT INTO status (timestamp, version) VALUES (?1, ?2)",
            params![Utc::now().timestamp(), REPOSITORY_VERSION],
        )?;
        Ok(())
    }

    fn find_by_uuid(&self, conn: &Connection, uuid: &str) -> StorageResult<Option<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE uuid = ?1");
        let row = conn
            .query_row(&sql, params![uuid], EventRow::from_row)
            .optional()?;
        row.map(|row| row.into_event(&self.codec)).transpose()
    }

    fn query_events(
        &self,
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StorageResult<Vec<Event>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, EventRow::from_row)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event(&self.codec)?);
        }
        Ok(events)
    }
}

impl EventRepository for SqliteRepository {
    #[instrument(skip(self, event), fields(uuid = %event.uuid))]
    fn insert_or_update(&self, event: &Event) -> StorageResult<Upsert> {
        let EncodedEvent {
            event,
            starts_at,
            ends_at,
        } = EncodedEvent::new(&self.codec, event)?;
        let event = &event;

        self.with_conn(|conn| {
            let outcome = match self.find_by_uuid(conn, &event.uuid)? {
                Some(stored) if stored.same_content(event) => {
                    debug!(id = stored.id, "Event unchanged");
                    return Ok(Upsert {
                        event: stored,
                        outcome: UpsertOutcome::Unchanged,
                    });
                }
                Some(stored) => {
                    conn.execute(
                        "UPDATE events SET version = ?1, title = ?2, starts_at = ?3, ends_at = ?4, \
                         address = ?5, info = ?6, reminder = ?7, done = ?8, important = ?9, \
                         urgent = ?10, source = ?11 WHERE id = ?12",
                        params![
                            event.version,
                            event.title,
                            starts_at,
                            ends_at,
                            event.address,
                            event.info,
                            event.reminder,
                            event.done,
                            event.important,
                            event.urgent,
                            event.source.as_str(),
                            stored.id,
                        ],
                    )?;
                    UpsertOutcome::Updated
                }
                None => {
                    conn.execute(
                        "INSERT INTO events (version, uuid, title, starts_at, ends_at, address, \
                         info, reminder, done, important, urgent, source) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                        params![
                            event.version,
                            event.uuid,
                            event.title,
                            starts_at,
                            ends_at,
                            event.address,
                            event.info,
                            event.reminder,
                            event.done,
                            event.important,
                            event.urgent,
                            event.source.as_str(),
                        ],
                    )?;
                    UpsertOutcome::Inserted
                }
            };

            Self::append_status(conn)?;
            let stored = self
                .find_by_uuid(conn, &event.uuid)?
                .ok_or(StorageError::Sqlite(rusqlite::Error::QueryReturnedNoRows))?;
            debug!(id = stored.id, outcome = outcome.as_str(), "Event stored");
            Ok(Upsert {
                event: stored,
                outcome,
            })
        })
    }

    fn delete(&self, event: &Event) -> StorageResult<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM events WHERE uuid = ?1", params![event.uuid])?;
            Ok(removed > 0)
        })
    }

    fn range_query(&self, start: i64, end: i64) -> StorageResult<Vec<Event>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE ends_at >= ?1 AND starts_at <= ?2 \
                 ORDER BY id"
            );
            self.query_events(conn, &sql, params![start, end])
        })
    }

    fn get_by_uuid(&self, uuid: &str) -> StorageResult<Option<Event>> {
        self.with_conn(|conn| self.find_by_uuid(conn, uuid))
    }

    fn all_events(&self) -> StorageResult<Vec<Event>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY id");
            self.query_events(conn, &sql, [])
        })
    }

    fn get_status(&self) -> StorageResult<StatusRecord> {
        self.with_conn(|conn| {
            let latest = conn
                .query_row(
                    "SELECT timestamp, version FROM status ORDER BY id DESC LIMIT 1",
                    [],
                    |row| {
                        Ok(StatusRecord {
                            timestamp: row.get(0)?,
                            version: row.get(1)?,
                        })
                    },
                )
                .optional();
            match latest {
                Ok(Some(record)) => Ok(record),
                Ok(None) => Err(StorageError::NoStatus),
                // Before the first migration the table does not exist yet.
                Err(rusqlite::Error::SqliteFailure(_, Some(message)))
                    if message.contains("no such table") =>
                {
                    Err(StorageError::NoStatus)
                }
                Err(err) => Err(err.into()),
            }
        })
    }

    fn add_credential(
        &self,
        username: &str,
        secret: &str,
        already_hashed: bool,
    ) -> StorageResult<()> {
        let hash = if already_hashed {
            secret.to_string()
        } else {
            self.hasher.hash(secret)?
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, password) VALUES (?1, ?2) \
                 ON CONFLICT(username) DO UPDATE SET password = excluded.password",
                params![username, hash],
            )?;
            debug!(username, "Credential stored");
            Ok(())
        })
    }

    fn authenticate(&self, username: &str, password: &str) -> StorageResult<bool> {
        let stored: Option<String> = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT password FROM users WHERE username = ?1",
                    params![username],
                    |row| row.get(0),
                )
                .optional()?)
        })?;
        Ok(self.hasher.verify(username, stored.as_deref(), password))
    }

    fn migrate(&self) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch(SCHEMA)?;
            Self::append_status(conn)?;
            info!("Database schema is up to date");
            Ok(())
        })
    }

    fn close(&self) -> StorageResult<()> {
        let mut guard = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let conn = guard.take().ok_or(StorageError::Closed)?;
        conn.close().map_err(|(_, err)| StorageError::Sqlite(err))?;
        info!("Closed event database");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::super::contract;
    use super::*;

    fn repo() -> SqliteRepository {
        SqliteRepository::in_memory(TemporalCodec::default())
            .unwrap()
            .with_bcrypt_cost(contract::TEST_COST)
    }

    #[test]
    fn insert_assigns_id() {
        contract::insert_assigns_id(&repo());
    }

    #[test]
    fn resubmission_is_idempotent() {
        contract::resubmission_is_idempotent(&repo());
    }

    #[test]
    fn normalized_moments_stay_unchanged() {
        contract::normalized_moments_stay_unchanged(&repo());
    }

    #[test]
    fn extreme_moments_leave_repository_usable() {
        contract::extreme_moments_leave_repository_usable(&repo());
    }

    #[test]
    fn changed_content_updates_in_place() {
        contract::changed_content_updates_in_place(&repo());
    }

    #[test]
    fn range_query_bounds() {
        contract::range_query_bounds(&repo());
    }

    #[test]
    fn get_and_delete_by_uuid() {
        contract::get_and_delete_by_uuid(&repo());
    }

    #[test]
    fn status_log_tracks_writes() {
        contract::status_log_tracks_writes(&repo());
    }

    #[test]
    fn credentials() {
        contract::credentials(&repo());
    }

    #[test]
    fn closed_repository_rejects_calls() {
        contract::closed_repository_rejects_calls(&repo());
    }

    #[test]
    fn migrate_is_idempotent() {
        let repo = repo();
        repo.migrate().unwrap();
        repo.insert_or_update(&contract::standup()).unwrap();
        repo.migrate().unwrap();
        assert_eq!(repo.all_events().unwrap().len(), 1);
    }

    #[test]
    fn file_database_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.db");

        let repo = SqliteRepository::open(&path, TemporalCodec::default()).unwrap();
        repo.migrate().unwrap();
        let stored = repo.insert_or_update(&contract::standup()).unwrap().event;
        repo.close().unwrap();

        let reopened = SqliteRepository::open(&path, TemporalCodec::default()).unwrap();
        reopened.migrate().unwrap();
        let fetched = reopened.get_by_uuid("abc").unwrap().unwrap();
        assert_eq!(fetched, stored);
        assert_eq!(
            reopened.insert_or_update(&contract::standup()).unwrap().outcome,
            UpsertOutcome::Unchanged
        );
    }

    #[test]
    fn out_of_range_moments_are_normalized_on_read() {
        use eventshub_core::Moment;

        let repo = repo();
        repo.migrate().unwrap();
        let event = Event::new("n1", "New year").with_span(
            Moment::new(2023, 13, 1, 0, 0),
            Moment::new(2023, 13, 1, 0, 60),
        );
        let stored = repo.insert_or_update(&event).unwrap().event;
        assert_eq!(stored.start, Moment::new(2024, 1, 1, 0, 0));
        assert_eq!(stored.end, Moment::new(2024, 1, 1, 1, 0));
    }
}
