//! Event persistence.
//!
//! [`EventRepository`] is the storage seam. Two implementations share its
//! semantics:
//! - [`SqliteRepository`]: the production store
//! - [`MemoryRepository`]: an in-process double for tests and embedding
//!
//! Writes are deduplicated by content: submitting an event whose uuid is
//! already stored with the same content hash is a no-op. Every write that
//! does change state appends one row to the status log.

mod memory;
mod sqlite;

use std::sync::OnceLock;

use eventshub_core::{CodecError, Event, TemporalCodec};
use thiserror::Error;
use tracing::warn;

pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a repository.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    #[error("stored moment cannot be decoded: {0}")]
    Codec(#[from] CodecError),

    /// The status log has no rows yet.
    #[error("no status recorded")]
    NoStatus,

    /// The repository was closed.
    #[error("repository is closed")]
    Closed,

    /// A previous holder of the storage lock panicked.
    #[error("storage lock poisoned")]
    Poisoned,
}

/// What [`EventRepository::insert_or_update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }

    /// Whether the call wrote to storage.
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// The stored event after an upsert, with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upsert {
    pub event: Event,
    pub outcome: UpsertOutcome,
}

/// One row of the append-only status log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    /// Epoch seconds of the write.
    pub timestamp: i64,
    pub version: String,
}

/// Storage seam for events, credentials and the status log.
///
/// Calls are blocking; async callers run them on the blocking pool.
pub trait EventRepository: Send + Sync {
    /// Inserts a new event or updates the stored one with the same uuid.
    fn insert_or_update(&self, event: &Event) -> StorageResult<Upsert>;

    /// Deletes by uuid. Returns whether a row was removed.
    fn delete(&self, event: &Event) -> StorageResult<bool>;

    /// Events overlapping `[start, end]` (epoch seconds, both inclusive),
    /// in storage order.
    fn range_query(&self, start: i64, end: i64) -> StorageResult<Vec<Event>>;

    fn get_by_uuid(&self, uuid: &str) -> StorageResult<Option<Event>>;

    fn all_events(&self) -> StorageResult<Vec<Event>>;

    /// The most recent status row.
    fn get_status(&self) -> StorageResult<StatusRecord>;

    /// Stores `username` with `secret`, hashing it unless `already_hashed`.
    /// Re-adding a username replaces its hash.
    fn add_credential(&self, username: &str, secret: &str, already_hashed: bool)
    -> StorageResult<()>;

    /// Checks a password. Unknown users and malformed stored hashes yield
    /// `Ok(false)`.
    fn authenticate(&self, username: &str, password: &str) -> StorageResult<bool>;

    /// Creates the schema if needed and appends a status row.
    fn migrate(&self) -> StorageResult<()>;

    /// Releases the storage handle. Later calls fail with
    /// [`StorageError::Closed`].
    fn close(&self) -> StorageResult<()>;
}

/// An event whose moments went through the codec once, with its encoded span.
///
/// Both stores compare and persist this form, so a moment that normalizes to
/// another one (a DST gap time, an out-of-range field) still deduplicates.
#[derive(Debug, Clone)]
pub(crate) struct EncodedEvent {
    pub(crate) event: Event,
    pub(crate) starts_at: i64,
    pub(crate) ends_at: i64,
}

impl EncodedEvent {
    pub(crate) fn new(codec: &TemporalCodec, event: &Event) -> StorageResult<Self> {
        let starts_at = codec.encode(&event.start);
        let ends_at = codec.encode(&event.end);
        let mut event = event.clone();
        event.start = codec.decode(starts_at)?;
        event.end = codec.decode(ends_at)?;
        Ok(Self {
            event,
            starts_at,
            ends_at,
        })
    }
}

/// bcrypt hashing and verification shared by the implementations.
pub(crate) struct PasswordHasher {
    cost: u32,
    dummy: OnceLock<Option<String>>,
}

impl PasswordHasher {
    pub(crate) fn new(cost: u32) -> Self {
        Self {
            cost,
            dummy: OnceLock::new(),
        }
    }

    pub(crate) fn hash(&self, secret: &str) -> StorageResult<String> {
        Ok(bcrypt::hash(secret, self.cost)?)
    }

    /// Verifies `password` against `stored`.
    ///
    /// With no stored hash the password is checked against a throwaway hash
    /// of the same cost and the result discarded, so unknown users take as
    /// long as wrong passwords.
    pub(crate) fn verify(&self, username: &str, stored: Option<&str>, password: &str) -> bool {
        match stored {
            Some(hash) => match bcrypt::verify(password, hash) {
                Ok(valid) => valid,
                Err(err) => {
                    warn!(username, error = %err, "Stored credential hash is malformed");
                    false
                }
            },
            None => {
                let dummy = self
                    .dummy
                    .get_or_init(|| bcrypt::hash("eventshub-unknown-user", self.cost).ok());
                if let Some(dummy) = dummy {
                    let _ = bcrypt::verify(password, dummy);
                }
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every repository must show, run against each implementation.

    use eventshub_core::{Moment, Source, TemporalCodec};

    use super::*;

    /// Cheapest bcrypt cost, to keep credential tests fast.
    pub(crate) const TEST_COST: u32 = 4;

    pub(crate) fn standup() -> Event {
        Event::new("abc", "Standup")
            .with_version("1.1.1")
            .with_span(
                Moment::new(2024, 2, 13, 9, 0),
                Moment::new(2024, 2, 13, 9, 30),
            )
            .with_important(true)
    }

    fn epoch(moment: Moment) -> i64 {
        TemporalCodec::default().encode(&moment)
    }

    pub(crate) fn insert_assigns_id(repo: &dyn EventRepository) {
        repo.migrate().unwrap();
        let first = repo.insert_or_update(&standup()).unwrap();
        assert_eq!(first.outcome, UpsertOutcome::Inserted);
        assert!(first.event.id > 0);
        assert_eq!(first.event.uuid, "abc");

        let other = repo
            .insert_or_update(&Event::new("def", "Lunch"))
            .unwrap();
        assert_eq!(other.outcome, UpsertOutcome::Inserted);
        assert_ne!(other.event.id, first.event.id);
    }

    pub(crate) fn resubmission_is_idempotent(repo: &dyn EventRepository) {
        repo.migrate().unwrap();
        let first = repo.insert_or_update(&standup()).unwrap();
        let status_before = repo.get_status().unwrap();

        for _ in 0..3 {
            let again = repo.insert_or_update(&standup()).unwrap();
            assert_eq!(again.outcome, UpsertOutcome::Unchanged);
            assert_eq!(again.event.id, first.event.id);
        }
        // A different channel with the same content is still a no-op.
        let via_xml = repo
            .insert_or_update(&standup().with_source(Source::Xml))
            .unwrap();
        assert_eq!(via_xml.outcome, UpsertOutcome::Unchanged);

        assert_eq!(repo.all_events().unwrap().len(), 1);
        assert_eq!(repo.get_status().unwrap(), status_before);
    }

    pub(crate) fn normalized_moments_stay_unchanged(repo: &dyn EventRepository) {
        repo.migrate().unwrap();
        // 02:30 does not exist in Warsaw on 2024-03-31 and 08:60 carries over.
        let gap = Event::new("gap", "Night shift").with_span(
            Moment::new(2024, 3, 31, 2, 30),
            Moment::new(2024, 3, 31, 8, 60),
        );

        let first = repo.insert_or_update(&gap).unwrap();
        assert_eq!(first.outcome, UpsertOutcome::Inserted);
        assert_eq!(first.event.start, Moment::new(2024, 3, 31, 3, 30));
        assert_eq!(first.event.end, Moment::new(2024, 3, 31, 9, 0));
        let status_before = repo.get_status().unwrap();

        for _ in 0..2 {
            let again = repo.insert_or_update(&gap).unwrap();
            assert_eq!(again.outcome, UpsertOutcome::Unchanged);
            assert_eq!(again.event.id, first.event.id);
        }
        assert_eq!(repo.get_status().unwrap(), status_before);
    }

    pub(crate) fn extreme_moments_leave_repository_usable(repo: &dyn EventRepository) {
        repo.migrate().unwrap();
        let extremes = [
            Moment::new(-300_000, 1, 1, 0, 0),
            Moment::new(i32::MIN, i32::MIN, i32::MIN, i32::MIN, i32::MIN),
            Moment::new(i32::MAX, i32::MAX, i32::MAX, i32::MAX, i32::MAX),
        ];
        for (n, moment) in extremes.into_iter().enumerate() {
            let event = Event::new(format!("far-{n}"), "Far away").with_span(moment, moment);
            // Rejecting the event is fine; poisoning the store is not.
            match repo.insert_or_update(&event) {
                Ok(_) | Err(StorageError::Codec(_)) => {}
                Err(err) => panic!("unexpected error for {moment:?}: {err}"),
            }
        }

        let next = repo.insert_or_update(&standup()).unwrap();
        assert_eq!(next.outcome, UpsertOutcome::Inserted);
        assert!(repo.get_status().is_ok());
        assert!(repo.get_by_uuid("abc").unwrap().is_some());
    }

    pub(crate) fn changed_content_updates_in_place(repo: &dyn EventRepository) {
        repo.migrate().unwrap();
        let first = repo.insert_or_update(&standup()).unwrap();

        let changed = standup().with_title("Standup (moved)").with_done(true);
        let updated = repo.insert_or_update(&changed).unwrap();
        assert_eq!(updated.outcome, UpsertOutcome::Updated);
        assert_eq!(updated.event.id, first.event.id);

        let stored = repo.get_by_uuid("abc").unwrap().unwrap();
        assert_eq!(stored.title, "Standup (moved)");
        assert!(stored.done);
        assert_eq!(stored.id, first.event.id);
        assert!(stored.same_content(&changed));

        // Re-sending the older version converges back to it.
        repo.insert_or_update(&standup()).unwrap();
        let stored = repo.get_by_uuid("abc").unwrap().unwrap();
        assert!(stored.same_content(&standup()));
        assert_eq!(repo.all_events().unwrap().len(), 1);
    }

    pub(crate) fn range_query_bounds(repo: &dyn EventRepository) {
        repo.migrate().unwrap();
        repo.insert_or_update(&standup()).unwrap();
        let start = epoch(Moment::new(2024, 2, 13, 9, 0));
        let end = epoch(Moment::new(2024, 2, 13, 9, 30));

        let day = repo
            .range_query(
                epoch(Moment::new(2024, 2, 13, 0, 0)),
                epoch(Moment::new(2024, 2, 13, 23, 59)),
            )
            .unwrap();
        assert_eq!(day.len(), 1);
        assert_eq!(day[0].start, Moment::new(2024, 2, 13, 9, 0));
        assert_eq!(day[0].end, Moment::new(2024, 2, 13, 9, 30));

        // Touching intervals are included at both ends.
        assert_eq!(repo.range_query(end, end + 3600).unwrap().len(), 1);
        assert_eq!(repo.range_query(start - 3600, start).unwrap().len(), 1);

        assert!(repo.range_query(end + 1, end + 3600).unwrap().is_empty());
        assert!(repo.range_query(start - 3600, start - 1).unwrap().is_empty());
    }

    pub(crate) fn get_and_delete_by_uuid(repo: &dyn EventRepository) {
        repo.migrate().unwrap();
        assert!(repo.get_by_uuid("abc").unwrap().is_none());

        let stored = repo.insert_or_update(&standup()).unwrap().event;
        let fetched = repo.get_by_uuid("abc").unwrap().unwrap();
        assert_eq!(fetched, stored);
        assert_eq!(fetched.checksum(), standup().checksum());

        assert!(repo.delete(&standup()).unwrap());
        assert!(!repo.delete(&standup()).unwrap());
        assert!(repo.get_by_uuid("abc").unwrap().is_none());
    }

    pub(crate) fn status_log_tracks_writes(repo: &dyn EventRepository) {
        assert!(matches!(repo.get_status(), Err(StorageError::NoStatus)));

        repo.migrate().unwrap();
        let after_migrate = repo.get_status().unwrap();
        assert_eq!(after_migrate.version, "1.1.0");
        assert!(after_migrate.timestamp > 0);

        repo.insert_or_update(&standup()).unwrap();
        let after_insert = repo.get_status().unwrap();
        assert!(after_insert.timestamp >= after_migrate.timestamp);
    }

    pub(crate) fn credentials(repo: &dyn EventRepository) {
        repo.migrate().unwrap();
        repo.add_credential("admin", "s3cret", false).unwrap();

        assert!(repo.authenticate("admin", "s3cret").unwrap());
        assert!(!repo.authenticate("admin", "wrong").unwrap());
        assert!(!repo.authenticate("nobody", "s3cret").unwrap());

        // Re-seeding replaces the hash.
        let hash = bcrypt::hash("rotated", TEST_COST).unwrap();
        repo.add_credential("admin", &hash, true).unwrap();
        assert!(repo.authenticate("admin", "rotated").unwrap());
        assert!(!repo.authenticate("admin", "s3cret").unwrap());

        repo.add_credential("broken", "not-a-bcrypt-hash", true).unwrap();
        assert!(!repo.authenticate("broken", "not-a-bcrypt-hash").unwrap());
    }

    pub(crate) fn closed_repository_rejects_calls(repo: &dyn EventRepository) {
        repo.migrate().unwrap();
        repo.close().unwrap();
        assert!(matches!(
            repo.insert_or_update(&standup()),
            Err(StorageError::Closed)
        ));
        assert!(matches!(repo.get_status(), Err(StorageError::Closed)));
        assert!(matches!(repo.close(), Err(StorageError::Closed)));
    }
}
