//! In-process repository.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use eventshub_core::{Event, TemporalCodec};
use eventshub_protocol::REPOSITORY_VERSION;

use super::{
    EncodedEvent, EventRepository, PasswordHasher, StatusRecord, StorageError, StorageResult,
    Upsert, UpsertOutcome,
};

#[derive(Debug, Default)]
struct State {
    rows: Vec<EncodedEvent>,
    next_id: i64,
    status: Vec<StatusRecord>,
    users: HashMap<String, String>,
}

impl State {
    fn append_status(&mut self) {
        self.status.push(StatusRecord {
            timestamp: Utc::now().timestamp(),
            version: REPOSITORY_VERSION.to_string(),
        });
    }
}

/// Repository keeping everything in memory.
///
/// Moments go through the same codec as the SQLite store, so reads return
/// normalized values exactly like a real database would.
pub struct MemoryRepository {
    state: Mutex<Option<State>>,
    codec: TemporalCodec,
    hasher: PasswordHasher,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new(TemporalCodec::default())
    }
}

impl MemoryRepository {
    pub fn new(codec: TemporalCodec) -> Self {
        Self {
            state: Mutex::new(Some(State {
                next_id: 1,
                ..Default::default()
            })),
            codec,
            hasher: PasswordHasher::new(bcrypt::DEFAULT_COST),
        }
    }

    /// Builder: set the bcrypt cost used by [`EventRepository::add_credential`].
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.hasher = PasswordHasher::new(cost);
        self
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> StorageResult<T>) -> StorageResult<T> {
        let mut guard = self.state.lock().map_err(|_| StorageError::Poisoned)?;
        let state = guard.as_mut().ok_or(StorageError::Closed)?;
        f(state)
    }
}

impl EventRepository for MemoryRepository {
    fn insert_or_update(&self, event: &Event) -> StorageResult<Upsert> {
        let mut row = EncodedEvent::new(&self.codec, event)?;

        self.with_state(|state| {
            let existing = state
                .rows
                .iter()
                .position(|stored| stored.event.uuid == row.event.uuid);

            let outcome = match existing {
                Some(index) if state.rows[index].event.same_content(&row.event) => {
                    return Ok(Upsert {
                        event: state.rows[index].event.clone(),
                        outcome: UpsertOutcome::Unchanged,
                    });
                }
                Some(index) => {
                    row.event.id = state.rows[index].event.id;
                    state.rows[index] = row.clone();
                    UpsertOutcome::Updated
                }
                None => {
                    row.event.id = state.next_id;
                    state.next_id += 1;
                    state.rows.push(row.clone());
                    UpsertOutcome::Inserted
                }
            };

            state.append_status();
            Ok(Upsert {
                event: row.event,
                outcome,
            })
        })
    }

    fn delete(&self, event: &Event) -> StorageResult<bool> {
        self.with_state(|state| {
            let before = state.rows.len();
            state.rows.retain(|row| row.event.uuid != event.uuid);
            Ok(state.rows.len() != before)
        })
    }

    fn range_query(&self, start: i64, end: i64) -> StorageResult<Vec<Event>> {
        self.with_state(|state| {
            Ok(state
                .rows
                .iter()
                .filter(|row| row.ends_at >= start && row.starts_at <= end)
                .map(|row| row.event.clone())
                .collect())
        })
    }

    fn get_by_uuid(&self, uuid: &str) -> StorageResult<Option<Event>> {
        self.with_state(|state| {
            Ok(state
                .rows
                .iter()
                .find(|row| row.event.uuid == uuid)
                .map(|row| row.event.clone()))
        })
    }

    fn all_events(&self) -> StorageResult<Vec<Event>> {
        self.with_state(|state| Ok(state.rows.iter().map(|row| row.event.clone()).collect()))
    }

    fn get_status(&self) -> StorageResult<StatusRecord> {
        self.with_state(|state| state.status.last().cloned().ok_or(StorageError::NoStatus))
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
        self.with_state(|state| {
            state.users.insert(username.to_string(), hash);
            Ok(())
        })
    }

    fn authenticate(&self, username: &str, password: &str) -> StorageResult<bool> {
        let stored = self.with_state(|state| Ok(state.users.get(username).cloned()))?;
        Ok(self.hasher.verify(username, stored.as_deref(), password))
    }

    fn migrate(&self) -> StorageResult<()> {
        self.with_state(|state| {
            state.append_status();
            Ok(())
        })
    }

    fn close(&self) -> StorageResult<()> {
        let mut guard = self.state.lock().map_err(|_| StorageError::Poisoned)?;
        guard.take().map(|_| ()).ok_or(StorageError::Closed)
    }
}
