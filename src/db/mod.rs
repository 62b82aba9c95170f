//! Dual-backend persistence.
//!
//! [`Storage`] writes every mutation to the relational backend (best-effort) and then to the
//! embedded store (always). Reads go to the relational backend first and fall back to the
//! embedded store when it is unreachable, errors, or has nothing. Results are never merged.

pub mod document;
pub mod schema;
pub mod sqlite;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, StoreError, StoreResult};
use crate::models::{format_timestamp, DiaryEntry, GameSubmission, MessageRecord, UserState};

pub use document::DocumentBackend;
pub use sqlite::SqliteBackend;

pub const GAME_SUBMISSION_LIMIT: usize = 100;

/// One storage backend. Both implementations hold the same five collections.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Moves the backend to a new location. Backends with a fixed location ignore this.
    fn retarget(&self, _target: Option<&str>) {}

    /// Creates whatever tables or columns are missing.
    fn ensure_schema(&self) -> StoreResult<()> {
        Ok(())
    }

    fn get_user(&self, id: i64) -> StoreResult<Option<UserState>>;
    fn upsert_user(&self, user: &UserState) -> StoreResult<()>;
    fn list_users(&self) -> StoreResult<Vec<UserState>>;

    fn insert_message(&self, message: &MessageRecord) -> StoreResult<i64>;
    /// The last `limit` messages for a user (all when `None`), oldest first.
    fn recent_messages(
        &self,
        user_id: i64,
        limit: Option<usize>,
    ) -> StoreResult<Vec<MessageRecord>>;
    /// Deletes a user's messages, only those older than `before` when given.
    fn delete_messages(&self, user_id: i64, before: Option<&str>) -> StoreResult<usize>;

    fn get_config(&self, key: &str) -> StoreResult<Option<String>>;
    fn set_config(&self, key: &str, value: &str) -> StoreResult<()>;

    fn get_diary(&self, user_id: i64) -> StoreResult<Option<DiaryEntry>>;
    fn upsert_diary(&self, diary: &DiaryEntry) -> StoreResult<()>;
    fn delete_diary(&self, user_id: i64) -> StoreResult<usize>;

    fn insert_game_submission(&self, submission: &GameSubmission) -> StoreResult<i64>;
    /// Newest first.
    fn recent_game_submissions(&self, limit: usize) -> StoreResult<Vec<GameSubmission>>;

    /// Removes a user's messages, state row and diary.
    fn clear_user(&self, user_id: i64) -> StoreResult<usize>;
}

/// Whether a read result counts as a hit.
trait Found {
    fn found(&self) -> bool;
}

impl<T> Found for Option<T> {
    fn found(&self) -> bool {
        self.is_some()
    }
}

impl<T> Found for Vec<T> {
    fn found(&self) -> bool {
        !self.is_empty()
    }
}

#[derive(Clone)]
pub struct Storage {
    relational: Arc<dyn Backend>,
    embedded: Arc<dyn Backend>,
}

impl Storage {
    pub fn new(relational: Arc<dyn Backend>, embedded: Arc<dyn Backend>) -> Self {
        Self {
            relational,
            embedded,
        }
    }

    /// Runs storage work on the blocking pool.
    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&Storage) -> T + Send + 'static,
        T: Send + 'static,
    {
        let storage = self.clone();
        Ok(tokio::task::spawn_blocking(move || f(&storage)).await?)
    }

    fn log_relational_failure(&self, what: &str, e: &StoreError) {
        match e {
            StoreError::Unavailable(reason) => {
                debug!("Storage: {} skipped on {}: {}", what, self.relational.name(), reason)
            }
            _ => warn!("Storage: {} failed on {}: {}", what, self.relational.name(), e),
        }
    }

    fn read<T, F>(&self, what: &str, op: F) -> T
    where
        T: Found + Default,
        F: Fn(&dyn Backend) -> StoreResult<T>,
    {
        match op(self.relational.as_ref()) {
            Ok(value) if value.found() => return value,
            Ok(_) => debug!("Storage: {} empty on {}", what, self.relational.name()),
            Err(e) => self.log_relational_failure(what, &e),
        }

        match op(self.embedded.as_ref()) {
            Ok(value) => {
                if value.found() {
                    debug!("Storage: {} served from {}", what, self.embedded.name());
                }
                value
            }
            Err(e) => {
                error!("Storage: {} failed on {}: {}", what, self.embedded.name(), e);
                T::default()
            }
        }
    }

    /// Returns the relational result, if the relational write succeeded.
    fn write<T, F>(&self, what: &str, op: F) -> Option<T>
    where
        F: Fn(&dyn Backend) -> StoreResult<T>,
    {
        let primary = match op(self.relational.as_ref()) {
            Ok(value) => Some(value),
            Err(e) => {
                self.log_relational_failure(what, &e);
                None
            }
        };

        if let Err(e) = op(self.embedded.as_ref()) {
            error!("Storage: {} backup to {} failed: {}", what, self.embedded.name(), e);
        }
        primary
    }

    // --- Schema ---

    /// Points the relational backend somewhere else. Call [`Storage::bootstrap`] afterwards.
    pub fn retarget(&self, target: Option<&str>) {
        self.relational.retarget(target);
    }

    /// Ensures the relational schema and seeds it with the memory backup.
    ///
    /// Returns whether the relational backend is usable.
    pub fn bootstrap(&self, memory_backup_key: &str, memory_backup: &str) -> bool {
        if let Err(e) = self.relational.ensure_schema() {
            match e {
                StoreError::Unavailable(_) => {
                    warn!("No relational connection available ({}). Using embedded store only.", e)
                }
                _ => error!("Schema initialization failed: {}", e),
            }
            return false;
        }

        match self.relational.set_config(memory_backup_key, memory_backup) {
            Ok(()) => {
                info!("Memory synced to database on initialization");
                true
            }
            Err(e) => {
                error!("Failed to sync memory to database: {}", e);
                false
            }
        }
    }

    // --- Config ---

    pub fn get_config(&self, key: &str, default: &str) -> String {
        self.read("config read", |b| b.get_config(key))
            .unwrap_or_else(|| default.to_string())
    }

    pub fn set_config(&self, key: &str, value: &str) {
        self.write("config write", |b| b.set_config(key, value));
    }

    // --- Users ---

    /// The stored state, or a fresh default for an unknown user.
    pub fn get_user(&self, id: i64) -> UserState {
        self.read("user read", |b| b.get_user(id))
            .unwrap_or_else(|| UserState::new(id))
    }

    pub fn save_user(&self, user: &UserState) {
        self.write("user write", |b| b.upsert_user(user));
    }

    pub fn list_users(&self) -> Vec<UserState> {
        self.read("user list", |b| b.list_users())
    }

    // --- Messages ---

    pub fn save_message(&self, message: &MessageRecord) {
        if self.write("message write", |b| b.insert_message(message)).is_some() {
            info!("Message saved for user {}", message.user_id);
        }
    }

    /// Chronological history for a user, the last `limit` messages when given.
    pub fn get_messages(&self, user_id: i64, limit: Option<usize>) -> Vec<MessageRecord> {
        self.read("message read", |b| b.recent_messages(user_id, limit))
    }

    /// Deletes a user's messages older than `before` (all when `None`) from both backends.
    ///
    /// The count comes from the relational backend only; zero when it is unreachable.
    pub fn purge_messages(&self, user_id: i64, before: Option<DateTime<Utc>>) -> usize {
        let cutoff = before.map(format_timestamp);
        self.write("message purge", |b| b.delete_messages(user_id, cutoff.as_deref()))
            .unwrap_or(0)
    }

    // --- Diary ---

    pub fn get_diary(&self, user_id: i64) -> DiaryEntry {
        self.read("diary read", |b| b.get_diary(user_id))
            .unwrap_or_else(|| {
                info!("No diary found for user {}, returning default", user_id);
                DiaryEntry::empty(user_id)
            })
    }

    pub fn save_diary(&self, diary: &DiaryEntry) {
        self.write("diary write", |b| b.upsert_diary(diary));
    }

    pub fn delete_diary(&self, user_id: i64) {
        self.write("diary delete", |b| b.delete_diary(user_id));
    }

    // --- Game submissions ---

    pub fn save_game_submission(&self, submission: &GameSubmission) {
        self.write("game submission write", |b| b.insert_game_submission(submission));
    }

    pub fn recent_game_submissions(&self, limit: usize) -> Vec<GameSubmission> {
        self.read("game submission list", |b| b.recent_game_submissions(limit))
    }

    // --- Repair ---

    pub fn clear_user(&self, user_id: i64) -> usize {
        self.write("user clear", |b| b.clear_user(user_id))
            .unwrap_or(0)
    }
}
