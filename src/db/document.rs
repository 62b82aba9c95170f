//! Embedded document store backed by a single JSON file.
//!
//! All collections live in memory behind one mutex and the whole file is rewritten after
//! every mutation (temp file, then rename). One process owns the file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

use super::Backend;
use crate::error::StoreResult;
use crate::models::{DiaryEntry, GameSubmission, MessageRecord, UserState};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collections {
    #[serde(default)]
    users: BTreeMap<i64, UserState>,
    #[serde(default)]
    messages: Vec<MessageRecord>,
    #[serde(default)]
    config: BTreeMap<String, String>,
    #[serde(default)]
    diary: BTreeMap<i64, DiaryEntry>,
    #[serde(default)]
    game_submissions: Vec<GameSubmission>,
}

fn next_id(ids: impl Iterator<Item = Option<i64>>) -> i64 {
    ids.flatten().max().unwrap_or(0) + 1
}

pub struct DocumentBackend {
    path: PathBuf,
    state: Mutex<Collections>,
}

impl DocumentBackend {
    /// Opens the store at `path`. A missing file starts empty; an unreadable one is moved
    /// aside to `<path>.corrupt` and the store starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => Collections::default(),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => state,
                Err(e) => {
                    error!("Embedded store {} is corrupt: {}", path.display(), e);
                    set_aside(&path);
                    Collections::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Collections::default(),
            Err(e) => {
                error!("Embedded store {} unreadable: {}", path.display(), e);
                Collections::default()
            }
        };

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Applies `f` and flushes the file while still holding the lock.
    fn mutate<T>(&self, f: impl FnOnce(&mut Collections) -> T) -> StoreResult<T> {
        let mut state = self.lock();
        let out = f(&mut state);
        self.flush(&state)?;
        Ok(out)
    }

    fn flush(&self, state: &Collections) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, serde_json::to_vec(state)?)?;
        std::fs::rename(&temp_path, &self.path)?;
        debug!("Embedded store flushed to {}", self.path.display());
        Ok(())
    }
}

fn set_aside(path: &Path) {
    let mut aside = path.as_os_str().to_owned();
    aside.push(".corrupt");
    if let Err(e) = std::fs::rename(path, &aside) {
        warn!("Could not move corrupt store aside: {}", e);
    }
}

impl Backend for DocumentBackend {
    fn name(&self) -> &'static str {
        "embedded"
    }

    fn get_user(&self, id: i64) -> StoreResult<Option<UserState>> {
        Ok(self.lock().users.get(&id).cloned())
    }

    fn upsert_user(&self, user: &UserState) -> StoreResult<()> {
        self.mutate(|c| {
            c.users.insert(user.id, user.clone());
        })
    }

    fn list_users(&self) -> StoreResult<Vec<UserState>> {
        Ok(self.lock().users.values().cloned().collect())
    }

    fn insert_message(&self, message: &MessageRecord) -> StoreResult<i64> {
        self.mutate(|c| {
            let id = next_id(c.messages.iter().map(|m| m.id));
            let mut record = message.clone();
            record.id = Some(id);
            c.messages.push(record);
            id
        })
    }

    fn recent_messages(
        &self,
        user_id: i64,
        limit: Option<usize>,
    ) -> StoreResult<Vec<MessageRecord>> {
        let mut messages: Vec<MessageRecord> = self
            .lock()
            .messages
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for identical timestamps
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        if let Some(limit) = limit {
            let skip = messages.len().saturating_sub(limit);
            messages.drain(..skip);
        }
        Ok(messages)
    }

    fn delete_messages(&self, user_id: i64, before: Option<&str>) -> StoreResult<usize> {
        self.mutate(|c| {
            let doomed: Vec<i64> = c
                .messages
                .iter()
                .filter(|m| m.user_id == user_id)
                .filter(|m| before.map_or(true, |cutoff| m.timestamp.as_str() < cutoff))
                .filter_map(|m| m.id)
                .collect();
            c.messages
                .retain(|m| !(m.user_id == user_id && m.id.is_some_and(|id| doomed.contains(&id))));
            doomed.len()
        })
    }

    fn get_config(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock().config.get(key).cloned())
    }

    fn set_config(&self, key: &str, value: &str) -> StoreResult<()> {
        self.mutate(|c| {
            c.config.insert(key.to_string(), value.to_string());
        })
    }

    fn get_diary(&self, user_id: i64) -> StoreResult<Option<DiaryEntry>> {
        Ok(self.lock().diary.get(&user_id).cloned())
    }

    fn upsert_diary(&self, diary: &DiaryEntry) -> StoreResult<()> {
        self.mutate(|c| {
            c.diary.insert(diary.user_id, diary.clone());
        })
    }

    fn delete_diary(&self, user_id: i64) -> StoreResult<usize> {
        self.mutate(|c| usize::from(c.diary.remove(&user_id).is_some()))
    }

    fn insert_game_submission(&self, submission: &GameSubmission) -> StoreResult<i64> {
        self.mutate(|c| {
            let id = next_id(c.game_submissions.iter().map(|s| s.id));
            let mut record = submission.clone();
            record.id = Some(id);
            c.game_submissions.push(record);
            id
        })
    }

    fn recent_game_submissions(&self, limit: usize) -> StoreResult<Vec<GameSubmission>> {
        let mut submissions = self.lock().game_submissions.clone();
        submissions.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(submissions.into_iter().rev().take(limit).collect())
    }

    fn clear_user(&self, user_id: i64) -> StoreResult<usize> {
        self.mutate(|c| {
            let before = c.messages.len();
            c.messages.retain(|m| m.user_id != user_id);
            let mut count = before - c.messages.len();
            count += usize::from(c.users.remove(&user_id).is_some());
            count += usize::from(c.diary.remove(&user_id).is_some());
            count
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format_timestamp;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = DocumentBackend::open(dir.path().join("db.json"));
        assert_eq!(store.get_user(1).unwrap(), None);
        assert!(store.list_users().unwrap().is_empty());
    }

    #[test]
    fn test_writes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        {
            let store = DocumentBackend::open(&path);
            store.upsert_user(&UserState::new(1)).unwrap();
            store.set_config("web_password", "secret").unwrap();
            store.insert_message(&MessageRecord::new(1, "hi", "hello")).unwrap();
            store.upsert_diary(&DiaryEntry::empty(1)).unwrap();
        }

        let store = DocumentBackend::open(&path);
        assert_eq!(store.get_user(1).unwrap(), Some(UserState::new(1)));
        assert_eq!(store.get_config("web_password").unwrap().as_deref(), Some("secret"));
        assert_eq!(store.recent_messages(1, None).unwrap()[0].id, Some(1));
        assert!(store.get_diary(1).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_file_is_set_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = DocumentBackend::open(&path);
        assert!(store.list_users().unwrap().is_empty());
        assert!(dir.path().join("db.json.corrupt").exists());

        store.upsert_user(&UserState::new(2)).unwrap();
        assert!(DocumentBackend::open(&path).get_user(2).unwrap().is_some());
    }

    #[test]
    fn test_recent_messages_takes_last_in_order() {
        let dir = TempDir::new().unwrap();
        let store = DocumentBackend::open(dir.path().join("db.json"));
        let base = Utc::now();

        // Inserted out of order on purpose
        for i in [2, 0, 4, 1, 3] {
            let mut msg = MessageRecord::new(1, &format!("m{}", i), "r");
            msg.timestamp = format_timestamp(base + Duration::seconds(i));
            store.insert_message(&msg).unwrap();
        }

        let last: Vec<_> = store
            .recent_messages(1, Some(3))
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(last, vec!["m2", "m3", "m4"]);
        assert_eq!(store.recent_messages(1, Some(50)).unwrap().len(), 5);
    }

    #[test]
    fn test_cutoff_delete_is_per_record() {
        let dir = TempDir::new().unwrap();
        let store = DocumentBackend::open(dir.path().join("db.json"));
        let now = Utc::now();

        for days in [1, 10, 40] {
            let mut msg = MessageRecord::new(1, &format!("{}d", days), "r");
            msg.timestamp = format_timestamp(now - Duration::days(days));
            store.insert_message(&msg).unwrap();
        }
        let mut other = MessageRecord::new(2, "other user", "r");
        other.timestamp = format_timestamp(now - Duration::days(40));
        store.insert_message(&other).unwrap();

        let cutoff = format_timestamp(now - Duration::days(7));
        assert_eq!(store.delete_messages(1, Some(&cutoff)).unwrap(), 2);

        let kept: Vec<_> = store
            .recent_messages(1, None)
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(kept, vec!["1d"]);
        assert_eq!(store.recent_messages(2, None).unwrap().len(), 1);
    }

    #[test]
    fn test_game_submissions_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = DocumentBackend::open(dir.path().join("db.json"));
        for i in 0..5 {
            let mut s = GameSubmission::text("riddle", &format!("answer {}", i));
            s.timestamp = format_timestamp(Utc::now() + Duration::seconds(i));
            store.insert_game_submission(&s).unwrap();
        }
        let recent = store.recent_game_submissions(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content.as_deref(), Some("answer 4"));
        assert_eq!(recent[1].content.as_deref(), Some("answer 3"));
    }
}
