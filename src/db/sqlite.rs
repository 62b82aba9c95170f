//! Relational backend on SQLite.
//!
//! Each operation opens its own connection against the current target and drops it before
//! returning. The target can be moved at runtime; nothing is pooled.

use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info};

use super::schema::{LATE_COLUMNS, SCHEMA};
use super::Backend;
use crate::error::{StoreError, StoreResult};
use crate::models::{DiaryEntry, GameSubmission, MessageRecord, UserState};

pub struct SqliteBackend {
    target: RwLock<Option<PathBuf>>,
    busy_timeout: Duration,
}

/// Turns a configured database URL into a file path. Blank means "not configured".
pub fn parse_target(url: &str) -> Option<PathBuf> {
    let trimmed = url.trim();
    let path = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed);
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

impl SqliteBackend {
    pub fn new(target: Option<&str>, busy_timeout: Duration) -> Self {
        Self {
            target: RwLock::new(target.and_then(parse_target)),
            busy_timeout,
        }
    }

    pub fn target(&self) -> Option<PathBuf> {
        self.target
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn connect(&self) -> StoreResult<Connection> {
        let target = self
            .target()
            .ok_or_else(|| StoreError::Unavailable("no database configured".to_string()))?;
        let conn = Connection::open(&target).map_err(|e| {
            StoreError::Unavailable(format!("cannot open {}: {}", target.display(), e))
        })?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }
}

fn ensure_column(conn: &Connection, table: &str, column: &str, decl: &str) -> StoreResult<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(());
        }
    }
    info!("Database: Adding missing column {}.{}", table, column);
    conn.execute(
        &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl),
        [],
    )?;
    Ok(())
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserState> {
    Ok(UserState {
        id: row.get(0)?,
        memory: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        mood: row
            .get::<_, Option<String>>(2)?
            .unwrap_or_else(|| crate::models::DEFAULT_MOOD.to_string()),
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        id: Some(row.get(0)?),
        user_id: row.get(1)?,
        message: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        response: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        timestamp: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
    })
}

impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn retarget(&self, target: Option<&str>) {
        let parsed = target.and_then(parse_target);
        info!(
            "Database: Connection target set to {}",
            parsed
                .as_deref()
                .map(Path::display)
                .map(|d| d.to_string())
                .unwrap_or_else(|| "<none>".to_string())
        );
        *self
            .target
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = parsed;
    }

    fn ensure_schema(&self) -> StoreResult<()> {
        if let Some(parent) = self.target().as_deref().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        info!("Database: Initializing schema...");
        let conn = self.connect()?;
        conn.execute_batch(SCHEMA)?;
        for (table, column, decl) in LATE_COLUMNS {
            ensure_column(&conn, table, column, decl)?;
        }
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    fn get_user(&self, id: i64) -> StoreResult<Option<UserState>> {
        let conn = self.connect()?;
        let user = conn
            .query_row(
                "SELECT id, memory, mood FROM users WHERE id = ?1",
                [id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    fn upsert_user(&self, user: &UserState) -> StoreResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO users (id, memory, mood) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET memory = excluded.memory, mood = excluded.mood",
            (user.id, &user.memory, &user.mood),
        )?;
        Ok(())
    }

    fn list_users(&self) -> StoreResult<Vec<UserState>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id, memory, mood FROM users ORDER BY id")?;
        let rows = stmt.query_map([], user_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn insert_message(&self, message: &MessageRecord) -> StoreResult<i64> {
        debug!("Database: Saving message for user {}", message.user_id);
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO messages (user_id, message, response, timestamp) VALUES (?1, ?2, ?3, ?4)",
            (
                message.user_id,
                &message.message,
                &message.response,
                &message.timestamp,
            ),
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn recent_messages(
        &self,
        user_id: i64,
        limit: Option<usize>,
    ) -> StoreResult<Vec<MessageRecord>> {
        let conn = self.connect()?;
        // LIMIT -1 is "no limit" in SQLite
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(
            "SELECT id, user_id, message, response, timestamp FROM messages
             WHERE user_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map((user_id, limit), message_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        results.reverse();
        Ok(results)
    }

    fn delete_messages(&self, user_id: i64, before: Option<&str>) -> StoreResult<usize> {
        let conn = self.connect()?;
        let count = if let Some(cutoff) = before {
            conn.execute(
                "DELETE FROM messages WHERE user_id = ?1 AND timestamp < ?2",
                (user_id, cutoff),
            )?
        } else {
            conn.execute("DELETE FROM messages WHERE user_id = ?1", [user_id])?
        };
        Ok(count)
    }

    fn get_config(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.connect()?;
        let value = conn
            .query_row("SELECT value FROM config WHERE key = ?1", [key], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?;
        Ok(value.flatten())
    }

    fn set_config(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            (key, value),
        )?;
        Ok(())
    }

    fn get_diary(&self, user_id: i64) -> StoreResult<Option<DiaryEntry>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT notes, last_ai_line FROM diary WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                    ))
                },
            )
            .optional()?;

        let Some((notes, last_ai_line)) = row else {
            return Ok(None);
        };
        let notes = match notes {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };
        Ok(Some(DiaryEntry {
            user_id,
            notes,
            last_ai_line: last_ai_line.unwrap_or_default(),
        }))
    }

    fn upsert_diary(&self, diary: &DiaryEntry) -> StoreResult<()> {
        let notes = serde_json::to_string(&diary.notes)?;
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO diary (user_id, notes, last_ai_line) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET notes = excluded.notes,
                 last_ai_line = excluded.last_ai_line",
            (diary.user_id, notes, &diary.last_ai_line),
        )?;
        Ok(())
    }

    fn delete_diary(&self, user_id: i64) -> StoreResult<usize> {
        let conn = self.connect()?;
        Ok(conn.execute("DELETE FROM diary WHERE user_id = ?1", [user_id])?)
    }

    fn insert_game_submission(&self, submission: &GameSubmission) -> StoreResult<i64> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO game_submissions (game_type, content, file_path, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            (
                &submission.game_type,
                &submission.content,
                &submission.file_path,
                &submission.timestamp,
            ),
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn recent_game_submissions(&self, limit: usize) -> StoreResult<Vec<GameSubmission>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, game_type, content, file_path, timestamp FROM game_submissions
             ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(GameSubmission {
                id: Some(row.get(0)?),
                game_type: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                content: row.get(2)?,
                file_path: row.get(3)?,
                timestamp: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn clear_user(&self, user_id: i64) -> StoreResult<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut count = tx.execute("DELETE FROM messages WHERE user_id = ?1", [user_id])?;
        count += tx.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
        count += tx.execute("DELETE FROM diary WHERE user_id = ?1", [user_id])?;
        tx.commit()?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format_timestamp;
    use chrono::{Duration as ChronoDuration, Utc};
    use tempfile::TempDir;

    fn test_backend(dir: &TempDir) -> SqliteBackend {
        let path = dir.path().join("data").join("primary.db");
        let backend = SqliteBackend::new(path.to_str(), Duration::from_secs(1));
        backend.ensure_schema().unwrap();
        backend
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target(""), None);
        assert_eq!(parse_target("   "), None);
        assert_eq!(parse_target("sqlite://data/a.db"), Some(PathBuf::from("data/a.db")));
        assert_eq!(parse_target("sqlite:b.db"), Some(PathBuf::from("b.db")));
        assert_eq!(parse_target("/tmp/c.db"), Some(PathBuf::from("/tmp/c.db")));
    }

    #[test]
    fn test_unconfigured_backend_is_unavailable() {
        let backend = SqliteBackend::new(None, Duration::from_secs(1));
        assert!(matches!(backend.get_user(1), Err(StoreError::Unavailable(_))));
        assert!(matches!(backend.ensure_schema(), Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_schema_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let backend = test_backend(&dir);
        backend.ensure_schema().unwrap();
        backend.set_config("k", "v").unwrap();
        backend.ensure_schema().unwrap();
        assert_eq!(backend.get_config("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_missing_columns_are_added() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, memory TEXT);")
                .unwrap();
        }
        let backend = SqliteBackend::new(path.to_str(), Duration::from_secs(1));
        backend.ensure_schema().unwrap();
        backend
            .upsert_user(&UserState {
                id: 5,
                memory: "m".to_string(),
                mood: "sleepy".to_string(),
            })
            .unwrap();
        assert_eq!(backend.get_user(5).unwrap().unwrap().mood, "sleepy");
    }

    #[test]
    fn test_user_upsert() {
        let dir = TempDir::new().unwrap();
        let backend = test_backend(&dir);

        assert_eq!(backend.get_user(7).unwrap(), None);
        let mut user = UserState::new(7);
        backend.upsert_user(&user).unwrap();
        user.memory = "U: hi\nB: hello".to_string();
        backend.upsert_user(&user).unwrap();

        assert_eq!(backend.get_user(7).unwrap(), Some(user));
        assert_eq!(backend.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_recent_messages_order_and_limit() {
        let dir = TempDir::new().unwrap();
        let backend = test_backend(&dir);
        let base = Utc::now() - ChronoDuration::hours(1);

        for i in 0..5 {
            let mut msg = MessageRecord::new(1, &format!("m{}", i), &format!("r{}", i));
            msg.timestamp = format_timestamp(base + ChronoDuration::seconds(i));
            backend.insert_message(&msg).unwrap();
        }
        backend.insert_message(&MessageRecord::new(2, "other", "user")).unwrap();

        let last_two: Vec<_> = backend
            .recent_messages(1, Some(2))
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(last_two, vec!["m3", "m4"]);

        let all = backend.recent_messages(1, None).unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].message, "m0");
    }

    #[test]
    fn test_delete_messages_with_cutoff() {
        let dir = TempDir::new().unwrap();
        let backend = test_backend(&dir);
        let now = Utc::now();

        for days in [1, 10, 40] {
            let mut msg = MessageRecord::new(1, &format!("{}d", days), "r");
            msg.timestamp = format_timestamp(now - ChronoDuration::days(days));
            backend.insert_message(&msg).unwrap();
        }

        let cutoff = format_timestamp(now - ChronoDuration::days(7));
        assert_eq!(backend.delete_messages(1, Some(&cutoff)).unwrap(), 2);
        let remaining = backend.recent_messages(1, None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message, "1d");

        assert_eq!(backend.delete_messages(1, None).unwrap(), 1);
    }

    #[test]
    fn test_diary_roundtrip_and_delete() {
        let dir = TempDir::new().unwrap();
        let backend = test_backend(&dir);

        let diary = DiaryEntry {
            user_id: 3,
            notes: vec![serde_json::json!({"text": "first"}), serde_json::json!("second")],
            last_ai_line: "see you".to_string(),
        };
        backend.upsert_diary(&diary).unwrap();
        assert_eq!(backend.get_diary(3).unwrap(), Some(diary));
        assert_eq!(backend.delete_diary(3).unwrap(), 1);
        assert_eq!(backend.get_diary(3).unwrap(), None);
    }

    #[test]
    fn test_clear_user_removes_everything() {
        let dir = TempDir::new().unwrap();
        let backend = test_backend(&dir);

        backend.upsert_user(&UserState::new(9)).unwrap();
        backend.insert_message(&MessageRecord::new(9, "a", "b")).unwrap();
        backend.upsert_diary(&DiaryEntry::empty(9)).unwrap();

        assert_eq!(backend.clear_user(9).unwrap(), 3);
        assert_eq!(backend.get_user(9).unwrap(), None);
        assert!(backend.recent_messages(9, None).unwrap().is_empty());
    }

    #[test]
    fn test_game_submissions_newest_first() {
        let dir = TempDir::new().unwrap();
        let backend = test_backend(&dir);

        let mut first = GameSubmission::text("truth_dare", "truth");
        first.timestamp = format_timestamp(Utc::now() - ChronoDuration::minutes(5));
        backend.insert_game_submission(&first).unwrap();
        backend
            .insert_game_submission(&GameSubmission::file("truth_dare", "static/games/x.png"))
            .unwrap();

        let list = backend.recent_game_submissions(100).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].file_path.as_deref(), Some("static/games/x.png"));
        assert_eq!(backend.recent_game_submissions(1).unwrap().len(), 1);
    }
}
