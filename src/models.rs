//! Records shared by both storage backends.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_MOOD: &str = "loving";
pub const MEMORY_CHAR_LIMIT: usize = 5000;
pub const DEFAULT_DIARY_LINE: &str = "Thinking of you... ✨";

/// Formats a timestamp the way both backends store it.
///
/// Fixed width with microseconds, so string order is chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Keeps the last `max_chars` characters of `text`.
pub fn cap_suffix(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

/// Who is talking to the companion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Companion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    pub id: i64,
    #[serde(default)]
    pub memory: String,
    #[serde(default = "default_mood")]
    pub mood: String,
}

fn default_mood() -> String {
    DEFAULT_MOOD.to_string()
}

impl UserState {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            memory: String::new(),
            mood: default_mood(),
        }
    }

    /// Appends one chat exchange to the rolling memory, keeping the newest text.
    pub fn remember_exchange(&mut self, message: &str, reply: &str) {
        let appended = format!("{}\nU: {}\nB: {}", self.memory, message, reply);
        self.memory = cap_suffix(&appended, MEMORY_CHAR_LIMIT);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub user_id: i64,
    pub message: String,
    pub response: String,
    pub timestamp: String,
}

impl MessageRecord {
    pub fn new(user_id: i64, message: &str, response: &str) -> Self {
        Self {
            id: None,
            user_id,
            message: message.to_string(),
            response: response.to_string(),
            timestamp: now_timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub user_id: i64,
    #[serde(default)]
    pub notes: Vec<Value>,
    #[serde(default)]
    pub last_ai_line: String,
}

impl DiaryEntry {
    /// What a reader sees before anything has been written.
    pub fn empty(user_id: i64) -> Self {
        Self {
            user_id,
            notes: Vec::new(),
            last_ai_line: DEFAULT_DIARY_LINE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSubmission {
    #[serde(default)]
    pub id: Option<i64>,
    pub game_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub timestamp: String,
}

impl GameSubmission {
    pub fn text(game_type: &str, content: &str) -> Self {
        Self {
            id: None,
            game_type: game_type.to_string(),
            content: Some(content.to_string()),
            file_path: None,
            timestamp: now_timestamp(),
        }
    }

    pub fn file(game_type: &str, file_path: &str) -> Self {
        Self {
            id: None,
            game_type: game_type.to_string(),
            content: None,
            file_path: Some(file_path.to_string()),
            timestamp: now_timestamp(),
        }
    }
}
