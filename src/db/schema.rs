//! Relational schema. Every statement is idempotent.

pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        memory TEXT,
        mood TEXT
    );

    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER,
        message TEXT,
        response TEXT,
        timestamp TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );
    CREATE INDEX IF NOT EXISTS idx_messages_user_date ON messages (user_id, timestamp);

    CREATE TABLE IF NOT EXISTS config (
        key TEXT PRIMARY KEY,
        value TEXT
    );

    CREATE TABLE IF NOT EXISTS diary (
        user_id INTEGER PRIMARY KEY,
        notes TEXT,
        last_ai_line TEXT
    );

    CREATE TABLE IF NOT EXISTS game_submissions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        game_type TEXT,
        content TEXT,
        file_path TEXT,
        timestamp TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );
";

/// Columns added after the first release; older databases get them via `ALTER TABLE`.
pub const LATE_COLUMNS: &[(&str, &str, &str)] = &[
    ("users", "mood", "TEXT"),
    ("diary", "last_ai_line", "TEXT"),
    ("game_submissions", "file_path", "TEXT"),
];
