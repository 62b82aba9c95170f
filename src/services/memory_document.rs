//! Admin-authored behavioral instructions.
//!
//! The JSON file is the source of truth. Every change is mirrored into the config store under
//! [`MEMORY_BACKUP_KEY`]; the mirror is only read back by [`MemoryStore::recover_from_backup`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::db::Storage;
use crate::error::AppError;
use crate::models::now_timestamp;

pub const MEMORY_BACKUP_KEY: &str = "memory_backup";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDocument {
    #[serde(default)]
    pub admin_instructions: String,
    #[serde(default = "default_system_state")]
    pub system_state: String,
    #[serde(default)]
    pub behavioral_rules: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    /// Anything else an admin stored; kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_system_state() -> String {
    "Operational".to_string()
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self {
            admin_instructions: String::new(),
            system_state: default_system_state(),
            behavioral_rules: Vec::new(),
            last_updated: None,
            extra: Map::new(),
        }
    }
}

impl MemoryDocument {
    /// Applies `patch` field by field over this document.
    pub fn merged(&self, patch: Map<String, Value>) -> Result<Self, AppError> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| AppError::validation(format!("memory document: {}", e)))?;
        if let Value::Object(fields) = &mut value {
            fields.extend(patch);
        }
        serde_json::from_value(value)
            .map_err(|e| AppError::validation(format!("invalid memory update: {}", e)))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Reads the document at `path`. Missing or unreadable files give the default document.
pub fn load(path: &Path) -> MemoryDocument {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            return MemoryDocument::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(document) => document,
        Err(e) => {
            warn!("Ignoring unreadable {}: {}", path.display(), e);
            MemoryDocument::default()
        }
    }
}

/// Overwrites the document at `path`.
pub fn save(path: &Path, document: &MemoryDocument) -> io::Result<()> {
    let content = serde_json::to_string_pretty(document)?;
    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)
}

/// The loaded document plus the only entry points that change it.
pub struct MemoryStore {
    path: PathBuf,
    current: Mutex<MemoryDocument>,
    storage: Storage,
}

impl MemoryStore {
    pub fn open(path: impl Into<PathBuf>, storage: Storage) -> Self {
        let path = path.into();
        let document = load(&path);
        Self {
            path,
            current: Mutex::new(document),
            storage,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryDocument> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> MemoryDocument {
        self.lock().clone()
    }

    /// Mirrors the current document into the config store.
    pub fn sync(&self) {
        let current = self.lock();
        self.backup(&current);
    }

    /// Re-reads the file into memory.
    ///
    /// The read happens under the lock so a concurrent commit cannot be replaced by an older
    /// file.
    pub fn reload(&self) -> MemoryDocument {
        let mut current = self.lock();
        let document = load(&self.path);
        *current = document.clone();
        document
    }

    /// Merges `patch` into the document, stamps it, persists it and syncs the backup.
    ///
    /// Nothing changes in memory when the file write fails.
    pub fn update(&self, patch: Map<String, Value>) -> Result<MemoryDocument, AppError> {
        let mut current = self.lock();
        let mut next = current.merged(patch)?;
        next.last_updated = Some(now_timestamp());
        self.commit(&mut current, next)
    }

    pub fn set_instructions(&self, instructions: &str) -> Result<MemoryDocument, AppError> {
        if instructions.trim().is_empty() {
            return Err(AppError::validation("Instructions required"));
        }
        let mut current = self.lock();
        let mut next = current.clone();
        next.admin_instructions = instructions.to_string();
        next.last_updated = Some(now_timestamp());
        self.commit(&mut current, next)
    }

    /// Restores the file and the loaded document from the config store mirror.
    pub fn recover_from_backup(&self) -> Result<MemoryDocument, AppError> {
        let raw = self.storage.get_config(MEMORY_BACKUP_KEY, "");
        if raw.is_empty() {
            return Err(AppError::validation("No memory backup stored"));
        }
        let document: MemoryDocument = serde_json::from_str(&raw)
            .map_err(|e| AppError::validation(format!("memory backup is unreadable: {}", e)))?;

        let mut current = self.lock();
        self.persist(&document)?;
        *current = document.clone();
        info!("Memory restored from backup");
        Ok(document)
    }

    fn commit(
        &self,
        current: &mut MemoryDocument,
        next: MemoryDocument,
    ) -> Result<MemoryDocument, AppError> {
        self.persist(&next)?;
        *current = next.clone();
        // Synced under the lock so backups land in update order
        self.backup(&next);
        Ok(next)
    }

    fn backup(&self, document: &MemoryDocument) {
        self.storage.set_config(MEMORY_BACKUP_KEY, &document.to_json());
        info!("Memory synced to database");
    }

    fn persist(&self, document: &MemoryDocument) -> Result<(), AppError> {
        save(&self.path, document).map_err(|e| {
            error!("Failed to save {}: {}", self.path.display(), e);
            AppError::Persistence {
                what: "memory",
                reason: e.to_string(),
            }
        })
    }
}
