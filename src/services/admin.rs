use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

use crate::db::Storage;
use crate::error::AppError;
use crate::models::{UserState, DEFAULT_MOOD};
use crate::services::memory_document::{MemoryDocument, MemoryStore, MEMORY_BACKUP_KEY};

pub const WEB_PASSWORD_KEY: &str = "web_password";
pub const OPENAI_API_KEY_KEY: &str = "openai_api_key";
pub const DATABASE_URL_KEY: &str = "database_url";

/// Settings an admin may change at runtime. Blank values are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsUpdate {
    pub openai_api_key: Option<String>,
    pub database_url: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Operations behind the admin console.
#[derive(Clone)]
pub struct AdminService {
    storage: Storage,
    memory: Arc<MemoryStore>,
    owner_id: i64,
    default_web_password: String,
    admin_password: String,
}

impl AdminService {
    pub fn new(
        storage: Storage,
        memory: Arc<MemoryStore>,
        owner_id: i64,
        default_web_password: impl Into<String>,
        admin_password: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            memory,
            owner_id,
            default_web_password: default_web_password.into(),
            admin_password: admin_password.into(),
        }
    }

    // --- Settings ---

    /// Stores the provided settings. A new database URL retargets the relational backend,
    /// recreates its schema and reseeds the memory backup.
    ///
    /// Returns whether the relational backend is usable afterwards, when it was retargeted.
    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<Option<bool>, AppError> {
        if let Some(key) = non_blank(&update.openai_api_key) {
            self.set_config(OPENAI_API_KEY_KEY, key).await?;
        }
        match non_blank(&update.database_url) {
            Some(url) => self.set_config(DATABASE_URL_KEY, url).await,
            None => Ok(None),
        }
    }

    /// Generic config write; `database_url` also moves the relational backend.
    pub async fn set_config(&self, key: &str, value: &str) -> Result<Option<bool>, AppError> {
        let key = key.to_string();
        let value = value.to_string();
        let memory = self.memory.clone();
        self.storage
            .run_blocking(move |s| {
                s.set_config(&key, &value);
                if key != DATABASE_URL_KEY {
                    return None;
                }
                info!("Database URL updated. Re-initializing...");
                s.retarget(Some(value.as_str()));
                Some(s.bootstrap(MEMORY_BACKUP_KEY, &memory.snapshot().to_json()))
            })
            .await
    }

    pub async fn get_config(&self, key: &str, default: &str) -> Result<String, AppError> {
        let key = key.to_string();
        let default = default.to_string();
        self.storage
            .run_blocking(move |s| s.get_config(&key, &default))
            .await
    }

    // --- Passwords ---

    pub async fn update_password(&self, new_password: &str) -> Result<(), AppError> {
        if new_password.is_empty() {
            return Err(AppError::validation("New password required"));
        }
        self.set_config(WEB_PASSWORD_KEY, new_password).await?;
        Ok(())
    }

    /// The stored web password wins over the configured default.
    pub async fn check_web_password(&self, candidate: &str) -> Result<bool, AppError> {
        let expected = self
            .get_config(WEB_PASSWORD_KEY, &self.default_web_password)
            .await?;
        Ok(candidate == expected)
    }

    pub fn check_admin_password(&self, candidate: &str) -> bool {
        candidate == self.admin_password
    }

    // --- Users ---

    pub async fn update_user(
        &self,
        user_id: Option<i64>,
        memory: Option<&str>,
        mood: Option<&str>,
    ) -> Result<UserState, AppError> {
        let user = UserState {
            id: user_id.unwrap_or(self.owner_id),
            memory: memory.unwrap_or_default().to_string(),
            mood: mood.unwrap_or(DEFAULT_MOOD).to_string(),
        };
        let saved = user.clone();
        self.storage.run_blocking(move |s| s.save_user(&saved)).await?;
        info!("User {} updated by admin", user.id);
        Ok(user)
    }

    pub async fn list_users(&self) -> Result<Vec<UserState>, AppError> {
        self.storage.run_blocking(|s| s.list_users()).await
    }

    // --- Memory document ---

    /// Re-reads the memory file, picking up edits made outside the app.
    pub async fn memory(&self) -> Result<MemoryDocument, AppError> {
        let memory = self.memory.clone();
        Ok(tokio::task::spawn_blocking(move || memory.reload()).await?)
    }

    pub async fn update_memory(
        &self,
        patch: Map<String, Value>,
    ) -> Result<MemoryDocument, AppError> {
        let memory = self.memory.clone();
        tokio::task::spawn_blocking(move || memory.update(patch)).await?
    }

    pub async fn set_instructions(&self, instructions: &str) -> Result<MemoryDocument, AppError> {
        let memory = self.memory.clone();
        let instructions = instructions.to_string();
        tokio::task::spawn_blocking(move || memory.set_instructions(&instructions)).await?
    }

    pub async fn recover_memory(&self) -> Result<MemoryDocument, AppError> {
        let memory = self.memory.clone();
        tokio::task::spawn_blocking(move || memory.recover_from_backup()).await?
    }
}
