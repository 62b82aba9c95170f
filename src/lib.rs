pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod services;
pub mod system_prompt;

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use db::{DocumentBackend, SqliteBackend, Storage};
use llm::ProviderCascade;
use services::admin::{DATABASE_URL_KEY, OPENAI_API_KEY_KEY};
use services::{
    AdminService, ChatService, DiaryService, GameService, MemoryStore, RepairService,
    MEMORY_BACKUP_KEY,
};

/// Shared state handed to every front end.
pub struct App {
    pub config: config::Config,
    pub storage: Storage,
    pub memory: Arc<MemoryStore>,
    pub cascade: Arc<ProviderCascade>,
}

impl App {
    /// Opens both stores, seeds the relational schema and builds the provider cascade.
    ///
    /// A relational backend that cannot be reached is not an error; the app runs on the
    /// embedded store alone.
    pub fn new(mut config: config::Config) -> anyhow::Result<Self> {
        let embedded = Arc::new(DocumentBackend::open(&config.embedded_db_path));

        // Settings saved from the admin console apply when the environment leaves them unset
        if config.database_url.is_none() {
            config.database_url = stored_setting(&embedded, DATABASE_URL_KEY);
        }
        if let Some(key) = stored_setting(&embedded, OPENAI_API_KEY_KEY) {
            for provider in &mut config.providers {
                if provider.name == "openai" && !provider.has_credentials() {
                    info!("Using OpenAI key from saved settings");
                    provider.api_key = Some(key.clone());
                }
            }
        }

        let relational = Arc::new(SqliteBackend::new(
            config.database_url.as_deref(),
            Duration::from_secs(config.db_timeout_secs),
        ));
        let storage = Storage::new(relational, embedded);

        let memory = Arc::new(MemoryStore::open(&config.memory_path, storage.clone()));
        if storage.bootstrap(MEMORY_BACKUP_KEY, &memory.snapshot().to_json()) {
            info!("Relational database initialized");
        }

        let timeout = Duration::from_secs(config.provider_timeout_secs);
        let providers = llm::build_providers(&config.providers, timeout);
        let cascade = Arc::new(ProviderCascade::new(
            providers,
            timeout,
            config.fallback_reply.clone(),
        ));
        info!("Providers in order: {:?}", cascade.provider_names());

        Ok(Self {
            config,
            storage,
            memory,
            cascade,
        })
    }

    pub fn chat(&self) -> ChatService {
        ChatService::new(
            self.storage.clone(),
            self.memory.clone(),
            self.cascade.clone(),
            self.config.owner_id,
        )
    }

    pub fn admin(&self) -> AdminService {
        AdminService::new(
            self.storage.clone(),
            self.memory.clone(),
            self.config.owner_id,
            self.config.web_password.clone(),
            self.config.admin_password.clone(),
        )
    }

    pub fn repair(&self) -> RepairService {
        RepairService::new(self.storage.clone(), self.config.owner_id)
    }

    pub fn diary(&self) -> DiaryService {
        DiaryService::new(self.storage.clone(), self.config.owner_id)
    }

    pub fn games(&self) -> GameService {
        GameService::new(self.storage.clone())
    }
}

fn stored_setting(embedded: &DocumentBackend, key: &str) -> Option<String> {
    use db::Backend;
    embedded
        .get_config(key)
        .ok()
        .flatten()
        .filter(|value| !value.trim().is_empty())
}
