use crate::llm::config::ProviderConfig;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fs;

#[derive(Clone, Deserialize)]
pub struct Config {
    /// The one user whose state this app keeps.
    pub owner_id: i64,
    /// Relational backend location. `None` runs on the embedded store alone.
    pub database_url: Option<String>,
    pub embedded_db_path: String,
    pub memory_path: String,
    pub web_password: String,
    pub admin_password: String,
    pub providers: Vec<ProviderConfig>,
    pub provider_timeout_secs: u64,
    pub db_timeout_secs: u64,
    pub fallback_reply: String,
    pub history_display_limit: usize,
}

pub const DEFAULT_FALLBACK_REPLY: &str = "Bubu, signal weak hai... contact Jeet 🐻💖";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            owner_id: env::var("OWNER_ID")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("OWNER_ID must be a valid integer"))?,
            database_url: env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            embedded_db_path: env::var("EMBEDDED_DB_PATH")
                .unwrap_or_else(|_| "db.json".to_string()),
            memory_path: env::var("MEMORY_PATH").unwrap_or_else(|_| "memory.json".to_string()),
            web_password: env::var("WEB_PASSWORD").unwrap_or_else(|_| "love u".to_string()),
            admin_password: env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string()),
            providers: Self::load_providers()?,
            provider_timeout_secs: env::var("PROVIDER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            db_timeout_secs: env::var("DB_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            fallback_reply: env::var("FALLBACK_REPLY")
                .unwrap_or_else(|_| DEFAULT_FALLBACK_REPLY.to_string()),
            history_display_limit: env::var("HISTORY_DISPLAY_LIMIT")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),
        })
    }

    /// Provider order comes from `providers.toml` when present, otherwise from the
    /// environment in the order groq, gemini, openai.
    pub fn load_providers() -> anyhow::Result<Vec<ProviderConfig>> {
        let path = env::var("PROVIDERS_FILE").unwrap_or_else(|_| "providers.toml".to_string());
        if let Ok(content) = fs::read_to_string(&path) {
            return Self::parse_providers(&content)
                .map_err(|e| anyhow::anyhow!("Invalid provider file {}: {}", path, e));
        }
        Ok(Self::providers_from_env())
    }

    pub fn parse_providers(content: &str) -> anyhow::Result<Vec<ProviderConfig>> {
        #[derive(Deserialize)]
        struct ProviderWrapper {
            providers: Vec<ProviderConfig>,
        }
        let wrapper: ProviderWrapper = toml::from_str(content)?;
        Ok(wrapper.providers)
    }

    fn providers_from_env() -> Vec<ProviderConfig> {
        // The hosted Gemini proxy takes precedence over a plain key
        let gemini = match (
            env::var("AI_INTEGRATIONS_GEMINI_API_KEY").ok(),
            env::var("AI_INTEGRATIONS_GEMINI_BASE_URL").ok(),
        ) {
            (Some(key), Some(url)) => ProviderConfig::gemini(Some(key), Some(url)),
            _ => ProviderConfig::gemini(env::var("GEMINI_API_KEY").ok(), None),
        };

        vec![
            ProviderConfig::groq(env::var("GROQ_API_KEY").ok()),
            gemini,
            ProviderConfig::openai(env::var("OPENAI_API_KEY").ok()),
        ]
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("owner_id", &self.owner_id)
            .field("database_url", &self.database_url)
            .field("embedded_db_path", &self.embedded_db_path)
            .field("memory_path", &self.memory_path)
            .field("web_password", &"[REDACTED]")
            .field("admin_password", &"[REDACTED]")
            .field("providers", &self.providers)
            .field("provider_timeout_secs", &self.provider_timeout_secs)
            .field("db_timeout_secs", &self.db_timeout_secs)
            .field("fallback_reply", &self.fallback_reply)
            .field("history_display_limit", &self.history_display_limit)
            .finish()
    }
}
