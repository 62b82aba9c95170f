pub mod cascade;
pub mod client;
pub mod config;
pub mod gemini;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub use cascade::ProviderCascade;
pub use client::OpenAiCompatibleProvider;
pub use config::{ProviderConfig, ProviderKind};
pub use gemini::GeminiProvider;

/// One chat backend the cascade can try.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Sends the whole prompt as a single system message and returns the raw reply text.
    async fn complete(&self, system_prompt: &str) -> anyhow::Result<String>;

    /// Whether the provider can take calls right now.
    fn is_ready(&self) -> bool {
        true
    }
}

fn build_provider(config: &ProviderConfig, timeout: Duration) -> anyhow::Result<Arc<dyn Provider>> {
    Ok(match config.kind {
        ProviderKind::OpenaiCompatible => Arc::new(OpenAiCompatibleProvider::new(config, timeout)?),
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(config, timeout)?),
    })
}

/// Builds the configured providers in order. Providers without credentials, or whose client
/// fails to build, are left out.
pub fn build_providers(configs: &[ProviderConfig], timeout: Duration) -> Vec<Arc<dyn Provider>> {
    let mut providers = Vec::new();
    for config in configs {
        if !config.has_credentials() {
            info!("Provider {}: no credentials, skipping", config.name);
            continue;
        }
        match build_provider(config, timeout) {
            Ok(provider) => {
                info!("Provider {} ready ({})", config.name, config.model);
                providers.push(provider);
            }
            Err(e) => error!("{} client init error: {}", config.name, e),
        }
    }
    providers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_providers_skips_missing_credentials() {
        let configs = vec![
            ProviderConfig::groq(None),
            ProviderConfig::gemini(Some("g".to_string()), None),
            ProviderConfig::openai(Some("  ".to_string())),
        ];
        let providers = build_providers(&configs, Duration::from_secs(5));
        let names: Vec<_> = providers.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["gemini"]);
    }
}
