//! Ordered fallback across chat providers.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::Provider;

/// Tries each provider in order until one returns non-empty text.
///
/// Never fails: when every provider is absent or fails, the fallback reply is returned.
pub struct ProviderCascade {
    providers: Vec<Arc<dyn Provider>>,
    call_timeout: Duration,
    fallback_reply: String,
}

impl ProviderCascade {
    pub fn new(
        providers: Vec<Arc<dyn Provider>>,
        call_timeout: Duration,
        fallback_reply: impl Into<String>,
    ) -> Self {
        Self {
            providers,
            call_timeout,
            fallback_reply: fallback_reply.into(),
        }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn fallback_reply(&self) -> &str {
        &self.fallback_reply
    }

    pub async fn generate(&self, prompt: &str) -> String {
        for provider in &self.providers {
            if !provider.is_ready() {
                debug!("Provider {} not ready, skipping", provider.name());
                continue;
            }

            match tokio::time::timeout(self.call_timeout, provider.complete(prompt)).await {
                Ok(Ok(text)) => {
                    let reply = text.trim();
                    if !reply.is_empty() {
                        info!("Reply generated by {}", provider.name());
                        return reply.to_string();
                    }
                    warn!("{} returned an empty reply", provider.name());
                }
                Ok(Err(e)) => error!("{} chat error: {}", provider.name(), e),
                Err(_) => error!(
                    "{} timed out after {}s",
                    provider.name(),
                    self.call_timeout.as_secs_f32()
                ),
            }
        }

        warn!("All providers exhausted, sending fallback reply");
        self.fallback_reply.clone()
    }
}
