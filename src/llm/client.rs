use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::time::Duration;

use super::config::ProviderConfig;
use super::Provider;

/// OpenAI chat completions, or anything that speaks the same API (Groq, local servers).
pub struct OpenAiCompatibleProvider {
    name: String,
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: Option<u32>,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: &ProviderConfig, timeout: Duration) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("{} has no API key", config.name))?;

        let mut chat_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = &config.base_url {
            chat_config = chat_config.with_api_base(base_url);
        }

        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            name: config.name.clone(),
            client: Client::with_config(chat_config).with_http_client(http_client),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, system_prompt: &str) -> anyhow::Result<String> {
        let message: ChatCompletionRequestMessage =
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()?
                .into();

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(vec![message]);
        if let Some(max_tokens) = self.max_tokens {
            args.max_completion_tokens(max_tokens);
        }
        let request = args.build()?;

        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        Ok(content)
    }
}
