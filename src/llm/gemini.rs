//! Google Generative Language `generateContent` over plain HTTP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::config::{ProviderConfig, GEMINI_BASE_URL};
use super::Provider;

pub struct GeminiProvider {
    name: String,
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate, parts concatenated.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig, timeout: Duration) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("{} has no API key", config.name))?;

        Ok(Self {
            name: config.name.clone(),
            http: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, system_prompt: &str) -> anyhow::Result<String> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart {
                    text: system_prompt,
                }],
            }],
            generation_config: self.max_tokens.map(|max_output_tokens| GenerationConfig {
                max_output_tokens,
            }),
        };

        let response: GenerateResponse = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_joins_parts() {
        let raw = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "Good "}, {"text": "morning"}], "role": "model"}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }"#;
        let response: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.text(), "Good morning");
    }

    #[test]
    fn test_blocked_response_is_empty() {
        let raw = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let response: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.text(), "");
    }

    #[test]
    fn test_endpoint_uses_override() {
        let config = ProviderConfig::gemini(
            Some("k".to_string()),
            Some("https://proxy.example/gemini/".to_string()),
        );
        let provider = GeminiProvider::new(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(
            provider.endpoint(),
            "https://proxy.example/gemini/models/gemini-2.0-flash:generateContent"
        );

        let default = GeminiProvider::new(
            &ProviderConfig::gemini(Some("k".to_string()), None),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(default.endpoint().starts_with(GEMINI_BASE_URL));
    }
}
