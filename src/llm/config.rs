use serde::{Deserialize, Serialize};

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Any OpenAI-style chat completions endpoint (OpenAI, Groq, local servers).
    #[default]
    OpenaiCompatible,
    /// Google Generative Language `generateContent`.
    Gemini,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
}

impl ProviderConfig {
    pub fn groq(api_key: Option<String>) -> Self {
        Self {
            name: "groq".to_string(),
            kind: ProviderKind::OpenaiCompatible,
            model: "llama-3.3-70b-versatile".to_string(),
            api_key,
            base_url: Some(GROQ_BASE_URL.to_string()),
            max_tokens: None,
        }
    }

    pub fn gemini(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            name: "gemini".to_string(),
            kind: ProviderKind::Gemini,
            model: "gemini-2.0-flash".to_string(),
            api_key,
            base_url,
            max_tokens: None,
        }
    }

    pub fn openai(api_key: Option<String>) -> Self {
        Self {
            name: "openai".to_string(),
            kind: ProviderKind::OpenaiCompatible,
            model: "gpt-3.5-turbo".to_string(),
            api_key,
            base_url: None,
            max_tokens: Some(200),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}
