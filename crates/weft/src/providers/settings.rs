use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use strum_macros::{Display, EnumString};
use weft_core::{CoreError, Result};

/// Provider family selecting the wire adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString)]
pub enum ApiType {
    #[default]
    #[strum(serialize = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
    #[strum(serialize = "anyscale")]
    #[serde(rename = "anyscale")]
    Anyscale,
    #[strum(serialize = "fireworks")]
    #[serde(rename = "fireworks")]
    Fireworks,
    #[strum(serialize = "claude")]
    #[serde(rename = "claude")]
    Claude,
    #[strum(serialize = "gemini")]
    #[serde(rename = "gemini")]
    Gemini,
    #[strum(serialize = "openai_responses")]
    #[serde(rename = "openai_responses")]
    OpenAiResponses,
}

impl ApiType {
    /// Unknown or absent tags fall back to openai
    pub fn parse_lenient(tag: Option<&str>) -> Self {
        tag.and_then(|t| ApiType::from_str(t.trim()).ok())
            .unwrap_or_default()
    }

    /// Provider name used in `{provider}-api-key` and `{provider}-base-url`
    pub fn credential_name(self) -> &'static str {
        match self {
            Self::OpenAi | Self::OpenAiResponses => "openai",
            Self::Anyscale => "anyscale",
            Self::Fireworks => "fireworks",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi | Self::OpenAiResponses => "https://api.openai.com/v1",
            Self::Anyscale => "https://api.endpoints.anyscale.com/v1",
            Self::Fireworks => "https://api.fireworks.ai/inference/v1",
            Self::Claude => "https://api.anthropic.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    fn env_var(self) -> &'static str {
        match self {
            Self::OpenAi | Self::OpenAiResponses => "OPENAI_API_KEY",
            Self::Anyscale => "ANYSCALE_API_KEY",
            Self::Fireworks => "FIREWORKS_API_KEY",
            Self::Claude => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }

    const ALL: [ApiType; 6] = [
        Self::OpenAi,
        Self::Anyscale,
        Self::Fireworks,
        Self::Claude,
        Self::Gemini,
        Self::OpenAiResponses,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaudeSettings {
    pub max_tokens: u32,
    pub api_version: String,
    pub beta: Option<String>,
}

impl Default for ClaudeSettings {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            api_version: "2023-06-01".to_string(),
            beta: None,
        }
    }
}

/// Settings consumed by the engine factory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// One of openai, anyscale, fireworks, claude, gemini, openai_responses
    pub api_type: Option<String>,
    pub model: String,
    /// Keyed as `{provider}-api-key`
    pub api_keys: BTreeMap<String, String>,
    /// Keyed as `{provider}-base-url`
    pub base_urls: BTreeMap<String, String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_response_tokens: Option<u32>,
    pub stream: bool,
    /// Model names routed to the responses adapter
    pub reasoning_models: Vec<String>,
    pub reasoning_effort: Option<String>,
    pub timeout_secs: u64,
    pub claude: ClaudeSettings,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_type: None,
            model: "gpt-4o-mini".to_string(),
            api_keys: BTreeMap::new(),
            base_urls: BTreeMap::new(),
            temperature: None,
            top_p: None,
            max_response_tokens: None,
            stream: false,
            reasoning_models: vec![
                "o1".to_string(),
                "o3".to_string(),
                "o4-mini".to_string(),
                "gpt-5".to_string(),
            ],
            reasoning_effort: None,
            timeout_secs: 120,
            claude: ClaudeSettings::default(),
        }
    }
}

impl ProviderSettings {
    pub fn new(api_type: ApiType, model: impl Into<String>) -> Self {
        Self {
            api_type: Some(api_type.to_string()),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, api_type: ApiType, key: impl Into<String>) -> Self {
        self.api_keys.insert(
            format!("{}-api-key", api_type.credential_name()),
            key.into(),
        );
        self
    }

    pub fn with_base_url(mut self, api_type: ApiType, url: impl Into<String>) -> Self {
        self.base_urls.insert(
            format!("{}-base-url", api_type.credential_name()),
            url.into(),
        );
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn is_reasoning_model(&self) -> bool {
        self.reasoning_models.iter().any(|m| {
            self.model == *m || self.model.starts_with(&format!("{}-", m))
        })
    }

    /// Adapter to use: the configured tag, unless the model is a reasoning model
    pub fn effective_api_type(&self) -> ApiType {
        let api_type = ApiType::parse_lenient(self.api_type.as_deref());
        match api_type {
            ApiType::OpenAi if self.is_reasoning_model() => ApiType::OpenAiResponses,
            other => other,
        }
    }

    pub fn api_key(&self, api_type: ApiType) -> Option<&str> {
        self.api_keys
            .get(&format!("{}-api-key", api_type.credential_name()))
            .map(String::as_str)
            .filter(|k| !k.trim().is_empty())
    }

    pub fn base_url(&self, api_type: ApiType) -> String {
        self.base_urls
            .get(&format!("{}-base-url", api_type.credential_name()))
            .filter(|u| !u.trim().is_empty())
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| api_type.default_base_url().to_string())
    }

    /// Fill missing API keys from the environment (after loading `.env`)
    pub fn apply_env(&mut self) {
        dotenv::dotenv().ok();
        for api_type in ApiType::ALL {
            let name = format!("{}-api-key", api_type.credential_name());
            if self.api_keys.contains_key(&name) {
                continue;
            }
            if let Ok(key) = std::env::var(api_type.env_var()) {
                self.api_keys.insert(name, key);
            }
        }
    }

    /// Check everything the adapter for `api_type` needs before any network call
    pub fn validate_for(&self, api_type: ApiType) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(CoreError::InvalidConfig("model is required".to_string()));
        }
        let provider = api_type.credential_name();
        if self.api_key(api_type).is_none() {
            return Err(CoreError::InvalidConfig(format!(
                "missing {}-api-key",
                provider
            )));
        }
        let base_url = self.base_url(api_type);
        match reqwest::Url::parse(&base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(CoreError::InvalidConfig(format!(
                    "invalid {}-base-url: {}",
                    provider, base_url
                )));
            }
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(CoreError::InvalidConfig(format!(
                    "temperature {} out of range",
                    t
                )));
            }
        }
        if api_type == ApiType::Claude {
            if self.claude.max_tokens == 0 {
                return Err(CoreError::InvalidConfig(
                    "claude max_tokens must be positive".to_string(),
                ));
            }
            if self.claude.api_version.trim().is_empty() {
                return Err(CoreError::InvalidConfig(
                    "claude api_version is required".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_type_parsing() {
        assert_eq!(ApiType::parse_lenient(Some("claude")), ApiType::Claude);
        assert_eq!(ApiType::parse_lenient(Some("openai_responses")), ApiType::OpenAiResponses);
        assert_eq!(ApiType::parse_lenient(Some("mystery")), ApiType::OpenAi);
        assert_eq!(ApiType::parse_lenient(None), ApiType::OpenAi);
        assert_eq!(ApiType::Fireworks.to_string(), "fireworks");
    }

    #[test]
    fn test_reasoning_models_route_to_responses() {
        let mut settings = ProviderSettings::new(ApiType::OpenAi, "o3-mini");
        assert_eq!(settings.effective_api_type(), ApiType::OpenAiResponses);
        settings.model = "gpt-4o".to_string();
        assert_eq!(settings.effective_api_type(), ApiType::OpenAi);
        settings.model = "o1".to_string();
        settings.api_type = Some("claude".to_string());
        assert_eq!(settings.effective_api_type(), ApiType::Claude);
    }

    #[test]
    fn test_validation() {
        let settings = ProviderSettings::new(ApiType::Claude, "claude-3-5-sonnet");
        let err = settings.validate_for(ApiType::Claude).unwrap_err();
        assert!(err.to_string().contains("claude-api-key"));

        let mut settings = settings.with_api_key(ApiType::Claude, "sk-test");
        assert!(settings.validate_for(ApiType::Claude).is_ok());
        settings.claude.max_tokens = 0;
        assert!(settings.validate_for(ApiType::Claude).is_err());

        let settings = ProviderSettings::new(ApiType::Gemini, "gemini-2.0-flash")
            .with_api_key(ApiType::Gemini, "k")
            .with_base_url(ApiType::Gemini, "not a url");
        assert_eq!(
            settings.validate_for(ApiType::Gemini).unwrap_err().kind(),
            weft_core::ErrorKind::InvalidConfig
        );
    }

    #[test]
    fn test_base_url_defaults_and_trailing_slash() {
        let settings = ProviderSettings::default()
            .with_base_url(ApiType::OpenAi, "http://localhost:8080/v1/");
        assert_eq!(settings.base_url(ApiType::OpenAi), "http://localhost:8080/v1");
        assert_eq!(settings.base_url(ApiType::Claude), "https://api.anthropic.com/v1");
    }
}
