use super::claude::ClaudeCodec;
use super::gemini::GeminiCodec;
use super::http::HttpEngine;
use super::openai::OpenAiChatCodec;
use super::openai_responses::OpenAiResponsesCodec;
use super::settings::{ApiType, ProviderSettings};
use std::sync::Arc;
use tracing::debug;
use weft_core::{Result, SharedEngine};

/// Builds the engine matching a settings' `api_type`
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineFactory;

impl EngineFactory {
    pub fn new() -> Self {
        Self
    }

    /// Validate `settings` for the selected provider and construct its engine.
    ///
    /// Reasoning model names are routed to the responses adapter regardless of the openai tag.
    pub fn create_engine(&self, settings: &ProviderSettings) -> Result<SharedEngine> {
        let api_type = settings.effective_api_type();
        debug!(%api_type, model = %settings.model, "creating engine");
        let settings = settings.clone();
        let engine: SharedEngine = match api_type {
            ApiType::OpenAi | ApiType::Anyscale | ApiType::Fireworks => {
                Arc::new(HttpEngine::new(OpenAiChatCodec::new(api_type), settings)?)
            }
            ApiType::Claude => Arc::new(HttpEngine::new(ClaudeCodec, settings)?),
            ApiType::Gemini => Arc::new(HttpEngine::new(GeminiCodec, settings)?),
            ApiType::OpenAiResponses => Arc::new(HttpEngine::new(OpenAiResponsesCodec, settings)?),
        };
        Ok(engine)
    }

    /// Engines the factory can build
    pub fn supported_api_types(&self) -> &'static [&'static str] {
        &["openai", "anyscale", "fireworks", "claude", "gemini", "openai_responses"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::ErrorKind;

    #[test]
    fn test_create_engine_dispatches_by_api_type() {
        let factory = EngineFactory::new();
        let settings = ProviderSettings::new(ApiType::Claude, "claude-3-5-haiku-latest")
            .with_api_key(ApiType::Claude, "sk-ant");
        let engine = factory.create_engine(&settings).unwrap();
        assert_eq!(engine.metadata().provider.as_deref(), Some("claude"));

        let settings = ProviderSettings::new(ApiType::Fireworks, "llama-v3")
            .with_api_key(ApiType::Fireworks, "fw");
        let engine = factory.create_engine(&settings).unwrap();
        assert_eq!(engine.metadata().provider.as_deref(), Some("fireworks"));
    }

    #[test]
    fn test_reasoning_model_uses_responses_adapter() {
        let settings = ProviderSettings::new(ApiType::OpenAi, "gpt-5")
            .with_api_key(ApiType::OpenAi, "sk");
        let engine = EngineFactory::new().create_engine(&settings).unwrap();
        assert_eq!(engine.metadata().provider.as_deref(), Some("openai_responses"));
    }

    #[test]
    fn test_missing_key_is_invalid_config() {
        let settings = ProviderSettings::new(ApiType::Gemini, "gemini-2.0-flash");
        let err = EngineFactory::new().create_engine(&settings).err().expect("expected error");
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_unknown_tag_defaults_to_openai() {
        let mut settings = ProviderSettings::default().with_api_key(ApiType::OpenAi, "sk");
        settings.api_type = Some("unknown".to_string());
        settings.model = "gpt-4o-mini".to_string();
        let engine = EngineFactory::new().create_engine(&settings).unwrap();
        assert_eq!(engine.metadata().provider.as_deref(), Some("openai"));
    }
}
