//! Application layer
//!
//! [`InferenceApp`] composes a provider engine with logging, caller supplied middlewares and an
//! optional tool loop. The chain runs `logging -> middlewares... -> tools -> engine`.

use std::sync::Arc;
use tracing::info;
use weft_core::{
    Engine, InferenceContext, LoggingMiddleware, Middleware, Result as CoreResult, SharedEngine,
    SharedMiddleware, ToolConfig, ToolMiddleware, ToolRegistry, Turn, chain,
};

use crate::config::WeftConfig;
use crate::error::{Result, WeftError};
use crate::providers::{EngineFactory, ProviderSettings};

/// A composed inference pipeline
pub struct InferenceApp {
    engine: SharedEngine,
    metadata: AppMetadata,
}

#[derive(Debug, Clone)]
pub struct AppMetadata {
    pub name: String,
    pub version: String,
    /// Middleware names, outermost first
    pub middlewares: Vec<String>,
}

impl InferenceApp {
    pub fn builder(name: impl Into<String>) -> InferenceAppBuilder {
        InferenceAppBuilder::new(name)
    }

    /// Run one inference through the whole chain
    pub async fn run_inference(&self, ctx: &InferenceContext, turn: Turn) -> CoreResult<Turn> {
        self.engine.run_inference(ctx, turn).await
    }

    /// Run with a fresh context
    pub async fn run(&self, turn: Turn) -> CoreResult<Turn> {
        self.run_inference(&InferenceContext::new(), turn).await
    }

    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    pub fn metadata(&self) -> &AppMetadata {
        &self.metadata
    }
}

/// Builder for [`InferenceApp`]
pub struct InferenceAppBuilder {
    name: String,
    version: String,
    engine: Option<SharedEngine>,
    provider: Option<ProviderSettings>,
    middlewares: Vec<SharedMiddleware>,
    tools: Option<(Arc<dyn ToolRegistry>, ToolConfig)>,
    logging: bool,
}

impl InferenceAppBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            engine: None,
            provider: None,
            middlewares: Vec::new(),
            tools: None,
            logging: true,
        }
    }

    /// Start from a loaded configuration (provider settings only; tools need a registry)
    pub fn from_config(name: impl Into<String>, config: &WeftConfig) -> Self {
        Self::new(name).provider(config.provider.clone())
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn engine(mut self, engine: impl Engine + 'static) -> Self {
        self.engine = Some(Arc::new(engine));
        self
    }

    pub fn shared_engine(mut self, engine: SharedEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Build the engine from provider settings at `build` time; an explicit engine wins
    pub fn provider(mut self, settings: ProviderSettings) -> Self {
        self.provider = Some(settings);
        self
    }

    /// Append a middleware; earlier ones run further out
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn tools(mut self, registry: Arc<dyn ToolRegistry>, config: ToolConfig) -> Self {
        self.tools = Some((registry, config));
        self
    }

    pub fn logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }

    pub fn build(self) -> Result<InferenceApp> {
        let base = match (self.engine, self.provider) {
            (Some(engine), _) => engine,
            (None, Some(settings)) => EngineFactory::new().create_engine(&settings)?,
            (None, None) => return Err(WeftError::Build("No engine configured".to_string())),
        };

        let mut layers: Vec<SharedMiddleware> = Vec::new();
        if self.logging {
            layers.push(Arc::new(LoggingMiddleware));
        }
        layers.extend(self.middlewares);
        if let Some((registry, config)) = self.tools {
            layers.push(Arc::new(ToolMiddleware::new(registry, config)?));
        }

        let metadata = AppMetadata {
            name: self.name,
            version: self.version,
            middlewares: layers.iter().map(|m| m.name().to_string()).collect(),
        };
        info!(app = %metadata.name, middlewares = ?metadata.middlewares, "inference app built");

        Ok(InferenceApp {
            engine: chain(base, &layers),
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::{Block, BlockKind, ErrorKind, FnEngine, TextTransformMiddleware};

    fn echo_engine() -> FnEngine<impl Fn(Turn) -> CoreResult<Turn> + Send + Sync> {
        FnEngine::new("echo", |turn: Turn| {
            let text = turn
                .blocks
                .iter()
                .rev()
                .find(|b| b.kind() == BlockKind::User)
                .and_then(|b| b.text())
                .unwrap_or_default()
                .to_string();
            Ok(turn.with_block(Block::llm_text(format!("echo: {}", text))))
        })
    }

    #[tokio::test]
    async fn test_app_builder() {
        let app = InferenceApp::builder("test-app")
            .version("1.0.0")
            .engine(echo_engine())
            .middleware(TextTransformMiddleware::uppercase())
            .build()
            .unwrap();

        assert_eq!(app.metadata().name, "test-app");
        assert_eq!(app.metadata().middlewares, vec!["logging", "uppercase"]);

        let turn = app
            .run(Turn::new().with_block(Block::user("hello")))
            .await
            .unwrap();
        let last = turn.blocks.last().unwrap();
        assert_eq!(last.text(), Some("ECHO: HELLO"));
    }

    #[test]
    fn test_build_without_engine() {
        let err = InferenceApp::builder("empty").logging(false).build().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_build_with_invalid_provider() {
        let settings = ProviderSettings::default();
        let err = InferenceApp::builder("bad").provider(settings).build().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }
}
