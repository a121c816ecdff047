use super::config::{
    CURRENT_PARAM_PLACEHOLDER, DEFAULT_REFLECTION_PROMPT_TEMPLATE,
    DEFAULT_REFLECTION_SYSTEM_PROMPT, OptimizerConfig, SIDE_INFO_PLACEHOLDER, validate_template,
};
use super::error::{GepaError, Result};
use tracing::debug;
use weft_core::turn::ROLE_ASSISTANT;
use weft_core::{Block, BlockKind, InferenceContext, SharedEngine, Turn};

/// Fence language tags dropped when they sit alone on the first line
const LANGUAGE_TAGS: [&str; 7] = ["text", "txt", "markdown", "md", "yaml", "yml", "json"];

/// A proposed parameter value and the reflection text it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub proposed: String,
    pub raw: String,
}

/// Asks a reflection model to rewrite one parameter given side-info
#[derive(Clone)]
pub struct Reflector {
    engine: SharedEngine,
    system_prompt: String,
    template: String,
    objective: Option<String>,
}

impl Reflector {
    pub fn new(engine: SharedEngine) -> Self {
        Self {
            engine,
            system_prompt: DEFAULT_REFLECTION_SYSTEM_PROMPT.to_string(),
            template: DEFAULT_REFLECTION_PROMPT_TEMPLATE.to_string(),
            objective: None,
        }
    }

    pub fn from_config(engine: SharedEngine, config: &OptimizerConfig) -> Self {
        let mut reflector = Self::new(engine)
            .with_system_prompt(config.reflection_system_prompt.clone())
            .with_template(config.reflection_prompt_template.clone());
        reflector.objective = config.objective.clone();
        reflector
    }

    /// Blank prompts keep the default persona
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        if !system_prompt.trim().is_empty() {
            self.system_prompt = system_prompt.trim().to_string();
        }
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        let template = template.into();
        if !template.trim().is_empty() {
            self.template = template;
        }
        self
    }

    pub fn with_objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = Some(objective.into());
        self
    }

    /// User message for one reflection call
    pub fn render_prompt(&self, current: &str, side_info: &str) -> Result<String> {
        validate_template(&self.template)?;
        let prompt = self
            .template
            .replace(CURRENT_PARAM_PLACEHOLDER, current)
            .replace(SIDE_INFO_PLACEHOLDER, side_info);
        Ok(match self.objective.as_deref().map(str::trim) {
            Some(objective) if !objective.is_empty() => {
                format!("Objective:\n{}\n\n{}", objective, prompt)
            }
            _ => prompt,
        })
    }

    pub async fn propose(
        &self,
        ctx: &InferenceContext,
        current: &str,
        side_info: &str,
    ) -> Result<Proposal> {
        let prompt = self.render_prompt(current, side_info)?;
        let turn = Turn::new()
            .with_block(Block::system(self.system_prompt.clone()))
            .with_block(Block::user(prompt));
        let out = self.engine.run_inference(ctx, turn).await?;

        let raw = extract_assistant_text(&out);
        let proposed = extract_fenced_block(&raw).unwrap_or_else(|| raw.trim().to_string());
        if proposed.is_empty() {
            return Err(GepaError::Reflector(
                "reflection returned no text".to_string(),
            ));
        }
        debug!(
            raw_chars = raw.len(),
            proposed_chars = proposed.len(),
            "reflection proposal"
        );
        Ok(Proposal { proposed, raw })
    }
}

/// Trimmed assistant texts of `turn`, joined by newlines
pub fn extract_assistant_text(turn: &Turn) -> String {
    turn.blocks
        .iter()
        .filter(|b| b.kind() == BlockKind::LlmText || b.role.as_deref() == Some(ROLE_ASSISTANT))
        .filter_map(|b| b.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Contents of the first triple-backtick block, `None` when absent or empty
pub fn extract_fenced_block(text: &str) -> Option<String> {
    let start = text.find("```")?;
    let rest = &text[start + 3..];
    let end = rest.find("```")?;
    let block = rest[..end].trim();
    if block.is_empty() {
        return None;
    }
    if let Some((first, remainder)) = block.split_once('\n') {
        let tag = first.trim().to_lowercase();
        if LANGUAGE_TAGS.contains(&tag.as_str()) {
            let remainder = remainder.trim();
            return (!remainder.is_empty()).then(|| remainder.to_string());
        }
    }
    Some(block.to_string())
}
