use super::error::{GepaError, Result};
use serde::{Deserialize, Serialize};

pub const CURRENT_PARAM_PLACEHOLDER: &str = "<curr_param>";
pub const SIDE_INFO_PLACEHOLDER: &str = "<side_info>";

pub const DEFAULT_REFLECTION_SYSTEM_PROMPT: &str = "You are an expert prompt engineer.";

/// Instruction-proposal prompt; contains both placeholders
pub const DEFAULT_REFLECTION_PROMPT_TEMPLATE: &str = concat!(
    "I provided an assistant with the following instructions to perform a task for me:\n",
    "```\n",
    "<curr_param>\n",
    "```\n\n",
    "The following are examples of different task inputs provided to the assistant along with the assistant's response for each of them, and some feedback on how the assistant's response could be better:\n",
    "```\n",
    "<side_info>\n",
    "```\n\n",
    "Your task is to write a new instruction for the assistant.\n\n",
    "Read the inputs carefully and identify the input format and infer detailed task description about the task I wish to solve with the assistant.\n\n",
    "Read all the assistant responses and the corresponding feedback. Identify all niche and domain specific factual information about the task and include it in the instruction, as a lot of it may not be available to the assistant in the future. The assistant may have utilized a generalizable strategy to solve the task, if so, include that in the instruction as well.\n\n",
    "Provide the new instructions within ``` blocks.",
);

/// Settings for the reflective optimization loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Budget in evaluator calls
    pub max_eval_calls: usize,
    /// Examples sampled per iteration
    pub batch_size: usize,
    /// Top-k pool size when selecting on a single objective
    pub frontier_size: usize,
    /// 0 seeds from entropy
    pub random_seed: u64,
    pub reflection_system_prompt: String,
    pub reflection_prompt_template: String,
    pub objective: Option<String>,
    /// 0 leaves side-info uncapped
    pub max_side_info_chars: usize,
    /// Minimum single-objective improvement for a child to be accepted
    pub epsilon: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_eval_calls: 200,
            batch_size: 8,
            frontier_size: 10,
            random_seed: 0,
            reflection_system_prompt: DEFAULT_REFLECTION_SYSTEM_PROMPT.to_string(),
            reflection_prompt_template: DEFAULT_REFLECTION_PROMPT_TEMPLATE.to_string(),
            objective: None,
            max_side_info_chars: 0,
            epsilon: 0.0,
        }
    }
}

impl OptimizerConfig {
    pub fn with_budget(mut self, max_eval_calls: usize, batch_size: usize) -> Self {
        self.max_eval_calls = max_eval_calls;
        self.batch_size = batch_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = Some(objective.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_eval_calls == 0 {
            return Err(GepaError::InvalidConfig(
                "max_eval_calls must be positive".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(GepaError::InvalidConfig(
                "batch_size must be positive".to_string(),
            ));
        }
        if self.frontier_size == 0 {
            return Err(GepaError::InvalidConfig(
                "frontier_size must be positive".to_string(),
            ));
        }
        if self.epsilon.is_nan() || self.epsilon < 0.0 {
            return Err(GepaError::InvalidConfig(format!(
                "epsilon must be non-negative, got {}",
                self.epsilon
            )));
        }
        validate_template(&self.reflection_prompt_template)
    }
}

/// Both placeholders must be present
pub fn validate_template(template: &str) -> Result<()> {
    for placeholder in [CURRENT_PARAM_PLACEHOLDER, SIDE_INFO_PLACEHOLDER] {
        if !template.contains(placeholder) {
            return Err(GepaError::InvalidTemplate(format!(
                "template must include {}",
                placeholder
            )));
        }
    }
    Ok(())
}
