//! Evaluator plugin boundary
//!
//! A plugin is hosted by some external runtime. This module fixes only the contract: a
//! validated [`PluginDescriptor`], a [`PluginFactory`] that creates an [`OptimizerPlugin`]
//! instance from a [`HostContext`], and the JSON shapes exchanged with `evaluate`.
//! [`PluginEvaluator`] adapts an instance to the optimizer's [`Evaluator`].

pub mod decode;
pub mod descriptor;
pub mod error;

pub use decode::{decode_eval_result, decode_return_value};
pub use descriptor::{HostContext, OPTIMIZER_PLUGIN_API_VERSION, OPTIMIZER_PLUGIN_KIND, PluginDescriptor};
pub use error::{PluginError, Result};

use crate::gepa::{self, Candidate, EvalResult, Evaluator, GepaError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};
use weft_core::InferenceContext;

/// First argument of `evaluate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateInput {
    pub candidate: Candidate,
    pub example: Value,
    pub example_index: usize,
}

/// Second argument of `evaluate`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateOptions {
    pub profile: String,
    pub engine_options: Map<String, Value>,
    pub tags: Map<String, Value>,
}

/// Instance returned by a plugin's `create`
#[async_trait]
pub trait OptimizerPlugin: Send + Sync {
    /// Raw return value of the plugin's `evaluate`
    async fn evaluate(&self, input: &EvaluateInput, options: &EvaluateOptions) -> Result<Value>;

    /// Raw return value of `dataset()` (or `getDataset()`), when the plugin provides one
    async fn dataset(&self) -> Result<Option<Value>> {
        Ok(None)
    }
}

pub trait PluginFactory: Send + Sync {
    fn descriptor(&self) -> PluginDescriptor;

    fn create(&self, host: &HostContext) -> Result<Arc<dyn OptimizerPlugin>>;
}

/// A validated plugin and its instance
#[derive(Clone)]
pub struct LoadedPlugin {
    pub descriptor: PluginDescriptor,
    instance: Arc<dyn OptimizerPlugin>,
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Validate the descriptor, then create the instance
pub fn load_plugin(factory: &dyn PluginFactory, host: &HostContext) -> Result<LoadedPlugin> {
    let descriptor = factory.descriptor();
    descriptor.validate()?;
    let instance = factory.create(host)?;
    info!(id = %descriptor.id, name = %descriptor.name, "plugin loaded");
    Ok(LoadedPlugin {
        descriptor,
        instance,
    })
}

impl LoadedPlugin {
    pub fn instance(&self) -> &Arc<dyn OptimizerPlugin> {
        &self.instance
    }

    /// Examples provided by the plugin itself
    pub async fn dataset(&self) -> Result<Vec<Value>> {
        let raw = self.instance.dataset().await?.ok_or_else(|| {
            PluginError::NoDataset(format!(
                "plugin {} has no dataset(); provide a dataset file",
                self.descriptor.id
            ))
        })?;
        match decode_return_value(raw)? {
            Value::Array(items) => Ok(items),
            other => Err(PluginError::InvalidReturn(format!(
                "dataset() must return an array, got {}",
                other
            ))),
        }
    }

    /// Call `evaluate` and decode its return, keeping the decoded value as `raw`
    pub async fn evaluate(
        &self,
        input: &EvaluateInput,
        options: &EvaluateOptions,
    ) -> Result<EvalResult> {
        let returned = self.instance.evaluate(input, options).await?;
        let decoded = decode_return_value(returned)?;
        let mut result = decode_eval_result(&decoded)?;
        result.raw = Some(decoded);
        Ok(result)
    }
}

/// Optimizer evaluator that delegates to a plugin
pub struct PluginEvaluator {
    plugin: LoadedPlugin,
    options: EvaluateOptions,
}

impl PluginEvaluator {
    pub fn new(plugin: LoadedPlugin, options: EvaluateOptions) -> Self {
        Self { plugin, options }
    }
}

#[async_trait]
impl Evaluator for PluginEvaluator {
    async fn evaluate(
        &self,
        ctx: &InferenceContext,
        candidate: &Candidate,
        example_index: usize,
        example: &Value,
    ) -> gepa::Result<EvalResult> {
        let input = EvaluateInput {
            candidate: candidate.clone(),
            example: example.clone(),
            example_index,
        };
        debug!(plugin = %self.plugin.descriptor.id, example_index, "plugin evaluate");
        ctx.guard(async {
            self.plugin
                .evaluate(&input, &self.options)
                .await
                .map_err(|e| match e {
                    PluginError::Core(core) => GepaError::Core(core),
                    other => GepaError::evaluation(other.kind(), other.to_string()),
                })
        })
        .await
    }
}
