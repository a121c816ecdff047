//! Tool-loop middleware
//!
//! Runs the inner engine, executes any trailing tool calls it produced, appends their
//! results and re-invokes the engine until no calls remain or the iteration cap is hit.

use super::{ToolCallError, ToolConfig, ToolErrorHandling, ToolRegistry, schema};
use crate::context::InferenceContext;
use crate::engine::{Engine, EngineMetadata, SharedEngine, ToolConfigurable};
use crate::error::{CoreError, Result};
use crate::events::{Event, EventPayload};
use crate::keys;
use crate::middleware::Middleware;
use crate::turn::{Block, BlockContent, Turn};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A tool call waiting for its result
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: Value,
}

/// Trailing tool_use blocks of the turn, in order
pub fn pending_tool_calls(turn: &Turn) -> Vec<PendingToolCall> {
    turn.trailing_tool_uses()
        .iter()
        .filter_map(|block| match &block.content {
            BlockContent::ToolUse {
                tool_call_id,
                tool_name,
                tool_input,
            } => Some(PendingToolCall {
                tool_call_id: tool_call_id.clone(),
                tool_name: tool_name.clone(),
                input: tool_input.clone(),
            }),
            _ => None,
        })
        .collect()
}

#[derive(Clone)]
pub struct ToolMiddleware {
    registry: Arc<dyn ToolRegistry>,
    config: ToolConfig,
}

impl ToolMiddleware {
    pub fn new(registry: Arc<dyn ToolRegistry>, config: ToolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { registry, config })
    }
}

impl Middleware for ToolMiddleware {
    fn wrap(&self, next: SharedEngine) -> SharedEngine {
        Arc::new(ToolLoopEngine {
            next,
            registry: self.registry.clone(),
            config: self.config.clone(),
        })
    }

    fn name(&self) -> &str {
        "tools"
    }
}

struct ToolLoopEngine {
    next: SharedEngine,
    registry: Arc<dyn ToolRegistry>,
    config: ToolConfig,
}

struct ToolOutcome {
    call: PendingToolCall,
    result: Result<Value>,
}

impl ToolLoopEngine {
    async fn execute_round(
        &self,
        ctx: &InferenceContext,
        turn: &Turn,
        calls: Vec<PendingToolCall>,
    ) -> Result<Vec<Block>> {
        let mut outcomes = futures::stream::iter(calls.into_iter().map(|call| self.execute_call(ctx, turn, call)))
            .buffer_unordered(self.config.max_parallel_tools.max(1));

        let mut blocks = Vec::new();
        while let Some(outcome) = outcomes.next().await {
            let ToolOutcome { call, result } = outcome;
            let block = match result {
                Ok(value) => {
                    ctx.publish(Event::for_turn(
                        turn,
                        EventPayload::ToolResult {
                            tool_call_id: call.tool_call_id.clone(),
                            result: value.clone(),
                            error: None,
                        },
                    ));
                    Block::tool_result(call.tool_call_id, value)
                }
                Err(e) if e.is_canceled() => return Err(e),
                Err(e) if self.config.tool_error_handling == ToolErrorHandling::Abort => {
                    warn!(tool = %call.tool_name, "aborting tool round: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(tool = %call.tool_name, kind = %e.kind(), "tool call failed: {}", e);
                    ctx.publish(Event::for_turn(
                        turn,
                        EventPayload::ToolResult {
                            tool_call_id: call.tool_call_id.clone(),
                            result: Value::Null,
                            error: Some(e.to_string()),
                        },
                    ));
                    Block::tool_error(call.tool_call_id, e.to_string())
                }
            };
            blocks.push(block);
        }
        Ok(blocks)
    }

    async fn execute_call(&self, ctx: &InferenceContext, turn: &Turn, call: PendingToolCall) -> ToolOutcome {
        let result = self.try_execute(ctx, turn, &call).await;
        ToolOutcome { call, result }
    }

    async fn try_execute(&self, ctx: &InferenceContext, turn: &Turn, call: &PendingToolCall) -> Result<Value> {
        if !self.config.is_tool_allowed(&call.tool_name) {
            return Err(CoreError::ToolNotFound(call.tool_name.clone()));
        }
        let tool = self
            .registry
            .lookup_tool(&call.tool_name)
            .ok_or_else(|| CoreError::ToolNotFound(call.tool_name.clone()))?;
        schema::validate(&call.input, &tool.definition().parameters).map_err(|message| {
            CoreError::ToolSchemaMismatch {
                tool: call.tool_name.clone(),
                message,
            }
        })?;

        ctx.publish(Event::for_turn(
            turn,
            EventPayload::ToolCallExecute {
                tool_call_id: call.tool_call_id.clone(),
                tool_name: call.tool_name.clone(),
                input: call.input.clone(),
            },
        ));

        let timeout = self.config.execution_timeout();
        let retry = &self.config.retry;
        let mut attempt = 0u32;
        loop {
            debug!(tool = %call.tool_name, attempt, "executing tool");
            let outcome = ctx
                .guard(async {
                    Ok::<_, CoreError>(tokio::time::timeout(timeout, tool.execute(call.input.clone())).await)
                })
                .await?;
            let error = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => ToolCallError::Timeout,
            };

            if error.is_transient() && attempt < retry.max_retries {
                let delay = retry.delay_for(attempt);
                warn!(
                    tool = %call.tool_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "transient tool failure, retrying: {}",
                    error
                );
                ctx.guard(async {
                    tokio::time::sleep(delay).await;
                    Ok::<_, CoreError>(())
                })
                .await?;
                attempt += 1;
                continue;
            }

            return Err(match error {
                ToolCallError::Timeout => CoreError::ToolTimeout {
                    tool: call.tool_name.clone(),
                    timeout_ms: self.config.execution_timeout_ms,
                },
                other => CoreError::ToolExecution {
                    tool: call.tool_name.clone(),
                    message: other.to_string(),
                },
            });
        }
    }
}

#[async_trait]
impl Engine for ToolLoopEngine {
    async fn run_inference(&self, ctx: &InferenceContext, mut turn: Turn) -> Result<Turn> {
        if !self.config.is_active() {
            return self.next.run_inference(ctx, turn).await;
        }

        let definitions = self.config.filter_tools(self.registry.list_tools());
        if let Some(target) = self.next.tool_support() {
            target.configure_tools(&definitions, &self.config);
        }
        turn.data.set(&keys::TOOL_DEFINITIONS, definitions)?;
        turn.data.set(&keys::TOOL_CONFIG, self.config.clone())?;

        let mut iterations = 0u32;
        loop {
            ctx.check()?;
            turn = self.next.run_inference(ctx, turn).await?;

            let calls = pending_tool_calls(&turn);
            if calls.is_empty() {
                break;
            }
            info!(turn_id = %turn.id, iteration = iterations + 1, calls = calls.len(), "executing tool round");

            let results = self.execute_round(ctx, &turn, calls).await?;
            turn.blocks.extend(results);
            iterations += 1;

            if iterations >= self.config.max_iterations {
                warn!(turn_id = %turn.id, iterations, "tool loop reached max iterations");
                turn.metadata.set(&keys::TOOL_LOOP_TRUNCATED, true)?;
                break;
            }
        }
        turn.metadata.set(&keys::TOOL_LOOP_ITERATIONS, iterations)?;
        Ok(turn)
    }

    fn metadata(&self) -> EngineMetadata {
        self.next.metadata()
    }

    fn tool_support(&self) -> Option<&dyn ToolConfigurable> {
        self.next.tool_support()
    }
}
