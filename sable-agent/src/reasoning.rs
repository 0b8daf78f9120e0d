//! The bounded tool-calling reasoning loop shared by every agent in this
//! crate (§4.9: "a constrained reasoning loop... bounded iterations").
//!
//! Every agent is a tool-using agent built on the same primitive so they
//! compose uniformly in the orchestrator, instead of each being a bespoke
//! chain with its own stopping rule.

use std::sync::Arc;
use std::time::Duration;

use sable_core::{
    AgentErrorKind, ChatMessage, LlmProvider, Query, Tool, ToolContext, ToolDescriptor, TokenUsage,
};

/// Bounds on one reasoning loop invocation.
#[derive(Debug, Clone, Copy)]
pub struct LoopLimits {
    /// Maximum number of LLM calls before giving up with
    /// [`AgentErrorKind::Internal`].
    pub max_iterations: usize,
    /// Wall-clock budget for the entire loop, independent of iteration
    /// count; exceeding it yields [`AgentErrorKind::Timeout`].
    pub timeout: Duration,
}

impl LoopLimits {
    pub fn new(max_iterations: usize, timeout: Duration) -> Self {
        Self { max_iterations, timeout }
    }
}

/// The outcome of a successful reasoning loop, before it's wrapped into an
/// `AgentResult` by the caller.
pub struct LoopOutcome {
    pub answer: String,
    pub usage: TokenUsage,
    pub used_tools: Vec<String>,
}

fn describe(tool: &Arc<dyn Tool>) -> ToolDescriptor {
    ToolDescriptor {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        input_schema: tool.parameters_schema().unwrap_or_else(|| serde_json::json!({ "type": "object", "properties": {} })),
    }
}

/// Run a bounded tool-calling loop: call the LLM, execute any requested
/// tool calls, feed results back, repeat until the LLM stops requesting
/// tools or a limit is hit.
pub async fn run_tool_loop(
    llm: &dyn LlmProvider,
    system_prompt: &str,
    query: &Query,
    tools: &[Arc<dyn Tool>],
    tool_ctx: Arc<dyn ToolContext>,
    limits: LoopLimits,
) -> Result<LoopOutcome, AgentErrorKind> {
    let descriptors: Vec<ToolDescriptor> = tools.iter().map(describe).collect();

    let body = async {
        let mut messages = vec![ChatMessage::system(system_prompt)];
        messages.extend(query.history.iter().cloned());
        messages.push(ChatMessage::user(query.text.clone()));

        let mut usage = TokenUsage::default();
        let mut used_tools = Vec::new();

        for _ in 0..limits.max_iterations {
            if tool_ctx.cancellation().is_cancelled() {
                return Err(AgentErrorKind::Internal("cancelled".to_string()));
            }

            let response = llm
                .chat(&messages, Some(&descriptors))
                .await
                .map_err(|e| AgentErrorKind::LlmFailure(e.to_string()))?;
            usage = usage.combine(&response.usage);

            if response.message.tool_calls.is_empty() {
                return Ok(LoopOutcome { answer: response.message.content, usage, used_tools });
            }

            let tool_calls = response.message.tool_calls.clone();
            messages.push(response.message);

            for call in tool_calls {
                let outcome = match tools.iter().find(|t| t.name() == call.name) {
                    Some(tool) => {
                        used_tools.push(tool.name().to_string());
                        match tool.execute(tool_ctx.clone(), call.arguments.clone()).await {
                            Ok(value) => value.to_string(),
                            Err(e) => format!("tool error: {e}"),
                        }
                    }
                    None => format!("unknown tool: {}", call.name),
                };
                messages.push(ChatMessage::tool_result(call.id, outcome));
            }
        }

        Err(AgentErrorKind::Internal("max tool-call iterations exceeded".to_string()))
    };

    match tokio::time::timeout(limits.timeout, body).await {
        Ok(result) => result,
        Err(_) => Err(AgentErrorKind::Timeout),
    }
}
