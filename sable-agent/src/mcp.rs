//! MCP Agent (C11, §4.9): enumerates an external tool catalog once at
//! construction and drives a ReAct-style loop over it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sable_core::{
    Agent, AgentContext, AgentResult, LlmProvider, McpToolCatalog, Query, SimpleToolContext, Tool, ToolContext,
};
use serde_json::Value;

use crate::error::{AgentBuildError, Result};
use crate::reasoning::{run_tool_loop, LoopLimits};

/// Adapts one catalog-listed tool into the [`Tool`] contract, dispatching
/// `execute` back through the catalog's `invoke`.
struct McpToolAdapter {
    catalog: Arc<dyn McpToolCatalog>,
    name: String,
    description: String,
    input_schema: Value,
}

#[async_trait]
impl Tool for McpToolAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(self.input_schema.clone())
    }

    async fn execute(&self, _ctx: Arc<dyn ToolContext>, args: Value) -> sable_core::Result<Value> {
        let text = self.catalog.invoke(&self.name, args).await?;
        Ok(Value::String(text))
    }
}

/// Wraps an external MCP tool catalog as a tool-using agent. Tool
/// discovery happens once, at construction, so a per-turn call never pays
/// for re-enumerating the catalog.
pub struct McpAgent {
    llm: Arc<dyn LlmProvider>,
    tools: Vec<Arc<dyn Tool>>,
    limits: LoopLimits,
}

impl McpAgent {
    pub async fn new(llm: Arc<dyn LlmProvider>, catalog: Arc<dyn McpToolCatalog>) -> Result<Self> {
        let descriptors = catalog.list_tools().await.map_err(|e| AgentBuildError::ToolDiscovery(e.to_string()))?;
        let tools: Vec<Arc<dyn Tool>> = descriptors
            .into_iter()
            .map(|d| {
                Arc::new(McpToolAdapter {
                    catalog: catalog.clone(),
                    name: d.name,
                    description: d.description,
                    input_schema: d.input_schema,
                }) as Arc<dyn Tool>
            })
            .collect();

        Ok(Self { llm, tools, limits: LoopLimits::new(6, Duration::from_secs(45)) })
    }

    pub fn with_limits(mut self, limits: LoopLimits) -> Self {
        self.limits = limits;
        self
    }
}

const SYSTEM_PROMPT: &str = "You solve the user's request by calling the tools available to you as needed. \
Call a tool only when its result is necessary to answer; otherwise answer directly.";

#[async_trait]
impl Agent for McpAgent {
    fn name(&self) -> &str {
        "mcp"
    }

    fn description(&self) -> &str {
        "Answers requests using externally-provided MCP tools."
    }

    async fn execute(&self, query: &Query, ctx: Arc<AgentContext>) -> AgentResult {
        let start = Instant::now();
        let tool_ctx = Arc::new(SimpleToolContext::new(query.session_id.clone(), ctx.cancellation.clone()));

        let outcome =
            run_tool_loop(self.llm.as_ref(), SYSTEM_PROMPT, query, &self.tools, tool_ctx, self.limits).await;

        let duration = start.elapsed();
        match outcome {
            Ok(outcome) => {
                ctx.token_sink.record(sable_core::TokenUsageEvent {
                    model: ctx.model.clone(),
                    agent: Some(self.name().to_string()),
                    mode: ctx.mode.clone(),
                    input_tokens: outcome.usage.input_tokens,
                    output_tokens: outcome.usage.output_tokens,
                    duration,
                    tools: outcome.used_tools.clone(),
                    extra: Value::Null,
                });
                AgentResult::ok(self.name(), outcome.answer)
                    .with_tools(outcome.used_tools)
                    .with_usage(outcome.usage)
                    .with_duration(duration)
            }
            Err(error) => AgentResult::failed(self.name(), error).with_duration(duration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::{CancellationToken, ChatMessage, LlmResponse, NullTokenSink, ToolCall, ToolDescriptor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubCatalog {
        invoked_with: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl McpToolCatalog for StubCatalog {
        async fn list_tools(&self) -> sable_core::Result<Vec<ToolDescriptor>> {
            Ok(vec![ToolDescriptor {
                name: "get_weather".to_string(),
                description: "Get current weather for a city".to_string(),
                input_schema: serde_json::json!({"type": "object", "properties": {"city": {"type": "string"}}}),
            }])
        }

        async fn invoke(&self, name: &str, args: Value) -> sable_core::Result<String> {
            self.invoked_with.lock().unwrap().push((name.to_string(), args));
            Ok("sunny, 22C".to_string())
        }
    }

    struct ScriptedLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, messages: &[ChatMessage], _tools: Option<&[ToolDescriptor]>) -> sable_core::Result<LlmResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                let mut msg = ChatMessage::assistant("");
                msg.tool_calls = vec![ToolCall {
                    id: "call-1".to_string(),
                    name: "get_weather".to_string(),
                    arguments: serde_json::json!({"city": "Paris"}),
                }];
                Ok(LlmResponse { message: msg, usage: Default::default() })
            } else {
                let last = messages.last().unwrap();
                Ok(LlmResponse { message: ChatMessage::assistant(format!("It's {}", last.content)), usage: Default::default() })
            }
        }
    }

    #[tokio::test]
    async fn discovers_tools_at_construction_and_dispatches_calls() {
        let catalog = Arc::new(StubCatalog { invoked_with: Mutex::new(Vec::new()) });
        let llm = Arc::new(ScriptedLlm { calls: AtomicUsize::new(0) });
        let agent = McpAgent::new(llm, catalog.clone()).await.unwrap();

        let query = Query::new("session-1", "What's the weather in Paris?");
        let ctx = Arc::new(AgentContext::new(Arc::new(NullTokenSink), CancellationToken::new(), "test-model"));
        let result = agent.execute(&query, ctx).await;

        assert!(!result.is_error());
        assert!(result.output.contains("sunny"));
        assert_eq!(catalog.invoked_with.lock().unwrap().len(), 1);
    }
}
