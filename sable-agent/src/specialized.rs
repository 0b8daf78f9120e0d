//! Pandas / SQL / Python / File Agents (C12, §4.9): each wraps a domain
//! toolkit, discovered once at construction like the MCP agent, and bounds
//! every turn by both a wall-clock timeout and a maximum tool-call
//! iteration count.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sable_core::{Agent, AgentContext, AgentResult, LlmProvider, Query, SimpleToolContext, Tool, Toolset};
use serde_json::Value;

use crate::error::{AgentBuildError, Result};
use crate::reasoning::{run_tool_loop, LoopLimits};

/// A tool-using agent over one domain [`Toolset`], generic over the
/// system prompt and bounds so Pandas/SQL/Python/File agents share one
/// implementation and differ only in configuration.
pub struct ToolsetAgent {
    name: String,
    description: String,
    system_prompt: String,
    llm: Arc<dyn LlmProvider>,
    tools: Vec<Arc<dyn Tool>>,
    limits: LoopLimits,
}

impl ToolsetAgent {
    pub async fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
        llm: Arc<dyn LlmProvider>,
        toolset: Arc<dyn Toolset>,
        limits: LoopLimits,
    ) -> Result<Self> {
        let tools = toolset.tools().await.map_err(|e| AgentBuildError::ToolDiscovery(e.to_string()))?;
        Ok(Self {
            name: name.into(),
            description: description.into(),
            system_prompt: system_prompt.into(),
            llm,
            tools,
            limits,
        })
    }
}

#[async_trait]
impl Agent for ToolsetAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, query: &Query, ctx: Arc<AgentContext>) -> AgentResult {
        let start = Instant::now();
        let tool_ctx = Arc::new(SimpleToolContext::new(query.session_id.clone(), ctx.cancellation.clone()));

        let outcome =
            run_tool_loop(self.llm.as_ref(), &self.system_prompt, query, &self.tools, tool_ctx, self.limits).await;

        let duration = start.elapsed();
        match outcome {
            Ok(outcome) => {
                ctx.token_sink.record(sable_core::TokenUsageEvent {
                    model: ctx.model.clone(),
                    agent: Some(self.name.clone()),
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

const PANDAS_PROMPT: &str = "You answer questions about user-loaded tabular data using dataframe \
operation tools. Describe results in plain language; do not invent column names you have not observed.";

const SQL_PROMPT: &str = "You answer questions by running read queries against the configured database \
using the available SQL tools. Never attempt a write statement.";

const PYTHON_PROMPT: &str = "You answer questions by running sandboxed Python snippets scoped to the \
current workspace directory. Keep snippets minimal and explain the result.";

const FILE_PROMPT: &str = "You answer questions by reading and listing files rooted at the configured \
directory using the available file tools. Never attempt to escape that root.";

/// Wraps a dataframe toolkit (§4.9 "dataframe operations over user-loaded
/// tables").
pub async fn pandas_agent(llm: Arc<dyn LlmProvider>, toolset: Arc<dyn Toolset>) -> Result<ToolsetAgent> {
    ToolsetAgent::new(
        "pandas",
        "Answers questions about loaded tabular data via dataframe operations.",
        PANDAS_PROMPT,
        llm,
        toolset,
        LoopLimits::new(5, Duration::from_secs(20)),
    )
    .await
}

/// Wraps a SQL execution toolkit (§4.9 "SQL execution against a
/// user-configured database").
pub async fn sql_agent(llm: Arc<dyn LlmProvider>, toolset: Arc<dyn Toolset>) -> Result<ToolsetAgent> {
    ToolsetAgent::new(
        "sql",
        "Answers questions by running read-only SQL against a configured database.",
        SQL_PROMPT,
        llm,
        toolset,
        LoopLimits::new(4, Duration::from_secs(20)),
    )
    .await
}

/// Wraps a sandboxed code-execution toolkit (§4.9 "sandboxed code
/// execution within a workspace directory").
pub async fn python_agent(llm: Arc<dyn LlmProvider>, toolset: Arc<dyn Toolset>) -> Result<ToolsetAgent> {
    ToolsetAgent::new(
        "python",
        "Answers questions by running sandboxed Python snippets in the workspace.",
        PYTHON_PROMPT,
        llm,
        toolset,
        LoopLimits::new(6, Duration::from_secs(60)),
    )
    .await
}

/// Wraps a filesystem toolkit (§4.9 "filesystem operations rooted at a
/// configured directory").
pub async fn file_agent(llm: Arc<dyn LlmProvider>, toolset: Arc<dyn Toolset>) -> Result<ToolsetAgent> {
    ToolsetAgent::new(
        "file",
        "Answers questions by reading and listing files under a configured root directory.",
        FILE_PROMPT,
        llm,
        toolset,
        LoopLimits::new(5, Duration::from_secs(15)),
    )
    .await
}
