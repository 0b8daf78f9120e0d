//! Chat Mode Router (C15, §4.12): routes a turn to one of three modes.
//! Transitions are explicit user selections only; there is no automatic
//! mode promotion.

use std::sync::Arc;
use std::time::Instant;

use sable_core::{Agent, AgentContext, ChatMessage, LlmProvider, Query, TokenUsage, TokenUsageEvent};
use serde::{Deserialize, Serialize};

use crate::orchestrator::Orchestrator;

/// `SIMPLE` (LLM only, with chat history), `TOOL` (LLM + MCP tools), `RAG`
/// (full orchestrator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    Simple,
    Tool,
    Rag,
}

impl ChatMode {
    fn as_str(self) -> &'static str {
        match self {
            ChatMode::Simple => "simple",
            ChatMode::Tool => "tool",
            ChatMode::Rag => "rag",
        }
    }
}

pub struct ChatModeRouter {
    llm: Arc<dyn LlmProvider>,
    mcp_agent: Arc<dyn Agent>,
    orchestrator: Arc<Orchestrator>,
}

impl ChatModeRouter {
    pub fn new(llm: Arc<dyn LlmProvider>, mcp_agent: Arc<dyn Agent>, orchestrator: Arc<Orchestrator>) -> Self {
        Self { llm, mcp_agent, orchestrator }
    }

    /// Single entry function per mode: `process(user_input) → (answer, usage)`.
    /// `RAG` mode may internally select the MCP Agent through the
    /// orchestrator's own candidate ranking; it never routes back through
    /// this router to do so.
    pub async fn process(&self, mode: ChatMode, query: &Query, ctx: Arc<AgentContext>) -> (String, TokenUsage) {
        let ctx = Arc::new((*ctx).clone().with_mode(mode.as_str()));
        match mode {
            ChatMode::Simple => self.process_simple(query, ctx).await,
            ChatMode::Tool => self.process_tool(query, ctx).await,
            ChatMode::Rag => self.process_rag(query, ctx).await,
        }
    }

    /// `SIMPLE` bypasses the orchestrator entirely but still opens a
    /// token-tracker handle directly, since no agent records on its
    /// behalf.
    async fn process_simple(&self, query: &Query, ctx: Arc<AgentContext>) -> (String, TokenUsage) {
        let start = Instant::now();
        let mut messages = vec![ChatMessage::system(
            "You are a helpful assistant answering directly from the conversation so far, with no tools.",
        )];
        messages.extend(query.history.iter().cloned());
        messages.push(ChatMessage::user(query.text.clone()));

        match self.llm.chat(&messages, None).await {
            Ok(response) => {
                ctx.token_sink.record(TokenUsageEvent {
                    model: ctx.model.clone(),
                    agent: None,
                    mode: ctx.mode.clone(),
                    input_tokens: response.usage.input_tokens,
                    output_tokens: response.usage.output_tokens,
                    duration: start.elapsed(),
                    tools: Vec::new(),
                    extra: serde_json::Value::Null,
                });
                (response.message.content, response.usage)
            }
            Err(e) => {
                tracing::warn!(error = %e, "simple mode: llm call failed");
                (format!("I couldn't reach the language model: {e}"), TokenUsage::default())
            }
        }
    }

    /// `TOOL` runs the MCP Agent directly; it usage is already recorded by
    /// the agent itself (§9 "every agent records against the handle it's
    /// given"), so the router does not record again here.
    async fn process_tool(&self, query: &Query, ctx: Arc<AgentContext>) -> (String, TokenUsage) {
        let result = self.mcp_agent.execute(query, ctx).await;
        if result.is_error() {
            tracing::warn!(error = ?result.error, "tool mode: mcp agent failed");
            return (format!("I ran into a problem using tools: {}", result.error.unwrap()), result.usage);
        }
        (result.output, result.usage)
    }

    /// `RAG` delegates to the full orchestrator (hybrid analyzer, strategy
    /// execution, merge); usage is already recorded per invoked agent.
    async fn process_rag(&self, query: &Query, ctx: Arc<AgentContext>) -> (String, TokenUsage) {
        match self.orchestrator.run(query, ctx, query.strategy_hint).await {
            Ok(result) if !result.is_error() => (result.output, result.usage),
            Ok(result) => {
                tracing::warn!(error = ?result.error, "rag mode: orchestrator returned a trapped agent error");
                (format!("I couldn't find a good answer: {}", result.error.unwrap()), result.usage)
            }
            Err(e) => {
                tracing::warn!(error = %e, "rag mode: orchestrator failed");
                (format!("I couldn't process that request: {e}"), TokenUsage::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sable_core::{
        AgentErrorKind, AgentResult, CancellationToken, LlmResponse, NullTokenSink, OrchestratorConfig,
        Result as CoreResult, ToolDescriptor,
    };
    use crate::analyzer::HybridAnalyzer;

    struct EchoLlm;

    #[async_trait]
    impl LlmProvider for EchoLlm {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn chat(&self, messages: &[ChatMessage], _tools: Option<&[ToolDescriptor]>) -> CoreResult<LlmResponse> {
            let last = messages.last().unwrap();
            Ok(LlmResponse { message: ChatMessage::assistant(format!("echo: {}", last.content)), usage: Default::default() })
        }
    }

    struct StubMcpAgent;

    #[async_trait]
    impl Agent for StubMcpAgent {
        fn name(&self) -> &str {
            "mcp"
        }
        fn description(&self) -> &str {
            "stub mcp agent"
        }
        async fn execute(&self, query: &Query, _ctx: Arc<AgentContext>) -> AgentResult {
            AgentResult::ok("mcp", format!("tool result for: {}", query.text))
        }
    }

    fn ctx() -> Arc<AgentContext> {
        Arc::new(AgentContext::new(Arc::new(NullTokenSink), CancellationToken::new(), "test-model"))
    }

    #[tokio::test]
    async fn simple_mode_answers_directly_without_tools() {
        let llm = Arc::new(EchoLlm);
        let mcp_agent: Arc<dyn Agent> = Arc::new(StubMcpAgent);
        let orchestrator = Arc::new(Orchestrator::new(
            vec![mcp_agent.clone()],
            HybridAnalyzer::new(llm.clone()),
            llm.clone(),
            OrchestratorConfig::default(),
        ));
        let router = ChatModeRouter::new(llm, mcp_agent, orchestrator);

        let query = Query::new("s1", "hello there");
        let (answer, _usage) = router.process(ChatMode::Simple, &query, ctx()).await;

        assert_eq!(answer, "echo: hello there");
    }

    #[tokio::test]
    async fn tool_mode_runs_mcp_agent_directly() {
        let llm = Arc::new(EchoLlm);
        let mcp_agent: Arc<dyn Agent> = Arc::new(StubMcpAgent);
        let orchestrator = Arc::new(Orchestrator::new(
            vec![mcp_agent.clone()],
            HybridAnalyzer::new(llm.clone()),
            llm.clone(),
            OrchestratorConfig::default(),
        ));
        let router = ChatModeRouter::new(llm, mcp_agent, orchestrator);

        let query = Query::new("s1", "what's the weather");
        let (answer, _usage) = router.process(ChatMode::Tool, &query, ctx()).await;

        assert_eq!(answer, "tool result for: what's the weather");
    }

    #[tokio::test]
    async fn rag_mode_surfaces_trapped_errors_as_text_not_panic() {
        struct FailingAgent;
        #[async_trait]
        impl Agent for FailingAgent {
            fn name(&self) -> &str {
                "rag"
            }
            fn description(&self) -> &str {
                "always fails"
            }
            async fn execute(&self, _query: &Query, _ctx: Arc<AgentContext>) -> AgentResult {
                AgentResult::failed("rag", AgentErrorKind::Internal("no corpus".to_string()))
            }
        }

        let llm = Arc::new(EchoLlm);
        let mcp_agent: Arc<dyn Agent> = Arc::new(StubMcpAgent);
        let rag_agent: Arc<dyn Agent> = Arc::new(FailingAgent);
        let orchestrator = Arc::new(Orchestrator::new(
            vec![rag_agent],
            HybridAnalyzer::new(llm.clone()),
            llm.clone(),
            OrchestratorConfig::default(),
        ));
        let router = ChatModeRouter::new(llm, mcp_agent, orchestrator);

        let query = Query::new("s1", "anything").with_strategy(sable_core::ExecutionStrategy::Sequential);
        let (answer, _usage) = router.process(ChatMode::Rag, &query, ctx()).await;

        assert!(answer.contains("couldn't find a good answer"));
    }
}
