//! RAG Agent (C10, §4.9): presents `search_documents` as the only tool and
//! grounds its answer on retrieved passages.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sable_core::{Agent, AgentContext, AgentResult, LlmProvider, Query, SimpleToolContext, Tool};
use sable_rag::RagTool;

use crate::reasoning::{run_tool_loop, LoopLimits};

const SYSTEM_PROMPT: &str = "You answer questions using the search_documents tool to find supporting \
passages. Only assert facts that appear in a tool result; if the corpus has nothing relevant, say so \
plainly instead of guessing.";

/// A tool-using agent whose only tool is a document retriever.
pub struct RagAgent {
    llm: Arc<dyn LlmProvider>,
    tool: Arc<RagTool>,
    limits: LoopLimits,
}

impl RagAgent {
    pub fn new(llm: Arc<dyn LlmProvider>, tool: Arc<RagTool>) -> Self {
        Self { llm, tool, limits: LoopLimits::new(4, Duration::from_secs(30)) }
    }

    pub fn with_limits(mut self, limits: LoopLimits) -> Self {
        self.limits = limits;
        self
    }
}

#[async_trait]
impl Agent for RagAgent {
    fn name(&self) -> &str {
        "rag"
    }

    fn description(&self) -> &str {
        "Answers questions by retrieving and grounding on passages from the ingested document corpus."
    }

    async fn execute(&self, query: &Query, ctx: Arc<AgentContext>) -> AgentResult {
        let start = Instant::now();
        let tools: Vec<Arc<dyn Tool>> = vec![self.tool.clone()];
        let tool_ctx = Arc::new(SimpleToolContext::new(query.session_id.clone(), ctx.cancellation.clone()));

        let outcome = run_tool_loop(self.llm.as_ref(), SYSTEM_PROMPT, query, &tools, tool_ctx, self.limits).await;

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
                    extra: serde_json::Value::Null,
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
    use async_trait::async_trait as at;
    use sable_core::{CancellationToken, ChatMessage, LlmResponse, SableError, ToolCall};
    use sable_core::Result as CoreResult;
    use sable_rag::{
        Chunk, EmbeddingBackend, EmbeddingCache, EmbeddingProvider, InMemoryVectorStore, NoOpQueryExpander,
        NoOpReranker, Retriever, VectorStore,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubBackend;

    #[at]
    impl EmbeddingBackend for StubBackend {
        fn model_id(&self) -> &str {
            "stub"
        }
        fn dimensions(&self) -> usize {
            1
        }
        async fn embed_batch_uncached(&self, texts: &[&str]) -> sable_rag::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    /// An LLM stub that calls `search_documents` exactly once, then answers
    /// from the tool result on its second call.
    struct ScriptedLlm {
        calls: AtomicUsize,
    }

    #[at]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, messages: &[ChatMessage], _tools: Option<&[sable_core::ToolDescriptor]>) -> CoreResult<LlmResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                let mut msg = ChatMessage::assistant("");
                msg.tool_calls = vec![ToolCall {
                    id: "call-1".to_string(),
                    name: "search_documents".to_string(),
                    arguments: serde_json::json!({ "query": "capital of france" }),
                }];
                Ok(LlmResponse { message: msg, usage: Default::default() })
            } else {
                let last = messages.last().ok_or_else(|| SableError::Llm("no messages".to_string()))?;
                Ok(LlmResponse { message: ChatMessage::assistant(format!("Answer grounded on: {}", last.content)), usage: Default::default() })
            }
        }
    }

    async fn build_rag_agent() -> RagAgent {
        let embeddings = Arc::new(EmbeddingProvider::new(Arc::new(StubBackend), Arc::new(EmbeddingCache::new(10)), 8));
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .upsert(vec![Chunk {
                id: "c1".to_string(),
                document_id: "d1".to_string(),
                ordinal: 0,
                text: "Paris is the capital of France".to_string(),
                embedding: vec![31.0],
                metadata: HashMap::new(),
            }])
            .await
            .unwrap();
        let store: Arc<dyn VectorStore> = store;

        let retriever = Arc::new(Retriever::new(
            embeddings,
            store,
            Arc::new(NoOpReranker),
            Arc::new(NoOpQueryExpander),
            5,
            false,
            5,
            false,
        ));
        let tool = Arc::new(RagTool::new(retriever));
        let llm = Arc::new(ScriptedLlm { calls: AtomicUsize::new(0) });
        RagAgent::new(llm, tool)
    }

    #[tokio::test]
    async fn grounds_answer_on_retrieved_passage() {
        let agent = build_rag_agent().await;
        let query = Query::new("session-1", "What is the capital of France?");
        let ctx = Arc::new(AgentContext::new(Arc::new(sable_core::NullTokenSink), CancellationToken::new(), "test-model"));

        let result = agent.execute(&query, ctx).await;

        assert!(!result.is_error());
        assert!(result.output.contains("Paris"));
        assert_eq!(result.used_tools, vec!["search_documents".to_string()]);
    }
}
