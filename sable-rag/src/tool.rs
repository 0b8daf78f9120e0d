//! `search_documents` tool: exposes the retriever as a [`sable_core::Tool`]
//! so any agent's reasoning loop can call it like any other tool.

use std::sync::Arc;

use async_trait::async_trait;
use sable_core::{MetadataFilter, SableError, Tool, ToolContext};
use serde_json::{json, Value};

use crate::retriever::Retriever;

/// Wraps a [`Retriever`] as a callable tool named `search_documents`.
pub struct RagTool {
    retriever: Arc<Retriever>,
}

impl RagTool {
    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Tool for RagTool {
    fn name(&self) -> &str {
        "search_documents"
    }

    fn description(&self) -> &str {
        "Search the ingested document corpus for passages relevant to a query, optionally scoped to a topic."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The search query" },
                "topic_id": { "type": "string", "description": "Restrict results to this topic" }
            },
            "required": ["query"]
        }))
    }

    async fn execute(&self, _ctx: Arc<dyn ToolContext>, args: Value) -> sable_core::Result<Value> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| SableError::Tool("search_documents requires a 'query' string argument".to_string()))?;

        let filter = args.get("topic_id").and_then(Value::as_str).map(|t| MetadataFilter::eq("topic_id", t));

        let results = self
            .retriever
            .retrieve(query, filter.as_ref())
            .await
            .map_err(|e| SableError::Tool(format!("retrieval failed: {e}")))?;

        Ok(json!({
            "results": results.into_iter().map(|r| json!({
                "document_id": r.chunk.document_id,
                "text": r.chunk.text,
                "score": r.score,
            })).collect::<Vec<_>>()
        }))
    }
}
