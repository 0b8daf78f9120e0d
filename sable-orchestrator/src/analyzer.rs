//! Hybrid Analyzer (C13, §4.10): ranks candidate agents for a query using
//! the LLM itself, with a fixed priority-list fallback when the LLM is
//! unavailable. No hard-coded keyword rules.

use std::sync::Arc;

use sable_core::{Agent, ChatMessage, LlmProvider, Query};
use serde::Deserialize;

/// Fixed tie-break order (§4.11 "Tie-breaks") used both to order equal LLM
/// confidence scores and as the static fallback ranking.
pub const AGENT_PRIORITY: &[&str] = &["rag", "mcp", "pandas", "sql", "python", "file"];

/// One candidate agent with a confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub agent_name: String,
    pub confidence: f32,
}

#[derive(Debug, Deserialize)]
struct RawCandidate {
    agent: String,
    confidence: f32,
}

fn priority_rank(name: &str) -> usize {
    AGENT_PRIORITY.iter().position(|a| *a == name).unwrap_or(AGENT_PRIORITY.len())
}

/// Ranks every registered agent by its fixed tie-break priority, each a
/// step below the last so ties never occur after the fallback runs.
fn static_priority(agents: &[Arc<dyn Agent>]) -> Vec<CandidateScore> {
    let mut ranked: Vec<&Arc<dyn Agent>> = agents.iter().collect();
    ranked.sort_by_key(|a| priority_rank(a.name()));
    ranked
        .into_iter()
        .enumerate()
        .map(|(i, a)| CandidateScore { agent_name: a.name().to_string(), confidence: 1.0 - (i as f32 * 0.1).min(0.9) })
        .collect()
}

fn rubric_prompt(agents: &[Arc<dyn Agent>]) -> String {
    let roster: String = agents.iter().map(|a| format!("- {}: {}\n", a.name(), a.description())).collect();
    format!(
        "You are selecting which agents should handle a user request. Available agents:\n{roster}\n\
         Rank the agents most to least relevant for the request. Respond with ONLY a JSON array, most \
         relevant first, each element `{{\"agent\": <name>, \"confidence\": <0..1>}}`. Include every \
         agent whose tools could plausibly help; omit ones that clearly cannot."
    )
}

/// Extract the first top-level JSON array substring, tolerating an LLM
/// that wraps its answer in prose or a code fence.
fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

pub struct HybridAnalyzer {
    llm: Arc<dyn LlmProvider>,
}

impl HybridAnalyzer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Produce an ordered candidate list for `query` over `agents`. Always
    /// returns at least one candidate when `agents` is non-empty.
    pub async fn analyze(&self, query: &Query, agents: &[Arc<dyn Agent>]) -> Vec<CandidateScore> {
        if agents.is_empty() {
            return Vec::new();
        }

        let messages = vec![ChatMessage::system(rubric_prompt(agents)), ChatMessage::user(query.text.clone())];

        let response = match self.llm.chat(&messages, None).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "hybrid analyzer: llm unavailable, falling back to static priority");
                return static_priority(agents);
            }
        };

        let Some(json) = extract_json_array(&response.message.content) else {
            tracing::warn!("hybrid analyzer: llm response had no JSON array, falling back to static priority");
            return static_priority(agents);
        };

        let raw: Vec<RawCandidate> = match serde_json::from_str(json) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "hybrid analyzer: unparseable candidate list, falling back to static priority");
                return static_priority(agents);
            }
        };

        let known: Vec<CandidateScore> = raw
            .into_iter()
            .filter(|c| agents.iter().any(|a| a.name() == c.agent))
            .map(|c| CandidateScore { agent_name: c.agent, confidence: c.confidence.clamp(0.0, 1.0) })
            .collect();

        if known.is_empty() {
            tracing::warn!("hybrid analyzer: llm named no known agent, falling back to static priority");
            return static_priority(agents);
        }

        let mut ranked = known;
        ranked.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| priority_rank(&a.agent_name).cmp(&priority_rank(&b.agent_name)))
        });
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sable_core::{AgentContext, AgentResult, LlmResponse, Result as CoreResult, ToolDescriptor};

    struct StubAgent {
        name: &'static str,
    }

    #[async_trait]
    impl Agent for StubAgent {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "a stub agent"
        }
        async fn execute(&self, _query: &Query, _ctx: Arc<AgentContext>) -> AgentResult {
            AgentResult::ok(self.name, "stub")
        }
    }

    struct ScriptedLlm {
        response: String,
        fail: bool,
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn chat(&self, _messages: &[ChatMessage], _tools: Option<&[ToolDescriptor]>) -> CoreResult<LlmResponse> {
            if self.fail {
                return Err(sable_core::SableError::Llm("down".to_string()));
            }
            Ok(LlmResponse { message: ChatMessage::assistant(self.response.clone()), usage: Default::default() })
        }
    }

    fn agents() -> Vec<Arc<dyn Agent>> {
        vec![Arc::new(StubAgent { name: "rag" }), Arc::new(StubAgent { name: "mcp" })]
    }

    #[tokio::test]
    async fn parses_ranked_json_response() {
        let llm = Arc::new(ScriptedLlm {
            response: r#"Sure, here you go: [{"agent": "mcp", "confidence": 0.9}, {"agent": "rag", "confidence": 0.4}]"#
                .to_string(),
            fail: false,
        });
        let analyzer = HybridAnalyzer::new(llm);
        let query = Query::new("s1", "what's the weather");
        let candidates = analyzer.analyze(&query, &agents()).await;

        assert_eq!(candidates[0].agent_name, "mcp");
        assert_eq!(candidates[1].agent_name, "rag");
    }

    #[tokio::test]
    async fn falls_back_to_static_priority_when_llm_unavailable() {
        let llm = Arc::new(ScriptedLlm { response: String::new(), fail: true });
        let analyzer = HybridAnalyzer::new(llm);
        let query = Query::new("s1", "anything");
        let candidates = analyzer.analyze(&query, &agents()).await;

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].agent_name, "rag");
        assert_eq!(candidates[1].agent_name, "mcp");
    }

    #[tokio::test]
    async fn falls_back_when_response_has_no_json() {
        let llm = Arc::new(ScriptedLlm { response: "I am not sure what you mean.".to_string(), fail: false });
        let analyzer = HybridAnalyzer::new(llm);
        let query = Query::new("s1", "anything");
        let candidates = analyzer.analyze(&query, &agents()).await;

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].agent_name, "rag");
    }
}
