//! Orchestrator (C14, §4.11): selects, runs, and merges agents for one
//! user turn under one of four execution strategies.

use std::sync::Arc;
use std::time::Duration;

use sable_core::{Agent, AgentContext, AgentErrorKind, AgentResult, ChatMessage, ExecutionStrategy, LlmProvider, OrchestratorConfig, Query};

use crate::analyzer::{CandidateScore, HybridAnalyzer};
use crate::error::{OrchestratorError, Result};

/// The outcome of [`Orchestrator::run_parallel`]: the merged result plus
/// whether the LLM merge step itself failed, so `HYBRID` can decide
/// whether to escalate to `SEQUENTIAL` instead of accepting the
/// longest-output fallback.
struct ParallelOutcome {
    result: AgentResult,
    merge_failed: bool,
}

pub struct Orchestrator {
    agents: Vec<Arc<dyn Agent>>,
    analyzer: HybridAnalyzer,
    llm: Arc<dyn LlmProvider>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        agents: Vec<Arc<dyn Agent>>,
        analyzer: HybridAnalyzer,
        llm: Arc<dyn LlmProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { agents, analyzer, llm, config }
    }

    fn find_agent(&self, name: &str) -> Option<&Arc<dyn Agent>> {
        self.agents.iter().find(|a| a.name() == name)
    }

    /// `run(query, strategy?) → final result` (§4.11 contract).
    pub async fn run(
        &self,
        query: &Query,
        ctx: Arc<AgentContext>,
        strategy: Option<ExecutionStrategy>,
    ) -> Result<AgentResult> {
        if self.agents.is_empty() {
            return Err(OrchestratorError::NoAgents);
        }

        let strategy = strategy.or(query.strategy_hint).unwrap_or(self.config.strategy);
        let candidates = self.analyzer.analyze(query, &self.agents).await;

        tracing::info!(strategy = ?strategy, candidates = candidates.len(), "orchestrator: running turn");

        let result = match strategy {
            ExecutionStrategy::Sequential => self.run_sequential(query, ctx, &candidates).await,
            ExecutionStrategy::Parallel => self.run_parallel(query, ctx, &candidates).await.result,
            ExecutionStrategy::Conditional => self.run_conditional(query, ctx, &candidates, false).await,
            ExecutionStrategy::Hybrid => self.run_conditional(query, ctx, &candidates, true).await,
        };

        Ok(result)
    }

    async fn run_conditional(
        &self,
        query: &Query,
        ctx: Arc<AgentContext>,
        candidates: &[CandidateScore],
        hybrid_fallback: bool,
    ) -> AgentResult {
        if let Some(top) = candidates.first() {
            if top.confidence > self.config.conditional_confidence_threshold {
                let single = std::slice::from_ref(top);
                return self.run_sequential(query, ctx, single).await;
            }
        }

        let outcome = self.run_parallel(query, ctx.clone(), candidates).await;
        if outcome.merge_failed && hybrid_fallback {
            tracing::warn!("hybrid: merge failed, falling back to sequential over the same candidates");
            return self.run_sequential(query, ctx, candidates).await;
        }
        outcome.result
    }

    /// `SEQUENTIAL`: run candidates in order, stop at the first success.
    async fn run_sequential(&self, query: &Query, ctx: Arc<AgentContext>, candidates: &[CandidateScore]) -> AgentResult {
        let mut last_error = AgentResult::failed("orchestrator", AgentErrorKind::Internal("no candidates".to_string()));

        for candidate in candidates {
            let Some(agent) = self.find_agent(&candidate.agent_name) else { continue };
            let result = agent.execute(query, ctx.clone()).await;
            if !result.is_error() {
                return result;
            }
            tracing::warn!(agent = %candidate.agent_name, error = ?result.error, "sequential: agent failed, trying next");
            last_error = result;
        }

        last_error
    }

    /// `PARALLEL`: run up to `max_parallel` candidates concurrently, each
    /// bounded by `per_agent_timeout_s`, then merge.
    async fn run_parallel(&self, query: &Query, ctx: Arc<AgentContext>, candidates: &[CandidateScore]) -> ParallelOutcome {
        let timeout = Duration::from_secs(self.config.per_agent_timeout_s);
        let selected = candidates.iter().take(self.config.max_parallel);

        let tasks = selected.map(|candidate| {
            let ctx = ctx.clone();
            async move {
                match self.find_agent(&candidate.agent_name) {
                    Some(agent) => match tokio::time::timeout(timeout, agent.execute(query, ctx)).await {
                        Ok(result) => result,
                        Err(_) => {
                            tracing::warn!(agent = %candidate.agent_name, "parallel: agent deadline exceeded");
                            AgentResult::failed(candidate.agent_name.clone(), AgentErrorKind::Timeout)
                        }
                    },
                    None => AgentResult::failed(candidate.agent_name.clone(), AgentErrorKind::Internal("unknown agent".to_string())),
                }
            }
        });

        let results = futures::future::join_all(tasks).await;
        self.merge(query, results).await
    }

    /// Result merging (§4.11 "Result merging"): one success returns
    /// verbatim; multiple successes are merged by the LLM; merge failure
    /// falls back to the longest non-error output.
    async fn merge(&self, query: &Query, results: Vec<AgentResult>) -> ParallelOutcome {
        let total_usage = results.iter().fold(sable_core::TokenUsage::default(), |acc, r| acc.combine(&r.usage));
        let used_tools: Vec<String> = results.iter().flat_map(|r| r.used_tools.clone()).collect();
        let successes: Vec<&AgentResult> = results.iter().filter(|r| !r.is_error()).collect();

        if successes.is_empty() {
            let mut result = AgentResult::failed("orchestrator", AgentErrorKind::Internal("all candidate agents failed".to_string()));
            result.usage = total_usage;
            return ParallelOutcome { result, merge_failed: false };
        }

        if successes.len() == 1 {
            let mut result = successes[0].clone();
            result.usage = total_usage;
            result.used_tools = used_tools;
            return ParallelOutcome { result, merge_failed: false };
        }

        let prompt = successes
            .iter()
            .map(|r| format!("## {}\n{}\n", r.agent_name, r.output))
            .collect::<Vec<_>>()
            .join("\n");
        let merge_messages = vec![
            ChatMessage::system(
                "Multiple agents answered the same user request, each under its own heading. Produce one \
                 unified answer that reflects all of them without contradicting any. Do not mention the \
                 agent names.",
            ),
            ChatMessage::user(format!("User asked: {}\n\n{}", query.text, prompt)),
        ];

        match self.llm.chat(&merge_messages, None).await {
            Ok(response) => {
                let mut result = AgentResult::ok("orchestrator", response.message.content);
                result.used_tools = used_tools;
                result.usage = total_usage.combine(&response.usage);
                ParallelOutcome { result, merge_failed: false }
            }
            Err(e) => {
                tracing::warn!(error = %e, "merge: llm call failed, falling back to longest agent output");
                let longest = successes.iter().max_by_key(|r| r.output.len()).unwrap();
                let mut result = (*longest).clone();
                result.usage = total_usage;
                result.used_tools = used_tools;
                ParallelOutcome { result, merge_failed: true }
            }
        }
    }
}
