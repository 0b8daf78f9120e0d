//! Token Tracker (C16, §4.13): in-memory aggregates authoritative during a
//! conversation, three sqlx-backed relations authoritative across
//! sessions, persisted best-effort so a DB hiccup never fails a turn.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use sable_core::{TokenSink, TokenUsageEvent, TokensConfig};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::error::Result;
use crate::price::PriceTable;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelAgentTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

impl ModelAgentTotals {
    fn add(&mut self, input_tokens: u32, output_tokens: u32, cost_usd: f64) {
        self.input_tokens += input_tokens as u64;
        self.output_tokens += output_tokens as u64;
        self.cost_usd += cost_usd;
    }
}

#[derive(Debug, Clone, Default, Serialize)]
struct SessionAggregate {
    input_tokens: u64,
    output_tokens: u64,
    cost_usd: f64,
    by_model: HashMap<String, ModelAgentTotals>,
    by_agent: HashMap<String, ModelAgentTotals>,
    by_mode: HashMap<String, ModelAgentTotals>,
}

/// Totals returned by [`TokenTracker::end_conversation`]; available by
/// model, agent, and mode (§4.13 "any subset of (session, mode, model,
/// agent, date)").
#[derive(Debug, Clone, Serialize)]
pub struct SessionTotals {
    pub session_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub by_model: HashMap<String, ModelAgentTotals>,
    pub by_agent: HashMap<String, ModelAgentTotals>,
    pub by_mode: HashMap<String, ModelAgentTotals>,
}

/// Aggregate over a date range, queried from `global_token_stats`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct GlobalStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

/// A handle opened for one turn (§4.13 contract: `start_conversation` /
/// `record` / `end_conversation`). Implements [`TokenSink`] so it can be
/// handed to `AgentContext` directly; every agent invoked during the turn
/// records against the same handle (Open Question D2).
pub struct ConversationHandle {
    session_id: String,
    message_id: String,
    tracker: Arc<TokenTracker>,
}

impl ConversationHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }
}

impl TokenSink for ConversationHandle {
    fn record(&self, event: TokenUsageEvent) {
        self.tracker.record_event(&self.session_id, &self.message_id, event);
    }
}

pub struct TokenTracker {
    pool: SqlitePool,
    prices: PriceTable,
    sessions: Mutex<HashMap<String, SessionAggregate>>,
}

impl TokenTracker {
    pub fn new(pool: SqlitePool, config: &TokensConfig) -> Self {
        Self { pool, prices: PriceTable::from_config(config), sessions: Mutex::new(HashMap::new()) }
    }

    /// Create the three token-tracking relations if they do not exist.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS token_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                model TEXT NOT NULL,
                agent TEXT,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                cost_usd REAL NOT NULL,
                duration_ms INTEGER NOT NULL,
                tools TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS session_token_summary (
                session_id TEXT PRIMARY KEY,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                cost_usd REAL NOT NULL,
                breakdown_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS global_token_stats (
                stat_date TEXT PRIMARY KEY,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                cost_usd REAL NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Open a handle for one turn. Requires `Arc<Self>` since the handle
    /// outlives the call and records against the tracker asynchronously.
    pub fn start_conversation(
        self: &Arc<Self>,
        session_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> ConversationHandle {
        ConversationHandle { session_id: session_id.into(), message_id: message_id.into(), tracker: self.clone() }
    }

    /// Close out a conversation: snapshot its in-memory totals and drop
    /// them from the authoritative-during-conversation map. The DB rows
    /// already written remain the cross-session record.
    pub fn end_conversation(&self, handle: &ConversationHandle) -> SessionTotals {
        let aggregate = self.sessions.lock().remove(&handle.session_id).unwrap_or_default();
        SessionTotals {
            session_id: handle.session_id.clone(),
            input_tokens: aggregate.input_tokens,
            output_tokens: aggregate.output_tokens,
            cost_usd: aggregate.cost_usd,
            by_model: aggregate.by_model,
            by_agent: aggregate.by_agent,
            by_mode: aggregate.by_mode,
        }
    }

    /// Aggregate across every session for `[from, to]`, inclusive.
    pub async fn token_stats(&self, from: NaiveDate, to: NaiveDate) -> Result<GlobalStats> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(input_tokens), 0) AS input_tokens,
                    COALESCE(SUM(output_tokens), 0) AS output_tokens,
                    COALESCE(SUM(cost_usd), 0.0) AS cost_usd
             FROM global_token_stats WHERE stat_date >= ? AND stat_date <= ?",
        )
        .bind(from.to_string())
        .bind(to.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(GlobalStats {
            input_tokens: row.try_get::<i64, _>("input_tokens")? as u64,
            output_tokens: row.try_get::<i64, _>("output_tokens")? as u64,
            cost_usd: row.try_get("cost_usd")?,
        })
    }

    /// Snapshot of a live session's totals without closing it, for UI
    /// polling mid-conversation.
    pub fn session_snapshot(&self, session_id: &str) -> Option<SessionTotals> {
        self.sessions.lock().get(session_id).map(|a| SessionTotals {
            session_id: session_id.to_string(),
            input_tokens: a.input_tokens,
            output_tokens: a.output_tokens,
            cost_usd: a.cost_usd,
            by_model: a.by_model.clone(),
            by_agent: a.by_agent.clone(),
            by_mode: a.by_mode.clone(),
        })
    }

    fn record_event(&self, session_id: &str, message_id: &str, event: TokenUsageEvent) {
        let cost = match self.prices.cost(&event.model, event.input_tokens, event.output_tokens) {
            Some(c) => c,
            None => {
                tracing::warn!(model = %event.model, "token tracker: unrecognized model, recording zero cost");
                0.0
            }
        };

        let snapshot = {
            let mut sessions = self.sessions.lock();
            let aggregate = sessions.entry(session_id.to_string()).or_default();
            aggregate.input_tokens += event.input_tokens as u64;
            aggregate.output_tokens += event.output_tokens as u64;
            aggregate.cost_usd += cost;
            aggregate.by_model.entry(event.model.clone()).or_default().add(event.input_tokens, event.output_tokens, cost);
            if let Some(agent) = &event.agent {
                aggregate.by_agent.entry(agent.clone()).or_default().add(event.input_tokens, event.output_tokens, cost);
            }
            if let Some(mode) = &event.mode {
                aggregate.by_mode.entry(mode.clone()).or_default().add(event.input_tokens, event.output_tokens, cost);
            }
            aggregate.clone()
        };

        self.persist_best_effort(session_id.to_string(), message_id.to_string(), event, cost, snapshot);
    }

    /// Writes are best-effort and asynchronous (§4.13 "Persistence"): a
    /// failure here is logged, never surfaced to the caller of `record`.
    fn persist_best_effort(
        &self,
        session_id: String,
        message_id: String,
        event: TokenUsageEvent,
        cost: f64,
        snapshot: SessionAggregate,
    ) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(e) = persist(&pool, &session_id, &message_id, &event, cost, &snapshot).await {
                tracing::warn!(error = %e, session_id = %session_id, "token tracker: best-effort persistence failed");
            }
        });
    }
}

async fn persist(
    pool: &SqlitePool,
    session_id: &str,
    message_id: &str,
    event: &TokenUsageEvent,
    cost: f64,
    snapshot: &SessionAggregate,
) -> Result<()> {
    let tools_json = serde_json::to_string(&event.tools)?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO token_usage
            (session_id, message_id, model, agent, input_tokens, output_tokens, cost_usd, duration_ms, tools, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(session_id)
    .bind(message_id)
    .bind(&event.model)
    .bind(event.agent.as_deref())
    .bind(event.input_tokens as i64)
    .bind(event.output_tokens as i64)
    .bind(cost)
    .bind(event.duration.as_millis() as i64)
    .bind(&tools_json)
    .bind(&now)
    .execute(pool)
    .await?;

    let breakdown_json = serde_json::to_string(&SessionBreakdown {
        by_model: &snapshot.by_model,
        by_agent: &snapshot.by_agent,
        by_mode: &snapshot.by_mode,
    })?;
    sqlx::query(
        "INSERT INTO session_token_summary (session_id, input_tokens, output_tokens, cost_usd, breakdown_json, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(session_id) DO UPDATE SET
            input_tokens = excluded.input_tokens,
            output_tokens = excluded.output_tokens,
            cost_usd = excluded.cost_usd,
            breakdown_json = excluded.breakdown_json,
            updated_at = excluded.updated_at",
    )
    .bind(session_id)
    .bind(snapshot.input_tokens as i64)
    .bind(snapshot.output_tokens as i64)
    .bind(snapshot.cost_usd)
    .bind(&breakdown_json)
    .bind(&now)
    .execute(pool)
    .await?;

    let today = Utc::now().date_naive().to_string();
    sqlx::query(
        "INSERT INTO global_token_stats (stat_date, input_tokens, output_tokens, cost_usd, updated_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(stat_date) DO UPDATE SET
            input_tokens = input_tokens + excluded.input_tokens,
            output_tokens = output_tokens + excluded.output_tokens,
            cost_usd = cost_usd + excluded.cost_usd,
            updated_at = excluded.updated_at",
    )
    .bind(today)
    .bind(event.input_tokens as i64)
    .bind(event.output_tokens as i64)
    .bind(cost)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(Serialize)]
struct SessionBreakdown<'a> {
    by_model: &'a HashMap<String, ModelAgentTotals>,
    by_agent: &'a HashMap<String, ModelAgentTotals>,
    by_mode: &'a HashMap<String, ModelAgentTotals>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::time::Duration;

    async fn memory_tracker() -> Arc<TokenTracker> {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let tracker = Arc::new(TokenTracker::new(pool, &TokensConfig::default()));
        tracker.migrate().await.unwrap();
        tracker
    }

    fn usage_event(model: &str, agent: Option<&str>, input: u32, output: u32) -> TokenUsageEvent {
        usage_event_with_mode(model, agent, None, input, output)
    }

    fn usage_event_with_mode(
        model: &str,
        agent: Option<&str>,
        mode: Option<&str>,
        input: u32,
        output: u32,
    ) -> TokenUsageEvent {
        TokenUsageEvent {
            model: model.to_string(),
            agent: agent.map(|a| a.to_string()),
            mode: mode.map(|m| m.to_string()),
            input_tokens: input,
            output_tokens: output,
            duration: Duration::from_millis(50),
            tools: vec![],
            extra: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn in_memory_totals_accumulate_across_records() {
        let tracker = memory_tracker().await;
        let handle = tracker.start_conversation("session-1", "msg-1");
        handle.record(usage_event("gpt-4o-mini", Some("rag"), 100, 50));
        handle.record(usage_event("gpt-4o-mini", Some("rag"), 200, 75));

        let totals = tracker.end_conversation(&handle);
        assert_eq!(totals.input_tokens, 300);
        assert_eq!(totals.output_tokens, 125);
        assert_eq!(totals.by_agent.get("rag").unwrap().input_tokens, 300);
        assert!(totals.cost_usd > 0.0);
    }

    #[tokio::test]
    async fn ending_a_conversation_clears_its_live_snapshot() {
        let tracker = memory_tracker().await;
        let handle = tracker.start_conversation("session-1", "msg-1");
        handle.record(usage_event("gpt-4o", None, 10, 10));
        tracker.end_conversation(&handle);

        assert!(tracker.session_snapshot("session-1").is_none());
    }

    #[tokio::test]
    async fn record_persists_a_detail_row_best_effort() {
        let tracker = memory_tracker().await;
        let handle = tracker.start_conversation("session-1", "msg-1");
        handle.record(usage_event("gpt-4o", Some("mcp"), 10, 20));

        tokio::time::sleep(Duration::from_millis(50)).await;

        let row = sqlx::query("SELECT COUNT(*) AS n FROM token_usage WHERE session_id = ?")
            .bind("session-1")
            .fetch_one(&tracker.pool)
            .await
            .unwrap();
        let count: i64 = row.try_get("n").unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn totals_break_down_by_mode() {
        let tracker = memory_tracker().await;
        let handle = tracker.start_conversation("session-1", "msg-1");
        handle.record(usage_event_with_mode("gpt-4o-mini", Some("rag"), Some("rag"), 100, 50));
        handle.record(usage_event_with_mode("gpt-4o-mini", None, Some("simple"), 20, 10));

        let totals = tracker.end_conversation(&handle);
        assert_eq!(totals.by_mode.get("rag").unwrap().input_tokens, 100);
        assert_eq!(totals.by_mode.get("simple").unwrap().input_tokens, 20);
    }

    #[tokio::test]
    async fn unknown_model_records_zero_cost_without_failing() {
        let tracker = memory_tracker().await;
        let handle = tracker.start_conversation("session-1", "msg-1");
        handle.record(usage_event("some-unreleased-model", None, 1000, 1000));

        let totals = tracker.end_conversation(&handle);
        assert_eq!(totals.cost_usd, 0.0);
        assert_eq!(totals.input_tokens, 1000);
    }
}
