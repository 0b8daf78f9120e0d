//! Consumed interfaces (§6): the external collaborators the core depends on
//! but does not implement. The UI process supplies concrete
//! implementations (a real LLM provider adapter, the encrypted chat-history
//! store, the MCP process supervisor, the OS key manager); the core only
//! ever sees these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::chat::{ChatMessage, ToolDescriptor};
use crate::error::Result;
use crate::usage::TokenUsage;

/// `chat(messages, tools?) -> (assistant_message, token_usage)`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Identifier used for token-tracking breakdowns and price lookup.
    fn model_name(&self) -> &str;

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDescriptor]>,
    ) -> Result<LlmResponse>;
}

/// One LLM call's reply plus the usage it cost.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub message: ChatMessage,
    pub usage: TokenUsage,
}

/// The encrypted chat-history store. Core treats it as append/list/delete
/// only; persistence and encryption are the UI process's concern.
#[async_trait]
pub trait ChatHistoryStore: Send + Sync {
    async fn append(&self, session_id: &str, message: ChatMessage) -> Result<()>;
    async fn list(&self, session_id: &str) -> Result<Vec<ChatMessage>>;
    async fn delete(&self, session_id: &str) -> Result<()>;
}

/// The MCP tool catalog (§6): `list_tools()` / `invoke(name, args)`. The
/// core never speaks the MCP transport itself — process supervision and
/// protocol framing live entirely in the external implementation.
#[async_trait]
pub trait McpToolCatalog: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;
    async fn invoke(&self, name: &str, args: serde_json::Value) -> Result<String>;
}

/// Supplies the data-at-rest key used by the chunk encryptor. Key
/// management and user authentication live outside the core.
pub trait KeyManager: Send + Sync {
    fn get_data_key(&self) -> Result<Vec<u8>>;
}

/// Abstracts `now()` for timestamps, deadlines, and cache eviction so tests
/// can supply a fixed or stepped clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
