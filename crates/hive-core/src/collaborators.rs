//! Collaborator contracts (spec §6.2). These are external to the runtime
//! core — only the trait shapes live here; concrete model/tool/memory
//! backends are out of scope (spec.md §1 "Out of scope").

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Diagnostics sink. Never load-bearing for determinism — two runs may log
/// differently and still be conformant.
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str, metadata: &Value);
    fn info(&self, message: &str, metadata: &Value);
    fn error(&self, message: &str, metadata: &Value);
}

/// Forwards to `tracing::debug!`/`info!`/`error!`.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str, metadata: &Value) {
        tracing::debug!(%metadata, "{message}");
    }

    fn info(&self, message: &str, metadata: &Value) {
        tracing::info!(%metadata, "{message}");
    }

    fn error(&self, message: &str, metadata: &Value) {
        tracing::error!(%metadata, "{message}");
    }
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub prompt: Value,
}

#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub output: Value,
}

#[derive(Debug, Clone)]
pub enum ModelStreamChunk {
    Token(String),
    Final(ModelResponse),
}

/// Optional for the runtime core; used by higher layers (spec.md §1 "Out of
/// scope: model-client ... adapters"). A streaming violation (missing or
/// non-terminal `Final`) surfaces as `ModelStreamInvalid`.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse>;
    async fn stream(&self, request: ModelRequest) -> Result<Vec<ModelStreamChunk>>;
}

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub output: Value,
}

#[async_trait]
pub trait ToolRegistry: Send + Sync {
    fn list_tools(&self) -> Vec<ToolDefinition>;
    async fn invoke(&self, call: ToolCall) -> Result<ToolResult>;
}

/// Does not affect scheduler determinism (spec §6.2).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn remember(&self, key: String, value: Value) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn recall(&self, query: &str, limit: usize) -> Result<Vec<Value>>;
}
