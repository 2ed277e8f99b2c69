use async_trait::async_trait;
use serde_json::Value;
use vigil_core::AgentResult;
use vigil_telemetry::AuditContext;

/// Base contract every specialist agent implements (spec.md §4.6).
/// Agents are stateless across requests, never log on their own
/// account (the gateway and retrieval service already emit audit
/// events for the calls an agent makes through them), never call a
/// model provider directly, and never construct a `Citation` from
/// scratch.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, input: Value, audit: &AuditContext) -> AgentResult;
}
