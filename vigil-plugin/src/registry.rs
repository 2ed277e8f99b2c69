use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use vigil_core::FeatureFlags;
use vigil_orchestrator::{Orchestrator, ResponseEnvelope};
use vigil_telemetry::AuditContext;
use vigil_telemetry::AuditSink;

use crate::error::PluginError;

/// Identity and advertised surface of a registered plugin (spec.md
/// §4.8, §6). Uniqueness within a registry is enforced on `name`.
#[derive(Debug, Clone)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    pub use_case: String,
    pub keywords: Vec<String>,
    pub capabilities: Vec<String>,
    pub required_data_sources: Vec<String>,
}

/// An optional use-case specialization sitting above the orchestrator
/// (spec.md §4.8). Plugins are illustrative of the pluggability
/// contract, not part of the core; the registry here specifies the
/// trait only.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> &PluginMetadata;

    /// Confidence in `[0.0, 1.0]` that this plugin should handle `query`.
    async fn can_handle(&self, query: &str, context: &Value) -> f64;

    async fn execute(&self, query: &str, context: &Value, audit: &AuditContext) -> ResponseEnvelope;

    /// Example queries this plugin is meant to handle, surfaced for
    /// discovery tooling.
    fn examples(&self) -> Vec<String>;
}

/// The minimum confidence a plugin's `can_handle` score must clear
/// before the registry routes to it rather than falling through to
/// the base [`Orchestrator`] (spec.md §4.8).
pub const CONFIDENCE_THRESHOLD: f64 = 0.3;

/// A pure dispatcher holding no state beyond the registered plugin set
/// (spec.md §4.8). Evaluates every plugin's `can_handle` and routes to
/// the highest-confidence one, or falls through to the orchestrator.
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
    sink: Arc<dyn AuditSink>,
    flags: FeatureFlags,
}

impl PluginRegistry {
    pub fn new(sink: Arc<dyn AuditSink>, flags: FeatureFlags) -> Self {
        Self { plugins: Vec::new(), sink, flags }
    }

    /// Registers a plugin, rejecting a duplicate `name`.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), PluginError> {
        let name = &plugin.metadata().name;
        if self.plugins.iter().any(|p| &p.metadata().name == name) {
            return Err(PluginError::DuplicateName(name.clone()));
        }
        self.plugins.push(plugin);
        Ok(())
    }

    /// Routes `query` to the highest-scoring registered plugin, or to
    /// `orchestrator.process_request` when no plugin clears
    /// [`CONFIDENCE_THRESHOLD`] (spec.md §4.8).
    pub async fn route(
        &self,
        query: &str,
        context: &Value,
        orchestrator: &Orchestrator,
        workflow_id: &str,
        tenant_id: Option<String>,
        inbound_trace_id: Option<&str>,
    ) -> ResponseEnvelope {
        let mut best: Option<(&Arc<dyn Plugin>, f64)> = None;
        for plugin in &self.plugins {
            let confidence = plugin.can_handle(query, context).await.clamp(0.0, 1.0);
            if best.as_ref().is_none_or(|(_, b)| confidence > *b) {
                best = Some((plugin, confidence));
            }
        }

        match best {
            Some((plugin, confidence)) if confidence >= CONFIDENCE_THRESHOLD => {
                let audit = AuditContext::create(
                    self.flags.platform_enabled,
                    workflow_id,
                    tenant_id,
                    inbound_trace_id,
                    self.sink.clone(),
                );
                let response = plugin.execute(query, context, &audit).await;
                audit.close();
                response
            }
            _ => orchestrator.process_request(query, workflow_id, tenant_id, inbound_trace_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use vigil_agent::{ColumnDescriptor, MockAnalyticsStore, SchemaDescriptor, SemanticType};
    use vigil_model::{ModelGateway, MockLlm};
    use vigil_retrieval::{InMemoryVectorIndex, RetrievalService};
    use vigil_telemetry::StdoutSink;

    struct EchoPlugin {
        metadata: PluginMetadata,
        confidence: f64,
    }

    #[async_trait]
    impl Plugin for EchoPlugin {
        fn metadata(&self) -> &PluginMetadata {
            &self.metadata
        }

        async fn can_handle(&self, _query: &str, _context: &Value) -> f64 {
            self.confidence
        }

        async fn execute(&self, query: &str, _context: &Value, _audit: &AuditContext) -> ResponseEnvelope {
            ResponseEnvelope {
                success: true,
                answer_text: Some(format!("handled by {}: {query}", self.metadata.name)),
                data: None,
                sources: Vec::new(),
                used_agents: vec![self.metadata.name.clone()],
                partial: false,
                error: None,
                trace: None,
            }
        }

        fn examples(&self) -> Vec<String> {
            vec!["example query".to_string()]
        }
    }

    fn metadata(name: &str) -> PluginMetadata {
        PluginMetadata {
            name: name.to_string(),
            version: "0.1.0".to_string(),
            use_case: "policy lookups".to_string(),
            keywords: vec!["policy".to_string()],
            capabilities: vec!["qa".to_string()],
            required_data_sources: Vec::new(),
        }
    }

    fn orchestrator() -> Orchestrator {
        let config = vigil_core::Config::for_tests();
        let gateway = Arc::new(ModelGateway::new(Arc::new(MockLlm::new(r#"{"answer": "unused"}"#)), &config));
        let index = Arc::new(InMemoryVectorIndex::new());
        let retrieval = Arc::new(RetrievalService::new(index, gateway.clone(), &config));
        let store = Arc::new(MockAnalyticsStore::new(vec![serde_json::Map::new()]));
        let schema = SchemaDescriptor::new("events", vec![ColumnDescriptor::new("event_id", SemanticType::Id)]);
        Orchestrator::new(gateway, retrieval, store, schema, Arc::new(StdoutSink::new()), &config)
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut registry = PluginRegistry::new(Arc::new(StdoutSink::new()), FeatureFlags::default());
        registry.register(Arc::new(EchoPlugin { metadata: metadata("policy"), confidence: 0.9 })).unwrap();
        let err = registry.register(Arc::new(EchoPlugin { metadata: metadata("policy"), confidence: 0.1 })).unwrap_err();
        assert_eq!(err, PluginError::DuplicateName("policy".to_string()));
    }

    #[tokio::test]
    async fn routes_to_highest_confidence_plugin_above_threshold() {
        let mut registry = PluginRegistry::new(Arc::new(StdoutSink::new()), FeatureFlags::default());
        registry.register(Arc::new(EchoPlugin { metadata: metadata("low"), confidence: 0.2 })).unwrap();
        registry.register(Arc::new(EchoPlugin { metadata: metadata("high"), confidence: 0.8 })).unwrap();
        let response = registry.route("hello", &json!({}), &orchestrator(), "wf", None, None).await;
        assert_eq!(response.used_agents, vec!["high".to_string()]);
    }

    #[tokio::test]
    async fn falls_through_to_orchestrator_below_threshold() {
        let mut registry = PluginRegistry::new(Arc::new(StdoutSink::new()), FeatureFlags::default());
        registry.register(Arc::new(EchoPlugin { metadata: metadata("unsure"), confidence: 0.1 })).unwrap();
        let response = registry.route("what is the protocol?", &json!({}), &orchestrator(), "wf", None, None).await;
        assert!(!response.used_agents.contains(&"unsure".to_string()));
    }

    #[tokio::test]
    async fn empty_registry_always_falls_through() {
        let registry = PluginRegistry::new(Arc::new(StdoutSink::new()), FeatureFlags::default());
        let response = registry.route("what is the protocol?", &json!({}), &orchestrator(), "wf", None, None).await;
        assert!(response.success);
    }
}
