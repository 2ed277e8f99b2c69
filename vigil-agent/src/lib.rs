mod agent;
pub mod agents;
pub mod analytics_store;
pub mod error;

pub use agent::Agent;
pub use agents::{AnalyticsAgent, KnowledgeAgent, QueryAgent, RecommendationsAgent, TriageAgent};
pub use analytics_store::{AnalyticsStore, ColumnDescriptor, MockAnalyticsStore, SchemaDescriptor, SemanticType};
