pub mod analytics;
pub mod knowledge;
pub mod query;
pub mod recommendations;
pub mod triage;

pub use analytics::AnalyticsAgent;
pub use knowledge::KnowledgeAgent;
pub use query::QueryAgent;
pub use recommendations::RecommendationsAgent;
pub use triage::TriageAgent;
