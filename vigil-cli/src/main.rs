use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use vigil_agent::{ColumnDescriptor, MockAnalyticsStore, SchemaDescriptor, SemanticType};
use vigil_core::Config;
use vigil_model::{Llm, MockLlm, ModelGateway};
use vigil_orchestrator::Orchestrator;
use vigil_retrieval::{InMemoryVectorIndex, RetrievalService};
use vigil_telemetry::{build_sink, init_tracing};

const USAGE: &str = "Usage: vigil <query...>\n\n\
Drives a single request through the orchestrator and prints the response \
envelope as JSON. Requires OPENAI_API_KEY in the environment per the \
platform's fail-fast startup contract, even when built without the \
`openai` feature (in which case a local mock provider answers in its place).";

fn fixture_row(event_id: &str, risk_level: &str, minutes_since_event: f64) -> Map<String, Value> {
    let mut row = Map::new();
    row.insert("event_id".to_string(), json!(event_id));
    row.insert("county".to_string(), json!("king"));
    row.insert("channel".to_string(), json!("web"));
    row.insert("risk_level".to_string(), json!(risk_level));
    row.insert("minutes_since_event".to_string(), json!(minutes_since_event));
    row.insert("suicidal_ideation".to_string(), json!(false));
    row.insert("homicidal_ideation".to_string(), json!(false));
    row.insert("substance_use".to_string(), json!(false));
    row
}

fn schema() -> SchemaDescriptor {
    SchemaDescriptor::new(
        "events",
        vec![
            ColumnDescriptor::new("event_id", SemanticType::Id),
            ColumnDescriptor::new("county", SemanticType::Categorical),
            ColumnDescriptor::new("channel", SemanticType::Categorical),
            ColumnDescriptor::new("risk_level", SemanticType::Categorical),
            ColumnDescriptor::new("event_time_ms", SemanticType::TimestampMs),
        ],
    )
}

#[cfg(feature = "openai")]
fn build_provider(config: &Config) -> Arc<dyn Llm> {
    Arc::new(vigil_model::providers::openai::OpenAiProvider::new(
        &config.openai_api_key,
        &config.model_name,
        &config.embed_model_name,
    ))
}

#[cfg(not(feature = "openai"))]
fn build_provider(_config: &Config) -> Arc<dyn Llm> {
    Arc::new(MockLlm::new(r#"{"answer": "no model provider configured; this is a mock response"}"#))
}

/// Smoke-test entry point, analogous to the ancestor's own binary entry
/// points: initialize tracing once, build every process-wide singleton,
/// then drive exactly one request and print the result.
#[tokio::main]
async fn main() -> ExitCode {
    init_tracing("info");

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    }
    let query = args.join(" ");

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(err) => {
            eprintln!("startup failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    let sink = match build_sink(&config.audit_sink) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("failed to open audit sink: {err}");
            return ExitCode::FAILURE;
        }
    };

    let gateway = Arc::new(ModelGateway::new(build_provider(&config), &config));
    let index = Arc::new(InMemoryVectorIndex::new());
    let retrieval = Arc::new(RetrievalService::new(index, gateway.clone(), &config));
    let store = Arc::new(MockAnalyticsStore::new(vec![
        fixture_row("evt-1", "imminent", 3.0),
        fixture_row("evt-2", "high", 45.0),
    ]));

    let orchestrator = Orchestrator::new(gateway, retrieval, store, schema(), sink, &config);

    let envelope = orchestrator.process_request(&query, "cli", None, None).await;
    let rendered = serde_json::to_string_pretty(&envelope).expect("ResponseEnvelope always serializes");
    println!("{rendered}");

    if envelope.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
