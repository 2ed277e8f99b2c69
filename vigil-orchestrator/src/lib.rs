mod classify;
mod envelope;
mod orchestrator;

pub use classify::{classify_intent, Classification, IntentLabel, CONFIDENCE_FLOOR};
pub use envelope::ResponseEnvelope;
pub use orchestrator::Orchestrator;
