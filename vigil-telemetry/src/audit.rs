use std::sync::{Arc, Mutex};

use chrono::Utc;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use uuid::Uuid;

use vigil_core::{AuditEvent, AuditOperation};

use crate::sink::AuditSink;

fn secret_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"sk-[A-Za-z0-9]{20,}").expect("static pattern is valid"))
}

/// Per-request correlation and structured-event emitter (spec.md §4.2).
///
/// Constructed once per request via [`AuditContext::create`], handed by
/// value or by `&AuditContext` to every downstream component so they
/// stamp the same `trace_id`/`request_id`. When `platform_enabled` is
/// false, every method is a no-op and [`AuditContext::child_fields`]
/// returns empty identifiers — the audit middleware becomes a pure
/// pass-through.
pub struct AuditContext {
    inner: Option<Inner>,
}

struct Inner {
    trace_id: String,
    request_id: String,
    workflow_id: String,
    tenant_id: String,
    sink: Arc<dyn AuditSink>,
    closed: Mutex<bool>,
}

/// Identity fields stamped on every event a downstream component records
/// against this request, returned by [`AuditContext::child_fields`].
#[derive(Debug, Clone, Default)]
pub struct ChildFields {
    pub trace_id: String,
    pub request_id: String,
    pub workflow_id: String,
    pub tenant_id: String,
}

/// The subset of identity fields safe to echo back in a response body
/// (spec.md §4.2, `get_trace_metadata`).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TraceMetadata {
    pub trace_id: String,
    pub request_id: String,
    pub workflow_id: String,
}

impl AuditContext {
    /// Creates a fresh context. `inbound_trace_id` is adopted only when
    /// it parses as a well-formed UUID; otherwise a fresh UUIDv4 is
    /// generated. When `platform_enabled` is false this still returns a
    /// valid context, but every method on it becomes a no-op.
    pub fn create(
        platform_enabled: bool,
        workflow_id: impl Into<String>,
        tenant_id: Option<String>,
        inbound_trace_id: Option<&str>,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        if !platform_enabled {
            return Self { inner: None };
        }
        let trace_id = inbound_trace_id
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4)
            .to_string();
        let request_id = Uuid::new_v4().to_string();
        Self {
            inner: Some(Inner {
                trace_id,
                request_id,
                workflow_id: workflow_id.into(),
                tenant_id: tenant_id.unwrap_or_else(|| "default".to_string()),
                sink,
                closed: Mutex::new(false),
            }),
        }
    }

    /// Appends a structured event to the sink. Never raises: malformed
    /// field values are coerced to strings and a `sanitized=true` flag
    /// is added to the event; any value matching a credential-token
    /// pattern is replaced with a redaction marker regardless of the
    /// `sanitized` outcome, since that invariant is unconditional
    /// (spec.md §8).
    pub fn record(
        &self,
        operation: AuditOperation,
        success: bool,
        latency_ms: f64,
        fields: impl IntoIterator<Item = (&'static str, Value)>,
    ) {
        let Some(inner) = &self.inner else { return };

        let mut map = Map::new();
        let mut sanitized = false;
        for (key, value) in fields {
            let (value, was_sanitized) = sanitize_value(value);
            sanitized |= was_sanitized;
            map.insert(key.to_string(), value);
        }
        if sanitized {
            map.insert("sanitized".to_string(), Value::Bool(true));
        }

        let event = AuditEvent {
            timestamp: Utc::now(),
            trace_id: inner.trace_id.clone(),
            request_id: inner.request_id.clone(),
            workflow_id: inner.workflow_id.clone(),
            tenant_id: inner.tenant_id.clone(),
            operation,
            latency_ms,
            success,
            fields: map,
        };

        // Unbuffered by default (spec.md §9): write through immediately
        // rather than accumulate for a later flush.
        let _ = inner.sink.write_line(&event.to_line());
    }

    /// Identifiers downstream components stamp on their own events.
    /// Empty when the platform is disabled.
    pub fn child_fields(&self) -> ChildFields {
        match &self.inner {
            Some(inner) => ChildFields {
                trace_id: inner.trace_id.clone(),
                request_id: inner.request_id.clone(),
                workflow_id: inner.workflow_id.clone(),
                tenant_id: inner.tenant_id.clone(),
            },
            None => ChildFields::default(),
        }
    }

    /// Trace metadata suitable for optional response echoing.
    pub fn get_trace_metadata(&self) -> TraceMetadata {
        match &self.inner {
            Some(inner) => TraceMetadata {
                trace_id: inner.trace_id.clone(),
                request_id: inner.request_id.clone(),
                workflow_id: inner.workflow_id.clone(),
            },
            None => TraceMetadata::default(),
        }
    }

    /// Flushes any buffered events to the sink. Idempotent: calling
    /// this more than once, or after `platform_enabled=false`, is safe.
    /// Since `record` writes through immediately there is nothing left
    /// to flush; this marks the context closed so a future buffering
    /// sink implementation has a defined flush point.
    pub fn close(&self) {
        if let Some(inner) = &self.inner {
            let mut closed = inner.closed.lock().unwrap_or_else(|p| p.into_inner());
            *closed = true;
        }
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.inner.as_ref().map(|i| i.trace_id.as_str())
    }

    pub fn request_id(&self) -> Option<&str> {
        self.inner.as_ref().map(|i| i.request_id.as_str())
    }
}

fn sanitize_value(value: Value) -> (Value, bool) {
    match value {
        Value::String(s) => {
            if secret_pattern().is_match(&s) {
                (Value::String("[REDACTED]".to_string()), true)
            } else {
                (Value::String(s), false)
            }
        }
        other => (other, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::StdoutSink;
    use std::sync::Arc;

    fn sink() -> Arc<dyn AuditSink> {
        Arc::new(StdoutSink::new())
    }

    #[test]
    fn create_generates_trace_id_when_none_inherited() {
        let ctx = AuditContext::create(true, "wf", None, None, sink());
        assert!(Uuid::parse_str(ctx.trace_id().unwrap()).is_ok());
        assert!(Uuid::parse_str(ctx.request_id().unwrap()).is_ok());
    }

    #[test]
    fn create_adopts_well_formed_inbound_trace_id() {
        let inbound = Uuid::new_v4().to_string();
        let ctx = AuditContext::create(true, "wf", None, Some(&inbound), sink());
        assert_eq!(ctx.trace_id().unwrap(), inbound);
    }

    #[test]
    fn create_ignores_malformed_inbound_trace_id() {
        let ctx = AuditContext::create(true, "wf", None, Some("not-a-uuid"), sink());
        assert_ne!(ctx.trace_id().unwrap(), "not-a-uuid");
    }

    #[test]
    fn disabled_platform_yields_empty_child_fields() {
        let ctx = AuditContext::create(false, "wf", None, None, sink());
        let fields = ctx.child_fields();
        assert!(fields.trace_id.is_empty());
        assert!(ctx.trace_id().is_none());
    }

    #[test]
    fn default_tenant_is_default() {
        let ctx = AuditContext::create(true, "wf", None, None, sink());
        assert_eq!(ctx.child_fields().tenant_id, "default");
    }

    #[test]
    fn record_redacts_credential_shaped_strings() {
        let ctx = AuditContext::create(true, "wf", None, None, sink());
        // Exercises the redaction path; does not assert on stdout content,
        // only that recording a secret-shaped value never panics.
        ctx.record(
            AuditOperation::LlmCall,
            true,
            1.0,
            [("note", Value::String("sk-abcdefghijklmnopqrstuvwxyz".to_string()))],
        );
    }

    #[test]
    fn close_is_idempotent() {
        let ctx = AuditContext::create(true, "wf", None, None, sink());
        ctx.close();
        ctx.close();
    }
}
