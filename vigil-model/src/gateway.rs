use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use vigil_core::{AuditOperation, Config};
use vigil_telemetry::AuditContext;

use crate::circuit::CircuitBreaker;
use crate::error::{GatewayError, ProviderError};
use crate::provider::{Llm, Prompt};
use crate::retry::{backoff_delay, should_retry};

/// Per-call overrides to the gateway's configured defaults.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub timeout_s: Option<f64>,
}

/// The single chokepoint for LLM completion and embedding calls
/// (spec.md §4.3). Owns a [`CircuitBreaker`] keyed by model name and is
/// meant to be constructed once at process start and shared as a
/// process-wide singleton (spec.md §9).
pub struct ModelGateway {
    provider: Arc<dyn Llm>,
    circuit: CircuitBreaker,
    flags: vigil_core::FeatureFlags,
    default_timeout_s: f64,
    max_retries: u32,
    retry_base_delay_s: f64,
    retry_max_delay_s: f64,
    retry_jitter: f64,
    default_model: String,
}

enum SubOperation {
    Invoke,
    Embed,
}

impl SubOperation {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Invoke => "invoke",
            Self::Embed => "embed",
        }
    }
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn Llm>, config: &Config) -> Self {
        Self {
            provider,
            circuit: CircuitBreaker::new(
                config.cb_threshold,
                Duration::from_secs_f64(config.cb_recovery_s),
                config.cb_half_open_max,
            ),
            flags: config.flags,
            default_timeout_s: config.default_timeout_s,
            max_retries: config.max_retries,
            retry_base_delay_s: config.retry_base_delay_s,
            retry_max_delay_s: config.retry_max_delay_s,
            retry_jitter: config.retry_jitter,
            default_model: config.model_name.clone(),
        }
    }

    /// spec.md §4.3 `invoke`: returns the provider's textual completion
    /// unchanged on success; raises one of the closed `GatewayError`
    /// variants on failure. Emits exactly one `llm_call` audit event.
    pub async fn invoke(
        &self,
        prompt: impl Into<Prompt>,
        opts: InvokeOptions,
        audit: &AuditContext,
        audit_log_prompts: bool,
        audit_log_responses: bool,
    ) -> Result<String, GatewayError> {
        let prompt = prompt.into();
        let temperature = opts.temperature.unwrap_or(0.7);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(GatewayError::InvalidInput(format!(
                "temperature {temperature} out of range [0.0, 2.0]"
            )));
        }
        let timeout_s = opts.timeout_s.unwrap_or(self.default_timeout_s);
        if timeout_s <= 0.0 {
            return Err(GatewayError::InvalidInput("timeout_s must be > 0".into()));
        }
        let model = opts.model.unwrap_or_else(|| self.default_model.clone());
        let prompt_len = prompt.char_len();
        let prompt_for_log = prompt.as_log_string();

        let start = Instant::now();
        let (outcome, attempts) = self
            .run_with_reliability(&model, timeout_s, move |provider, deadline| {
                let prompt = prompt.clone_for_retry();
                async move {
                    match deadline {
                        Some(d) => tokio::time::timeout(d, provider.complete(&prompt, temperature))
                            .await
                            .map_err(|_| ProviderError::Timeout("invoke deadline exceeded".into()))
                            .and_then(|r| r),
                        None => provider.complete(&prompt, temperature).await,
                    }
                }
            })
            .await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let response_len = outcome.as_ref().ok().map(|s: &String| s.chars().count()).unwrap_or(0);
        let tokens_estimate = ((prompt_len + response_len) / 4).max(1) as u64;

        let mut fields: Vec<(&'static str, serde_json::Value)> = vec![
            ("model", json!(model)),
            ("sub_operation", json!(SubOperation::Invoke.as_str())),
            ("tokens_estimate", json!(tokens_estimate)),
            ("retries", json!(attempts.saturating_sub(1))),
            ("prompt_length", json!(prompt_len)),
            ("response_length", json!(response_len)),
        ];
        if let Err(err) = &outcome {
            fields.push(("error_type", json!(error_type_name(err))));
        }
        if audit_log_prompts {
            fields.push(("prompt", json!(prompt_for_log)));
        }
        if audit_log_responses {
            if let Ok(text) = &outcome {
                fields.push(("response", json!(text)));
            }
        }
        audit.record(AuditOperation::LlmCall, outcome.is_ok(), latency_ms, fields);

        outcome
    }

    /// spec.md §4.3 `embed`: same reliability wrapping as `invoke`.
    pub async fn embed(
        &self,
        texts: Vec<String>,
        model: Option<String>,
        audit: &AuditContext,
    ) -> Result<Vec<Vec<f32>>, GatewayError> {
        let model = model.unwrap_or_else(|| self.default_model.clone());
        let timeout_s = self.default_timeout_s;
        let prompt_len: usize = texts.iter().map(|t| t.chars().count()).sum();

        let start = Instant::now();
        let (outcome, attempts) = self
            .run_with_reliability(&model, timeout_s, move |provider, deadline| {
                let texts = texts.clone();
                async move {
                    match deadline {
                        Some(d) => tokio::time::timeout(d, provider.embed(&texts))
                            .await
                            .map_err(|_| ProviderError::Timeout("embed deadline exceeded".into()))
                            .and_then(|r| r),
                        None => provider.embed(&texts).await,
                    }
                }
            })
            .await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let response_len = outcome.as_ref().map(|v| v.len()).unwrap_or(0);
        let tokens_estimate = ((prompt_len + response_len) / 4).max(1) as u64;

        let mut fields: Vec<(&'static str, serde_json::Value)> = vec![
            ("model", json!(model)),
            ("sub_operation", json!(SubOperation::Embed.as_str())),
            ("tokens_estimate", json!(tokens_estimate)),
            ("retries", json!(attempts.saturating_sub(1))),
            ("prompt_length", json!(prompt_len)),
            ("response_length", json!(response_len)),
        ];
        if let Err(err) = &outcome {
            fields.push(("error_type", json!(error_type_name(err))));
        }
        audit.record(AuditOperation::LlmCall, outcome.is_ok(), latency_ms, fields);

        outcome
    }

    /// Shared attempt loop implementing spec.md §4.3 steps 1-5 for any
    /// provider operation. Returns the final outcome and the number of
    /// attempts made (for the `retries` audit field).
    async fn run_with_reliability<T, F, Fut>(
        &self,
        model: &str,
        timeout_s: f64,
        call: F,
    ) -> (Result<T, GatewayError>, u32)
    where
        F: Fn(Arc<dyn Llm>, Option<Duration>) -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let deadline = self.flags.gateway_timeout_enabled.then(|| Duration::from_secs_f64(timeout_s));
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            let guard = if self.flags.gateway_circuit_breaker_enabled {
                match self.circuit.gate(model) {
                    Ok(g) => Some(g),
                    Err(_) => {
                        return (
                            Err(GatewayError::CircuitBreakerOpenError(model.to_string())),
                            attempts,
                        )
                    }
                }
            } else {
                None
            };

            let result = call(self.provider.clone(), deadline).await;

            match result {
                Ok(value) => {
                    if let Some(g) = guard {
                        g.success();
                    }
                    return (Ok(value), attempts);
                }
                Err(err) => {
                    if let Some(g) = guard {
                        g.failure();
                    }
                    if should_retry(&err, self.flags.gateway_retry_enabled, attempts, self.max_retries) {
                        let delay = backoff_delay(
                            attempts,
                            self.retry_base_delay_s,
                            self.retry_max_delay_s,
                            self.retry_jitter,
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    let gw_err = if err.is_retryable() && attempts > 1 {
                        GatewayError::ModelRetryExhaustedError {
                            attempts,
                            last: err.to_string(),
                        }
                    } else {
                        GatewayError::from(err)
                    };
                    return (Err(gw_err), attempts);
                }
            }
        }
    }
}

fn error_type_name(err: &GatewayError) -> &'static str {
    match err {
        GatewayError::ModelTimeoutError => "timeout",
        GatewayError::ModelAuthError(_) => "auth_error",
        GatewayError::ModelRateLimitError => "rate_limit",
        GatewayError::ModelRetryExhaustedError { .. } => "retry_exhausted",
        GatewayError::CircuitBreakerOpenError(_) => "circuit_open",
        GatewayError::ModelProviderError(_) => "provider_error",
        GatewayError::InvalidInput(_) => "invalid_input",
    }
}

impl Prompt {
    fn clone_for_retry(&self) -> Prompt {
        self.clone()
    }

    fn as_log_string(&self) -> String {
        match self {
            Prompt::Text(s) => s.clone(),
            Prompt::Messages(msgs) => msgs
                .iter()
                .map(|m| format!("{:?}: {}", m.role, m.content))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use vigil_telemetry::StdoutSink;

    struct FlakyProvider {
        fail_times: u32,
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Llm for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, _prompt: &Prompt, _temperature: f32) -> Result<String, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(ProviderError::Server5xx("boom".into()))
            } else {
                Ok("ok".into())
            }
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|_| vec![0.0; 3]).collect())
        }
    }

    fn audit() -> AuditContext {
        AuditContext::create(true, "wf", None, None, Arc::new(StdoutSink::new()))
    }

    fn config_with(mut f: impl FnMut(&mut Config)) -> Config {
        let mut c = Config::for_tests();
        f(&mut c);
        c
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt_with_no_retries_configured() {
        let provider: Arc<dyn Llm> = Arc::new(FlakyProvider { fail_times: 0, calls: AtomicU32::new(0) });
        let config = Config::for_tests();
        let gw = ModelGateway::new(provider, &config);
        let result = gw.invoke("hi", InvokeOptions::default(), &audit(), false, false).await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn retries_until_success_when_enabled() {
        let provider: Arc<dyn Llm> = Arc::new(FlakyProvider { fail_times: 2, calls: AtomicU32::new(0) });
        let mut config = config_with(|c| {
            c.flags.gateway_retry_enabled = true;
            c.retry_base_delay_s = 0.001;
            c.retry_max_delay_s = 0.001;
            c.retry_jitter = 0.0;
        });
        config.max_retries = 3;
        let gw = ModelGateway::new(provider, &config);
        let result = gw.invoke("hi", InvokeOptions::default(), &audit(), false, false).await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn surfaces_immediately_without_retry_when_disabled() {
        let provider: Arc<dyn Llm> = Arc::new(FlakyProvider { fail_times: 5, calls: AtomicU32::new(0) });
        let config = Config::for_tests();
        let gw = ModelGateway::new(provider, &config);
        let result = gw.invoke("hi", InvokeOptions::default(), &audit(), false, false).await;
        assert!(matches!(result, Err(GatewayError::ModelProviderError(_))));
    }

    #[tokio::test]
    async fn rejects_out_of_range_temperature() {
        let provider: Arc<dyn Llm> = Arc::new(FlakyProvider { fail_times: 0, calls: AtomicU32::new(0) });
        let config = Config::for_tests();
        let gw = ModelGateway::new(provider, &config);
        let result = gw
            .invoke(
                "hi",
                InvokeOptions { temperature: Some(3.0), ..Default::default() },
                &audit(),
                false,
                false,
            )
            .await;
        assert!(matches!(result, Err(GatewayError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn circuit_breaker_opens_after_threshold_and_rejects_fast() {
        let provider: Arc<dyn Llm> = Arc::new(FlakyProvider { fail_times: u32::MAX, calls: AtomicU32::new(0) });
        let config = config_with(|c| {
            c.flags.gateway_circuit_breaker_enabled = true;
            c.cb_threshold = 5;
            c.cb_recovery_s = 60.0;
        });
        let gw = ModelGateway::new(provider, &config);
        for _ in 0..5 {
            let r = gw.invoke("hi", InvokeOptions::default(), &audit(), false, false).await;
            assert!(r.is_err());
        }
        let start = Instant::now();
        let r = gw.invoke("hi", InvokeOptions::default(), &audit(), false, false).await;
        assert!(matches!(r, Err(GatewayError::CircuitBreakerOpenError(_))));
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn embed_returns_vectors_unchanged_in_length() {
        let provider: Arc<dyn Llm> = Arc::new(FlakyProvider { fail_times: 0, calls: AtomicU32::new(0) });
        let config = Config::for_tests();
        let gw = ModelGateway::new(provider, &config);
        let result = gw.embed(vec!["a".into(), "b".into()], None, &audit()).await.unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn message_prompt_char_len_sums_contents() {
        let p = Prompt::Messages(vec![Message::user("abc"), Message::system("de")]);
        assert_eq!(p.char_len(), 5);
    }
}
