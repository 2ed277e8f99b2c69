use crate::error::{CoreError, Result};
use std::env;

/// Boolean kill-switches for every platform feature. Every field has a
/// safe default; reading the environment never panics and an unknown
/// value (anything other than a recognized truthy/falsy spelling)
/// silently falls back to the default instead of raising.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub platform_enabled: bool,
    pub include_trace_in_response: bool,
    pub gateway_centralized: bool,
    pub gateway_timeout_enabled: bool,
    pub gateway_retry_enabled: bool,
    pub gateway_circuit_breaker_enabled: bool,
    pub retrieval_cache_enabled: bool,
    pub audit_log_prompts: bool,
    pub audit_log_responses: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            platform_enabled: true,
            include_trace_in_response: false,
            gateway_centralized: true,
            gateway_timeout_enabled: false,
            gateway_retry_enabled: false,
            gateway_circuit_breaker_enabled: false,
            retrieval_cache_enabled: false,
            audit_log_prompts: false,
            audit_log_responses: false,
        }
    }
}

/// Where the audit sink writes structured event lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditSinkKind {
    Stdout,
    File(String),
}

impl Default for AuditSinkKind {
    fn default() -> Self {
        Self::Stdout
    }
}

/// Single typed configuration object, constructed once at process start
/// and immutable thereafter. Every non-trivial behavior elsewhere in the
/// platform is gated by a field on this struct rather than a raw
/// `env::var` call.
#[derive(Debug, Clone)]
pub struct Config {
    pub flags: FeatureFlags,

    pub default_timeout_s: f64,
    pub max_retries: u32,
    pub retry_base_delay_s: f64,
    pub retry_max_delay_s: f64,
    pub retry_jitter: f64,
    pub cb_threshold: u32,
    pub cb_recovery_s: f64,
    pub cb_half_open_max: u32,
    pub default_top_k: usize,
    pub retrieval_cache_ttl_s: u64,

    /// Analytics Agent surge thresholds (spec.md §4.6, §9 Open
    /// Question: `surge_multiplier=1.5` is authoritative and exposed
    /// as config rather than hardcoded).
    pub surge_multiplier: f64,
    pub min_absolute_rate: f64,
    pub analytics_window_minutes: f64,

    pub openai_api_key: String,
    pub model_name: String,
    pub embed_model_name: String,

    pub audit_sink: AuditSinkKind,
    pub vector_index_path: Option<String>,
    pub analytics_url: Option<String>,
}

impl Config {
    /// Construct configuration from the process environment. Fails
    /// closed: the only error this returns is a missing
    /// `OPENAI_API_KEY` (or provider-equivalent), per the fail-fast
    /// startup contract. Every other absence falls back to a default.
    pub fn from_env() -> Result<Self> {
        let openai_api_key = read_required_env("OPENAI_API_KEY")?;

        let flags = FeatureFlags {
            platform_enabled: read_bool_flag("PLATFORM_ENABLED", true),
            include_trace_in_response: read_bool_flag("INCLUDE_TRACE_IN_RESPONSE", false),
            gateway_centralized: read_bool_flag("GATEWAY_CENTRALIZED", true),
            gateway_timeout_enabled: read_bool_flag("GATEWAY_TIMEOUT_ENABLED", false),
            gateway_retry_enabled: read_bool_flag("GATEWAY_RETRY_ENABLED", false),
            gateway_circuit_breaker_enabled: read_bool_flag(
                "GATEWAY_CIRCUIT_BREAKER_ENABLED",
                false,
            ),
            retrieval_cache_enabled: read_bool_flag("RETRIEVAL_CACHE_ENABLED", false),
            audit_log_prompts: read_bool_flag("AUDIT_LOG_PROMPTS", false),
            audit_log_responses: read_bool_flag("AUDIT_LOG_RESPONSES", false),
        };

        let audit_sink = match env::var("AUDIT_SINK").ok().as_deref() {
            Some("file") => {
                let path = env::var("AUDIT_FILE_PATH").unwrap_or_else(|_| "audit.log".to_string());
                AuditSinkKind::File(path)
            }
            _ => AuditSinkKind::Stdout,
        };

        Ok(Self {
            flags,
            default_timeout_s: read_f64("DEFAULT_TIMEOUT_S", 60.0),
            max_retries: read_u32("MAX_RETRIES", 3),
            retry_base_delay_s: read_f64("RETRY_BASE_DELAY_S", 1.0),
            retry_max_delay_s: read_f64("RETRY_MAX_DELAY_S", 30.0),
            retry_jitter: read_f64("RETRY_JITTER", 0.1),
            cb_threshold: read_u32("CB_THRESHOLD", 5),
            cb_recovery_s: read_f64("CB_RECOVERY_S", 60.0),
            cb_half_open_max: read_u32("CB_HALF_OPEN_MAX", 1),
            default_top_k: read_u32("DEFAULT_TOP_K", 5) as usize,
            retrieval_cache_ttl_s: read_u32("RETRIEVAL_CACHE_TTL_S", 300) as u64,
            surge_multiplier: read_f64("SURGE_MULTIPLIER", 1.5),
            min_absolute_rate: read_f64("MIN_ABSOLUTE_RATE", 2.0),
            analytics_window_minutes: read_f64("ANALYTICS_WINDOW_MINUTES", 60.0),
            openai_api_key,
            model_name: env::var("MODEL_NAME").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            embed_model_name: env::var("EMBED_MODEL_NAME")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            audit_sink,
            vector_index_path: env::var("VECTOR_INDEX_PATH").ok(),
            analytics_url: env::var("ANALYTICS_URL").ok(),
        })
    }

    /// Build a config for tests without requiring environment setup.
    pub fn for_tests() -> Self {
        Self {
            flags: FeatureFlags::default(),
            default_timeout_s: 60.0,
            max_retries: 3,
            retry_base_delay_s: 1.0,
            retry_max_delay_s: 30.0,
            retry_jitter: 0.1,
            cb_threshold: 5,
            cb_recovery_s: 60.0,
            cb_half_open_max: 1,
            default_top_k: 5,
            retrieval_cache_ttl_s: 300,
            surge_multiplier: 1.5,
            min_absolute_rate: 2.0,
            analytics_window_minutes: 60.0,
            openai_api_key: "test-key".to_string(),
            model_name: "test-model".to_string(),
            embed_model_name: "test-embed-model".to_string(),
            audit_sink: AuditSinkKind::Stdout,
            vector_index_path: None,
            analytics_url: None,
        }
    }
}

fn read_required_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| CoreError::MissingRequiredEnv(name.to_string()))
}

/// Fails-closed boolean reader: absent or unrecognized values fall back
/// to `default` rather than raising.
fn read_bool_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn read_f64(name: &str, default: f64) -> f64 {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn read_u32(name: &str, default: u32) -> u32 {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_flags_default_matches_spec() {
        let flags = FeatureFlags::default();
        assert!(flags.platform_enabled);
        assert!(flags.gateway_centralized);
        assert!(!flags.include_trace_in_response);
        assert!(!flags.gateway_timeout_enabled);
        assert!(!flags.gateway_retry_enabled);
        assert!(!flags.gateway_circuit_breaker_enabled);
        assert!(!flags.retrieval_cache_enabled);
        assert!(!flags.audit_log_prompts);
        assert!(!flags.audit_log_responses);
    }

    #[test]
    fn test_read_bool_flag_fails_closed_on_garbage() {
        // SAFETY: single-threaded test process; no other test reads this var.
        unsafe { env::set_var("VIGIL_TEST_FLAG", "not-a-bool") };
        assert!(read_bool_flag("VIGIL_TEST_FLAG", true));
        assert!(!read_bool_flag("VIGIL_TEST_FLAG", false));
        unsafe { env::remove_var("VIGIL_TEST_FLAG") };
    }

    #[test]
    fn test_for_tests_numeric_defaults() {
        let cfg = Config::for_tests();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.cb_threshold, 5);
        assert_eq!(cfg.default_top_k, 5);
        assert_eq!(cfg.surge_multiplier, 1.5);
        assert_eq!(cfg.min_absolute_rate, 2.0);
    }
}
