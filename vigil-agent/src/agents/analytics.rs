use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use vigil_core::AgentResult;
use vigil_model::{InvokeOptions, ModelGateway};
use vigil_telemetry::AuditContext;

use crate::agent::Agent;
use crate::analytics_store::AnalyticsStore;
use crate::error::AgentError;

#[derive(Debug, Clone, Copy)]
pub struct SurgeThresholds {
    pub surge_multiplier: f64,
    pub min_absolute_rate: f64,
    pub window_minutes: f64,
}

impl Default for SurgeThresholds {
    fn default() -> Self {
        Self { surge_multiplier: 1.5, min_absolute_rate: 2.0, window_minutes: 60.0 }
    }
}

#[derive(Debug, Deserialize, Default)]
struct AnalyticsInput {
    #[serde(default)]
    county: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    risk_level: Option<String>,
}

#[derive(Debug, Clone)]
struct Group {
    county: String,
    channel: String,
    risk_level: String,
    rate_current: f64,
    rate_baseline: f64,
}

/// Surge detection over windowed event rates (spec.md §4.6). Rows from
/// the analytics store are grouped by `(county, channel, risk_level)`
/// and must carry a `count` column for each of the current and
/// baseline windows; a surge is flagged when `rate_current >=
/// surge_multiplier * rate_baseline` AND `rate_current >=
/// min_absolute_rate`.
pub struct AnalyticsAgent {
    gateway: Arc<ModelGateway>,
    store: Arc<dyn AnalyticsStore>,
    thresholds: SurgeThresholds,
}

impl AnalyticsAgent {
    pub fn new(gateway: Arc<ModelGateway>, store: Arc<dyn AnalyticsStore>, thresholds: SurgeThresholds) -> Self {
        Self { gateway, store, thresholds }
    }

    fn window_sql(&self, input: &AnalyticsInput, baseline: bool) -> String {
        let offset = if baseline { self.thresholds.window_minutes * 2.0 } else { self.thresholds.window_minutes };
        let upper = if baseline { self.thresholds.window_minutes } else { 0.0 };
        let mut clauses = vec![format!(
            "event_time_ms > now() - {offset} * 60000 AND event_time_ms <= now() - {upper} * 60000"
        )];
        if let Some(county) = &input.county {
            clauses.push(format!("county = '{county}'"));
        }
        if let Some(channel) = &input.channel {
            clauses.push(format!("channel = '{channel}'"));
        }
        if let Some(risk_level) = &input.risk_level {
            clauses.push(format!("risk_level = '{risk_level}'"));
        }
        format!(
            "SELECT county, channel, risk_level, COUNT(*) AS count FROM events WHERE {} GROUP BY county, channel, risk_level",
            clauses.join(" AND ")
        )
    }

    fn group_key(row: &Map<String, Value>) -> (String, String, String) {
        let field = |name: &str| row.get(name).and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
        (field("county"), field("channel"), field("risk_level"))
    }

    fn count_of(row: &Map<String, Value>) -> f64 {
        row.get("count").and_then(|v| v.as_f64()).unwrap_or(0.0)
    }

    fn merge_groups(
        &self,
        current_rows: Vec<Map<String, Value>>,
        baseline_rows: Vec<Map<String, Value>>,
    ) -> Vec<Group> {
        let mut baseline_by_key: HashMap<(String, String, String), f64> = HashMap::new();
        for row in &baseline_rows {
            baseline_by_key.insert(Self::group_key(row), Self::count_of(row));
        }

        let mut groups = Vec::new();
        for row in &current_rows {
            let key = Self::group_key(row);
            let current_count = Self::count_of(row);
            let baseline_count = baseline_by_key.remove(&key).unwrap_or(0.0);
            groups.push(Group {
                county: key.0,
                channel: key.1,
                risk_level: key.2,
                rate_current: current_count / self.thresholds.window_minutes,
                rate_baseline: baseline_count / self.thresholds.window_minutes,
            });
        }
        // Groups present only in the baseline window had zero current events.
        for (key, baseline_count) in baseline_by_key {
            groups.push(Group {
                county: key.0,
                channel: key.1,
                risk_level: key.2,
                rate_current: 0.0,
                rate_baseline: baseline_count / self.thresholds.window_minutes,
            });
        }
        groups
    }

    fn is_surge(&self, group: &Group) -> bool {
        group.rate_current >= self.thresholds.surge_multiplier * group.rate_baseline
            && group.rate_current >= self.thresholds.min_absolute_rate
    }
}

#[async_trait]
impl Agent for AnalyticsAgent {
    fn name(&self) -> &str {
        "analytics"
    }

    async fn execute(&self, input: Value, audit: &AuditContext) -> AgentResult {
        let input: AnalyticsInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(err) => return AgentResult::failure(AgentError::InvalidInput(err.to_string()).into()),
        };

        let current_rows = match self.store.execute(&self.window_sql(&input, false)).await {
            Ok(rows) => rows,
            Err(err) => return AgentResult::failure(err.into()),
        };
        let baseline_rows = match self.store.execute(&self.window_sql(&input, true)).await {
            Ok(rows) => rows,
            Err(err) => return AgentResult::failure(err.into()),
        };

        let groups = self.merge_groups(current_rows, baseline_rows);
        let surges: Vec<&Group> = groups.iter().filter(|g| self.is_surge(g)).collect();

        let surge_list = json!(surges
            .iter()
            .map(|g| json!({
                "county": g.county,
                "channel": g.channel,
                "risk_level": g.risk_level,
                "rate_current": g.rate_current,
                "rate_baseline": g.rate_baseline,
            }))
            .collect::<Vec<_>>());

        let interpretation_prompt = format!(
            "In one or two sentences, interpret these surge findings for a crisis-response analyst: {surge_list}"
        );
        let interpretation = match self
            .gateway
            .invoke(interpretation_prompt, InvokeOptions::default(), audit, false, false)
            .await
        {
            Ok(text) => text,
            Err(err) => return AgentResult::failure(AgentError::Model(err).into()),
        };

        AgentResult::success(
            json!({"surges": surge_list, "interpretation": interpretation, "interpretation_is_llm_generated": true}),
            Vec::new(),
            Value::Null,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics_store::MockAnalyticsStore;
    use vigil_core::Config;
    use vigil_model::MockLlm;
    use vigil_telemetry::StdoutSink;

    fn audit() -> AuditContext {
        AuditContext::create(false, "wf", None, None, Arc::new(StdoutSink::new()))
    }

    fn row(county: &str, channel: &str, risk_level: &str, count: f64) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("county".into(), json!(county));
        m.insert("channel".into(), json!(channel));
        m.insert("risk_level".into(), json!(risk_level));
        m.insert("count".into(), json!(count));
        m
    }

    #[tokio::test]
    async fn flags_surge_above_threshold_and_floor() {
        let gateway = Arc::new(ModelGateway::new(Arc::new(MockLlm::new("surge noted")), &Config::for_tests()));
        // current: 180 events/60min = 3.0/min; baseline: 60/60min = 1.0/min.
        // 3.0 >= 1.5*1.0 and 3.0 >= 2.0 -> surge.
        let store = Arc::new(MockAnalyticsStore::new(vec![]));
        let agent = AnalyticsAgent::new(gateway, store, SurgeThresholds::default());
        let current = vec![row("king", "web", "high", 180.0)];
        let baseline = vec![row("king", "web", "high", 60.0)];
        let groups = agent.merge_groups(current, baseline);
        assert_eq!(groups.len(), 1);
        assert!(agent.is_surge(&groups[0]));
    }

    #[tokio::test]
    async fn does_not_flag_below_absolute_floor() {
        let gateway = Arc::new(ModelGateway::new(Arc::new(MockLlm::new("no surge")), &Config::for_tests()));
        let store = Arc::new(MockAnalyticsStore::new(vec![]));
        let agent = AnalyticsAgent::new(gateway, store, SurgeThresholds::default());
        // current: 60/60min=1.0/min, baseline: 6/60min=0.1/min -> ratio exceeds 1.5x but below floor 2.0.
        let groups = agent.merge_groups(vec![row("king", "web", "high", 60.0)], vec![row("king", "web", "high", 6.0)]);
        assert!(!agent.is_surge(&groups[0]));
    }

    #[tokio::test]
    async fn execute_returns_marked_interpretation() {
        let gateway = Arc::new(ModelGateway::new(Arc::new(MockLlm::new("rates are stable")), &Config::for_tests()));
        let store = Arc::new(MockAnalyticsStore::new(vec![row("king", "web", "high", 10.0)]));
        let agent = AnalyticsAgent::new(gateway, store, SurgeThresholds::default());
        let result = agent.execute(json!({}), &audit()).await;
        assert!(result.success);
        assert_eq!(result.data["interpretation_is_llm_generated"], true);
    }
}
