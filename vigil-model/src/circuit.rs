use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct ModelCircuit {
    state: State,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_inflight: u32,
}

impl Default for ModelCircuit {
    fn default() -> Self {
        Self {
            state: State::Closed,
            consecutive_failures: 0,
            opened_at: None,
            half_open_inflight: 0,
        }
    }
}

/// Per-gateway, per-model-name circuit breaker (spec.md §3, §4.3 step
/// 1 and step 5). Critical sections are short `std::sync::Mutex` locks
/// around plain state transitions; the provider call itself always
/// happens outside the lock (spec.md §5).
pub struct CircuitBreaker {
    threshold: u32,
    recovery: Duration,
    half_open_max: u32,
    circuits: Mutex<HashMap<String, ModelCircuit>>,
}

/// Returned by [`CircuitBreaker::gate`] when a call is rejected without
/// ever reaching the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitOpen;

/// An admitted call. Must be finalized with [`CircuitGuard::success`] or
/// [`CircuitGuard::failure`]; if dropped without either (e.g. the
/// enclosing future is cancelled), a half-open inflight slot is
/// released without touching the failure counter — cancellation never
/// leaks an open circuit (spec.md §5).
pub struct CircuitGuard<'a> {
    breaker: &'a CircuitBreaker,
    model: String,
    was_half_open: bool,
    finished: bool,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, recovery: Duration, half_open_max: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            recovery,
            half_open_max: half_open_max.max(1),
            circuits: Mutex::new(HashMap::new()),
        }
    }

    /// Step 1 of the reliability algorithm: admit or reject a call for
    /// `model` before any provider traffic is generated.
    pub fn gate(&self, model: &str) -> Result<CircuitGuard<'_>, CircuitOpen> {
        let mut circuits = self.circuits.lock().unwrap_or_else(|p| p.into_inner());
        let entry = circuits.entry(model.to_string()).or_default();

        match entry.state {
            State::Closed => Ok(()),
            State::Open => {
                let elapsed = entry.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::ZERO);
                if elapsed < self.recovery {
                    Err(())
                } else {
                    entry.state = State::HalfOpen;
                    entry.half_open_inflight = 0;
                    admit_half_open(entry, self.half_open_max)
                }
            }
            State::HalfOpen => admit_half_open(entry, self.half_open_max),
        }
        .map(|()| {
            let was_half_open = entry.state == State::HalfOpen;
            CircuitGuard {
                breaker: self,
                model: model.to_string(),
                was_half_open,
                finished: false,
            }
        })
        .map_err(|()| CircuitOpen)
    }
}

fn admit_half_open(entry: &mut ModelCircuit, half_open_max: u32) -> Result<(), ()> {
    if entry.half_open_inflight >= half_open_max {
        Err(())
    } else {
        entry.half_open_inflight += 1;
        Ok(())
    }
}

impl CircuitBreaker {
    fn on_success(&self, model: &str, was_half_open: bool) {
        let mut circuits = self.circuits.lock().unwrap_or_else(|p| p.into_inner());
        let entry = circuits.entry(model.to_string()).or_default();
        if was_half_open {
            entry.half_open_inflight = entry.half_open_inflight.saturating_sub(1);
        }
        entry.state = State::Closed;
        entry.consecutive_failures = 0;
        entry.opened_at = None;
    }

    fn on_failure(&self, model: &str, was_half_open: bool) {
        let mut circuits = self.circuits.lock().unwrap_or_else(|p| p.into_inner());
        let entry = circuits.entry(model.to_string()).or_default();
        if was_half_open {
            entry.half_open_inflight = entry.half_open_inflight.saturating_sub(1);
            entry.state = State::Open;
            entry.opened_at = Some(Instant::now());
            return;
        }
        entry.consecutive_failures += 1;
        if entry.consecutive_failures >= self.threshold {
            entry.state = State::Open;
            entry.opened_at = Some(Instant::now());
        }
    }

    fn release_inflight_only(&self, model: &str) {
        let mut circuits = self.circuits.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(entry) = circuits.get_mut(model) {
            entry.half_open_inflight = entry.half_open_inflight.saturating_sub(1);
        }
    }

    #[cfg(test)]
    fn is_open(&self, model: &str) -> bool {
        let circuits = self.circuits.lock().unwrap();
        matches!(circuits.get(model).map(|e| e.state), Some(State::Open))
    }
}

impl<'a> CircuitGuard<'a> {
    pub fn success(mut self) {
        self.breaker.on_success(&self.model, self.was_half_open);
        self.finished = true;
    }

    pub fn failure(mut self) {
        self.breaker.on_failure(&self.model, self.was_half_open);
        self.finished = true;
    }
}

impl Drop for CircuitGuard<'_> {
    fn drop(&mut self) {
        if !self.finished && self.was_half_open {
            self.breaker.release_inflight_only(&self.model);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let cb = CircuitBreaker::new(5, Duration::from_secs(60), 1);
        for _ in 0..4 {
            cb.gate("gpt").unwrap().failure();
        }
        assert!(!cb.is_open("gpt"));
        cb.gate("gpt").unwrap().failure();
        assert!(cb.is_open("gpt"));
    }

    #[test]
    fn open_circuit_rejects_without_admitting() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(60), 1);
        cb.gate("gpt").unwrap().failure();
        assert!(cb.gate("gpt").is_err());
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let cb = CircuitBreaker::new(5, Duration::from_secs(60), 1);
        for _ in 0..4 {
            cb.gate("gpt").unwrap().failure();
        }
        cb.gate("gpt").unwrap().success();
        for _ in 0..4 {
            cb.gate("gpt").unwrap().failure();
        }
        assert!(!cb.is_open("gpt"));
    }

    #[test]
    fn half_open_success_closes_circuit() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10), 1);
        cb.gate("gpt").unwrap().failure();
        assert!(cb.is_open("gpt"));
        std::thread::sleep(Duration::from_millis(20));
        let guard = cb.gate("gpt").expect("recovery window elapsed, should admit");
        guard.success();
        assert!(!cb.is_open("gpt"));
    }

    #[test]
    fn half_open_failure_reopens_circuit() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10), 1);
        cb.gate("gpt").unwrap().failure();
        std::thread::sleep(Duration::from_millis(20));
        let guard = cb.gate("gpt").unwrap();
        guard.failure();
        assert!(cb.is_open("gpt"));
    }

    #[test]
    fn dropped_guard_without_outcome_releases_half_open_slot() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10), 1);
        cb.gate("gpt").unwrap().failure();
        std::thread::sleep(Duration::from_millis(20));
        {
            let _guard = cb.gate("gpt").unwrap();
            // dropped without success()/failure(): simulates cancellation
        }
        // inflight slot released, so a fresh half-open call is admitted
        assert!(cb.gate("gpt").is_ok());
    }
}
