use rand::Rng;
use std::time::Duration;

use crate::error::ProviderError;

/// Step 4 of the reliability algorithm: `min(base*2^(attempt-1), max)`
/// seconds, then scaled by a random factor in `[1-jitter, 1+jitter]`.
/// `attempt` is 1-based (the attempt that just failed).
pub fn backoff_delay(attempt: u32, base_s: f64, max_s: f64, jitter: f64) -> Duration {
    let exp = base_s * 2f64.powi((attempt.saturating_sub(1)) as i32);
    let capped = exp.min(max_s).max(0.0);
    let factor = if jitter > 0.0 {
        rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter))
    } else {
        1.0
    };
    Duration::from_secs_f64((capped * factor).max(0.0))
}

/// Step 3 of the reliability algorithm: should this outcome be retried
/// given the flag and attempt budget? `attempts` counts attempts made
/// so far, including the one that just failed.
pub fn should_retry(err: &ProviderError, retry_enabled: bool, attempts: u32, max_retries: u32) -> bool {
    retry_enabled && err.is_retryable() && attempts < 1 + max_retries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let d1 = backoff_delay(1, 1.0, 30.0, 0.0);
        let d2 = backoff_delay(2, 1.0, 30.0, 0.0);
        let d3 = backoff_delay(3, 1.0, 30.0, 0.0);
        let d10 = backoff_delay(10, 1.0, 30.0, 0.0);
        assert_eq!(d1, Duration::from_secs_f64(1.0));
        assert_eq!(d2, Duration::from_secs_f64(2.0));
        assert_eq!(d3, Duration::from_secs_f64(4.0));
        assert_eq!(d10, Duration::from_secs_f64(30.0));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..100 {
            let d = backoff_delay(3, 1.0, 30.0, 0.1);
            let secs = d.as_secs_f64();
            assert!(secs >= 4.0 * 0.9 - 1e-9 && secs <= 4.0 * 1.1 + 1e-9, "{secs}");
        }
    }

    #[test]
    fn should_retry_respects_flag_and_budget() {
        let err = ProviderError::Timeout("x".into());
        assert!(!should_retry(&err, false, 1, 3));
        assert!(should_retry(&err, true, 1, 3));
        assert!(!should_retry(&err, true, 4, 3));
        let auth = ProviderError::Auth("x".into());
        assert!(!should_retry(&auth, true, 1, 3));
    }
}
