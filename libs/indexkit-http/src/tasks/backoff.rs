use crate::config::{PollBackoff, TaskPollConfig};
use rand::Rng;
use std::time::Duration;

/// Upper bound for any single poll delay (1 hour).
const MAX_DELAY_SECS: f64 = 3600.0;

/// Delay before the status fetch following `attempt` (0-based).
///
/// Fixed backoff always yields `interval`. Exponential backoff yields
/// `min(interval * multiplier^attempt, max_interval)`, plus 0-25% jitter
/// when enabled, still capped at `max_interval`.
pub(crate) fn poll_delay(config: &TaskPollConfig, attempt: u32) -> Duration {
    let PollBackoff::Exponential {
        multiplier,
        max_interval,
        jitter,
    } = config.backoff
    else {
        return config.interval;
    };

    let attempt = i32::try_from(attempt).unwrap_or(i32::MAX);

    // NaN, infinite or negative multipliers degrade to a fixed interval
    let multiplier = if multiplier.is_finite() && multiplier >= 0.0 {
        multiplier
    } else {
        1.0
    };

    let max_secs = max_interval.as_secs_f64().min(MAX_DELAY_SECS);
    let base = config.interval.as_secs_f64() * multiplier.powi(attempt);
    let clamped = if base.is_finite() {
        base.min(max_secs).max(0.0)
    } else {
        max_secs
    };
    let delay = Duration::from_secs_f64(clamped);

    let delay = if jitter {
        let factor = rand::rng().random_range(0.0..=0.25);
        delay + delay.mul_f64(factor)
    } else {
        delay
    };

    delay.min(Duration::from_secs_f64(max_secs))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn exponential(multiplier: f64, jitter: bool) -> TaskPollConfig {
        TaskPollConfig::default()
            .with_interval(Duration::from_millis(100))
            .with_backoff(PollBackoff::Exponential {
                multiplier,
                max_interval: Duration::from_secs(1),
                jitter,
            })
    }

    #[test]
    fn test_fixed_delay_ignores_attempt() {
        let config = TaskPollConfig::default();
        assert_eq!(poll_delay(&config, 0), Duration::from_millis(50));
        assert_eq!(poll_delay(&config, 25), Duration::from_millis(50));
    }

    #[test]
    fn test_exponential_grows_and_caps() {
        let config = exponential(2.0, false);
        assert_eq!(poll_delay(&config, 0), Duration::from_millis(100));
        assert_eq!(poll_delay(&config, 1), Duration::from_millis(200));
        assert_eq!(poll_delay(&config, 2), Duration::from_millis(400));
        assert_eq!(poll_delay(&config, 10), Duration::from_secs(1));
        assert_eq!(poll_delay(&config, u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_jitter_bounds() {
        let config = exponential(2.0, true);
        for _ in 0..50 {
            let delay = poll_delay(&config, 0);
            assert!(delay >= Duration::from_millis(100), "{delay:?}");
            assert!(delay <= Duration::from_millis(125), "{delay:?}");
        }
        assert!(poll_delay(&config, 8) <= Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_multiplier_falls_back_to_interval() {
        for multiplier in [f64::NAN, f64::INFINITY, -3.0] {
            let config = exponential(multiplier, false);
            assert_eq!(poll_delay(&config, 3), Duration::from_millis(100));
        }
    }
}
