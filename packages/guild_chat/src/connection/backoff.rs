use rand::Rng;
use std::time::Duration;

/// Exponential reconnect backoff, capped at `max` and jittered downward.
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// Reconnect attempts allowed before reporting `disconnected`
    pub max_retries: u32,
    /// Fraction of the delay that may be randomly removed (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        crate::config::ConnectionConfig::default().backoff()
    }
}

impl BackoffPolicy {
    /// Delay before reconnect `attempt` (1-based) without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial.saturating_mul(1u32 << exponent).min(self.max)
    }

    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }
        let cut = base.mul_f64(jitter * rng.random::<f64>());
        base.saturating_sub(cut)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn policy(jitter: f64) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            max_retries: 5,
            jitter,
        }
    }

    #[test]
    fn doubles_until_capped() {
        let p = policy(0.0);
        let delays: Vec<u64> = (1..=8).map(|a| p.base_delay(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        assert_eq!(policy(0.0).base_delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let p = policy(0.5);
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 1..=10 {
            let base = p.base_delay(attempt);
            for _ in 0..50 {
                let d = p.delay(attempt, &mut rng);
                assert!(d <= base, "{d:?} > {base:?}");
                assert!(d >= base / 2, "{d:?} < half of {base:?}");
            }
        }
    }

    #[test]
    fn no_jitter_is_deterministic() {
        let p = policy(0.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(p.delay(3, &mut rng), Duration::from_secs(4));
    }

    #[test]
    fn budget() {
        let p = policy(0.0);
        assert!(!p.exhausted(5));
        assert!(p.exhausted(6));
    }
}
