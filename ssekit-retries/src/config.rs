//! Retry configuration.

use rand::Rng;
use std::time::Duration;

/// How often to retry and how long to wait in between.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt. `None` retries forever.
    pub max_retries: Option<u32>,
    /// Delay between attempts.
    pub wait: WaitStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: Some(3),
            wait: WaitStrategy::Exponential {
                base: Duration::from_millis(500),
                cap: Duration::from_secs(60),
                factor: 2.0,
                jitter: 0.0,
            },
        }
    }
}

impl RetryConfig {
    /// Three retries with exponential backoff from 500ms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config for keeping a stream connected: retry forever, doubling the
    /// delay from one second up to five minutes with 10% jitter.
    pub fn for_streaming() -> Self {
        Self::new()
            .unlimited()
            .exponential(Duration::from_secs(1), Duration::from_secs(300))
            .with_jitter(0.1)
    }

    /// Config that gives up after the first failure.
    pub fn no_retry() -> Self {
        Self::new().max_retries(0)
    }

    /// Limit the number of retries.
    #[must_use]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Retry without limit.
    #[must_use]
    pub fn unlimited(mut self) -> Self {
        self.max_retries = None;
        self
    }

    /// Replace the wait strategy.
    #[must_use]
    pub fn wait(mut self, strategy: WaitStrategy) -> Self {
        self.wait = strategy;
        self
    }

    /// Double the delay on every attempt, starting at `base`, never above `cap`.
    #[must_use]
    pub fn exponential(self, base: Duration, cap: Duration) -> Self {
        self.wait(WaitStrategy::Exponential {
            base,
            cap,
            factor: 2.0,
            jitter: 0.0,
        })
    }

    /// Randomize exponential delays by up to `jitter` (0.0 to 1.0) either way.
    ///
    /// Has no effect on other strategies.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        if let WaitStrategy::Exponential { jitter: j, .. } = &mut self.wait {
            *j = jitter.clamp(0.0, 1.0);
        }
        self
    }

    /// Wait the same `delay` before every retry.
    #[must_use]
    pub fn fixed(self, delay: Duration) -> Self {
        self.wait(WaitStrategy::Fixed(delay))
    }

    /// Grow the delay by `step` on every attempt, never above `cap`.
    #[must_use]
    pub fn linear(self, base: Duration, step: Duration, cap: Duration) -> Self {
        self.wait(WaitStrategy::Linear { base, step, cap })
    }

    /// Prefer a server supplied delay, capped at `cap`, over the current
    /// strategy.
    #[must_use]
    pub fn honor_retry_after(mut self, cap: Duration) -> Self {
        let fallback = std::mem::replace(&mut self.wait, WaitStrategy::None);
        self.wait = WaitStrategy::RetryAfter {
            fallback: Box::new(fallback),
            cap,
        };
        self
    }

    /// Check whether retry number `attempt` (1-indexed) is still allowed.
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.max_retries.map_or(true, |max| attempt <= max)
    }
}

/// Delay between attempts.
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// Retry immediately.
    None,
    /// Same delay every time.
    Fixed(Duration),
    /// `base * factor^(attempt - 1)`, capped, optionally randomized.
    Exponential {
        /// First delay.
        base: Duration,
        /// Upper bound.
        cap: Duration,
        /// Growth per attempt.
        factor: f64,
        /// Random spread as a fraction of the delay, 0.0 for none.
        jitter: f64,
    },
    /// `base + step * (attempt - 1)`, capped.
    Linear {
        /// First delay.
        base: Duration,
        /// Growth per attempt.
        step: Duration,
        /// Upper bound.
        cap: Duration,
    },
    /// Use the server's suggestion when there is one.
    RetryAfter {
        /// Strategy used when the server suggested nothing.
        fallback: Box<WaitStrategy>,
        /// Upper bound for the server's suggestion.
        cap: Duration,
    },
}

impl WaitStrategy {
    /// Delay before retry number `attempt` (1-indexed).
    ///
    /// `retry_after` is the delay suggested by the server, if any. Only
    /// [`WaitStrategy::RetryAfter`] looks at it.
    pub fn calculate(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let step = attempt.saturating_sub(1);
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(delay) => *delay,
            Self::Exponential {
                base,
                cap,
                factor,
                jitter,
            } => {
                let exponent = i32::try_from(step).unwrap_or(i32::MAX);
                let mut secs = base.as_secs_f64() * factor.powi(exponent);
                // A zero base times an overflowed factor.
                if secs.is_nan() {
                    return Duration::ZERO;
                }
                if *jitter > 0.0 && secs.is_finite() {
                    secs += secs * jitter * rand::thread_rng().gen_range(-1.0..=1.0);
                }
                Duration::from_secs_f64(secs.clamp(0.0, cap.as_secs_f64()))
            }
            Self::Linear { base, step: inc, cap } => base
                .saturating_add(inc.saturating_mul(step))
                .min(*cap),
            Self::RetryAfter { fallback, cap } => match retry_after {
                Some(delay) => delay.min(*cap),
                None => fallback.calculate(attempt, None),
            },
        }
    }
}
