//! Randomized exponential backoff for the push retry loop.
//!
//! [`Backoff`] only computes delays; the caller decides how to sleep. This
//! keeps the policy testable without a clock.

use std::time::Duration;

use rand::Rng;

/// Parameters of an exponential backoff with jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub initial: Duration,
    /// Upper bound of the doubling base delay.
    pub max: Duration,
    /// Fraction of the base delay added as uniform random jitter, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(3000),
            jitter: 0.5,
        }
    }
}

/// Exponential backoff state machine.
///
/// Every call to [`next_delay`](Self::next_delay) returns the current base
/// delay plus jitter in `[0, base * jitter)`, then doubles the base up to
/// [`BackoffConfig::max`].
///
/// ```
/// use std::time::Duration;
/// use crdt_tally::{Backoff, BackoffConfig};
///
/// let mut backoff = Backoff::new(BackoffConfig {
///     initial: Duration::from_millis(10),
///     max: Duration::from_millis(40),
///     jitter: 0.0,
/// });
/// let mut rng = rand::thread_rng();
///
/// let delays: Vec<_> = (0..4).map(|_| backoff.next_delay(&mut rng)).collect();
/// assert_eq!(delays, [10, 20, 40, 40].map(Duration::from_millis));
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
}

impl Backoff {
    /// Start a fresh backoff sequence.
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current: config.initial.min(config.max),
            config,
        }
    }

    /// The base delay the next call to [`next_delay`](Self::next_delay) will use.
    #[must_use]
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Largest delay this backoff can ever return.
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.config.max + self.config.max.mul_f64(jitter_fraction(self.config.jitter))
    }

    /// Delay to wait before the next attempt; advances the sequence.
    pub fn next_delay<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let base = self.current;
        self.current = base.saturating_mul(2).min(self.config.max);
        base + jitter(base, self.config.jitter, rng)
    }

    /// Go back to the initial delay.
    pub fn reset(&mut self) {
        self.current = self.config.initial.min(self.config.max);
    }
}

/// A uniformly jittered interval in `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterRange {
    /// Shortest interval.
    pub min: Duration,
    /// Exclusive upper bound. A value `<= min` always yields `min`.
    pub max: Duration,
}

impl JitterRange {
    /// Range from `min` (inclusive) to `max` (exclusive).
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// Draw one interval.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            self.min
        } else {
            rng.gen_range(self.min..self.max)
        }
    }
}

fn jitter_fraction(fraction: f64) -> f64 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}

fn jitter<R: Rng + ?Sized>(base: Duration, fraction: f64, rng: &mut R) -> Duration {
    let span = base.mul_f64(jitter_fraction(fraction));
    if span.is_zero() {
        Duration::ZERO
    } else {
        rng.gen_range(Duration::ZERO..span)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn default_matches_push_policy() {
        let config = BackoffConfig::default();
        assert_eq!(config.initial, ms(10));
        assert_eq!(config.max, ms(3000));
        assert_eq!(config.jitter, 0.5);
    }

    #[test]
    fn doubles_until_capped() {
        let mut backoff = Backoff::new(BackoffConfig {
            initial: ms(10),
            max: ms(100),
            jitter: 0.0,
        });
        let mut rng = StdRng::seed_from_u64(7);

        let delays: Vec<_> = (0..6).map(|_| backoff.next_delay(&mut rng)).collect();
        assert_eq!(delays, [10, 20, 40, 80, 100, 100].map(ms));
    }

    #[test]
    fn never_exceeds_ceiling_after_many_failures() {
        let mut backoff = Backoff::new(BackoffConfig::default());
        let mut rng = StdRng::seed_from_u64(42);
        let ceiling = backoff.ceiling();

        for _ in 0..10_000 {
            let delay = backoff.next_delay(&mut rng);
            assert!(delay < ceiling, "{delay:?} >= {ceiling:?}");
            assert!(backoff.current() <= ms(3000));
        }
    }

    #[test]
    fn jitter_stays_below_half_the_base() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let mut backoff = Backoff::new(BackoffConfig {
                initial: ms(200),
                max: ms(200),
                jitter: 0.5,
            });
            let delay = backoff.next_delay(&mut rng);
            assert!(delay >= ms(200) && delay < ms(300), "{delay:?}");
        }
    }

    #[test]
    fn initial_above_max_is_clamped() {
        let backoff = Backoff::new(BackoffConfig {
            initial: ms(500),
            max: ms(50),
            jitter: 0.0,
        });
        assert_eq!(backoff.current(), ms(50));
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut backoff = Backoff::new(BackoffConfig {
            initial: ms(10),
            max: ms(1000),
            jitter: 0.0,
        });
        let mut rng = StdRng::seed_from_u64(3);
        backoff.next_delay(&mut rng);
        backoff.next_delay(&mut rng);
        assert_eq!(backoff.current(), ms(40));

        backoff.reset();
        assert_eq!(backoff.current(), ms(10));
    }

    #[test]
    fn jitter_range_samples_within_bounds() {
        let range = JitterRange::new(ms(250), ms(750));
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..1000 {
            let d = range.sample(&mut rng);
            assert!(d >= ms(250) && d < ms(750), "{d:?}");
        }
    }

    #[test]
    fn degenerate_jitter_range_is_constant() {
        let range = JitterRange::new(ms(5), ms(5));
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(range.sample(&mut rng), ms(5));
    }
}
