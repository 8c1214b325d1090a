//! # Rate-Limited Logging
//!
//! A noisy line can flag thousands of damaged frames per second, and a
//! warning per frame would drown the journal. `LogThrottle` is a small
//! token bucket for log lines: a call site may burst a few messages,
//! then is held to a steady refill rate until the noise subsides.

use std::time::{Duration, Instant};

/// Token bucket gating how often a call site may emit a log line.
///
/// The bucket starts full. Each allowed message spends one token; one
/// token returns per `refill_interval`, up to the burst size. Callers
/// wrap their log statement in [`allow`](Self::allow):
///
/// ```rust
/// use std::time::Duration;
/// use van_rs::util::logging::LogThrottle;
///
/// // at most 5 outstanding messages, one more every 200 ms
/// let mut throttle = LogThrottle::new(5, Duration::from_millis(200));
/// if throttle.allow() {
///     log::warn!("unrepairable frame");
/// }
/// ```
#[derive(Debug)]
pub struct LogThrottle {
    /// Messages still spendable before refills are needed
    tokens: u32,
    /// Bucket size, also the initial burst
    burst: u32,
    /// Time to earn one token back
    refill_interval: Duration,
    /// When the bucket last earned tokens
    last_refill: Instant,
}

impl LogThrottle {
    /// A bucket holding `burst` messages that refills one message per
    /// `refill_interval`.
    pub fn new(burst: u32, refill_interval: Duration) -> Self {
        Self {
            tokens: burst,
            burst,
            refill_interval,
            last_refill: Instant::now(),
        }
    }

    /// Spend a token if one is available.
    ///
    /// Returns `true` when the caller should go ahead and log.
    pub fn allow(&mut self) -> bool {
        self.refill();
        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        true
    }

    /// Refill the bucket to its burst size immediately.
    pub fn reset(&mut self) {
        self.tokens = self.burst;
        self.last_refill = Instant::now();
    }

    fn refill(&mut self) {
        if self.refill_interval.is_zero() {
            return;
        }
        let elapsed = self.last_refill.elapsed();
        let earned = (elapsed.as_nanos() / self.refill_interval.as_nanos()) as u32;
        if earned > 0 {
            self.tokens = self.tokens.saturating_add(earned).min(self.burst);
            self.last_refill += self.refill_interval * earned;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_blocked() {
        // an hour-long refill keeps the clock out of the picture
        let mut throttle = LogThrottle::new(3, Duration::from_secs(3600));

        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(throttle.allow());

        assert!(!throttle.allow());
        assert!(!throttle.allow());
    }

    #[test]
    fn test_reset_restores_burst() {
        let mut throttle = LogThrottle::new(2, Duration::from_secs(3600));

        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(!throttle.allow());

        throttle.reset();
        assert!(throttle.allow());
    }

    #[test]
    fn test_tokens_refill_over_time() {
        let mut throttle = LogThrottle::new(1, Duration::from_millis(5));
        assert!(throttle.allow());
        assert!(!throttle.allow());

        std::thread::sleep(Duration::from_millis(10));
        assert!(throttle.allow(), "a refill interval earns a token back");
    }

    #[test]
    fn test_refill_never_exceeds_burst() {
        let mut throttle = LogThrottle::new(2, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(20));

        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(!throttle.allow(), "idle time must not bank extra messages");
    }
}
