//! Brute-force throttle for pairing attempts.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::{PairingError, PairingResult};

/// Attempts allowed before the block arms.
const MAX_ATTEMPTS: u32 = 3;
/// How long the block holds once armed.
const BLOCK_DURATION_SECS: i64 = 60;

/// Failed-pairing counter with a temporary lockout.
///
/// The counter only goes back down when a pairing code is actually used
/// ([`Self::reset`]) or a pending session is cancelled
/// ([`Self::rollback_attempt`]); letting the block lapse does not forgive
/// past attempts.
#[derive(Debug, Default)]
pub struct PairingThrottle {
    attempts: u32,
    block_until: Option<DateTime<Utc>>,
}

impl PairingThrottle {
    /// Account for one pairing attempt at `now`.
    ///
    /// Fails while the block is active. The attempt that reaches the limit
    /// still proceeds; the block takes effect on the next call.
    pub fn check(&mut self, now: DateTime<Utc>) -> PairingResult<()> {
        if let Some(until) = self.block_until {
            if now < until {
                return Err(PairingError::DeviceBusy);
            }
        }
        self.attempts += 1;
        if self.attempts >= MAX_ATTEMPTS {
            info!(
                attempts = self.attempts,
                block_secs = BLOCK_DURATION_SECS,
                "pairing attempts exhausted, arming block"
            );
            self.block_until = Some(now + Duration::seconds(BLOCK_DURATION_SECS));
        }
        Ok(())
    }

    /// Forgive all attempts and clear the block. Called when a client proves
    /// it holds a live pairing key.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.block_until = None;
    }

    /// Give back the attempt consumed by a pending session that was
    /// cancelled before it could be confirmed.
    pub fn rollback_attempt(&mut self) {
        self.attempts = self.attempts.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn third_attempt_proceeds_and_arms_the_block() {
        let mut throttle = PairingThrottle::default();
        assert!(throttle.check(at(0)).is_ok());
        assert!(throttle.check(at(1)).is_ok());
        assert!(throttle.check(at(2)).is_ok());

        let err = throttle.check(at(3)).unwrap_err();
        assert_eq!(err.code(), "deviceBusy");
    }

    #[test]
    fn block_lapses_after_a_minute() {
        let mut throttle = PairingThrottle::default();
        for t in 0..3 {
            throttle.check(at(t)).unwrap();
        }
        assert!(throttle.check(at(61)).is_err());
        // Block armed at t=2 holds until t=62.
        assert!(throttle.check(at(62)).is_ok());
        // Attempts were never forgiven, so that call re-armed the block.
        assert!(throttle.check(at(63)).is_err());
    }

    #[test]
    fn reset_forgives_everything() {
        let mut throttle = PairingThrottle::default();
        for t in 0..3 {
            throttle.check(at(t)).unwrap();
        }
        throttle.reset();
        assert!(throttle.check(at(3)).is_ok());
        assert!(throttle.check(at(4)).is_ok());
    }

    #[test]
    fn rollback_returns_one_attempt() {
        let mut throttle = PairingThrottle::default();
        throttle.check(at(0)).unwrap();
        throttle.rollback_attempt();
        // The rollback bought one extra successful attempt.
        throttle.check(at(1)).unwrap();
        throttle.check(at(2)).unwrap();
        throttle.check(at(3)).unwrap();
        assert!(throttle.check(at(4)).is_err());
    }

    #[test]
    fn rollback_saturates_at_zero() {
        let mut throttle = PairingThrottle::default();
        throttle.rollback_attempt();
        assert!(throttle.check(at(0)).is_ok());
    }
}
