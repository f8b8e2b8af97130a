//! Checkpoint throttling
//!
//! Enforces a minimum wall-clock interval between successive checkpoint
//! creations. The clock value is passed in by the caller so the policy
//! stays a pure function of its inputs.

/// Minimum-interval clock, one per process.
#[derive(Debug, Clone, Default)]
pub struct Throttle {
    min_interval_secs: u64,
    last_checkpoint: Option<u64>,
}

impl Throttle {
    pub fn new(min_interval_secs: u64) -> Self {
        Self {
            min_interval_secs,
            last_checkpoint: None,
        }
    }

    /// Ask to create a checkpoint at `now` (Unix seconds).
    ///
    /// Returns `false` while the last permitted creation is more recent
    /// than the minimum interval; otherwise records `now` and permits.
    pub fn try_acquire(&mut self, now: u64) -> bool {
        if let Some(last) = self.last_checkpoint {
            if now.saturating_sub(last) < self.min_interval_secs {
                return false;
            }
        }
        self.last_checkpoint = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_checkpoint_is_always_permitted() {
        let mut throttle = Throttle::new(3600);
        assert!(throttle.try_acquire(1000));
    }

    #[test]
    fn interval_gates_successive_checkpoints() {
        let mut throttle = Throttle::new(60);
        assert!(throttle.try_acquire(1000));
        assert!(!throttle.try_acquire(1010));
        assert!(throttle.try_acquire(1070));
    }

    #[test]
    fn denied_attempts_do_not_reset_the_clock() {
        let mut throttle = Throttle::new(60);
        assert!(throttle.try_acquire(1000));
        assert!(!throttle.try_acquire(1059));
        // Still measured from the permitted creation at t=1000.
        assert!(throttle.try_acquire(1060));
    }

    #[test]
    fn zero_interval_never_throttles() {
        let mut throttle = Throttle::new(0);
        assert!(throttle.try_acquire(5));
        assert!(throttle.try_acquire(5));
        assert!(throttle.try_acquire(5));
    }

    #[test]
    fn clock_regression_is_tolerated() {
        let mut throttle = Throttle::new(60);
        assert!(throttle.try_acquire(1000));
        assert!(!throttle.try_acquire(900));
    }
}
