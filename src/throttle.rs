use std::time::{Duration, Instant};

/// Minimum spacing between two classifier invocations.
pub const DEFAULT_CLASSIFICATION_INTERVAL: Duration = Duration::from_millis(500);

/// Fixed minimum-interval gate in front of the classifier.
///
/// A frame may be classified only when strictly more than `interval` has
/// passed since the last accepted frame. Before the first acceptance the last
/// instant is the distant past, so the first frame always passes.
#[derive(Clone, Debug)]
pub struct ClassificationThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ClassificationThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn last_classification(&self) -> Option<Instant> {
        self.last
    }

    /// Whether a frame arriving at `now` would be classified.
    pub fn is_ready(&self, now: Instant) -> bool {
        match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.interval,
        }
    }

    /// Accept the frame arriving at `now` if the window has passed.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if !self.is_ready(now) {
            return false;
        }
        self.last = Some(now);
        true
    }
}

impl Default for ClassificationThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_CLASSIFICATION_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_passes() {
        let mut throttle = ClassificationThrottle::default();
        assert!(throttle.try_acquire(Instant::now()));
    }

    #[test]
    fn exactly_one_interval_is_still_throttled() {
        let start = Instant::now();
        let mut throttle = ClassificationThrottle::default();
        assert!(throttle.try_acquire(start));
        assert!(!throttle.try_acquire(start + Duration::from_millis(500)));
        assert!(throttle.try_acquire(start + Duration::from_millis(501)));
    }

    #[test]
    fn rejected_frames_do_not_move_the_window() {
        let start = Instant::now();
        let mut throttle = ClassificationThrottle::default();
        assert!(throttle.try_acquire(start));
        assert!(!throttle.try_acquire(start + Duration::from_millis(300)));
        assert_eq!(throttle.last_classification(), Some(start));
        assert!(throttle.try_acquire(start + Duration::from_millis(600)));
    }

    #[test]
    fn accepted_frames_are_spaced_by_more_than_the_interval() {
        // 30 fps for five seconds.
        let start = Instant::now();
        let mut throttle = ClassificationThrottle::default();
        let accepted: Vec<Instant> = (0..150u64)
            .map(|i| start + Duration::from_micros(i * 33_333))
            .filter(|&t| throttle.try_acquire(t))
            .collect();

        assert!(accepted.len() >= 9);
        for pair in accepted.windows(2) {
            assert!(pair[1] - pair[0] > DEFAULT_CLASSIFICATION_INTERVAL);
        }
    }

    #[test]
    fn out_of_order_instants_are_throttled() {
        let start = Instant::now() + Duration::from_secs(1);
        let mut throttle = ClassificationThrottle::default();
        assert!(throttle.try_acquire(start));
        assert!(!throttle.try_acquire(start - Duration::from_millis(900)));
    }
}
