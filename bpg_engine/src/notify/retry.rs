use std::time::Duration;

/// The delivery schedule for one webhook sequence: explicit `{attempt, next_delay, ceiling}` state driven
/// by the dispatcher's timer, rather than recursive sleeps.
///
/// Each yielded value is the wait before the next attempt. Delays start at the configured initial value
/// and double on every attempt; the schedule ends once the next delay would exceed the ceiling. With the
/// defaults (5s doubling under a 3600s ceiling) that is delays of 5, 10, 20, ..., 2560 seconds, ten
/// attempts spread over roughly an hour.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    attempt: u32,
    next_delay: Duration,
    ceiling: Duration,
}

impl RetrySchedule {
    pub fn new(initial_delay: Duration, ceiling: Duration) -> Self {
        Self { attempt: 0, next_delay: initial_delay, ceiling }
    }

    /// The number of attempts handed out so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Iterator for RetrySchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.next_delay > self.ceiling || self.next_delay.is_zero() {
            return None;
        }
        let delay = self.next_delay;
        self.attempt += 1;
        self.next_delay *= 2;
        Some(delay)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_schedule_doubles_from_5s_to_10_attempts() {
        let schedule = RetrySchedule::new(Duration::from_secs(5), Duration::from_secs(3600));
        let delays: Vec<u64> = schedule.map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 80, 160, 320, 640, 1280, 2560]);
    }

    #[test]
    fn attempts_are_counted() {
        let mut schedule = RetrySchedule::new(Duration::from_secs(5), Duration::from_secs(3600));
        assert_eq!(schedule.attempt(), 0);
        schedule.next();
        schedule.next();
        assert_eq!(schedule.attempt(), 2);
    }

    #[test]
    fn ceiling_below_initial_yields_nothing() {
        let mut schedule = RetrySchedule::new(Duration::from_secs(10), Duration::from_secs(5));
        assert!(schedule.next().is_none());
    }

    #[test]
    fn zero_initial_delay_cannot_spin() {
        let mut schedule = RetrySchedule::new(Duration::ZERO, Duration::from_secs(3600));
        assert!(schedule.next().is_none());
    }
}
