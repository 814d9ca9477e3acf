use std::time::Duration;

use chrono::{DateTime, Utc};

/// One reading of the engagement timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngagementTick {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// True on exactly one tick: the first one at or past the requirement.
    pub reached: bool,
}

/// Elapsed-time accumulator gating vocabulary completion.
///
/// The start instant is captured once per activation cycle and survives leaving
/// and re-entering the task; only `reset` (replay) clears it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngagementTimer {
    started_at: Option<DateTime<Utc>>,
    required: Option<Duration>,
    fired: bool,
}

impl EngagementTimer {
    #[must_use]
    pub fn new(required: Option<Duration>) -> Self {
        Self {
            started_at: None,
            required,
            fired: false,
        }
    }

    /// Rebuild a timer from a persisted start instant.
    ///
    /// A task that is already complete never fires again.
    #[must_use]
    pub fn restore(
        required: Option<Duration>,
        started_at: Option<DateTime<Utc>>,
        completed: bool,
    ) -> Self {
        Self {
            started_at,
            required,
            fired: completed,
        }
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn required(&self) -> Option<Duration> {
        self.required
    }

    /// Capture the start instant if this is the first activation.
    pub fn activate(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        *self.started_at.get_or_insert(now)
    }

    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.started_at
            .map(|start| (now - start).to_std().unwrap_or(Duration::ZERO))
    }

    /// Whether ticks still have anything to report.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.started_at.is_some() && !self.fired
    }

    /// Read the timer. Returns `None` before activation and after the requirement fired.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<EngagementTick> {
        if !self.is_running() {
            return None;
        }
        let started_at = self.started_at?;
        let elapsed = self.elapsed(now)?;
        let reached = self.required.is_some_and(|required| elapsed >= required);
        if reached {
            self.fired = true;
        }
        Some(EngagementTick {
            started_at,
            elapsed,
            reached,
        })
    }

    /// Forget the start instant so the next activation captures a fresh one.
    pub fn reset(&mut self) {
        self.started_at = None;
        self.fired = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn start_is_captured_once() {
        let now = fixed_now();
        let mut timer = EngagementTimer::new(None);
        assert_eq!(timer.tick(now), None);
        assert_eq!(timer.activate(now), now);
        let later = now + chrono::Duration::seconds(30);
        assert_eq!(timer.activate(later), now);
        assert_eq!(timer.elapsed(later), Some(Duration::from_secs(30)));
    }

    #[test]
    fn requirement_fires_exactly_once() {
        let start = fixed_now();
        let mut timer = EngagementTimer::new(Some(Duration::from_millis(600_000)));
        timer.activate(start);

        let mut reached = 0;
        for n in 1..=600 {
            let tick = timer.tick(start + chrono::Duration::seconds(n)).unwrap();
            if tick.reached {
                reached += 1;
                assert_eq!(n, 600);
            }
        }
        assert_eq!(reached, 1);
        assert_eq!(timer.tick(start + chrono::Duration::seconds(601)), None);
        assert!(!timer.is_running());
    }

    #[test]
    fn untimed_timer_keeps_reporting() {
        let start = fixed_now();
        let mut timer = EngagementTimer::new(None);
        timer.activate(start);
        let tick = timer.tick(start + chrono::Duration::hours(2)).unwrap();
        assert!(!tick.reached);
        assert!(timer.is_running());
    }

    #[test]
    fn reset_allows_a_fresh_start() {
        let start = fixed_now();
        let mut timer = EngagementTimer::restore(Some(Duration::from_secs(1)), Some(start), true);
        assert!(!timer.is_running());
        timer.reset();
        assert_eq!(timer.started_at(), None);
        let again = start + chrono::Duration::minutes(5);
        timer.activate(again);
        assert_eq!(timer.tick(again).map(|t| t.elapsed), Some(Duration::ZERO));
    }

    #[test]
    fn clock_skew_never_goes_negative() {
        let start = fixed_now();
        let mut timer = EngagementTimer::new(None);
        timer.activate(start);
        assert_eq!(
            timer.elapsed(start - chrono::Duration::seconds(3)),
            Some(Duration::ZERO)
        );
    }
}
