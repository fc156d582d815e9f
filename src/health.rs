//! Health watchdog (C7, §4.7). Purely observational — it never forces a
//! control-loop state change, only answers `Healthy()` for the HTTP surface.

use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct Health {
    clock: Arc<dyn Clock>,
    last_tick: Mutex<DateTime<Utc>>,
    grace_period: Duration,
}

impl Health {
    /// `grace_period` matches the original source's `NewHealth(time.Minute +
    /// interval)` — a floor of one minute plus one full tick interval.
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        let now = clock.now();
        Self {
            grace_period: Duration::minutes(1) + interval,
            last_tick: Mutex::new(now),
            clock,
        }
    }

    pub fn refresh(&self) {
        *self.last_tick.lock() = self.clock.now();
    }

    pub fn healthy(&self) -> bool {
        let elapsed = self.clock.now() - *self.last_tick.lock();
        elapsed < self.grace_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    #[test]
    fn healthy_immediately_after_construction() {
        let clock = MockClock::new(Utc::now());
        let health = Health::new(clock, Duration::seconds(10));
        assert!(health.healthy());
    }

    #[test]
    fn unhealthy_after_grace_period_elapses() {
        let clock = MockClock::new(Utc::now());
        let health = Health::new(clock.clone(), Duration::seconds(10));
        clock.advance(Duration::minutes(1) + Duration::seconds(11));
        assert!(!health.healthy());
    }

    #[test]
    fn refresh_resets_the_grace_period() {
        let clock = MockClock::new(Utc::now());
        let health = Health::new(clock.clone(), Duration::seconds(10));
        clock.advance(Duration::seconds(50));
        health.refresh();
        clock.advance(Duration::seconds(50));
        assert!(health.healthy());
    }
}
