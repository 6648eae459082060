use std::time::{Duration, Instant};

/// Periodic deadline polled from the UI loop. Late polls keep the cadence,
/// missed ticks are dropped.
#[derive(Debug, Clone)]
pub struct Ticker {
    period: Duration,
    next: Option<Instant>,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self { period, next: None }
    }

    pub fn start_now(&mut self, now: Instant) {
        self.next = Some(now);
    }

    pub fn start_after(&mut self, now: Instant) {
        self.next = Some(now + self.period);
    }

    pub fn stop(&mut self) {
        self.next = None;
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(due) = self.next else {
            return false;
        };
        if now < due {
            return false;
        }
        let mut next = due + self.period;
        if next <= now {
            next = now + self.period;
        }
        self.next = Some(next);
        true
    }

    pub fn until(&self, now: Instant) -> Option<Duration> {
        self.next.map(|due| due.saturating_duration_since(now))
    }
}
