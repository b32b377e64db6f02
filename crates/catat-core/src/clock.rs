//! Clock abstraction and cooperative timers.
//!
//! No internal threads anywhere in this crate: the engines operate on
//! wall-clock reads and the caller drives `Timers::poll()` periodically.
//! Tests substitute [`ManualClock`] to control time directly.

use std::cell::RefCell;
use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// Wall-clock source injected into every engine.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RefCell<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RefCell::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.borrow_mut();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.borrow_mut() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.borrow()
    }
}

/// Token identifying a scheduled timer. Returned by `after`/`every`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

#[derive(Debug, Clone)]
struct TimerEntry {
    due: DateTime<Utc>,
    /// `Some` for repeating timers.
    period: Option<Duration>,
}

/// Cooperative timer registry.
///
/// Deadlines are stored, not slept on. The caller polls with the current
/// time and routes fired tokens back into the engines, so timer-driven
/// mutations are serialized exactly like user actions.
#[derive(Debug, Default)]
pub struct Timers {
    entries: HashMap<TimerToken, TimerEntry>,
    next_token: u64,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a one-shot timer.
    pub fn after(&mut self, now: DateTime<Utc>, delay: Duration) -> TimerToken {
        self.insert(TimerEntry {
            due: now + delay,
            period: None,
        })
    }

    /// Schedule a repeating timer. First fire is one full period from now.
    pub fn every(&mut self, now: DateTime<Utc>, period: Duration) -> TimerToken {
        self.every_from(now + period, period)
    }

    /// Schedule a repeating timer with an explicit first deadline.
    pub fn every_from(&mut self, first_due: DateTime<Utc>, period: Duration) -> TimerToken {
        self.insert(TimerEntry {
            due: first_due,
            period: Some(period),
        })
    }

    /// Cancel a timer. Double-cancel is a no-op.
    pub fn cancel(&mut self, token: TimerToken) {
        self.entries.remove(&token);
    }

    /// Push a timer's next deadline to an explicit instant.
    pub fn reschedule(&mut self, token: TimerToken, due: DateTime<Utc>) {
        if let Some(entry) = self.entries.get_mut(&token) {
            entry.due = due;
        }
    }

    pub fn is_armed(&self, token: TimerToken) -> bool {
        self.entries.contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drain every timer due at `now`. One-shot timers are removed,
    /// repeating timers are advanced by their period.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Vec<TimerToken> {
        let mut fired = Vec::new();
        let due: Vec<TimerToken> = self
            .entries
            .iter()
            .filter(|(_, e)| e.due <= now)
            .map(|(t, _)| *t)
            .collect();

        for token in due {
            match self.entries.get_mut(&token) {
                Some(entry) => {
                    if let Some(period) = entry.period {
                        // Skip missed beats rather than firing a burst.
                        while entry.due <= now {
                            entry.due += period;
                        }
                    } else {
                        self.entries.remove(&token);
                    }
                    fired.push(token);
                }
                None => {}
            }
        }
        fired
    }

    fn insert(&mut self, entry: TimerEntry) -> TimerToken {
        let token = TimerToken(self.next_token);
        self.next_token += 1;
        self.entries.insert(token, entry);
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        "2025-03-01T09:00:00Z".parse().unwrap()
    }

    #[test]
    fn one_shot_fires_once() {
        let mut timers = Timers::new();
        let token = timers.after(t0(), Duration::minutes(2));

        assert!(timers.poll(t0() + Duration::minutes(1)).is_empty());
        let fired = timers.poll(t0() + Duration::minutes(2));
        assert_eq!(fired, vec![token]);
        assert!(timers.poll(t0() + Duration::minutes(5)).is_empty());
    }

    #[test]
    fn repeating_fires_every_period() {
        let mut timers = Timers::new();
        let token = timers.every(t0(), Duration::minutes(2));

        assert_eq!(timers.poll(t0() + Duration::minutes(2)), vec![token]);
        assert_eq!(timers.poll(t0() + Duration::minutes(4)), vec![token]);
        assert!(timers.is_armed(token));
    }

    #[test]
    fn repeating_skips_missed_beats() {
        let mut timers = Timers::new();
        let token = timers.every(t0(), Duration::minutes(2));

        // 10 minutes late: one fire, not five.
        assert_eq!(timers.poll(t0() + Duration::minutes(10)), vec![token]);
        assert!(timers.poll(t0() + Duration::minutes(10)).is_empty());
        assert_eq!(timers.poll(t0() + Duration::minutes(12)), vec![token]);
    }

    #[test]
    fn double_cancel_is_noop() {
        let mut timers = Timers::new();
        let token = timers.after(t0(), Duration::minutes(1));
        timers.cancel(token);
        timers.cancel(token);
        assert!(timers.poll(t0() + Duration::hours(1)).is_empty());
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(t0());
        assert_eq!(clock.now(), t0());
        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now(), t0() + Duration::seconds(90));
    }
}
