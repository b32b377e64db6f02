//! Repeating window alarms.
//!
//! One alarm per safety window, firing immediately when armed and then on a
//! fixed repeat interval until the flow is acknowledged. Arming an armed
//! window and cancelling an unarmed one are both no-ops, so the caller can
//! evaluate windows as often as it likes.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::clock::{TimerToken, Timers};

pub struct AlarmScheduler {
    timers: Timers,
    by_window: HashMap<String, TimerToken>,
    repeat: Duration,
}

impl AlarmScheduler {
    pub fn new(repeat: Duration) -> Self {
        Self {
            timers: Timers::new(),
            by_window: HashMap::new(),
            repeat,
        }
    }

    /// Arm the alarm for a window; the first fire is due immediately.
    /// Returns false without touching the schedule if already armed.
    pub fn arm(&mut self, window_id: &str, now: DateTime<Utc>) -> bool {
        if self.by_window.contains_key(window_id) {
            return false;
        }
        let token = self.timers.every_from(now, self.repeat);
        self.by_window.insert(window_id.to_string(), token);
        true
    }

    /// Cancel a window's alarm. Idempotent.
    pub fn cancel(&mut self, window_id: &str) {
        if let Some(token) = self.by_window.remove(window_id) {
            self.timers.cancel(token);
        }
    }

    /// Push the next fire of an armed window's alarm to a later instant,
    /// keeping the repeat cadence from there. Arms the window if needed.
    pub fn defer_until(&mut self, window_id: &str, due: DateTime<Utc>) {
        match self.by_window.get(window_id) {
            Some(token) => self.timers.reschedule(*token, due),
            None => {
                let token = self.timers.every_from(due, self.repeat);
                self.by_window.insert(window_id.to_string(), token);
            }
        }
    }

    pub fn is_armed(&self, window_id: &str) -> bool {
        self.by_window.contains_key(window_id)
    }

    /// Window ids whose alarm is due at `now`.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let fired = self.timers.poll(now);
        let mut windows: Vec<String> = self
            .by_window
            .iter()
            .filter(|(_, token)| fired.contains(token))
            .map(|(id, _)| id.clone())
            .collect();
        windows.sort();
        windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        "2025-03-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn fires_immediately_then_repeats() {
        let mut alarms = AlarmScheduler::new(Duration::minutes(2));
        assert!(alarms.arm("w1", t0()));

        assert_eq!(alarms.poll(t0()), vec!["w1".to_string()]);
        assert!(alarms.poll(t0() + Duration::minutes(1)).is_empty());
        assert_eq!(
            alarms.poll(t0() + Duration::minutes(2)),
            vec!["w1".to_string()]
        );
    }

    #[test]
    fn arming_twice_keeps_original_schedule() {
        let mut alarms = AlarmScheduler::new(Duration::minutes(2));
        assert!(alarms.arm("w1", t0()));
        alarms.poll(t0());

        // Re-arm attempt one minute in must not reset the cadence.
        assert!(!alarms.arm("w1", t0() + Duration::minutes(1)));
        assert!(alarms.poll(t0() + Duration::minutes(1)).is_empty());
        assert_eq!(
            alarms.poll(t0() + Duration::minutes(2)),
            vec!["w1".to_string()]
        );
    }

    #[test]
    fn cancel_is_idempotent_and_silences() {
        let mut alarms = AlarmScheduler::new(Duration::minutes(2));
        alarms.arm("w1", t0());
        alarms.cancel("w1");
        alarms.cancel("w1");
        assert!(!alarms.is_armed("w1"));
        assert!(alarms.poll(t0() + Duration::hours(1)).is_empty());
    }

    #[test]
    fn defer_pushes_next_fire() {
        let mut alarms = AlarmScheduler::new(Duration::minutes(2));
        alarms.arm("w1", t0());
        alarms.poll(t0());

        alarms.defer_until("w1", t0() + Duration::minutes(35));
        assert!(alarms.poll(t0() + Duration::minutes(10)).is_empty());
        assert_eq!(
            alarms.poll(t0() + Duration::minutes(35)),
            vec!["w1".to_string()]
        );
    }
}
