use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_GRACE_MS: i64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub grace_ms: i64,
}

impl SessionPolicy {
    pub fn with_grace_ms(grace_ms: i64) -> Self {
        Self {
            grace_ms: grace_ms.max(0),
        }
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::with_grace_ms(DEFAULT_GRACE_MS)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionClock {
    policy: SessionPolicy,
}

impl SessionClock {
    pub fn new(policy: SessionPolicy) -> Self {
        Self { policy }
    }

    pub fn grace(&self) -> Duration {
        Duration::milliseconds(self.policy.grace_ms)
    }

    /// Nominal end of the session, without grace.
    pub fn deadline(&self, started_at: DateTime<Utc>, duration_minutes: i32) -> DateTime<Utc> {
        started_at + Duration::minutes(duration_minutes as i64)
    }

    pub fn within_time_limit(
        &self,
        started_at: DateTime<Utc>,
        duration_minutes: i32,
        now: DateTime<Utc>,
    ) -> bool {
        now - started_at <= Duration::minutes(duration_minutes as i64) + self.grace()
    }

    pub fn remaining_time(
        &self,
        started_at: DateTime<Utc>,
        duration_minutes: i32,
        now: DateTime<Utc>,
    ) -> Duration {
        let remaining = self.deadline(started_at, duration_minutes) - now;
        remaining.max(Duration::zero())
    }

    pub fn remaining_seconds(
        &self,
        started_at: DateTime<Utc>,
        duration_minutes: i32,
        now: DateTime<Utc>,
    ) -> i64 {
        self.remaining_time(started_at, duration_minutes, now)
            .num_seconds()
    }

    pub fn elapsed_seconds(&self, started_at: DateTime<Utc>, until: DateTime<Utc>) -> i64 {
        (until - started_at).num_milliseconds().div_euclid(1000)
    }

    pub fn is_abandoned(
        &self,
        started_at: DateTime<Utc>,
        duration_minutes: i32,
        now: DateTime<Utc>,
    ) -> bool {
        now - started_at > Duration::minutes(duration_minutes as i64 * 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::from_rfc3339;

    fn t0() -> DateTime<Utc> {
        from_rfc3339("2026-03-01T09:00:00Z").unwrap()
    }

    #[test]
    fn grace_window_boundary() {
        let clock = SessionClock::default();
        let start = t0();
        let limit = start + Duration::minutes(60);
        assert!(clock.within_time_limit(start, 60, limit + Duration::milliseconds(2999)));
        assert!(clock.within_time_limit(start, 60, limit + Duration::milliseconds(3000)));
        assert!(!clock.within_time_limit(start, 60, limit + Duration::milliseconds(3001)));
    }

    #[test]
    fn custom_grace_is_honoured() {
        let clock = SessionClock::new(SessionPolicy::with_grace_ms(0));
        let start = t0();
        assert!(!clock.within_time_limit(start, 1, start + Duration::milliseconds(60_001)));
    }

    #[test]
    fn remaining_time_never_negative() {
        let clock = SessionClock::default();
        let start = t0();
        assert_eq!(clock.remaining_seconds(start, 10, start), 600);
        assert_eq!(clock.remaining_seconds(start, 10, start + Duration::seconds(599)), 1);
        assert_eq!(clock.remaining_seconds(start, 10, start + Duration::hours(5)), 0);
        assert!(clock.remaining_time(start, 10, start + Duration::days(3)) >= Duration::zero());
    }

    #[test]
    fn elapsed_seconds_floors() {
        let clock = SessionClock::default();
        let start = t0();
        assert_eq!(clock.elapsed_seconds(start, start + Duration::milliseconds(1999)), 1);
        assert_eq!(clock.elapsed_seconds(start, start + Duration::minutes(3)), 180);
    }

    #[test]
    fn abandonment_after_double_duration() {
        let clock = SessionClock::default();
        let start = t0();
        assert!(!clock.is_abandoned(start, 10, start + Duration::minutes(19)));
        assert!(!clock.is_abandoned(start, 10, start + Duration::minutes(20)));
        assert!(clock.is_abandoned(start, 10, start + Duration::minutes(21)));
    }
}
