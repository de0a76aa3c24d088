//! Process-wide session duration accounting.
//!
//! The gateway keeps one start timestamp for the whole host session. Each
//! observation measures elapsed time against a soft limit and reports a
//! tiered warning. An elapsed time beyond the stale threshold means the host
//! process was probably restarted or idle; one beyond the cap is treated as
//! an over-count. Both reset the clock to the observation time.

use chrono::{DateTime, Duration, Utc};
use phasegate_types::config::GatewayConfig;
use serde::Serialize;
use std::sync::Mutex;
use tracing::warn;

/// Severity of the duration warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationTier {
    /// Below 50% of the limit.
    Info,
    /// 50% to 80% of the limit.
    Notice,
    /// Above 80% of the limit.
    Urgent,
}

/// Why an observation restarted the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockReset {
    Stale,
    Capped,
}

/// One observation of the session clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReading {
    pub started_at: DateTime<Utc>,
    pub elapsed_minutes: i64,
    pub limit_minutes: i64,
    pub percent: u32,
    pub tier: DurationTier,
    pub warning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset: Option<ClockReset>,
}

pub struct SessionClock {
    started_at: Mutex<DateTime<Utc>>,
    limit: Duration,
    stale_after: Duration,
    cap: Duration,
}

impl SessionClock {
    pub fn new(config: &GatewayConfig, now: DateTime<Utc>) -> Self {
        Self {
            started_at: Mutex::new(now),
            limit: Duration::minutes(config.session_limit_minutes.max(1) as i64),
            stale_after: Duration::hours(config.stale_reset_hours as i64),
            cap: Duration::hours(config.max_session_hours as i64),
        }
    }

    /// Measure elapsed time at `now`, resetting the clock when it is stale
    /// or over the cap.
    pub fn observe(&self, now: DateTime<Utc>) -> SessionReading {
        let mut started = self
            .started_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut elapsed = now - *started;
        let reset = if elapsed > self.stale_after {
            Some(ClockReset::Stale)
        } else if elapsed > self.cap {
            Some(ClockReset::Capped)
        } else {
            None
        };
        if let Some(reason) = reset {
            warn!(
                elapsed_minutes = elapsed.num_minutes(),
                reason = ?reason,
                "Session clock reset"
            );
            *started = now;
            elapsed = Duration::zero();
        }
        if elapsed < Duration::zero() {
            elapsed = Duration::zero();
        }

        let limit_minutes = self.limit.num_minutes();
        let elapsed_minutes = elapsed.num_minutes();
        let elapsed_secs = elapsed.num_seconds();
        let limit_secs = self.limit.num_seconds();
        // Tiers compare exact seconds; `percent` is rounded down for display.
        let tier = if elapsed_secs * 100 < limit_secs * 50 {
            DurationTier::Info
        } else if elapsed_secs * 100 <= limit_secs * 80 {
            DurationTier::Notice
        } else {
            DurationTier::Urgent
        };
        let percent = u32::try_from(elapsed_secs * 100 / limit_secs).unwrap_or(u32::MAX);
        let warning = match tier {
            DurationTier::Info => format!(
                "Session time: {elapsed_minutes} of {limit_minutes} minutes used ({percent}%)."
            ),
            DurationTier::Notice => format!(
                "Notice: {elapsed_minutes} of {limit_minutes} minutes used ({percent}%). \
                 Plan a checkpoint."
            ),
            DurationTier::Urgent => format!(
                "URGENT: {elapsed_minutes} of {limit_minutes} minutes used ({percent}%). \
                 Record learnings and hand off now."
            ),
        };

        SessionReading {
            started_at: *started,
            elapsed_minutes,
            limit_minutes,
            percent,
            tier,
            warning,
            reset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(start: DateTime<Utc>) -> SessionClock {
        SessionClock::new(&GatewayConfig::default(), start)
    }

    #[test]
    fn test_tiers() {
        let start = Utc::now();
        let c = clock(start);
        assert_eq!(c.observe(start + Duration::minutes(10)).tier, DurationTier::Info);
        assert_eq!(c.observe(start + Duration::minutes(60)).tier, DurationTier::Notice);
        assert_eq!(c.observe(start + Duration::minutes(96)).tier, DurationTier::Notice);
        let just_over = c.observe(start + Duration::minutes(96) + Duration::seconds(30));
        assert_eq!(just_over.percent, 80);
        assert_eq!(just_over.tier, DurationTier::Urgent);
        let urgent = c.observe(start + Duration::minutes(100));
        assert_eq!(urgent.tier, DurationTier::Urgent);
        assert!(urgent.warning.starts_with("URGENT"));
        assert_eq!(urgent.reset, None);
    }

    #[test]
    fn test_capped_elapsed_resets() {
        let start = Utc::now();
        let c = clock(start);
        let later = start + Duration::hours(5);
        let reading = c.observe(later);
        assert_eq!(reading.reset, Some(ClockReset::Capped));
        assert_eq!(reading.elapsed_minutes, 0);
        assert_eq!(reading.started_at, later);

        let next = c.observe(later + Duration::minutes(30));
        assert_eq!(next.elapsed_minutes, 30);
        assert_eq!(next.reset, None);
    }

    #[test]
    fn test_stale_clock_resets() {
        let start = Utc::now();
        let c = clock(start);
        let reading = c.observe(start + Duration::hours(7));
        assert_eq!(reading.reset, Some(ClockReset::Stale));
        assert_eq!(reading.tier, DurationTier::Info);
    }
}
