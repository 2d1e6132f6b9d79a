//! Idle watchdog.
//!
//! Halts the engine when no cycle has reached a justified outcome for longer
//! than the configured limit. Justified outcomes are the ones that carry a
//! logged reason: a settled or rolled-back trade, a risk rejection, an
//! advisory veto, and (when configured) an idle scan. Provider failures and
//! paused scans never reset the timer.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::CyclePhase;

#[derive(Debug, Clone)]
pub struct IdleWatchdog {
    max_idle: Duration,
    idle_counts_as_justified: bool,
    last_justified: DateTime<Utc>,
}

impl IdleWatchdog {
    pub fn new(max_idle: Duration, idle_counts_as_justified: bool, now: DateTime<Utc>) -> Self {
        Self {
            max_idle,
            idle_counts_as_justified,
            last_justified: now,
        }
    }

    pub fn from_minutes(minutes: u64, idle_counts_as_justified: bool, now: DateTime<Utc>) -> Self {
        let minutes = i64::try_from(minutes).unwrap_or(i64::MAX / 60_000);
        Self::new(Duration::minutes(minutes), idle_counts_as_justified, now)
    }

    pub fn is_justified(&self, phase: CyclePhase) -> bool {
        match phase {
            CyclePhase::Idle => self.idle_counts_as_justified,
            CyclePhase::Rejected | CyclePhase::Vetoed | CyclePhase::Settled | CyclePhase::RolledBack => true,
            _ => false,
        }
    }

    /// Record a cycle's terminal phase. Returns true if it reset the timer.
    pub fn record(&mut self, phase: CyclePhase, now: DateTime<Utc>) -> bool {
        if !self.is_justified(phase) {
            return false;
        }
        self.last_justified = now;
        debug!(phase = %phase, "Watchdog reset");
        true
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_justified
    }

    /// `Some(idle time)` once the limit is strictly exceeded.
    pub fn check(&self, now: DateTime<Utc>) -> Option<Duration> {
        let idle = self.idle_for(now);
        (idle > self.max_idle).then_some(idle)
    }

    pub fn last_justified(&self) -> DateTime<Utc> {
        self.last_justified
    }
}
