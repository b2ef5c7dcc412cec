//! Autosave timer policy
//!
//! Decides, once per tick of the event loop, whether the open project should
//! be saved now. An attempt that falls due while another image or geometry
//! operation is in flight is skipped, not queued: the next attempt waits for
//! the following interval, so a torn intermediate state is never written.

use std::time::{Duration, Instant};

/// Autosave settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveConfig {
    pub enabled: bool,
    /// Time between attempts
    pub interval: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(crate::config::DEFAULT_AUTOSAVE_INTERVAL_SECS),
        }
    }
}

/// What the autosave timer decided for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutosaveDecision {
    /// Autosave is turned off
    Disabled,
    /// The interval has not elapsed yet
    NotDue,
    /// Due, but there is nothing unsaved
    NotDirty,
    /// Due, but an operation is in flight; dropped until the next interval
    Skipped,
    /// Save now
    Save,
}

/// Interval timer deciding when to autosave
#[derive(Debug, Clone)]
pub struct AutosaveTimer {
    config: AutosaveConfig,
    /// Start of the current interval
    last_attempt: Instant,
}

impl AutosaveTimer {
    pub fn new(config: AutosaveConfig, now: Instant) -> Self {
        Self {
            config,
            last_attempt: now,
        }
    }

    pub fn config(&self) -> &AutosaveConfig {
        &self.config
    }

    /// Decide what to do at `now`
    ///
    /// Every due decision starts a new interval, whatever its outcome.
    pub fn poll(&mut self, now: Instant, dirty: bool, busy: bool) -> AutosaveDecision {
        if !self.config.enabled {
            return AutosaveDecision::Disabled;
        }
        if now.saturating_duration_since(self.last_attempt) < self.config.interval {
            return AutosaveDecision::NotDue;
        }
        self.last_attempt = now;

        if !dirty {
            AutosaveDecision::NotDirty
        } else if busy {
            tracing::debug!("autosave skipped, operation in flight");
            AutosaveDecision::Skipped
        } else {
            AutosaveDecision::Save
        }
    }

    /// Restart the interval, e.g. after a manual save
    pub fn reset(&mut self, now: Instant) {
        self.last_attempt = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(start: Instant) -> AutosaveTimer {
        AutosaveTimer::new(
            AutosaveConfig {
                enabled: true,
                interval: Duration::from_secs(60),
            },
            start,
        )
    }

    #[test]
    fn test_waits_for_interval() {
        let start = Instant::now();
        let mut timer = timer(start);
        assert_eq!(
            timer.poll(start + Duration::from_secs(59), true, false),
            AutosaveDecision::NotDue
        );
        assert_eq!(
            timer.poll(start + Duration::from_secs(60), true, false),
            AutosaveDecision::Save
        );
        assert_eq!(
            timer.poll(start + Duration::from_secs(61), true, false),
            AutosaveDecision::NotDue
        );
    }

    #[test]
    fn test_clean_project_is_not_saved() {
        let start = Instant::now();
        let mut timer = timer(start);
        assert_eq!(
            timer.poll(start + Duration::from_secs(90), false, false),
            AutosaveDecision::NotDirty
        );
    }

    #[test]
    fn test_busy_attempt_is_skipped_not_queued() {
        let start = Instant::now();
        let mut timer = timer(start);
        let due = start + Duration::from_secs(60);
        assert_eq!(timer.poll(due, true, true), AutosaveDecision::Skipped);

        // Work finished right after, but the attempt is not retried early.
        assert_eq!(
            timer.poll(due + Duration::from_secs(1), true, false),
            AutosaveDecision::NotDue
        );
        assert_eq!(
            timer.poll(due + Duration::from_secs(60), true, false),
            AutosaveDecision::Save
        );
    }

    #[test]
    fn test_disabled() {
        let start = Instant::now();
        let mut timer = AutosaveTimer::new(
            AutosaveConfig {
                enabled: false,
                interval: Duration::from_secs(1),
            },
            start,
        );
        assert_eq!(
            timer.poll(start + Duration::from_secs(10), true, false),
            AutosaveDecision::Disabled
        );
    }

    #[test]
    fn test_reset_restarts_interval() {
        let start = Instant::now();
        let mut timer = timer(start);
        timer.reset(start + Duration::from_secs(50));
        assert_eq!(
            timer.poll(start + Duration::from_secs(70), true, false),
            AutosaveDecision::NotDue
        );
    }
}
