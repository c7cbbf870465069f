//! Notification settings and their shared store
//!
//! [`NotificationConfig`] holds the delivery interval and the active hour
//! window. [`ConfigStore`] shares one instance between the HTTP handlers and
//! the scheduler under a read/write lock.
//!
//! Invalid values are never rejected: every write is normalized so that a
//! non-positive interval becomes [`DEFAULT_INTERVAL`], an interval longer
//! than [`MAX_INTERVAL`] is capped to it, and an hour outside `0..=23`
//! becomes [`DEFAULT_START_HOUR`] or [`DEFAULT_END_HOUR`].

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default delivery interval (5 minutes)
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Longest accepted delivery interval (one year)
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Default first hour of the active window
pub const DEFAULT_START_HOUR: u32 = 7;

/// Default end of the active window (exclusive)
pub const DEFAULT_END_HOUR: u32 = 18;

/// Highest valid hour of day
const MAX_HOUR: u32 = 23;

/// Delivery interval and active window
///
/// The window is the half-open range `[start_hour, end_hour)`. A window with
/// `start_hour >= end_hour` is empty: it does not wrap past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Period between scheduled delivery cycles
    pub interval: Duration,

    /// First hour (local time) in which deliveries are sent
    pub start_hour: u32,

    /// Hour (local time) from which deliveries stop being sent
    pub end_hour: u32,
}

impl NotificationConfig {
    /// Create a configuration, normalizing invalid fields to defaults
    pub fn new(interval: Duration, start_hour: u32, end_hour: u32) -> Self {
        Self {
            interval,
            start_hour,
            end_hour,
        }
        .normalized()
    }

    /// Build a configuration from raw, possibly negative, user input
    ///
    /// `interval_minutes <= 0` maps to the default interval, anything longer
    /// than [`MAX_INTERVAL`] is capped, and hours outside `0..=23` map to
    /// their respective defaults.
    pub fn from_raw(interval_minutes: i64, start_hour: i64, end_hour: i64) -> Self {
        let interval = u64::try_from(interval_minutes)
            .ok()
            .filter(|minutes| *minutes > 0)
            .map(|minutes| Duration::from_secs(minutes.saturating_mul(60)).min(MAX_INTERVAL))
            .unwrap_or(DEFAULT_INTERVAL);

        Self {
            interval,
            start_hour: raw_hour(start_hour, DEFAULT_START_HOUR),
            end_hour: raw_hour(end_hour, DEFAULT_END_HOUR),
        }
    }

    /// Replace every invalid field by its default
    pub fn normalized(self) -> Self {
        Self {
            interval: if self.interval.is_zero() {
                DEFAULT_INTERVAL
            } else {
                self.interval.min(MAX_INTERVAL)
            },
            start_hour: if self.start_hour > MAX_HOUR {
                DEFAULT_START_HOUR
            } else {
                self.start_hour
            },
            end_hour: if self.end_hour > MAX_HOUR {
                DEFAULT_END_HOUR
            } else {
                self.end_hour
            },
        }
    }

    /// Interval expressed in whole minutes
    pub fn interval_minutes(&self) -> u64 {
        self.interval.as_secs() / 60
    }

    /// Whether deliveries are allowed at the given local hour
    pub fn is_active_hour(&self, hour: u32) -> bool {
        !(hour < self.start_hour || hour >= self.end_hour)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            start_hour: DEFAULT_START_HOUR,
            end_hour: DEFAULT_END_HOUR,
        }
    }
}

fn raw_hour(hour: i64, default: u32) -> u32 {
    u32::try_from(hour)
        .ok()
        .filter(|h| *h <= MAX_HOUR)
        .unwrap_or(default)
}

/// Shared, lock-protected [`NotificationConfig`]
///
/// Readers proceed concurrently with each other; a writer excludes both
/// readers and other writers. Every accessor takes the lock, copies, and
/// releases it before returning, so no caller ever holds it across an await
/// point or a call into another component.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    inner: Arc<RwLock<NotificationConfig>>,
}

impl ConfigStore {
    /// Create a store seeded with the given (normalized) configuration
    pub fn new(initial: NotificationConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial.normalized())),
        }
    }

    /// Snapshot of the current configuration
    pub fn get(&self) -> NotificationConfig {
        *self.inner.read()
    }

    /// Replace the configuration, returning the normalized value stored
    pub fn set(&self, config: NotificationConfig) -> NotificationConfig {
        let normalized = config.normalized();
        *self.inner.write() = normalized;
        normalized
    }

    /// Current delivery interval
    pub fn interval(&self) -> Duration {
        self.inner.read().interval
    }
}
