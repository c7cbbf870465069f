//! Time source for the active-window check

use chrono::{DateTime, Local, Timelike};

/// Wall-clock access
///
/// The scheduler's timer runs on tokio time; only the window check needs the
/// local wall-clock hour, which this trait makes replaceable.
pub trait Clock: Send + Sync {
    /// Current local hour, `0..=23`
    fn local_hour(&self) -> u32 {
        self.now().hour()
    }

    /// Current local time
    fn now(&self) -> DateTime<Local>;
}

/// [`Clock`] backed by the system's local time zone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_hour_in_range() {
        let clock = SystemClock;
        assert!(clock.local_hour() <= 23);
    }
}
