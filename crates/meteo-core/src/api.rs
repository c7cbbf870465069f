//! HTTP-facing settings operations
//!
//! [`ConfigApi`] is the glue between request handlers, the [`ConfigStore`]
//! and the [`NotificationScheduler`]. It never returns an error: invalid
//! input is normalized and the response always reflects what was stored.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::{ConfigStore, NotificationConfig};
use crate::scheduler::NotificationScheduler;

/// Body of a settings update
///
/// Missing fields deserialize as 0 and are then normalized like any other
/// out-of-range value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfigRequest {
    pub interval_minutes: i64,
    pub start_hour: i64,
    pub end_hour: i64,
}

/// Settings as reported to HTTP clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub interval_minutes: u64,
    pub start_hour: u32,
    pub end_hour: u32,
    pub notifications_on: bool,
}

impl ConfigResponse {
    fn new(config: &NotificationConfig, notifications_on: bool) -> Self {
        Self {
            interval_minutes: config.interval_minutes(),
            start_hour: config.start_hour,
            end_hour: config.end_hour,
            notifications_on,
        }
    }
}

/// Read/update/toggle operations over the shared settings
#[derive(Debug, Clone)]
pub struct ConfigApi {
    config: ConfigStore,
    scheduler: Arc<NotificationScheduler>,
}

impl ConfigApi {
    pub fn new(config: ConfigStore, scheduler: Arc<NotificationScheduler>) -> Self {
        Self { config, scheduler }
    }

    /// Current settings and scheduler state
    pub fn get_config(&self) -> ConfigResponse {
        let config = self.config.get();
        ConfigResponse::new(&config, self.scheduler.is_running())
    }

    /// Normalize and store new settings
    ///
    /// A running scheduler picks up the new interval immediately; the
    /// on/off state is left alone.
    pub fn update_config(&self, request: UpdateConfigRequest) -> ConfigResponse {
        let requested = NotificationConfig::from_raw(
            request.interval_minutes,
            request.start_hour,
            request.end_hour,
        );
        let stored = self.config.set(requested);

        info!(
            "Notification settings updated: every {} min, window {:02}:00-{:02}:00",
            stored.interval_minutes(),
            stored.start_hour,
            stored.end_hour
        );

        if self.scheduler.is_running() {
            self.scheduler.reconfigure_interval(stored.interval);
        }

        ConfigResponse::new(&stored, self.scheduler.is_running())
    }

    /// Flip the scheduler on or off, returning the new state
    pub fn toggle(&self) -> bool {
        if self.scheduler.is_running() {
            self.scheduler.deactivate();
        } else {
            self.scheduler.activate();
        }
        self.scheduler.is_running()
    }
}
