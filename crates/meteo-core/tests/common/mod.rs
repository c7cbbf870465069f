//! Test doubles and common utilities for scheduler contract tests
//!
//! These doubles count calls and return canned data; none of them touch the
//! network or the wall clock.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use meteo_core::config::{ConfigStore, NotificationConfig};
use meteo_core::error::{Error, Result};
use meteo_core::location::Coordinates;
use meteo_core::scheduler::{Clock, NotificationScheduler};
use meteo_core::traits::{DeliveryFailure, DeliveryReport, Notifier, WeatherProvider};
use meteo_core::weather::{CurrentConditions, DayOutlook, WeatherSnapshot};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Build a fixed snapshot
pub fn sample_snapshot() -> WeatherSnapshot {
    let outlook = DayOutlook {
        max_c: 24.0,
        min_c: 12.0,
        condition: "⛅ Partly cloudy".to_string(),
    };

    WeatherSnapshot {
        place: "Milano (MI), Italia".to_string(),
        country: "Italia".to_string(),
        coordinates: Coordinates {
            lat: 45.46,
            lon: 9.19,
        },
        observed_at: Local::now(),
        current: CurrentConditions {
            condition: "⛅ Partly cloudy".to_string(),
            temperature_c: 18.5,
            humidity_pct: 60.0,
            wind_kmh: 7.2,
            visibility_km: 10.0,
            precipitation_mm: 0.0,
        },
        today: outlook.clone(),
        tomorrow: outlook,
    }
}

/// A WeatherProvider that counts fetches and can be switched to failing
///
/// A gated provider parks every fetch until [`CountingProvider::open_gate`]
/// is called, which stands in for a slow upstream.
pub struct CountingProvider {
    fetches: AtomicUsize,
    completed: AtomicUsize,
    failing: AtomicBool,
    gated: AtomicBool,
    gate: Semaphore,
}

impl CountingProvider {
    fn build(failing: bool, gated: bool) -> Arc<Self> {
        Arc::new(Self {
            fetches: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failing: AtomicBool::new(failing),
            gated: AtomicBool::new(gated),
            gate: Semaphore::new(0),
        })
    }

    pub fn new() -> Arc<Self> {
        Self::build(false, false)
    }

    pub fn failing() -> Arc<Self> {
        Self::build(true, false)
    }

    pub fn gated() -> Arc<Self> {
        Self::build(false, true)
    }

    /// Release every parked fetch and stop gating new ones
    pub fn open_gate(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.close();
    }

    /// Fetches started, including ones still parked at the gate
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherProvider for CountingProvider {
    async fn fetch(&self, _coords: Option<Coordinates>) -> Result<WeatherSnapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.gated.load(Ordering::SeqCst) {
            let _ = self.gate.acquire().await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::weather("provider unreachable"));
        }
        Ok(sample_snapshot())
    }

    fn provider_name(&self) -> &'static str {
        "counting"
    }
}

/// A Notifier that counts broadcasts
///
/// Every broadcast reports one delivered and one failed recipient, so
/// per-recipient failures are exercised on every cycle.
#[derive(Default)]
pub struct CountingNotifier {
    broadcasts: AtomicUsize,
    texts: AtomicUsize,
}

impl CountingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }

    pub fn text_count(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn broadcast(&self, _snapshot: &WeatherSnapshot) -> Result<DeliveryReport> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        Ok(DeliveryReport {
            sent: 1,
            failures: vec![DeliveryFailure {
                address: "blocked-chat".to_string(),
                error: "Forbidden: bot was blocked by the user".to_string(),
            }],
        })
    }

    async fn send_text(&self, _address: &str, _text: &str) -> Result<()> {
        self.texts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A Clock whose hour is set by the test
pub struct FixedClock {
    hour: AtomicU32,
}

impl FixedClock {
    pub fn at(hour: u32) -> Arc<Self> {
        Arc::new(Self {
            hour: AtomicU32::new(hour),
        })
    }

    pub fn set_hour(&self, hour: u32) {
        self.hour.store(hour, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn local_hour(&self) -> u32 {
        self.hour.load(Ordering::SeqCst)
    }

    fn now(&self) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 6, 1, self.local_hour(), 0, 0)
            .earliest()
            .unwrap_or_else(Local::now)
    }
}

/// Everything a scheduler test needs
pub struct Harness {
    pub config: ConfigStore,
    pub provider: Arc<CountingProvider>,
    pub notifier: Arc<CountingNotifier>,
    pub clock: Arc<FixedClock>,
    pub scheduler: Arc<NotificationScheduler>,
}

impl Harness {
    /// Scheduler with the given interval, window and clock hour
    pub fn new(interval: Duration, start_hour: u32, end_hour: u32, hour: u32) -> Self {
        Self::with_provider(interval, start_hour, end_hour, hour, CountingProvider::new())
    }

    pub fn with_provider(
        interval: Duration,
        start_hour: u32,
        end_hour: u32,
        hour: u32,
        provider: Arc<CountingProvider>,
    ) -> Self {
        let config = ConfigStore::new(NotificationConfig::new(interval, start_hour, end_hour));
        let notifier = CountingNotifier::new();
        let clock = FixedClock::at(hour);
        let scheduler = Arc::new(NotificationScheduler::new(
            config.clone(),
            provider.clone(),
            notifier.clone(),
            clock.clone(),
        ));

        Self {
            config,
            provider,
            notifier,
            clock,
            scheduler,
        }
    }
}

/// Let spawned tasks run without advancing time
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub const MINUTE: Duration = Duration::from_secs(60);
