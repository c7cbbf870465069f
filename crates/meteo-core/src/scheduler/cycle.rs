//! One fetch-then-broadcast delivery cycle

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::clock::Clock;
use crate::config::ConfigStore;
use crate::traits::{DeliveryReport, Notifier, WeatherProvider};

/// What a single delivery cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The local hour was outside `[start, end)`; nothing was fetched
    OutsideWindow {
        hour: u32,
        start: u32,
        end: u32,
    },

    /// The weather provider failed; nothing was sent
    FetchFailed(String),

    /// The notifier could not start the broadcast
    BroadcastFailed(String),

    /// The broadcast ran; individual recipients may still have failed
    Delivered(DeliveryReport),
}

impl CycleOutcome {
    /// Whether a broadcast was attempted
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }

    /// Log the outcome at a level matching its severity
    pub fn log(&self, trigger: &str) {
        match self {
            Self::OutsideWindow { hour, start, end } => {
                info!(
                    "Skipping {} delivery: outside window ({:02}:00-{:02}:00), hour={:02}",
                    trigger, start, end, hour
                );
            }
            Self::FetchFailed(e) => {
                error!("{} delivery: weather fetch failed: {}", trigger, e);
            }
            Self::BroadcastFailed(e) => {
                error!("{} delivery: broadcast failed: {}", trigger, e);
            }
            Self::Delivered(report) => {
                for failure in &report.failures {
                    warn!(
                        "{} delivery: recipient {} failed: {}",
                        trigger, failure.address, failure.error
                    );
                }
                info!(
                    "{} delivery sent to {}/{} recipients",
                    trigger,
                    report.sent,
                    report.attempted()
                );
            }
        }
    }
}

/// Collaborators needed to run a delivery cycle
///
/// Cheap to clone; the scheduler hands one copy to the loop task and one to
/// each immediate delivery.
#[derive(Clone)]
pub struct DeliveryCycle {
    config: ConfigStore,
    provider: Arc<dyn WeatherProvider>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl DeliveryCycle {
    pub fn new(
        config: ConfigStore,
        provider: Arc<dyn WeatherProvider>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            provider,
            notifier,
            clock,
        }
    }

    /// Timer-driven cycle: honours the active window
    pub async fn run_scheduled(&self) -> CycleOutcome {
        let config = self.config.get();
        let hour = self.clock.local_hour();

        if !config.is_active_hour(hour) {
            return CycleOutcome::OutsideWindow {
                hour,
                start: config.start_hour,
                end: config.end_hour,
            };
        }

        self.deliver().await
    }

    /// Out-of-band cycle run on activation: ignores the active window
    pub async fn run_immediate(&self) -> CycleOutcome {
        self.deliver().await
    }

    async fn deliver(&self) -> CycleOutcome {
        let snapshot = match self.provider.fetch(None).await {
            Ok(snapshot) => snapshot,
            Err(e) => return CycleOutcome::FetchFailed(e.to_string()),
        };

        debug!(
            "Fetched snapshot for {} from {}",
            snapshot.place,
            self.provider.provider_name()
        );

        match self.notifier.broadcast(&snapshot).await {
            Ok(report) => CycleOutcome::Delivered(report),
            Err(e) => CycleOutcome::BroadcastFailed(e.to_string()),
        }
    }
}

impl std::fmt::Debug for DeliveryCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryCycle")
            .field("config", &self.config)
            .field("provider", &self.provider.provider_name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;
    use crate::error::{Error, Result};
    use crate::location::Coordinates;
    use crate::weather::{CurrentConditions, DayOutlook, WeatherSnapshot};
    use async_trait::async_trait;
    use chrono::{DateTime, Local, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StaticClock(u32);

    impl Clock for StaticClock {
        fn local_hour(&self) -> u32 {
            self.0
        }

        fn now(&self) -> DateTime<Local> {
            Local.with_ymd_and_hms(2024, 5, 1, self.0, 0, 0).unwrap()
        }
    }

    struct StubProvider {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WeatherProvider for StubProvider {
        async fn fetch(&self, _coords: Option<Coordinates>) -> Result<WeatherSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::weather("offline"));
            }
            let outlook = DayOutlook {
                max_c: 20.0,
                min_c: 10.0,
                condition: "☀️ Clear sky".into(),
            };
            Ok(WeatherSnapshot {
                place: "Test".into(),
                country: String::new(),
                coordinates: Coordinates { lat: 0.0, lon: 0.0 },
                observed_at: Local::now(),
                current: CurrentConditions {
                    condition: "☀️ Clear sky".into(),
                    temperature_c: 15.0,
                    humidity_pct: 50.0,
                    wind_kmh: 3.0,
                    visibility_km: 10.0,
                    precipitation_mm: 0.0,
                },
                today: outlook.clone(),
                tomorrow: outlook,
            })
        }

        fn provider_name(&self) -> &'static str {
            "stub"
        }
    }

    struct StubNotifier;

    #[async_trait]
    impl Notifier for StubNotifier {
        async fn broadcast(&self, _snapshot: &WeatherSnapshot) -> Result<DeliveryReport> {
            Ok(DeliveryReport {
                sent: 2,
                failures: Vec::new(),
            })
        }

        async fn send_text(&self, _address: &str, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    fn cycle(hour: u32, provider: Arc<StubProvider>) -> DeliveryCycle {
        let config = ConfigStore::new(NotificationConfig::new(Duration::from_secs(60), 7, 18));
        DeliveryCycle::new(
            config,
            provider,
            Arc::new(StubNotifier),
            Arc::new(StaticClock(hour)),
        )
    }

    fn provider(fail: bool) -> Arc<StubProvider> {
        Arc::new(StubProvider {
            fail,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_scheduled_cycle_outside_window_skips_fetch() {
        let provider = provider(false);
        let outcome = cycle(6, provider.clone()).run_scheduled().await;

        assert_eq!(
            outcome,
            CycleOutcome::OutsideWindow {
                hour: 6,
                start: 7,
                end: 18
            }
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_scheduled_cycle_agrees_with_active_hour() {
        let config = NotificationConfig::new(Duration::from_secs(60), 7, 18);
        for hour in 0..24 {
            let provider = provider(false);
            let outcome = cycle(hour, provider.clone()).run_scheduled().await;
            assert_eq!(
                outcome.is_delivered(),
                config.is_active_hour(hour),
                "hour = {}",
                hour
            );
        }
    }

    #[tokio::test]
    async fn test_immediate_cycle_ignores_window() {
        let provider = provider(false);
        let outcome = cycle(23, provider.clone()).run_immediate().await;

        assert!(outcome.is_delivered());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported() {
        let outcome = cycle(9, provider(true)).run_scheduled().await;
        assert!(matches!(outcome, CycleOutcome::FetchFailed(ref e) if e.contains("offline")));
    }
}
