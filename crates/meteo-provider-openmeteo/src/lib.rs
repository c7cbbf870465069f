// # Open-Meteo Weather Provider
//
// This crate provides an Open-Meteo implementation of WeatherProvider.
//
// ## Location Resolution
//
// - Explicit coordinates: used as given, labelled by reverse geocoding
// - No coordinates, custom override active: the override, reverse geocoded
// - No coordinates, no override: IP geolocation via ip-api.com
//
// ## API Reference
//
// - Forecast: https://open-meteo.com/en/docs
// - Geolocation: https://ip-api.com/docs/api:json
// - Reverse geocoding: https://nominatim.org/release-docs/develop/api/Reverse/
//
// All three base URLs are overridable so tests can point them at a local
// mock server.

pub mod geocode;

pub use geocode::{CUSTOM_LOCATION_LABEL, NominatimGeocoder, place_label, province_code};

use async_trait::async_trait;
use chrono::Local;
use meteo_core::location::{Coordinates, LocationStore};
use meteo_core::traits::{Geocoder, WeatherProvider};
use meteo_core::weather::{CurrentConditions, DayOutlook, WeatherSnapshot, describe_wmo_code};
use meteo_core::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

/// Open-Meteo forecast endpoint
pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// ip-api geolocation endpoint
pub const DEFAULT_GEOIP_URL: &str = "http://ip-api.com/json/";

/// Nominatim reverse geocoding endpoint
pub const DEFAULT_REVERSE_URL: &str = "https://nominatim.openstreetmap.org/reverse";

/// Timezone used for daily aggregation
const FORECAST_TIMEZONE: &str = "Europe/Rome";

/// Per-request timeout for every outbound call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Nominatim requires an identifying user agent
const USER_AGENT: &str = concat!("meteo-notify/", env!("CARGO_PKG_VERSION"));

const HOURLY_FIELDS: &str =
    "temperature_2m,weather_code,precipitation,wind_speed_10m,relative_humidity_2m,visibility";
const DAILY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,weather_code";

/// Base URLs of the three upstream services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub forecast: String,
    pub geoip: String,
    pub reverse: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            forecast: DEFAULT_FORECAST_URL.to_string(),
            geoip: DEFAULT_GEOIP_URL.to_string(),
            reverse: DEFAULT_REVERSE_URL.to_string(),
        }
    }
}

/// ip-api response
#[derive(Debug, Deserialize)]
struct GeoIpResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
    #[serde(default)]
    city: String,
    #[serde(default)]
    country: String,
}

/// Open-Meteo forecast response (only the requested series)
#[derive(Debug, Deserialize)]
struct ForecastResponse {
    hourly: HourlySeries,
    daily: DailySeries,
}

#[derive(Debug, Deserialize)]
struct HourlySeries {
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    weather_code: Vec<Option<i64>>,
    #[serde(default)]
    precipitation: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    relative_humidity_2m: Vec<Option<f64>>,
    #[serde(default)]
    visibility: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct DailySeries {
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    weather_code: Vec<Option<i64>>,
}

/// Entry `index` of a series, or a `Weather` error naming the series
fn entry<T: Copy>(series: &[Option<T>], index: usize, name: &str) -> Result<T> {
    series
        .get(index)
        .copied()
        .flatten()
        .ok_or_else(|| Error::weather(format!("forecast is missing {}[{}]", name, index)))
}

impl ForecastResponse {
    fn current(&self) -> Result<CurrentConditions> {
        let hourly = &self.hourly;
        Ok(CurrentConditions {
            condition: describe_wmo_code(entry(&hourly.weather_code, 0, "hourly.weather_code")?)
                .to_string(),
            temperature_c: entry(&hourly.temperature_2m, 0, "hourly.temperature_2m")?,
            humidity_pct: entry(&hourly.relative_humidity_2m, 0, "hourly.relative_humidity_2m")?,
            wind_kmh: entry(&hourly.wind_speed_10m, 0, "hourly.wind_speed_10m")?,
            // Open-Meteo reports metres
            visibility_km: entry(&hourly.visibility, 0, "hourly.visibility")? / 1000.0,
            precipitation_mm: entry(&hourly.precipitation, 0, "hourly.precipitation")?,
        })
    }

    fn day(&self, index: usize) -> Result<DayOutlook> {
        let daily = &self.daily;
        Ok(DayOutlook {
            max_c: entry(&daily.temperature_2m_max, index, "daily.temperature_2m_max")?,
            min_c: entry(&daily.temperature_2m_min, index, "daily.temperature_2m_min")?,
            condition: describe_wmo_code(entry(&daily.weather_code, index, "daily.weather_code")?)
                .to_string(),
        })
    }
}

/// Where a fetch is for, and how to label it
#[derive(Debug, Clone, PartialEq)]
struct ResolvedLocation {
    coordinates: Coordinates,
    place: String,
    country: String,
}

/// Open-Meteo weather provider
pub struct OpenMeteoProvider {
    client: reqwest::Client,
    endpoints: Endpoints,
    geocoder: NominatimGeocoder,
    location: LocationStore,
}

impl OpenMeteoProvider {
    /// Create a provider against the public endpoints
    ///
    /// `location` is consulted on every `fetch(None)`.
    pub fn new(location: LocationStore) -> Result<Self> {
        Self::with_endpoints(location, Endpoints::default())
    }

    /// Create a provider against custom endpoints
    pub fn with_endpoints(location: LocationStore, endpoints: Endpoints) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        let geocoder = NominatimGeocoder::new(client.clone(), endpoints.reverse.clone());

        Ok(Self {
            client,
            endpoints,
            geocoder,
            location,
        })
    }

    /// The reverse geocoder sharing this provider's HTTP client
    pub fn geocoder(&self) -> &NominatimGeocoder {
        &self.geocoder
    }

    async fn resolve(&self, coords: Option<Coordinates>) -> Result<ResolvedLocation> {
        if let Some(coordinates) = coords.or_else(|| self.location.coordinates()) {
            let place = self.geocoder.reverse(coordinates).await;
            return Ok(ResolvedLocation {
                coordinates,
                place: place.display,
                country: place.country,
            });
        }

        self.geolocate().await
    }

    async fn geolocate(&self) -> Result<ResolvedLocation> {
        let response = self
            .client
            .get(&self.endpoints.geoip)
            .send()
            .await
            .map_err(|e| Error::weather(format!("Geolocation request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::weather(format!(
                "Geolocation returned HTTP {}",
                response.status()
            )));
        }

        let body: GeoIpResponse = response
            .json()
            .await
            .map_err(|e| Error::weather(format!("Invalid geolocation response: {}", e)))?;

        if body.status == "fail" {
            return Err(Error::weather(format!(
                "Geolocation failed: {}",
                body.message
            )));
        }

        let coordinates = Coordinates::new(body.lat, body.lon)
            .map_err(|e| Error::weather(format!("Geolocation returned {}", e)))?;

        tracing::debug!("Geolocated host to {} ({})", body.city, body.country);

        Ok(ResolvedLocation {
            coordinates,
            place: body.city,
            country: body.country,
        })
    }

    async fn forecast(&self, coords: Coordinates) -> Result<ForecastResponse> {
        let response = self
            .client
            .get(&self.endpoints.forecast)
            .query(&[
                ("latitude", coords.lat.to_string()),
                ("longitude", coords.lon.to_string()),
                ("hourly", HOURLY_FIELDS.to_string()),
                ("daily", DAILY_FIELDS.to_string()),
                ("timezone", FORECAST_TIMEZONE.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::weather(format!("Forecast request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::weather(format!(
                "Forecast returned HTTP {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::weather(format!("Invalid forecast response: {}", e)))
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    async fn fetch(&self, coords: Option<Coordinates>) -> Result<WeatherSnapshot> {
        let resolved = self.resolve(coords).await?;
        let forecast = self.forecast(resolved.coordinates).await?;

        Ok(WeatherSnapshot {
            place: resolved.place,
            country: resolved.country,
            coordinates: resolved.coordinates,
            observed_at: Local::now(),
            current: forecast.current()?,
            today: forecast.day(0)?,
            tomorrow: forecast.day(1)?,
        })
    }

    fn provider_name(&self) -> &'static str {
        "open-meteo"
    }
}

#[async_trait]
impl Geocoder for OpenMeteoProvider {
    async fn reverse(&self, coords: Coordinates) -> meteo_core::traits::Place {
        self.geocoder.reverse(coords).await
    }
}

impl std::fmt::Debug for OpenMeteoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenMeteoProvider")
            .field("endpoints", &self.endpoints)
            .field("location", &self.location.get())
            .finish()
    }
}
