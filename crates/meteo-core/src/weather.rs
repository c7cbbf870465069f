//! Weather snapshot model shared by providers, notifiers and the home page

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::location::Coordinates;

/// Current conditions at observation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    /// Human-readable condition (with emoji)
    pub condition: String,
    /// Air temperature in °C
    pub temperature_c: f64,
    /// Relative humidity in percent
    pub humidity_pct: f64,
    /// Wind speed in km/h
    pub wind_kmh: f64,
    /// Visibility in km
    pub visibility_km: f64,
    /// Precipitation in mm
    pub precipitation_mm: f64,
}

/// Daily min/max outlook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayOutlook {
    /// Maximum temperature in °C
    pub max_c: f64,
    /// Minimum temperature in °C
    pub min_c: f64,
    /// Dominant condition
    pub condition: String,
}

/// One fetched weather report for a place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// Display label, e.g. "Milano (MI), Italia"
    pub place: String,
    /// Country name (may be empty)
    pub country: String,
    /// Where the forecast was requested for
    pub coordinates: Coordinates,
    /// When the snapshot was produced
    pub observed_at: DateTime<Local>,
    /// Current conditions
    pub current: CurrentConditions,
    /// Today's outlook
    pub today: DayOutlook,
    /// Tomorrow's outlook
    pub tomorrow: DayOutlook,
}

/// Describe a WMO weather interpretation code
///
/// See <https://open-meteo.com/en/docs#weathervariables>.
pub fn describe_wmo_code(code: i64) -> &'static str {
    match code {
        0 => "☀️ Clear sky",
        1 => "🌤️ Mainly clear",
        2 => "⛅ Partly cloudy",
        3 => "☁️ Overcast",
        45 => "🌫️ Fog",
        48 => "🌫️ Depositing rime fog",
        51 => "🌦️ Light drizzle",
        53 => "🌦️ Moderate drizzle",
        55 => "🌧️ Dense drizzle",
        61 => "🌧️ Slight rain",
        63 => "🌧️ Moderate rain",
        65 => "🌧️ Heavy rain",
        71 => "❄️ Slight snowfall",
        73 => "❄️ Moderate snowfall",
        75 => "❄️ Heavy snowfall",
        77 => "❄️ Snow grains",
        80 => "🌧️ Slight rain showers",
        81 => "⛈️ Moderate rain showers",
        82 => "⛈️ Violent rain showers",
        85 => "🌨️ Slight snow showers",
        86 => "🌨️ Heavy snow showers",
        95 => "⛈️ Thunderstorm",
        96 => "⛈️ Thunderstorm with slight hail",
        99 => "⛈️ Thunderstorm with heavy hail",
        _ => "❓ Unknown conditions",
    }
}
