// # Weather Provider Trait
//
// Defines the interface for fetching weather snapshots.
//
// ## Implementations
//
// - Open-Meteo: `meteo-provider-openmeteo` crate
//
// ## Usage
//
// ```rust,ignore
// use meteo_core::WeatherProvider;
//
// let snapshot = provider.fetch(None).await?; // default location
// let preview = provider.fetch(Some(coords)).await?;
// ```

use async_trait::async_trait;

use crate::error::Result;
use crate::location::Coordinates;
use crate::weather::WeatherSnapshot;

/// Trait for weather provider implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Timeouts
///
/// The scheduler enforces no timeout on `fetch`; implementations bound their
/// own outbound calls.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Fetch a snapshot
    ///
    /// With `None` the implementation resolves the default location itself
    /// (custom override or automatic geolocation).
    async fn fetch(&self, coords: Option<Coordinates>) -> Result<WeatherSnapshot>;

    /// Get the provider name (e.g., "open-meteo")
    fn provider_name(&self) -> &'static str;
}

/// Human-readable place resolved from coordinates
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Place {
    /// City, town or village
    pub city: String,
    /// Province or region (may be empty)
    pub province: String,
    /// Country (may be empty)
    pub country: String,
    /// Display label, e.g. "Milano (MI), Italia"
    pub display: String,
}

/// Reverse geocoding
///
/// Never fails: implementations fall back to a generic label.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve a place for the given coordinates
    async fn reverse(&self, coords: Coordinates) -> Place;
}
