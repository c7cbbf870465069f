//! Custom-versus-automatic location override
//!
//! When the override is inactive the weather provider geolocates the host;
//! when active it uses the stored coordinates. The store has its own lock,
//! independent from [`crate::ConfigStore`].

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, Result};

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude, `-90..=90`
    pub lat: f64,
    /// Longitude, `-180..=180`
    pub lon: f64,
}

impl Coordinates {
    /// Create validated coordinates
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(Error::invalid_input(format!(
                "coordinates out of range: lat={}, lon={}",
                lat, lon
            )));
        }
        Ok(Self { lat, lon })
    }
}

/// Snapshot of the location override
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LocationOverride {
    /// Whether the custom coordinates are in use
    pub active: bool,
    /// Custom latitude (meaningful only when active)
    pub lat: f64,
    /// Custom longitude (meaningful only when active)
    pub lon: f64,
}

/// Shared, lock-protected [`LocationOverride`]
#[derive(Debug, Clone, Default)]
pub struct LocationStore {
    inner: Arc<RwLock<LocationOverride>>,
}

impl LocationStore {
    /// Create a store using automatic geolocation
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current override
    pub fn get(&self) -> LocationOverride {
        *self.inner.read()
    }

    /// Custom coordinates, if the override is active
    pub fn coordinates(&self) -> Option<Coordinates> {
        let guard = self.inner.read();
        guard.active.then_some(Coordinates {
            lat: guard.lat,
            lon: guard.lon,
        })
    }

    /// Activate the override with the given coordinates
    pub fn set_custom(&self, lat: f64, lon: f64) -> Result<Coordinates> {
        let coords = Coordinates::new(lat, lon)?;
        *self.inner.write() = LocationOverride {
            active: true,
            lat: coords.lat,
            lon: coords.lon,
        };
        Ok(coords)
    }

    /// Return to automatic geolocation
    ///
    /// The previous coordinates are kept but ignored until the next
    /// [`LocationStore::set_custom`].
    pub fn reset(&self) {
        self.inner.write().active = false;
    }
}
