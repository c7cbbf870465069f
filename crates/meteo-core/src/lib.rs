// # meteo-core
//
// Core library for the weather notification service.
//
// ## Architecture Overview
//
// - **ConfigStore**: Lock-protected delivery interval and active hour window
// - **LocationStore**: Lock-protected custom-versus-automatic location
// - **NotificationScheduler**: Periodic fetch-then-broadcast loop with
//   idempotent activate/deactivate and hot interval changes
// - **ConfigApi**: Settings operations used by the HTTP layer
// - **WeatherProvider / Notifier / AccountStore**: Collaborator traits
//
// ## Design Principles
//
// 1. **Explicit ownership**: Shared state is passed in, never global
// 2. **One lock per component**: No operation holds two locks at once
// 3. **Failures stay local**: Fetch and delivery errors are logged, never fatal
// 4. **Library-First**: The daemon is a thin wiring layer over this crate

pub mod accounts;
pub mod api;
pub mod config;
pub mod error;
pub mod location;
pub mod scheduler;
pub mod traits;
pub mod weather;

// Re-export core types for convenience
pub use accounts::{FileAccountStore, MemoryAccountStore};
pub use api::{ConfigApi, ConfigResponse, UpdateConfigRequest};
pub use config::{ConfigStore, NotificationConfig};
pub use error::{Error, Result};
pub use location::{Coordinates, LocationOverride, LocationStore};
pub use scheduler::{Clock, CycleOutcome, NotificationScheduler, SystemClock};
pub use traits::{AccountStore, Geocoder, Notifier, RecipientSource, WeatherProvider};
pub use weather::WeatherSnapshot;
