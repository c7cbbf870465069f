//! Collaborator interfaces consumed by the scheduler and the HTTP layer
//!
//! - [`WeatherProvider`]: produce a weather snapshot for given or default coordinates
//! - [`Geocoder`]: turn coordinates into a display label
//! - [`Notifier`]: deliver snapshots and plain texts to recipients
//! - [`AccountStore`] / [`RecipientSource`]: users, opt-in flags and link tokens

pub mod account_store;
pub mod notifier;
pub mod weather_provider;

pub use account_store::{
    AccountStore, DefaultLocation, Recipient, RecipientSource, User, UserProfile,
};
pub use notifier::{DeliveryFailure, DeliveryReport, Notifier};
pub use weather_provider::{Geocoder, Place, WeatherProvider};
