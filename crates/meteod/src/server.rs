//! HTTP server: shared state and routing table

use axum::Router;
use axum::routing::{get, post};
use meteo_core::api::ConfigApi;
use meteo_core::location::LocationStore;
use meteo_core::traits::{AccountStore, Geocoder, WeatherProvider};
use meteo_notify_telegram::TelegramNotifier;
use std::sync::Arc;

use crate::routes;

/// State shared by every request handler
pub struct AppState {
    /// Settings and scheduler control
    pub config_api: ConfigApi,
    /// Custom-versus-automatic location
    pub location: LocationStore,
    /// Users, link tokens and the global default location
    pub accounts: Arc<dyn AccountStore>,
    /// Weather for the home page
    pub provider: Arc<dyn WeatherProvider>,
    /// Place labels for admin and profile coordinates
    pub geocoder: Arc<dyn Geocoder>,
    /// Deep links for chat registration
    pub telegram: Arc<TelegramNotifier>,
}

/// Build the application router
///
/// A known path hit with the wrong method answers 405.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::home))
        .route("/healthz", get(routes::health_check))
        .route("/toggle-notification", post(routes::toggle_notifications))
        .route("/config", get(routes::get_config))
        .route("/config/update", post(routes::update_config))
        .route("/location/set", post(routes::set_location))
        .route("/location/reset", post(routes::reset_location))
        .route("/register", post(routes::register))
        .route("/login", post(routes::login))
        .route(
            "/user/profile",
            get(routes::get_profile).post(routes::update_profile),
        )
        .route("/telegram/token", post(routes::telegram_token))
        .with_state(state)
}
