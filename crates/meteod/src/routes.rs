//! API route handlers
//!
//! JSON bodies are read as raw bytes and decoded here so that any malformed
//! body answers 400, whatever its content type.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use meteo_core::Error;
use meteo_core::api::{ConfigResponse, UpdateConfigRequest};
use meteo_core::location::Coordinates;
use meteo_core::traits::{DefaultLocation, User, UserProfile};
use meteo_core::weather::WeatherSnapshot;
use meteo_provider_openmeteo::CUSTOM_LOCATION_LABEL;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::page;
use crate::server::AppState;

/// Error answered as `{"error": message}` with a status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(msg) | Error::Conflict(msg) => Self::bad_request(msg),
            Error::Authentication(msg) => Self::unauthorized(msg),
            other => {
                error!("Request failed: {}", other);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid JSON: {}", e)))
}

#[derive(Debug, Deserialize)]
struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SetLocationRequest {
    lat: f64,
    lon: f64,
    admin_username: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProfileUpdate {
    username: String,
    #[serde(alias = "telegram_user")]
    telegram_chat_id: String,
    notify: bool,
    lat: f64,
    lon: f64,
    city: String,
}

#[derive(Debug, Deserialize)]
pub struct UsernameQuery {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenRequest {
    #[serde(default)]
    username: String,
}

/// Query of the home page
#[derive(Debug, Default, Deserialize)]
pub struct HomeQuery {
    username: Option<String>,
    lat: Option<String>,
    lon: Option<String>,
    /// Label replacing the resolved place on a preview
    city: Option<String>,
}

impl HomeQuery {
    fn username(&self) -> Option<&str> {
        self.username.as_deref().filter(|u| !u.is_empty())
    }

    fn preview_requested(&self) -> bool {
        self.lat.as_deref().is_some_and(|v| !v.is_empty())
            || self.lon.as_deref().is_some_and(|v| !v.is_empty())
    }

    fn preview_coordinates(&self) -> Option<Coordinates> {
        let lat = self.lat.as_deref()?.trim().parse().ok()?;
        let lon = self.lon.as_deref()?.trim().parse().ok()?;
        Coordinates::new(lat, lon).ok()
    }
}

/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Flip notifications on or off
pub async fn toggle_notifications(State(state): State<Arc<AppState>>) -> Json<Value> {
    let enabled = state.config_api.toggle();
    info!(
        "Notifications {}",
        if enabled { "enabled" } else { "disabled" }
    );
    Json(json!({ "enabled": enabled }))
}

/// Current settings
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<ConfigResponse> {
    Json(state.config_api.get_config())
}

/// Store new settings, answering with the normalized values
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<ConfigResponse>> {
    let request: UpdateConfigRequest = parse_body(&body)?;
    Ok(Json(state.config_api.update_config(request)))
}

/// Set the global default location (admin only)
pub async fn set_location(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let request: SetLocationRequest = parse_body(&body)?;
    let coords = Coordinates::new(request.lat, request.lon)?;

    if request.admin_username.is_empty() {
        return Err(ApiError::unauthorized("unauthorized"));
    }
    match state.accounts.get_user(&request.admin_username).await? {
        Some(user) if user.is_admin => {}
        _ => return Err(ApiError::unauthorized("unauthorized")),
    }

    let place = state.geocoder.reverse(coords).await;
    state
        .accounts
        .set_default_location(&DefaultLocation {
            lat: coords.lat,
            lon: coords.lon,
            place: place.display.clone(),
        })
        .await?;
    state.location.set_custom(coords.lat, coords.lon)?;

    info!(
        "Default location set by {}: {} ({:.4}, {:.4})",
        request.admin_username, place.display, coords.lat, coords.lon
    );

    Ok(Json(json!({
        "success": true,
        "lat": coords.lat,
        "lon": coords.lon,
        "place": place.display,
        "city": place.city,
        "country": place.country,
    })))
}

/// Return to automatic geolocation
///
/// The persisted default is left in place and applies again after a restart.
pub async fn reset_location(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.location.reset();
    info!("Location reset to automatic geolocation");
    Json(json!({ "success": true }))
}

/// Create an account
pub async fn register(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<StatusCode> {
    let credentials: Credentials = parse_body(&body)?;
    if credentials.username.is_empty() || credentials.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }

    state
        .accounts
        .create_user(&credentials.username, &credentials.password)
        .await?;
    info!("Registered user {}", credentials.username);
    Ok(StatusCode::CREATED)
}

/// Check credentials and answer with the profile
pub async fn login(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<UserProfile>> {
    let credentials: Credentials = parse_body(&body)?;

    match state
        .accounts
        .verify_password(&credentials.username, &credentials.password)
        .await
    {
        Ok(user) => Ok(Json(UserProfile::from(&user))),
        Err(Error::Authentication(_) | Error::NotFound(_) | Error::InvalidInput(_)) => {
            Err(ApiError::unauthorized("invalid credentials"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Profile of a user, created empty on first access
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UsernameQuery>,
) -> ApiResult<Json<UserProfile>> {
    let username = query
        .username
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::bad_request("username is required"))?;

    let user = match state.accounts.get_user(&username).await? {
        Some(user) => user,
        None => {
            let user = User::new(username);
            state.accounts.upsert_user(&user).await?;
            user
        }
    };

    Ok(Json(UserProfile::from(&user)))
}

/// Update delivery settings and the personal location of a user
///
/// Zero coordinates and an empty city leave the stored values unchanged.
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<UserProfile>> {
    let update: ProfileUpdate = parse_body(&body)?;
    if update.username.is_empty() {
        return Err(ApiError::bad_request("username is required"));
    }

    let mut user = state
        .accounts
        .get_user(&update.username)
        .await?
        .unwrap_or_else(|| User::new(update.username.clone()));

    user.telegram_chat_id = update.telegram_chat_id;
    user.notify = update.notify;
    if update.lat != 0.0 || update.lon != 0.0 {
        let coords = Coordinates::new(update.lat, update.lon)?;
        user.lat = coords.lat;
        user.lon = coords.lon;
    }
    if !update.city.is_empty() {
        user.city = update.city;
    }

    if (user.city.is_empty() || user.city == CUSTOM_LOCATION_LABEL) && user.has_location() {
        let place = state
            .geocoder
            .reverse(Coordinates {
                lat: user.lat,
                lon: user.lon,
            })
            .await;
        user.city = place.city;
    }

    state.accounts.upsert_user(&user).await?;
    Ok(Json(UserProfile::from(&user)))
}

/// Issue a chat registration token and its deep link
pub async fn telegram_token(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let request: TokenRequest = parse_body(&body)?;
    if request.username.is_empty() {
        return Err(ApiError::bad_request("username is required"));
    }
    if state.accounts.get_user(&request.username).await?.is_none() {
        return Err(ApiError::bad_request("unknown user"));
    }

    let token = state.accounts.issue_link_token(&request.username).await?;
    let link = state.telegram.deep_link(&token).await;

    Ok(Json(json!({ "token": token, "link": link })))
}

/// Home page
///
/// Shows, in order of preference: the saved location of `username`, a
/// preview of `lat`/`lon`, the default location. The first two fall through
/// silently when unusable.
pub async fn home(State(state): State<Arc<AppState>>, Query(query): Query<HomeQuery>) -> Response {
    let settings = state.config_api.get_config();

    if let Some(snapshot) = user_snapshot(&state, &query).await {
        return Html(page::render_weather(&snapshot, &settings)).into_response();
    }
    if let Some(snapshot) = preview_snapshot(&state, &query).await {
        return Html(page::render_weather(&snapshot, &settings)).into_response();
    }

    let mut snapshot = match state.provider.fetch(None).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("Home page weather fetch failed: {}", e);
            return (
                StatusCode::BAD_GATEWAY,
                Html(page::render_error(&e.to_string())),
            )
                .into_response();
        }
    };

    // The public page does not reveal where the host geolocates to
    if query.username().is_none() && !query.preview_requested() && !state.location.get().active
    {
        snapshot.place.clear();
        snapshot.country.clear();
    }

    Html(page::render_weather(&snapshot, &settings)).into_response()
}

async fn user_snapshot(state: &AppState, query: &HomeQuery) -> Option<WeatherSnapshot> {
    let username = query.username()?;
    let user = match state.accounts.get_user(username).await {
        Ok(user) => user?,
        Err(e) => {
            warn!("Failed to load user {}: {}", username, e);
            return None;
        }
    };
    if !user.has_location() {
        return None;
    }

    let coords = Coordinates {
        lat: user.lat,
        lon: user.lon,
    };
    match state.provider.fetch(Some(coords)).await {
        Ok(mut snapshot) => {
            if !user.city.is_empty() {
                snapshot.place = user.city;
            }
            Some(snapshot)
        }
        Err(e) => {
            warn!("Weather fetch for user {} failed: {}", username, e);
            None
        }
    }
}

async fn preview_snapshot(state: &AppState, query: &HomeQuery) -> Option<WeatherSnapshot> {
    let coords = query.preview_coordinates()?;
    match state.provider.fetch(Some(coords)).await {
        Ok(mut snapshot) => {
            if let Some(city) = query.city.as_deref().filter(|c| !c.is_empty()) {
                snapshot.place = city.to_string();
            }
            Some(snapshot)
        }
        Err(e) => {
            warn!("Preview weather fetch failed: {}", e);
            None
        }
    }
}
