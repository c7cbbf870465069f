//! Reverse geocoding through Nominatim (OpenStreetMap)
//!
//! Turns coordinates into a `"City (PR), Country"` label. Lookups never fail:
//! any transport or parse error yields a generic "Custom location" place.

use async_trait::async_trait;
use meteo_core::location::Coordinates;
use meteo_core::traits::{Geocoder, Place};
use serde::Deserialize;

/// Label used when no place name can be resolved
pub const CUSTOM_LOCATION_LABEL: &str = "Custom location";

/// Known province names and their two-letter codes, matched by substring
const PROVINCE_CODES: &[(&str, &str)] = &[
    ("milano città", "MI"),
    ("milano", "MI"),
    ("milan", "MI"),
    ("roma", "RM"),
    ("torino", "TO"),
    ("napoli", "NA"),
    ("genova", "GE"),
    ("venezia", "VE"),
    ("venice", "VE"),
    ("verona", "VR"),
    ("bari", "BA"),
    ("palermo", "PA"),
    ("catania", "CT"),
    ("firenze", "FI"),
    ("florence", "FI"),
    ("bologna", "BO"),
    ("cagliari", "CA"),
    ("trento", "TN"),
    ("bolzano", "BZ"),
    ("brescia", "BS"),
    ("bergamo", "BG"),
    ("monza", "MB"),
    ("modena", "MO"),
    ("padova", "PD"),
    ("vicenza", "VI"),
    ("como", "CO"),
    ("pavia", "PV"),
    ("messina", "ME"),
    ("taranto", "TA"),
    ("perugia", "PG"),
    ("ancona", "AN"),
    ("siena", "SI"),
    ("arezzo", "AR"),
    ("lecce", "LE"),
    ("salerno", "SA"),
    ("reggio calabria", "RC"),
    ("cosenza", "CS"),
];

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    #[serde(default)]
    address: NominatimAddress,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    county: Option<String>,
    province: Option<String>,
    state: Option<String>,
    region: Option<String>,
    country: Option<String>,
}

impl NominatimAddress {
    fn into_place(self) -> Place {
        let city = first_non_empty([self.city, self.town, self.village])
            .unwrap_or_else(|| CUSTOM_LOCATION_LABEL.to_string());
        let province =
            first_non_empty([self.county, self.province, self.state, self.region]).unwrap_or_default();
        let country = self.country.unwrap_or_default();
        let display = place_label(&city, &province_code(&province), &country);

        Place {
            city,
            province,
            country,
            display,
        }
    }
}

fn first_non_empty<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
}

/// Two-letter code for a province name
///
/// Known Italian provinces map through a fixed table; anything else falls
/// back to its first two ASCII letters, upper-cased.
pub fn province_code(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }

    let lowered = name.to_lowercase();
    if let Some((_, code)) = PROVINCE_CODES.iter().find(|(key, _)| lowered.contains(key)) {
        return (*code).to_string();
    }

    lowered
        .chars()
        .filter(|c| c.is_ascii_lowercase())
        .take(2)
        .collect::<String>()
        .to_uppercase()
}

/// Display label: `"City (PR), Country"`, `"City, Country"` or `"City"`
pub fn place_label(city: &str, province_code: &str, country: &str) -> String {
    if !province_code.is_empty() {
        format!("{} ({}), {}", city, province_code, country)
    } else if !city.is_empty() && !country.is_empty() {
        format!("{}, {}", city, country)
    } else {
        city.to_string()
    }
}

/// Nominatim-backed [`Geocoder`]
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    reverse_url: String,
}

impl NominatimGeocoder {
    pub fn new(client: reqwest::Client, reverse_url: impl Into<String>) -> Self {
        Self {
            client,
            reverse_url: reverse_url.into(),
        }
    }

    async fn lookup(&self, coords: Coordinates) -> Result<Place, reqwest::Error> {
        let response = self
            .client
            .get(&self.reverse_url)
            .query(&[
                ("format", "json".to_string()),
                ("lat", format!("{:.6}", coords.lat)),
                ("lon", format!("{:.6}", coords.lon)),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: NominatimResponse = response.json().await?;
        Ok(body.address.into_place())
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, coords: Coordinates) -> Place {
        match self.lookup(coords).await {
            Ok(place) => place,
            Err(e) => {
                tracing::debug!(
                    "Reverse geocode failed for {:.4},{:.4}: {}",
                    coords.lat,
                    coords.lon,
                    e
                );
                Place {
                    city: CUSTOM_LOCATION_LABEL.to_string(),
                    display: CUSTOM_LOCATION_LABEL.to_string(),
                    ..Place::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_province_codes() {
        assert_eq!(province_code("Città Metropolitana di Milano"), "MI");
        assert_eq!(province_code("Roma Capitale"), "RM");
        assert_eq!(province_code("Reggio Calabria"), "RC");
    }

    #[test]
    fn test_province_code_fallback() {
        assert_eq!(province_code("Bavaria"), "BA");
        assert_eq!(province_code("Île-de-France"), "LE");
        assert_eq!(province_code("x"), "X");
        assert_eq!(province_code(""), "");
    }

    #[test]
    fn test_place_labels() {
        assert_eq!(place_label("Milano", "MI", "Italia"), "Milano (MI), Italia");
        assert_eq!(place_label("Oslo", "", "Norge"), "Oslo, Norge");
        assert_eq!(place_label("Somewhere", "", ""), "Somewhere");
    }

    #[test]
    fn test_address_field_precedence() {
        let address = NominatimAddress {
            town: Some("Bellagio".into()),
            village: Some("ignored".into()),
            state: Some("Lombardia".into()),
            region: Some("ignored".into()),
            country: Some("Italia".into()),
            ..NominatimAddress::default()
        };

        let place = address.into_place();
        assert_eq!(place.city, "Bellagio");
        assert_eq!(place.province, "Lombardia");
        assert_eq!(place.display, "Bellagio (LO), Italia");
    }

    #[test]
    fn test_empty_address_uses_custom_label() {
        let place = NominatimAddress::default().into_place();
        assert_eq!(place.city, CUSTOM_LOCATION_LABEL);
        assert_eq!(place.display, CUSTOM_LOCATION_LABEL);
    }
}
