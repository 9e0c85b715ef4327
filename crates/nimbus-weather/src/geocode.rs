//! Reverse geocoding: convert coordinates to a named location.
//! Uses Nominatim (OpenStreetMap) - free, no API key required.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::WeatherError;
use crate::types::Location;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("Nimbus/", env!("CARGO_PKG_VERSION"));

/// Resolves coordinates to a location record
#[async_trait]
pub trait LocationService: Send + Sync {
    async fn get_location(&self, latitude: f64, longitude: f64) -> Result<Location, WeatherError>;
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    lat: Option<String>,
    lon: Option<String>,
    display_name: Option<String>,
    address: Option<NominatimAddress>,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    state_district: Option<String>,
    state: Option<String>,
    county: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
}

/// Short place name such as "Seattle, Washington".
fn place_name(addr: NominatimAddress) -> Option<String> {
    let state = addr.state.clone();
    let country = addr.country.clone();

    // city > town > village > municipality for the primary name
    let place = addr
        .city
        .or(addr.town)
        .or(addr.village)
        .or(addr.municipality)
        .or(addr.state_district)
        .or(addr.county)
        .or(addr.state)
        .or(addr.country)?;

    let suffix = [state, country]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty() && *s != place);

    Some(match suffix {
        Some(s) => format!("{}, {}", place, s),
        None => place,
    })
}

/// Nominatim reverse-geocoding client.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    client: Client,
    base_url: String,
}

impl NominatimClient {
    pub fn new(base_url: &str) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LocationService for NominatimClient {
    #[tracing::instrument(skip(self), level = "info")]
    async fn get_location(&self, latitude: f64, longitude: f64) -> Result<Location, WeatherError> {
        let url = format!(
            "{}/reverse?lat={}&lon={}&format=json&addressdetails=1&zoom=10",
            self.base_url, latitude, longitude
        );

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(WeatherError::Api { status, message });
        }

        let body: NominatimResponse = response.json().await?;

        if let Some(error) = body.error {
            return Err(WeatherError::LocationNotFound(error));
        }

        let address = body.address.unwrap_or_default();
        let country_code = address.country_code.clone();
        let name = place_name(address).or_else(|| body.display_name.clone());

        let mut location = Location {
            latitude: body.lat.and_then(|v| v.parse().ok()).or(Some(latitude)),
            longitude: body.lon.and_then(|v| v.parse().ok()).or(Some(longitude)),
            name,
            ..Location::default()
        };
        if let Some(display_name) = body.display_name {
            location
                .extra
                .insert("displayName".to_string(), Value::String(display_name));
        }
        if let Some(code) = country_code {
            location
                .extra
                .insert("countryCode".to_string(), Value::String(code));
        }

        tracing::info!("Reverse geocoded to: {}", location.display_name());
        Ok(location)
    }
}
