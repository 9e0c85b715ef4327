//! Forecast retrieval from a Dark Sky-compatible API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::WeatherError;
use crate::types::{Forecast, UnitSystem};

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Resolves coordinates and a requested unit system to a forecast
#[async_trait]
pub trait ForecastService: Send + Sync {
    async fn get_forecast(
        &self,
        latitude: f64,
        longitude: f64,
        units: UnitSystem,
    ) -> Result<Forecast, WeatherError>;
}

#[derive(Debug, Clone)]
pub struct ForecastClient {
    client: Arc<Client>,
    base_url: String,
    api_key: String,
}

impl ForecastClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn forecast_url(&self, latitude: f64, longitude: f64, units: UnitSystem) -> String {
        format!(
            "{}/forecast/{}/{},{}?units={}&exclude=minutely",
            self.base_url, self.api_key, latitude, longitude, units
        )
    }
}

#[async_trait]
impl ForecastService for ForecastClient {
    #[tracing::instrument(skip(self), level = "info")]
    async fn get_forecast(
        &self,
        latitude: f64,
        longitude: f64,
        units: UnitSystem,
    ) -> Result<Forecast, WeatherError> {
        let url = self.forecast_url(latitude, longitude, units);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            tracing::debug!("Forecast request failed with status {}", status);
            return Err(WeatherError::Api { status, message });
        }

        let forecast: Forecast = response.json().await?;

        if forecast.units() != Some(units.as_str()) {
            tracing::debug!(
                "Requested {} units, forecast produced {:?}",
                units,
                forecast.units()
            );
        }

        Ok(forecast)
    }
}
