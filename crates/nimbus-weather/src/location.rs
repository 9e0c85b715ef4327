//! Device position acquisition.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::LocationError;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("Nimbus/", env!("CARGO_PKG_VERSION"));

/// A raw position fix. Either component may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Something that can tell where the device is
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn current_position(&self) -> Result<Position, LocationError>;
}

/// Wait for a position, giving up after `timeout`.
pub async fn position_within(
    source: &dyn PositionSource,
    timeout: Duration,
) -> Result<Position, LocationError> {
    match tokio::time::timeout(timeout, source.current_position()).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("No position fix after {:?}", timeout);
            Err(LocationError::Timeout)
        }
    }
}

/// Always reports the same position.
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub Position);

impl FixedPosition {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self(Position {
            latitude: Some(latitude),
            longitude: Some(longitude),
        })
    }
}

#[async_trait]
impl PositionSource for FixedPosition {
    async fn current_position(&self) -> Result<Position, LocationError> {
        Ok(self.0)
    }
}

#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(default)]
    error: bool,
    reason: Option<String>,
}

/// Approximates the device position from its public IP address.
#[derive(Debug, Clone)]
pub struct IpGeolocator {
    client: Client,
    url: String,
}

impl IpGeolocator {
    pub fn new(url: &str) -> Result<Self, LocationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl PositionSource for IpGeolocator {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn current_position(&self) -> Result<Position, LocationError> {
        let response = self.client.get(&self.url).send().await?;

        match response.status().as_u16() {
            401 | 403 => return Err(LocationError::PermissionDenied),
            s if !(200..300).contains(&s) => {
                tracing::debug!("IP geolocation returned status {}", s);
                return Err(LocationError::ServiceUnavailable);
            }
            _ => {}
        }

        let body: IpLookupResponse = response.json().await?;
        if body.error {
            tracing::debug!(
                "IP geolocation refused: {}",
                body.reason.as_deref().unwrap_or("no reason given")
            );
            return Err(LocationError::ServiceUnavailable);
        }

        Ok(Position {
            latitude: body.latitude,
            longitude: body.longitude,
        })
    }
}
