//! Error types for the weather crate and their mapping onto the application hierarchy.

use nimbus_core::{AppError, ReqwestErrorExt, RusqliteErrorExt};
use thiserror::Error;

/// Device position errors
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Location service unavailable")]
    ServiceUnavailable,
    #[error("Location request timed out")]
    Timeout,
    #[error("Location lookup failed: {0}")]
    Network(#[from] reqwest::Error),
}

/// Durable storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Weather provider and refresh pipeline errors
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Location error: {0}")]
    Location(#[from] LocationError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Location not found: {0}")]
    LocationNotFound(String),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("A refresh is already in progress")]
    AlreadyRefreshing,
}

impl From<StorageError> for nimbus_core::StorageError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Sqlite(e) => e.into_storage_error(),
            StorageError::Serialization(e) => nimbus_core::StorageError::Corruption(e.to_string()),
            StorageError::Io(e) => nimbus_core::StorageError::Unavailable(e.to_string()),
        }
    }
}

impl From<LocationError> for AppError {
    fn from(e: LocationError) -> Self {
        match e {
            LocationError::PermissionDenied => {
                AppError::Location(nimbus_core::LocationError::PermissionDenied)
            }
            LocationError::ServiceUnavailable => {
                AppError::Location(nimbus_core::LocationError::ServiceUnavailable)
            }
            LocationError::Timeout => AppError::Location(nimbus_core::LocationError::Timeout),
            LocationError::Network(e) => AppError::Network(e.into_network_error()),
        }
    }
}

impl From<WeatherError> for AppError {
    fn from(e: WeatherError) -> Self {
        use nimbus_core::WeatherError as CoreWeatherError;

        match e {
            WeatherError::Network(e) => AppError::Network(e.into_network_error()),
            WeatherError::Location(e) => e.into(),
            WeatherError::Storage(e) => AppError::Storage(e.into()),
            WeatherError::LocationNotFound(s) => {
                AppError::Weather(CoreWeatherError::LocationNotFound(s))
            }
            WeatherError::Api { status: 401 | 403, .. } => {
                AppError::Weather(CoreWeatherError::InvalidApiKey)
            }
            WeatherError::Api { status, .. } if status >= 500 => {
                AppError::Weather(CoreWeatherError::ServiceUnavailable)
            }
            WeatherError::Api { status, message } => {
                AppError::Weather(CoreWeatherError::ApiError(format!("{}: {}", status, message)))
            }
            WeatherError::AlreadyRefreshing => {
                AppError::Weather(CoreWeatherError::AlreadyRefreshing)
            }
        }
    }
}
