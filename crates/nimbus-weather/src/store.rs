//! The weather state store.
//!
//! Owns the single `State` value. Reads go through the getters below; writes
//! go through the mutations, which are synchronous and never hold the lock
//! across an await. The refresh pipeline lives in `pipeline.rs`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nimbus_core::{Config, WeatherConfig};
use parking_lot::Mutex;

use crate::error::{StorageError, WeatherError};
use crate::format::FormattedDataPoint;
use crate::geocode::{LocationService, NominatimClient};
use crate::location::{IpGeolocator, PositionSource};
use crate::provider::{ForecastClient, ForecastService};
use crate::refresh::RefreshPhase;
use crate::state::State;
use crate::storage::Persistence;
use crate::types::{Forecast, Location, Settings, SettingsPatch};
use crate::units::UnitFormatTable;

/// Tunables for the refresh pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Cached data younger than this is reused
    pub update_threshold: Duration,
    /// Upper bound on waiting for a device position
    pub geolocation_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        (&WeatherConfig::default()).into()
    }
}

impl From<&WeatherConfig> for StoreOptions {
    fn from(config: &WeatherConfig) -> Self {
        Self {
            update_threshold: config.update_threshold(),
            geolocation_timeout: config.geolocation_timeout(),
        }
    }
}

/// The collaborators the pipeline calls out to
#[derive(Clone)]
pub struct Services {
    pub position: Arc<dyn PositionSource>,
    pub locations: Arc<dyn LocationService>,
    pub forecasts: Arc<dyn ForecastService>,
}

impl Services {
    /// HTTP-backed services from configuration.
    pub fn from_config(config: &Config) -> Result<Self, WeatherError> {
        let api_key = config.services.forecast_api_key().unwrap_or_else(|| {
            tracing::warn!("No forecast API key configured; forecast requests will be rejected");
            String::new()
        });

        Ok(Self {
            position: Arc::new(IpGeolocator::new(&config.services.geolocation_api_url)?),
            locations: Arc::new(NominatimClient::new(&config.services.location_api_url)?),
            forecasts: Arc::new(ForecastClient::new(
                &config.services.forecast_api_url,
                &api_key,
            )?),
        })
    }
}

pub struct WeatherStore {
    pub(crate) state: Mutex<State>,
    pub(crate) phase: Mutex<RefreshPhase>,
    pub(crate) persistence: Persistence,
    pub(crate) services: Services,
    pub(crate) options: StoreOptions,
}

impl WeatherStore {
    /// Build the store from whatever was persisted (defaults if nothing was).
    pub fn new(persistence: Persistence, services: Services, options: StoreOptions) -> Self {
        let state = State::from_persisted(persistence.get_settings(), persistence.get_data());

        tracing::debug!(
            "Weather store initialized (last updated: {:?})",
            state.last_updated
        );

        Self {
            state: Mutex::new(state),
            phase: Mutex::new(RefreshPhase::Idle),
            persistence,
            services,
            options,
        }
    }

    /// SQLite persistence in the config directory and HTTP services.
    pub fn open(config: &Config) -> Result<Self, WeatherError> {
        std::fs::create_dir_all(&config.config_dir).map_err(StorageError::from)?;
        let persistence = Persistence::open(config.database_path())?;
        let services = Services::from_config(config)?;
        Ok(Self::new(persistence, services, (&config.weather).into()))
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    // ---- getters ----

    /// A copy of the whole state
    pub fn snapshot(&self) -> State {
        self.state.lock().clone()
    }

    pub fn settings(&self) -> Settings {
        self.state.lock().settings.clone()
    }

    pub fn location(&self) -> Option<Location> {
        self.state.lock().location.clone()
    }

    pub fn forecast(&self) -> Option<Forecast> {
        self.state.lock().forecast.clone()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_updated
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn is_update_ready(&self) -> bool {
        self.state.lock().update_ready
    }

    pub fn phase(&self) -> RefreshPhase {
        *self.phase.lock()
    }

    pub fn formats(&self) -> UnitFormatTable {
        self.state.lock().formats()
    }

    pub fn current(&self) -> Option<FormattedDataPoint> {
        let state = self.state.lock();
        state.current(&state.formats())
    }

    pub fn daily(&self) -> Option<Vec<FormattedDataPoint>> {
        let state = self.state.lock();
        let formats = state.formats();
        let points = state.daily(&formats)?.collect();
        Some(points)
    }

    pub fn hourly(&self) -> Option<Vec<FormattedDataPoint>> {
        let state = self.state.lock();
        let formats = state.formats();
        let points = state.hourly(&formats)?.collect();
        Some(points)
    }

    // ---- mutations ----

    pub fn set_loading(&self, loading: bool) {
        self.state.lock().loading = loading;
    }

    pub fn set_last_updated(&self) {
        self.state.lock().last_updated = Some(Utc::now());
    }

    /// Forget when the data was fetched so the next load refreshes.
    pub fn clear_last_updated(&self) {
        self.state.lock().last_updated = None;
    }

    pub fn set_location(&self, location: Location) {
        tracing::info!("Location set to {}", location.display_name());
        self.state.lock().location = Some(location);
    }

    pub fn set_forecast(&self, forecast: Forecast) {
        self.state.lock().forecast = Some(forecast);
    }

    /// Persist `{location, forecast, lastUpdated}` as they are now.
    pub fn update_data(&self) -> Result<(), StorageError> {
        let data = self.state.lock().cached_data();
        self.persistence.put_data(&data)
    }

    /// Merge `patch` over the current settings, persist, then commit.
    ///
    /// The lock is held for the whole operation so no other mutation can slip
    /// between the write and the commit. If the write fails the state is left
    /// as it was.
    pub fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, StorageError> {
        let mut state = self.state.lock();
        let settings = state.settings.merged(patch);

        self.persistence.put_settings(&settings)?;

        state.settings = settings.clone();
        Ok(settings)
    }

    /// Signal that a newer application version is available.
    pub fn set_update_ready(&self) {
        self.state.lock().update_ready = true;
    }
}
