//! The refresh pipeline: `load` → `load_location` → `load_forecast`.
//!
//! Location must resolve before the forecast is requested; the forecast needs
//! its coordinates. `lastUpdated` only moves when both stages succeed.

use chrono::Utc;

use crate::error::WeatherError;
use crate::location::position_within;
use crate::refresh::RefreshPhase;
use crate::state::is_fresh;
use crate::store::WeatherStore;
use crate::types::{Coordinates, Forecast, Location, LocationSetting};

/// How a `load` call ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Location and forecast were fetched, committed and persisted
    Refreshed,
    /// Cached data is younger than the update threshold; nothing was fetched
    Fresh,
    /// No usable coordinates were available; nothing was fetched
    NoCoordinates,
}

enum LocationStep {
    Fresh,
    NoCoordinates,
    Resolved {
        location: Location,
        queried: Coordinates,
    },
}

/// Holds the single-flight slot for one pipeline call.
///
/// Dropping it clears `loading` and returns the phase to idle, whether the
/// call finished, failed or was itself dropped mid-flight.
struct RefreshGuard<'a> {
    store: &'a WeatherStore,
}

impl<'a> RefreshGuard<'a> {
    fn begin(store: &'a WeatherStore, first: RefreshPhase) -> Result<Self, WeatherError> {
        {
            let mut phase = store.phase.lock();
            if !phase.can_start_refresh() {
                return Err(WeatherError::AlreadyRefreshing);
            }
            *phase = first;
        }
        store.set_loading(true);
        Ok(Self { store })
    }

    fn location_resolved(&self) {
        let mut phase = self.store.phase.lock();
        *phase = phase.on_location_resolved();
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.store.set_loading(false);
        let mut phase = self.store.phase.lock();
        *phase = phase.on_refresh_done();
    }
}

impl WeatherStore {
    /// Resolve the configured location and commit it.
    ///
    /// Returns `Ok(None)` without doing anything when the cached data is still
    /// fresh or when no usable coordinates are available. Shares the
    /// single-flight slot with [`load`](Self::load).
    pub async fn load_location(&self) -> Result<Option<Location>, WeatherError> {
        let _guard = RefreshGuard::begin(self, RefreshPhase::Locating)?;

        match self.resolve_location().await? {
            LocationStep::Resolved { location, .. } => Ok(Some(location)),
            LocationStep::Fresh | LocationStep::NoCoordinates => Ok(None),
        }
    }

    async fn resolve_location(&self) -> Result<LocationStep, WeatherError> {
        let (last_updated, setting) = {
            let state = self.state.lock();
            (state.last_updated, state.settings.location())
        };

        if is_fresh(last_updated, Utc::now(), self.options.update_threshold) {
            tracing::debug!("Cached forecast is fresh, skipping refresh");
            return Ok(LocationStep::Fresh);
        }

        let coordinates = match setting {
            LocationSetting::Current => {
                let position = position_within(
                    self.services.position.as_ref(),
                    self.options.geolocation_timeout,
                )
                .await?;
                Coordinates::from_parts(position.latitude, position.longitude)
            }
            LocationSetting::Explicit(location) => location.coordinates(),
        };

        let Some(queried) = coordinates else {
            tracing::debug!("No usable coordinates, skipping refresh");
            return Ok(LocationStep::NoCoordinates);
        };

        let location = self
            .services
            .locations
            .get_location(queried.latitude, queried.longitude)
            .await?;

        self.set_location(location.clone());

        Ok(LocationStep::Resolved { location, queried })
    }

    /// Fetch the forecast for `coordinates` in the configured units and commit it.
    ///
    /// Shares the single-flight slot with [`load`](Self::load).
    pub async fn load_forecast(&self, coordinates: Coordinates) -> Result<Forecast, WeatherError> {
        let _guard = RefreshGuard::begin(self, RefreshPhase::Forecasting)?;
        self.fetch_forecast(coordinates).await
    }

    async fn fetch_forecast(&self, coordinates: Coordinates) -> Result<Forecast, WeatherError> {
        let units = self.settings().units();

        let forecast = self
            .services
            .forecasts
            .get_forecast(coordinates.latitude, coordinates.longitude, units)
            .await?;

        self.set_forecast(forecast.clone());

        Ok(forecast)
    }

    /// Run the full refresh.
    ///
    /// `loading` is true for the duration of the call and false afterwards
    /// regardless of the outcome. A call made while another is in flight fails
    /// with [`WeatherError::AlreadyRefreshing`] and changes nothing.
    pub async fn load(&self) -> Result<LoadOutcome, WeatherError> {
        let guard = RefreshGuard::begin(self, RefreshPhase::Locating)?;

        let (location, queried) = match self.resolve_location().await? {
            LocationStep::Fresh => return Ok(LoadOutcome::Fresh),
            LocationStep::NoCoordinates => return Ok(LoadOutcome::NoCoordinates),
            LocationStep::Resolved { location, queried } => (location, queried),
        };

        guard.location_resolved();

        // the service may correct the coordinates it was asked about
        let coordinates = location.coordinates().unwrap_or(queried);
        self.fetch_forecast(coordinates).await?;

        self.set_last_updated();
        self.update_data()?;

        tracing::info!("Weather refreshed for {}", location.display_name());
        Ok(LoadOutcome::Refreshed)
    }
}
