//! Refresh phase state machine.
//!
//! Ensures only one refresh runs at a time. Shared by `WeatherStore::load`,
//! `load_location` and `load_forecast`.

/// Where the current refresh is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPhase {
    #[default]
    Idle,
    /// Waiting on the device position or the location service
    Locating,
    /// Waiting on the forecast service
    Forecasting,
}

impl RefreshPhase {
    /// True if a new refresh can be started.
    pub fn can_start_refresh(self) -> bool {
        matches!(self, RefreshPhase::Idle)
    }

    /// State after the location stage handed over coordinates.
    pub fn on_location_resolved(self) -> Self {
        match self {
            RefreshPhase::Locating => RefreshPhase::Forecasting,
            other => other,
        }
    }

    /// State after the refresh finished, whatever the outcome.
    pub fn on_refresh_done(self) -> Self {
        RefreshPhase::Idle
    }
}
