//! Weather state store for Nimbus
//!
//! Holds settings, the resolved location and the last forecast, persists them
//! through a key-value store, and refreshes them through a staleness-gated
//! pipeline: device position → reverse geocoding → forecast.

pub mod error;
pub mod format;
pub mod geocode;
pub mod location;
pub mod pipeline;
pub mod provider;
pub mod refresh;
pub mod state;
pub mod storage;
pub mod store;
pub mod types;
pub mod units;

pub use error::{LocationError, StorageError, WeatherError};
pub use format::{format_data_point, FormattedDataPoint};
pub use geocode::{LocationService, NominatimClient};
pub use location::{FixedPosition, IpGeolocator, Position, PositionSource};
pub use pipeline::LoadOutcome;
pub use provider::{ForecastClient, ForecastService};
pub use refresh::RefreshPhase;
pub use state::State;
pub use storage::{KeyValueStore, MemoryKeyValueStore, Persistence, SqliteKeyValueStore};
pub use store::{Services, StoreOptions, WeatherStore};
pub use types::*;
pub use units::{FormatRule, UnitFormatTable};
