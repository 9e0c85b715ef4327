//! Integration tests for the refresh pipeline against stub services.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use nimbus_weather::storage::{DATA_KEY, SETTINGS_KEY};
use nimbus_weather::{
    Coordinates, Forecast, ForecastService, KeyValueStore, LoadOutcome, Location, LocationError,
    LocationService, MemoryKeyValueStore, Persistence, Position, PositionSource, RefreshPhase,
    Services, SettingsPatch, StorageError, StoreOptions, UnitSystem, WeatherError, WeatherStore,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;

struct StubPosition {
    calls: Arc<AtomicUsize>,
    position: Option<Position>,
    stall: bool,
}

#[async_trait]
impl PositionSource for StubPosition {
    async fn current_position(&self) -> Result<Position, LocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stall {
            std::future::pending::<()>().await;
        }
        self.position.ok_or(LocationError::PermissionDenied)
    }
}

struct StubLocations {
    calls: Arc<AtomicUsize>,
    queried: Arc<Mutex<Vec<(f64, f64)>>>,
    location: Option<Location>,
}

#[async_trait]
impl LocationService for StubLocations {
    async fn get_location(&self, latitude: f64, longitude: f64) -> Result<Location, WeatherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queried.lock().push((latitude, longitude));
        self.location
            .clone()
            .ok_or_else(|| WeatherError::LocationNotFound("nowhere".into()))
    }
}

/// Lets a test hold a forecast request open.
#[derive(Default)]
struct Gate {
    entered: Notify,
    release: Notify,
}

struct StubForecasts {
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<(f64, f64, UnitSystem)>>>,
    forecast: Option<Forecast>,
    gate: Option<Arc<Gate>>,
}

#[async_trait]
impl ForecastService for StubForecasts {
    async fn get_forecast(
        &self,
        latitude: f64,
        longitude: f64,
        units: UnitSystem,
    ) -> Result<Forecast, WeatherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push((latitude, longitude, units));
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.forecast.clone().ok_or(WeatherError::Api {
            status: 503,
            message: "down".into(),
        })
    }
}

/// Accepts reads, fails every write.
struct ReadOnly(MemoryKeyValueStore);

impl KeyValueStore for ReadOnly {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.0.get(key)
    }

    fn set(&self, _: &str, _: &str) -> Result<(), StorageError> {
        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        )))
    }
}

struct Setup {
    settings: Option<Value>,
    data: Option<Value>,
    position: Option<Position>,
    stall_position: bool,
    location: Option<Location>,
    forecast: Option<Value>,
    gate: Option<Arc<Gate>>,
    read_only: bool,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            settings: Some(json!({"location": "current", "units": "si"})),
            data: None,
            position: Some(position(10.0, 20.0)),
            stall_position: false,
            location: Some(Location::named("X", 10.0, 20.0)),
            forecast: Some(json!({"currently": {"temp": 0}, "flags": {"units": "si"}})),
            gate: None,
            read_only: false,
        }
    }
}

struct Harness {
    store: Arc<WeatherStore>,
    kv: Arc<MemoryKeyValueStore>,
    position_calls: Arc<AtomicUsize>,
    location_calls: Arc<AtomicUsize>,
    forecast_calls: Arc<AtomicUsize>,
    queried: Arc<Mutex<Vec<(f64, f64)>>>,
    requests: Arc<Mutex<Vec<(f64, f64, UnitSystem)>>>,
}

impl Harness {
    fn service_calls(&self) -> usize {
        self.position_calls.load(Ordering::SeqCst)
            + self.location_calls.load(Ordering::SeqCst)
            + self.forecast_calls.load(Ordering::SeqCst)
    }

    fn persisted(&self, key: &str) -> Option<Value> {
        self.kv
            .get(key)
            .unwrap()
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }
}

fn position(latitude: f64, longitude: f64) -> Position {
    Position {
        latitude: Some(latitude),
        longitude: Some(longitude),
    }
}

fn minutes_ago(minutes: i64) -> String {
    (Utc::now() - chrono::Duration::minutes(minutes)).to_rfc3339()
}

fn stale_data() -> Value {
    json!({
        "location": {"name": "Old", "latitude": 1.0, "longitude": 2.0},
        "forecast": {"currently": {"temp": 5}, "flags": {"units": "si"}},
        "lastUpdated": minutes_ago(11)
    })
}

fn harness(setup: Setup) -> Harness {
    let kv = Arc::new(MemoryKeyValueStore::new());
    if let Some(settings) = &setup.settings {
        kv.set(SETTINGS_KEY, &settings.to_string()).unwrap();
    }
    if let Some(data) = &setup.data {
        kv.set(DATA_KEY, &data.to_string()).unwrap();
    }

    let position_calls = Arc::new(AtomicUsize::new(0));
    let location_calls = Arc::new(AtomicUsize::new(0));
    let forecast_calls = Arc::new(AtomicUsize::new(0));
    let queried = Arc::new(Mutex::new(Vec::new()));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let services = Services {
        position: Arc::new(StubPosition {
            calls: position_calls.clone(),
            position: setup.position,
            stall: setup.stall_position,
        }),
        locations: Arc::new(StubLocations {
            calls: location_calls.clone(),
            queried: queried.clone(),
            location: setup.location,
        }),
        forecasts: Arc::new(StubForecasts {
            calls: forecast_calls.clone(),
            requests: requests.clone(),
            forecast: setup.forecast.map(|f| serde_json::from_value(f).unwrap()),
            gate: setup.gate,
        }),
    };

    let persistence = if setup.read_only {
        let backing = MemoryKeyValueStore::new();
        for key in [SETTINGS_KEY, DATA_KEY] {
            if let Some(value) = kv.get(key).unwrap() {
                backing.set(key, &value).unwrap();
            }
        }
        Persistence::new(Arc::new(ReadOnly(backing)))
    } else {
        Persistence::new(kv.clone())
    };

    let options = StoreOptions {
        update_threshold: Duration::from_secs(10 * 60),
        geolocation_timeout: Duration::from_secs(30),
    };

    Harness {
        store: Arc::new(WeatherStore::new(persistence, services, options)),
        kv,
        position_calls,
        location_calls,
        forecast_calls,
        queried,
        requests,
    }
}

#[tokio::test]
async fn test_load_refreshes_and_persists() {
    let h = harness(Setup::default());
    let before = Utc::now();

    let outcome = h.store.load().await.unwrap();

    assert_eq!(outcome, LoadOutcome::Refreshed);
    let state = h.store.snapshot();
    assert_eq!(state.location, Some(Location::named("X", 10.0, 20.0)));
    assert_eq!(
        serde_json::to_value(&state.forecast).unwrap(),
        json!({"currently": {"temp": 0}, "flags": {"units": "si"}})
    );
    let last_updated = state.last_updated.unwrap();
    assert!(last_updated >= before && last_updated <= Utc::now());
    assert!(!state.loading);
    assert_eq!(h.store.phase(), RefreshPhase::Idle);

    assert_eq!(
        h.persisted(DATA_KEY).unwrap(),
        serde_json::to_value(state.cached_data()).unwrap()
    );
    assert_eq!(h.position_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.location_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.forecast_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fresh_cache_skips_every_service() {
    let h = harness(Setup {
        data: Some(json!({
            "location": {"name": "Cached", "latitude": 1.0, "longitude": 2.0},
            "forecast": {"flags": {"units": "us"}},
            "lastUpdated": minutes_ago(1)
        })),
        ..Setup::default()
    });
    let before = h.store.snapshot();

    let outcome = h.store.load().await.unwrap();

    assert_eq!(outcome, LoadOutcome::Fresh);
    assert_eq!(h.service_calls(), 0);
    assert_eq!(h.store.snapshot(), before);
}

#[tokio::test]
async fn test_stale_cache_refreshes() {
    let h = harness(Setup {
        data: Some(stale_data()),
        ..Setup::default()
    });
    let stale = h.store.last_updated().unwrap();

    let outcome = h.store.load().await.unwrap();

    assert_eq!(outcome, LoadOutcome::Refreshed);
    assert!(h.store.last_updated().unwrap() > stale);
    assert_eq!(h.store.location().and_then(|l| l.name).as_deref(), Some("X"));
}

#[tokio::test]
async fn test_cleared_last_updated_forces_refresh() {
    let h = harness(Setup {
        data: Some(json!({
            "forecast": {"flags": {"units": "si"}},
            "lastUpdated": minutes_ago(1)
        })),
        ..Setup::default()
    });

    h.store.clear_last_updated();
    let outcome = h.store.load().await.unwrap();

    assert_eq!(outcome, LoadOutcome::Refreshed);
    assert_eq!(h.forecast_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_location_failure_keeps_previous_data() {
    let h = harness(Setup {
        data: Some(stale_data()),
        location: None,
        ..Setup::default()
    });
    let before = h.store.snapshot();

    let result = h.store.load().await;

    assert!(matches!(result, Err(WeatherError::LocationNotFound(_))));
    let after = h.store.snapshot();
    assert_eq!(after.location, before.location);
    assert_eq!(after.forecast, before.forecast);
    assert_eq!(after.last_updated, before.last_updated);
    assert!(!after.loading);
    assert_eq!(h.forecast_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.phase(), RefreshPhase::Idle);
}

#[tokio::test]
async fn test_forecast_failure_keeps_location_but_not_timestamp() {
    let h = harness(Setup {
        data: Some(stale_data()),
        forecast: None,
        ..Setup::default()
    });
    let before = h.store.snapshot();

    let result = h.store.load().await;

    assert!(matches!(result, Err(WeatherError::Api { status: 503, .. })));
    let after = h.store.snapshot();
    // the resolved location is committed before the forecast is requested
    assert_eq!(after.location.and_then(|l| l.name).as_deref(), Some("X"));
    assert_eq!(after.forecast, before.forecast);
    assert_eq!(after.last_updated, before.last_updated);
    assert!(!after.loading);
}

#[tokio::test]
async fn test_position_denied_surfaces_location_error() {
    let h = harness(Setup {
        position: None,
        ..Setup::default()
    });

    let result = h.store.load().await;

    assert!(matches!(
        result,
        Err(WeatherError::Location(LocationError::PermissionDenied))
    ));
    assert_eq!(h.location_calls.load(Ordering::SeqCst), 0);
    assert!(!h.store.is_loading());
}

#[tokio::test]
async fn test_zero_coordinate_is_not_usable() {
    let h = harness(Setup {
        position: Some(position(0.0, 20.0)),
        ..Setup::default()
    });

    let outcome = h.store.load().await.unwrap();

    assert_eq!(outcome, LoadOutcome::NoCoordinates);
    assert_eq!(h.location_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.forecast_calls.load(Ordering::SeqCst), 0);
    assert!(h.store.last_updated().is_none());
    assert!(!h.store.is_loading());
}

#[tokio::test]
async fn test_missing_coordinate_is_not_usable() {
    let h = harness(Setup {
        position: Some(Position {
            latitude: Some(10.0),
            longitude: None,
        }),
        ..Setup::default()
    });

    let outcome = h.store.load().await.unwrap();

    assert_eq!(outcome, LoadOutcome::NoCoordinates);
    assert_eq!(h.location_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_explicit_location_skips_geolocation() {
    let h = harness(Setup {
        settings: Some(json!({
            "location": {"latitude": 5.0, "longitude": 6.0, "name": "Pinned"},
            "units": "ca"
        })),
        ..Setup::default()
    });

    h.store.load().await.unwrap();

    assert_eq!(h.position_calls.load(Ordering::SeqCst), 0);
    assert_eq!(*h.queried.lock(), vec![(5.0, 6.0)]);
}

#[tokio::test]
async fn test_forecast_uses_resolved_coordinates_and_setting_units() {
    let h = harness(Setup {
        location: Some(Location::named("Corrected", 10.5, 20.5)),
        ..Setup::default()
    });
    h.store
        .update_settings(SettingsPatch::default().units(UnitSystem::Uk2))
        .unwrap();

    h.store.load().await.unwrap();

    assert_eq!(*h.requests.lock(), vec![(10.5, 20.5, UnitSystem::Uk2)]);
}

#[tokio::test]
async fn test_location_without_coordinates_falls_back_to_query() {
    let h = harness(Setup {
        location: Some(Location {
            name: Some("Somewhere".into()),
            ..Location::default()
        }),
        ..Setup::default()
    });

    h.store.load().await.unwrap();

    assert_eq!(*h.requests.lock(), vec![(10.0, 20.0, UnitSystem::Si)]);
}

#[tokio::test]
async fn test_concurrent_load_is_rejected_while_in_flight() {
    let gate = Arc::new(Gate::default());
    let h = harness(Setup {
        gate: Some(gate.clone()),
        ..Setup::default()
    });

    let store = h.store.clone();
    let first = tokio::spawn(async move { store.load().await });

    gate.entered.notified().await;
    assert!(h.store.is_loading());
    assert_eq!(h.store.phase(), RefreshPhase::Forecasting);
    // the location is visible before the forecast arrives
    assert_eq!(h.store.location().and_then(|l| l.name).as_deref(), Some("X"));

    let second = h.store.load().await;
    assert!(matches!(second, Err(WeatherError::AlreadyRefreshing)));
    assert!(h.store.is_loading());

    gate.release.notify_one();
    let outcome = first.await.unwrap().unwrap();

    assert_eq!(outcome, LoadOutcome::Refreshed);
    assert!(!h.store.is_loading());
    assert_eq!(h.store.phase(), RefreshPhase::Idle);
    assert_eq!(h.forecast_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stage_calls_share_the_in_flight_slot() {
    let gate = Arc::new(Gate::default());
    let h = harness(Setup {
        gate: Some(gate.clone()),
        ..Setup::default()
    });

    let store = h.store.clone();
    let first = tokio::spawn(async move { store.load().await });
    gate.entered.notified().await;

    let location = h.store.load_location().await;
    assert!(matches!(location, Err(WeatherError::AlreadyRefreshing)));
    let coordinates = Coordinates::from_parts(Some(1.0), Some(2.0)).unwrap();
    let forecast = h.store.load_forecast(coordinates).await;
    assert!(matches!(forecast, Err(WeatherError::AlreadyRefreshing)));
    assert_eq!(h.location_calls.load(Ordering::SeqCst), 1);

    gate.release.notify_one();
    first.await.unwrap().unwrap();
    assert_eq!(h.forecast_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_load_forecast_alone_commits_forecast() {
    let h = harness(Setup::default());
    let coordinates = Coordinates::from_parts(Some(3.0), Some(4.0)).unwrap();

    let forecast = h.store.load_forecast(coordinates).await.unwrap();

    assert_eq!(h.store.forecast(), Some(forecast));
    assert_eq!(*h.requests.lock(), vec![(3.0, 4.0, UnitSystem::Si)]);
    assert!(!h.store.is_loading());
    assert_eq!(h.store.phase(), RefreshPhase::Idle);
    assert!(h.store.last_updated().is_none());
}

#[tokio::test]
async fn test_cancelled_load_resets_loading() {
    let gate = Arc::new(Gate::default());
    let h = harness(Setup {
        gate: Some(gate.clone()),
        ..Setup::default()
    });

    let store = h.store.clone();
    let first = tokio::spawn(async move { store.load().await });
    gate.entered.notified().await;
    assert!(h.store.is_loading());

    first.abort();
    let _ = first.await;

    assert!(!h.store.is_loading());
    assert_eq!(h.store.phase(), RefreshPhase::Idle);
    assert!(h.store.last_updated().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_geolocation_times_out() {
    let h = harness(Setup {
        stall_position: true,
        ..Setup::default()
    });

    let result = h.store.load().await;

    assert!(matches!(
        result,
        Err(WeatherError::Location(LocationError::Timeout))
    ));
    assert!(!h.store.is_loading());
    assert_eq!(h.location_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_persist_failure_is_reported_after_commit() {
    let h = harness(Setup {
        read_only: true,
        ..Setup::default()
    });

    let result = h.store.load().await;

    assert!(matches!(result, Err(WeatherError::Storage(_))));
    assert!(h.store.last_updated().is_some());
    assert!(h.store.forecast().is_some());
    assert!(!h.store.is_loading());
}

#[tokio::test]
async fn test_load_location_alone_commits_location() {
    let h = harness(Setup::default());

    let location = h.store.load_location().await.unwrap();

    assert_eq!(location, Some(Location::named("X", 10.0, 20.0)));
    assert_eq!(h.store.location(), location);
    assert_eq!(h.forecast_calls.load(Ordering::SeqCst), 0);
    assert!(h.store.last_updated().is_none());
}

#[tokio::test]
async fn test_settings_merge_preserves_unknown_keys() {
    let h = harness(Setup {
        settings: Some(json!({"location": "current", "units": "si", "theme": "dark"})),
        ..Setup::default()
    });

    h.store
        .update_settings(SettingsPatch::default().set("refreshOnWake", json!(true)))
        .unwrap();

    assert_eq!(
        h.persisted(SETTINGS_KEY).unwrap(),
        json!({"location": "current", "units": "si", "theme": "dark", "refreshOnWake": true})
    );
    assert_eq!(h.store.settings().units(), UnitSystem::Si);
}

#[tokio::test]
async fn test_views_format_in_forecast_units() {
    let h = harness(Setup {
        forecast: Some(json!({
            "currently": {"temperature": 21.6, "humidity": 0.42, "summary": "Clear"},
            "daily": {"data": [{"temperatureHigh": 25.2}, {"temperatureHigh": 19.9}]},
            "flags": {"units": "si"}
        })),
        ..Setup::default()
    });

    h.store.load().await.unwrap();

    let current = h.store.current().unwrap();
    assert_eq!(current.get("temperature"), Some("22°C"));
    assert_eq!(current.get("humidity"), Some("42%"));
    assert_eq!(current.get("summary"), Some("Clear"));

    let highs: Vec<_> = h
        .store
        .daily()
        .unwrap()
        .iter()
        .map(|p| p.get("temperatureHigh").map(str::to_string))
        .collect();
    assert_eq!(highs, vec![Some("25°C".to_string()), Some("20°C".to_string())]);
}
