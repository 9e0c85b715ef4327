//! Settings, locations and the raw forecast payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Settings value meaning "use the device position".
pub const CURRENT_LOCATION: &str = "current";

/// Unit system understood by the forecast service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    /// Let the service pick based on the coordinates
    #[default]
    Auto,
    Us,
    Si,
    Ca,
    Uk2,
}

impl UnitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Us => "us",
            Self::Si => "si",
            Self::Ca => "ca",
            Self::Uk2 => "uk2",
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "us" => Ok(Self::Us),
            "si" => Ok(Self::Si),
            "ca" => Ok(Self::Ca),
            "uk2" => Ok(Self::Uk2),
            other => Err(format!("unknown unit system: {}", other)),
        }
    }
}

impl From<UnitSystem> for Value {
    fn from(units: UnitSystem) -> Self {
        Value::String(units.as_str().to_string())
    }
}

/// A latitude/longitude pair that passed the usability check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Returns `None` when either component is absent, zero or NaN.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        let usable = |v: f64| v != 0.0 && !v.is_nan();
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) if usable(latitude) && usable(longitude) => {
                Some(Self {
                    latitude,
                    longitude,
                })
            }
            _ => None,
        }
    }
}

/// A place: either coordinates chosen by the user or a record returned by the
/// location service. Unknown keys are carried along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Location {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            ..Self::default()
        }
    }

    pub fn named(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::at(latitude, longitude)
        }
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.latitude, self.longitude)
    }

    /// Name if known, otherwise the coordinates.
    pub fn display_name(&self) -> String {
        match (&self.name, self.latitude, self.longitude) {
            (Some(name), _, _) => name.clone(),
            (None, Some(lat), Some(lon)) => format!("{:.2}, {:.2}", lat, lon),
            _ => "Unknown location".to_string(),
        }
    }
}

/// Where forecasts should be fetched for.
///
/// Stored as the string `"current"` or as a location object.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LocationSetting {
    #[default]
    Current,
    Explicit(Location),
}

impl From<Location> for Value {
    fn from(location: Location) -> Self {
        let mut map = location.extra;
        if let Some(latitude) = location.latitude {
            map.insert("latitude".to_string(), Value::from(latitude));
        }
        if let Some(longitude) = location.longitude {
            map.insert("longitude".to_string(), Value::from(longitude));
        }
        if let Some(name) = location.name {
            map.insert("name".to_string(), Value::String(name));
        }
        Value::Object(map)
    }
}

impl From<LocationSetting> for Value {
    fn from(setting: LocationSetting) -> Self {
        match setting {
            LocationSetting::Current => Value::String(CURRENT_LOCATION.to_string()),
            LocationSetting::Explicit(location) => location.into(),
        }
    }
}

impl Serialize for LocationSetting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Current => serializer.serialize_str(CURRENT_LOCATION),
            Self::Explicit(location) => location.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for LocationSetting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Sentinel(String),
            Explicit(Location),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Sentinel(s) if s == CURRENT_LOCATION => Ok(Self::Current),
            Repr::Sentinel(s) => Err(serde::de::Error::custom(format!(
                "expected \"{}\" or a location object, got \"{}\"",
                CURRENT_LOCATION, s
            ))),
            Repr::Explicit(location) => Ok(Self::Explicit(location)),
        }
    }
}

/// Settings key holding the [`LocationSetting`]
pub const LOCATION_KEY: &str = "location";
/// Settings key holding the requested [`UnitSystem`]
pub const UNITS_KEY: &str = "units";

/// User settings, kept as the raw JSON object they are persisted as.
///
/// `location` and `units` are read through typed accessors. Every key,
/// including ones this version does not understand, survives a merge and a
/// save untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(Map<String, Value>);

impl Default for Settings {
    fn default() -> Self {
        let mut values = Map::new();
        values.insert(LOCATION_KEY.to_string(), LocationSetting::Current.into());
        values.insert(UNITS_KEY.to_string(), UnitSystem::default().into());
        Self(values)
    }
}

impl Settings {
    /// Where to fetch forecasts for.
    ///
    /// A missing key means the device position. Anything other than
    /// `"current"` or a location object yields a location without coordinates,
    /// which the pipeline treats as nothing to fetch.
    pub fn location(&self) -> LocationSetting {
        match self.0.get(LOCATION_KEY) {
            None | Some(Value::Null) => LocationSetting::Current,
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                tracing::debug!("Unusable location setting {}: {}", value, e);
                LocationSetting::Explicit(Location::default())
            }),
        }
    }

    /// Requested unit system; unknown names fall back to `auto`.
    pub fn units(&self) -> UnitSystem {
        self.0
            .get(UNITS_KEY)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Shallow merge: every key present in `patch` wins, every other key is kept.
    pub fn merged(&self, patch: SettingsPatch) -> Settings {
        let mut values = self.0.clone();
        values.extend(patch.0);
        Settings(values)
    }
}

impl From<Map<String, Value>> for Settings {
    fn from(values: Map<String, Value>) -> Self {
        Self(values)
    }
}

/// A partial settings update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsPatch(Map<String, Value>);

impl SettingsPatch {
    pub fn location(self, location: LocationSetting) -> Self {
        self.set(LOCATION_KEY, location.into())
    }

    pub fn units(self, units: UnitSystem) -> Self {
        self.set(UNITS_KEY, units.into())
    }

    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One bundle of raw measurements, keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataPoint(pub Map<String, Value>);

impl DataPoint {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.0.get(field).and_then(Value::as_f64)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for DataPoint {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A series of data points (hourly or daily)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<DataPoint>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flags {
    /// Unit system the payload was actually produced in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Forecast payload as returned by the forecast service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currently: Option<DataPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly: Option<DataBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily: Option<DataBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<Flags>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Forecast {
    pub fn units(&self) -> Option<&str> {
        self.flags.as_ref().and_then(|f| f.units.as_deref())
    }
}

/// The cached refresh result, persisted under the `data` slot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedData {
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub forecast: Option<Forecast>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}
