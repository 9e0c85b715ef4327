//! The state snapshot and the views derived from it.
//!
//! Views are recomputed on every call; nothing here is cached.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::format::{format_data_point, FormattedDataPoint};
use crate::types::{CachedData, DataBlock, Forecast, Location, Settings};
use crate::units::UnitFormatTable;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    pub settings: Settings,
    pub location: Option<Location>,
    pub forecast: Option<Forecast>,
    pub last_updated: Option<DateTime<Utc>>,
    pub loading: bool,
    pub update_ready: bool,
}

impl State {
    /// Startup state from what was persisted.
    pub fn from_persisted(settings: Settings, data: CachedData) -> Self {
        Self {
            settings,
            location: data.location,
            forecast: data.forecast,
            last_updated: data.last_updated,
            loading: false,
            update_ready: false,
        }
    }

    /// The blob written to the `data` slot
    pub fn cached_data(&self) -> CachedData {
        CachedData {
            location: self.location.clone(),
            forecast: self.forecast.clone(),
            last_updated: self.last_updated,
        }
    }

    /// Format table for the unit system the forecast was produced in.
    pub fn formats(&self) -> UnitFormatTable {
        UnitFormatTable::for_units(self.forecast.as_ref().and_then(Forecast::units))
    }

    pub fn current(&self, formats: &UnitFormatTable) -> Option<FormattedDataPoint> {
        let current = self.forecast.as_ref()?.currently.as_ref()?;
        Some(format_data_point(current, formats))
    }

    pub fn daily<'a>(
        &'a self,
        formats: &'a UnitFormatTable,
    ) -> Option<impl Iterator<Item = FormattedDataPoint> + 'a> {
        series(self.forecast.as_ref()?.daily.as_ref(), formats)
    }

    pub fn hourly<'a>(
        &'a self,
        formats: &'a UnitFormatTable,
    ) -> Option<impl Iterator<Item = FormattedDataPoint> + 'a> {
        series(self.forecast.as_ref()?.hourly.as_ref(), formats)
    }

    /// True when the last successful refresh is younger than `threshold`.
    pub fn is_fresh(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        is_fresh(self.last_updated, now, threshold)
    }
}

fn series<'a>(
    block: Option<&'a DataBlock>,
    formats: &'a UnitFormatTable,
) -> Option<impl Iterator<Item = FormattedDataPoint> + 'a> {
    let points = block?.data.as_ref()?;
    Some(points.iter().map(move |point| format_data_point(point, formats)))
}

/// A timestamp in the future counts as fresh.
pub fn is_fresh(last_updated: Option<DateTime<Utc>>, now: DateTime<Utc>, threshold: Duration) -> bool {
    let Some(at) = last_updated else {
        return false;
    };
    match now.signed_duration_since(at).to_std() {
        Ok(elapsed) => elapsed < threshold,
        Err(_) => true,
    }
}
