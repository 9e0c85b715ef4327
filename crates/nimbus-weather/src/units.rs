//! Unit-format tables.
//!
//! The default table describes every known field. Each unit system provides a
//! partial override table; a field absent from the override falls back to the
//! default rule.

use std::collections::BTreeMap;

use crate::types::UnitSystem;

/// How one raw field is turned into display text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormatRule {
    /// Appended after the number
    pub suffix: &'static str,
    /// Digits after the decimal point
    pub precision: usize,
    /// Multiplier applied before rounding
    pub scale: f64,
}

const fn rule(suffix: &'static str, precision: usize) -> FormatRule {
    FormatRule {
        suffix,
        precision,
        scale: 1.0,
    }
}

const PERCENT: FormatRule = FormatRule {
    suffix: "%",
    precision: 0,
    scale: 100.0,
};

pub type RuleSet = &'static [(&'static str, FormatRule)];

pub const DEFAULT_UNIT_FORMAT: RuleSet = &[
    ("temperature", rule("°F", 0)),
    ("apparentTemperature", rule("°F", 0)),
    ("temperatureHigh", rule("°F", 0)),
    ("temperatureLow", rule("°F", 0)),
    ("temperatureMin", rule("°F", 0)),
    ("temperatureMax", rule("°F", 0)),
    ("dewPoint", rule("°F", 0)),
    ("windSpeed", rule(" mph", 0)),
    ("windGust", rule(" mph", 0)),
    ("windBearing", rule("°", 0)),
    ("visibility", rule(" mi", 1)),
    ("nearestStormDistance", rule(" mi", 0)),
    ("precipIntensity", rule(" in/h", 2)),
    ("precipAccumulation", rule(" in", 1)),
    ("pressure", rule(" mb", 0)),
    ("ozone", rule(" DU", 0)),
    ("uvIndex", rule("", 0)),
    ("humidity", PERCENT),
    ("precipProbability", PERCENT),
    ("cloudCover", PERCENT),
];

const US_UNIT_FORMAT: RuleSet = &[];

const SI_UNIT_FORMAT: RuleSet = &[
    ("temperature", rule("°C", 0)),
    ("apparentTemperature", rule("°C", 0)),
    ("temperatureHigh", rule("°C", 0)),
    ("temperatureLow", rule("°C", 0)),
    ("temperatureMin", rule("°C", 0)),
    ("temperatureMax", rule("°C", 0)),
    ("dewPoint", rule("°C", 0)),
    ("windSpeed", rule(" m/s", 1)),
    ("windGust", rule(" m/s", 1)),
    ("visibility", rule(" km", 1)),
    ("nearestStormDistance", rule(" km", 0)),
    ("precipIntensity", rule(" mm/h", 1)),
    ("precipAccumulation", rule(" cm", 1)),
    ("pressure", rule(" hPa", 0)),
];

const CA_UNIT_FORMAT: RuleSet = &[
    ("temperature", rule("°C", 0)),
    ("apparentTemperature", rule("°C", 0)),
    ("temperatureHigh", rule("°C", 0)),
    ("temperatureLow", rule("°C", 0)),
    ("temperatureMin", rule("°C", 0)),
    ("temperatureMax", rule("°C", 0)),
    ("dewPoint", rule("°C", 0)),
    ("windSpeed", rule(" km/h", 0)),
    ("windGust", rule(" km/h", 0)),
    ("visibility", rule(" km", 1)),
    ("nearestStormDistance", rule(" km", 0)),
    ("precipIntensity", rule(" mm/h", 1)),
    ("precipAccumulation", rule(" cm", 1)),
    ("pressure", rule(" hPa", 0)),
];

const UK2_UNIT_FORMAT: RuleSet = &[
    ("temperature", rule("°C", 0)),
    ("apparentTemperature", rule("°C", 0)),
    ("temperatureHigh", rule("°C", 0)),
    ("temperatureLow", rule("°C", 0)),
    ("temperatureMin", rule("°C", 0)),
    ("temperatureMax", rule("°C", 0)),
    ("dewPoint", rule("°C", 0)),
    ("windSpeed", rule(" mph", 0)),
    ("windGust", rule(" mph", 0)),
    ("precipIntensity", rule(" mm/h", 1)),
    ("precipAccumulation", rule(" cm", 1)),
    ("pressure", rule(" hPa", 0)),
];

/// Override table for a unit system named in a forecast's flags.
///
/// `us` is recognised but overrides nothing; `auto` never appears in a
/// produced payload and is not recognised.
pub fn unit_overrides(units: &str) -> Option<RuleSet> {
    match units.parse::<UnitSystem>().ok()? {
        UnitSystem::Us => Some(US_UNIT_FORMAT),
        UnitSystem::Si => Some(SI_UNIT_FORMAT),
        UnitSystem::Ca => Some(CA_UNIT_FORMAT),
        UnitSystem::Uk2 => Some(UK2_UNIT_FORMAT),
        UnitSystem::Auto => None,
    }
}

fn lookup(rules: RuleSet, field: &str) -> Option<FormatRule> {
    rules.iter().find(|(name, _)| *name == field).map(|(_, r)| *r)
}

/// `specific[field] ?? default[field]`
pub fn resolve_rule(specific: Option<RuleSet>, field: &str) -> Option<FormatRule> {
    specific
        .and_then(|rules| lookup(rules, field))
        .or_else(|| lookup(DEFAULT_UNIT_FORMAT, field))
}

/// A fully resolved table: one rule per known field
#[derive(Debug, Clone, PartialEq)]
pub struct UnitFormatTable {
    rules: BTreeMap<&'static str, FormatRule>,
}

impl UnitFormatTable {
    /// The table used when the forecast's unit system is missing or unknown
    pub fn default_table() -> Self {
        Self::resolved(None)
    }

    /// Table for the unit system a forecast reports having used.
    pub fn for_units(units: Option<&str>) -> Self {
        Self::resolved(units.and_then(unit_overrides))
    }

    fn resolved(specific: Option<RuleSet>) -> Self {
        let fields = DEFAULT_UNIT_FORMAT
            .iter()
            .chain(specific.unwrap_or(&[]).iter())
            .map(|(name, _)| *name);

        let rules = fields
            .filter_map(|field| resolve_rule(specific, field).map(|r| (field, r)))
            .collect();

        Self { rules }
    }

    pub fn rule(&self, field: &str) -> Option<&FormatRule> {
        self.rules.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FormatRule)> {
        self.rules.iter().map(|(name, rule)| (*name, rule))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for UnitFormatTable {
    fn default() -> Self {
        Self::default_table()
    }
}
