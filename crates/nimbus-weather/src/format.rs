//! Turns raw data points into display text using a unit-format table.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::types::DataPoint;
use crate::units::{FormatRule, UnitFormatTable};

/// A data point with every field rendered for display
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormattedDataPoint {
    /// Parsed from the raw `time` field (unix seconds), when present
    pub time: Option<DateTime<Utc>>,
    pub fields: BTreeMap<String, String>,
}

impl FormattedDataPoint {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

/// Format every field of `point` with the rule `table` has for it.
///
/// Numeric fields with a rule are scaled, rounded and suffixed; everything
/// else is rendered as plain text. Nulls are dropped.
pub fn format_data_point(point: &DataPoint, table: &UnitFormatTable) -> FormattedDataPoint {
    let time = point
        .number("time")
        .and_then(|secs| DateTime::from_timestamp(secs as i64, 0));

    let fields = point
        .fields()
        .filter_map(|(name, value)| {
            let text = match (value, table.rule(name)) {
                (Value::Null, _) => return None,
                (Value::Number(n), Some(rule)) => match n.as_f64() {
                    Some(v) => apply_rule(v, rule),
                    None => n.to_string(),
                },
                (Value::String(s), _) => s.clone(),
                (other, _) => other.to_string(),
            };
            Some((name.clone(), text))
        })
        .collect();

    FormattedDataPoint { time, fields }
}

fn apply_rule(value: f64, rule: &FormatRule) -> String {
    let scaled = value * rule.scale;
    let factor = 10f64.powi(rule.precision as i32);
    let mut rounded = (scaled * factor).round() / factor;
    // keep "-0" out of the output
    if rounded == 0.0 {
        rounded = 0.0;
    }
    format!("{:.*}{}", rule.precision, rounded, rule.suffix)
}
