use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::DataQualityWarning, load::DEFAULT_BATCH_SIZE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub timezone: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// A single reading as reported by the API, e.g. `{"value": 20.5, "unitCode": "wmoUnit:degC"}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit_code: Option<String>,
}

impl Measurement {
    pub fn new(value: f64, unit_code: &str) -> Self {
        Self {
            value: Some(value),
            unit_code: Some(unit_code.to_string()),
        }
    }
}

/// An observation as reported by the API, before it is joined to a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObservation {
    /// Station URL, e.g. `https://api.weather.gov/stations/KBOS`.
    #[serde(default)]
    pub station: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub temperature: Option<Measurement>,
    #[serde(default)]
    pub wind_speed: Option<Measurement>,
    #[serde(default)]
    pub humidity: Option<Measurement>,
}

/// One row of `weather_observations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub station_id: String,
    pub station_name: String,
    pub station_timezone: String,
    pub latitude: f64,
    pub longitude: f64,
    pub observation_timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub temperature_unit: String,
    pub wind_speed: Option<f64>,
    pub wind_speed_unit: String,
    pub humidity: Option<f64>,
}

/// Trailing time range `[end - days, end]` used to bound observation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ObservationWindow {
    pub const WIRE_FORMAT: &'static str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn trailing_days(end: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
        }
    }

    pub fn start_param(&self) -> String {
        self.start.format(Self::WIRE_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(Self::WIRE_FORMAT).to_string()
    }
}

/// Items parsed out of a feature collection, plus the features that had to be dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub items: Vec<T>,
    pub warnings: Vec<DataQualityWarning>,
}

impl<T> Parsed<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            warnings: Vec::new(),
        }
    }

    pub fn extend(&mut self, other: Parsed<T>) {
        self.items.extend(other.items);
        self.warnings.extend(other.warnings);
    }
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Knobs for a single pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunParams {
    /// How many stations, in directory order, to fetch observations for.
    pub number_of_stations: usize,
    /// Length of the trailing observation window, in days.
    pub start_date_offset: u32,
    pub batch_size: usize,
}

impl RunParams {
    /// Postgres caps a statement at 65535 bind parameters; each row binds 11.
    pub const MAX_BATCH_SIZE: usize = u16::MAX as usize / 11;
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            number_of_stations: 1,
            start_date_offset: 7,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}
