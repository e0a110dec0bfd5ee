//! Join observations to their station metadata and shape them into rows.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::{
    error::DataQualityWarning,
    model::{Measurement, ObservationRecord, RawObservation, Station},
};

/// Stations keyed by identifier, built once per run.
#[derive(Debug, Clone, Default)]
pub struct StationDirectory {
    by_id: HashMap<String, Station>,
}

impl StationDirectory {
    pub fn new(stations: &[Station]) -> Self {
        Self {
            by_id: stations.iter().map(|s| (s.id.clone(), s.clone())).collect(),
        }
    }

    pub fn get(&self, station_id: &str) -> Option<&Station> {
        self.by_id.get(station_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub records: Vec<ObservationRecord>,
    pub warnings: Vec<DataQualityWarning>,
}

/// Last non-empty path segment of a station URL, e.g. `KBOS` for
/// `https://api.weather.gov/stations/KBOS`.
pub fn station_id_from_reference(reference: &str) -> Option<&str> {
    reference
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn rounded(measurement: Option<&Measurement>) -> (Option<f64>, String) {
    match measurement {
        Some(m) => (m.value.map(round2), m.unit_code.clone().unwrap_or_default()),
        None => (None, String::new()),
    }
}

/// Join every observation with its station. Observations that can't be
/// joined are dropped and reported; `records.len() + warnings.len()` always
/// equals the number of observations passed in.
pub fn normalize(directory: &StationDirectory, observations: Vec<RawObservation>) -> Normalized {
    let mut out = Normalized {
        records: Vec::with_capacity(observations.len()),
        warnings: Vec::new(),
    };

    for obs in observations {
        let Some(station_id) = obs.station.as_deref().and_then(station_id_from_reference) else {
            out.warnings.push(DataQualityWarning::MissingStationReference {
                timestamp: obs.timestamp,
            });
            continue;
        };

        let Some(station) = directory.get(station_id) else {
            out.warnings.push(DataQualityWarning::UnknownStation {
                station_id: station_id.to_string(),
                timestamp: obs.timestamp,
            });
            continue;
        };

        let (temperature, temperature_unit) = rounded(obs.temperature.as_ref());
        let (wind_speed, wind_speed_unit) = rounded(obs.wind_speed.as_ref());

        out.records.push(ObservationRecord {
            station_id: station.id.clone(),
            station_name: station.name.clone(),
            station_timezone: station.timezone.clone(),
            latitude: station.latitude,
            longitude: station.longitude,
            observation_timestamp: obs.timestamp,
            temperature,
            temperature_unit,
            wind_speed,
            wind_speed_unit,
            humidity: obs.humidity.and_then(|h| h.value),
        });
    }

    for warning in &out.warnings {
        warn!(%warning, "Skipping observation");
    }
    info!(
        records = out.records.len(),
        dropped = out.warnings.len(),
        "Normalized observations"
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::tests::{observation, station};
    use chrono::{TimeZone, Utc};

    fn sample_station() -> Station {
        Station {
            id: "123".into(),
            name: "Sample Station".into(),
            timezone: "UTC".into(),
            latitude: 19.4326,
            longitude: -99.1332,
        }
    }

    #[test]
    fn extracts_last_path_segment() {
        assert_eq!(
            station_id_from_reference("https://api.weather.gov/stations/KBOS"),
            Some("KBOS")
        );
        assert_eq!(station_id_from_reference("http://example.com/station/123/"), Some("123"));
        assert_eq!(station_id_from_reference("KBOS"), Some("KBOS"));
        assert_eq!(station_id_from_reference(""), None);
        assert_eq!(station_id_from_reference("///"), None);
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round2(20.567), 20.57);
        assert_eq!(round2(20.5), 20.5);
        assert_eq!(round2(-7.12345), -7.12);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn copies_station_fields_verbatim() {
        let directory = StationDirectory::new(&[sample_station()]);
        let obs = RawObservation {
            station: Some("http://example.com/station/123".into()),
            timestamp: Utc.with_ymd_and_hms(2024, 9, 28, 23, 10, 51).unwrap(),
            temperature: Some(Measurement::new(20.567, "CEL")),
            wind_speed: Some(Measurement::new(5.0, "KMH")),
            humidity: Some(Measurement::new(50.0, "PCT")),
        };

        let out = normalize(&directory, vec![obs]);

        assert!(out.warnings.is_empty());
        assert_eq!(
            out.records,
            vec![ObservationRecord {
                station_id: "123".into(),
                station_name: "Sample Station".into(),
                station_timezone: "UTC".into(),
                latitude: 19.4326,
                longitude: -99.1332,
                observation_timestamp: Utc.with_ymd_and_hms(2024, 9, 28, 23, 10, 51).unwrap(),
                temperature: Some(20.57),
                temperature_unit: "CEL".into(),
                wind_speed: Some(5.0),
                wind_speed_unit: "KMH".into(),
                humidity: Some(50.0),
            }]
        );
    }

    #[test]
    fn missing_measurements_become_null_with_empty_unit() {
        let directory = StationDirectory::new(&[station("KBOS")]);
        let mut obs = observation("KBOS", 0);
        obs.temperature = None;
        obs.wind_speed = Some(Measurement {
            value: None,
            unit_code: None,
        });

        let out = normalize(&directory, vec![obs]);
        let record = &out.records[0];

        assert_eq!(record.temperature, None);
        assert_eq!(record.temperature_unit, "");
        assert_eq!(record.wind_speed, None);
        assert_eq!(record.wind_speed_unit, "");
        assert_eq!(record.humidity, None);
    }

    #[test]
    fn null_value_keeps_reported_unit() {
        let directory = StationDirectory::new(&[station("KBOS")]);
        let mut obs = observation("KBOS", 0);
        obs.temperature = Some(Measurement {
            value: None,
            unit_code: Some("wmoUnit:degC".into()),
        });

        let out = normalize(&directory, vec![obs]);

        assert_eq!(out.records[0].temperature, None);
        assert_eq!(out.records[0].temperature_unit, "wmoUnit:degC");
    }

    #[test]
    fn humidity_is_not_rounded() {
        let directory = StationDirectory::new(&[station("KBOS")]);
        let mut obs = observation("KBOS", 0);
        obs.humidity = Some(Measurement::new(81.23456, "wmoUnit:percent"));

        let out = normalize(&directory, vec![obs]);
        assert_eq!(out.records[0].humidity, Some(81.23456));
    }

    #[test]
    fn unresolvable_observations_are_dropped_with_warnings() {
        let directory = StationDirectory::new(&[station("KBOS"), station("KJFK")]);

        let mut orphan = observation("KBOS", 3);
        orphan.station = None;

        let observations = vec![
            observation("KBOS", 0),
            observation("KXYZ", 1),
            observation("KJFK", 2),
            orphan,
        ];

        let out = normalize(&directory, observations);

        assert_eq!(out.records.len(), 2);
        assert_eq!(out.warnings.len(), 2);
        assert_eq!(out.records[0].station_id, "KBOS");
        assert_eq!(out.records[1].station_id, "KJFK");
        assert_eq!(out.records[1].station_name, "Station KJFK");

        assert!(matches!(
            &out.warnings[0],
            DataQualityWarning::UnknownStation { station_id, .. } if station_id == "KXYZ"
        ));
        assert!(matches!(
            out.warnings[1],
            DataQualityWarning::MissingStationReference { .. }
        ));
    }

    #[test]
    fn empty_reference_counts_as_missing() {
        let directory = StationDirectory::new(&[station("KBOS")]);

        let mut blank = observation("KBOS", 0);
        blank.station = Some(String::new());
        let mut slashes = observation("KBOS", 1);
        slashes.station = Some("///".into());

        let out = normalize(&directory, vec![blank, slashes]);

        assert!(out.records.is_empty());
        assert_eq!(out.warnings.len(), 2);
        assert!(out.warnings.iter().all(|w| matches!(
            w,
            DataQualityWarning::MissingStationReference { .. }
        )));
    }

    #[test]
    fn directory_lookup_by_identifier() {
        let directory = StationDirectory::new(&[station("A"), station("B")]);
        assert_eq!(directory.len(), 2);
        assert!(!directory.is_empty());
        assert_eq!(directory.get("B").map(|s| s.name.as_str()), Some("Station B"));
        assert!(directory.get("C").is_none());
    }
}
