use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, header::ACCEPT};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::{
    config::ApiConfig,
    error::{DataQualityWarning, FetchError, ParseError},
    model::{Measurement, ObservationWindow, Parsed, RawObservation, Station},
};

use super::WeatherSource;

/// Client for the National Weather Service API (api.weather.gov).
#[derive(Debug, Clone)]
pub struct NwsClient {
    base_url: String,
    timeout: Duration,
    http: Client,
}

impl NwsClient {
    pub fn new(config: &ApiConfig) -> reqwest::Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
            http,
        })
    }

    pub fn stations_url(&self) -> String {
        format!("{}/stations", self.base_url)
    }

    pub fn observations_url(&self, station_id: &str) -> String {
        format!("{}/stations/{station_id}/observations", self.base_url)
    }

    async fn get_body(&self, url: &str, query: &[(&str, String)]) -> Result<String, FetchError> {
        debug!(url, ?query, "sending request");

        let res = self
            .http
            .get(url)
            .header(ACCEPT, "application/geo+json")
            .query(query)
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let status = res.status();
        let body = res.text().await.map_err(|e| self.classify(url, e))?;

        if !status.is_success() {
            return Err(FetchError::Upstream {
                url: url.to_string(),
                status,
                body: truncate_body(&body),
            });
        }

        Ok(body)
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

#[async_trait]
impl WeatherSource for NwsClient {
    async fn stations(&self) -> Result<Parsed<Station>, FetchError> {
        let url = self.stations_url();
        let body = self.get_body(&url, &[]).await?;
        Ok(parse_stations(&url, &body)?)
    }

    async fn observations(
        &self,
        station_id: &str,
        window: &ObservationWindow,
    ) -> Result<Parsed<RawObservation>, FetchError> {
        let url = self.observations_url(station_id);
        let query = [("start", window.start_param()), ("end", window.end_param())];
        let body = self.get_body(&url, &query).await?;
        Ok(parse_observations(&url, &body)?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NwsStationProperties {
    station_identifier: String,
    name: String,
    time_zone: String,
}

#[derive(Debug, Deserialize)]
struct NwsGeometry {
    coordinates: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct NwsStationFeature {
    properties: NwsStationProperties,
    geometry: Option<NwsGeometry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NwsObservationProperties {
    #[serde(default)]
    station: Option<String>,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    temperature: Option<Measurement>,
    #[serde(default)]
    wind_speed: Option<Measurement>,
    #[serde(default)]
    humidity: Option<Measurement>,
    #[serde(default)]
    relative_humidity: Option<Measurement>,
}

impl From<NwsObservationProperties> for RawObservation {
    fn from(p: NwsObservationProperties) -> Self {
        Self {
            station: p.station,
            timestamp: p.timestamp,
            temperature: p.temperature,
            wind_speed: p.wind_speed,
            humidity: p.humidity.or(p.relative_humidity),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NwsObservationFeature {
    properties: NwsObservationProperties,
}

pub(crate) fn parse_stations(url: &str, body: &str) -> Result<Parsed<Station>, ParseError> {
    parse_features(url, body, "station", |value| {
        let feature: NwsStationFeature =
            serde_json::from_value(value).map_err(|e| e.to_string())?;

        // GeoJSON order is [longitude, latitude].
        let coordinates = feature.geometry.as_ref().map(|g| g.coordinates.as_slice());
        let (longitude, latitude) = match coordinates {
            Some([lon, lat, ..]) => (*lon, *lat),
            _ => {
                return Err(format!(
                    "station {} has no [longitude, latitude] coordinates",
                    feature.properties.station_identifier
                ));
            }
        };

        Ok(Station {
            id: feature.properties.station_identifier,
            name: feature.properties.name,
            timezone: feature.properties.time_zone,
            latitude,
            longitude,
        })
    })
}

pub(crate) fn parse_observations(
    url: &str,
    body: &str,
) -> Result<Parsed<RawObservation>, ParseError> {
    parse_features(url, body, "observation", |value| {
        serde_json::from_value::<NwsObservationFeature>(value)
            .map(|f| RawObservation::from(f.properties))
            .map_err(|e| e.to_string())
    })
}

/// Split a GeoJSON feature collection into typed items. Malformed JSON or a
/// missing `features` array fails the whole response; a feature that doesn't
/// fit the expected shape is dropped with a warning.
fn parse_features<T>(
    url: &str,
    body: &str,
    kind: &'static str,
    convert: impl Fn(Value) -> Result<T, String>,
) -> Result<Parsed<T>, ParseError> {
    let mut doc: Value = serde_json::from_str(body).map_err(|source| ParseError::MalformedJson {
        url: url.to_string(),
        source,
    })?;

    let features = match doc.get_mut("features").map(Value::take) {
        Some(Value::Array(features)) => features,
        _ => {
            return Err(ParseError::MissingField {
                url: url.to_string(),
                field: "features",
            });
        }
    };

    let mut parsed = Parsed::new(Vec::with_capacity(features.len()));
    for feature in features {
        match convert(feature) {
            Ok(item) => parsed.items.push(item),
            Err(reason) => parsed
                .warnings
                .push(DataQualityWarning::MalformedFeature { kind, reason }),
        }
    }

    Ok(parsed)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
