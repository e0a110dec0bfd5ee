use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised by the fetch stages. Any of these aborts the run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} timed out after {}s", .timeout.as_secs())]
    Timeout { url: String, timeout: Duration },

    #[error("Network request failed for {url}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Upstream request to {url} failed with status {status}: {body}")]
    Upstream {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Envelope-level parse failures. Problems inside a single feature are
/// reported as [`DataQualityWarning`]s instead.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed JSON in response from {url}")]
    MalformedJson {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Response from {url} is missing the `{field}` field")]
    MissingField { url: String, field: &'static str },
}

/// A record that was dropped without failing the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataQualityWarning {
    #[error("Observation at {timestamp} has no station reference")]
    MissingStationReference { timestamp: DateTime<Utc> },

    #[error("No station info found for station_id {station_id:?} (observation at {timestamp})")]
    UnknownStation {
        station_id: String,
        timestamp: DateTime<Utc>,
    },

    #[error("Skipping malformed {kind} feature: {reason}")]
    MalformedFeature { kind: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Database operation failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Store rejected batch {batch}: {reason}")]
    Rejected { batch: usize, reason: String },
}
