//! Core library for the `weather-etl` pipeline.
//!
//! This crate defines:
//! - The upstream weather API client ([`source`])
//! - The extract → normalize → load stages and their run orchestration
//! - Storage backends for observation rows ([`store`])
//! - Configuration, errors and shared domain models
//!
//! It is used by `weather-etl-cli`, but the [`Pipeline`] can be driven by any
//! scheduler that supplies a [`WeatherSource`] and an [`ObservationStore`].

pub mod config;
pub mod error;
pub mod extract;
pub mod load;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod source;
pub mod store;

pub use config::{ApiConfig, Config, DatabaseConfig};
pub use error::{DataQualityWarning, FetchError, LoadError, ParseError};
pub use load::{LoadReport, load_observations};
pub use model::{
    Measurement, ObservationRecord, ObservationWindow, Parsed, RawObservation, RunParams, Station,
};
pub use pipeline::{Pipeline, RunContext, RunSummary};
pub use source::{NwsClient, WeatherSource};
pub use store::{MemoryStore, ObservationStore, PgObservationStore, StoreTransaction};
