use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    error::FetchError,
    model::{ObservationWindow, Parsed, RawObservation, Station},
};

pub mod nws;

pub use nws::NwsClient;

/// Upstream provider of station metadata and observations.
#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    /// The full station directory, in the order the API returns it.
    async fn stations(&self) -> Result<Parsed<Station>, FetchError>;

    /// Observations recorded by `station_id` inside `window`.
    async fn observations(
        &self,
        station_id: &str,
        window: &ObservationWindow,
    ) -> Result<Parsed<RawObservation>, FetchError>;
}
