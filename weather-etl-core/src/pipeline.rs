//! One daily run: stations → observations → join → load.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{
    error::{DataQualityWarning, FetchError},
    extract::{fetch_observation_window, fetch_stations},
    load::{LoadReport, load_observations},
    model::{ObservationWindow, RunParams},
    normalize::{StationDirectory, normalize},
    source::WeatherSource,
    store::ObservationStore,
};

/// State scoped to a single run. Nothing outlives it.
#[derive(Debug, Clone, Copy)]
pub struct RunContext {
    pub params: RunParams,
    pub started_at: DateTime<Utc>,
    pub window: ObservationWindow,
}

impl RunContext {
    pub fn new(params: RunParams, now: DateTime<Utc>) -> Self {
        Self {
            params,
            started_at: now,
            window: ObservationWindow::trailing_days(now, params.start_date_offset),
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub context: RunContext,
    pub stations_fetched: usize,
    pub stations_selected: usize,
    pub observations_fetched: usize,
    /// Stations, observations and joins that were dropped along the way.
    pub warnings: Vec<DataQualityWarning>,
    pub load: LoadReport,
}

impl RunSummary {
    pub fn load_failed(&self) -> bool {
        !self.load.succeeded()
    }
}

pub struct Pipeline<'a> {
    source: &'a dyn WeatherSource,
    store: &'a dyn ObservationStore,
    params: RunParams,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        source: &'a dyn WeatherSource,
        store: &'a dyn ObservationStore,
        params: RunParams,
    ) -> Self {
        Self {
            source,
            store,
            params,
        }
    }

    pub async fn run(&self) -> Result<RunSummary, FetchError> {
        self.run_with(RunContext::new(self.params, Utc::now())).await
    }

    /// Run the stages in order. A fetch error aborts before anything is
    /// loaded; a load error is reported in [`RunSummary::load`].
    pub async fn run_with(&self, ctx: RunContext) -> Result<RunSummary, FetchError> {
        info!(
            stations = ctx.params.number_of_stations,
            days = ctx.params.start_date_offset,
            batch_size = ctx.params.batch_size,
            "Starting pipeline run"
        );

        let stations = fetch_stations(self.source).await?;
        let observations = fetch_observation_window(
            self.source,
            &stations.items,
            ctx.params.number_of_stations,
            &ctx.window,
        )
        .await?;

        let directory = StationDirectory::new(&stations.items);
        let observations_fetched = observations.items.len();
        let normalized = normalize(&directory, observations.items);

        let load = load_observations(self.store, normalized.records, ctx.params.batch_size).await;
        if !load.succeeded() {
            warn!("Load stage failed; no rows were committed");
        }

        let mut warnings = stations.warnings;
        warnings.extend(observations.warnings);
        warnings.extend(normalized.warnings);

        Ok(RunSummary {
            context: ctx,
            stations_fetched: stations.items.len(),
            stations_selected: ctx.params.number_of_stations.min(stations.items.len()),
            observations_fetched,
            warnings,
            load,
        })
    }
}
