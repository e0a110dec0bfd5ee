use tracing::{error, info, warn};

use crate::{
    error::FetchError,
    model::{ObservationWindow, Parsed, RawObservation, Station},
    source::WeatherSource,
};

/// Fetch the station directory. Fails as a whole; there are no partial results.
pub async fn fetch_stations(source: &dyn WeatherSource) -> Result<Parsed<Station>, FetchError> {
    info!("Fetching available weather stations");

    let stations = source.stations().await.inspect_err(|e| {
        error!(error = %e, "Failed to fetch stations");
    })?;

    for warning in &stations.warnings {
        warn!(%warning, "Dropped station");
    }
    info!(
        stations = stations.items.len(),
        dropped = stations.warnings.len(),
        "Fetched station directory"
    );

    Ok(stations)
}

/// Fetch observations inside `window` for the first `count` stations.
///
/// All-or-nothing: the first station that fails aborts the whole stage and
/// nothing fetched so far is returned.
pub async fn fetch_observation_window(
    source: &dyn WeatherSource,
    stations: &[Station],
    count: usize,
    window: &ObservationWindow,
) -> Result<Parsed<RawObservation>, FetchError> {
    let selected = &stations[..count.min(stations.len())];
    info!(
        stations = selected.len(),
        start = %window.start_param(),
        end = %window.end_param(),
        "Fetching observations"
    );

    let mut all = Parsed::default();
    for station in selected {
        let fetched = source
            .observations(&station.id, window)
            .await
            .inspect_err(|e| {
                error!(station = %station.id, error = %e, "Failed to fetch observations");
            })?;

        for warning in &fetched.warnings {
            warn!(station = %station.id, %warning, "Dropped observation");
        }
        info!(
            station = %station.id,
            observations = fetched.items.len(),
            "Fetched observations"
        );
        all.extend(fetched);
    }

    Ok(all)
}
