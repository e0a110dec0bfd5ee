use std::env;

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use weather_etl_core::{ObservationRecord, PgObservationStore, load_observations};

fn record(station_id: &str, minute: i64, wind_speed: Option<f64>) -> ObservationRecord {
    ObservationRecord {
        station_id: station_id.to_string(),
        station_name: format!("Integration {station_id}"),
        station_timezone: "UTC".to_string(),
        latitude: 19.4326,
        longitude: -99.1332,
        observation_timestamp: Utc.with_ymd_and_hms(2024, 9, 28, 23, 0, 0).unwrap()
            + Duration::minutes(minute),
        temperature: Some(20.5),
        temperature_unit: "CEL".to_string(),
        wind_speed,
        wind_speed_unit: "KMH".to_string(),
        humidity: Some(50.0),
    }
}

#[tokio::test]
async fn load_is_idempotent_against_postgres() -> Result<()> {
    let database_url = match env::var("WEATHER_ETL_TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping postgres integration test because WEATHER_ETL_TEST_DATABASE_URL is not set"
            );
            return Ok(());
        }
    };

    let store = PgObservationStore::connect_lazy(&database_url, 1)?;
    store.run_migrations().await?;

    sqlx::query("DELETE FROM weather_observations WHERE station_id LIKE 'ITEST%'")
        .execute(store.pool())
        .await?;

    let rows: Vec<_> = (0..7)
        .map(|m| record("ITEST1", m, Some(m as f64 * 1.5)))
        .collect();

    let first = load_observations(&store, rows.clone(), 3).await;
    assert!(first.succeeded(), "{:?}", first.error);
    assert_eq!(first.inserted, 7);
    assert_eq!(first.batches, 3);

    let second = load_observations(&store, rows, 3).await;
    assert!(second.succeeded(), "{:?}", second.error);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates(), 7);

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM weather_observations WHERE station_id = 'ITEST1'")
            .fetch_one(store.pool())
            .await?;
    assert_eq!(count, 7);

    let names = store.station_names().await?;
    assert!(names.iter().any(|n| n == "Integration ITEST1"));

    sqlx::query("DELETE FROM weather_observations WHERE station_id LIKE 'ITEST%'")
        .execute(store.pool())
        .await?;
    store.close().await;

    Ok(())
}
