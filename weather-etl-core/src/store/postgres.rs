use async_trait::async_trait;
use sqlx::{
    PgPool, Postgres, QueryBuilder, Transaction,
    postgres::PgPoolOptions,
};
use tracing::info;

use crate::{error::LoadError, model::ObservationRecord};

use super::{ObservationStore, StoreTransaction};

const INSERT_OBSERVATIONS: &str = "INSERT INTO weather_observations (\
    station_id, station_name, station_timezone, latitude, longitude, \
    observation_timestamp, temperature, temperature_unit_code, \
    wind_speed, wind_speed_unit_code, humidity) ";

#[derive(Debug, Clone)]
pub struct PgObservationStore {
    pool: PgPool,
}

impl PgObservationStore {
    /// Build the pool without connecting; the first connection is opened
    /// when a transaction begins.
    pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<Self, LoadError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(database_url)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), LoadError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Close every pooled connection. Pending transactions are rolled back.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn station_names(&self) -> Result<Vec<String>, LoadError> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT station_name FROM weather_observations ORDER BY station_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    /// Mean temperature over the previous calendar week (Monday to Monday).
    pub async fn average_temperature_last_week(
        &self,
        station_name: &str,
    ) -> Result<Option<f64>, LoadError> {
        let avg = sqlx::query_scalar::<_, Option<f64>>(
            r#"
            SELECT AVG(temperature)
            FROM weather_observations
            WHERE station_name = $1
              AND observation_timestamp >= date_trunc('week', CURRENT_DATE) - INTERVAL '1 week'
              AND observation_timestamp < date_trunc('week', CURRENT_DATE)
            "#,
        )
        .bind(station_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(avg)
    }

    /// Largest absolute change in wind speed between consecutive
    /// observations over the trailing 7 days.
    pub async fn max_wind_speed_change(&self, station_name: &str) -> Result<Option<f64>, LoadError> {
        let change = sqlx::query_scalar::<_, Option<f64>>(
            r#"
            WITH wind_changes AS (
                SELECT
                    LAG(wind_speed) OVER (ORDER BY observation_timestamp) AS previous_wind_speed,
                    wind_speed
                FROM weather_observations
                WHERE station_name = $1
                  AND observation_timestamp >= NOW() - INTERVAL '7 days'
            )
            SELECT MAX(ABS(wind_speed - previous_wind_speed))
            FROM wind_changes
            WHERE previous_wind_speed IS NOT NULL
            "#,
        )
        .bind(station_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(change)
    }
}

#[async_trait]
impl ObservationStore for PgObservationStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, LoadError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTransaction { tx: Some(tx) }))
    }
}

/// Dropping an uncommitted sqlx transaction rolls it back and returns the
/// connection to the pool.
struct PgStoreTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgStoreTransaction {
    fn active(&mut self) -> Result<&mut Transaction<'static, Postgres>, LoadError> {
        self.tx
            .as_mut()
            .ok_or(LoadError::Database(sqlx::Error::PoolClosed))
    }
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn insert_batch(&mut self, rows: &[ObservationRecord]) -> Result<u64, LoadError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut query = build_insert(rows);
        let tx = self.active()?;
        let result = query.build().execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> Result<(), LoadError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), LoadError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

fn build_insert(rows: &[ObservationRecord]) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(INSERT_OBSERVATIONS);
    query.push_values(rows, |mut b, row| {
        b.push_bind(row.station_id.clone())
            .push_bind(row.station_name.clone())
            .push_bind(row.station_timezone.clone())
            .push_bind(row.latitude)
            .push_bind(row.longitude)
            .push_bind(row.observation_timestamp)
            .push_bind(row.temperature)
            .push_bind(row.temperature_unit.clone())
            .push_bind(row.wind_speed)
            .push_bind(row.wind_speed_unit.clone())
            .push_bind(row.humidity);
    });
    query.push(" ON CONFLICT (station_id, observation_timestamp) DO NOTHING");
    query
}
