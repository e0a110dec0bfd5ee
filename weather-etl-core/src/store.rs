use async_trait::async_trait;

use crate::{error::LoadError, model::ObservationRecord};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgObservationStore;

/// Destination for normalized observation rows.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, LoadError>;
}

/// A unit of work against an [`ObservationStore`]. Nothing written through
/// it is visible until [`commit`](StoreTransaction::commit); dropping it
/// without committing discards the writes.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Insert `rows` in one statement, ignoring rows whose
    /// `(station_id, observation_timestamp)` already exists.
    /// Returns the number of rows actually inserted.
    async fn insert_batch(&mut self, rows: &[ObservationRecord]) -> Result<u64, LoadError>;

    async fn commit(&mut self) -> Result<(), LoadError>;

    async fn rollback(&mut self) -> Result<(), LoadError>;
}
