use tracing::{error, info, warn};

use crate::{
    error::LoadError,
    model::ObservationRecord,
    store::{ObservationStore, StoreTransaction},
};

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Outcome of a load. A failed load commits nothing.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Records handed to the loader.
    pub attempted: usize,
    /// Rows committed; duplicates of existing rows are not counted.
    pub inserted: u64,
    /// Write calls issued, including the one that failed.
    pub batches: usize,
    pub error: Option<LoadError>,
}

impl LoadReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Records skipped because their key already existed.
    pub fn duplicates(&self) -> usize {
        if self.succeeded() {
            self.attempted.saturating_sub(self.inserted as usize)
        } else {
            0
        }
    }
}

/// Write `records` in batches of `batch_size`, all inside one transaction.
///
/// Errors never escape: the transaction is rolled back, the error is logged
/// and handed back in [`LoadReport::error`].
pub async fn load_observations<I>(
    store: &dyn ObservationStore,
    records: I,
    batch_size: usize,
) -> LoadReport
where
    I: IntoIterator<Item = ObservationRecord>,
    I::IntoIter: Send,
{
    let batch_size = batch_size.max(1);
    let mut records = records.into_iter().peekable();
    let mut report = LoadReport::default();

    if records.peek().is_none() {
        info!("No observations to insert");
        return report;
    }

    info!(batch_size, "Starting to insert data into the database");

    let mut tx = match store.begin().await {
        Ok(tx) => tx,
        Err(e) => {
            error!(error = %e, "Database operation error");
            report.error = Some(e);
            return report;
        }
    };

    let written = write_batches(tx.as_mut(), records, batch_size, &mut report).await;
    let outcome = match written {
        Ok(inserted) => tx.commit().await.map(|()| inserted),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(inserted) => {
            report.inserted = inserted;
            info!(
                attempted = report.attempted,
                inserted,
                duplicates = report.duplicates(),
                batches = report.batches,
                "Data inserted successfully"
            );
        }
        Err(e) => {
            error!(error = %e, attempted = report.attempted, "Database operation error, rolling back");
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback failed");
            }
            report.error = Some(e);
        }
    }

    report
}

async fn write_batches(
    tx: &mut dyn StoreTransaction,
    records: impl Iterator<Item = ObservationRecord> + Send,
    batch_size: usize,
    report: &mut LoadReport,
) -> Result<u64, LoadError> {
    let mut inserted = 0;
    let mut buffer = Vec::with_capacity(batch_size);

    for record in records {
        report.attempted += 1;
        buffer.push(record);

        if buffer.len() >= batch_size {
            inserted += flush(tx, &mut buffer, report).await?;
        }
    }

    if !buffer.is_empty() {
        inserted += flush(tx, &mut buffer, report).await?;
    }

    Ok(inserted)
}

async fn flush(
    tx: &mut dyn StoreTransaction,
    buffer: &mut Vec<ObservationRecord>,
    report: &mut LoadReport,
) -> Result<u64, LoadError> {
    report.batches += 1;
    let inserted = tx.insert_batch(buffer.as_slice()).await?;
    info!(
        records = buffer.len(),
        inserted,
        batch = report.batches,
        "Inserted batch"
    );
    buffer.clear();
    Ok(inserted)
}
