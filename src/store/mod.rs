//! Persistence gateway (EMBP): the repository traits the pipeline depends on
//! and the PostgreSQL-backed [`Database`] that implements them.
//!
//! A [`Database`] owns exactly one connection for the lifetime of a run. Both
//! repositories share it, which keeps the whole run on a single session.

use sqlx::{Connection, PgConnection};
use tracing::info;

use crate::error::{IngestError, PersistenceError};
use crate::models::{select_latest, DayStamp, ReadingItem, RealtimeReading, StationRecord};
use crate::schema;

mod realtime;
mod station;

// ---

/// Result of a station directory ingest for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryInsert {
    /// The batch was written; carries the number of rows.
    Inserted(u64),
    /// Rows for the day already existed, nothing was written.
    AlreadyPresent,
}

/// The `measuring_station` table.
#[allow(async_fn_in_trait)]
pub trait StationRepository {
    // ---
    /// Whether any station row exists for `day`.
    async fn has_data_for_day(&mut self, day: DayStamp) -> Result<bool, PersistenceError>;

    /// Insert the whole directory for `day`, unless that day already has rows.
    ///
    /// The check and the insert are atomic: either every record is written or
    /// none is.
    async fn bulk_insert_stations(
        &mut self,
        day: DayStamp,
        records: &[StationRecord],
    ) -> Result<DirectoryInsert, PersistenceError>;

    /// Delete station rows dated before `today - retention_days`.
    async fn delete_stations_older_than(
        &mut self,
        today: DayStamp,
        retention_days: u32,
    ) -> Result<u64, PersistenceError>;

    /// Station names stored for `day`, in insertion order, not deduplicated.
    async fn list_stations_for_day(&mut self, day: DayStamp)
        -> Result<Vec<String>, PersistenceError>;
}

/// The `measuring_station_realtime` table.
#[allow(async_fn_in_trait)]
pub trait RealtimeRepository {
    // ---
    /// Write `reading`, replacing any row for the same day and station.
    async fn upsert_reading(&mut self, reading: &RealtimeReading) -> Result<(), PersistenceError>;

    /// Delete reading rows dated before `today - retention_days`.
    async fn delete_readings_older_than(
        &mut self,
        today: DayStamp,
        retention_days: u32,
    ) -> Result<u64, PersistenceError>;

    /// Store the most recent of `items` as the station's reading for `day`.
    ///
    /// Returns `Ok(None)` without touching the table when `items` is empty.
    async fn upsert_latest_reading(
        &mut self,
        day: DayStamp,
        station_name: &str,
        items: &[ReadingItem],
    ) -> Result<Option<RealtimeReading>, IngestError> {
        // ---
        let Some(latest) = select_latest(items) else {
            info!(station = station_name, "No data available for station");
            return Ok(None);
        };

        let reading = latest.to_reading(day, station_name)?;
        self.upsert_reading(&reading).await?;

        info!(
            station = station_name,
            data_time = reading.data_time.as_deref().unwrap_or(""),
            "Stored latest reading"
        );
        Ok(Some(reading))
    }
}

/// Everything one pipeline run needs from storage.
#[allow(async_fn_in_trait)]
pub trait Store: StationRepository + RealtimeRepository {
    /// Release the underlying connection.
    async fn close(self) -> Result<(), PersistenceError>;
}

/// PostgreSQL storage over a single connection.
#[derive(Debug)]
pub struct Database {
    conn: PgConnection,
}

impl Database {
    // ---
    /// Open a connection to `db_url`.
    pub async fn connect(db_url: &str) -> Result<Self, PersistenceError> {
        // ---
        let conn = PgConnection::connect(db_url).await?;
        info!("Successfully connected to database");
        Ok(Self { conn })
    }

    /// Wrap an already opened connection.
    pub fn from_connection(conn: PgConnection) -> Self {
        Self { conn }
    }

    /// Create the tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&mut self) -> Result<(), PersistenceError> {
        schema::create_schema(&mut self.conn).await
    }
}

impl Store for Database {
    async fn close(self) -> Result<(), PersistenceError> {
        // ---
        self.conn.close().await?;
        info!("Database connection closed");
        Ok(())
    }
}
