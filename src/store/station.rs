use sqlx::{Connection, Postgres, QueryBuilder};
use tracing::{error, info};

use super::{Database, DirectoryInsert, StationRepository};
use crate::error::PersistenceError;
use crate::models::{retention_cutoff, DayStamp, StationRecord};

/// Rows per multi-row INSERT; 8 binds each keeps well under Postgres' 65535.
const INSERT_CHUNK: usize = 1000;

// ---

impl StationRepository for Database {
    // ---
    async fn has_data_for_day(&mut self, day: DayStamp) -> Result<bool, PersistenceError> {
        // ---
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM measuring_station WHERE std_dt = $1")
            .bind(day.to_string())
            .fetch_one(&mut self.conn)
            .await?;

        Ok(count > 0)
    }

    async fn bulk_insert_stations(
        &mut self,
        day: DayStamp,
        records: &[StationRecord],
    ) -> Result<DirectoryInsert, PersistenceError> {
        // ---
        let mut tx = self.conn.begin().await?;

        let result = async {
            // Self-conflicting lock: a concurrent run waits here until we commit,
            // then sees our rows in its own count.
            sqlx::query("LOCK TABLE measuring_station IN SHARE ROW EXCLUSIVE MODE")
                .execute(&mut *tx)
                .await?;

            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM measuring_station WHERE std_dt = $1")
                    .bind(day.to_string())
                    .fetch_one(&mut *tx)
                    .await?;

            if count > 0 {
                return Ok(DirectoryInsert::AlreadyPresent);
            }

            let mut inserted = 0u64;
            for chunk in records.chunks(INSERT_CHUNK) {
                let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                    "INSERT INTO measuring_station \
                     (std_dt, stationname, addr, year, mangname, item, dmx, dmy) ",
                );
                builder.push_values(chunk, |mut row, r| {
                    row.push_bind(r.day.to_string())
                        .push_bind(&r.station_name)
                        .push_bind(&r.addr)
                        .push_bind(r.year)
                        .push_bind(&r.mang_name)
                        .push_bind(&r.item)
                        .push_bind(r.dm_x)
                        .push_bind(r.dm_y);
                });
                inserted += builder.build().execute(&mut *tx).await?.rows_affected();
            }

            Ok::<_, sqlx::Error>(DirectoryInsert::Inserted(inserted))
        }
        .await;

        match result {
            Ok(DirectoryInsert::Inserted(n)) => {
                tx.commit().await?;
                info!(day = %day, inserted = n, "Successfully inserted station records");
                Ok(DirectoryInsert::Inserted(n))
            }
            Ok(DirectoryInsert::AlreadyPresent) => {
                tx.rollback().await?;
                info!(day = %day, "Station data for day already exists, skipping insert");
                Ok(DirectoryInsert::AlreadyPresent)
            }
            Err(e) => {
                error!(day = %day, error = %e, "Error inserting station data, rolling back");
                if let Err(rb) = tx.rollback().await {
                    error!(day = %day, error = %rb, "Rollback failed");
                }
                Err(e.into())
            }
        }
    }

    async fn delete_stations_older_than(
        &mut self,
        today: DayStamp,
        retention_days: u32,
    ) -> Result<u64, PersistenceError> {
        // ---
        let cutoff = retention_cutoff(today, retention_days);
        let mut tx = self.conn.begin().await?;

        let result = sqlx::query(
            "DELETE FROM measuring_station WHERE TO_DATE(std_dt, 'YYYYMMDD') < $1",
        )
        .bind(cutoff.date())
        .execute(&mut *tx)
        .await;

        match result {
            Ok(done) => {
                tx.commit().await?;
                let deleted = done.rows_affected();
                info!(cutoff = %cutoff, deleted, "Deleted station records older than retention window");
                Ok(deleted)
            }
            Err(e) => {
                error!(cutoff = %cutoff, error = %e, "Error deleting old station data, rolling back");
                if let Err(rb) = tx.rollback().await {
                    error!(error = %rb, "Rollback failed");
                }
                Err(e.into())
            }
        }
    }

    async fn list_stations_for_day(
        &mut self,
        day: DayStamp,
    ) -> Result<Vec<String>, PersistenceError> {
        // ---
        let stations: Vec<String> =
            sqlx::query_scalar("SELECT stationname FROM measuring_station WHERE std_dt = $1 ORDER BY id")
                .bind(day.to_string())
                .fetch_all(&mut self.conn)
                .await?;

        info!(day = %day, stations = stations.len(), "Found stations for day");
        Ok(stations)
    }
}
