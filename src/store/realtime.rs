use sqlx::Connection;
use tracing::{error, info};

use super::{Database, RealtimeRepository};
use crate::error::PersistenceError;
use crate::models::{retention_cutoff, DayStamp, RealtimeReading};

// ---

impl RealtimeRepository for Database {
    // ---
    async fn upsert_reading(&mut self, reading: &RealtimeReading) -> Result<(), PersistenceError> {
        // ---
        let mut tx = self.conn.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO measuring_station_realtime (
                std_dt, station_name, data_time,
                so2value, so2grade, covalue, cograde, o3value, o3grade,
                no2value, no2grade, pm10value, pm10grade, pm25value, pm25grade,
                khaivalue, khaigrade
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (std_dt, station_name) DO UPDATE SET
                data_time = EXCLUDED.data_time,
                so2value  = EXCLUDED.so2value,
                so2grade  = EXCLUDED.so2grade,
                covalue   = EXCLUDED.covalue,
                cograde   = EXCLUDED.cograde,
                o3value   = EXCLUDED.o3value,
                o3grade   = EXCLUDED.o3grade,
                no2value  = EXCLUDED.no2value,
                no2grade  = EXCLUDED.no2grade,
                pm10value = EXCLUDED.pm10value,
                pm10grade = EXCLUDED.pm10grade,
                pm25value = EXCLUDED.pm25value,
                pm25grade = EXCLUDED.pm25grade,
                khaivalue = EXCLUDED.khaivalue,
                khaigrade = EXCLUDED.khaigrade
            "#,
        )
        .bind(reading.day.to_string())
        .bind(&reading.station_name)
        .bind(&reading.data_time)
        .bind(reading.so2_value)
        .bind(reading.so2_grade)
        .bind(reading.co_value)
        .bind(reading.co_grade)
        .bind(reading.o3_value)
        .bind(reading.o3_grade)
        .bind(reading.no2_value)
        .bind(reading.no2_grade)
        .bind(reading.pm10_value)
        .bind(reading.pm10_grade)
        .bind(reading.pm25_value)
        .bind(reading.pm25_grade)
        .bind(reading.khai_value)
        .bind(reading.khai_grade)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                error!(
                    day = %reading.day,
                    station = %reading.station_name,
                    error = %e,
                    "Error inserting realtime data, rolling back"
                );
                if let Err(rb) = tx.rollback().await {
                    error!(error = %rb, "Rollback failed");
                }
                Err(e.into())
            }
        }
    }

    async fn delete_readings_older_than(
        &mut self,
        today: DayStamp,
        retention_days: u32,
    ) -> Result<u64, PersistenceError> {
        // ---
        let cutoff = retention_cutoff(today, retention_days);
        let mut tx = self.conn.begin().await?;

        let result = sqlx::query(
            "DELETE FROM measuring_station_realtime WHERE TO_DATE(std_dt, 'YYYYMMDD') < $1",
        )
        .bind(cutoff.date())
        .execute(&mut *tx)
        .await;

        match result {
            Ok(done) => {
                tx.commit().await?;
                let deleted = done.rows_affected();
                info!(cutoff = %cutoff, deleted, "Deleted realtime records older than retention window");
                Ok(deleted)
            }
            Err(e) => {
                error!(cutoff = %cutoff, error = %e, "Error deleting old realtime data, rolling back");
                if let Err(rb) = tx.rollback().await {
                    error!(error = %rb, "Rollback failed");
                }
                Err(e.into())
            }
        }
    }
}
