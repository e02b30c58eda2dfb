//! Database schema management for `airkorea-collector`.
//!
//! Ensures required tables and indexes exist before the first write of a run.
//! Applied once right after connecting (EMBP: single gateway call from
//! `store`).

use sqlx::{Connection, PgConnection};

use crate::error::PersistenceError;

// ---

/// Create the schema if it does not exist (idempotent).
///
/// Creates `measuring_station` for the daily station directory and
/// `measuring_station_realtime` for the latest reading per station and day.
/// Safe to call on every run; no-op if objects already exist.
///
/// `CREATE TABLE IF NOT EXISTS` leaves a pre-existing table untouched, so the
/// columns and constraint the repositories depend on are checked afterwards
/// and a mismatch fails with [`PersistenceError::IncompatibleSchema`].
pub async fn create_schema(conn: &mut PgConnection) -> Result<(), PersistenceError> {
    // ---
    let mut tx = conn.begin().await?;

    // One row per station per day; the day guard lives in the bulk insert
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS measuring_station (
            id          SERIAL PRIMARY KEY,
            std_dt      VARCHAR(8)       NOT NULL,
            stationname TEXT             NOT NULL,
            addr        TEXT             NOT NULL,
            year        INTEGER          NOT NULL,
            mangname    TEXT             NOT NULL,
            item        TEXT             NOT NULL,
            dmx         DOUBLE PRECISION NOT NULL,
            dmy         DOUBLE PRECISION NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Latest reading per station per day
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS measuring_station_realtime (
            id           SERIAL PRIMARY KEY,
            std_dt       VARCHAR(8)       NOT NULL,
            station_name TEXT             NOT NULL,
            data_time    TEXT,
            so2value     DOUBLE PRECISION NOT NULL,
            so2grade     INTEGER          NOT NULL,
            covalue      DOUBLE PRECISION NOT NULL,
            cograde      INTEGER          NOT NULL,
            o3value      DOUBLE PRECISION NOT NULL,
            o3grade      INTEGER          NOT NULL,
            no2value     DOUBLE PRECISION NOT NULL,
            no2grade     INTEGER          NOT NULL,
            pm10value    INTEGER          NOT NULL,
            pm10grade    INTEGER          NOT NULL,
            pm25value    INTEGER          NOT NULL,
            pm25grade    INTEGER          NOT NULL,
            khaivalue    INTEGER          NOT NULL,
            khaigrade    INTEGER          NOT NULL,
            CONSTRAINT measuring_station_realtime_day_station_key
                UNIQUE (std_dt, station_name)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Day lookups for the guard, enumeration and retention
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_measuring_station_std_dt
            ON measuring_station (std_dt);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    verify_schema(&mut *tx).await?;

    tx.commit().await?;
    Ok(())
}

/// Check a pre-existing schema for what the queries assume.
///
/// - `measuring_station.id` orders the day's stations
/// - a unique index on exactly `(std_dt, station_name)` backs the realtime
///   `ON CONFLICT` upsert
async fn verify_schema(conn: &mut PgConnection) -> Result<(), PersistenceError> {
    // ---
    let has_id: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM pg_attribute
            WHERE attrelid = 'measuring_station'::regclass
              AND attname = 'id'
              AND NOT attisdropped
        )
        "#,
    )
    .fetch_one(&mut *conn)
    .await?;

    if !has_id {
        return Err(PersistenceError::IncompatibleSchema(
            "measuring_station has no id column",
        ));
    }

    let has_day_station_key: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM pg_index i
            WHERE i.indrelid = 'measuring_station_realtime'::regclass
              AND i.indisunique
              AND i.indpred IS NULL
              AND i.indexprs IS NULL
              AND i.indnatts = 2
              AND (
                  SELECT array_agg(a.attname::text ORDER BY a.attname::text)
                  FROM pg_attribute a
                  WHERE a.attrelid = i.indrelid
                    AND a.attnum = ANY (i.indkey)
              ) = ARRAY['station_name', 'std_dt']
        )
        "#,
    )
    .fetch_one(&mut *conn)
    .await?;

    if !has_day_station_key {
        return Err(PersistenceError::IncompatibleSchema(
            "measuring_station_realtime has no unique key on (std_dt, station_name)",
        ));
    }

    Ok(())
}
