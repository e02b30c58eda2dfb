//! Repository tests against a real PostgreSQL server.
//!
//! Set `TEST_DATABASE_URL` to run them; without it every test returns early.
//! Each test works in its own schema so they can run in parallel.

use anyhow::Result;
use serde_json::json;
use sqlx::{Connection, PgConnection};

use airkorea_collector::{
    Database, DayStamp, DirectoryInsert, PersistenceError, ReadingItem, RealtimeRepository, StationItem,
    StationRecord, StationRepository, Store,
};

// ---

/// Connection with `search_path` set to `schema`, or `None` without a server.
///
/// `fresh` drops and recreates the schema first; a second connection to the
/// same test passes `false`.
async fn connect_in(schema: &str, fresh: bool) -> Result<Option<PgConnection>> {
    // ---
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return Ok(None);
    };

    let mut conn = PgConnection::connect(&url).await?;
    if fresh {
        sqlx::query(&format!("DROP SCHEMA IF EXISTS {schema} CASCADE"))
            .execute(&mut conn)
            .await?;
        sqlx::query(&format!("CREATE SCHEMA {schema}"))
            .execute(&mut conn)
            .await?;
    }
    sqlx::query(&format!("SET search_path TO {schema}"))
        .execute(&mut conn)
        .await?;

    Ok(Some(conn))
}

async fn test_db(schema: &str) -> Result<Option<Database>> {
    // ---
    let Some(conn) = connect_in(schema, true).await? else {
        return Ok(None);
    };

    let mut db = Database::from_connection(conn);
    db.ensure_schema().await?;
    Ok(Some(db))
}

fn day(s: &str) -> DayStamp {
    DayStamp::parse(s).unwrap()
}

fn stations(d: DayStamp, prefix: &str, n: usize) -> Vec<StationRecord> {
    // ---
    (1..=n)
        .map(|i| {
            let item: StationItem = serde_json::from_value(json!({
                "stationName": format!("{prefix}-{i}"),
                "year": 2000 + i,
                "dmX": "37.5",
            }))
            .unwrap();
            item.to_record(d).unwrap()
        })
        .collect()
}

fn reading(data_time: &str, khai: &str) -> ReadingItem {
    serde_json::from_value(json!({ "dataTime": data_time, "khaiValue": khai, "khaiGrade": "2" })).unwrap()
}

// ---

#[tokio::test]
async fn station_batch_is_idempotent_per_day() -> Result<()> {
    // ---
    let Some(mut db) = test_db("collector_idempotent").await? else {
        return Ok(());
    };
    let today = day("20240601");

    assert!(!db.has_data_for_day(today).await?);
    let first = db.bulk_insert_stations(today, &stations(today, "a", 5)).await?;
    assert_eq!(first, DirectoryInsert::Inserted(5));
    assert!(db.has_data_for_day(today).await?);

    let second = db.bulk_insert_stations(today, &stations(today, "b", 7)).await?;
    assert_eq!(second, DirectoryInsert::AlreadyPresent);

    let names = db.list_stations_for_day(today).await?;
    assert_eq!(names, vec!["a-1", "a-2", "a-3", "a-4", "a-5"]);

    db.close().await?;
    Ok(())
}

#[tokio::test]
async fn large_directory_spans_several_insert_chunks() -> Result<()> {
    // ---
    let Some(mut db) = test_db("collector_chunks").await? else {
        return Ok(());
    };
    let today = day("20240601");

    let inserted = db.bulk_insert_stations(today, &stations(today, "s", 2500)).await?;
    assert_eq!(inserted, DirectoryInsert::Inserted(2500));
    assert_eq!(db.list_stations_for_day(today).await?.len(), 2500);

    db.close().await?;
    Ok(())
}

#[tokio::test]
async fn retention_keeps_seven_days_and_drops_eight() -> Result<()> {
    // ---
    let Some(mut db) = test_db("collector_retention").await? else {
        return Ok(());
    };
    let today = day("20240610");
    let kept = day("20240603");
    let dropped = day("20240602");

    db.bulk_insert_stations(dropped, &stations(dropped, "old", 2)).await?;
    db.bulk_insert_stations(kept, &stations(kept, "edge", 3)).await?;
    db.upsert_latest_reading(dropped, "old-1", &[reading("2024-06-02 23:00", "50")])
        .await?;
    db.upsert_latest_reading(kept, "edge-1", &[reading("2024-06-03 23:00", "51")])
        .await?;

    assert_eq!(db.delete_stations_older_than(today, 7).await?, 2);
    assert_eq!(db.delete_readings_older_than(today, 7).await?, 1);

    assert!(!db.has_data_for_day(dropped).await?);
    assert_eq!(db.list_stations_for_day(kept).await?.len(), 3);

    db.close().await?;
    Ok(())
}

#[tokio::test]
async fn realtime_upsert_keeps_one_latest_row() -> Result<()> {
    // ---
    let Some(mut db) = test_db("collector_upsert").await? else {
        return Ok(());
    };
    let today = day("20240601");

    let items = [
        reading("2024-06-01 10:00", "40"),
        reading("2024-06-01 14:00", "78"),
    ];
    let stored = db.upsert_latest_reading(today, "Seoul-A", &items).await?;
    assert_eq!(
        stored.and_then(|r| r.data_time).as_deref(),
        Some("2024-06-01 14:00")
    );

    // Same day again: replaced, not duplicated
    db.upsert_latest_reading(today, "Seoul-A", &[reading("2024-06-01 15:00", "80")])
        .await?;

    let db_url = std::env::var("TEST_DATABASE_URL")?;
    let mut check = PgConnection::connect(&db_url).await?;
    let rows: Vec<(String, Option<String>, i32, f64)> = sqlx::query_as(
        "SELECT station_name, data_time, khaivalue, so2value \
         FROM collector_upsert.measuring_station_realtime WHERE std_dt = $1",
    )
    .bind(today.to_string())
    .fetch_all(&mut check)
    .await?;

    assert_eq!(
        rows,
        vec![("Seoul-A".to_string(), Some("2024-06-01 15:00".to_string()), 80, 0.0)]
    );

    check.close().await?;
    db.close().await?;
    Ok(())
}

#[tokio::test]
async fn empty_readings_write_nothing() -> Result<()> {
    // ---
    let Some(mut db) = test_db("collector_empty").await? else {
        return Ok(());
    };

    let stored = db.upsert_latest_reading(day("20240601"), "s1", &[]).await?;
    assert!(stored.is_none());
    assert_eq!(db.delete_readings_older_than(day("20300101"), 0).await?, 0);

    db.close().await?;
    Ok(())
}

#[tokio::test]
async fn failed_chunk_rolls_back_whole_batch() -> Result<()> {
    // ---
    let Some(mut db) = test_db("collector_rollback").await? else {
        return Ok(());
    };
    let today = day("20240601");

    // Third chunk carries a value Postgres refuses to store in TEXT
    let mut records = stations(today, "s", 2500);
    records[2400].station_name = "bad\0name".to_string();

    let result = db.bulk_insert_stations(today, &records).await;
    assert!(result.is_err(), "NUL byte must be rejected: {result:?}");
    assert!(!db.has_data_for_day(today).await?);
    assert!(db.list_stations_for_day(today).await?.is_empty());

    // The guard did not latch: a clean retry stores the full day
    let retry = db.bulk_insert_stations(today, &stations(today, "s", 2500)).await?;
    assert_eq!(retry, DirectoryInsert::Inserted(2500));
    assert_eq!(db.list_stations_for_day(today).await?.len(), 2500);

    db.close().await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_runs_insert_the_day_once() -> Result<()> {
    // ---
    let Some(mut first) = test_db("collector_concurrent").await? else {
        return Ok(());
    };
    let Some(conn) = connect_in("collector_concurrent", false).await? else {
        return Ok(());
    };
    let mut second = Database::from_connection(conn);
    let today = day("20240601");

    let first_batch = stations(today, "a", 3000);
    let second_batch = stations(today, "b", 3000);
    let (a, b) = tokio::join!(
        first.bulk_insert_stations(today, &first_batch),
        second.bulk_insert_stations(today, &second_batch),
    );

    let mut outcomes = vec![a?, b?];
    outcomes.sort_by_key(|o| matches!(o, DirectoryInsert::AlreadyPresent));
    assert_eq!(
        outcomes,
        vec![DirectoryInsert::Inserted(3000), DirectoryInsert::AlreadyPresent]
    );

    let names = first.list_stations_for_day(today).await?;
    assert_eq!(names.len(), 3000);
    let winner = &names[0][..2];
    assert!(names.iter().all(|n| n.starts_with(winner)), "rows from both runs");

    second.close().await?;
    first.close().await?;
    Ok(())
}

#[tokio::test]
async fn legacy_realtime_table_without_unique_key_is_rejected() -> Result<()> {
    // ---
    let Some(mut conn) = connect_in("collector_legacy_realtime", true).await? else {
        return Ok(());
    };
    sqlx::query(
        "CREATE TABLE measuring_station_realtime (\
             id SERIAL PRIMARY KEY, std_dt VARCHAR(8) NOT NULL, \
             station_name TEXT NOT NULL, data_time TEXT)",
    )
    .execute(&mut conn)
    .await?;

    let mut db = Database::from_connection(conn);
    let err = db.ensure_schema().await.unwrap_err();
    assert!(matches!(err, PersistenceError::IncompatibleSchema(_)), "{err}");

    db.close().await?;
    Ok(())
}

#[tokio::test]
async fn legacy_station_table_without_id_is_rejected() -> Result<()> {
    // ---
    let Some(mut conn) = connect_in("collector_legacy_station", true).await? else {
        return Ok(());
    };
    sqlx::query(
        "CREATE TABLE measuring_station (\
             std_dt VARCHAR(8) NOT NULL, stationname TEXT NOT NULL)",
    )
    .execute(&mut conn)
    .await?;

    let mut db = Database::from_connection(conn);
    let err = db.ensure_schema().await.unwrap_err();
    assert!(matches!(err, PersistenceError::IncompatibleSchema(_)), "{err}");

    db.close().await?;
    Ok(())
}
