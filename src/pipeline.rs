//! Daily collection run.
//!
//! One run is a fixed sequence: fetch the station directory, connect, purge
//! both tables, ingest the directory for today, then fetch and store the
//! latest reading of every station known for today, one at a time. Only the
//! directory fetch and the connect step end the run early; every later
//! failure is logged, recorded in the [`RunSummary`] and skipped.

use std::future::Future;
use std::process::ExitCode;

use tracing::{error, info, info_span, warn, Instrument};

use crate::client::AirQualitySource;
use crate::error::{IngestError, PersistenceError, SanitizationError};
use crate::models::{DayStamp, StationItem, StationRecord};
use crate::store::{DirectoryInsert, Store};

// ---

/// Per-run record of what succeeded and what did not.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    // ---
    pub day: DayStamp,
    /// Rows purged from the station table, `None` if the purge failed.
    pub purged_stations: Option<u64>,
    /// Rows purged from the realtime table, `None` if the purge failed.
    pub purged_readings: Option<u64>,
    /// Today's directory ingest, `None` if it failed.
    pub directory: Option<DirectoryInsert>,
    /// Station enumeration failed, so no readings were fetched.
    pub enumeration_failed: bool,
    pub stations_succeeded: Vec<String>,
    /// Stations whose fetch returned no items.
    pub stations_without_data: Vec<String>,
    pub stations_failed: Vec<String>,
}

impl RunSummary {
    fn new(day: DayStamp) -> Self {
        Self {
            day,
            purged_stations: None,
            purged_readings: None,
            directory: None,
            enumeration_failed: false,
            stations_succeeded: Vec::new(),
            stations_without_data: Vec::new(),
            stations_failed: Vec::new(),
        }
    }

    /// True when every step of the run succeeded.
    pub fn is_complete(&self) -> bool {
        // ---
        self.purged_stations.is_some()
            && self.purged_readings.is_some()
            && self.directory.is_some()
            && !self.enumeration_failed
            && self.stations_failed.is_empty()
    }

    fn log(&self) {
        // ---
        info!(
            day = %self.day,
            directory = ?self.directory,
            purged_stations = ?self.purged_stations,
            purged_readings = ?self.purged_readings,
            succeeded = self.stations_succeeded.len(),
            without_data = self.stations_without_data.len(),
            failed = self.stations_failed.len(),
            "Collection run finished"
        );
        if !self.stations_failed.is_empty() {
            warn!(stations = ?self.stations_failed, "Stations that failed this run");
        }
    }
}

/// Final state of a run, mapped to a process exit code.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The directory could not be fetched; nothing else ran.
    DirectoryFetchFailed,
    /// The database could not be reached; nothing was written.
    DatabaseUnavailable,
    /// The run went through all steps, possibly with local failures.
    Completed(RunSummary),
}

impl RunOutcome {
    // ---
    pub const EXIT_DIRECTORY_FETCH_FAILED: u8 = 2;
    pub const EXIT_DATABASE_UNAVAILABLE: u8 = 3;
    pub const EXIT_PARTIAL: u8 = 4;

    pub fn exit_code(&self) -> u8 {
        // ---
        match self {
            RunOutcome::DirectoryFetchFailed => Self::EXIT_DIRECTORY_FETCH_FAILED,
            RunOutcome::DatabaseUnavailable => Self::EXIT_DATABASE_UNAVAILABLE,
            RunOutcome::Completed(summary) if summary.is_complete() => 0,
            RunOutcome::Completed(_) => Self::EXIT_PARTIAL,
        }
    }
}

impl From<&RunOutcome> for ExitCode {
    fn from(outcome: &RunOutcome) -> Self {
        ExitCode::from(outcome.exit_code())
    }
}

/// Sequences the source and the store for one day.
pub struct Pipeline<'a, C> {
    source: &'a C,
    retention_days: u32,
}

impl<'a, C: AirQualitySource> Pipeline<'a, C> {
    // ---
    pub fn new(source: &'a C, retention_days: u32) -> Self {
        Self {
            source,
            retention_days,
        }
    }

    /// Execute one run for `today`.
    ///
    /// `connect` is only called after the directory fetch succeeded, and the
    /// store it returns is closed before this returns, whatever happened in
    /// between.
    pub async fn run<S, F, Fut>(&self, today: DayStamp, connect: F) -> RunOutcome
    where
        S: Store,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S, PersistenceError>>,
    {
        // ---
        async {
            info!("Starting air quality data collection");

            let directory = match self.source.fetch_station_directory().await {
                Ok(items) => items,
                Err(e) => {
                    error!(error = %e, "Failed to fetch measurement station data, aborting run");
                    return RunOutcome::DirectoryFetchFailed;
                }
            };

            let mut store = match connect().await {
                Ok(store) => store,
                Err(e) => {
                    error!(error = %e, "Error connecting to database, aborting run");
                    return RunOutcome::DatabaseUnavailable;
                }
            };

            let summary = self.ingest(&mut store, today, &directory).await;

            if let Err(e) = store.close().await {
                warn!(error = %e, "Error closing database connection");
            }

            summary.log();
            RunOutcome::Completed(summary)
        }
        .instrument(info_span!("collect", day = %today))
        .await
    }

    /// Steps 3 to 6: purge, directory ingest, enumeration, per-station readings.
    async fn ingest<S: Store>(
        &self,
        store: &mut S,
        today: DayStamp,
        directory: &[StationItem],
    ) -> RunSummary {
        // ---
        let mut summary = RunSummary::new(today);

        summary.purged_stations = match store
            .delete_stations_older_than(today, self.retention_days)
            .await
        {
            Ok(deleted) => Some(deleted),
            Err(e) => {
                error!(retention_days = self.retention_days, error = %e, "Error purging old station data");
                None
            }
        };
        summary.purged_readings = match store
            .delete_readings_older_than(today, self.retention_days)
            .await
        {
            Ok(deleted) => Some(deleted),
            Err(e) => {
                error!(retention_days = self.retention_days, error = %e, "Error purging old realtime data");
                None
            }
        };

        summary.directory = ingest_directory(store, today, directory).await;

        let stations = match store.list_stations_for_day(today).await {
            Ok(stations) => stations,
            Err(e) => {
                error!(error = %e, "Error fetching stations for day");
                summary.enumeration_failed = true;
                Vec::new()
            }
        };

        for station in stations {
            info!(station = %station, "Fetching real-time data for station");

            match self.ingest_station(store, today, &station).await {
                Ok(true) => summary.stations_succeeded.push(station),
                Ok(false) => summary.stations_without_data.push(station),
                Err(e) => {
                    error!(station = %station, error = %e, "Failed to ingest real-time data for station");
                    summary.stations_failed.push(station);
                }
            }
        }

        summary
    }

    /// Fetch and store one station's latest reading; `Ok(false)` if it had none.
    async fn ingest_station<S: Store>(
        &self,
        store: &mut S,
        today: DayStamp,
        station: &str,
    ) -> Result<bool, IngestError> {
        // ---
        let items = self.source.fetch_station_readings(station).await?;
        let stored = store.upsert_latest_reading(today, station, &items).await?;
        Ok(stored.is_some())
    }
}

/// Sanitize and insert today's directory unless the day is already stored.
async fn ingest_directory<S: Store>(
    store: &mut S,
    today: DayStamp,
    directory: &[StationItem],
) -> Option<DirectoryInsert> {
    // ---
    match store.has_data_for_day(today).await {
        Ok(true) => {
            info!("Station data for day already exists, skipping insert");
            return Some(DirectoryInsert::AlreadyPresent);
        }
        Ok(false) => {}
        Err(e) => {
            error!(error = %e, "Error checking existing station data");
            return None;
        }
    }

    let records = match sanitize_directory(today, directory) {
        Ok(records) => records,
        Err(e) => {
            error!(error = %e, "Station directory rejected, nothing inserted");
            return None;
        }
    };

    match store.bulk_insert_stations(today, &records).await {
        Ok(inserted) => Some(inserted),
        Err(e) => {
            error!(error = %e, "Error inserting station data");
            None
        }
    }
}

/// Convert every directory item, failing on the first malformed one.
pub fn sanitize_directory(
    today: DayStamp,
    directory: &[StationItem],
) -> Result<Vec<StationRecord>, SanitizationError> {
    directory.iter().map(|item| item.to_record(today)).collect()
}
