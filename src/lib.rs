//! Daily collector for air quality stations and their real-time readings.
//!
//! The crate is laid out with explicit module boundaries (EMBP): `main.rs`
//! only talks to the items re-exported here.
//! - [`client`] fetches the station directory and per-station readings
//! - [`sanitize`] turns loose upstream values into typed defaults
//! - [`store`] persists both tables over one PostgreSQL connection
//! - [`pipeline`] sequences a run and reports what happened

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod sanitize;
pub mod schema;
pub mod store;

pub use client::{AirKoreaClient, AirQualitySource};
pub use config::Config;
pub use error::{FetchError, IngestError, PersistenceError, SanitizationError};
pub use models::{DayStamp, ReadingItem, RealtimeReading, StationItem, StationRecord};
pub use pipeline::{Pipeline, RunOutcome, RunSummary};
pub use store::{Database, DirectoryInsert, RealtimeRepository, StationRepository, Store};
