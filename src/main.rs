//! Application entry point for the `airkorea-collector` job.
//!
//! This binary runs one collection pass and exits; scheduling (cron, systemd
//! timer) is external. The startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Running the pipeline (directory fetch, connect, purge, ingest)
//! - Mapping the run outcome to the process exit code
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required**) – PostgreSQL connection string
//! - `STATION_API_URL`, `REALTIME_API_URL` (**required**) – endpoints
//! - `API_KEY` (**required**) – service key
//! - `COLLECTOR_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `COLLECTOR_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! # Database schema
//! Both tables are created on first run. Pre-existing tables are not altered:
//! if `measuring_station` has no `id` column, or `measuring_station_realtime`
//! has no unique key on `(std_dt, station_name)`, startup fails before any
//! write and the run exits with code `3`.
//!
//! # Exit codes
//! `0` success, `1` configuration error, `2` directory fetch failed,
//! `3` database unreachable or schema incompatible, `4` partial success.
use std::{env, io::IsTerminal, process::ExitCode};

use dotenvy::dotenv;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::Result;

use airkorea_collector::{config, AirKoreaClient, Database, DayStamp, PersistenceError, Pipeline};

// ---

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let client = AirKoreaClient::new(&cfg)?;
    let pipeline = Pipeline::new(&client, cfg.retention_days);

    let db_url = cfg.db_url.clone();
    let outcome = pipeline
        .run(DayStamp::today(), move || async move {
            tracing::info!("Attempting to connect to database: {}", config::mask_db_url(&db_url));
            let mut db = Database::connect(&db_url).await?;
            db.ensure_schema().await?;
            Ok::<_, PersistenceError>(db)
        })
        .await;

    Ok(ExitCode::from(&outcome))
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `COLLECTOR_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, else `COLLECTOR_LOG_LEVEL` (see [`log_filter`])
///
/// Called once at startup before any logging. It installs the subscriber
/// globally for the lifetime of the process.
fn init_tracing() {
    // ---
    let span_events = match env::var("COLLECTOR_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = log_filter(
        env::var("RUST_LOG").ok().as_deref(),
        env::var("COLLECTOR_LOG_LEVEL").ok().as_deref(),
    );

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}

/// Build the level filter from `RUST_LOG`, else `COLLECTOR_LOG_LEVEL`.
///
/// Per-statement sqlx logging is held at `warn` either way unless `RUST_LOG`
/// names an `sqlx` directive itself.
fn log_filter(rust_log: Option<&str>, level: Option<&str>) -> EnvFilter {
    // ---
    let directives = match rust_log.map(str::trim) {
        Some(spec) if !spec.is_empty() => {
            if spec.contains("sqlx") {
                spec.to_string()
            } else {
                format!("{spec},{QUIET_SQLX}")
            }
        }
        _ => {
            let level = match level {
                Some("trace") => "trace",
                Some("debug") => "debug",
                Some("info") => "info",
                Some("warn") => "warn",
                Some("error") => "error",
                _ => "info",
            };
            format!("{level},{QUIET_SQLX}")
        }
    };
    EnvFilter::new(directives)
}

const QUIET_SQLX: &str = "sqlx::query=warn";

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_rust_log_keeps_sqlx_quiet() {
        // ---
        let filter = log_filter(Some("debug"), None).to_string();
        assert!(filter.contains("sqlx::query=warn"), "{filter}");
        assert!(filter.contains("debug"), "{filter}");
    }

    #[test]
    fn test_rust_log_sqlx_directive_wins() {
        // ---
        let filter = log_filter(Some("info,sqlx::query=debug"), None).to_string();
        assert!(filter.contains("sqlx::query=debug"), "{filter}");
        assert!(!filter.contains("sqlx::query=warn"), "{filter}");
    }

    #[test]
    fn test_collector_log_level_fallback() {
        // ---
        let filter = log_filter(None, Some("warn")).to_string();
        assert!(filter.contains("sqlx::query=warn"), "{filter}");

        let blank = log_filter(Some("  "), Some("bogus")).to_string();
        assert!(blank.contains("info"), "{blank}");
        assert!(blank.contains("sqlx::query=warn"), "{blank}");
    }
}
