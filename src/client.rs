//! Remote data source client for the station directory and real-time endpoints.
//!
//! Both calls are single-attempt: any transport error, non-success status,
//! undecodable body or API-level error code is logged here and returned as a
//! [`FetchError`]. Retrying is left to the next scheduled run.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::error::FetchError;
use crate::models::{ApiResponse, ReadingItem, StationItem};
use crate::Config;

const STATION_ENDPOINT: &str = "station directory";
const REALTIME_ENDPOINT: &str = "real-time readings";

// ---

/// Source of station metadata and readings.
///
/// Implemented by [`AirKoreaClient`] over HTTP; tests supply in-memory fakes.
#[allow(async_fn_in_trait)]
pub trait AirQualitySource {
    // ---
    /// Fetch every station of the directory in one page.
    async fn fetch_station_directory(&self) -> Result<Vec<StationItem>, FetchError>;

    /// Fetch today's readings for one station.
    async fn fetch_station_readings(&self, station_name: &str)
        -> Result<Vec<ReadingItem>, FetchError>;
}

/// HTTP client for the public air quality API.
#[derive(Debug, Clone)]
pub struct AirKoreaClient {
    // ---
    http: reqwest::Client,
    station_url: String,
    realtime_url: String,
    api_key: String,
    station_page_size: u32,
    realtime_page_size: u32,
}

impl AirKoreaClient {
    // ---
    pub fn new(cfg: &Config) -> Result<Self, FetchError> {
        // ---
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(u64::from(cfg.api_timeout_secs)))
            .build()?;

        Ok(Self {
            http,
            station_url: cfg.station_api_url.clone(),
            realtime_url: cfg.realtime_api_url.clone(),
            api_key: cfg.api_key.clone(),
            station_page_size: cfg.station_page_size,
            realtime_page_size: cfg.realtime_page_size,
        })
    }

    /// GET request for the whole station directory in one page.
    pub fn station_request(&self) -> Result<reqwest::Request, FetchError> {
        // ---
        let page_size = self.station_page_size.to_string();
        let params = [("numOfRows", page_size.as_str()), ("pageNo", "1")];
        self.build_request(&self.station_url, &params)
    }

    /// GET request for one station's readings of the current day.
    pub fn readings_request(&self, station_name: &str) -> Result<reqwest::Request, FetchError> {
        // ---
        let page_size = self.realtime_page_size.to_string();
        let params = [
            ("numOfRows", page_size.as_str()),
            ("pageNo", "1"),
            ("stationName", station_name),
            ("dataTerm", "DAILY"),
        ];
        self.build_request(&self.realtime_url, &params)
    }

    fn build_request(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<reqwest::Request, FetchError> {
        // ---
        let request = self
            .http
            .get(url)
            .query(&[("serviceKey", self.api_key.as_str()), ("returnType", "json")])
            .query(params)
            .build()?;
        Ok(request)
    }

    /// Send `request` and decode the JSON envelope.
    async fn get_items<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: reqwest::Request,
    ) -> Result<Vec<T>, FetchError> {
        // ---
        let response = self.http.execute(request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { endpoint, status });
        }

        let body = response.text().await?;
        decode_items(endpoint, &body)
    }
}

impl AirQualitySource for AirKoreaClient {
    // ---
    async fn fetch_station_directory(&self) -> Result<Vec<StationItem>, FetchError> {
        // ---
        debug!("Fetching station directory from: {}", self.station_url);

        let result = match self.station_request() {
            Ok(request) => self.get_items(STATION_ENDPOINT, request).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(items) => {
                info!(stations = items.len(), "Fetched station directory");
                Ok(items)
            }
            Err(e) => {
                error!(error = %e, "Error fetching measurement station data");
                Err(e)
            }
        }
    }

    async fn fetch_station_readings(
        &self,
        station_name: &str,
    ) -> Result<Vec<ReadingItem>, FetchError> {
        // ---
        if station_name.trim().is_empty() {
            error!("Station name is missing, not requesting readings");
            return Err(FetchError::MissingStationName);
        }

        let result = match self.readings_request(station_name) {
            Ok(request) => self.get_items(REALTIME_ENDPOINT, request).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(items) => {
                debug!(station = station_name, items = items.len(), "Fetched readings");
                Ok(items)
            }
            Err(e) => {
                error!(station = station_name, error = %e, "Error fetching real-time air quality data");
                Err(e)
            }
        }
    }
}

/// Decode a response body into its item list.
///
/// An API-level error code in the header is a failure even when the HTTP
/// status was 200.
pub fn decode_items<T: DeserializeOwned>(
    endpoint: &'static str,
    body: &str,
) -> Result<Vec<T>, FetchError> {
    // ---
    let parsed: ApiResponse<T> =
        serde_json::from_str(body).map_err(|source| FetchError::Decode { endpoint, source })?;

    if let Some((code, message)) = parsed.error_code() {
        return Err(FetchError::Api {
            endpoint,
            code: code.to_string(),
            message: message.to_string(),
        });
    }

    if let Some(total) = parsed.total_count() {
        debug!("{} reports totalCount={}", endpoint, total);
    }

    Ok(parsed.into_items())
}
