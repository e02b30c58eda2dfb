//! Data models for the air quality collector.
//!
//! Raw `*Item` types mirror the upstream JSON and keep every field as an
//! untyped [`serde_json::Value`]; the sanitizer turns them into the typed
//! records that are persisted.

use std::borrow::Cow;
use std::fmt;

use chrono::{Days, NaiveDate};
use serde::Deserialize;
use serde_json::Value;

use crate::error::SanitizationError;
use crate::sanitize::{
    sanitize_float, sanitize_grade, sanitize_int, sanitize_measurement, sanitize_string,
    timestamp_key,
};

// ---

/// Calendar day used as the partition and retention key (`YYYYMMDD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayStamp(NaiveDate);

impl DayStamp {
    // ---
    pub const FORMAT: &'static str = "%Y%m%d";

    /// Today in the local time zone of the host.
    pub fn today() -> Self {
        Self(chrono::Local::now().date_naive())
    }

    pub fn parse(s: &str) -> Result<Self, chrono::ParseError> {
        NaiveDate::parse_from_str(s, Self::FORMAT).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// The day `days` before this one, saturating at the calendar minimum.
    pub fn days_before(&self, days: u32) -> Self {
        // ---
        Self(
            self.0
                .checked_sub_days(Days::new(u64::from(days)))
                .unwrap_or(NaiveDate::MIN),
        )
    }
}

impl fmt::Display for DayStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

/// Oldest day that survives a purge run on `today`.
///
/// Rows dated strictly before the cutoff are deleted; a row dated exactly
/// `retention_days` before today is kept.
pub fn retention_cutoff(today: DayStamp, retention_days: u32) -> DayStamp {
    today.days_before(retention_days)
}

/// Whether a row with day stamp `day` survives a purge with `cutoff`.
pub fn is_retained(day: DayStamp, cutoff: DayStamp) -> bool {
    day >= cutoff
}

// ---

/// Top-level JSON envelope shared by both endpoints.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub response: ApiEnvelope<T>,
}

#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub header: Option<ApiHeader>,
    pub body: Option<ApiBody<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHeader {
    pub result_code: Option<String>,
    pub result_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiBody<T> {
    pub items: Option<Vec<T>>,
    pub total_count: Option<Value>,
}

impl<T> ApiResponse<T> {
    /// Result code reported by the API, when it is not the success code `"00"`.
    pub fn error_code(&self) -> Option<(&str, &str)> {
        // ---
        let header = self.response.header.as_ref()?;
        let code = header.result_code.as_deref()?;
        if code == "00" {
            return None;
        }
        Some((code, header.result_msg.as_deref().unwrap_or("")))
    }

    /// Number of rows the API reports for the whole query, if given.
    pub fn total_count(&self) -> Option<&Value> {
        self.response.body.as_ref()?.total_count.as_ref()
    }

    pub fn into_items(self) -> Vec<T> {
        self.response
            .body
            .and_then(|body| body.items)
            .unwrap_or_default()
    }
}

/// One entry of the station directory, as returned upstream.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationItem {
    // ---
    pub station_name: Option<Value>,
    pub addr: Option<Value>,
    pub year: Option<Value>,
    pub mang_name: Option<Value>,
    pub item: Option<Value>,
    pub dm_x: Option<Value>,
    pub dm_y: Option<Value>,
}

/// One hourly observation for a station, as returned upstream.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingItem {
    // ---
    pub data_time: Option<Value>,
    pub so2_value: Option<Value>,
    pub so2_grade: Option<Value>,
    pub co_value: Option<Value>,
    pub co_grade: Option<Value>,
    pub o3_value: Option<Value>,
    pub o3_grade: Option<Value>,
    pub no2_value: Option<Value>,
    pub no2_grade: Option<Value>,
    pub pm10_value: Option<Value>,
    pub pm10_grade: Option<Value>,
    pub pm25_value: Option<Value>,
    pub pm25_grade: Option<Value>,
    pub khai_value: Option<Value>,
    pub khai_grade: Option<Value>,
}

// ---

/// Sanitized row of the `measuring_station` table.
#[derive(Debug, Clone, PartialEq)]
pub struct StationRecord {
    // ---
    pub day: DayStamp,
    pub station_name: String,
    pub addr: String,
    pub year: i32,
    pub mang_name: String,
    pub item: String,
    pub dm_x: f64,
    pub dm_y: f64,
}

/// Sanitized row of the `measuring_station_realtime` table.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeReading {
    // ---
    pub day: DayStamp,
    pub station_name: String,
    pub data_time: Option<String>,
    pub so2_value: f64,
    pub so2_grade: i32,
    pub co_value: f64,
    pub co_grade: i32,
    pub o3_value: f64,
    pub o3_grade: i32,
    pub no2_value: f64,
    pub no2_grade: i32,
    pub pm10_value: i32,
    pub pm10_grade: i32,
    pub pm25_value: i32,
    pub pm25_grade: i32,
    pub khai_value: i32,
    pub khai_grade: i32,
}

impl StationItem {
    // ---
    pub fn to_record(&self, day: DayStamp) -> Result<StationRecord, SanitizationError> {
        // ---
        Ok(StationRecord {
            day,
            station_name: sanitize_string(self.station_name.as_ref()),
            addr: sanitize_string(self.addr.as_ref()),
            year: sanitize_int("year", self.year.as_ref())?,
            mang_name: sanitize_string(self.mang_name.as_ref()),
            item: sanitize_string(self.item.as_ref()),
            dm_x: sanitize_float("dmX", self.dm_x.as_ref())?,
            dm_y: sanitize_float("dmY", self.dm_y.as_ref())?,
        })
    }
}

impl ReadingItem {
    // ---
    /// Sort key for picking the latest observation.
    pub fn timestamp(&self) -> Cow<'_, str> {
        timestamp_key(self.data_time.as_ref())
    }

    pub fn to_reading(
        &self,
        day: DayStamp,
        station_name: &str,
    ) -> Result<RealtimeReading, SanitizationError> {
        // ---
        let data_time = match &self.data_time {
            None | Some(Value::Null) => None,
            Some(_) => Some(self.timestamp().into_owned()),
        };

        Ok(RealtimeReading {
            day,
            station_name: station_name.to_string(),
            data_time,
            so2_value: sanitize_measurement("so2Value", self.so2_value.as_ref())?,
            so2_grade: sanitize_grade("so2Grade", self.so2_grade.as_ref())?,
            co_value: sanitize_measurement("coValue", self.co_value.as_ref())?,
            co_grade: sanitize_grade("coGrade", self.co_grade.as_ref())?,
            o3_value: sanitize_measurement("o3Value", self.o3_value.as_ref())?,
            o3_grade: sanitize_grade("o3Grade", self.o3_grade.as_ref())?,
            no2_value: sanitize_measurement("no2Value", self.no2_value.as_ref())?,
            no2_grade: sanitize_grade("no2Grade", self.no2_grade.as_ref())?,
            pm10_value: sanitize_measurement("pm10Value", self.pm10_value.as_ref())?,
            pm10_grade: sanitize_grade("pm10Grade", self.pm10_grade.as_ref())?,
            pm25_value: sanitize_measurement("pm25Value", self.pm25_value.as_ref())?,
            pm25_grade: sanitize_grade("pm25Grade", self.pm25_grade.as_ref())?,
            khai_value: sanitize_measurement("khaiValue", self.khai_value.as_ref())?,
            khai_grade: sanitize_grade("khaiGrade", self.khai_grade.as_ref())?,
        })
    }
}

/// The observation with the lexically greatest timestamp.
///
/// Ties resolve to the earliest item in the list. Returns `None` for an empty
/// slice.
pub fn select_latest(items: &[ReadingItem]) -> Option<&ReadingItem> {
    // ---
    items.iter().rev().max_by(|a, b| a.timestamp().cmp(&b.timestamp()))
}
