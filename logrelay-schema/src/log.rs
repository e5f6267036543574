use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;
use uuid::Uuid;

/// One page of the paginated logs endpoint.
///
/// The endpoint paginates backwards in time: `previous` points at the page holding the records
/// that arrived after this one. A missing `previous` means there is no new data yet.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LogPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<Log>,

    #[serde(default)]
    pub previous: Option<Url>,
}

/// A log record as returned by the source API.
///
/// Records are forwarded untouched. `uuid` is globally unique and is used as the document key
/// downstream; `(app, device_udid, time, absolute_time)` is unique as well.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Log {
    pub uuid: Uuid,

    #[serde(default, deserialize_with = "null_as_default")]
    pub app: i64,

    /// Device UDID (usually a UUID).
    #[serde(rename = "device.udid", default, deserialize_with = "null_as_default")]
    pub device_udid: String,
    #[serde(rename = "device.name", default, deserialize_with = "null_as_default")]
    pub device_name: String,
    /// Device model.
    #[serde(rename = "device.type", default, deserialize_with = "null_as_default")]
    pub device_type: String,
    /// App version, e.g. `1.2.3.4`.
    #[serde(rename = "version.version", default, deserialize_with = "null_as_default")]
    pub version: String,
    /// App build, e.g. `1234`.
    #[serde(rename = "version.build", default, deserialize_with = "null_as_default")]
    pub build: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub language: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub os_version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub timezone: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub file: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub line: i64,
    /// Raw level code, see [`LogLevel::from_code`].
    #[serde(rename = "log_level", default, deserialize_with = "null_as_default")]
    pub level: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tag: String,

    /// Device clock timestamp, corrected upstream when obviously wrong.
    #[serde(default, deserialize_with = "null_as_default")]
    pub time: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thread_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thread_name: String,
    /// Orders records sharing the same `time`; never repeats for one `time` value.
    #[serde(default, deserialize_with = "null_as_default")]
    pub absolute_time: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,

    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_status: Option<i32>,

    /// Android activity the record was emitted in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_status: Option<String>,
    /// iOS view controller the record was emitted in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_controller_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_controller_title: Option<String>,

    /// Set when the record marks a gap in reporting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap_end: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_value_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_value_value: Option<String>,

    /// Callback interaction (Android event, iOS selector) the record happened in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_event_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_detail: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js_xpath: Option<String>,
}

/// Reads an explicit `null` the same way as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Log {
    pub fn log_level(&self) -> Option<LogLevel> {
        LogLevel::from_code(self.level)
    }
}

/// Log levels, from more to less critical.
///
/// The wire codes are not sorted by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Fatal,
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            5 => Some(Self::Fatal),
            2 => Some(Self::Error),
            1 => Some(Self::Warning),
            4 => Some(Self::Info),
            0 => Some(Self::Debug),
            3 => Some(Self::Trace),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Fatal => 5,
            Self::Error => 2,
            Self::Warning => 1,
            Self::Info => 4,
            Self::Debug => 0,
            Self::Trace => 3,
        }
    }
}
