use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single analytics event, immutable once created.
///
/// Free-form parameters live in `data` as arbitrary JSON values so that
/// whatever the host application hands in round-trips unchanged, nulls
/// included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub data: Map<String, Value>,
    #[serde(rename = "event_time")]
    pub time: String,
    pub event_num: i64,
}

impl Event {
    pub fn new(name: impl Into<String>, data: Map<String, Value>, time: String, event_num: i64) -> Self {
        Self {
            name: name.into(),
            data,
            time,
            event_num,
        }
    }
}

/// Well-known event names emitted by the pipeline itself.
pub mod names {
    pub const USER_ENGAGEMENT: &str = "user_engagement";
    pub const FIRST_OPEN: &str = "first_open";
    pub const OPEN_APP_WITH_LINK: &str = "dynamic_link_app_open";
}

/// Current local time in the wire format (`2024-05-01T12:30:45+03:00`).
pub fn event_timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}
