//! Request and response envelopes for the HTTP API.
//!
//! Responses carry a `__type__` discriminator naming their logical type.
//! Requests do not; clients that send one anyway are accepted because unknown
//! fields are ignored.

use std::fmt;

use eventshub_core::{Event, Moment, Tag, WireType};
use serde::{Deserialize, Deserializer, Serialize};

use crate::API_VERSION;

/// Deserializes `null` as the type's default (Go-style clients send `null`
/// for empty lists).
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Outcome block embedded in every response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseStatus {
    #[serde(rename = "__type__", default)]
    pub kind: Tag<ResponseStatus>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

impl WireType for ResponseStatus {
    const TYPE_NAME: &'static str = "ResponseStatus";
}

impl ResponseStatus {
    /// A successful status with an empty message.
    pub fn ok() -> Self {
        Self {
            kind: Tag::new(),
            success: true,
            message: String::new(),
        }
    }

    /// A successful status with a message.
    pub fn ok_with(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::ok()
        }
    }

    /// A failed status.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            kind: Tag::new(),
            success: false,
            message: message.into(),
        }
    }
}

/// Login request body.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Login response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMessage {
    pub token: String,
}

/// Body of `insertEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddEventRequest {
    pub event: Event,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddEventResponse {
    #[serde(rename = "__type__", default)]
    pub kind: Tag<AddEventResponse>,
    #[serde(default)]
    pub status: ResponseStatus,
}

impl WireType for AddEventResponse {
    const TYPE_NAME: &'static str = "AddEventResp";
}

impl AddEventResponse {
    pub fn new(status: ResponseStatus) -> Self {
        Self {
            kind: Tag::new(),
            status,
        }
    }
}

/// Body of `getEventCheckSum`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumRequest {
    #[serde(default)]
    pub uuid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumResponse {
    #[serde(rename = "__type__", default)]
    pub kind: Tag<ChecksumResponse>,
    /// Lower-case hex SHA-256 of the stored event; empty on failure.
    #[serde(default)]
    pub sum: String,
    #[serde(default)]
    pub status: ResponseStatus,
}

impl WireType for ChecksumResponse {
    const TYPE_NAME: &'static str = "GetEventCheckSumResp";
}

impl ChecksumResponse {
    pub fn found(sum: impl Into<String>) -> Self {
        Self {
            kind: Tag::new(),
            sum: sum.into(),
            status: ResponseStatus::ok(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            kind: Tag::new(),
            sum: String::new(),
            status: ResponseStatus::failure(message),
        }
    }
}

/// Body of `getEventsWithinTimeRange`. Both bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRequest {
    #[serde(default)]
    pub start: Moment,
    #[serde(default)]
    pub end: Moment,
}

impl RangeRequest {
    pub fn new(start: Moment, end: Moment) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsResponse {
    #[serde(rename = "__type__", default)]
    pub kind: Tag<EventsResponse>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<Event>,
    #[serde(default)]
    pub status: ResponseStatus,
}

impl WireType for EventsResponse {
    const TYPE_NAME: &'static str = "GetEventsResp";
}

impl EventsResponse {
    pub fn found(events: Vec<Event>) -> Self {
        Self {
            kind: Tag::new(),
            events,
            status: ResponseStatus::ok(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            kind: Tag::new(),
            events: Vec::new(),
            status: ResponseStatus::failure(message),
        }
    }
}

/// Latest repository status row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "__type__", default)]
    pub kind: Tag<StatusResponse>,
    /// Epoch seconds of the last mutation.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default)]
    pub version: String,
}

impl WireType for StatusResponse {
    const TYPE_NAME: &'static str = "GetStatusResp";
}

impl StatusResponse {
    pub fn new(timestamp: i64, version: impl Into<String>) -> Self {
        Self {
            kind: Tag::new(),
            timestamp,
            status: ResponseStatus::ok(),
            version: version.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            kind: Tag::new(),
            timestamp: 0,
            status: ResponseStatus::failure(message),
            version: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionResponse {
    #[serde(rename = "__type__", default)]
    pub kind: Tag<VersionResponse>,
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default)]
    pub version: String,
}

impl WireType for VersionResponse {
    const TYPE_NAME: &'static str = "VersionResp";
}

impl VersionResponse {
    /// The running API version.
    pub fn current() -> Self {
        Self {
            kind: Tag::new(),
            status: ResponseStatus::ok(),
            version: API_VERSION.to_string(),
        }
    }
}

/// Body of the kill switch endpoint.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillRequest {
    #[serde(default)]
    pub payload: String,
}

impl KillRequest {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

impl fmt::Debug for KillRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KillRequest")
            .field("payload", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillResponse {
    #[serde(rename = "__type__", default)]
    pub kind: Tag<KillResponse>,
    #[serde(default)]
    pub status: ResponseStatus,
}

impl WireType for KillResponse {
    const TYPE_NAME: &'static str = "KillResp";
}

impl KillResponse {
    /// Shutdown accepted and scheduled `delay_secs` from now.
    pub fn scheduled(delay_secs: u64) -> Self {
        Self {
            kind: Tag::new(),
            status: ResponseStatus::ok_with(format!(
                "Server will shutdown in {delay_secs} seconds!"
            )),
        }
    }

    pub fn rejected() -> Self {
        Self {
            kind: Tag::new(),
            status: ResponseStatus::failure("Deadly package error."),
        }
    }
}
