//! Event types for the event store.
//!
//! This module provides:
//! - [`Event`]: a calendar event as stored and exchanged on the wire
//! - [`Source`]: the channel an event was submitted through
//!
//! Events are identified externally by their client-supplied `uuid`. The
//! numeric `id` is assigned by the store on first insert and never changes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::tag::{Tag, WireType};
use crate::time::Moment;

/// The channel an event was submitted through.
///
/// Known channels serialize to their upper-case wire names. Any other tag is
/// preserved verbatim so that a round trip through the store never rewrites
/// client data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Source {
    /// The interactive application.
    #[default]
    App,
    /// The web front end.
    Web,
    /// The XML batch importer.
    Xml,
    /// Any other channel tag.
    Other(String),
}

impl Source {
    /// Returns the wire name of this source.
    pub fn as_str(&self) -> &str {
        match self {
            Self::App => "APP",
            Self::Web => "WEB",
            Self::Xml => "XML",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "APP" => Self::App,
            "WEB" => Self::Web,
            "XML" => Self::Xml,
            other => Self::Other(other.to_string()),
        })
    }
}

impl From<String> for Source {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(source) => source,
            Err(never) => match never {},
        }
    }
}

impl From<Source> for String {
    fn from(source: Source) -> Self {
        source.as_str().to_string()
    }
}

/// A calendar event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "__type__", default)]
    pub kind: Tag<Event>,
    /// Store-assigned identifier. Zero until the event has been stored.
    #[serde(default)]
    pub id: i64,
    /// Schema version of the submitting client.
    #[serde(default)]
    pub version: String,
    /// Client-supplied stable identifier; the deduplication key.
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub start: Moment,
    #[serde(default)]
    pub end: Moment,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub info: String,
    /// Reminder lead, in the client's units.
    #[serde(default)]
    pub reminder: i32,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub important: bool,
    #[serde(default)]
    pub urgent: bool,
    #[serde(default)]
    pub source: Source,
}

impl WireType for Event {
    const TYPE_NAME: &'static str = "EventData";
}

impl Event {
    /// Creates an event with the given uuid and title and default fields.
    pub fn new(uuid: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// Builder: set the schema version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Builder: set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Builder: set start and end moments.
    pub fn with_span(mut self, start: Moment, end: Moment) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Builder: set the address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Builder: set the free-text info.
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }

    /// Builder: set the reminder lead.
    pub fn with_reminder(mut self, reminder: i32) -> Self {
        self.reminder = reminder;
        self
    }

    /// Builder: set the done flag.
    pub fn with_done(mut self, done: bool) -> Self {
        self.done = done;
        self
    }

    /// Builder: set the important flag.
    pub fn with_important(mut self, important: bool) -> Self {
        self.important = important;
        self
    }

    /// Builder: set the urgent flag.
    pub fn with_urgent(mut self, urgent: bool) -> Self {
        self.urgent = urgent;
        self
    }

    /// Builder: set the source channel.
    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    /// Returns the canonical text form hashed by [`Event::content_hash`].
    ///
    /// The store-assigned `id` and the `source` channel are not part of the
    /// content: re-submitting the same event through another channel is a
    /// no-op.
    pub fn canonical_form(&self) -> String {
        format!(
            "Version: {}, UUID: {}, Title: {}, Start: {}, End: {}, Address: {}, Info: {}, \
             Reminder: {}, Done: {}, Important: {}, Urgent: {}",
            self.version,
            self.uuid,
            self.title,
            self.start.canonical_form(),
            self.end.canonical_form(),
            self.address,
            self.info,
            self.reminder,
            self.done,
            self.important,
            self.urgent,
        )
    }

    /// SHA-256 digest of the canonical form.
    pub fn content_hash(&self) -> [u8; 32] {
        Sha256::digest(self.canonical_form().as_bytes()).into()
    }

    /// Lower-case hex rendering of [`Event::content_hash`].
    pub fn checksum(&self) -> String {
        hex::encode(self.content_hash())
    }

    /// Returns true if both events carry the same content.
    pub fn same_content(&self, other: &Event) -> bool {
        self.content_hash() == other.content_hash()
    }
}
