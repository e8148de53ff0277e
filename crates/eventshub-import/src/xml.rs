//! XML event exports.
//!
//! An export is a flat list of attribute-only elements:
//!
//! ```xml
//! <root>
//!   <event ver="1.1.1" uuid="abc" start="2024-02-13 09:00" end="2024-02-13 09:30"
//!          remind="15" done="No" urgent="No" important="Yes"
//!          title="Standup" address="Room 1" info=""/>
//! </root>
//! ```
//!
//! Dates are local wall-clock `YYYY-MM-DD HH:MM`; flags are `Yes`/`No`, and
//! anything other than `Yes` reads as false.

use std::path::Path;

use eventshub_core::{Event, Moment, Source};
use serde::Deserialize;

use crate::error::{ImportError, ImportResult};

#[derive(Debug, Default, Deserialize)]
struct XmlRoot {
    #[serde(rename = "event", default)]
    events: Vec<XmlEvent>,
}

/// One `<event>` element, attributes kept as written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct XmlEvent {
    #[serde(rename = "@ver")]
    pub version: String,
    #[serde(rename = "@uuid")]
    pub uuid: String,
    #[serde(rename = "@start")]
    pub start: String,
    #[serde(rename = "@end")]
    pub end: String,
    #[serde(rename = "@remind")]
    pub remind: String,
    #[serde(rename = "@done")]
    pub done: String,
    #[serde(rename = "@urgent")]
    pub urgent: String,
    #[serde(rename = "@important")]
    pub important: String,
    #[serde(rename = "@title")]
    pub title: String,
    #[serde(rename = "@address")]
    pub address: String,
    #[serde(rename = "@info")]
    pub info: String,
}

impl XmlEvent {
    fn invalid(&self, field: &'static str, value: &str) -> ImportError {
        ImportError::InvalidField {
            uuid: self.uuid.clone(),
            field,
            value: value.to_string(),
        }
    }

    /// Converts the element into an [`Event`] tagged with [`Source::Xml`].
    ///
    /// # Errors
    ///
    /// [`ImportError::InvalidField`] for an empty uuid, an unparsable date
    /// or a non-numeric reminder.
    pub fn to_event(&self) -> ImportResult<Event> {
        if self.uuid.trim().is_empty() {
            return Err(self.invalid("uuid", &self.uuid));
        }
        let start = parse_moment(&self.start).ok_or_else(|| self.invalid("start", &self.start))?;
        let end = parse_moment(&self.end).ok_or_else(|| self.invalid("end", &self.end))?;
        let reminder = match self.remind.trim() {
            "" => 0,
            value => value
                .parse()
                .map_err(|_| self.invalid("remind", &self.remind))?,
        };

        Ok(Event::new(&self.uuid, &self.title)
            .with_version(&self.version)
            .with_span(start, end)
            .with_address(&self.address)
            .with_info(&self.info)
            .with_reminder(reminder)
            .with_done(parse_flag(&self.done))
            .with_important(parse_flag(&self.important))
            .with_urgent(parse_flag(&self.urgent))
            .with_source(Source::Xml))
    }
}

/// Parses an export document.
///
/// # Errors
///
/// Returns the deserializer's error for malformed XML.
pub fn parse_document(xml: &str) -> Result<Vec<XmlEvent>, quick_xml::de::DeError> {
    let root: XmlRoot = quick_xml::de::from_str(xml)?;
    Ok(root.events)
}

/// Reads and parses one export file.
///
/// # Errors
///
/// [`ImportError::Io`] if the file cannot be read, [`ImportError::Xml`] if
/// it is not a well-formed export.
pub fn load_file(path: &Path) -> ImportResult<Vec<XmlEvent>> {
    let content = std::fs::read_to_string(path).map_err(|e| ImportError::io(path, e))?;
    parse_document(&content).map_err(|e| ImportError::Xml {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// `YYYY-MM-DD HH:MM`. Out-of-range components are left for the server's
/// codec to normalize.
pub fn parse_moment(value: &str) -> Option<Moment> {
    let (date, time) = value.trim().split_once(' ')?;
    let [year, month, day] = numbers(date, '-')?;
    let [hour, minute] = numbers(time.trim(), ':')?;
    Some(Moment::new(year, month, day, hour, minute))
}

fn numbers<const N: usize>(text: &str, separator: char) -> Option<[i32; N]> {
    let mut out = [0; N];
    let mut parts = text.split(separator);
    for slot in &mut out {
        *slot = parts.next()?.trim().parse().ok()?;
    }
    parts.next().is_none().then_some(out)
}

pub fn parse_flag(value: &str) -> bool {
    value.trim() == "Yes"
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root>
  <event ver="1.1.1" uuid="abc" start="2024-02-13 09:00" end="2024-02-13 09:30"
         remind="15" done="No" urgent="No" important="Yes"
         title="Standup" address="Room 1" info="Daily &amp; short"/>
  <event ver="1.1.1" uuid="def" start="2024-07-01 12:00" end="2024-07-01 13:00"
         remind="0" done="Yes" urgent="Yes" important="No"
         title="Lunch" address="" info=""/>
</root>"#;

    #[test]
    fn parses_export() {
        let events = parse_document(EXPORT).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].uuid, "abc");
        assert_eq!(events[0].info, "Daily & short");
        assert_eq!(events[1].title, "Lunch");
    }

    #[test]
    fn converts_to_event() {
        let events = parse_document(EXPORT).unwrap();
        let standup = events[0].to_event().unwrap();
        assert_eq!(standup.uuid, "abc");
        assert_eq!(standup.version, "1.1.1");
        assert_eq!(standup.start, Moment::new(2024, 2, 13, 9, 0));
        assert_eq!(standup.end, Moment::new(2024, 2, 13, 9, 30));
        assert_eq!(standup.reminder, 15);
        assert!(standup.important);
        assert!(!standup.done);
        assert!(!standup.urgent);
        assert_eq!(standup.address, "Room 1");
        assert_eq!(standup.source, Source::Xml);
        assert_eq!(standup.id, 0);

        let lunch = events[1].to_event().unwrap();
        assert!(lunch.done && lunch.urgent && !lunch.important);
    }

    #[test]
    fn empty_root() {
        assert!(parse_document("<root></root>").unwrap().is_empty());
        assert!(parse_document("<root/>").unwrap().is_empty());
    }

    #[test]
    fn malformed_document() {
        assert!(parse_document("<root><event uuid=\"x\"></root>").is_err());
    }

    #[test]
    fn moments() {
        assert_eq!(
            parse_moment("2024-02-13 09:05"),
            Some(Moment::new(2024, 2, 13, 9, 5))
        );
        assert_eq!(
            parse_moment("2023-13-01 00:60"),
            Some(Moment::new(2023, 13, 1, 0, 60))
        );
        assert_eq!(parse_moment("2024-02-13"), None);
        assert_eq!(parse_moment("2024-02 09:00"), None);
        assert_eq!(parse_moment("2024-02-13 09:00:00"), None);
        assert_eq!(parse_moment("tomorrow morning"), None);
    }

    #[test]
    fn flags() {
        assert!(parse_flag("Yes"));
        assert!(!parse_flag("No"));
        assert!(!parse_flag("yes"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn invalid_fields_are_reported() {
        let base = XmlEvent {
            uuid: "u1".into(),
            start: "2024-02-13 09:00".into(),
            end: "2024-02-13 10:00".into(),
            ..Default::default()
        };
        assert_eq!(base.to_event().unwrap().reminder, 0);

        let bad_remind = XmlEvent {
            remind: "soon".into(),
            ..base.clone()
        };
        assert!(matches!(
            bad_remind.to_event(),
            Err(ImportError::InvalidField { field: "remind", .. })
        ));

        let bad_start = XmlEvent {
            start: "13/02/2024".into(),
            ..base.clone()
        };
        assert!(matches!(
            bad_start.to_event(),
            Err(ImportError::InvalidField { field: "start", .. })
        ));

        let no_uuid = XmlEvent {
            uuid: " ".into(),
            ..base
        };
        assert!(matches!(
            no_uuid.to_event(),
            Err(ImportError::InvalidField { field: "uuid", .. })
        ));
    }
}
