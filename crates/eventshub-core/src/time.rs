//! Wall-clock moments and their epoch encoding.
//!
//! Events carry their start and end as [`Moment`]s: calendar fields read in
//! one fixed, named time zone. [`TemporalCodec`] converts moments to epoch
//! seconds for storage and range queries, and back.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tag::{Tag, WireType};

/// Zone used when none is configured.
pub const DEFAULT_TIME_ZONE: &str = "Europe/Warsaw";

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised by the temporal codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The named zone is not in the time zone database.
    #[error("time zone unavailable: {zone}")]
    TimeZoneUnavailable { zone: String },

    /// The timestamp cannot be represented as a calendar date.
    #[error("timestamp out of range: {timestamp}")]
    TimestampOutOfRange { timestamp: i64 },
}

/// A wall-clock moment with minute resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Moment {
    #[serde(rename = "__type__", default)]
    pub kind: Tag<Moment>,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub month: i32,
    #[serde(default)]
    pub day: i32,
    #[serde(default)]
    pub hour: i32,
    #[serde(default)]
    pub minute: i32,
}

impl WireType for Moment {
    const TYPE_NAME: &'static str = "DateTime";
}

impl Moment {
    /// Creates a moment from calendar fields. Fields are not validated.
    pub const fn new(year: i32, month: i32, day: i32, hour: i32, minute: i32) -> Self {
        Self {
            kind: Tag::new(),
            year,
            month,
            day,
            hour,
            minute,
        }
    }

    /// Canonical text form used in event content hashes.
    pub fn canonical_form(&self) -> String {
        format!(
            "{{{{{}}} {} {} {} {} {}}}",
            Self::TYPE_NAME,
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute
        )
    }

    /// Returns true if every field lies in its calendar range.
    pub fn is_valid(&self) -> bool {
        let (Ok(month), Ok(day), Ok(hour), Ok(minute)) = (
            u32::try_from(self.month),
            u32::try_from(self.day),
            u32::try_from(self.hour),
            u32::try_from(self.minute),
        ) else {
            return false;
        };
        NaiveDate::from_ymd_opt(self.year, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .is_some()
    }
}

/// Converts moments to and from epoch seconds in one fixed zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalCodec {
    zone: Tz,
}

impl Default for TemporalCodec {
    fn default() -> Self {
        Self {
            zone: chrono_tz::Europe::Warsaw,
        }
    }
}

impl TemporalCodec {
    /// Creates a codec for the named IANA zone.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TimeZoneUnavailable`] if the zone database has
    /// no entry for `zone`.
    pub fn new(zone: &str) -> CodecResult<Self> {
        let zone = zone
            .parse::<Tz>()
            .map_err(|_| CodecError::TimeZoneUnavailable {
                zone: zone.to_string(),
            })?;
        Ok(Self { zone })
    }

    /// Returns the zone name.
    pub fn zone_name(&self) -> &'static str {
        self.zone.name()
    }

    /// Encodes a moment as epoch seconds.
    ///
    /// Out-of-range fields are carried into the next larger unit (month 13 is
    /// January of the following year, minute 60 is the next hour). An
    /// ambiguous local time resolves to the earlier instant; a local time
    /// inside a DST gap is read with the offset in effect before the gap.
    pub fn encode(&self, moment: &Moment) -> i64 {
        let naive = normalize(moment);
        match self.zone.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt.timestamp(),
            LocalResult::Ambiguous(earliest, _) => earliest.timestamp(),
            LocalResult::None => {
                let before = naive.checked_sub_signed(Duration::days(1)).unwrap_or(naive);
                let offset = self.zone.offset_from_utc_datetime(&before);
                let fixed = chrono::Offset::fix(&offset).local_minus_utc();
                naive.and_utc().timestamp().saturating_sub(i64::from(fixed))
            }
        }
    }

    /// Decodes epoch seconds into a moment in the codec's zone.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TimestampOutOfRange`] if `timestamp` is outside
    /// the representable calendar range.
    pub fn decode(&self, timestamp: i64) -> CodecResult<Moment> {
        let utc = DateTime::from_timestamp(timestamp, 0)
            .ok_or(CodecError::TimestampOutOfRange { timestamp })?;
        let local = utc.with_timezone(&self.zone);
        Ok(Moment::new(
            local.year(),
            local.month() as i32,
            local.day() as i32,
            local.hour() as i32,
            local.minute() as i32,
        ))
    }
}

/// Folds out-of-range calendar fields into a valid naive datetime.
fn normalize(moment: &Moment) -> NaiveDateTime {
    let months = i64::from(moment.year) * 12 + i64::from(moment.month) - 1;
    let year = months.div_euclid(12);
    let month = months.rem_euclid(12) as u32 + 1;

    let min_year = i64::from(NaiveDate::MIN.year());
    let max_year = i64::from(NaiveDate::MAX.year());
    let year = year.clamp(min_year, max_year) as i32;

    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .unwrap_or(if year < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
        .and_time(chrono::NaiveTime::MIN);

    let offset = Duration::days(i64::from(moment.day) - 1)
        + Duration::hours(i64::from(moment.hour))
        + Duration::minutes(i64::from(moment.minute));

    first.checked_add_signed(offset).unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_zone_is_unavailable() {
        let err = TemporalCodec::new("Mars/Olympus_Mons").unwrap_err();
        assert_eq!(
            err,
            CodecError::TimeZoneUnavailable {
                zone: "Mars/Olympus_Mons".to_string()
            }
        );
    }

    #[test]
    fn default_zone_is_warsaw() {
        assert_eq!(TemporalCodec::default().zone_name(), DEFAULT_TIME_ZONE);
        assert_eq!(
            TemporalCodec::new(DEFAULT_TIME_ZONE).unwrap(),
            TemporalCodec::default()
        );
    }

    #[test]
    fn encode_known_instants() {
        let codec = TemporalCodec::default();
        // 2024-02-13 09:00 CET is 08:00 UTC.
        assert_eq!(codec.encode(&Moment::new(2024, 2, 13, 9, 0)), 1_707_811_200);
        // 2024-07-01 12:00 CEST is 10:00 UTC.
        assert_eq!(codec.encode(&Moment::new(2024, 7, 1, 12, 0)), 1_719_828_000);
    }

    #[test]
    fn round_trip_across_the_year() {
        let codec = TemporalCodec::default();
        let samples = [
            Moment::new(2024, 2, 29, 12, 0),
            Moment::new(2021, 1, 12, 0, 0),
            Moment::new(1999, 12, 31, 23, 59),
            Moment::new(2024, 3, 31, 1, 59),
            Moment::new(2024, 3, 31, 3, 0),
            Moment::new(2024, 10, 27, 1, 30),
            Moment::new(1970, 1, 1, 0, 0),
            Moment::new(2100, 6, 15, 18, 45),
        ];
        for moment in samples {
            assert!(moment.is_valid());
            let decoded = codec.decode(codec.encode(&moment)).unwrap();
            assert_eq!(decoded, moment, "round trip failed for {moment:?}");
        }
    }

    #[test]
    fn round_trip_every_hour_of_a_day() {
        let codec = TemporalCodec::new("America/New_York").unwrap();
        for hour in 0..24 {
            for minute in [0, 17, 59] {
                let moment = Moment::new(2023, 8, 9, hour, minute);
                assert_eq!(codec.decode(codec.encode(&moment)).unwrap(), moment);
            }
        }
    }

    #[test]
    fn ambiguous_time_takes_earlier_instant() {
        let codec = TemporalCodec::default();
        // 02:30 happens twice on 2024-10-27; the first is CEST (00:30 UTC).
        let ts = codec.encode(&Moment::new(2024, 10, 27, 2, 30));
        assert_eq!(ts, 1_729_989_000);
    }

    #[test]
    fn gap_time_uses_offset_before_gap() {
        let codec = TemporalCodec::default();
        // 02:30 does not exist on 2024-03-31; read as CET it is 01:30 UTC,
        // which is 03:30 CEST.
        let ts = codec.encode(&Moment::new(2024, 3, 31, 2, 30));
        assert_eq!(codec.decode(ts).unwrap(), Moment::new(2024, 3, 31, 3, 30));
    }

    #[test]
    fn out_of_range_fields_carry_over() {
        let codec = TemporalCodec::default();
        assert_eq!(
            codec.encode(&Moment::new(2023, 13, 1, 0, 0)),
            codec.encode(&Moment::new(2024, 1, 1, 0, 0))
        );
        assert_eq!(
            codec.encode(&Moment::new(2024, 2, 13, 8, 60)),
            codec.encode(&Moment::new(2024, 2, 13, 9, 0))
        );
        assert_eq!(
            codec.encode(&Moment::new(2024, 2, 30, 0, 0)),
            codec.encode(&Moment::new(2024, 3, 1, 0, 0))
        );
        assert!(!Moment::new(2024, 2, 30, 0, 0).is_valid());
    }

    #[test]
    fn decode_rejects_unrepresentable_timestamps() {
        let codec = TemporalCodec::default();
        assert_eq!(
            codec.decode(i64::MAX),
            Err(CodecError::TimestampOutOfRange { timestamp: i64::MAX })
        );
    }

    #[test]
    fn extreme_moments_encode_without_panicking() {
        let codec = TemporalCodec::default();
        let extremes = [
            Moment::new(-300_000, 1, 1, 0, 0),
            Moment::new(300_000, 12, 31, 23, 59),
            Moment::new(i32::MIN, i32::MIN, i32::MIN, i32::MIN, i32::MIN),
            Moment::new(i32::MAX, i32::MAX, i32::MAX, i32::MAX, i32::MAX),
        ];
        for moment in extremes {
            // Decoding may legitimately fail; encoding must not.
            let _ = codec.decode(codec.encode(&moment));
        }
        assert!(
            codec.encode(&Moment::new(-300_000, 1, 1, 0, 0))
                < codec.encode(&Moment::new(1, 1, 1, 0, 0))
        );
    }

    #[test]
    fn moment_serde_shape() {
        let json = serde_json::to_string(&Moment::new(2024, 2, 13, 9, 0)).unwrap();
        assert_eq!(
            json,
            r#"{"__type__":"DateTime","year":2024,"month":2,"day":13,"hour":9,"minute":0}"#
        );
    }

    #[test]
    fn moment_canonical_form() {
        assert_eq!(
            Moment::new(2024, 2, 13, 9, 0).canonical_form(),
            "{{DateTime} 2024 2 13 9 0}"
        );
    }
}
