//! Wayback timestamp handling.
//!
//! The archive addresses every capture with a `YYYYMMDDhhmmss` UTC timestamp. Query
//! bounds (`from`, `to`, `closest`) may be any prefix of that form, 1 to 14 digits.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};

use crate::{Error, Result};

/// Length of a full Wayback timestamp.
pub const TIMESTAMP_LEN: usize = 14;

/// Parse a full 14-digit Wayback timestamp into a UTC datetime.
///
/// ```rust
/// use wayback_core::timestamp::parse_wayback_timestamp;
///
/// let ts = parse_wayback_timestamp("20201126185327")?;
/// assert_eq!(ts.to_rfc3339(), "2020-11-26T18:53:27+00:00");
/// # Ok::<(), wayback_core::Error>(())
/// ```
pub fn parse_wayback_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if value.len() != TIMESTAMP_LEN || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidTimestamp(value.to_string()));
    }

    let field = |range: std::ops::Range<usize>| -> Result<u32> {
        value[range]
            .parse::<u32>()
            .map_err(|_| Error::InvalidTimestamp(value.to_string()))
    };

    let year = i32::try_from(field(0..4)?).map_err(|_| Error::InvalidTimestamp(value.to_string()))?;
    let (month, day) = (field(4..6)?, field(6..8)?);
    let (hour, minute, second) = (field(8..10)?, field(10..12)?, field(12..14)?);

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| Error::InvalidTimestamp(value.to_string()))
}

/// Format a datetime as a full 14-digit Wayback timestamp.
pub fn to_wayback_timestamp(datetime: &DateTime<Utc>) -> String {
    datetime.format("%Y%m%d%H%M%S").to_string()
}

/// Validate a user-supplied timestamp bound (1 to 14 digits).
pub(crate) fn validate_bound(value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty()
        || value.len() > TIMESTAMP_LEN
        || !value.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(Error::InvalidTimestamp(value.to_string()));
    }
    Ok(value.to_string())
}

/// Anchor for closest-capture lookups.
///
/// Any part left unset is taken from the clock at resolution time, so
/// `NearTime::default().year(2015)` means "this month, day, hour and minute, in
/// 2015". A unix timestamp, when set, wins over the calendar parts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NearTime {
    /// Calendar year.
    pub year: Option<i32>,
    /// Month, 1-12.
    pub month: Option<u32>,
    /// Day of month, 1-31.
    pub day: Option<u32>,
    /// Hour, 0-23.
    pub hour: Option<u32>,
    /// Minute, 0-59.
    pub minute: Option<u32>,
    /// Seconds since the unix epoch.
    pub unix_timestamp: Option<i64>,
}

impl NearTime {
    /// Anchor at an absolute unix timestamp.
    #[must_use]
    pub const fn at_unix(seconds: i64) -> Self {
        Self {
            year: None,
            month: None,
            day: None,
            hour: None,
            minute: None,
            unix_timestamp: Some(seconds),
        }
    }

    /// Set the year.
    #[must_use]
    pub const fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    /// Set the month.
    #[must_use]
    pub const fn month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    /// Set the day of month.
    #[must_use]
    pub const fn day(mut self, day: u32) -> Self {
        self.day = Some(day);
        self
    }

    /// Set the hour.
    #[must_use]
    pub const fn hour(mut self, hour: u32) -> Self {
        self.hour = Some(hour);
        self
    }

    /// Set the minute.
    #[must_use]
    pub const fn minute(mut self, minute: u32) -> Self {
        self.minute = Some(minute);
        self
    }

    /// Resolve into a 12-digit `YYYYMMDDhhmm` anchor, filling gaps from `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<String> {
        if let Some(seconds) = self.unix_timestamp {
            let datetime = Utc
                .timestamp_opt(seconds, 0)
                .single()
                .ok_or_else(|| Error::InvalidTimestamp(seconds.to_string()))?;
            return Ok(datetime.format("%Y%m%d%H%M").to_string());
        }

        let year = self.year.unwrap_or_else(|| now.year());
        let month = self.month.unwrap_or_else(|| now.month());
        let day = self.day.unwrap_or_else(|| now.day());
        let hour = self.hour.unwrap_or_else(|| now.hour());
        let minute = self.minute.unwrap_or_else(|| now.minute());

        let datetime = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .ok_or_else(|| {
                Error::InvalidTimestamp(format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}"))
            })?;

        Ok(datetime.format("%Y%m%d%H%M").to_string())
    }
}
