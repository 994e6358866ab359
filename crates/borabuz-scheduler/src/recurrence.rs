//! Schedule expansion: daily `HH:MM` anchors plus minute offsets become
//! concrete fire instants.
//!
//! Minute-granular: `now` is truncated to the minute, and a candidate only
//! rolls to the next calendar day while it is strictly earlier than that. An
//! anchor equal to the current minute therefore fires immediately.

use std::fmt;
use std::str::FromStr;

use borabuz_core::error::{BoraBuzError, Result};
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A validated daily time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecurringTime {
    hour: u32,
    minute: u32,
}

impl RecurringTime {
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(BoraBuzError::MalformedSchedule(format!(
                "{hour:02}:{minute:02}"
            )));
        }
        Ok(Self { hour, minute })
    }

    /// Parse `HH:MM`. Anything else is a caller bug and fails fast.
    pub fn parse(s: &str) -> Result<Self> {
        let malformed = || BoraBuzError::MalformedSchedule(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(malformed)?;
        let numeric = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !numeric(h) || !numeric(m) {
            return Err(malformed());
        }
        let hour: u32 = h.parse().map_err(|_| malformed())?;
        let minute: u32 = m.parse().map_err(|_| malformed())?;
        Self::new(hour, minute).map_err(|_| malformed())
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    fn as_naive(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default()
    }
}

impl fmt::Display for RecurringTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for RecurringTime {
    type Err = BoraBuzError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for RecurringTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecurringTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Which side of the recurring time an offset sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetKind {
    /// Minutes before the recurring time. 0 means "at the recurring time".
    Advance,
    /// Minutes after the recurring time.
    After,
}

impl OffsetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetKind::Advance => "advance",
            OffsetKind::After => "after",
        }
    }

    fn signed_minutes(&self, minutes: u32) -> i64 {
        match self {
            OffsetKind::Advance => -i64::from(minutes),
            OffsetKind::After => i64::from(minutes),
        }
    }
}

impl fmt::Display for OffsetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OffsetKind {
    type Err = BoraBuzError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "advance" => Ok(OffsetKind::Advance),
            "after" => Ok(OffsetKind::After),
            other => Err(BoraBuzError::MalformedSchedule(format!(
                "unknown offset kind '{other}'"
            ))),
        }
    }
}

/// Next fire instant for `time` shifted by the offset, at or after `now`
/// (minute precision). Crossing midnight in either direction is allowed; the
/// result rolls forward whole calendar days at the same wall-clock time.
pub fn expand<Tz: TimeZone>(
    time: RecurringTime,
    kind: OffsetKind,
    offset_minutes: u32,
    now: &DateTime<Tz>,
) -> DateTime<Tz> {
    let tz = now.timezone();
    let floor = truncate_to_minute(now);
    let mut candidate = now.date_naive().and_time(time.as_naive())
        + Duration::minutes(kind.signed_minutes(offset_minutes));

    // Skip whole days at once; the loop only absorbs DST shifts.
    let behind = floor.naive_local() - candidate;
    if behind > Duration::zero() {
        candidate += Duration::days(behind.num_days());
    }

    loop {
        let resolved = resolve_local(&tz, candidate);
        if resolved >= floor {
            return resolved;
        }
        candidate += Duration::days(1);
    }
}

/// Drop seconds and sub-seconds.
pub fn truncate_to_minute<Tz: TimeZone>(t: &DateTime<Tz>) -> DateTime<Tz> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or_else(|| t.clone())
}

/// Map a wall-clock time to an instant. Ambiguous times take the earliest
/// mapping; times inside a DST gap move to the first valid minute after it.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    if let Some(t) = tz.from_local_datetime(&naive).earliest() {
        return t;
    }
    let mut probe = naive;
    for _ in 0..(24 * 60) {
        probe += Duration::minutes(1);
        if let Some(t) = tz.from_local_datetime(&probe).earliest() {
            return t;
        }
    }
    tz.from_utc_datetime(&naive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn salvador() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<FixedOffset> {
        salvador().with_ymd_and_hms(2026, 3, day, h, m, s).unwrap()
    }

    fn hm(s: &str) -> RecurringTime {
        RecurringTime::parse(s).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(hm("07:10").to_string(), "07:10");
        assert_eq!(hm("7:05").to_string(), "07:05");
        assert_eq!(hm(" 23:59 ").hour(), 23);
    }

    #[test]
    fn test_malformed_times_fail_fast() {
        for bad in ["", "0710", "7h10", "24:00", "07:60", "07:10:00", "-1:10", "07:", "aa:bb"] {
            match RecurringTime::parse(bad) {
                Err(BoraBuzError::MalformedSchedule(s)) => assert_eq!(s, bad),
                other => panic!("{bad:?} parsed as {other:?}"),
            }
        }
    }

    #[test]
    fn test_advance_same_day() {
        // B1 07:10, 10 minutes ahead, asked at 06:55
        let fire = expand(hm("07:10"), OffsetKind::Advance, 10, &at(2, 6, 55, 0));
        assert_eq!(fire, at(2, 7, 0, 0));
    }

    #[test]
    fn test_rollover_to_next_day() {
        let fire = expand(hm("07:00"), OffsetKind::Advance, 0, &at(2, 8, 0, 0));
        assert_eq!(fire, at(2, 7, 0, 0) + Duration::hours(24));
        assert_eq!(fire, at(3, 7, 0, 0));
    }

    #[test]
    fn test_zero_offset_at_current_minute_is_due_now() {
        let now = at(2, 8, 0, 42);
        let fire = expand(hm("08:00"), OffsetKind::Advance, 0, &now);
        assert_eq!(fire, truncate_to_minute(&now));
        assert!(fire <= now);
    }

    #[test]
    fn test_after_offset_crosses_midnight() {
        let fire = expand(hm("23:50"), OffsetKind::After, 20, &at(2, 8, 0, 0));
        assert_eq!(fire, at(3, 0, 10, 0));
    }

    #[test]
    fn test_advance_offset_crosses_midnight_backwards() {
        // 00:05 minus 10 minutes lands on 23:55 of the previous evening.
        let fire = expand(hm("00:05"), OffsetKind::Advance, 10, &at(2, 10, 0, 0));
        assert_eq!(fire, at(2, 23, 55, 0));

        // Already past tonight's 23:55: roll again.
        let fire = expand(hm("00:05"), OffsetKind::Advance, 10, &at(2, 23, 58, 0));
        assert_eq!(fire, at(3, 23, 55, 0));
    }

    #[test]
    fn test_after_offset_same_day() {
        let fire = expand(hm("07:10"), OffsetKind::After, 5, &at(2, 7, 12, 0));
        assert_eq!(fire, at(2, 7, 15, 0));
    }

    #[test]
    fn test_offset_kind_serde() {
        assert_eq!(serde_json::to_string(&OffsetKind::After).unwrap(), "\"after\"");
        assert_eq!("advance".parse::<OffsetKind>().unwrap(), OffsetKind::Advance);
        let t: RecurringTime = serde_json::from_str("\"06:10\"").unwrap();
        assert_eq!(t, hm("06:10"));
        assert!(serde_json::from_str::<RecurringTime>("\"6h\"").is_err());
        assert!(matches!(
            "before".parse::<OffsetKind>(),
            Err(BoraBuzError::MalformedSchedule(_))
        ));
    }

    #[test]
    fn test_huge_offset_lands_within_next_day() {
        let now = at(2, 9, 30, 0);
        let fire = expand(hm("07:10"), OffsetKind::Advance, u32::MAX, &now);
        assert!(fire >= now);
        assert!(fire < now + Duration::days(1));
        assert_eq!(fire.second(), 0);

        let fire = expand(hm("07:10"), OffsetKind::After, u32::MAX, &now);
        assert!(fire >= now);
        assert!(fire - now > Duration::days(365));
    }
}
