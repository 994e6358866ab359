//! Scheduled notification records: the rows of the durable queue.

use borabuz_core::alert::AlertConfig;
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::recurrence::{OffsetKind, RecurringTime};

/// One concrete firing of an alert.
///
/// The id is derived from the item/direction key, recurring time and offset,
/// so rescheduling the same configuration overwrites instead of duplicating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledNotification {
    pub id: String,
    /// Configuration as it was when the record was created. Message text is
    /// rendered from this, not from the live store.
    pub config_snapshot: AlertConfig,
    pub recurring_time: RecurringTime,
    pub offset_kind: OffsetKind,
    pub offset_value: u32,
    pub scheduled_time_epoch_ms: i64,
    pub processed: bool,
    #[serde(default)]
    pub processed_at_epoch_ms: Option<i64>,
}

impl ScheduledNotification {
    /// `{type}-{id}[:{direction}]-{HH:MM}-{advance|after}-{minutes}`
    pub fn record_id(
        config: &AlertConfig,
        time: RecurringTime,
        kind: OffsetKind,
        minutes: u32,
    ) -> String {
        format!("{}-{}-{}-{}", config.item_key(), time, kind, minutes)
    }

    pub fn new<Tz: TimeZone>(
        config: &AlertConfig,
        time: RecurringTime,
        kind: OffsetKind,
        minutes: u32,
        fire_at: &DateTime<Tz>,
    ) -> Self {
        Self {
            id: Self::record_id(config, time, kind, minutes),
            config_snapshot: config.clone(),
            recurring_time: time,
            offset_kind: kind,
            offset_value: minutes,
            scheduled_time_epoch_ms: fire_at.timestamp_millis(),
            processed: false,
            processed_at_epoch_ms: None,
        }
    }

    pub fn is_due(&self, now_ms: i64) -> bool {
        !self.processed && self.scheduled_time_epoch_ms <= now_ms
    }

    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.scheduled_time_epoch_ms)
    }

    /// Fire instant on the device clock, for display.
    pub fn scheduled_local(&self) -> Option<DateTime<Local>> {
        self.scheduled_at().map(|t| t.with_timezone(&Local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use borabuz_core::alert::{Direction, ItemType};
    use chrono::FixedOffset;

    #[test]
    fn test_record_identity() {
        let tz = FixedOffset::west_opt(3 * 3600).unwrap();
        let fire = tz.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap();
        let cfg = AlertConfig::new(ItemType::Line, "b1", "B1", None);
        let time = RecurringTime::parse("07:10").unwrap();

        let rec = ScheduledNotification::new(&cfg, time, OffsetKind::Advance, 10, &fire);
        assert_eq!(rec.id, "line-b1-07:10-advance-10");
        assert_eq!(rec.scheduled_at().unwrap(), fire.with_timezone(&Utc));
        assert!(rec.is_due(fire.timestamp_millis()));
        assert!(!rec.is_due(fire.timestamp_millis() - 1));

        let inbound = AlertConfig::new(ItemType::Line, "b1", "B1", Some(Direction::Inbound));
        let rec = ScheduledNotification::new(&inbound, time, OffsetKind::After, 5, &fire);
        assert_eq!(rec.id, "line-b1:volta-07:10-after-5");
    }
}
