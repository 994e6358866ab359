//! Notification scheduler: turns alert configs into queued records and
//! removes them again on cancel.
//!
//! The scheduler only creates and deletes records; the delivery runtime only
//! flips `processed` (and re-arms with update-only writes), so a cancel always
//! wins over a concurrent scan.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use borabuz_core::alert::{AlertConfig, Direction, ItemType};
use borabuz_core::error::{BoraBuzError, Result};
use chrono::{DateTime, Duration, Local, TimeZone};
use tokio::task::AbortHandle;

use crate::persistence::AlertDb;
use crate::recurrence::{self, OffsetKind, RecurringTime};
use crate::records::ScheduledNotification;

type TimerKey = (ItemType, String, Option<Direction>);

/// Best-effort in-process timers armed by the runtime, keyed by item and
/// direction so a cancel can abort them. Never the system of record.
#[derive(Default)]
pub struct TimerRegistry {
    handles: Mutex<HashMap<TimerKey, Vec<AbortHandle>>>,
}

impl TimerRegistry {
    fn handles(&self) -> MutexGuard<'_, HashMap<TimerKey, Vec<AbortHandle>>> {
        // A panicked holder cannot leave the map inconsistent.
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, config: &AlertConfig, handle: AbortHandle) {
        let mut handles = self.handles();
        let slot = handles
            .entry((config.item_type, config.item_id.clone(), config.direction))
            .or_default();
        slot.retain(|h| !h.is_finished());
        slot.push(handle);
    }

    /// Abort every timer of the item, all directions.
    pub fn abort_item(&self, item_type: ItemType, item_id: &str) -> usize {
        let mut handles = self.handles();
        let mut aborted = 0;
        handles.retain(|(ty, id, _), slot| {
            if *ty == item_type && id == item_id {
                aborted += abort_slot(slot);
                false
            } else {
                true
            }
        });
        aborted
    }

    pub fn abort_key(&self, item_type: ItemType, item_id: &str, direction: Option<Direction>) -> usize {
        self.handles()
            .remove(&(item_type, item_id.to_string(), direction))
            .map(|mut slot| abort_slot(&mut slot))
            .unwrap_or(0)
    }

    pub fn abort_all(&self) -> usize {
        self.handles().values_mut().map(abort_slot).sum()
    }

    /// Timers still waiting to fire.
    pub fn armed(&self) -> usize {
        self.handles()
            .values()
            .flatten()
            .filter(|h| !h.is_finished())
            .count()
    }
}

fn abort_slot(slot: &mut Vec<AbortHandle>) -> usize {
    let live = slot.iter().filter(|h| !h.is_finished()).count();
    for h in slot.drain(..) {
        h.abort();
    }
    live
}

/// Expands configs against the device clock and keeps the queue in step.
pub struct NotificationScheduler {
    db: Arc<AlertDb>,
    timers: TimerRegistry,
}

impl NotificationScheduler {
    pub fn new(db: Arc<AlertDb>) -> Self {
        Self {
            db,
            timers: TimerRegistry::default(),
        }
    }

    pub fn db(&self) -> &Arc<AlertDb> {
        &self.db
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// Replace the queued records of the config's item/direction with a fresh
    /// expansion from the current local time. Returns the number queued.
    pub fn schedule(&self, config: &AlertConfig) -> Result<usize> {
        self.schedule_at(config, &Local::now()).map(|records| records.len())
    }

    /// [`schedule`](Self::schedule) against an explicit clock.
    ///
    /// Nothing is written when permission is missing or a recurring time is
    /// malformed. A disabled config only purges.
    pub fn schedule_at<Tz: TimeZone>(
        &self,
        config: &AlertConfig,
        now: &DateTime<Tz>,
    ) -> Result<Vec<ScheduledNotification>> {
        let mut config = config.clone();
        config.normalize();

        if config.enabled && !self.db.permission()?.is_granted() {
            tracing::warn!("🔕 Not scheduling {}: notification permission not granted", config.id);
            return Err(BoraBuzError::PermissionDenied);
        }

        let records = if config.enabled {
            Self::build_records(&config, now)?
        } else {
            Vec::new()
        };

        self.timers
            .abort_key(config.item_type, &config.item_id, config.direction);
        let removed =
            self.db
                .replace_records(config.item_type, &config.item_id, config.direction, &records)?;

        if config.enabled {
            tracing::info!(
                "📅 Scheduled {} notification(s) for {} (replaced {removed})",
                records.len(),
                config.item_key()
            );
        } else {
            tracing::info!("🔕 Alerts disabled for {}: purged {removed} record(s)", config.item_key());
        }
        Ok(records)
    }

    /// One record per recurring time × advance value and per recurring time ×
    /// after value. Every recurring time is validated before any record is
    /// built. `expand` never returns an instant before the current minute.
    pub fn build_records<Tz: TimeZone>(
        config: &AlertConfig,
        now: &DateTime<Tz>,
    ) -> Result<Vec<ScheduledNotification>> {
        let times = config
            .recurring_times
            .iter()
            .map(|t| RecurringTime::parse(t))
            .collect::<Result<Vec<_>>>()?;

        let offsets = config
            .advance_times
            .iter()
            .map(|m| (OffsetKind::Advance, *m))
            .chain(config.after_departure_times.iter().map(|m| (OffsetKind::After, *m)));

        let mut records = Vec::new();
        for (kind, minutes) in offsets {
            for time in &times {
                let fire = recurrence::expand(*time, kind, minutes, now);
                records.push(ScheduledNotification::new(config, *time, kind, minutes, &fire));
            }
        }
        records.sort_by(|a, b| {
            a.scheduled_time_epoch_ms
                .cmp(&b.scheduled_time_epoch_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    /// Remove every queued record of the item, across all directions,
    /// recurring times and offsets.
    pub fn cancel(&self, item_type: ItemType, item_id: &str) -> Result<usize> {
        let aborted = self.timers.abort_item(item_type, item_id);
        let removed = self.db.delete_records_for_item(item_type, item_id)?;
        tracing::info!("🚫 Cancelled {removed} record(s) for {item_type} {item_id} ({aborted} timer(s) aborted)");
        Ok(removed)
    }

    /// Remove the records of one item/direction key only.
    pub fn cancel_direction(
        &self,
        item_type: ItemType,
        item_id: &str,
        direction: Option<Direction>,
    ) -> Result<usize> {
        self.timers.abort_key(item_type, item_id, direction);
        self.db.delete_records_for_key(item_type, item_id, direction)
    }

    /// Move a delivered record to its next occurrence, strictly after the
    /// instant it just fired. Returns the new fire time, or `None` when the
    /// record was cancelled in the meantime.
    pub fn rearm_at<Tz: TimeZone>(
        &self,
        record: &ScheduledNotification,
        now: &DateTime<Tz>,
    ) -> Result<Option<i64>> {
        let tz = now.timezone();
        let floor = record
            .scheduled_at()
            .map(|t| (t + Duration::minutes(1)).with_timezone(&tz))
            .filter(|t| t > now)
            .unwrap_or_else(|| now.clone());

        let next = recurrence::expand(
            record.recurring_time,
            record.offset_kind,
            record.offset_value,
            &floor,
        )
        .timestamp_millis();

        if self.db.rearm_record(&record.id, next)? {
            tracing::debug!("🔁 Re-armed {} for {next}", record.id);
            Ok(Some(next))
        } else {
            Ok(None)
        }
    }
}
