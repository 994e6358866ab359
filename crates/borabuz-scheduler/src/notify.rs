//! Notification content: what the user actually sees when a record fires.
//! Rendered from the record's config snapshot plus the read-only dataset.

use borabuz_core::alert::{AlertConfig, Direction, ItemType};
use borabuz_core::config::Locale;
use borabuz_core::dataset::LineDirectory;
use serde::{Deserialize, Serialize};

use crate::recurrence::{OffsetKind, RecurringTime};
use crate::records::ScheduledNotification;

/// Prefix platforms put in front of every title.
pub const TITLE_PREFIX: &str = "🚌 ";

/// Tag shared by all test notifications, so a new one replaces the last.
pub const TEST_TAG: &str = "borabuz-test";

/// A notification ready to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Platforms collapse notifications sharing a tag.
    pub tag: String,
    /// Queue record id, or `test`.
    pub source: String,
    pub require_interaction: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Notification {
    /// Title with the bus prefix, as shown to the user.
    pub fn display_title(&self) -> String {
        format!("{TITLE_PREFIX}{}", self.title)
    }
}

/// Build the notification for a due record.
pub fn compose(
    record: &ScheduledNotification,
    directory: &LineDirectory,
    locale: Locale,
) -> Notification {
    let config = &record.config_snapshot;
    let (title, body) = message_for(
        config,
        record.recurring_time,
        record.offset_kind,
        record.offset_value,
        directory,
        locale,
    );
    Notification {
        title,
        body,
        tag: format!(
            "borabuz-{}-{}-{}",
            config.item_type, config.item_id, record.recurring_time
        ),
        source: record.id.clone(),
        require_interaction: true,
        timestamp: chrono::Utc::now(),
    }
}

/// Ad-hoc notification that never touches the queue.
pub fn test_notification(title: &str, body: &str) -> Notification {
    Notification {
        title: title.to_string(),
        body: body.to_string(),
        tag: TEST_TAG.to_string(),
        source: "test".to_string(),
        require_interaction: false,
        timestamp: chrono::Utc::now(),
    }
}

/// Title and body for one firing of `config`.
pub fn message_for(
    config: &AlertConfig,
    time: RecurringTime,
    kind: OffsetKind,
    minutes: u32,
    directory: &LineDirectory,
    locale: Locale,
) -> (String, String) {
    match config.item_type {
        ItemType::Line => {
            let title = match locale {
                Locale::PtBr => format!("Linha {}", config.item_name),
                Locale::En => format!("Line {}", config.item_name),
            };
            (title, line_body(time, kind, minutes, locale))
        }
        ItemType::Stop => {
            let title = match locale {
                Locale::PtBr => format!("Ponto {}", config.item_name),
                Locale::En => format!("Stop {}", config.item_name),
            };
            (title, stop_body(config, time, kind, minutes, directory, locale))
        }
    }
}

fn line_body(time: RecurringTime, kind: OffsetKind, minutes: u32, locale: Locale) -> String {
    match (locale, kind, minutes) {
        (Locale::PtBr, OffsetKind::Advance, 0) => format!("Saída agora às {time}"),
        (Locale::PtBr, OffsetKind::Advance, n) => format!("Saída em {n} minutos ({time})"),
        (Locale::PtBr, OffsetKind::After, n) => format!("Saída iniciada há {n} minutos ({time})"),
        (Locale::En, OffsetKind::Advance, 0) => format!("Departing now at {time}"),
        (Locale::En, OffsetKind::Advance, n) => format!("Departing in {n} minutes ({time})"),
        (Locale::En, OffsetKind::After, n) => format!("Departure started {n} minutes ago ({time})"),
    }
}

fn direction_label(direction: Direction, locale: Locale) -> &'static str {
    match (locale, direction) {
        (Locale::PtBr, Direction::Outbound) => "Ida",
        (Locale::PtBr, Direction::Inbound) => "Volta",
        (Locale::En, Direction::Outbound) => "Outbound",
        (Locale::En, Direction::Inbound) => "Inbound",
    }
}

/// One entry per line serving the stop and per selected direction it passes
/// in, line by line. Unknown stops yield no entries.
fn stop_body(
    config: &AlertConfig,
    time: RecurringTime,
    kind: OffsetKind,
    minutes: u32,
    directory: &LineDirectory,
    locale: Locale,
) -> String {
    let directions = config.effective_stop_directions();
    let mut entries = Vec::new();

    for line in directory.lines_through(&config.item_id) {
        for direction in &directions {
            if !line.passes_through(*direction, &config.item_id) {
                continue;
            }
            let stops = line
                .stops_until(&config.item_id, Some(*direction))
                .unwrap_or(0);
            let label = direction_label(*direction, locale);
            let entry = match (locale, kind) {
                (Locale::PtBr, OffsetKind::After) => format!(
                    "{} ({label}) iniciou há {minutes}min - {stops} paradas até você.",
                    line.name
                ),
                (Locale::PtBr, OffsetKind::Advance) => {
                    format!("{} ({label}) - {stops} paradas até você.", line.name)
                }
                (Locale::En, OffsetKind::After) => format!(
                    "{} ({label}) started {minutes}min ago - {stops} stops to you.",
                    line.name
                ),
                (Locale::En, OffsetKind::Advance) => {
                    format!("{} ({label}) - {stops} stops to you.", line.name)
                }
            };
            entries.push(entry);
        }
    }

    if entries.is_empty() {
        match locale {
            Locale::PtBr => format!("Horário: {time}"),
            Locale::En => format!("Time: {time}"),
        }
    } else {
        entries.join(" ")
    }
}
