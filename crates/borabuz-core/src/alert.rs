//! Alert configuration: what the user asked to be notified about.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BoraBuzError;

/// Kind of item an alert is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Line,
    Stop,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Line => "line",
            ItemType::Stop => "stop",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = BoraBuzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "line" | "linha" => Ok(ItemType::Line),
            "stop" | "ponto" => Ok(ItemType::Stop),
            other => Err(BoraBuzError::Config(format!("unknown item type '{other}'"))),
        }
    }
}

/// Route direction. Serialized with the dataset's terms (`ida` / `volta`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "ida", alias = "outbound")]
    Outbound,
    #[serde(rename = "volta", alias = "inbound")]
    Inbound,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Outbound, Direction::Inbound];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Outbound => "ida",
            Direction::Inbound => "volta",
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Outbound => Direction::Inbound,
            Direction::Inbound => Direction::Outbound,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = BoraBuzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ida" | "outbound" => Ok(Direction::Outbound),
            "volta" | "inbound" => Ok(Direction::Inbound),
            other => Err(BoraBuzError::Config(format!("unknown direction '{other}'"))),
        }
    }
}

/// Notification permission as held by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Undetermined: the user has not been asked yet.
    #[default]
    Default,
    Granted,
    Denied,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Default => "default",
            Permission::Granted => "granted",
            Permission::Denied => "denied",
        }
    }

    pub fn is_granted(&self) -> bool {
        *self == Permission::Granted
    }
}

impl FromStr for Permission {
    type Err = BoraBuzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Permission::Default),
            "granted" => Ok(Permission::Granted),
            "denied" => Ok(Permission::Denied),
            other => Err(BoraBuzError::Config(format!("unknown permission '{other}'"))),
        }
    }
}

/// Alert configuration for one (item type, item id, optional direction).
///
/// Saved wholesale: every save overwrites the previous configuration for the
/// same key. The JSON shape is the persisted layout shared by both execution
/// contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertConfig {
    /// Deterministic key, see [`AlertConfig::config_id`].
    pub id: String,
    pub item_type: ItemType,
    /// Foreign key into the dataset. Not validated.
    pub item_id: String,
    /// Display name captured when the alert was configured.
    pub item_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    pub enabled: bool,
    /// Minutes before each recurring time.
    #[serde(default)]
    pub advance_times: Vec<u32>,
    /// Minutes after each recurring time.
    #[serde(default)]
    pub after_departure_times: Vec<u32>,
    /// `HH:MM` anchors taken from the item's published schedule.
    #[serde(default)]
    pub recurring_times: Vec<String>,
    /// Stop alerts only: which directions to summarize in the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_directions: Option<Vec<Direction>>,
}

impl AlertConfig {
    /// New enabled config notifying at departure time (advance 0) with no
    /// recurring times selected yet.
    pub fn new(
        item_type: ItemType,
        item_id: &str,
        item_name: &str,
        direction: Option<Direction>,
    ) -> Self {
        Self {
            id: Self::config_id(item_type, item_id, direction),
            item_type,
            item_id: item_id.to_string(),
            item_name: item_name.to_string(),
            direction,
            enabled: true,
            advance_times: vec![0],
            after_departure_times: Vec::new(),
            recurring_times: Vec::new(),
            stop_directions: None,
        }
    }

    /// `borabuz-alert-{type}-{id}[-{direction}]`
    pub fn config_id(item_type: ItemType, item_id: &str, direction: Option<Direction>) -> String {
        match direction {
            Some(d) => format!("borabuz-alert-{item_type}-{item_id}-{d}"),
            None => format!("borabuz-alert-{item_type}-{item_id}"),
        }
    }

    /// Identity of the item/direction pair used to key queued records:
    /// `{type}-{id}` or `{type}-{id}:{direction}`.
    pub fn item_key(&self) -> String {
        match self.direction {
            Some(d) => format!("{}-{}:{}", self.item_type, self.item_id, d),
            None => format!("{}-{}", self.item_type, self.item_id),
        }
    }

    pub fn with_recurring_times<I, S>(mut self, times: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recurring_times = times.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_advance_times(mut self, minutes: impl IntoIterator<Item = u32>) -> Self {
        self.advance_times = minutes.into_iter().collect();
        self
    }

    pub fn with_after_departure_times(mut self, minutes: impl IntoIterator<Item = u32>) -> Self {
        self.after_departure_times = minutes.into_iter().collect();
        self
    }

    pub fn with_stop_directions(mut self, directions: impl IntoIterator<Item = Direction>) -> Self {
        self.stop_directions = Some(directions.into_iter().collect());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Sort and deduplicate every set-valued field and recompute `id`.
    pub fn normalize(&mut self) {
        self.id = Self::config_id(self.item_type, &self.item_id, self.direction);
        self.advance_times.sort_unstable();
        self.advance_times.dedup();
        self.after_departure_times.sort_unstable();
        self.after_departure_times.dedup();
        for t in self.recurring_times.iter_mut() {
            *t = canonical_time(t).unwrap_or_else(|| t.trim().to_string());
        }
        self.recurring_times.sort();
        self.recurring_times.dedup();
        if let Some(dirs) = self.stop_directions.as_mut() {
            dirs.sort();
            dirs.dedup();
        }
    }

    /// Directions summarized in a stop message. Empty or absent filter means both.
    pub fn effective_stop_directions(&self) -> Vec<Direction> {
        match &self.stop_directions {
            Some(dirs) if !dirs.is_empty() => Direction::BOTH
                .into_iter()
                .filter(|d| dirs.contains(d))
                .collect(),
            _ => Direction::BOTH.to_vec(),
        }
    }
}

/// `H:MM` / `HH:MM` rendered as `HH:MM`. `None` for anything malformed, which
/// is left as written so scheduling rejects it.
fn canonical_time(s: &str) -> Option<String> {
    let (h, m) = s.trim().split_once(':')?;
    let numeric = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !numeric(h) || !numeric(m) {
        return None;
    }
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    (hour <= 23 && minute <= 59).then(|| format!("{hour:02}:{minute:02}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_ids() {
        assert_eq!(
            AlertConfig::config_id(ItemType::Line, "b1", None),
            "borabuz-alert-line-b1"
        );
        assert_eq!(
            AlertConfig::config_id(ItemType::Line, "b1", Some(Direction::Inbound)),
            "borabuz-alert-line-b1-volta"
        );
        let cfg = AlertConfig::new(ItemType::Stop, "ics", "ICS", Some(Direction::Outbound));
        assert_eq!(cfg.item_key(), "stop-ics:ida");
    }

    #[test]
    fn test_json_layout_is_camel_case() {
        let cfg = AlertConfig::new(ItemType::Stop, "ics", "ICS", None)
            .with_recurring_times(["07:10"])
            .with_after_departure_times([5])
            .with_stop_directions([Direction::Inbound]);
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["itemType"], "stop");
        assert_eq!(json["afterDepartureTimes"][0], 5);
        assert_eq!(json["stopDirections"][0], "volta");
        assert!(json.get("direction").is_none());

        let back: AlertConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_direction_aliases() {
        let d: Direction = serde_json::from_str("\"outbound\"").unwrap();
        assert_eq!(d, Direction::Outbound);
        assert_eq!("volta".parse::<Direction>().unwrap(), Direction::Inbound);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_normalize_dedups_sets() {
        let mut cfg = AlertConfig::new(ItemType::Line, "b2", "B2", None)
            .with_advance_times([10, 0, 10])
            .with_recurring_times(["08:20", " 07:10", "08:20"]);
        cfg.id = "stale".into();
        cfg.normalize();
        assert_eq!(cfg.advance_times, vec![0, 10]);
        assert_eq!(cfg.recurring_times, vec!["07:10", "08:20"]);
        assert_eq!(cfg.id, "borabuz-alert-line-b2");
    }

    #[test]
    fn test_normalize_canonicalizes_times() {
        let mut cfg = AlertConfig::new(ItemType::Line, "b1", "B1", None)
            .with_recurring_times(["7:10", "07:10", "7:5", "25:00"]);
        cfg.normalize();
        assert_eq!(cfg.recurring_times, vec!["07:05", "07:10", "25:00"]);
    }

    #[test]
    fn test_effective_stop_directions() {
        let cfg = AlertConfig::new(ItemType::Stop, "ics", "ICS", None);
        assert_eq!(cfg.effective_stop_directions(), Direction::BOTH.to_vec());
        let cfg = cfg.with_stop_directions([Direction::Inbound, Direction::Outbound]);
        assert_eq!(
            cfg.effective_stop_directions(),
            vec![Direction::Outbound, Direction::Inbound]
        );
        let cfg = cfg.with_stop_directions([]);
        assert_eq!(cfg.effective_stop_directions().len(), 2);
    }
}
