//! BoraBuz configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::alert::Permission;
use crate::dataset::LineDirectory;
use crate::error::{BoraBuzError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoraBuzConfig {
    /// Directory holding the alert database. `~` is expanded.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
}

fn default_data_dir() -> String { "~/.borabuz".into() }

impl Default for BoraBuzConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            scheduler: SchedulerConfig::default(),
            notifications: NotificationsConfig::default(),
            dataset: DatasetConfig::default(),
        }
    }
}

impl BoraBuzConfig {
    /// Load config from the default path (~/.borabuz/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BoraBuzError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| BoraBuzError::Config(format!("Failed to parse config: {e}")))
    }

    /// Save config to the given path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| BoraBuzError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the BoraBuz home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".borabuz")
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).to_string())
    }

    /// SQLite file shared by the foreground bridge and the delivery runtime.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("borabuz.db")
    }

    /// The configured dataset, or the built-in table.
    pub fn load_directory(&self) -> Result<LineDirectory> {
        match &self.dataset.path {
            Some(p) => {
                let path = PathBuf::from(shellexpand::tilde(p).to_string());
                LineDirectory::from_path(&path)
            }
            None => Ok(LineDirectory::builtin()),
        }
    }
}

/// Delivery runtime and scheduler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between queue scans.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Delay before the extra scan that follows every scheduling message.
    #[serde(default = "default_rescan_delay")]
    pub rescan_delay_ms: u64,
    /// Processed records older than this are deleted. 0 keeps them forever.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    /// Re-queue each delivered record for the next day.
    #[serde(default)]
    pub daily_rearm: bool,
    /// Arm in-process timers for records due before the next scan.
    #[serde(default = "bool_true")]
    pub fast_timers: bool,
}

fn bool_true() -> bool { true }
fn default_poll_interval() -> u64 { 30 }
fn default_rescan_delay() -> u64 { 1000 }
fn default_retention_hours() -> u64 { 48 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            rescan_delay_ms: default_rescan_delay(),
            retention_hours: default_retention_hours(),
            daily_rearm: false,
            fast_timers: true,
        }
    }
}

/// Where notifications are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// Print to the terminal.
    Console,
    /// POST a JSON payload to `webhook_url`.
    Webhook,
}

/// Language of notification titles and bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "pt-BR", alias = "pt")]
    PtBr,
    #[serde(rename = "en")]
    En,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_platform")]
    pub platform: PlatformKind,
    #[serde(default)]
    pub webhook_url: String,
    /// Answer given when the platform prompts for permission.
    #[serde(default = "default_prompt_answer")]
    pub prompt_answer: Permission,
    #[serde(default)]
    pub locale: Locale,
}

fn default_platform() -> PlatformKind { PlatformKind::Console }
fn default_prompt_answer() -> Permission { Permission::Granted }

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            webhook_url: String::new(),
            prompt_answer: default_prompt_answer(),
            locale: Locale::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// JSON dataset replacing the built-in table.
    #[serde(default)]
    pub path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = BoraBuzConfig::from_toml("").unwrap();
        assert_eq!(config.scheduler.poll_interval_secs, 30);
        assert_eq!(config.scheduler.retention_hours, 48);
        assert!(!config.scheduler.daily_rearm);
        assert_eq!(config.notifications.platform, PlatformKind::Console);
        assert_eq!(config.notifications.locale, Locale::PtBr);
        assert!(config.db_path().ends_with("borabuz.db"));
    }

    #[test]
    fn test_partial_sections() {
        let config = BoraBuzConfig::from_toml(
            r#"
            data_dir = "/tmp/borabuz-test"
            [scheduler]
            poll_interval_secs = 5
            daily_rearm = true
            [notifications]
            platform = "webhook"
            webhook_url = "http://localhost:9000/hook"
            prompt_answer = "denied"
            locale = "en"
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.poll_interval_secs, 5);
        assert_eq!(config.scheduler.rescan_delay_ms, 1000);
        assert!(config.scheduler.daily_rearm);
        assert_eq!(config.notifications.platform, PlatformKind::Webhook);
        assert_eq!(config.notifications.prompt_answer, Permission::Denied);
        assert_eq!(config.notifications.locale, Locale::En);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/borabuz-test/borabuz.db"));
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        let mut config = BoraBuzConfig::default();
        config.scheduler.retention_hours = 12;
        config.save_to(&path).unwrap();
        let loaded = BoraBuzConfig::load_from(&path).unwrap();
        assert_eq!(loaded.scheduler.retention_hours, 12);
        assert!(BoraBuzConfig::from_toml("scheduler = 3").is_err());
    }

    #[test]
    fn test_missing_dataset_file_is_an_error() {
        let mut config = BoraBuzConfig::default();
        assert_eq!(config.load_directory().unwrap().lines.len(), 5);
        config.dataset.path = Some("/definitely/not/here.json".into());
        assert!(config.load_directory().is_err());
    }
}
