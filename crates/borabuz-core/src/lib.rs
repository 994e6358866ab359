//! # BoraBuz Core
//!
//! Shared building blocks for the BoraBuz alert subsystem:
//! - [`alert`]: per-item alert configuration and notification permission
//! - [`dataset`]: read-only shuttle lines and stops (UFBA table built in)
//! - [`config`]: TOML configuration (`~/.borabuz/config.toml`)
//! - [`error`]: the error taxonomy every crate returns

pub mod alert;
pub mod config;
pub mod dataset;
pub mod error;

pub use alert::{AlertConfig, Direction, ItemType, Permission};
pub use config::{BoraBuzConfig, Locale};
pub use dataset::{Line, LineDirectory, Stop};
pub use error::{BoraBuzError, Result};
