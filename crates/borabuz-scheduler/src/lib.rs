//! # BoraBuz Scheduler
//!
//! Durable alert scheduling and background delivery for shuttle departures.
//!
//! ## Architecture
//! ```text
//! ForegroundBridge (permission gate)
//!   ├── AlertStore.save(config)          ── SQLite: alert_configs
//!   └── RuntimeMessage ──(mpsc)──▶ DeliveryRuntime
//!                                    ├── NotificationScheduler
//!                                    │     └── expand(HH:MM ± offset) ── SQLite: scheduled_notifications
//!                                    └── scan every 30s / on message
//!                                          ├── compose (Linha/Ponto message)
//!                                          ├── NotificationPlatform.show
//!                                          └── mark processed (at-least-once)
//! ```
//!
//! Both contexts open their own connection to the same database file; the
//! channel is the only shared state.

pub mod bridge;
pub mod dispatch;
pub mod engine;
pub mod notify;
pub mod persistence;
pub mod records;
pub mod recurrence;
pub mod runtime;
pub mod store;

pub use bridge::ForegroundBridge;
pub use dispatch::{
    ConsolePlatform, MemoryPlatform, NotificationPlatform, WebhookPlatform, create_platform,
};
pub use engine::{NotificationScheduler, TimerRegistry};
pub use notify::Notification;
pub use persistence::{AlertDb, DeliveryLogEntry};
pub use records::ScheduledNotification;
pub use recurrence::{OffsetKind, RecurringTime};
pub use runtime::{
    DeliveryRuntime, RuntimeHandle, RuntimeMessage, RuntimeOptions, RuntimeState, ScanReport,
};
pub use store::AlertStore;
