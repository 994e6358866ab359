//! Background delivery runtime: the execution context that fires queued
//! notifications independently of any foreground caller.
//!
//! ```text
//! RuntimeMessage (mpsc) ──▶ handle ──▶ NotificationScheduler ──▶ queue
//!                                         │
//! interval / rescan / fast timer ──▶ scan ┴─▶ compose ──▶ platform.show
//!                                              └─▶ mark processed (+ re-arm)
//! ```
//!
//! The queue is re-read on every scan, so nothing the runtime holds in memory
//! is ever needed for correctness.

use std::sync::Arc;
use std::time::Duration;

use borabuz_core::alert::{AlertConfig, ItemType};
use borabuz_core::config::{BoraBuzConfig, Locale};
use borabuz_core::dataset::LineDirectory;
use borabuz_core::error::{BoraBuzError, Result};
use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::dispatch::NotificationPlatform;
use crate::engine::NotificationScheduler;
use crate::notify::{self, Notification};
use crate::persistence::AlertDb;
use crate::records::ScheduledNotification;

/// Envelope sent from the foreground to the runtime. Fire-and-forget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum RuntimeMessage {
    Schedule(AlertConfig),
    Cancel { item_type: ItemType, item_id: String },
    SendTest { title: String, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeState {
    /// Spawned but not yet woken by a message or `activate`.
    Dormant,
    /// Waiting for the next scan.
    Polling,
    /// Rendering due records.
    Delivering,
}

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub poll_interval: Duration,
    /// Delay before the extra scan after a message is applied.
    pub rescan_delay: Duration,
    /// Processed records older than this are deleted on each scan.
    pub retention: Option<chrono::Duration>,
    pub daily_rearm: bool,
    pub fast_timers: bool,
    pub locale: Locale,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self::from(&BoraBuzConfig::default())
    }
}

impl From<&BoraBuzConfig> for RuntimeOptions {
    fn from(config: &BoraBuzConfig) -> Self {
        let s = &config.scheduler;
        Self {
            poll_interval: Duration::from_secs(s.poll_interval_secs.max(1)),
            rescan_delay: Duration::from_millis(s.rescan_delay_ms),
            retention: retention_window(s.retention_hours),
            daily_rearm: s.daily_rearm,
            fast_timers: s.fast_timers,
            locale: config.notifications.locale,
        }
    }
}

/// `None` disables purging: zero hours, or a window too large to represent.
fn retention_window(hours: u64) -> Option<chrono::Duration> {
    if hours == 0 {
        return None;
    }
    let window = i64::try_from(hours)
        .ok()
        .and_then(chrono::Duration::try_hours);
    if window.is_none() {
        tracing::warn!("⚠️ retention_hours = {hours} is out of range; processed records are kept");
    }
    window
}

/// Outcome of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub delivered: usize,
    /// Rendered with an error; still marked processed.
    pub failed: usize,
    pub purged: usize,
    pub rearmed: usize,
    pub timers_armed: usize,
}

pub struct DeliveryRuntime {
    scheduler: Arc<NotificationScheduler>,
    platform: Arc<dyn NotificationPlatform>,
    directory: Arc<LineDirectory>,
    options: RuntimeOptions,
    state: watch::Sender<RuntimeState>,
    scan_signal: Arc<Notify>,
}

impl DeliveryRuntime {
    /// `db` should be this context's own connection to the shared store.
    pub fn new(
        db: Arc<AlertDb>,
        platform: Arc<dyn NotificationPlatform>,
        directory: Arc<LineDirectory>,
        options: RuntimeOptions,
    ) -> Self {
        let (state, _) = watch::channel(RuntimeState::Dormant);
        Self {
            scheduler: Arc::new(NotificationScheduler::new(db)),
            platform,
            directory,
            options,
            state,
            scan_signal: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> RuntimeState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RuntimeState> {
        self.state.subscribe()
    }

    pub fn scheduler(&self) -> &Arc<NotificationScheduler> {
        &self.scheduler
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Leave `Dormant`. No-op otherwise.
    pub fn activate(&self) {
        self.state.send_if_modified(|s| {
            if *s == RuntimeState::Dormant {
                tracing::debug!("⏰ Delivery runtime activated");
                *s = RuntimeState::Polling;
                true
            } else {
                false
            }
        });
    }

    /// Deliver everything due on the local clock.
    pub async fn scan(&self) -> Result<ScanReport> {
        self.scan_at(&Local::now()).await
    }

    /// Deliver every unprocessed record due at `now`, earliest first, then
    /// purge old processed records and arm timers for the next interval.
    pub async fn scan_at<Tz>(&self, now: &DateTime<Tz>) -> Result<ScanReport>
    where
        Tz: TimeZone + Send + Sync,
        Tz::Offset: Send + Sync,
    {
        self.state.send_replace(RuntimeState::Delivering);
        let result = self.scan_inner(now).await;
        self.state.send_replace(RuntimeState::Polling);
        result
    }

    async fn scan_inner<Tz>(&self, now: &DateTime<Tz>) -> Result<ScanReport>
    where
        Tz: TimeZone + Send + Sync,
        Tz::Offset: Send + Sync,
    {
        let now_ms = now.timestamp_millis();
        let mut report = ScanReport::default();

        for record in self.due_records(now_ms)? {
            match self.deliver(&record).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!("⚠️ Delivery of {} failed: {e}", record.id);
                    report.failed += 1;
                }
            }
            if self.commit(&record, now)? {
                report.rearmed += 1;
            }
        }

        if let Some(retention) = self.options.retention {
            let cutoff = now_ms.saturating_sub(retention.num_milliseconds());
            report.purged = self.scheduler.db().purge_processed_before(cutoff)?;
            if report.purged > 0 {
                tracing::debug!("🧹 Purged {} processed record(s)", report.purged);
            }
        }

        if self.options.fast_timers {
            report.timers_armed = self.arm_timers(now_ms)?;
        }
        Ok(report)
    }

    /// Unprocessed records due at `now_ms`, in delivery order.
    pub fn due_records(&self, now_ms: i64) -> Result<Vec<ScheduledNotification>> {
        self.scheduler.db().due_records(now_ms)
    }

    /// Render one record and log the attempt. Does not mark it processed.
    pub async fn deliver(&self, record: &ScheduledNotification) -> Result<()> {
        let notification = notify::compose(record, &self.directory, self.options.locale);
        self.show_logged(Some(&record.id), &notification).await
    }

    /// Mark a delivered record processed and, with daily re-arm on, queue its
    /// next occurrence. Returns whether it was re-armed. A record cancelled
    /// since the scan read it is left alone.
    pub fn commit<Tz: TimeZone>(
        &self,
        record: &ScheduledNotification,
        now: &DateTime<Tz>,
    ) -> Result<bool> {
        if !self
            .scheduler
            .db()
            .mark_processed(&record.id, now.timestamp_millis())?
        {
            tracing::debug!("⏭️ {} vanished before commit", record.id);
            return Ok(false);
        }
        if self.options.daily_rearm {
            return Ok(self.scheduler.rearm_at(record, now)?.is_some());
        }
        Ok(false)
    }

    async fn show_logged(&self, record_id: Option<&str>, notification: &Notification) -> Result<()> {
        let result = self.platform.show(notification).await;
        let error = result.as_ref().err().map(|e| e.to_string());
        if let Err(e) = self.scheduler.db().log_delivery(
            record_id,
            &notification.title,
            &notification.body,
            error.as_deref(),
        ) {
            tracing::warn!("⚠️ Failed to log delivery: {e}");
        }
        result
    }

    /// Apply one foreground message.
    pub async fn handle(&self, message: RuntimeMessage) -> Result<()> {
        self.activate();
        match message {
            RuntimeMessage::Schedule(config) => {
                let records = self.scheduler.schedule_at(&config, &Local::now())?;
                tracing::debug!("📨 Schedule for {} applied ({} record(s))", config.id, records.len());
                self.request_rescan();
            }
            RuntimeMessage::Cancel { item_type, item_id } => {
                self.scheduler.cancel(item_type, &item_id)?;
                self.request_rescan();
            }
            RuntimeMessage::SendTest { title, body } => {
                let notification = notify::test_notification(&title, &body);
                self.show_logged(None, &notification).await?;
            }
        }
        Ok(())
    }

    /// Scan again once the rescan delay has passed.
    fn request_rescan(&self) {
        let signal = self.scan_signal.clone();
        let delay = self.options.rescan_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            signal.notify_one();
        });
    }

    /// Best-effort wakeups for records due before the next poll.
    fn arm_timers(&self, now_ms: i64) -> Result<usize> {
        let poll_ms = i64::try_from(self.options.poll_interval.as_millis()).unwrap_or(i64::MAX);
        let horizon = now_ms.saturating_add(poll_ms);
        let mut armed = 0;
        for record in self.scheduler.db().due_records(horizon)? {
            if record.scheduled_time_epoch_ms <= now_ms {
                continue;
            }
            let delay = Duration::from_millis(record.scheduled_time_epoch_ms.abs_diff(now_ms));
            let signal = self.scan_signal.clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                signal.notify_one();
            });
            self.scheduler
                .timers()
                .register(&record.config_snapshot, handle.abort_handle());
            armed += 1;
        }
        Ok(armed)
    }

    /// Run dormant until the first message arrives.
    pub fn spawn(self) -> RuntimeHandle {
        self.start(false)
    }

    /// Run and start polling immediately.
    pub fn spawn_active(self) -> RuntimeHandle {
        self.start(true)
    }

    fn start(self, active: bool) -> RuntimeHandle {
        let (sender, inbox) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let state = self.subscribe();
        let runtime = Arc::new(self);
        if active {
            runtime.activate();
        }
        let join = tokio::spawn(runtime.run(inbox, stop_rx));
        RuntimeHandle {
            sender,
            state,
            stop_tx,
            join,
        }
    }

    async fn run(
        self: Arc<Self>,
        mut inbox: mpsc::UnboundedReceiver<RuntimeMessage>,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        tracing::info!(
            "⏰ Delivery runtime started (poll every {}s, platform: {})",
            self.options.poll_interval.as_secs(),
            self.platform.name()
        );

        let mut interval = tokio::time::interval(self.options.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let polling = self.state() != RuntimeState::Dormant;
            tokio::select! {
                _ = interval.tick(), if polling => self.scan_logged().await,
                _ = self.scan_signal.notified() => {
                    self.activate();
                    self.scan_logged().await;
                }
                message = inbox.recv() => match message {
                    Some(message) => self.handle_logged(message).await,
                    None => break,
                },
                _ = stop_rx.changed() => break,
            }
        }

        // Messages already sent are applied before exiting.
        while let Ok(message) = inbox.try_recv() {
            self.handle_logged(message).await;
        }
        self.scheduler.timers().abort_all();
        self.state.send_replace(RuntimeState::Dormant);
        tracing::info!("⏹️ Delivery runtime stopped");
    }

    async fn scan_logged(&self) {
        match self.scan().await {
            Ok(report) if report.delivered + report.failed > 0 => tracing::info!(
                "🔔 Delivered {} notification(s), {} failed",
                report.delivered,
                report.failed
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!("⚠️ Scan failed: {e}"),
        }
    }

    async fn handle_logged(&self, message: RuntimeMessage) {
        if let Err(e) = self.handle(message).await {
            match e {
                BoraBuzError::RenderFailure(_) => tracing::warn!("⚠️ Test notification failed: {e}"),
                other => tracing::warn!("⚠️ Runtime message failed: {other}"),
            }
        }
    }
}

/// Handle to a spawned runtime.
pub struct RuntimeHandle {
    sender: mpsc::UnboundedSender<RuntimeMessage>,
    state: watch::Receiver<RuntimeState>,
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl RuntimeHandle {
    /// Sender for a foreground bridge.
    pub fn sender(&self) -> mpsc::UnboundedSender<RuntimeMessage> {
        self.sender.clone()
    }

    pub fn send(&self, message: RuntimeMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| BoraBuzError::ChannelClosed)
    }

    pub fn state(&self) -> RuntimeState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<RuntimeState> {
        self.state.clone()
    }

    /// Apply pending messages, then stop.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.join.await {
            tracing::warn!("⚠️ Delivery runtime task ended abnormally: {e}");
        }
    }
}
