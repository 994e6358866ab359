//! Foreground bridge: the only entry point for callers that configure alerts.
//! Gates everything on notification permission, persists configs, and hands
//! scheduling work to the background runtime over a fire-and-forget channel.

use std::sync::Arc;

use borabuz_core::alert::{AlertConfig, ItemType, Permission};
use borabuz_core::error::{BoraBuzError, Result};
use tokio::sync::mpsc::UnboundedSender;

use crate::dispatch::NotificationPlatform;
use crate::notify;
use crate::persistence::AlertDb;
use crate::runtime::RuntimeMessage;
use crate::store::AlertStore;

pub struct ForegroundBridge {
    db: Arc<AlertDb>,
    store: AlertStore,
    platform: Arc<dyn NotificationPlatform>,
    runtime: UnboundedSender<RuntimeMessage>,
}

impl ForegroundBridge {
    /// `db` should be the foreground's own connection to the shared store.
    pub fn new(
        db: Arc<AlertDb>,
        platform: Arc<dyn NotificationPlatform>,
        runtime: UnboundedSender<RuntimeMessage>,
    ) -> Self {
        Self {
            store: AlertStore::new(db.clone()),
            db,
            platform,
            runtime,
        }
    }

    pub fn store(&self) -> &AlertStore {
        &self.store
    }

    /// Notifications can reach the user from this context or through the runtime.
    pub fn is_supported(&self) -> bool {
        self.platform.can_render() || !self.runtime.is_closed()
    }

    /// Current permission. An unreadable store reads as undetermined.
    pub fn permission(&self) -> Permission {
        self.db.permission().unwrap_or_else(|e| {
            tracing::warn!("⚠️ Failed to read notification permission: {e}");
            Permission::Default
        })
    }

    /// Prompt only while undetermined; remember the answer.
    pub async fn request_permission(&self) -> bool {
        if !self.is_supported() {
            tracing::warn!("🔕 Notifications are not supported in this context");
            return false;
        }
        match self.permission() {
            Permission::Granted => true,
            Permission::Denied => false,
            Permission::Default => {
                let answer = self.platform.prompt_permission().await;
                if let Err(e) = self.db.set_permission(answer) {
                    tracing::warn!("⚠️ Failed to persist notification permission: {e}");
                }
                tracing::info!("🔔 Notification permission: {}", answer.as_str());
                answer.is_granted()
            }
        }
    }

    /// Show a one-off notification without touching the queue. Renders
    /// directly when this context can, otherwise relays to the runtime.
    pub async fn try_send_test(&self, title: &str, body: &str) -> Result<()> {
        if !self.request_permission().await {
            return Err(BoraBuzError::PermissionDenied);
        }
        if self.platform.can_render() {
            let notification = notify::test_notification(title, body);
            self.platform.show(&notification).await?;
            if let Err(e) = self.db.log_delivery(None, title, body, None) {
                tracing::warn!("⚠️ Failed to log test notification: {e}");
            }
            return Ok(());
        }
        self.send(RuntimeMessage::SendTest {
            title: title.to_string(),
            body: body.to_string(),
        })
    }

    pub async fn send_test(&self, title: &str, body: &str) -> bool {
        match self.try_send_test(title, body).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("⚠️ Test notification not sent: {e}");
                false
            }
        }
    }

    /// Save the config and ask the runtime to (re)schedule it. Enabling
    /// requires permission; nothing is saved without it.
    pub async fn try_apply_config(&self, config: &AlertConfig) -> Result<AlertConfig> {
        let mut config = config.clone();
        config.normalize();
        if config.enabled && !self.request_permission().await {
            return Err(BoraBuzError::PermissionDenied);
        }
        let saved = self.store.save(&config)?;
        self.send(RuntimeMessage::Schedule(saved.clone()))?;
        tracing::info!(
            "📅 Alert {} {} ({} time(s))",
            saved.id,
            if saved.enabled { "saved" } else { "disabled" },
            saved.recurring_times.len()
        );
        Ok(saved)
    }

    pub async fn apply_config(&self, config: &AlertConfig) -> bool {
        match self.try_apply_config(config).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("⚠️ Alert config for {} not applied: {e}", config.id);
                false
            }
        }
    }

    /// Forget every alert of the item. Queued records go with the config.
    pub fn try_teardown(&self, item_type: ItemType, item_id: &str) -> Result<()> {
        self.store.delete(item_type, item_id)?;
        self.send(RuntimeMessage::Cancel {
            item_type,
            item_id: item_id.to_string(),
        })
    }

    pub fn teardown(&self, item_type: ItemType, item_id: &str) {
        if let Err(e) = self.try_teardown(item_type, item_id) {
            tracing::warn!("⚠️ Teardown of {item_type} {item_id} incomplete: {e}");
        }
    }

    fn send(&self, message: RuntimeMessage) -> Result<()> {
        self.runtime
            .send(message)
            .map_err(|_| BoraBuzError::ChannelClosed)
    }
}
