//! Notification platforms: where a composed notification is actually shown.
//! Supports: terminal (console), HTTP webhook, and an in-memory recorder for
//! embedding and tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use borabuz_core::alert::Permission;
use borabuz_core::config::{NotificationsConfig, PlatformKind};
use borabuz_core::error::{BoraBuzError, Result};

use crate::notify::Notification;

/// Renders notifications on behalf of either execution context.
#[async_trait]
pub trait NotificationPlatform: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the calling context can render directly. When false, the
    /// bridge relays test notifications through the runtime.
    fn can_render(&self) -> bool {
        true
    }

    /// Ask the user for notification permission. Called at most once per
    /// undetermined state; the answer is persisted by the caller.
    async fn prompt_permission(&self) -> Permission;

    async fn show(&self, notification: &Notification) -> Result<()>;
}

/// Build the platform selected in config.
pub fn create_platform(config: &NotificationsConfig) -> Result<Arc<dyn NotificationPlatform>> {
    match config.platform {
        PlatformKind::Console => Ok(Arc::new(ConsolePlatform::new(config.prompt_answer))),
        PlatformKind::Webhook => {
            if config.webhook_url.trim().is_empty() {
                return Err(BoraBuzError::Config(
                    "notifications.webhook_url is required for the webhook platform".into(),
                ));
            }
            Ok(Arc::new(WebhookPlatform::new(
                &config.webhook_url,
                config.prompt_answer,
            )))
        }
    }
}

/// Prints notifications to stdout.
pub struct ConsolePlatform {
    prompt_answer: Permission,
}

impl ConsolePlatform {
    pub fn new(prompt_answer: Permission) -> Self {
        Self { prompt_answer }
    }
}

#[async_trait]
impl NotificationPlatform for ConsolePlatform {
    fn name(&self) -> &str {
        "console"
    }

    async fn prompt_permission(&self) -> Permission {
        tracing::info!("🔔 Notification permission prompt answered: {}", self.prompt_answer.as_str());
        self.prompt_answer
    }

    async fn show(&self, notification: &Notification) -> Result<()> {
        println!(
            "{}\n   {}\n   [{} • {}]",
            notification.display_title(),
            notification.body,
            notification.tag,
            notification.timestamp.format("%H:%M:%S UTC")
        );
        tracing::info!("✅ Notification shown: {}", notification.title);
        Ok(())
    }
}

/// POSTs each notification as JSON to an HTTP endpoint.
pub struct WebhookPlatform {
    url: String,
    prompt_answer: Permission,
    client: reqwest::Client,
}

impl WebhookPlatform {
    pub fn new(url: &str, prompt_answer: Permission) -> Self {
        Self {
            url: url.to_string(),
            prompt_answer,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationPlatform for WebhookPlatform {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn prompt_permission(&self) -> Permission {
        self.prompt_answer
    }

    async fn show(&self, notification: &Notification) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({
                "title": notification.display_title(),
                "body": notification.body,
                "tag": notification.tag,
                "source": notification.source,
                "requireInteraction": notification.require_interaction,
                "timestamp": notification.timestamp.to_rfc3339(),
            }))
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| BoraBuzError::RenderFailure(format!("Webhook send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::info!("✅ Webhook notification sent: {}", notification.title);
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(BoraBuzError::RenderFailure(format!(
                "Webhook error {status}: {body}"
            )))
        }
    }
}

/// Keeps every shown notification in memory.
#[derive(Default)]
pub struct MemoryPlatform {
    shown: Mutex<Vec<Notification>>,
    prompt_answer: Mutex<Option<Permission>>,
    prompts: Mutex<usize>,
    failing: Mutex<bool>,
    headless: bool,
}

impl MemoryPlatform {
    /// Granting platform that renders directly.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that cannot render by itself (test notifications get relayed).
    pub fn headless() -> Self {
        Self {
            headless: true,
            ..Self::default()
        }
    }

    pub fn answer_prompts_with(&self, permission: Permission) {
        *lock(&self.prompt_answer) = Some(permission);
    }

    /// Make every subsequent `show` fail with `RenderFailure`.
    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    pub fn shown(&self) -> Vec<Notification> {
        lock(&self.shown).clone()
    }

    pub fn prompt_count(&self) -> usize {
        *lock(&self.prompts)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl NotificationPlatform for MemoryPlatform {
    fn name(&self) -> &str {
        "memory"
    }

    fn can_render(&self) -> bool {
        !self.headless
    }

    async fn prompt_permission(&self) -> Permission {
        *lock(&self.prompts) += 1;
        lock(&self.prompt_answer).unwrap_or(Permission::Granted)
    }

    async fn show(&self, notification: &Notification) -> Result<()> {
        if *lock(&self.failing) {
            return Err(BoraBuzError::RenderFailure("platform refused".into()));
        }
        lock(&self.shown).push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::test_notification;

    #[test]
    fn test_create_platform() {
        let mut config = NotificationsConfig::default();
        assert_eq!(create_platform(&config).unwrap().name(), "console");

        config.platform = PlatformKind::Webhook;
        assert!(matches!(create_platform(&config), Err(BoraBuzError::Config(_))));

        config.webhook_url = "http://127.0.0.1:9/hook".into();
        assert_eq!(create_platform(&config).unwrap().name(), "webhook");
    }

    #[tokio::test]
    async fn test_memory_platform() {
        let platform = MemoryPlatform::new();
        platform.answer_prompts_with(Permission::Denied);
        assert_eq!(platform.prompt_permission().await, Permission::Denied);
        assert_eq!(platform.prompt_count(), 1);

        platform.show(&test_notification("a", "b")).await.unwrap();
        platform.set_failing(true);
        assert!(matches!(
            platform.show(&test_notification("c", "d")).await,
            Err(BoraBuzError::RenderFailure(_))
        ));
        assert_eq!(platform.shown().len(), 1);
        assert!(!MemoryPlatform::headless().can_render());
    }

    #[tokio::test]
    async fn test_webhook_unreachable_is_render_failure() {
        // Port 9 (discard) is not listening on loopback.
        let platform = WebhookPlatform::new("http://127.0.0.1:9/hook", Permission::Granted);
        let err = platform.show(&test_notification("a", "b")).await.unwrap_err();
        assert!(matches!(err, BoraBuzError::RenderFailure(_)));
    }
}
