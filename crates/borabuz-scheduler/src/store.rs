//! Alert configuration store: one config per item/direction, overwritten
//! wholesale on every save.

use std::sync::Arc;

use borabuz_core::alert::{AlertConfig, Direction, ItemType};
use borabuz_core::error::Result;

use crate::persistence::AlertDb;

pub struct AlertStore {
    db: Arc<AlertDb>,
}

impl AlertStore {
    pub fn new(db: Arc<AlertDb>) -> Self {
        Self { db }
    }

    /// Normalize and persist. Saving a disabled config leaves queued records
    /// alone; purging them is the scheduler's job.
    pub fn save(&self, config: &AlertConfig) -> Result<AlertConfig> {
        let mut config = config.clone();
        config.normalize();
        self.db.upsert_config(&config)?;
        tracing::debug!("💾 Saved alert config {}", config.id);
        Ok(config)
    }

    pub fn load(
        &self,
        item_type: ItemType,
        item_id: &str,
        direction: Option<Direction>,
    ) -> Result<Option<AlertConfig>> {
        self.db
            .get_config(&AlertConfig::config_id(item_type, item_id, direction))
    }

    /// Remove every config of the item (all directions) and its queued records.
    pub fn delete(&self, item_type: ItemType, item_id: &str) -> Result<()> {
        let (configs, records) = self.db.delete_item(item_type, item_id)?;
        tracing::info!(
            "🗑️ Removed {configs} alert config(s) and {records} queued record(s) for {item_type} {item_id}"
        );
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<AlertConfig>> {
        self.db.list_configs()
    }
}
