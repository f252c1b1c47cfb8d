use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;

use crate::admin::auth::AdminAuth;
use crate::config::{GameConfig, GameConfigPatch};
use crate::error::GameError;
use crate::store::{get_as, DocumentStore};

pub const SETTINGS_PERMISSION: &str = "settings";
const CONFIG_PATH: &str = "gameConfig";

pub struct SettingsManager {
    store: Arc<dyn DocumentStore>,
}

impl SettingsManager {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Effective configuration: defaults overlaid with the stored record.
    pub async fn load(&self) -> Result<GameConfig, GameError> {
        let mut config = GameConfig::default();
        if let Some(patch) = get_as::<GameConfigPatch>(self.store.as_ref(), CONFIG_PATH).await? {
            config.apply(&patch);
        }
        Ok(config)
    }

    pub async fn update_game_config(
        &self,
        auth: &AdminAuth,
        patch: &GameConfigPatch,
    ) -> Result<GameConfig, GameError> {
        let admin_id = require_settings_admin(auth)?;
        if patch.capture_radius.is_some_and(|radius| radius < 0.0) {
            return Err(GameError::Validation(
                "O raio de captura não pode ser negativo.".to_string(),
            ));
        }

        let fields = patch_fields(patch);
        if fields.is_empty() {
            return self.load().await;
        }
        let details = serde_json::to_value(patch)
            .map_err(|error| GameError::Validation(error.to_string()))?;
        self.store
            .update(CONFIG_PATH, Value::Object(fields))
            .await?;
        info!(admin_id = %admin_id, "game config updated");
        auth.log_action(&admin_id, "update_game_config", details).await;
        self.load().await
    }

    pub async fn reset_game_config(&self, auth: &AdminAuth) -> Result<GameConfig, GameError> {
        let admin_id = require_settings_admin(auth)?;
        let defaults = GameConfig::default();
        let value = serde_json::to_value(defaults.to_patch())
            .map_err(|error| GameError::Validation(error.to_string()))?;
        self.store.set(CONFIG_PATH, value).await?;
        info!(admin_id = %admin_id, "game config reset");
        auth.log_action(&admin_id, "reset_game_config", Value::Object(Map::new()))
            .await;
        Ok(defaults)
    }
}

fn require_settings_admin(auth: &AdminAuth) -> Result<String, GameError> {
    match auth.current_uid() {
        Some(uid) if auth.has_permission(SETTINGS_PERMISSION) => Ok(uid.to_string()),
        _ => Err(GameError::Permission(CONFIG_PATH.to_string())),
    }
}

/// Flattens nested durations so a partial patch leaves sibling values alone.
fn patch_fields(patch: &GameConfigPatch) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(limit) = patch.inventory_limit {
        fields.insert("inventoryLimit".to_string(), limit.into());
    }
    if let Some(radius) = patch.capture_radius {
        fields.insert("captureRadius".to_string(), radius.into());
    }
    if let Some(count) = patch.ecto1_unlock_count {
        fields.insert("ecto1UnlockCount".to_string(), count.into());
    }
    if let Some(durations) = &patch.capture_duration {
        if let Some(common) = durations.common {
            fields.insert("captureDuration/common".to_string(), common.into());
        }
        if let Some(strong) = durations.strong {
            fields.insert("captureDuration/strong".to_string(), strong.into());
        }
    }
    fields
}
