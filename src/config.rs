use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{
    CAPTURE_DURATION_COMMON_MS, CAPTURE_DURATION_STRONG_MS, ECTO1_UNLOCK_COUNT, INVENTORY_LIMIT,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GameConfig {
    #[serde(rename = "inventoryLimit")]
    pub inventory_limit: usize,
    #[serde(rename = "ecto1UnlockCount")]
    pub ecto1_unlock_count: u32,
    #[serde(rename = "captureDurationCommonMs")]
    pub capture_duration_common_ms: u64,
    #[serde(rename = "captureDurationStrongMs")]
    pub capture_duration_strong_ms: u64,
    /// Overrides the selected location's hunting radius when set.
    #[serde(rename = "captureRadius")]
    pub capture_radius_m: Option<f64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            inventory_limit: INVENTORY_LIMIT,
            ecto1_unlock_count: ECTO1_UNLOCK_COUNT,
            capture_duration_common_ms: CAPTURE_DURATION_COMMON_MS,
            capture_duration_strong_ms: CAPTURE_DURATION_STRONG_MS,
            capture_radius_m: None,
        }
    }
}

/// Shape of the `gameConfig` record. Every field is optional; zero values
/// count as absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameConfigPatch {
    #[serde(rename = "inventoryLimit", default, skip_serializing_if = "Option::is_none")]
    pub inventory_limit: Option<u64>,
    #[serde(rename = "captureRadius", default, skip_serializing_if = "Option::is_none")]
    pub capture_radius: Option<f64>,
    #[serde(rename = "ecto1UnlockCount", default, skip_serializing_if = "Option::is_none")]
    pub ecto1_unlock_count: Option<u64>,
    #[serde(rename = "captureDuration", default, skip_serializing_if = "Option::is_none")]
    pub capture_duration: Option<CaptureDurationPatch>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureDurationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strong: Option<u64>,
}

impl GameConfig {
    pub fn apply(&mut self, patch: &GameConfigPatch) {
        if let Some(limit) = positive(patch.inventory_limit) {
            self.inventory_limit = limit as usize;
        }
        if let Some(radius) = patch.capture_radius.filter(|value| *value > 0.0) {
            self.capture_radius_m = Some(radius);
        }
        if let Some(count) = positive(patch.ecto1_unlock_count) {
            self.ecto1_unlock_count = count.min(u32::MAX as u64) as u32;
        }
        if let Some(durations) = &patch.capture_duration {
            if let Some(common) = positive(durations.common) {
                self.capture_duration_common_ms = common;
            }
            if let Some(strong) = positive(durations.strong) {
                self.capture_duration_strong_ms = strong;
            }
        }
    }

    pub fn to_patch(&self) -> GameConfigPatch {
        GameConfigPatch {
            inventory_limit: Some(self.inventory_limit as u64),
            capture_radius: self.capture_radius_m,
            ecto1_unlock_count: Some(self.ecto1_unlock_count as u64),
            capture_duration: Some(CaptureDurationPatch {
                common: Some(self.capture_duration_common_ms),
                strong: Some(self.capture_duration_strong_ms),
            }),
        }
    }
}

fn positive(value: Option<u64>) -> Option<u64> {
    value.filter(|value| *value > 0)
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub data_path: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub log_filter: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(8080);
        let data_path = env::var("DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".data/store.json"));
        let log_filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        Self {
            port,
            data_path,
            static_dir: resolve_static_dir(),
            log_filter,
        }
    }
}

fn resolve_static_dir() -> Option<PathBuf> {
    if let Ok(raw) = env::var("STATIC_DIR") {
        let path = PathBuf::from(raw);
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }

    let candidates = [PathBuf::from("public"), PathBuf::from("dist")];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn patch_overrides_only_present_fields() {
        let patch: GameConfigPatch = serde_json::from_value(json!({
            "inventoryLimit": 8,
            "captureDuration": { "strong": 9000 }
        }))
        .expect("patch decodes");
        let mut config = GameConfig::default();
        config.apply(&patch);
        assert_eq!(
            config,
            GameConfig {
                inventory_limit: 8,
                capture_duration_strong_ms: 9_000,
                ..GameConfig::default()
            }
        );
    }

    #[test]
    fn zero_values_keep_defaults() {
        let patch = GameConfigPatch {
            inventory_limit: Some(0),
            ecto1_unlock_count: Some(0),
            capture_radius: Some(0.0),
            capture_duration: Some(CaptureDurationPatch {
                common: Some(0),
                strong: None,
            }),
        };
        let mut config = GameConfig::default();
        config.apply(&patch);
        assert_eq!(config, GameConfig::default());
    }

    #[test]
    fn to_patch_round_trips_through_apply() {
        let mut tuned = GameConfig::default();
        tuned.inventory_limit = 3;
        tuned.capture_radius_m = Some(20.0);
        let mut restored = GameConfig::default();
        restored.apply(&tuned.to_patch());
        assert_eq!(restored, tuned);
    }
}
