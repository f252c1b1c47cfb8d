use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::config::{GameConfig, GameConfigPatch};
use crate::constants::{
    capture_duration_ms, DEFAULT_GHOST_POINTS, DEFAULT_GHOST_SCALE, DEFAULT_HUNTING_RADIUS_M,
    ECTO1_LAT_OFFSET_DEG, ECTO1_LON_OFFSET_DEG, GHOST_SPAWN_JITTER_DEG,
};
use crate::content::ActiveContent;
use crate::rng::Rng;
use crate::store::{get_as, list_as, DocumentStore};
use crate::types::{
    Behavior, GameEvent, GeoPoint, GhostTemplate, InventoryItem, Location, SpawnedGhost, UserStats,
};

/// Session-local player state and the spawn/reward rules.
#[derive(Clone, Debug)]
pub struct GameState {
    pub config: GameConfig,
    rng: Rng,
    stats: UserStats,
    inventory: Vec<InventoryItem>,
    active_ghosts: Vec<GhostTemplate>,
    active_event: Option<GameEvent>,
    selected_location: Option<Location>,
    hunting_radius_m: f64,
    ecto1_position: Option<GeoPoint>,
    current_ghost: Option<SpawnedGhost>,
}

impl GameState {
    pub fn new(config: GameConfig, rng: Rng) -> Self {
        Self {
            config,
            rng,
            stats: UserStats::default(),
            inventory: Vec::new(),
            active_ghosts: Vec::new(),
            active_event: None,
            selected_location: None,
            hunting_radius_m: DEFAULT_HUNTING_RADIUS_M,
            ecto1_position: None,
            current_ghost: None,
        }
    }

    /// Loads a persisted player record, inventory included.
    pub fn restore(&mut self, mut stats: UserStats) {
        self.inventory = std::mem::take(&mut stats.inventory);
        self.inventory.truncate(self.config.inventory_limit);
        self.stats = stats;
    }

    pub fn set_active_content(&mut self, content: ActiveContent) {
        info!(
            ghost_count = content.ghosts.len(),
            has_event = content.event.is_some(),
            "active content set"
        );
        self.active_ghosts = content.ghosts;
        self.active_event = content.event;
    }

    pub fn apply_config(&mut self, patch: &GameConfigPatch) {
        self.config.apply(patch);
    }

    /// Overlays `gameConfig` onto the current values; missing record or read
    /// failure keeps them.
    pub async fn load_game_config(&mut self, store: &dyn DocumentStore) {
        match get_as::<GameConfigPatch>(store, "gameConfig").await {
            Ok(Some(patch)) => {
                self.apply_config(&patch);
                info!(config = ?self.config, "game config loaded");
            }
            Ok(None) => warn!("no game config found, using defaults"),
            Err(error) => warn!(%error, "failed to load game config, using defaults"),
        }
    }

    pub fn update_user_stats(&mut self, points: u64, captures: u32) -> &UserStats {
        self.stats.points += points;
        self.stats.captures += captures;
        if !self.stats.ecto1_unlocked && self.stats.captures >= self.config.ecto1_unlock_count {
            self.stats.ecto1_unlocked = true;
            info!(captures = self.stats.captures, "ecto-1 unlocked");
        }
        &self.stats
    }

    pub fn add_ghost_to_inventory(&mut self, item: InventoryItem) -> bool {
        if self.is_inventory_full() {
            return false;
        }
        self.inventory.push(item);
        true
    }

    pub fn clear_inventory(&mut self) -> Vec<InventoryItem> {
        std::mem::take(&mut self.inventory)
    }

    pub fn set_selected_location(
        &mut self,
        name: &str,
        locations: &BTreeMap<String, Location>,
    ) -> bool {
        if locations.is_empty() {
            warn!("no hunting locations available");
            return false;
        }
        let Some(location) = locations.get(name) else {
            warn!(location = name, "hunting location not found");
            return false;
        };

        self.hunting_radius_m = location
            .hunting_radius
            .filter(|radius| *radius > 0.0)
            .unwrap_or(DEFAULT_HUNTING_RADIUS_M);
        self.ecto1_position = Some(GeoPoint {
            lat: location.lat + ECTO1_LAT_OFFSET_DEG,
            lon: location.lon + ECTO1_LON_OFFSET_DEG,
        });
        self.selected_location = Some(location.clone());
        info!(
            location = name,
            hunting_radius_m = self.hunting_radius_m,
            "hunting location selected"
        );
        true
    }

    pub async fn select_location(&mut self, store: &dyn DocumentStore, name: &str) -> bool {
        let locations = load_locations(store).await;
        self.set_selected_location(name, &locations)
    }

    /// Draws the next encounter from the active pool, replacing the live one.
    pub fn generate_ghost(&mut self) -> Option<SpawnedGhost> {
        self.current_ghost = self.roll_ghost();
        self.current_ghost.clone()
    }

    fn roll_ghost(&mut self) -> Option<SpawnedGhost> {
        if self.is_inventory_full() {
            debug!("inventory full, no spawn");
            return None;
        }
        if self.active_ghosts.is_empty() {
            debug!("active pool empty, no spawn");
            return None;
        }

        let index = self.rng.pick_index(self.active_ghosts.len());
        let template = &self.active_ghosts[index];
        let capture_duration_ms = capture_duration_ms(
            template.ghost_type,
            self.config.capture_duration_common_ms,
            self.config.capture_duration_strong_ms,
        );
        let origin = self
            .selected_location
            .as_ref()
            .map(|location| GeoPoint {
                lat: location.lat,
                lon: location.lon,
            })
            .unwrap_or(GeoPoint { lat: 0.0, lon: 0.0 });

        let ghost = SpawnedGhost {
            lat: origin.lat + self.rng.jitter(GHOST_SPAWN_JITTER_DEG),
            lon: origin.lon + self.rng.jitter(GHOST_SPAWN_JITTER_DEG),
            name: template.name.clone(),
            ghost_type: template.ghost_type,
            points: template
                .points
                .filter(|points| *points > 0)
                .unwrap_or(DEFAULT_GHOST_POINTS),
            model_url: template.model_url.clone(),
            capture_duration_ms,
            behavior: template.behavior.unwrap_or(Behavior::Orbit),
            scale: template
                .scale
                .filter(|scale| *scale > 0.0)
                .unwrap_or(DEFAULT_GHOST_SCALE),
        };
        info!(ghost = %ghost.name, capture_duration_ms, "ghost spawned");
        Some(ghost)
    }

    pub fn is_inventory_full(&self) -> bool {
        self.inventory.len() >= self.config.inventory_limit
    }

    pub fn inventory(&self) -> &[InventoryItem] {
        &self.inventory
    }

    pub fn inventory_points(&self) -> u64 {
        self.inventory.iter().map(|item| item.points as u64).sum()
    }

    pub fn user_stats(&self) -> &UserStats {
        &self.stats
    }

    pub fn is_ecto1_unlocked(&self) -> bool {
        self.stats.ecto1_unlocked
    }

    pub fn ecto1_position(&self) -> Option<GeoPoint> {
        self.ecto1_position
    }

    pub fn selected_location(&self) -> Option<&Location> {
        self.selected_location.as_ref()
    }

    pub fn hunting_radius_m(&self) -> f64 {
        self.hunting_radius_m
    }

    /// Distance under which a target counts as reachable.
    pub fn interaction_radius_m(&self) -> f64 {
        self.config.capture_radius_m.unwrap_or(self.hunting_radius_m)
    }

    pub fn current_ghost(&self) -> Option<&SpawnedGhost> {
        self.current_ghost.as_ref()
    }

    pub fn active_event(&self) -> Option<&GameEvent> {
        self.active_event.as_ref()
    }

    pub fn active_ghost_count(&self) -> usize {
        self.active_ghosts.len()
    }
}

/// Active locations keyed by name. Read failures yield an empty map.
pub async fn load_locations(store: &dyn DocumentStore) -> BTreeMap<String, Location> {
    match list_as::<Location>(store, "locations").await {
        Ok(rows) => rows
            .into_iter()
            .map(|(_, location)| location)
            .filter(Location::is_active)
            .map(|location| (location.name.clone(), location))
            .collect(),
        Err(error) => {
            warn!(%error, "failed to load hunting locations");
            BTreeMap::new()
        }
    }
}
