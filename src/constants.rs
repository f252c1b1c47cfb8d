use crate::types::GhostType;

pub const INVENTORY_LIMIT: usize = 5;
pub const ECTO1_UNLOCK_COUNT: u32 = 5;
pub const CAPTURE_DURATION_COMMON_MS: u64 = 5_000;
pub const CAPTURE_DURATION_STRONG_MS: u64 = 8_000;
pub const CAPTURE_PROGRESS_SAMPLE_MS: u64 = 100;

pub const DEFAULT_HUNTING_RADIUS_M: f64 = 15.0;
pub const DEFAULT_GHOST_POINTS: u32 = 10;
pub const DEFAULT_GHOST_SCALE: f64 = 1.0;

/// Half-width of the square a ghost spawns in around the hunting origin.
pub const GHOST_SPAWN_JITTER_DEG: f64 = 0.0001;
pub const ECTO1_LAT_OFFSET_DEG: f64 = 0.0005;
pub const ECTO1_LON_OFFSET_DEG: f64 = -0.0005;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub const RANKING_LIMIT: usize = 10;
pub const RANKING_LIMIT_MAX: usize = 100;

pub const DEFAULT_DISPLAY_NAME: &str = "Caça-Fantasma";
pub const GUEST_DISPLAY_NAME: &str = "Visitante";

pub const CONTAINMENT_UNIT_MARKER: &str = "GHOST_SQUAD_CONTAINMENT_UNIT";

pub const ADMIN_INACTIVITY_TIMEOUT_MS: u64 = 30 * 60 * 1000;
pub const DASHBOARD_ACTIVE_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;
pub const DASHBOARD_RECENT_ACTIVITY: usize = 7;

pub fn capture_duration_ms(ghost_type: GhostType, common_ms: u64, strong_ms: u64) -> u64 {
    match ghost_type {
        GhostType::Forte => strong_ms,
        GhostType::Medio => (common_ms + strong_ms) / 2,
        GhostType::Fraco | GhostType::Unknown => common_ms,
    }
}
