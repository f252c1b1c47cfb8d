use serde::Serialize;

use crate::constants::EARTH_RADIUS_M;
use crate::types::{GeoPoint, PlaceTarget, SpawnedGhost};

pub const GHOST_NEARBY_TEXT: &str = "Fantasma próximo! Procure-o com a câmera.";
pub const ECTO1_NEARBY_TEXT: &str = "ECTO-1 próximo! Procure-o com a câmera.";
pub const INVENTORY_FULL_TEXT: &str = "Inventário Cheio!";

pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

#[derive(Clone, Copy, Debug)]
pub struct ProximityInput<'a> {
    pub player: GeoPoint,
    pub ghost: Option<&'a SpawnedGhost>,
    pub ecto1: Option<GeoPoint>,
    pub ecto1_unlocked: bool,
    pub inventory_full: bool,
    pub radius_m: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProximityReport {
    #[serde(rename = "objectToPlace")]
    pub target: Option<PlaceTarget>,
    #[serde(rename = "distanceInfo")]
    pub distance_info: Option<String>,
    #[serde(rename = "isNearObject")]
    pub is_near_object: bool,
    /// `None` when no ghost was evaluated this tick.
    #[serde(rename = "isNearGhost")]
    pub is_near_ghost: Option<bool>,
}

/// Ghost in range takes precedence over ECTO-1 in range.
pub fn evaluate(input: &ProximityInput<'_>) -> ProximityReport {
    let ghost_distance = input
        .ghost
        .filter(|_| !input.inventory_full)
        .map(|ghost| {
            haversine_m(
                input.player,
                GeoPoint {
                    lat: ghost.lat,
                    lon: ghost.lon,
                },
            )
        });
    let ecto1_distance = input
        .ecto1
        .filter(|_| input.ecto1_unlocked)
        .map(|ecto1| haversine_m(input.player, ecto1));
    let in_range = |distance: Option<f64>| distance.is_some_and(|value| value <= input.radius_m);
    let is_near_ghost = ghost_distance.map(|distance| distance <= input.radius_m);

    if in_range(ghost_distance) {
        return ProximityReport {
            target: Some(PlaceTarget::Ghost),
            distance_info: Some(GHOST_NEARBY_TEXT.to_string()),
            is_near_object: true,
            is_near_ghost,
        };
    }
    if in_range(ecto1_distance) {
        return ProximityReport {
            target: Some(PlaceTarget::Ecto1),
            distance_info: Some(ECTO1_NEARBY_TEXT.to_string()),
            is_near_object: true,
            is_near_ghost,
        };
    }

    let distance_info = if input.inventory_full {
        Some(INVENTORY_FULL_TEXT.to_string())
    } else if let Some(distance) = ghost_distance {
        Some(format!("Fantasma a {}m", distance.round() as u64))
    } else {
        ecto1_distance.map(|distance| format!("ECTO-1 a {}m", distance.round() as u64))
    };
    ProximityReport {
        target: None,
        distance_info,
        is_near_object: false,
        is_near_ghost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Behavior, GhostType};
    use pretty_assertions::assert_eq;

    const ORIGIN: GeoPoint = GeoPoint {
        lat: -23.5505,
        lon: -46.6333,
    };

    fn ghost_at(lat: f64, lon: f64) -> SpawnedGhost {
        SpawnedGhost {
            lat,
            lon,
            name: "Slimer".to_string(),
            ghost_type: GhostType::Fraco,
            points: 10,
            model_url: "m".to_string(),
            capture_duration_ms: 5_000,
            behavior: Behavior::Orbit,
            scale: 1.0,
        }
    }

    fn input<'a>(ghost: Option<&'a SpawnedGhost>) -> ProximityInput<'a> {
        ProximityInput {
            player: ORIGIN,
            ghost,
            ecto1: Some(GeoPoint {
                lat: ORIGIN.lat + 0.00005,
                lon: ORIGIN.lon,
            }),
            ecto1_unlocked: false,
            inventory_full: false,
            radius_m: 15.0,
        }
    }

    #[test]
    fn haversine_matches_known_distance() {
        let a = GeoPoint { lat: 0.0, lon: 0.0 };
        let b = GeoPoint { lat: 0.0, lon: 1.0 };
        let distance = haversine_m(a, b);
        assert!((distance - 111_195.0).abs() < 1.0, "distance = {distance}");
        assert_eq!(haversine_m(a, a), 0.0);
    }

    #[test]
    fn near_ghost_is_placeable() {
        let ghost = ghost_at(ORIGIN.lat + 0.00005, ORIGIN.lon);
        let report = evaluate(&input(Some(&ghost)));
        assert_eq!(report.target, Some(PlaceTarget::Ghost));
        assert!(report.is_near_object);
        assert_eq!(report.is_near_ghost, Some(true));
    }

    #[test]
    fn far_ghost_reports_rounded_distance() {
        let ghost = ghost_at(ORIGIN.lat + 0.001, ORIGIN.lon);
        let report = evaluate(&input(Some(&ghost)));
        assert_eq!(
            report,
            ProximityReport {
                target: None,
                distance_info: Some("Fantasma a 111m".to_string()),
                is_near_object: false,
                is_near_ghost: Some(false),
            }
        );
    }

    #[test]
    fn ghost_wins_over_unlocked_ecto1() {
        let ghost = ghost_at(ORIGIN.lat, ORIGIN.lon + 0.00005);
        let mut both = input(Some(&ghost));
        both.ecto1_unlocked = true;
        assert_eq!(evaluate(&both).target, Some(PlaceTarget::Ghost));
    }

    #[test]
    fn ecto1_needs_unlock() {
        let ghost = ghost_at(ORIGIN.lat + 0.01, ORIGIN.lon);
        let locked = input(Some(&ghost));
        assert_eq!(evaluate(&locked).target, None);

        let mut unlocked = locked;
        unlocked.ecto1_unlocked = true;
        let report = evaluate(&unlocked);
        assert_eq!(report.target, Some(PlaceTarget::Ecto1));
        assert_eq!(report.is_near_ghost, Some(false));
    }

    #[test]
    fn full_inventory_ignores_ghost() {
        let ghost = ghost_at(ORIGIN.lat, ORIGIN.lon);
        let mut full = input(Some(&ghost));
        full.inventory_full = true;
        let report = evaluate(&full);
        assert_eq!(report.target, None);
        assert_eq!(report.distance_info.as_deref(), Some(INVENTORY_FULL_TEXT));
        assert_eq!(report.is_near_ghost, None);
    }

    #[test]
    fn nothing_spawned_reports_nothing() {
        let report = evaluate(&input(None));
        assert_eq!(report.target, None);
        assert_eq!(report.distance_info, None);
    }
}
