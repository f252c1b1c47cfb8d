use serde::Serialize;
use tracing::debug;

use crate::types::{PlaceTarget, SpawnedGhost};

/// What the AR scene should do when a pending object is anchored.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlacementDirective {
    Ghost {
        #[serde(rename = "modelUrl")]
        model_url: String,
        scale: f64,
        #[serde(rename = "animationsEnabled")]
        animations_enabled: bool,
    },
    Ecto1,
}

#[derive(Clone, Debug, Default)]
pub struct Placement {
    object_to_place: Option<PlaceTarget>,
    ghost_placed: bool,
    ecto1_placed: bool,
}

impl Placement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_object_to_place(&mut self, target: Option<PlaceTarget>) {
        self.object_to_place = target;
    }

    pub fn object_to_place(&self) -> Option<PlaceTarget> {
        self.object_to_place
    }

    pub fn is_placed(&self, target: PlaceTarget) -> bool {
        match target {
            PlaceTarget::Ghost => self.ghost_placed,
            PlaceTarget::Ecto1 => self.ecto1_placed,
        }
    }

    /// Whether the hit-test reticle should be shown.
    pub fn awaiting_hit(&self) -> bool {
        self.object_to_place
            .is_some_and(|target| !self.is_placed(target))
    }

    /// Anchors the pending object at a visible hit. Each object is placed once
    /// until `reset`.
    pub fn on_hit(
        &mut self,
        hit_visible: bool,
        ghost: Option<&SpawnedGhost>,
    ) -> Option<PlacementDirective> {
        if !hit_visible || !self.awaiting_hit() {
            return None;
        }
        let directive = match self.object_to_place? {
            PlaceTarget::Ghost => {
                let ghost = ghost?;
                self.ghost_placed = true;
                PlacementDirective::Ghost {
                    model_url: ghost.model_url.clone(),
                    scale: ghost.scale,
                    animations_enabled: ghost.behavior.animates(),
                }
            }
            PlaceTarget::Ecto1 => {
                self.ecto1_placed = true;
                PlacementDirective::Ecto1
            }
        };
        debug!(?directive, "object placed");
        Some(directive)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
