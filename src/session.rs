use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::capture::{
    CaptureContext, CaptureEffect, CaptureMachine, CaptureStatus, CaptureTick, CaptureTimers,
};
use crate::config::GameConfig;
use crate::constants::{CONTAINMENT_UNIT_MARKER, DEFAULT_DISPLAY_NAME};
use crate::content::load_active_content;
use crate::game_state::GameState;
use crate::placement::{Placement, PlacementDirective};
use crate::proximity::{evaluate, ProximityInput, ProximityReport};
use crate::rankings::publish_entry;
use crate::rng::Rng;
use crate::store::DocumentStore;
use crate::types::{GeoPoint, InventoryItem, PlaceTarget, SpawnedGhost, UserStats};

/// Messages the client surfaces to the player.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    EventActive {
        name: String,
        #[serde(rename = "logoUrl")]
        logo_url: Option<String>,
    },
    NoActiveGhosts,
    NoGhostsNearby,
    InventoryFull,
    GhostCaptured {
        name: String,
        points: u32,
    },
    Ecto1Unlocked {
        position: Option<GeoPoint>,
    },
    Deposited {
        count: usize,
        points: u64,
    },
    InvalidContainmentCode,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventActive { name, .. } => write!(f, "Evento \"{name}\" ativo!"),
            Self::NoActiveGhosts => f.write_str("Nenhum fantasma ativo no momento. Volte mais tarde!"),
            Self::NoGhostsNearby => f.write_str("Não há fantasmas por perto. Explore a área!"),
            Self::InventoryFull => f.write_str("Inventário Cheio!"),
            Self::GhostCaptured { name, points } => {
                write!(f, "{name} capturado! +{points} pontos")
            }
            Self::Ecto1Unlocked { .. } => f.write_str("ECTO-1 desbloqueado!"),
            Self::Deposited { count, points } => {
                write!(f, "{count} fantasmas depositados com sucesso! +{points} pontos")
            }
            Self::InvalidContainmentCode => {
                f.write_str("QR Code inválido! Procure pela unidade de contenção oficial.")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanOutcome {
    Deposited { count: usize, points: u64 },
    Invalid,
}

impl ScanOutcome {
    pub fn notice(&self) -> Notice {
        match self {
            Self::Deposited { count, points } => Notice::Deposited {
                count: *count,
                points: *points,
            },
            Self::Invalid => Notice::InvalidContainmentCode,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaptureResolution {
    pub effects: Vec<CaptureEffect>,
    pub notices: Vec<Notice>,
}

/// One player's hunt. Owns every piece of per-session state; the only shared
/// handle is the store.
pub struct HuntSession {
    store: Arc<dyn DocumentStore>,
    uid: String,
    display_name: String,
    state: GameState,
    capture: CaptureMachine,
    placement: Placement,
    player: Option<GeoPoint>,
    initialized: bool,
}

impl HuntSession {
    pub fn new(store: Arc<dyn DocumentStore>, uid: &str, display_name: &str, rng: Rng) -> Self {
        Self {
            store,
            uid: uid.to_string(),
            display_name: display_name.trim().to_string(),
            state: GameState::new(GameConfig::default(), rng),
            capture: CaptureMachine::new(),
            placement: Placement::new(),
            player: None,
            initialized: false,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Name published to the leaderboard.
    pub fn display_name(&self) -> &str {
        let stored = self.state.user_stats().display_name.trim();
        if !stored.is_empty() {
            stored
        } else if !self.display_name.is_empty() {
            &self.display_name
        } else {
            DEFAULT_DISPLAY_NAME
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn capture_status(&self) -> CaptureStatus {
        self.capture.status()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn restore(&mut self, stats: UserStats) {
        self.state.restore(stats);
    }

    pub async fn select_location(&mut self, name: &str) -> bool {
        self.state.select_location(self.store.as_ref(), name).await
    }

    /// Loads config and the active pool, then spawns the first ghost. The
    /// session stays uninitialized when no ghost is active.
    pub async fn init_game(&mut self, now: NaiveDateTime) -> Vec<Notice> {
        self.state.load_game_config(self.store.as_ref()).await;
        let content = load_active_content(self.store.as_ref(), now).await;
        let mut notices = Vec::new();
        if let Some(event) = &content.event {
            notices.push(Notice::EventActive {
                name: event.name.clone(),
                logo_url: event.logo_url.clone(),
            });
        }
        let pool_empty = content.ghosts.is_empty();
        self.state.set_active_content(content);
        if pool_empty {
            notices.push(Notice::NoActiveGhosts);
            return notices;
        }

        self.initialized = true;
        if self.state.selected_location().is_some() {
            notices.extend(self.respawn());
        } else {
            warn!(uid = %self.uid, "game started without a hunting location");
        }
        info!(uid = %self.uid, "hunt started");
        notices
    }

    pub fn on_gps_update(&mut self, lat: f64, lon: f64) -> ProximityReport {
        let player = GeoPoint { lat, lon };
        self.player = Some(player);
        let report = evaluate(&ProximityInput {
            player,
            ghost: self.state.current_ghost(),
            ecto1: self.state.ecto1_position(),
            ecto1_unlocked: self.state.is_ecto1_unlocked(),
            inventory_full: self.state.is_inventory_full(),
            radius_m: self.state.interaction_radius_m(),
        });
        self.placement.set_object_to_place(report.target);
        report
    }

    pub fn player_position(&self) -> Option<GeoPoint> {
        self.player
    }

    pub fn on_ar_hit(&mut self, hit_visible: bool) -> Option<PlacementDirective> {
        self.placement
            .on_hit(hit_visible, self.state.current_ghost())
    }

    pub fn start_capture(&mut self, now_ms: u64) -> Vec<CaptureEffect> {
        let ctx = CaptureContext {
            ghost_placed: self.placement.is_placed(PlaceTarget::Ghost),
            inventory_full: self.state.is_inventory_full(),
            ghost: self.state.current_ghost(),
        };
        self.capture.start(now_ms, ctx)
    }

    pub fn cancel_capture(&mut self) -> Vec<CaptureEffect> {
        self.capture.cancel()
    }

    pub fn capture_progress(&self, now_ms: u64) -> Option<f64> {
        self.capture.progress(now_ms)
    }

    /// Credits the capture once the hold has lasted long enough. Earlier
    /// calls resolve to nothing.
    pub async fn finish_capture(&mut self, now_ms: u64) -> CaptureResolution {
        let effects = self.capture.complete(now_ms);
        let Some(ghost) = effects.iter().find_map(|effect| match effect {
            CaptureEffect::Captured(ghost) => Some(ghost.clone()),
            _ => None,
        }) else {
            return CaptureResolution::default();
        };

        let notices = self.credit_capture(&ghost, now_ms).await;
        CaptureResolution { effects, notices }
    }

    async fn credit_capture(&mut self, ghost: &SpawnedGhost, now_ms: u64) -> Vec<Notice> {
        let mut notices = vec![Notice::GhostCaptured {
            name: ghost.name.clone(),
            points: ghost.points,
        }];
        self.placement.reset();
        self.state.add_ghost_to_inventory(InventoryItem {
            id: now_ms,
            ghost_name: ghost.name.clone(),
            points: ghost.points,
        });
        let was_unlocked = self.state.is_ecto1_unlocked();
        let stats = self.state.update_user_stats(ghost.points as u64, 1).clone();
        info!(
            uid = %self.uid,
            ghost = %ghost.name,
            points = stats.points,
            captures = stats.captures,
            "ghost captured"
        );

        if stats.ecto1_unlocked && !was_unlocked {
            notices.push(Notice::Ecto1Unlocked {
                position: self.state.ecto1_position(),
            });
        }

        self.persist_progress(&stats).await;
        self.publish_ranking(&stats).await;
        notices.extend(self.respawn());
        notices
    }

    pub async fn on_scan(&mut self, decoded: &str) -> ScanOutcome {
        if decoded.trim() != CONTAINMENT_UNIT_MARKER {
            warn!(uid = %self.uid, "invalid containment code scanned");
            return ScanOutcome::Invalid;
        }

        let points = self.state.inventory_points();
        let count = self.state.clear_inventory().len();
        info!(uid = %self.uid, count, points, "ghosts deposited");
        if let Err(error) = self
            .store
            .update(&format!("users/{}", self.uid), json!({ "inventory": [] }))
            .await
        {
            warn!(uid = %self.uid, %error, "failed to persist emptied inventory");
        }
        let stats = self.state.user_stats().clone();
        self.publish_ranking(&stats).await;
        self.respawn();
        ScanOutcome::Deposited { count, points }
    }

    /// Replaces the live spawn. A full inventory clears it instead.
    fn respawn(&mut self) -> Option<Notice> {
        let spawned = self.state.generate_ghost().is_some();
        if self.state.is_inventory_full() {
            Some(Notice::InventoryFull)
        } else if !spawned {
            Some(Notice::NoGhostsNearby)
        } else {
            None
        }
    }

    async fn persist_progress(&self, stats: &UserStats) {
        let fields = json!({
            "points": stats.points,
            "captures": stats.captures,
            "inventory": self.state.inventory(),
            "ecto1Unlocked": stats.ecto1_unlocked,
            "lastActive": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        if let Err(error) = self
            .store
            .update(&format!("users/{}", self.uid), fields)
            .await
        {
            warn!(uid = %self.uid, %error, "failed to persist player progress");
        }
    }

    async fn publish_ranking(&self, stats: &UserStats) {
        if let Err(error) =
            publish_entry(self.store.as_ref(), &self.uid, self.display_name(), stats).await
        {
            warn!(uid = %self.uid, %error, "failed to update ranking");
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DriverEvent {
    Progress(f64),
    Resolved(CaptureResolution),
}

/// Runs a session's capture on real timers: the completion timer credits the
/// capture by itself and the sampler reports progress. Any interruption
/// disarms both.
pub struct CaptureDriver {
    session: HuntSession,
    timers: CaptureTimers,
    tx: UnboundedSender<CaptureTick>,
    rx: UnboundedReceiver<CaptureTick>,
    origin: Instant,
}

impl CaptureDriver {
    pub fn new(session: HuntSession) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            session,
            timers: CaptureTimers::new(),
            tx,
            rx,
            origin: Instant::now(),
        }
    }

    pub fn session(&self) -> &HuntSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut HuntSession {
        &mut self.session
    }

    pub fn into_session(self) -> HuntSession {
        self.session
    }

    pub fn is_armed(&self) -> bool {
        self.timers.is_armed()
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    pub fn start_capture(&mut self) -> Vec<CaptureEffect> {
        let effects = self.session.start_capture(self.now_ms());
        self.timers.apply(&effects, &self.tx);
        effects
    }

    /// Player released the beam.
    pub fn cancel_capture(&mut self) -> Vec<CaptureEffect> {
        let effects = self.session.cancel_capture();
        self.timers.apply(&effects, &self.tx);
        self.drain_ticks();
        effects
    }

    /// Tracking lost, app hidden or session torn down.
    pub fn interrupt(&mut self) -> Vec<CaptureEffect> {
        let effects = self.session.cancel_capture();
        self.timers.disarm();
        self.drain_ticks();
        effects
    }

    /// Waits for the next progress sample or for the capture to resolve.
    /// `None` when no capture is running.
    pub async fn next_event(&mut self) -> Option<DriverEvent> {
        while self.session.capture_status() == CaptureStatus::Capturing {
            match self.rx.recv().await? {
                CaptureTick::Progress(progress) => return Some(DriverEvent::Progress(progress)),
                CaptureTick::Elapsed => {
                    let resolution = self.session.finish_capture(self.now_ms()).await;
                    if resolution.effects.is_empty() {
                        warn!(uid = %self.session.uid, "capture timer fired early, rearming");
                        let rearm = [CaptureEffect::ScheduleCompletion { after_ms: 1 }];
                        self.timers.apply(&rearm, &self.tx);
                        continue;
                    }
                    self.timers.apply(&resolution.effects, &self.tx);
                    self.drain_ticks();
                    return Some(DriverEvent::Resolved(resolution));
                }
            }
        }
        None
    }

    fn drain_ticks(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::parse_local_datetime;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::time::Duration;

    const PARK_LAT: f64 = -23.5874;
    const PARK_LON: f64 = -46.6576;

    fn seeded_store() -> MemoryStore {
        MemoryStore::from_value(json!({
            "locations": {
                "l1": { "name": "Ibirapuera", "lat": PARK_LAT, "lon": PARK_LON, "huntingRadius": 30.0 }
            },
            "ghosts": {
                "g1": {
                    "name": "Slimer",
                    "type": "fraco",
                    "status": "ativo",
                    "points": 15,
                    "modelUrl": "https://cdn.example/slimer.glb"
                }
            }
        }))
    }

    fn now() -> NaiveDateTime {
        parse_local_datetime("2026-10-31", "20:00").expect("valid time")
    }

    async fn started(store: &MemoryStore) -> HuntSession {
        let mut session = HuntSession::new(Arc::new(store.clone()), "u1", "Egon", Rng::new(3));
        assert!(session.select_location("Ibirapuera").await);
        let notices = session.init_game(now()).await;
        assert!(notices.is_empty(), "notices = {notices:?}");
        session
    }

    async fn capture_one(session: &mut HuntSession, now_ms: u64) -> CaptureResolution {
        let ghost = session.state().current_ghost().cloned().expect("spawned");
        let report = session.on_gps_update(ghost.lat, ghost.lon);
        assert_eq!(report.target, Some(PlaceTarget::Ghost));
        assert!(session.on_ar_hit(true).is_some());
        assert!(!session.start_capture(now_ms).is_empty());
        session.finish_capture(now_ms + ghost.capture_duration_ms).await
    }

    #[tokio::test]
    async fn empty_pool_keeps_session_uninitialized() {
        let store = MemoryStore::new();
        let mut session = HuntSession::new(Arc::new(store), "u1", "Egon", Rng::new(1));
        assert_eq!(session.init_game(now()).await, vec![Notice::NoActiveGhosts]);
        assert!(!session.is_initialized());
    }

    #[tokio::test]
    async fn capture_credits_player_and_persists() {
        let store = seeded_store();
        let mut session = started(&store).await;

        let resolution = capture_one(&mut session, 1_000).await;
        assert_eq!(
            resolution.notices,
            vec![Notice::GhostCaptured {
                name: "Slimer".to_string(),
                points: 15
            }]
        );
        assert_eq!(session.state().inventory().len(), 1);
        assert_eq!(session.state().user_stats().points, 15);
        assert!(!session.placement().is_placed(PlaceTarget::Ghost));
        assert!(session.state().current_ghost().is_some());

        let user = store.get("users/u1").await.expect("read").expect("written");
        assert_eq!(user["points"], json!(15));
        assert_eq!(user["captures"], json!(1));
        assert_eq!(user["inventory"][0]["type"], json!("Slimer"));
        assert!(matches!(user["lastActive"], Value::String(_)));
        assert_eq!(
            store.get("rankings/u1").await.expect("read"),
            Some(json!({ "displayName": "Egon", "points": 15, "captures": 1 }))
        );
    }

    #[tokio::test]
    async fn early_finish_and_cancel_never_credit() {
        let store = seeded_store();
        let mut session = started(&store).await;
        let ghost = session.state().current_ghost().cloned().expect("spawned");
        session.on_gps_update(ghost.lat, ghost.lon);
        session.on_ar_hit(true);

        session.start_capture(0);
        assert_eq!(session.finish_capture(100).await, CaptureResolution::default());
        assert!(!session.cancel_capture().is_empty());
        assert_eq!(
            session.finish_capture(60_000).await,
            CaptureResolution::default()
        );
        assert_eq!(session.state().user_stats().captures, 0);
        assert_eq!(store.get("users/u1").await.expect("read"), None);
    }

    #[tokio::test]
    async fn capture_requires_placement() {
        let store = seeded_store();
        let mut session = started(&store).await;
        assert!(session.start_capture(0).is_empty());
        assert_eq!(session.capture_status(), CaptureStatus::Idle);
    }

    #[tokio::test]
    async fn filling_inventory_unlocks_ecto1_and_stops_spawns() {
        let store = seeded_store();
        let mut session = started(&store).await;
        let mut last = CaptureResolution::default();
        for round in 0..5u64 {
            last = capture_one(&mut session, round * 10_000).await;
        }
        assert!(last.notices.contains(&Notice::InventoryFull));
        assert!(last
            .notices
            .iter()
            .any(|notice| matches!(notice, Notice::Ecto1Unlocked { position: Some(_) })));
        assert!(session.state().is_ecto1_unlocked());
        assert!(session.state().current_ghost().is_none());

        let ecto1 = session.state().ecto1_position().expect("ecto1 placed");
        let report = session.on_gps_update(ecto1.lat, ecto1.lon);
        assert_eq!(report.target, Some(PlaceTarget::Ecto1));
    }

    #[tokio::test]
    async fn scanning_containment_unit_deposits_inventory() {
        let store = seeded_store();
        let mut session = started(&store).await;
        capture_one(&mut session, 0).await;
        capture_one(&mut session, 10_000).await;

        let invalid = session.on_scan("some other code").await;
        assert_eq!(invalid.notice(), Notice::InvalidContainmentCode);
        assert_eq!(session.state().inventory().len(), 2);

        let outcome = session
            .on_scan(&format!("  {CONTAINMENT_UNIT_MARKER}\n"))
            .await;
        assert_eq!(outcome, ScanOutcome::Deposited { count: 2, points: 30 });
        assert!(session.state().inventory().is_empty());
        assert_eq!(session.state().user_stats().points, 30);
        let user = store.get("users/u1").await.expect("read").expect("exists");
        assert!(user
            .get("inventory")
            .and_then(Value::as_array)
            .map_or(true, Vec::is_empty));
    }

    fn aim_at_ghost(session: &mut HuntSession) {
        let ghost = session.state().current_ghost().cloned().expect("spawned");
        session.on_gps_update(ghost.lat, ghost.lon);
        assert!(session.on_ar_hit(true).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn driver_credits_capture_when_timer_elapses() {
        let store = seeded_store();
        let mut driver = CaptureDriver::new(started(&store).await);
        aim_at_ghost(driver.session_mut());

        assert!(!driver.start_capture().is_empty());
        assert!(driver.is_armed());
        let mut samples = Vec::new();
        let resolution = loop {
            match driver.next_event().await.expect("capture running") {
                DriverEvent::Progress(progress) => samples.push(progress),
                DriverEvent::Resolved(resolution) => break resolution,
            }
        };

        assert!(samples.len() >= 40, "samples = {}", samples.len());
        assert!(samples.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(
            resolution.notices[0],
            Notice::GhostCaptured {
                name: "Slimer".to_string(),
                points: 15
            }
        );
        assert!(!driver.is_armed());
        assert_eq!(driver.session().state().user_stats().captures, 1);
        assert_eq!(driver.next_event().await, None);
        let user = store.get("users/u1").await.expect("read").expect("written");
        assert_eq!(user["captures"], json!(1));
    }

    #[tokio::test(start_paused = true)]
    async fn driver_cancel_at_250ms_never_credits() {
        let store = seeded_store();
        let mut driver = CaptureDriver::new(started(&store).await);
        aim_at_ghost(driver.session_mut());

        driver.start_capture();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!driver.cancel_capture().is_empty());
        assert!(!driver.is_armed());
        assert_eq!(driver.session().capture_status(), CaptureStatus::Cancelled);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(driver.next_event().await, None);
        assert_eq!(driver.session().state().user_stats().captures, 0);
        assert_eq!(store.get("users/u1").await.expect("read"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_disarms_timers_and_allows_restart() {
        let store = seeded_store();
        let mut driver = CaptureDriver::new(started(&store).await);
        aim_at_ghost(driver.session_mut());

        driver.start_capture();
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        driver.interrupt();
        assert!(!driver.is_armed());
        assert!(driver.interrupt().is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(driver.session().state().user_stats().captures, 0);

        assert!(!driver.start_capture().is_empty());
        let resolved = loop {
            if let Some(DriverEvent::Resolved(resolution)) = driver.next_event().await {
                break resolution;
            }
        };
        assert!(!resolved.notices.is_empty());
        assert_eq!(driver.into_session().state().user_stats().captures, 1);
    }

    #[test]
    fn notices_render_player_text() {
        assert_eq!(
            Notice::Deposited {
                count: 3,
                points: 45
            }
            .to_string(),
            "3 fantasmas depositados com sucesso! +45 pontos"
        );
        assert_eq!(Notice::InventoryFull.to_string(), "Inventário Cheio!");
    }
}
