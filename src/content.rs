use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::store::{list_as, DocumentStore};
use crate::types::{GameEvent, GhostStatus, GhostTemplate};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ActiveContent {
    #[serde(rename = "activeGhosts")]
    pub ghosts: Vec<GhostTemplate>,
    #[serde(rename = "activeEvent")]
    pub event: Option<GameEvent>,
}

/// Among the events whose window contains `now`, the one that started last
/// wins. Equal starts fall back to the smallest id.
pub fn select_active_event(events: &[GameEvent], now: NaiveDateTime) -> Option<&GameEvent> {
    events
        .iter()
        .filter_map(|event| {
            let (start, end) = event.window()?;
            (now >= start && now <= end).then_some((start, event))
        })
        .max_by(|(start_a, a), (start_b, b)| start_a.cmp(start_b).then_with(|| b.id.cmp(&a.id)))
        .map(|(_, event)| event)
}

pub fn is_ghost_active(ghost: &GhostTemplate, event: Option<&GameEvent>) -> bool {
    if ghost.status != GhostStatus::Ativo {
        return false;
    }
    match event {
        Some(event) => ghost.event_key() == Some(event.id.as_str()),
        None => ghost.event_key().is_none(),
    }
}

pub fn select_active_content(
    events: &[GameEvent],
    ghosts: &[GhostTemplate],
    now: NaiveDateTime,
) -> ActiveContent {
    let event = select_active_event(events, now).cloned();
    let ghosts = ghosts
        .iter()
        .filter(|ghost| is_ghost_active(ghost, event.as_ref()))
        .cloned()
        .collect();
    ActiveContent { ghosts, event }
}

pub async fn fetch_events(store: &dyn DocumentStore) -> Result<Vec<GameEvent>, StoreError> {
    Ok(list_as::<GameEvent>(store, "events")
        .await?
        .into_iter()
        .map(|(key, mut event)| {
            if event.id.is_empty() {
                event.id = key;
            }
            event
        })
        .collect())
}

pub async fn fetch_ghosts(store: &dyn DocumentStore) -> Result<Vec<GhostTemplate>, StoreError> {
    Ok(list_as::<GhostTemplate>(store, "ghosts")
        .await?
        .into_iter()
        .map(|(key, mut ghost)| {
            if ghost.id.is_empty() {
                ghost.id = key;
            }
            ghost
        })
        .collect())
}

/// Reads events and ghosts together. Any read failure yields no content
/// instead of an error.
pub async fn load_active_content(store: &dyn DocumentStore, now: NaiveDateTime) -> ActiveContent {
    let (events, ghosts) = tokio::join!(fetch_events(store), fetch_ghosts(store));
    let (events, ghosts) = match (events, ghosts) {
        (Ok(events), Ok(ghosts)) => (events, ghosts),
        (Err(error), _) | (_, Err(error)) => {
            warn!(%error, "failed to load active content");
            return ActiveContent::default();
        }
    };

    let content = select_active_content(&events, &ghosts, now);
    info!(
        ghost_count = content.ghosts.len(),
        active_event = content.event.as_ref().map(|event| event.name.as_str()).unwrap_or("<none>"),
        "active content loaded"
    );
    content
}
