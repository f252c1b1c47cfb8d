use chrono::{SecondsFormat, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::{DEFAULT_DISPLAY_NAME, RANKING_LIMIT, RANKING_LIMIT_MAX};
use crate::error::StoreError;
use crate::store::{get_as, DocumentStore, OrderedQuery};
use crate::types::{RankingEntry, UserStats};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RankedPlayer {
    pub uid: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub points: u64,
    pub captures: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct RankingBoard {
    #[serde(rename = "generatedAtIso")]
    pub generated_at_iso: String,
    pub entries: Vec<RankedPlayer>,
}

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("permission denied reading {0}")]
    Permission(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RankingError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::PermissionDenied(path) => Self::Permission(path),
            other => Self::Store(other),
        }
    }
}

impl RankingError {
    /// Lines shown in place of the leaderboard.
    pub fn remediation(&self) -> Vec<String> {
        match self {
            Self::Permission(_) => vec![
                "Erro de permissão ao acessar rankings.".to_string(),
                "Para resolver este problema, um administrador precisa:".to_string(),
                "1. Atualizar as regras do banco de dados para permitir leitura de rankings"
                    .to_string(),
                "2. Ou criar um caminho 'rankings' com dados agregados".to_string(),
            ],
            Self::Store(_) => vec!["Erro ao carregar rankings.".to_string()],
        }
    }
}

pub fn normalize_limit(requested: Option<usize>) -> usize {
    requested.unwrap_or(RANKING_LIMIT).clamp(1, RANKING_LIMIT_MAX)
}

/// Reads the `rankings` projection, falling back to `users` when it is
/// empty or unreadable. The fallback skips players without points.
pub async fn load_rankings(
    store: &dyn DocumentStore,
    limit: usize,
) -> Result<Vec<RankedPlayer>, RankingError> {
    let query = OrderedQuery::last("points", limit);
    match store.query("rankings", &query).await {
        Ok(rows) if !rows.is_empty() => {
            return Ok(resolve_rows(store, rows, false, limit).await);
        }
        Ok(_) => debug!("rankings path empty, reading users"),
        Err(error) => warn!(%error, "failed to read rankings path, reading users"),
    }

    let rows = store.query("users", &query).await?;
    Ok(resolve_rows(store, rows, true, limit).await)
}

pub async fn build_board(
    store: &dyn DocumentStore,
    requested_limit: Option<usize>,
) -> Result<RankingBoard, RankingError> {
    let entries = load_rankings(store, normalize_limit(requested_limit)).await?;
    Ok(RankingBoard {
        generated_at_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        entries,
    })
}

async fn resolve_rows(
    store: &dyn DocumentStore,
    rows: Vec<(String, Value)>,
    require_points: bool,
    limit: usize,
) -> Vec<RankedPlayer> {
    let candidates: Vec<(String, RankingEntry)> = rows
        .into_iter()
        .filter_map(|(uid, raw)| match serde_json::from_value::<RankingEntry>(raw) {
            Ok(entry) => Some((uid, entry)),
            Err(error) => {
                warn!(uid = %uid, %error, "skipping undecodable ranking row");
                None
            }
        })
        .filter(|(_, entry)| !require_points || entry.points > 0)
        .collect();

    let names = join_all(candidates.iter().map(|(uid, entry)| {
        resolve_display_name(store, uid, Some(entry.display_name.as_str()))
    }))
    .await;

    let mut players: Vec<RankedPlayer> = candidates
        .into_iter()
        .zip(names)
        .map(|((uid, entry), display_name)| RankedPlayer {
            uid,
            display_name,
            points: entry.points,
            captures: entry.captures,
        })
        .collect();
    sort_players(&mut players);
    players.truncate(limit);
    players
}

pub fn sort_players(players: &mut [RankedPlayer]) {
    players.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| b.captures.cmp(&a.captures))
            .then_with(|| {
                a.display_name
                    .to_lowercase()
                    .cmp(&b.display_name.to_lowercase())
            })
    });
}

/// Cached non-default name, then profile name, then email local part.
pub async fn resolve_display_name(
    store: &dyn DocumentStore,
    uid: &str,
    cached: Option<&str>,
) -> String {
    if let Some(name) = cached
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != DEFAULT_DISPLAY_NAME)
    {
        return name.to_string();
    }

    match get_as::<UserStats>(store, &format!("users/{uid}")).await {
        Ok(Some(profile)) => {
            if !profile.display_name.trim().is_empty() {
                return profile.display_name;
            }
            if let Some(local) = profile
                .email
                .as_deref()
                .filter(|email| email.contains('@'))
                .and_then(|email| email.split('@').next())
            {
                return local.to_string();
            }
        }
        Ok(None) => {}
        Err(error) => warn!(uid, %error, "failed to read player profile"),
    }
    DEFAULT_DISPLAY_NAME.to_string()
}

pub async fn publish_entry(
    store: &dyn DocumentStore,
    uid: &str,
    display_name: &str,
    stats: &UserStats,
) -> Result<(), StoreError> {
    store
        .set(
            &format!("rankings/{uid}"),
            json!({
                "displayName": display_name,
                "points": stats.points,
                "captures": stats.captures,
            }),
        )
        .await
}

pub fn render_lines(board: &[RankedPlayer], current_uid: Option<&str>) -> Vec<String> {
    if board.is_empty() {
        return vec!["Nenhum jogador encontrado.".to_string()];
    }
    board
        .iter()
        .enumerate()
        .map(|(index, player)| {
            let marker = if current_uid == Some(player.uid.as_str()) {
                " <- você"
            } else {
                ""
            };
            format!(
                "{}. {} {} pts ({} capturas){marker}",
                index + 1,
                player.display_name,
                player.points,
                player.captures
            )
        })
        .collect()
}
