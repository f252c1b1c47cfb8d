use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::constants::{DASHBOARD_ACTIVE_WINDOW_MS, DASHBOARD_RECENT_ACTIVITY};
use crate::error::GameError;
use crate::store::{decode_children, list_as, DocumentStore, OrderedQuery};
use crate::types::{AuditLogEntry, UserStats};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DashboardMetrics {
    #[serde(rename = "totalUsers")]
    pub total_users: usize,
    #[serde(rename = "activeUsers")]
    pub active_users: usize,
    #[serde(rename = "ghostsCaptured")]
    pub ghosts_captured: u64,
    #[serde(rename = "ecto1Unlocked")]
    pub ecto1_unlocked: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActivityItem {
    pub id: String,
    pub action: String,
    pub description: String,
    pub actor: String,
    #[serde(rename = "timeAgo")]
    pub time_ago: String,
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

pub fn compute_metrics(users: &[UserStats], now: DateTime<Utc>) -> DashboardMetrics {
    let cutoff = now - Duration::milliseconds(DASHBOARD_ACTIVE_WINDOW_MS);
    let is_recent = |raw: &str| parse_timestamp(raw).is_some_and(|at| at > cutoff);

    let active_users = users
        .iter()
        .filter(|user| user.last_active.as_deref().is_some_and(is_recent))
        .count();
    // Without a capture history only the lifetime total is known.
    let ghosts_captured = users
        .iter()
        .filter(|user| user.captures > 0)
        .map(|user| match &user.capture_history {
            Some(history) => history
                .iter()
                .filter(|capture| is_recent(&capture.timestamp))
                .count() as u64,
            None => user.captures as u64,
        })
        .sum();

    DashboardMetrics {
        total_users: users.len(),
        active_users,
        ghosts_captured,
        ecto1_unlocked: users.iter().filter(|user| user.ecto1_unlocked).count(),
    }
}

pub async fn load_metrics(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
) -> Result<DashboardMetrics, GameError> {
    let users: Vec<UserStats> = list_as::<UserStats>(store, "users")
        .await?
        .into_iter()
        .map(|(_, user)| user)
        .collect();
    Ok(compute_metrics(&users, now))
}

/// Newest audit entries first.
pub async fn load_recent_activity(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
) -> Result<Vec<ActivityItem>, GameError> {
    let rows = store
        .query(
            "auditLogs",
            &OrderedQuery::last("timestamp", DASHBOARD_RECENT_ACTIVITY),
        )
        .await?;
    let object = rows.into_iter().collect::<serde_json::Map<_, _>>();
    let mut entries = decode_children::<AuditLogEntry>("auditLogs", object.into());
    entries.sort_by(|(_, a), (_, b)| {
        parse_timestamp(&b.timestamp).cmp(&parse_timestamp(&a.timestamp))
    });

    Ok(entries
        .into_iter()
        .map(|(id, entry)| ActivityItem {
            description: format_action(&entry),
            actor: entry
                .admin_name
                .clone()
                .or_else(|| entry.admin_email.clone())
                .unwrap_or_else(|| "Sistema".to_string()),
            time_ago: parse_timestamp(&entry.timestamp)
                .map(|at| format_time_ago(at, now))
                .unwrap_or_default(),
            action: entry.action,
            id,
        })
        .collect())
}

pub fn format_action(entry: &AuditLogEntry) -> String {
    let admin = entry
        .admin_name
        .as_deref()
        .or(entry.admin_email.as_deref())
        .unwrap_or("Um administrador");
    match entry.action.as_str() {
        "login" => format!("{admin} fez login."),
        "logout" => format!("{admin} fez logout."),
        "auto_logout" => format!("{admin} foi desconectado por inatividade."),
        "update_game_config" => format!("{admin} atualizou as configurações do jogo."),
        "reset_game_config" => format!("{admin} redefiniu as configurações para o padrão."),
        "export_game_config" => format!("{admin} exportou as configurações do jogo."),
        "import_game_config" => format!("{admin} importou novas configurações."),
        "update_rankings" => format!("{admin} atualizou os rankings manualmente."),
        other => format!("Ação desconhecida: {other}"),
    }
}

pub fn format_time_ago(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    // Skewed client clocks can stamp entries slightly in the future.
    let elapsed_ms = (now - at).num_milliseconds().max(0);
    let seconds = (elapsed_ms as f64 / 1000.0).round();
    let minutes = (seconds / 60.0).round();
    let hours = (minutes / 60.0).round();
    let days = (hours / 24.0).round();

    if seconds < 60.0 {
        format!("há {seconds} seg")
    } else if minutes < 60.0 {
        format!("há {minutes} min")
    } else if hours < 24.0 {
        format!("há {hours}h")
    } else {
        format!("há {days}d")
    }
}
