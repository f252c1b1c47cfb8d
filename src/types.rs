use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GhostType {
    Fraco,
    Medio,
    Forte,
    #[default]
    Unknown,
}

impl GhostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fraco => "fraco",
            Self::Medio => "medio",
            Self::Forte => "forte",
            Self::Unknown => "unknown",
        }
    }
}

impl From<String> for GhostType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "fraco" => Self::Fraco,
            "medio" => Self::Medio,
            "forte" => Self::Forte,
            _ => Self::Unknown,
        }
    }
}

impl From<GhostType> for String {
    fn from(value: GhostType) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GhostStatus {
    Ativo,
    #[default]
    Inativo,
}

impl From<String> for GhostStatus {
    fn from(value: String) -> Self {
        if value == "ativo" {
            Self::Ativo
        } else {
            Self::Inativo
        }
    }
}

impl From<GhostStatus> for String {
    fn from(value: GhostStatus) -> Self {
        match value {
            GhostStatus::Ativo => "ativo".to_string(),
            GhostStatus::Inativo => "inativo".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Behavior {
    Orbit,
    Stationary,
}

impl Behavior {
    pub fn animates(&self) -> bool {
        matches!(self, Self::Orbit)
    }
}

impl From<String> for Behavior {
    fn from(value: String) -> Self {
        if value == "orbit" {
            Self::Orbit
        } else {
            Self::Stationary
        }
    }
}

impl From<Behavior> for String {
    fn from(value: Behavior) -> Self {
        match value {
            Behavior::Orbit => "orbit".to_string(),
            Behavior::Stationary => "stationary".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GhostTemplate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub ghost_type: GhostType,
    #[serde(default)]
    pub status: GhostStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<Behavior>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
    #[serde(rename = "modelUrl", default)]
    pub model_url: String,
    #[serde(rename = "eventId", default)]
    pub event_id: Option<String>,
}

impl GhostTemplate {
    pub fn event_key(&self) -> Option<&str> {
        self.event_id.as_deref().filter(|id| !id.is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "startDate", default)]
    pub start_date: String,
    #[serde(rename = "startTime", default)]
    pub start_time: String,
    #[serde(rename = "endDate", default)]
    pub end_date: String,
    #[serde(rename = "endTime", default)]
    pub end_time: String,
    #[serde(rename = "logoUrl", default)]
    pub logo_url: Option<String>,
}

impl GameEvent {
    /// Inclusive local wall-clock window, `None` when either end is malformed.
    pub fn window(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let start = parse_local_datetime(&self.start_date, &self.start_time)?;
        let end = parse_local_datetime(&self.end_date, &self.end_time)?;
        Some((start, end))
    }

    pub fn is_active_at(&self, now: NaiveDateTime) -> bool {
        self.window()
            .is_some_and(|(start, end)| now >= start && now <= end)
    }
}

pub fn parse_local_datetime(date: &str, time: &str) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    let time = time.trim();
    let time = NaiveTime::parse_from_str(time, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
        .ok()?;
    Some(date.and_time(time))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "huntingRadius", default, skip_serializing_if = "Option::is_none")]
    pub hunting_radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl Location {
    pub fn is_active(&self) -> bool {
        self.active != Some(false)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: u64,
    #[serde(rename = "type")]
    pub ghost_name: String,
    pub points: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub timestamp: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub captures: u32,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
    #[serde(rename = "ecto1Unlocked", default)]
    pub ecto1_unlocked: bool,
    #[serde(rename = "lastActive", default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<String>,
    #[serde(
        rename = "captureHistory",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub capture_history: Option<Vec<CaptureRecord>>,
}

fn default_level() -> u32 {
    1
}

impl Default for UserStats {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            email: None,
            points: 0,
            captures: 0,
            level: 1,
            inventory: Vec::new(),
            ecto1_unlocked: false,
            last_active: None,
            capture_history: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub captures: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    #[serde(rename = "adminId")]
    pub admin_id: String,
    pub action: String,
    pub timestamp: String,
    #[serde(default)]
    pub details: Value,
    #[serde(rename = "adminEmail", default, skip_serializing_if = "Option::is_none")]
    pub admin_email: Option<String>,
    #[serde(rename = "adminName", default, skip_serializing_if = "Option::is_none")]
    pub admin_name: Option<String>,
    #[serde(rename = "ipAddress", default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdminProfile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(rename = "lastLogin", default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
}

/// Identity handed over by the sign-in collaborator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub is_anonymous: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpawnedGhost {
    pub lat: f64,
    pub lon: f64,
    pub name: String,
    #[serde(rename = "type")]
    pub ghost_type: GhostType,
    pub points: u32,
    #[serde(rename = "modelUrl")]
    pub model_url: String,
    #[serde(rename = "captureDuration")]
    pub capture_duration_ms: u64,
    pub behavior: Behavior,
    pub scale: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceTarget {
    Ghost,
    Ecto1,
}
