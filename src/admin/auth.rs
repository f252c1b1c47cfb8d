use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::constants::ADMIN_INACTIVITY_TIMEOUT_MS;
use crate::error::GameError;
use crate::store::{get_as, DocumentStore};
use crate::types::{AdminProfile, AuditLogEntry, AuthUser};

pub const SUPERADMIN_ROLE: &str = "superadmin";
const IPIFY_URL: &str = "https://api.ipify.org?format=json";

/// Resolves the public address recorded with audit entries.
#[async_trait]
pub trait IpLookup: Send + Sync {
    async fn lookup(&self) -> Result<String, GameError>;
}

#[derive(Deserialize)]
struct IpifyResponse {
    ip: String,
}

#[derive(Clone, Debug)]
pub struct IpifyLookup {
    client: reqwest::Client,
    url: String,
}

impl IpifyLookup {
    pub fn new() -> Result<Self, GameError> {
        Self::with_url(IPIFY_URL)
    }

    pub fn with_url(url: &str) -> Result<Self, GameError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .map_err(|error| GameError::NetworkTransient(error.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl IpLookup for IpifyLookup {
    async fn lookup(&self) -> Result<String, GameError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|error| GameError::NetworkTransient(error.to_string()))?;
        let body: IpifyResponse = response
            .json()
            .await
            .map_err(|error| GameError::NetworkTransient(error.to_string()))?;
        Ok(body.ip)
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Signed-in admin session: privilege checks, audit trail and the
/// inactivity timeout.
pub struct AdminAuth {
    store: Arc<dyn DocumentStore>,
    ip_lookup: Option<Arc<dyn IpLookup>>,
    current: Option<(String, AdminProfile)>,
    last_activity_ms: u64,
}

impl AdminAuth {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            ip_lookup: None,
            current: None,
            last_activity_ms: 0,
        }
    }

    pub fn with_ip_lookup(mut self, lookup: Arc<dyn IpLookup>) -> Self {
        self.ip_lookup = Some(lookup);
        self
    }

    pub fn current_admin(&self) -> Option<&AdminProfile> {
        self.current.as_ref().map(|(_, profile)| profile)
    }

    pub fn current_uid(&self) -> Option<&str> {
        self.current.as_ref().map(|(uid, _)| uid.as_str())
    }

    /// Read failures count as "not an admin".
    pub async fn check_admin(&self, uid: &str) -> bool {
        match self.store.get(&format!("admins/{uid}")).await {
            Ok(record) => record.is_some(),
            Err(error) => {
                warn!(uid, %error, "failed to check admin privileges");
                false
            }
        }
    }

    pub async fn sign_in(&mut self, user: &AuthUser, now_ms: u64) -> Result<AdminProfile, GameError> {
        if !self.check_admin(&user.uid).await {
            self.current = None;
            warn!(uid = %user.uid, "sign-in rejected, not an admin");
            return Err(GameError::Authentication(
                "Acesso negado. Você não tem privilégios administrativos.".to_string(),
            ));
        }

        let path = format!("admins/{}", user.uid);
        let mut profile = get_as::<AdminProfile>(self.store.as_ref(), &path)
            .await?
            .unwrap_or_default();
        let last_login = now_iso();
        if let Err(error) = self
            .store
            .update(&path, json!({ "lastLogin": last_login }))
            .await
        {
            warn!(uid = %user.uid, %error, "failed to record last login");
        }
        profile.last_login = Some(last_login);
        self.current = Some((user.uid.clone(), profile.clone()));
        self.last_activity_ms = now_ms;
        info!(uid = %user.uid, role = ?profile.role, "admin signed in");

        self.log_action(
            &user.uid,
            "login",
            json!({ "email": user.email, "timestamp": now_iso() }),
        )
        .await;
        Ok(profile)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        let Some(profile) = self.current_admin() else {
            return false;
        };
        profile.role.as_deref() == Some(SUPERADMIN_ROLE)
            || profile.permissions.iter().any(|granted| granted == permission)
    }

    pub fn has_all_permissions(&self, required: &[&str]) -> bool {
        self.current.is_some() && required.iter().all(|permission| self.has_permission(permission))
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.last_activity_ms = now_ms;
    }

    /// Signs the admin out after 30 minutes without activity. Returns whether
    /// the session ended.
    pub async fn check_inactivity(&mut self, now_ms: u64) -> bool {
        let Some(uid) = self.current_uid().map(str::to_string) else {
            return false;
        };
        if now_ms.saturating_sub(self.last_activity_ms) < ADMIN_INACTIVITY_TIMEOUT_MS {
            return false;
        }
        self.log_action(
            &uid,
            "auto_logout",
            json!({ "reason": "inactivity", "timestamp": now_iso() }),
        )
        .await;
        self.logout().await;
        true
    }

    pub async fn logout(&mut self) {
        if let Some(uid) = self.current_uid().map(str::to_string) {
            self.log_action(&uid, "logout", json!({ "timestamp": now_iso() }))
                .await;
            info!(uid = %uid, "admin signed out");
        }
        self.current = None;
    }

    /// Appends to `auditLogs`. Never fails the caller.
    pub async fn log_action(&self, admin_id: &str, action: &str, details: Value) {
        if admin_id.is_empty() {
            warn!(action, "audit entry without admin id skipped");
            return;
        }

        let profile = self.current_admin();
        let ip_address = match &self.ip_lookup {
            Some(lookup) => match lookup.lookup().await {
                Ok(ip) => Some(ip),
                Err(error) => {
                    warn!(%error, "failed to resolve client ip");
                    None
                }
            },
            None => None,
        };
        let entry = AuditLogEntry {
            admin_id: admin_id.to_string(),
            action: action.to_string(),
            timestamp: now_iso(),
            details,
            admin_email: profile.and_then(|profile| profile.email.clone()),
            admin_name: profile.and_then(|profile| profile.name.clone()),
            ip_address,
        };

        let value = match serde_json::to_value(&entry) {
            Ok(value) => value,
            Err(error) => {
                warn!(action, %error, "failed to encode audit entry");
                return;
            }
        };
        if let Err(error) = self.store.push("auditLogs", value).await {
            warn!(action, %error, "failed to write audit entry");
        }
    }
}
