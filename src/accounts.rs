use serde_json::json;
use tracing::{info, warn};

use crate::constants::{DEFAULT_DISPLAY_NAME, GUEST_DISPLAY_NAME};
use crate::error::StoreError;
use crate::rankings::publish_entry;
use crate::store::{get_as, DocumentStore};
use crate::types::{AuthUser, UserStats};

pub fn default_display_name(user: &AuthUser) -> String {
    if user.is_anonymous {
        return GUEST_DISPLAY_NAME.to_string();
    }
    if let Some(name) = user
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
    {
        return name.to_string();
    }
    if let Some(local) = user
        .email
        .as_deref()
        .and_then(|email| email.split('@').next())
        .filter(|local| !local.is_empty())
    {
        return local.to_string();
    }
    DEFAULT_DISPLAY_NAME.to_string()
}

/// Loads `users/{uid}`, creating a fresh record (and a zeroed ranking entry)
/// on first sign-in.
pub async fn ensure_player(
    store: &dyn DocumentStore,
    user: &AuthUser,
) -> Result<UserStats, StoreError> {
    let path = format!("users/{}", user.uid);
    if let Some(stats) = get_as::<UserStats>(store, &path).await? {
        info!(uid = %user.uid, points = stats.points, "player record loaded");
        return Ok(stats);
    }

    let stats = UserStats {
        display_name: default_display_name(user),
        email: user.email.clone(),
        ..UserStats::default()
    };
    let value = serde_json::to_value(&stats).map_err(|error| StoreError::decode(&path, error))?;
    store.set(&path, value).await?;
    info!(uid = %user.uid, display_name = %stats.display_name, "player record created");

    if let Err(error) = publish_entry(store, &user.uid, &stats.display_name, &stats).await {
        warn!(uid = %user.uid, %error, "failed to add new player to rankings");
    }
    Ok(stats)
}

/// Copies progress from an anonymous record onto a freshly created one.
/// Returns the migrated record, or `None` when there was nothing to migrate,
/// the target already has progress of its own, or the copy failed.
pub async fn migrate_anonymous_data(
    store: &dyn DocumentStore,
    uid: &str,
    anonymous_uid: &str,
) -> Option<UserStats> {
    let anonymous = match get_as::<UserStats>(store, &format!("users/{anonymous_uid}")).await {
        Ok(Some(stats)) => stats,
        Ok(None) => return None,
        Err(error) => {
            warn!(uid, anonymous_uid, %error, "failed to read anonymous record");
            return None;
        }
    };

    let path = format!("users/{uid}");
    let target = match get_as::<UserStats>(store, &path).await {
        Ok(target) => target.unwrap_or_default(),
        Err(error) => {
            warn!(uid, anonymous_uid, %error, "failed to read target record");
            return None;
        }
    };
    if target.points > 0 || target.captures > 0 || !target.inventory.is_empty() {
        warn!(
            uid,
            anonymous_uid,
            points = target.points,
            captures = target.captures,
            "target already has progress, migration skipped"
        );
        return None;
    }

    let fields = json!({
        "points": anonymous.points,
        "captures": anonymous.captures,
        "inventory": anonymous.inventory,
        // ECTO-1 stays unlocked once unlocked.
        "ecto1Unlocked": target.ecto1_unlocked || anonymous.ecto1_unlocked,
    });
    if let Err(error) = store.update(&path, fields).await {
        warn!(uid, anonymous_uid, %error, "failed to migrate anonymous record");
        return None;
    }

    match get_as::<UserStats>(store, &path).await {
        Ok(migrated) => {
            info!(uid, anonymous_uid, "anonymous progress migrated");
            migrated
        }
        Err(error) => {
            warn!(uid, %error, "failed to reload migrated record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::InventoryItem;
    use pretty_assertions::assert_eq;

    fn user(uid: &str) -> AuthUser {
        AuthUser {
            uid: uid.to_string(),
            ..AuthUser::default()
        }
    }

    #[test]
    fn default_names_follow_priority() {
        let mut guest = user("a");
        guest.is_anonymous = true;
        guest.display_name = Some("Ignored".to_string());
        assert_eq!(default_display_name(&guest), "Visitante");

        let mut named = user("b");
        named.display_name = Some("Egon Spengler".to_string());
        named.email = Some("egon@example.com".to_string());
        assert_eq!(default_display_name(&named), "Egon Spengler");

        let mut mailed = user("c");
        mailed.email = Some("ray@example.com".to_string());
        assert_eq!(default_display_name(&mailed), "ray");

        assert_eq!(default_display_name(&user("d")), "Caça-Fantasma");
    }

    #[tokio::test]
    async fn first_sign_in_creates_record_and_ranking() {
        let store = MemoryStore::new();
        let mut egon = user("u1");
        egon.email = Some("egon@example.com".to_string());

        let stats = ensure_player(&store, &egon).await.expect("created");
        assert_eq!(stats.display_name, "egon");
        assert_eq!(stats.level, 1);
        assert_eq!(
            store.get("rankings/u1").await.expect("read"),
            Some(json!({ "displayName": "egon", "points": 0, "captures": 0 }))
        );
        let stored = store.get("users/u1").await.expect("read").expect("exists");
        assert_eq!(stored["ecto1Unlocked"], json!(false));
    }

    #[tokio::test]
    async fn returning_player_keeps_progress() {
        let store = MemoryStore::from_value(json!({
            "users": { "u1": { "displayName": "Ray", "points": 70, "captures": 7, "ecto1Unlocked": true } }
        }));
        let stats = ensure_player(&store, &user("u1")).await.expect("loaded");
        assert_eq!(stats.points, 70);
        assert!(stats.ecto1_unlocked);
        assert_eq!(store.get("rankings/u1").await.expect("read"), None);
    }

    #[tokio::test]
    async fn ranking_failure_does_not_block_sign_in() {
        let store = MemoryStore::new();
        store.deny("rankings").expect("deny");
        let stats = ensure_player(&store, &user("u1")).await.expect("created");
        assert_eq!(stats.display_name, "Caça-Fantasma");
    }

    #[tokio::test]
    async fn migration_copies_progress_fields() {
        let store = MemoryStore::from_value(json!({
            "users": {
                "anon": {
                    "displayName": "Visitante",
                    "points": 20,
                    "captures": 2,
                    "inventory": [{ "id": 1, "type": "Slimer", "points": 10 }],
                    "ecto1Unlocked": false
                },
                "u1": { "displayName": "Peter", "email": "peter@example.com" }
            }
        }));
        let migrated = migrate_anonymous_data(&store, "u1", "anon")
            .await
            .expect("migrated");
        assert_eq!(migrated.display_name, "Peter");
        assert_eq!(migrated.points, 20);
        assert_eq!(
            migrated.inventory,
            vec![InventoryItem {
                id: 1,
                ghost_name: "Slimer".to_string(),
                points: 10
            }]
        );
        assert!(migrate_anonymous_data(&store, "u1", "nobody").await.is_none());
    }

    #[tokio::test]
    async fn migration_never_overwrites_existing_progress() {
        let store = MemoryStore::from_value(json!({
            "users": {
                "anon": { "displayName": "Visitante", "points": 0, "captures": 0 },
                "u1": {
                    "displayName": "Winston",
                    "points": 500,
                    "captures": 12,
                    "ecto1Unlocked": true
                }
            }
        }));
        assert!(migrate_anonymous_data(&store, "u1", "anon").await.is_none());

        let stored = store.get("users/u1").await.expect("read").expect("exists");
        assert_eq!(stored["points"], json!(500));
        assert_eq!(stored["captures"], json!(12));
        assert_eq!(stored["ecto1Unlocked"], json!(true));
    }

    #[tokio::test]
    async fn migration_keeps_ecto1_latch_of_fresh_target() {
        let store = MemoryStore::from_value(json!({
            "users": {
                "anon": { "points": 30, "captures": 3, "ecto1Unlocked": false },
                "u1": { "displayName": "Janine", "ecto1Unlocked": true }
            }
        }));
        let migrated = migrate_anonymous_data(&store, "u1", "anon")
            .await
            .expect("migrated");
        assert_eq!(migrated.points, 30);
        assert!(migrated.ecto1_unlocked);
    }
}
