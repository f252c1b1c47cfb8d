use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use rand::distr::Alphanumeric;
use rand::Rng as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::StoreError;
use crate::server_utils::now_ms;

pub type SnapshotCallback = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryLimit {
    First(usize),
    Last(usize),
}

/// Children of a path ordered ascending by one child field, then by key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderedQuery {
    pub order_by_child: String,
    pub limit: QueryLimit,
}

impl OrderedQuery {
    pub fn last(child: &str, count: usize) -> Self {
        Self {
            order_by_child: child.to_string(),
            limit: QueryLimit::Last(count),
        }
    }

    pub fn first(child: &str, count: usize) -> Self {
        Self {
            order_by_child: child.to_string(),
            limit: QueryLimit::First(count),
        }
    }
}

/// Hierarchical JSON document store addressed by slash-separated paths.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Replaces the value at `path`. Writing `null` removes it.
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Writes each field of `fields` below `path`; keys may contain `/`.
    async fn update(&self, path: &str, fields: Value) -> Result<(), StoreError>;

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.set(path, Value::Null).await
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        let key = generate_push_key();
        self.set(&format!("{}/{key}", path.trim_end_matches('/')), value)
            .await?;
        Ok(key)
    }

    async fn query(
        &self,
        path: &str,
        query: &OrderedQuery,
    ) -> Result<Vec<(String, Value)>, StoreError>;

    /// Delivers the current snapshot immediately and again after every change
    /// at or below `path`. Delivery stops when the handle is cancelled or dropped.
    fn subscribe(&self, path: &str, callback: SnapshotCallback) -> Subscription;
}

pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

pub async fn get_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    path: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(path).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|error| StoreError::decode(path, error)),
        None => Ok(None),
    }
}

/// Decodes every child of `path`, skipping children that do not decode.
pub async fn list_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    path: &str,
) -> Result<Vec<(String, T)>, StoreError> {
    let Some(value) = store.get(path).await? else {
        return Ok(Vec::new());
    };
    Ok(decode_children(path, value))
}

pub fn decode_children<T: DeserializeOwned>(path: &str, value: Value) -> Vec<(String, T)> {
    let Value::Object(children) = value else {
        return Vec::new();
    };
    children
        .into_iter()
        .filter_map(|(key, raw)| match serde_json::from_value::<T>(raw) {
            Ok(decoded) => Some((key, decoded)),
            Err(error) => {
                warn!(path, key = %key, %error, "skipping undecodable child");
                None
            }
        })
        .collect()
}

pub fn generate_push_key() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("{:013}{suffix}", now_ms())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u8,
    root: Value,
}

struct Listener {
    id: u64,
    segments: Vec<String>,
    callback: SnapshotCallback,
}

struct MemoryStoreInner {
    root: RwLock<Value>,
    listeners: Mutex<Vec<Listener>>,
    denied_prefixes: RwLock<Vec<Vec<String>>>,
    next_listener_id: AtomicU64,
    file_path: Option<PathBuf>,
}

/// In-process store, optionally mirrored to a JSON file after every write.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::build(Value::Object(Map::new()), None)
    }

    pub fn with_file(file_path: PathBuf) -> Self {
        let root = load_root(&file_path);
        Self::build(root, Some(file_path))
    }

    pub fn from_value(root: Value) -> Self {
        Self::build(strip_nulls(root), None)
    }

    fn build(root: Value, file_path: Option<PathBuf>) -> Self {
        let root = if root.is_object() {
            root
        } else {
            Value::Object(Map::new())
        };
        Self {
            inner: Arc::new(MemoryStoreInner {
                root: RwLock::new(root),
                listeners: Mutex::new(Vec::new()),
                denied_prefixes: RwLock::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                file_path,
            }),
        }
    }

    /// Rejects reads and writes at or below `path`, the way security rules do.
    pub fn deny(&self, path: &str) -> Result<(), StoreError> {
        let segments = split_path(path)?;
        self.inner
            .denied_prefixes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(segments);
        Ok(())
    }

    pub fn snapshot(&self) -> Value {
        self.read_root().clone()
    }

    fn read_root(&self) -> std::sync::RwLockReadGuard<'_, Value> {
        self.inner
            .root
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_access(&self, path: &str, segments: &[String]) -> Result<(), StoreError> {
        let denied = self
            .inner
            .denied_prefixes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // A path above a denied prefix covers it as well.
        if denied
            .iter()
            .any(|prefix| segments.starts_with(prefix) || prefix.starts_with(segments))
        {
            return Err(StoreError::PermissionDenied(path.to_string()));
        }
        Ok(())
    }

    fn check_write(&self, path: &str, segments: &[String]) -> Result<(), StoreError> {
        if segments.is_empty() {
            return Err(StoreError::InvalidPath(format!(
                "refusing to replace the root via {path:?}"
            )));
        }
        self.check_access(path, segments)
    }

    fn write(&self, writes: Vec<(Vec<String>, Value)>) {
        {
            let mut root = self
                .inner
                .root
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            for (segments, value) in &writes {
                write_at(&mut root, segments, strip_nulls(value.clone()));
            }
        }
        self.save();
        let touched: Vec<Vec<String>> = writes.into_iter().map(|(segments, _)| segments).collect();
        self.notify(&touched);
    }

    fn notify(&self, touched: &[Vec<String>]) {
        let targets: Vec<(Vec<String>, SnapshotCallback)> = {
            let listeners = self
                .inner
                .listeners
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            listeners
                .iter()
                .filter(|listener| {
                    touched.iter().any(|segments| {
                        segments.starts_with(&listener.segments)
                            || listener.segments.starts_with(segments)
                    })
                })
                .map(|listener| (listener.segments.clone(), listener.callback.clone()))
                .collect()
        };
        for (segments, callback) in targets {
            let value = lookup(&self.read_root(), &segments)
                .cloned()
                .unwrap_or(Value::Null);
            callback(value);
        }
    }

    fn save(&self) {
        let Some(file_path) = &self.inner.file_path else {
            return;
        };
        if let Some(parent) = file_path.parent() {
            if let Err(error) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), %error, "failed to create store directory");
                return;
            }
        }

        let payload = StoreFile {
            version: 1,
            root: self.snapshot(),
        };
        match serde_json::to_string_pretty(&payload) {
            Ok(text) => {
                if let Err(error) = fs::write(file_path, text) {
                    warn!(path = %file_path.display(), %error, "failed to write store file");
                }
            }
            Err(error) => {
                warn!(path = %file_path.display(), %error, "failed to serialize store");
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = split_path(path)?;
        self.check_access(path, &segments)?;
        Ok(lookup(&self.read_root(), &segments).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let segments = split_path(path)?;
        self.check_write(path, &segments)?;
        self.write(vec![(segments, value)]);
        Ok(())
    }

    async fn update(&self, path: &str, fields: Value) -> Result<(), StoreError> {
        let base = split_path(path)?;
        let Value::Object(fields) = fields else {
            return Err(StoreError::InvalidPath(format!(
                "update at {path} needs an object"
            )));
        };
        let mut writes = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            let mut segments = base.clone();
            let relative = split_path(&key)?;
            if relative.is_empty() {
                return Err(StoreError::InvalidPath(format!("empty field key at {path}")));
            }
            segments.extend(relative);
            self.check_write(&format!("{path}/{key}"), &segments)?;
            writes.push((segments, value));
        }
        self.write(writes);
        Ok(())
    }

    async fn query(
        &self,
        path: &str,
        query: &OrderedQuery,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let segments = split_path(path)?;
        self.check_access(path, &segments)?;
        let children = match lookup(&self.read_root(), &segments) {
            Some(Value::Object(children)) => children.clone(),
            _ => return Ok(Vec::new()),
        };

        let mut rows: Vec<(String, Value)> = children.into_iter().collect();
        rows.sort_by(|(key_a, a), (key_b, b)| {
            cmp_child(
                a.get(&query.order_by_child),
                b.get(&query.order_by_child),
            )
            .then_with(|| key_a.cmp(key_b))
        });
        match query.limit {
            QueryLimit::First(count) => rows.truncate(count),
            QueryLimit::Last(count) => {
                let skip = rows.len().saturating_sub(count);
                rows.drain(..skip);
            }
        }
        Ok(rows)
    }

    fn subscribe(&self, path: &str, callback: SnapshotCallback) -> Subscription {
        let segments = match split_path(path) {
            Ok(segments) => segments,
            Err(error) => {
                warn!(path, %error, "subscription rejected");
                return Subscription::new(|| {});
            }
        };
        if let Err(error) = self.check_access(path, &segments) {
            warn!(path, %error, "subscription rejected");
            return Subscription::new(|| {});
        }

        let id = self
            .inner
            .next_listener_id
            .fetch_add(1, AtomicOrdering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Listener {
                id,
                segments: segments.clone(),
                callback: callback.clone(),
            });

        let current = lookup(&self.read_root(), &segments)
            .cloned()
            .unwrap_or(Value::Null);
        callback(current);

        let inner = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner
                    .listeners
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .retain(|listener| listener.id != id);
            }
        })
    }
}

fn split_path(path: &str) -> Result<Vec<String>, StoreError> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        if segment
            .chars()
            .any(|ch| matches!(ch, '.' | '#' | '$' | '[' | ']'))
        {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        segments.push(segment.to_string());
    }
    Ok(segments)
}

fn lookup<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

fn write_at(node: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = if value.is_null() {
            Value::Object(Map::new())
        } else {
            value
        };
        return;
    };
    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Some(map) = node.as_object_mut() else {
        return;
    };

    if rest.is_empty() {
        if value.is_null() {
            map.remove(head);
        } else {
            map.insert(head.clone(), value);
        }
        return;
    }
    if value.is_null() && !map.contains_key(head) {
        return;
    }

    let now_empty = {
        let child = map
            .entry(head.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        write_at(child, rest, value);
        child.as_object().is_some_and(Map::is_empty)
    };
    if now_empty {
        map.remove(head);
    }
}

fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, child)| !child.is_null())
                .map(|(key, child)| (key, strip_nulls(child)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) | Some(Value::Object(_)) => 4,
    }
}

fn cmp_child(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let a = a.as_f64().unwrap_or(0.0);
            let b = b.as_f64().unwrap_or(0.0);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

fn load_root(path: &Path) -> Value {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), %error, "failed to read store file");
            }
            return Value::Object(Map::new());
        }
    };
    match serde_json::from_str::<StoreFile>(&text) {
        Ok(file) if file.version == 1 => strip_nulls(file.root),
        Ok(file) => {
            warn!(path = %path.display(), version = file.version, "unsupported store version");
            Value::Object(Map::new())
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to parse store file");
            Value::Object(Map::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn temp_file(name: &str) -> PathBuf {
        let unique = format!(
            "{}-{}-{}",
            name,
            std::process::id(),
            now_ms().saturating_add(rand::random::<u32>() as u64)
        );
        std::env::temp_dir().join(unique).join("store.json")
    }

    #[tokio::test]
    async fn set_get_and_remove_prune_empty_parents() {
        let store = MemoryStore::new();
        store
            .set("users/u1", json!({ "points": 10, "email": null }))
            .await
            .expect("set");
        assert_eq!(
            store.get("users/u1").await.expect("get"),
            Some(json!({ "points": 10 }))
        );

        store.remove("users/u1").await.expect("remove");
        assert_eq!(store.get("users/u1").await.expect("get"), None);
        assert_eq!(store.snapshot(), json!({}));
    }

    #[tokio::test]
    async fn update_merges_fields_and_nested_keys() {
        let store = MemoryStore::new();
        store
            .set("users/u1", json!({ "points": 1, "captures": 1, "level": 1 }))
            .await
            .expect("set");
        store
            .update("users/u1", json!({ "points": 20, "stats/streak": 2 }))
            .await
            .expect("update");
        assert_eq!(
            store.get("users/u1").await.expect("get"),
            Some(json!({ "points": 20, "captures": 1, "level": 1, "stats": { "streak": 2 } }))
        );
    }

    #[tokio::test]
    async fn push_generates_sortable_unique_keys() {
        let store = MemoryStore::new();
        let a = store.push("auditLogs", json!({ "action": "a" })).await.expect("push");
        let b = store.push("auditLogs", json!({ "action": "b" })).await.expect("push");
        assert_ne!(a, b);
        let all = store.get("auditLogs").await.expect("get").expect("exists");
        assert_eq!(all.as_object().map(|map| map.len()), Some(2));
    }

    #[tokio::test]
    async fn query_orders_ascending_and_limits() {
        let store = MemoryStore::from_value(json!({
            "rankings": {
                "u1": { "points": 100 },
                "u2": { "points": 50 },
                "u3": { "points": 200 },
                "u4": {}
            }
        }));
        let first = store
            .query("rankings", &OrderedQuery::first("points", 2))
            .await
            .expect("query");
        let keys: Vec<&str> = first.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, vec!["u4", "u2"]);

        let last = store
            .query("rankings", &OrderedQuery::last("points", 2))
            .await
            .expect("query");
        let keys: Vec<&str> = last.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, vec!["u1", "u3"]);
    }

    #[tokio::test]
    async fn denied_paths_reject_reads() {
        let store = MemoryStore::new();
        store.deny("users").expect("deny");
        let error = store.get("users/u1").await.expect_err("denied");
        assert!(matches!(error, StoreError::PermissionDenied(_)));
        assert!(store.get("rankings").await.is_ok());
    }

    #[tokio::test]
    async fn writes_covering_a_denied_path_are_rejected() {
        let store = MemoryStore::new();
        store
            .set("users/u1", json!({ "points": 10 }))
            .await
            .expect("seed");
        store.deny("users/u1").expect("deny");

        let error = store
            .set("users", json!({ "u1": { "points": 0 } }))
            .await
            .expect_err("parent write denied");
        assert!(matches!(error, StoreError::PermissionDenied(_)));
        let error = store
            .update("", json!({ "users/u1/points": 0 }))
            .await
            .expect_err("multi-path write denied");
        assert!(matches!(error, StoreError::PermissionDenied(_)));
        assert_eq!(store.snapshot()["users"]["u1"]["points"], 10);

        store
            .update("", json!({ "ghosts/g1/name": "Slimer" }))
            .await
            .expect("unrelated multi-path write");
        assert_eq!(store.snapshot()["ghosts"]["g1"]["name"], "Slimer");
    }

    #[tokio::test]
    async fn root_cannot_be_replaced() {
        let store = MemoryStore::new();
        store.set("ghosts/g1", json!({ "name": "Slimer" })).await.expect("seed");

        for path in ["", "/", " // "] {
            let error = store
                .set(path, json!({ "admins": { "x": { "role": "superadmin" } } }))
                .await
                .expect_err("root write rejected");
            assert!(matches!(error, StoreError::InvalidPath(_)));
        }
        let error = store
            .update("users", json!({ "": 1 }))
            .await
            .expect_err("empty field key");
        assert!(matches!(error, StoreError::InvalidPath(_)));
        assert_eq!(store.snapshot(), json!({ "ghosts": { "g1": { "name": "Slimer" } } }));
    }

    #[tokio::test]
    async fn invalid_segments_are_rejected() {
        let store = MemoryStore::new();
        let error = store.set("ghosts/a.b", json!(1)).await.expect_err("invalid");
        assert!(matches!(error, StoreError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn subscription_receives_full_snapshots_until_cancelled() {
        let store = MemoryStore::new();
        let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
        let sink = seen.clone();
        let subscription = store.subscribe(
            "ghosts",
            Arc::new(move |value| sink.lock().expect("lock").push(value)),
        );

        store.set("ghosts/g1", json!({ "name": "Slimer" })).await.expect("set");
        store.set("events/e1", json!({ "name": "Halloween" })).await.expect("set");
        store.set("ghosts/g2", json!({ "name": "Stay Puft" })).await.expect("set");
        subscription.cancel();
        store.remove("ghosts/g1").await.expect("remove");

        let seen = seen.lock().expect("lock");
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], Value::Null);
        assert_eq!(seen[1], json!({ "g1": { "name": "Slimer" } }));
        assert_eq!(
            seen[2],
            json!({ "g1": { "name": "Slimer" }, "g2": { "name": "Stay Puft" } })
        );
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters() {
        let store = MemoryStore::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        {
            let _subscription = store.subscribe(
                "ghosts",
                Arc::new(move |_| {
                    counter.fetch_add(1, AtomicOrdering::Relaxed);
                }),
            );
        }
        store.set("ghosts/g1", json!({ "name": "Slimer" })).await.expect("set");
        assert_eq!(count.load(AtomicOrdering::Relaxed), 1);
    }

    #[tokio::test]
    async fn file_backed_store_survives_reload() {
        let path = temp_file("ghost-squad-store");
        {
            let store = MemoryStore::with_file(path.clone());
            store
                .set("locations/l1", json!({ "name": "Park", "lat": 1.0, "lon": 2.0 }))
                .await
                .expect("set");
        }
        let reloaded = MemoryStore::with_file(path.clone());
        assert_eq!(
            reloaded.get("locations/l1/name").await.expect("get"),
            Some(json!("Park"))
        );

        let _ = fs::remove_file(&path);
        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }

    #[tokio::test]
    async fn list_as_skips_undecodable_children() {
        #[derive(Deserialize)]
        struct Named {
            name: String,
        }
        let store = MemoryStore::from_value(json!({
            "things": { "a": { "name": "ok" }, "b": { "name": 3 } }
        }));
        let rows: Vec<(String, Named)> = list_as(&store, "things").await.expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.name, "ok");
    }
}
