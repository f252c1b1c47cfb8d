use serde_json::{json, Value};

use crate::server_utils::normalize_db_path;

#[derive(Debug, PartialEq)]
pub enum ParsedClientMessage {
    Subscribe { path: String },
    Unsubscribe { path: String },
    Ping { t: f64 },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "subscribe" => {
            let path = normalize_db_path(object.get("path")?.as_str()?)?;
            Some(ParsedClientMessage::Subscribe { path })
        }
        "unsubscribe" => {
            let path = normalize_db_path(object.get("path")?.as_str()?)?;
            Some(ParsedClientMessage::Unsubscribe { path })
        }
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

pub fn snapshot_message(path: &str, value: &Value) -> Value {
    json!({
        "type": "snapshot",
        "path": path,
        "value": value,
    })
}

pub fn pong_message(t: f64, server_time_ms: u64) -> Value {
    json!({
        "type": "pong",
        "t": t,
        "serverTime": server_time_ms,
    })
}

pub fn error_message(message: &str) -> Value {
    json!({
        "type": "error",
        "message": message,
    })
}
