//! Chat event extraction and display-priority scoring
//!
//! Chat messages arrive as JSON objects `{"cmd": "DANMU_MSG", "info": [...]}`
//! where `info` is a positional array. Only the indices below are read:
//!
//! | index | meaning                                  |
//! |-------|------------------------------------------|
//! | 1     | message text                             |
//! | 2     | `[uid, name, admin, vip, svip, ...]`     |
//! | 3     | fan medal, `[level, ...]` (may be empty) |
//! | 4     | `[user_level, ...]`                      |
//! | 5     | `[title, ...]` (optional)                |
//! | 7     | high-value marker (optional)             |
//!
//! Missing or mistyped positions never fail extraction; they read as zero,
//! false, or empty.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ExtractionError;

/// Discriminator of chat messages
pub const CHAT_CMD: &str = "DANMU_MSG";

const BASE_WEIGHT: u32 = 10;
const LEVEL_CAP: u64 = 40;
const ADMIN_BONUS: u32 = 50;
const HIGH_VALUE_BONUS: u32 = 30;
const MEDAL_CAP: u64 = 30;
const VIP_BONUS: u32 = 10;
const SVIP_BONUS: u32 = 20;

/// Sender of a chat message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUser {
    pub uid: u64,
    pub name: String,
    pub is_admin: bool,
    pub is_vip: bool,
    pub is_svip: bool,
    pub level: u64,
    /// Raw medal array; null when absent
    pub medal: Value,
    pub title: String,
}

/// One extracted chat message with its priority weight
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatEvent {
    /// Unix milliseconds at extraction time
    pub timestamp: u64,
    pub content: String,
    pub user: ChatUser,
    pub weight: u32,
}

/// Parse a message payload and build a chat event
///
/// Returns `Ok(None)` for well-formed payloads of other kinds.
pub fn extract(payload: &str) -> Result<Option<ChatEvent>, ExtractionError> {
    let body: Value = serde_json::from_str(payload)?;

    if !is_chat_cmd(&body) {
        return Ok(None);
    }

    let info = body
        .get("info")
        .ok_or(ExtractionError::MissingInfo)?
        .as_array()
        .ok_or(ExtractionError::NotAnArray)?;

    Ok(Some(build_event(info, unix_ms_now())))
}

/// Like `extract`, but malformed payloads are logged and skipped
pub fn try_extract(payload: &str) -> Option<ChatEvent> {
    match extract(payload) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "skipping chat payload");
            None
        }
    }
}

/// Additive display priority for a chat `info` array
///
/// Ranges over [10, 190]; no normalization.
pub fn weight(info: &[Value]) -> u32 {
    let mut weight = BASE_WEIGHT;

    weight += num(at(info, &[4, 0])).min(LEVEL_CAP) as u32;
    if flag(at(info, &[2, 2])) {
        weight += ADMIN_BONUS;
    }
    if info.get(7).is_some_and(truthy) {
        weight += HIGH_VALUE_BONUS;
    }
    if info.get(3).is_some_and(truthy) {
        weight += num(at(info, &[3, 0])).min(MEDAL_CAP) as u32;
    }
    if flag(at(info, &[2, 3])) {
        weight += VIP_BONUS;
    }
    if flag(at(info, &[2, 4])) {
        weight += SVIP_BONUS;
    }

    weight
}

fn build_event(info: &[Value], timestamp: u64) -> ChatEvent {
    let user = ChatUser {
        uid: num(at(info, &[2, 0])),
        name: text(at(info, &[2, 1])),
        is_admin: flag(at(info, &[2, 2])),
        is_vip: flag(at(info, &[2, 3])),
        is_svip: flag(at(info, &[2, 4])),
        level: num(at(info, &[4, 0])),
        medal: info.get(3).cloned().unwrap_or(Value::Null),
        title: text(at(info, &[5, 0])),
    };

    ChatEvent {
        timestamp,
        content: text(info.get(1)),
        user,
        weight: weight(info),
    }
}

// "DANMU_MSG:4:0:2:2:2:0" is the same kind with a protocol suffix.
fn is_chat_cmd(body: &Value) -> bool {
    body.get("cmd")
        .and_then(Value::as_str)
        .and_then(|cmd| cmd.split(':').next())
        == Some(CHAT_CMD)
}

fn at<'a>(info: &'a [Value], path: &[usize]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    rest.iter().try_fold(info.get(*first)?, |v, i| v.get(*i))
}

fn num(v: Option<&Value>) -> u64 {
    match v {
        Some(v) => v
            .as_u64()
            .or_else(|| v.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        None => 0,
    }
}

fn text(v: Option<&Value>) -> String {
    v.and_then(Value::as_str).unwrap_or_default().to_string()
}

fn flag(v: Option<&Value>) -> bool {
    v.and_then(Value::as_f64) == Some(1.0)
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
