use serde::Deserialize;
use serde_json::Value;

use crate::domain::{MemberRecord, UNKNOWN};

/// One page of `GET /api/profile/followers`.
///
/// `list` is required (a body without it is malformed); a `null` list reads as empty.
#[derive(Clone, Debug, Deserialize)]
pub struct FollowerPage {
    pub list: Option<Vec<RawFollower>>,
}

impl FollowerPage {
    pub fn into_entries(self) -> Vec<RawFollower> {
        self.list.unwrap_or_default()
    }
}

/// A follower entry as the API returns it. Every field is optional; unknown fields are ignored.
///
/// `account_id` arrives as a number or a string; `verified`/`is_vip` are read by truthiness.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawFollower {
    #[serde(default)]
    pub account_id: Value,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pic_url: Option<String>,
    #[serde(default)]
    pub verified: Value,
    #[serde(default)]
    pub is_vip: Value,
}

impl RawFollower {
    /// Normalized id, or `None` when the entry carries no usable id.
    pub fn id(&self) -> Option<String> {
        let id = match &self.account_id {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        };
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    /// Normalize into a record: missing handle/name fall back to `"Unknown"`
    /// (name falls back to the handle first).
    pub fn to_record(&self) -> Option<MemberRecord> {
        let account_id = self.id()?;
        let handle = non_blank(self.handle.as_deref());
        let name = non_blank(self.name.as_deref()).or_else(|| handle.clone());
        Some(MemberRecord {
            account_id,
            handle: handle.unwrap_or_else(|| UNKNOWN.to_string()),
            name: name.unwrap_or_else(|| UNKNOWN.to_string()),
            pic_url: non_blank(self.pic_url.as_deref()).unwrap_or_default(),
            verified: truthy(&self.verified),
            is_vip: truthy(&self.is_vip),
        })
    }
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
        _ => false,
    }
}
