use std::fmt;

use serde::{Deserialize, Serialize};

/// Smule account whose follower list is watched (opaque id string).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Messaging destination: a numeric chat id or a `@channel` username.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub String);

/// Last-known descriptive info for one follower.
///
/// Serialized with the same field names the snapshot files have always used, so
/// older meta files (which may only carry id/handle/name) still load.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    #[serde(default)]
    pub account_id: String,
    #[serde(default = "unknown")]
    pub handle: String,
    #[serde(default = "unknown")]
    pub name: String,
    #[serde(default)]
    pub pic_url: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub is_vip: bool,
}

pub const UNKNOWN: &str = "Unknown";

fn unknown() -> String {
    UNKNOWN.to_string()
}

impl MemberRecord {
    /// Stand-in for a member that left without ever having been cached.
    pub fn synthesized(id: &str) -> Self {
        Self {
            account_id: id.to_string(),
            handle: id.to_string(),
            name: id.to_string(),
            pic_url: String::new(),
            verified: false,
            is_vip: false,
        }
    }
}

/// Join/leave counts for one entity in one cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeCounts {
    pub joined: usize,
    pub left: usize,
}

impl ChangeCounts {
    pub fn is_empty(&self) -> bool {
        self.joined == 0 && self.left == 0
    }
}

/// Result of one full pass over every watched entity.
///
/// `None` marks an entity whose check failed after all retries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub outcomes: Vec<(EntityId, Option<ChangeCounts>)>,
}

impl CycleReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn checked(&self) -> usize {
        self.outcomes.iter().filter(|(_, c)| c.is_some()).count()
    }

    pub fn all_checked(&self) -> bool {
        self.checked() == self.total()
    }

    pub fn totals(&self) -> ChangeCounts {
        self.outcomes
            .iter()
            .filter_map(|(_, c)| *c)
            .fold(ChangeCounts::default(), |acc, c| ChangeCounts {
                joined: acc.joined + c.joined,
                left: acc.left + c.left,
            })
    }

    pub fn has_changes(&self) -> bool {
        !self.totals().is_empty()
    }
}
