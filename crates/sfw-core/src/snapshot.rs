//! Durable per-entity follower snapshots (flat JSON files in `DATA_DIR`).
//!
//! Two files per watched account:
//! - `followers_<id>.json`: sorted array of follower ids from the last completed check
//! - `followers_meta_<id>.json`: id -> last-known `MemberRecord` (never pruned)

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    domain::{EntityId, MemberRecord},
    errors::Error,
    Result,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntitySnapshot {
    pub members: BTreeSet<String>,
    pub records: BTreeMap<String, MemberRecord>,
}

pub struct SnapshotStore {
    dir: PathBuf,
    state: Mutex<HashMap<EntityId, EntitySnapshot>>,
}

impl SnapshotStore {
    /// Load whatever is on disk for `entities`. Missing or unreadable files start empty.
    pub fn open(dir: impl Into<PathBuf>, entities: &[EntityId]) -> Self {
        let dir = dir.into();
        let mut state = HashMap::new();
        for entity in entities {
            let members = load_or_empty(&members_path(&dir, entity), load_members);
            let records = load_or_empty(&records_path(&dir, entity), load_records);
            debug!(
                entity = %entity,
                members = members.len(),
                records = records.len(),
                "loaded snapshot"
            );
            state.insert(entity.clone(), EntitySnapshot { members, records });
        }
        Self {
            dir,
            state: Mutex::new(state),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Last committed snapshot (empty for an entity never seen).
    pub async fn get(&self, entity: &EntityId) -> EntitySnapshot {
        self.state
            .lock()
            .await
            .get(entity)
            .cloned()
            .unwrap_or_default()
    }

    /// Persist and then publish a new snapshot for `entity`.
    ///
    /// In-memory state only changes once both files are on disk, so a failed write leaves
    /// the previous snapshot authoritative.
    pub async fn commit(&self, entity: &EntityId, snapshot: EntitySnapshot) -> Result<()> {
        write_json_atomic(&records_path(&self.dir, entity), &snapshot.records)?;
        write_json_atomic(&members_path(&self.dir, entity), &snapshot.members)?;
        self.state.lock().await.insert(entity.clone(), snapshot);
        Ok(())
    }
}

fn members_path(dir: &Path, entity: &EntityId) -> PathBuf {
    dir.join(format!("followers_{}.json", file_safe(entity.as_str())))
}

fn records_path(dir: &Path, entity: &EntityId) -> PathBuf {
    dir.join(format!("followers_meta_{}.json", file_safe(entity.as_str())))
}

fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn load_or_empty<T: Default>(path: &Path, load: fn(&Path) -> Result<T>) -> T {
    if !path.exists() {
        return T::default();
    }
    match load(path) {
        Ok(v) => v,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable snapshot file, starting empty");
            T::default()
        }
    }
}

fn load_members(path: &Path) -> Result<BTreeSet<String>> {
    let txt = fs::read_to_string(path)?;
    let Value::Array(items) = serde_json::from_str::<Value>(&txt)? else {
        return Err(store_error(path, "expected a JSON array"));
    };
    Ok(items
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}

fn load_records(path: &Path) -> Result<BTreeMap<String, MemberRecord>> {
    let txt = fs::read_to_string(path)?;
    let mut records: BTreeMap<String, MemberRecord> = serde_json::from_str(&txt)?;
    for (id, record) in records.iter_mut() {
        if record.account_id.is_empty() {
            record.account_id = id.clone();
        }
    }
    Ok(records)
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let txt = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, txt)?;
    fs::rename(&tmp, path).map_err(|e| store_error(path, &format!("rename failed: {e}")))
}

fn store_error(path: &Path, reason: &str) -> Error {
    Error::Store {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
