//! Follower set diffing. Pure: no I/O, no clocks.

use std::collections::BTreeSet;

use crate::{
    domain::{ChangeCounts, MemberRecord},
    followers::types::RawFollower,
    snapshot::EntitySnapshot,
};

/// Joins and leaves of one entity in one cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// New followers, in the order the API listed them.
    pub joined: Vec<MemberRecord>,
    /// Followers gone since the last snapshot, ascending by id.
    pub left: Vec<MemberRecord>,
}

impl ChangeSet {
    pub fn joined_ids(&self) -> BTreeSet<String> {
        self.joined.iter().map(|r| r.account_id.clone()).collect()
    }

    pub fn left_ids(&self) -> BTreeSet<String> {
        self.left.iter().map(|r| r.account_id.clone()).collect()
    }

    pub fn counts(&self) -> ChangeCounts {
        ChangeCounts {
            joined: self.joined.len(),
            left: self.left.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct DiffOutcome {
    pub changes: ChangeSet,
    /// Snapshot to commit once the check is complete.
    pub next: EntitySnapshot,
}

/// Compare a freshly fetched follower list against the last committed snapshot.
///
/// Every fetched member gets its record refreshed, new or not. Entries without a usable id
/// are skipped; repeated ids (pages shifting under us) count once.
pub fn diff(prior: &EntitySnapshot, fresh: &[RawFollower]) -> DiffOutcome {
    let mut records = prior.records.clone();
    let mut members = BTreeSet::new();
    let mut joined = Vec::new();

    for record in fresh.iter().filter_map(RawFollower::to_record) {
        let id = record.account_id.clone();
        if !members.insert(id.clone()) {
            continue;
        }
        if !prior.members.contains(&id) {
            joined.push(record.clone());
        }
        records.insert(id, record);
    }

    let left = prior
        .members
        .difference(&members)
        .map(|id| {
            records
                .get(id)
                .cloned()
                .unwrap_or_else(|| MemberRecord::synthesized(id))
        })
        .collect();

    DiffOutcome {
        changes: ChangeSet { joined, left },
        next: EntitySnapshot { members, records },
    }
}
