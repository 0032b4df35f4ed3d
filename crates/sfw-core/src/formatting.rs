//! Plain-text rendering of follower notifications, summaries and alerts.

use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Local};

use crate::domain::{ChangeCounts, CycleReport, EntityId, MemberRecord};

const MAX_ERROR_LEN: usize = 500;

#[derive(Clone, Debug)]
pub struct NotificationFormatter {
    aliases: HashMap<String, String>,
    profile_base_url: String,
}

impl NotificationFormatter {
    pub fn new(aliases: HashMap<String, String>, profile_base_url: impl Into<String>) -> Self {
        Self {
            aliases,
            profile_base_url: profile_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Display name of a watched account: its alias, else the raw id.
    pub fn label<'a>(&'a self, entity: &'a EntityId) -> &'a str {
        self.aliases
            .get(entity.as_str())
            .map(String::as_str)
            .unwrap_or(entity.as_str())
    }

    pub fn join_message(&self, entity: &EntityId, r: &MemberRecord, at: DateTime<Local>) -> String {
        let mut lines = vec![
            "🎵 New follower!".to_string(),
            String::new(),
            format!("📊 Smule account: {}", self.label(entity)),
            format!("👤 Name: {}", r.name),
            format!("📝 Handle: @{}", r.handle),
        ];
        if r.verified {
            lines.push("✅ Verified account".to_string());
        }
        if r.is_vip {
            lines.push("⭐ VIP account".to_string());
        }
        if !r.pic_url.is_empty() {
            lines.push(format!("🖼 Avatar: {}", r.pic_url));
        }
        lines.push(format!("🔗 Profile: {}", self.profile_url(&r.handle)));
        lines.push(format!("🕐 Time: {}", timestamp(at)));
        lines.join("\n")
    }

    /// Badges are left out: verified/VIP data is stale once a member is gone.
    pub fn leave_message(&self, entity: &EntityId, r: &MemberRecord, at: DateTime<Local>) -> String {
        [
            "❌ Follower left!".to_string(),
            String::new(),
            format!("📊 Smule account: {}", self.label(entity)),
            format!("👤 Name: {}", r.name),
            format!("📝 Handle: @{}", r.handle),
            format!("🔗 Profile: {}", self.profile_url(&r.handle)),
            format!("🕐 Time: {}", timestamp(at)),
        ]
        .join("\n")
    }

    /// `label: joined: N, left: M` with zero parts dropped; `None` when nothing changed.
    pub fn entity_summary(&self, entity: &EntityId, counts: ChangeCounts) -> Option<String> {
        counts_text(counts).map(|text| format!("{}: {text}", self.label(entity)))
    }

    pub fn cycle_summary(&self, report: &CycleReport) -> String {
        let mut lines = vec![format!(
            "📊 Cycle summary (checked {}/{})",
            report.checked(),
            report.total()
        )];

        let per_entity: Vec<String> = report
            .outcomes
            .iter()
            .filter_map(|(entity, counts)| self.entity_summary(entity, (*counts)?))
            .collect();
        if per_entity.is_empty() {
            lines.push("No changes".to_string());
        } else {
            lines.extend(per_entity.into_iter().map(|l| format!("• {l}")));
            if let Some(total) = counts_text(report.totals()) {
                lines.push(format!("Total: {total}"));
            }
        }

        let failed: Vec<&str> = report
            .outcomes
            .iter()
            .filter(|(_, counts)| counts.is_none())
            .map(|(entity, _)| self.label(entity))
            .collect();
        if !failed.is_empty() {
            lines.push(format!("⚠️ Not checked: {}", failed.join(", ")));
        }

        lines.join("\n")
    }

    pub fn entity_failure_alert(&self, entity: &EntityId, attempts: u32, error: &str) -> String {
        format!(
            "❌ Failed to check account {} after {attempts} attempt(s): {}",
            self.label(entity),
            truncate(error)
        )
    }

    pub fn cycle_failure_alert(&self, error: &str) -> String {
        format!("⚠️ Check cycle failed: {}", truncate(error))
    }

    pub fn escalation_alert(&self, consecutive: u32, cooldown: Duration) -> String {
        format!(
            "🚨 {consecutive} check cycles failed in a row. Pausing for {} before retrying.",
            human_duration(cooldown)
        )
    }

    pub fn startup_banner(&self, entities: &[EntityId], interval: Duration) -> String {
        let mut lines = vec![
            "🤖 Follower watcher started!".to_string(),
            format!("📊 Watching {} account(s):", entities.len()),
        ];
        lines.extend(
            entities
                .iter()
                .enumerate()
                .map(|(i, e)| format!("{}. {}", i + 1, self.label(e))),
        );
        lines.push(format!("⏱ Check interval: {} seconds", interval.as_secs()));
        lines.join("\n")
    }

    fn profile_url(&self, handle: &str) -> String {
        format!("{}/{handle}", self.profile_base_url)
    }
}

fn counts_text(counts: ChangeCounts) -> Option<String> {
    let mut parts = Vec::new();
    if counts.joined > 0 {
        parts.push(format!("joined: {}", counts.joined));
    }
    if counts.left > 0 {
        parts.push(format!("left: {}", counts.left));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn timestamp(at: DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_ERROR_LEN {
        return s.to_string();
    }
    let mut out: String = s.chars().take(MAX_ERROR_LEN).collect();
    out.push_str("...");
    out
}

fn human_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("{} min", secs / 60)
    } else {
        format!("{secs} s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn formatter() -> NotificationFormatter {
        let aliases = [("96242367".to_string(), "dsip".to_string())]
            .into_iter()
            .collect();
        NotificationFormatter::new(aliases, "https://www.smule.com/")
    }

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap()
    }

    fn record() -> MemberRecord {
        MemberRecord {
            account_id: "1".to_string(),
            handle: "alice".to_string(),
            name: "Alice".to_string(),
            pic_url: "https://c.smule.com/a.jpg".to_string(),
            verified: true,
            is_vip: false,
        }
    }

    fn entity(id: &str) -> EntityId {
        EntityId(id.to_string())
    }

    #[test]
    fn join_message_carries_badges_avatar_and_time() {
        let msg = formatter().join_message(&entity("96242367"), &record(), at());

        assert!(msg.starts_with("🎵 New follower!"));
        assert!(msg.contains("Smule account: dsip"));
        assert!(msg.contains("Name: Alice"));
        assert!(msg.contains("@alice"));
        assert!(msg.contains("✅ Verified account"));
        assert!(!msg.contains("VIP"));
        assert!(msg.contains("Avatar: https://c.smule.com/a.jpg"));
        assert!(msg.contains("https://www.smule.com/alice"));
        assert!(msg.contains("2026-03-01 12:30:05"));
    }

    #[test]
    fn join_message_omits_missing_avatar() {
        let mut r = record();
        r.pic_url.clear();
        let msg = formatter().join_message(&entity("5"), &r, at());
        assert!(!msg.contains("Avatar"));
        assert!(msg.contains("Smule account: 5"));
    }

    #[test]
    fn leave_message_has_no_badges() {
        let msg = formatter().leave_message(&entity("96242367"), &record(), at());

        assert!(msg.starts_with("❌ Follower left!"));
        assert!(msg.contains("@alice"));
        assert!(!msg.contains("Verified"));
        assert!(!msg.contains("Avatar"));
        assert!(msg.contains("2026-03-01 12:30:05"));
    }

    #[test]
    fn entity_summary_only_lists_nonzero_counts() {
        let f = formatter();
        let e = entity("96242367");
        assert_eq!(f.entity_summary(&e, ChangeCounts::default()), None);
        assert_eq!(
            f.entity_summary(&e, ChangeCounts { joined: 2, left: 0 }).as_deref(),
            Some("dsip: joined: 2")
        );
        assert_eq!(
            f.entity_summary(&e, ChangeCounts { joined: 1, left: 3 }).as_deref(),
            Some("dsip: joined: 1, left: 3")
        );
    }

    #[test]
    fn quiet_cycle_summary_says_no_changes() {
        let report = CycleReport {
            outcomes: vec![
                (entity("96242367"), Some(ChangeCounts::default())),
                (entity("2"), Some(ChangeCounts::default())),
            ],
        };
        let msg = formatter().cycle_summary(&report);
        assert!(msg.contains("checked 2/2"));
        assert!(msg.contains("No changes"));
    }

    #[test]
    fn cycle_summary_skips_failed_entities_but_reports_coverage() {
        let report = CycleReport {
            outcomes: vec![
                (entity("96242367"), Some(ChangeCounts { joined: 1, left: 0 })),
                (entity("2"), None),
                (entity("3"), Some(ChangeCounts { joined: 0, left: 2 })),
            ],
        };
        let msg = formatter().cycle_summary(&report);
        assert!(msg.contains("checked 2/3"));
        assert!(msg.contains("• dsip: joined: 1"));
        assert!(msg.contains("• 3: left: 2"));
        assert!(msg.contains("Total: joined: 1, left: 2"));
        assert!(msg.contains("Not checked: 2"));
    }

    #[test]
    fn long_errors_are_truncated() {
        let msg = formatter().cycle_failure_alert(&"x".repeat(2000));
        assert!(msg.ends_with("..."));
        assert!(msg.len() < 600);
    }

    #[test]
    fn escalation_mentions_cooldown() {
        let msg = formatter().escalation_alert(3, Duration::from_secs(300));
        assert!(msg.contains("3 check cycles"));
        assert!(msg.contains("5 min"));
    }

    #[test]
    fn banner_lists_accounts_in_order() {
        let msg = formatter().startup_banner(
            &[entity("96242367"), entity("3150102762")],
            Duration::from_secs(300),
        );
        assert!(msg.contains("1. dsip"));
        assert!(msg.contains("2. 3150102762"));
        assert!(msg.contains("300 seconds"));
    }
}
