// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Retention evaluation: classify every artifact in a group as keep or
//! delete, and aggregate the deletions across groups.
//!
//! Within a group, members are ranked by `last_modified` descending and each
//! one is run through a fixed priority ladder; the first predicate whose
//! condition holds decides the verdict:
//!
//! 1. global max-retention override (beats reservation)
//! 2. reservation of the N most recent members
//! 3. usage protection by last download (decisive once a download
//!    timestamp is present)
//! 4. retention window by age
//! 5. reservation fallback for members outside the reserve
//! 6. default keep
//!
//! Age comparisons are whole-day, strict: an artifact exactly at a
//! day-denominated threshold is kept.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::grouping::{ArtifactGroup, ArtifactGroups};
use crate::model::{Artifact, RetentionRule};
use crate::rules::RuleSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Keep(KeepReason),
    Delete(DeleteReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepReason {
    /// Within the N most recently modified members of the group.
    Reserved { rank: usize, limit: usize },
    /// Downloaded recently enough to stay protected.
    RecentlyDownloaded { days: i64, limit: i64 },
    /// Younger than the retention window.
    WithinRetention { age_days: i64, limit: i64 },
    /// No active predicate condemned the artifact.
    NoActiveRule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteReason {
    /// Older than the config-wide maximum; overrides reservation.
    MaxRetentionExceeded { age_days: i64, limit: i64 },
    /// Last download is older than the usage threshold.
    DownloadLapsed { days: i64, limit: i64 },
    /// Older than the rule's retention window.
    RetentionExpired { age_days: i64, limit: i64 },
    /// Outside the reserve and no retention window applied.
    OutsideReserve { rank: usize, limit: usize },
}

impl fmt::Display for KeepReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserved { rank, limit } => {
                write!(f, "reserved (position {}/{})", rank + 1, limit)
            }
            Self::RecentlyDownloaded { days, limit } => {
                write!(f, "downloaded {days}d ago (threshold {limit}d)")
            }
            Self::WithinRetention { age_days, limit } => {
                write!(f, "within retention ({age_days}d <= {limit}d)")
            }
            Self::NoActiveRule => write!(f, "no active rule"),
        }
    }
}

impl fmt::Display for DeleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxRetentionExceeded { age_days, limit } => {
                write!(f, "max retention exceeded ({age_days}d > {limit}d)")
            }
            Self::DownloadLapsed { days, limit } => {
                write!(f, "not downloaded for {days}d (threshold {limit}d)")
            }
            Self::RetentionExpired { age_days, limit } => {
                write!(f, "retention expired ({age_days}d > {limit}d)")
            }
            Self::OutsideReserve { rank, limit } => {
                write!(f, "outside reserve (position {}, reserve {})", rank + 1, limit)
            }
        }
    }
}

/// Classify every member of one group against a single evaluation instant.
///
/// Returns members in recency order (newest first) with their verdicts.
pub fn evaluate_group(
    group: &ArtifactGroup,
    max_retention_days: Option<i64>,
    now: DateTime<Utc>,
) -> Vec<(Artifact, Verdict)> {
    let mut members = group.members.clone();
    members.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));

    members
        .into_iter()
        .enumerate()
        .map(|(rank, artifact)| {
            let verdict = classify(&artifact, rank, &group.rule, max_retention_days, now);
            (artifact, verdict)
        })
        .collect()
}

fn classify(
    artifact: &Artifact,
    rank: usize,
    rule: &RetentionRule,
    max_retention_days: Option<i64>,
    now: DateTime<Utc>,
) -> Verdict {
    let age_days = (now - artifact.last_modified).num_days();

    if let Some(limit) = max_retention_days {
        if age_days > limit {
            return Verdict::Delete(DeleteReason::MaxRetentionExceeded { age_days, limit });
        }
    }

    if let Some(limit) = rule.reserved {
        if rank < limit {
            return Verdict::Keep(KeepReason::Reserved { rank, limit });
        }
    }

    // Decisive once a download timestamp exists: no fall-through to the
    // retention window either way.
    if let (Some(limit), Some(last_downloaded)) =
        (rule.min_days_since_last_download, artifact.last_downloaded)
    {
        let days = (now - last_downloaded).num_days();
        if days <= limit {
            return Verdict::Keep(KeepReason::RecentlyDownloaded { days, limit });
        }
        return Verdict::Delete(DeleteReason::DownloadLapsed { days, limit });
    }

    if let Some(limit) = rule.retention_days {
        if age_days > limit {
            return Verdict::Delete(DeleteReason::RetentionExpired { age_days, limit });
        }
        return Verdict::Keep(KeepReason::WithinRetention { age_days, limit });
    }

    if let Some(limit) = rule.reserved {
        return Verdict::Delete(DeleteReason::OutsideReserve { rank, limit });
    }

    Verdict::Keep(KeepReason::NoActiveRule)
}

/// Run the evaluator over every group and collect the deletions.
///
/// Groups are visited in insertion order and members in recency order, so
/// the output is deterministic for a given listing, ruleset, and `now`.
pub fn select_deletions(
    groups: &ArtifactGroups,
    rules: &RuleSet,
    now: DateTime<Utc>,
) -> Vec<Artifact> {
    let max_retention_days = rules.max_retention_days();
    let mut doomed = Vec::new();

    for (key, group) in groups.iter() {
        for (artifact, verdict) in evaluate_group(group, max_retention_days, now) {
            match verdict {
                Verdict::Delete(reason) => {
                    tracing::info!(
                        name = %artifact.name,
                        version = %artifact.version,
                        rule = %key.pattern,
                        %reason,
                        "marked for deletion"
                    );
                    doomed.push(artifact);
                }
                Verdict::Keep(reason) => {
                    tracing::debug!(
                        name = %artifact.name,
                        version = %artifact.version,
                        rule = %key.pattern,
                        %reason,
                        "kept"
                    );
                }
            }
        }
    }

    doomed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::group_artifacts;
    use crate::model::{Asset, Component, RetentionRule};
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn stamp(days_ago: i64) -> String {
        (now() - Duration::days(days_ago)).to_rfc3339()
    }

    fn component(version: &str, modified_days_ago: i64, downloaded_days_ago: Option<i64>) -> Component {
        Component {
            id: format!("app:{version}"),
            name: "app".to_string(),
            version: version.to_string(),
            assets: vec![Asset {
                last_modified: Some(stamp(modified_days_ago)),
                last_downloaded: downloaded_days_ago.map(stamp),
            }],
        }
    }

    fn single_rule(
        retention_days: Option<i64>,
        reserved: Option<usize>,
        min_days_since_last_download: Option<i64>,
        max_retention_days: Option<i64>,
    ) -> RuleSet {
        let mut rules = RuleSet::new(RetentionRule::no_match(None, None, None), max_retention_days);
        rules
            .add_rule("^v", retention_days, reserved, min_days_since_last_download)
            .unwrap();
        rules
    }

    fn run(components: &[Component], rules: &RuleSet) -> Vec<String> {
        let groups = group_artifacts(components, rules);
        select_deletions(&groups, rules, now())
            .into_iter()
            .map(|artifact| artifact.version)
            .collect()
    }

    #[test]
    fn reservation_protects_newest_expired_member() {
        // Scenario: retention 7d, reserve 1, ages 10d and 1d. Only the
        // older, non-reserved member goes.
        let rules = single_rule(Some(7), Some(1), None, None);
        let components = vec![component("v-old", 10, None), component("v-new", 1, None)];

        assert_eq!(run(&components, &rules), vec!["v-old"]);
    }

    #[test]
    fn latest_is_immune_for_any_configuration() {
        let rules = single_rule(Some(1), None, None, Some(1));
        let components = vec![component("latest", 1000, None)];

        assert!(run(&components, &rules).is_empty());
    }

    #[test]
    fn recent_download_wins_over_expired_retention() {
        // Age 100d beats retention, but the download 2d ago is within the
        // 3d usage threshold.
        let rules = single_rule(Some(7), None, Some(3), None);
        let components = vec![component("v1", 100, Some(2))];

        assert!(run(&components, &rules).is_empty());
    }

    #[test]
    fn lapsed_download_is_decisive_and_skips_retention() {
        // Downloaded 10d ago with a 3d threshold: deleted even though the
        // retention window (30d) would have kept a 5d-old artifact.
        let rules = single_rule(Some(30), None, Some(3), None);
        let components = vec![component("v1", 5, Some(10))];

        assert_eq!(run(&components, &rules), vec!["v1"]);
    }

    #[test]
    fn usage_check_is_skipped_when_never_downloaded() {
        let rules = single_rule(Some(30), None, Some(3), None);
        let components = vec![component("v1", 5, None)];

        assert!(run(&components, &rules).is_empty());
    }

    #[test]
    fn no_active_predicates_keeps_everything() {
        let rules = single_rule(None, None, None, None);
        let components = vec![
            component("v1", 500, None),
            component("v2", 50, None),
            component("v3", 5, None),
        ];

        assert!(run(&components, &rules).is_empty());
    }

    #[test]
    fn max_retention_overrides_reservation() {
        // Rank 0 is reserved, but 95d > the 90d config-wide maximum.
        let rules = single_rule(None, Some(1), None, Some(90));
        let components = vec![component("v1", 95, None)];

        assert_eq!(run(&components, &rules), vec!["v1"]);
    }

    #[test]
    fn age_exactly_at_threshold_is_kept() {
        let rules = single_rule(Some(7), None, None, None);
        let components = vec![component("v1", 7, None)];

        assert!(run(&components, &rules).is_empty());
    }

    #[test]
    fn reservation_alone_keeps_exactly_the_k_newest() {
        let rules = single_rule(None, Some(2), None, None);
        let components = vec![
            component("v1", 400, None),
            component("v2", 300, None),
            component("v3", 200, None),
            component("v4", 100, None),
        ];

        // Newest two (v4, v3) are kept regardless of age; the rest fall to
        // the reservation fallback.
        assert_eq!(run(&components, &rules), vec!["v2", "v1"]);
    }

    #[test]
    fn fewer_members_than_reserve_keeps_all() {
        let rules = single_rule(None, Some(5), None, None);
        let components = vec![component("v1", 400, None), component("v2", 300, None)];

        assert!(run(&components, &rules).is_empty());
    }

    #[test]
    fn reserve_of_zero_protects_nothing() {
        let rules = single_rule(None, Some(0), None, None);
        let components = vec![component("v1", 1, None)];

        assert_eq!(run(&components, &rules), vec!["v1"]);
    }

    #[test]
    fn retention_window_applies_before_reservation_fallback() {
        // Outside the reserve but inside the retention window: kept.
        let rules = single_rule(Some(30), Some(1), None, None);
        let components = vec![component("v-new", 1, None), component("v-mid", 10, None)];

        assert!(run(&components, &rules).is_empty());
    }

    #[test]
    fn selection_is_idempotent() {
        let rules = single_rule(Some(7), Some(1), None, Some(90));
        let components = vec![
            component("v1", 100, None),
            component("v2", 10, Some(20)),
            component("v3", 1, None),
        ];

        let first = run(&components, &rules);
        let second = run(&components, &rules);
        assert_eq!(first, second);
    }

    #[test]
    fn members_rank_by_recency_not_listing_order() {
        // v-old listed first but v-new holds the reserved slot.
        let rules = single_rule(None, Some(1), None, None);
        let components = vec![component("v-old", 50, None), component("v-new", 2, None)];

        assert_eq!(run(&components, &rules), vec!["v-old"]);
    }

    #[test]
    fn verdict_reasons_describe_the_deciding_predicate() {
        let rules = single_rule(Some(7), None, None, None);
        let groups = group_artifacts(&[component("v1", 10, None)], &rules);
        let (_, group) = groups.iter().next().unwrap();

        let verdicts = evaluate_group(group, rules.max_retention_days(), now());
        assert_eq!(
            verdicts[0].1,
            Verdict::Delete(DeleteReason::RetentionExpired { age_days: 10, limit: 7 })
        );
    }
}
