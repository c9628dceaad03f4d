// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Data models for registry components, retention rules, and telemetry.
//!
//! Wire types mirror the Sonatype-style component REST API; `Artifact` is the
//! validated in-memory form the retention engine works on.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Pattern id attached to the fallback rule when no configured pattern matches.
pub const NO_MATCH_PATTERN: &str = "no-match";

/// One storage asset backing a component version, as returned by the registry.
///
/// Timestamps stay as raw strings here; the registry is not strict about the
/// format and a bad timestamp must only disqualify the one component.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub last_downloaded: Option<String>,
}

/// Raw component record from the registry listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Component {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// One page of the paginated component listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentPage {
    #[serde(default)]
    pub items: Vec<Component>,
    #[serde(default)]
    pub continuation_token: Option<String>,
}

/// A validated component version the retention engine can classify.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub name: String,
    pub version: String,
    /// Maximum `lastModified` across the component's assets.
    pub last_modified: DateTime<Utc>,
    /// Maximum `lastDownloaded` across assets; `None` if never downloaded
    /// or not tracked by the registry.
    pub last_downloaded: Option<DateTime<Utc>>,
}

impl Artifact {
    /// Validate a raw component into an artifact.
    ///
    /// Returns `None` when the record is unclassifiable: missing name or
    /// version, no assets, or no parseable `lastModified` on any asset.
    /// An unparseable `lastDownloaded` is ignored rather than disqualifying.
    pub fn from_component(component: &Component) -> Option<Self> {
        if component.name.is_empty() || component.version.is_empty() || component.assets.is_empty() {
            return None;
        }

        let last_modified = component
            .assets
            .iter()
            .filter_map(|asset| asset.last_modified.as_deref())
            .filter_map(parse_timestamp)
            .max()?;

        let last_downloaded = component
            .assets
            .iter()
            .filter_map(|asset| asset.last_downloaded.as_deref())
            .filter_map(parse_timestamp)
            .max();

        Some(Self {
            id: component.id.clone(),
            name: component.name.clone(),
            version: component.version.clone(),
            last_modified,
            last_downloaded,
        })
    }

    /// Whether this version is permanently protected from deletion.
    pub fn is_latest(&self) -> bool {
        self.version.eq_ignore_ascii_case("latest")
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Resolved retention policy for a group of artifacts.
///
/// `None` in any field means the corresponding predicate is inactive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionRule {
    /// Pattern string that produced this rule, or [`NO_MATCH_PATTERN`].
    /// Used for grouping-key identity and logging only.
    pub pattern: String,
    pub retention_days: Option<i64>,
    pub reserved: Option<usize>,
    pub min_days_since_last_download: Option<i64>,
}

impl RetentionRule {
    pub fn no_match(
        retention_days: Option<i64>,
        reserved: Option<usize>,
        min_days_since_last_download: Option<i64>,
    ) -> Self {
        Self {
            pattern: NO_MATCH_PATTERN.to_string(),
            retention_days,
            reserved,
            min_days_since_last_download,
        }
    }
}

/// Repository record from `/service/rest/v1/repositories`.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryInfo {
    pub name: String,
    #[serde(default)]
    pub format: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Blob store record from `/service/rest/v1/blobstores`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobStoreInfo {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub blob_count: i64,
    #[serde(default)]
    pub total_size_in_bytes: i64,
    #[serde(default)]
    pub available_space_in_bytes: i64,
}

/// Task record from `/service/rest/v1/tasks`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub current_state: String,
    #[serde(default)]
    pub last_run_result: Option<String>,
}

/// One page of the paginated task listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPage {
    #[serde(default)]
    pub items: Vec<TaskInfo>,
    #[serde(default)]
    pub continuation_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(modified: Option<&str>, downloaded: Option<&str>) -> Asset {
        Asset {
            last_modified: modified.map(str::to_string),
            last_downloaded: downloaded.map(str::to_string),
        }
    }

    fn component(name: &str, version: &str, assets: Vec<Asset>) -> Component {
        Component {
            id: "c0ffee".to_string(),
            name: name.to_string(),
            version: version.to_string(),
            assets,
        }
    }

    #[test]
    fn skips_component_without_name_version_or_assets() {
        let no_name = component("", "1.0", vec![asset(Some("2024-01-01T00:00:00Z"), None)]);
        let no_version = component("app", "", vec![asset(Some("2024-01-01T00:00:00Z"), None)]);
        let no_assets = component("app", "1.0", vec![]);

        assert!(Artifact::from_component(&no_name).is_none());
        assert!(Artifact::from_component(&no_version).is_none());
        assert!(Artifact::from_component(&no_assets).is_none());
    }

    #[test]
    fn skips_component_without_any_dated_asset() {
        let undated = component("app", "1.0", vec![asset(None, None), asset(None, None)]);
        assert!(Artifact::from_component(&undated).is_none());
    }

    #[test]
    fn skips_component_with_unparseable_last_modified() {
        let garbage = component("app", "1.0", vec![asset(Some("not-a-date"), None)]);
        assert!(Artifact::from_component(&garbage).is_none());
    }

    #[test]
    fn effective_timestamps_are_maximum_across_assets() {
        let raw = component(
            "app",
            "1.0",
            vec![
                asset(Some("2024-01-01T00:00:00Z"), Some("2024-02-01T00:00:00Z")),
                asset(Some("2024-03-01T00:00:00Z"), Some("2024-01-15T00:00:00Z")),
            ],
        );

        let artifact = Artifact::from_component(&raw).unwrap();
        assert_eq!(
            artifact.last_modified,
            DateTime::parse_from_rfc3339("2024-03-01T00:00:00Z").unwrap()
        );
        assert_eq!(
            artifact.last_downloaded.unwrap(),
            DateTime::parse_from_rfc3339("2024-02-01T00:00:00Z").unwrap()
        );
    }

    #[test]
    fn unparseable_last_downloaded_is_treated_as_never_downloaded() {
        let raw = component(
            "app",
            "1.0",
            vec![asset(Some("2024-01-01T00:00:00Z"), Some("garbage"))],
        );

        let artifact = Artifact::from_component(&raw).unwrap();
        assert!(artifact.last_downloaded.is_none());
    }

    #[test]
    fn latest_detection_is_case_insensitive() {
        let raw = component("app", "LaTeSt", vec![asset(Some("2024-01-01T00:00:00Z"), None)]);
        let artifact = Artifact::from_component(&raw).unwrap();
        assert!(artifact.is_latest());
    }
}
