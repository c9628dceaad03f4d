// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Grouping: partition raw components into evaluation groups.
//!
//! Rules and reservation counts apply per `(name, matched-pattern)` group.
//! Unclassifiable records and "latest" versions never enter a group and are
//! therefore never deletable.

use indexmap::IndexMap;

use crate::model::{Artifact, Component, RetentionRule};
use crate::rules::RuleSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub name: String,
    pub pattern: String,
}

/// Artifacts sharing a name and matched pattern, plus the rule that applies
/// to all of them. Members are in arbitrary order until the evaluator sorts
/// them by recency.
#[derive(Debug, Clone)]
pub struct ArtifactGroup {
    pub rule: RetentionRule,
    pub members: Vec<Artifact>,
}

/// Groups in first-seen insertion order, so a full evaluation pass is
/// deterministic for a given listing.
#[derive(Debug, Default)]
pub struct ArtifactGroups {
    groups: IndexMap<GroupKey, ArtifactGroup>,
}

impl ArtifactGroups {
    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &ArtifactGroup)> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Validate and group a component listing for one repository.
pub fn group_artifacts(components: &[Component], rules: &RuleSet) -> ArtifactGroups {
    let mut groups: IndexMap<GroupKey, ArtifactGroup> = IndexMap::new();

    for component in components {
        let Some(artifact) = Artifact::from_component(component) else {
            tracing::debug!(
                name = %component.name,
                version = %component.version,
                "skipping unclassifiable component"
            );
            continue;
        };

        if artifact.is_latest() {
            tracing::info!(
                name = %artifact.name,
                version = %artifact.version,
                "protected from deletion"
            );
            continue;
        }

        let rule = rules.match_version(&artifact.version);
        let key = GroupKey {
            name: artifact.name.clone(),
            pattern: rule.pattern.clone(),
        };

        groups
            .entry(key)
            .or_insert_with(|| ArtifactGroup {
                rule: rule.clone(),
                members: Vec::new(),
            })
            .members
            .push(artifact);
    }

    ArtifactGroups { groups }
}
