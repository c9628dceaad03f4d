//! Per-repository cleanup orchestration: list, select, delete.

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::grouping::group_artifacts;
use crate::metrics::Metrics;
use crate::model::{Artifact, Component};
use crate::registry::RegistryClient;
use crate::retention::select_deletions;
use crate::rules::RuleSet;
use crate::sink::DeletionSink;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanReport {
    pub scanned: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl CleanReport {
    pub fn merge(&mut self, other: &CleanReport) {
        self.scanned += other.scanned;
        self.deleted += other.deleted;
        self.failed += other.failed;
    }
}

/// Pure selection step: group a materialized listing and pick the deletions.
///
/// Everything network-facing stays outside; this is the whole retention
/// engine for one repository snapshot at one instant.
pub fn plan_deletions(components: &[Component], rules: &RuleSet, now: DateTime<Utc>) -> Vec<Artifact> {
    let groups = group_artifacts(components, rules);
    select_deletions(&groups, rules, now)
}

/// Drive the sink over the selected artifacts. A sink failure is logged and
/// counted, never propagated; the pass continues with the next artifact.
pub async fn execute_deletions(
    sink: &dyn DeletionSink,
    doomed: &[Artifact],
    metrics: &Metrics,
) -> (usize, usize) {
    let mut deleted = 0;
    let mut failed = 0;

    for artifact in doomed {
        match sink.delete(artifact).await {
            Ok(()) => {
                metrics.components_deleted.inc();
                deleted += 1;
            }
            Err(error) => {
                tracing::warn!(
                    name = %artifact.name,
                    version = %artifact.version,
                    %error,
                    "deletion failed"
                );
                metrics.delete_failures.inc();
                failed += 1;
            }
        }
    }

    (deleted, failed)
}

/// One full cleanup pass over a repository.
pub async fn clean_repository(
    client: &RegistryClient,
    sink: &dyn DeletionSink,
    rules: &RuleSet,
    metrics: &Metrics,
    repository: &str,
) -> Result<CleanReport, AppError> {
    tracing::info!(repository, "starting cleanup pass");
    let timer = metrics.clean_duration.start_timer();

    let components = client.list_components(repository).await?;
    metrics.components_scanned.inc_by(components.len() as u64);

    if components.is_empty() {
        tracing::info!(repository, "repository has no components");
        timer.observe_duration();
        return Ok(CleanReport::default());
    }

    let now = Utc::now();
    let doomed = plan_deletions(&components, rules, now);

    if doomed.is_empty() {
        tracing::info!(repository, scanned = components.len(), "nothing to delete");
        timer.observe_duration();
        return Ok(CleanReport {
            scanned: components.len(),
            ..CleanReport::default()
        });
    }

    tracing::info!(repository, count = doomed.len(), "deleting components");
    let (deleted, failed) = execute_deletions(sink, &doomed, metrics).await;
    timer.observe_duration();

    Ok(CleanReport {
        scanned: components.len(),
        deleted,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Asset, RetentionRule};
    use crate::sink::MockDeletionSink;
    use chrono::Duration;
    use mockall::predicate;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn component(name: &str, version: &str, days_old: i64) -> Component {
        Component {
            id: format!("{name}:{version}"),
            name: name.to_string(),
            version: version.to_string(),
            assets: vec![Asset {
                last_modified: Some((now() - Duration::days(days_old)).to_rfc3339()),
                last_downloaded: None,
            }],
        }
    }

    fn ruleset() -> RuleSet {
        let mut rules = RuleSet::new(RetentionRule::no_match(Some(30), None, None), None);
        rules.add_rule("^dev", Some(7), Some(1), None).unwrap();
        rules
    }

    #[test]
    fn plan_covers_grouping_and_selection() {
        let components = vec![
            component("app", "dev-1", 20),
            component("app", "dev-2", 1),
            component("app", "latest", 500),
            component("app", "1.0.0", 40),
        ];

        let doomed = plan_deletions(&components, &ruleset(), now());
        let versions: Vec<&str> = doomed.iter().map(|a| a.version.as_str()).collect();

        // dev-2 reserved, latest immune, dev-1 past 7d, 1.0.0 past fallback 30d.
        assert_eq!(versions, vec!["dev-1", "1.0.0"]);
    }

    #[tokio::test]
    async fn execute_passes_each_artifact_to_the_sink_once() {
        let metrics = Metrics::new().unwrap();
        let doomed = plan_deletions(
            &[component("app", "dev-1", 20), component("app", "dev-2", 25)],
            &ruleset(),
            now(),
        );
        assert_eq!(doomed.len(), 1);

        let mut sink = MockDeletionSink::new();
        sink.expect_delete()
            .with(predicate::function(|artifact: &Artifact| {
                artifact.version == "dev-2"
            }))
            .times(1)
            .returning(|_| Ok(()));

        let (deleted, failed) = execute_deletions(&sink, &doomed, &metrics).await;
        assert_eq!(deleted, 1);
        assert_eq!(failed, 0);
        assert_eq!(metrics.components_deleted.get(), 1);
    }

    #[tokio::test]
    async fn sink_failures_are_counted_not_propagated() {
        let metrics = Metrics::new().unwrap();
        let doomed = plan_deletions(
            &[
                component("app", "1.0.0", 40),
                component("other", "2.0.0", 50),
            ],
            &ruleset(),
            now(),
        );
        assert_eq!(doomed.len(), 2);

        let mut sink = MockDeletionSink::new();
        sink.expect_delete()
            .times(2)
            .returning(|artifact| {
                if artifact.name == "app" {
                    Err(crate::error::AppError::registry("boom"))
                } else {
                    Ok(())
                }
            });

        let (deleted, failed) = execute_deletions(&sink, &doomed, &metrics).await;
        assert_eq!(deleted, 1);
        assert_eq!(failed, 1);
        assert_eq!(metrics.delete_failures.get(), 1);
    }
}
