use async_trait::async_trait;

use crate::error::AppError;
use crate::model::Artifact;
use crate::registry::RegistryClient;

#[cfg(test)]
use mockall::automock;

/// Destination for artifacts the selector condemned.
///
/// The retention engine never inspects the outcome beyond logging it;
/// physical deletion is entirely the sink's concern.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeletionSink: Send + Sync {
    async fn delete(&self, artifact: &Artifact) -> Result<(), AppError>;
}

/// Sink that issues real deletes against the registry.
pub struct RegistrySink {
    client: RegistryClient,
}

impl RegistrySink {
    pub fn new(client: RegistryClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeletionSink for RegistrySink {
    async fn delete(&self, artifact: &Artifact) -> Result<(), AppError> {
        self.client
            .delete_component(&artifact.id, &artifact.name, &artifact.version)
            .await
    }
}

/// No-op sink for rehearsing a cleanup pass.
pub struct DryRunSink;

#[async_trait]
impl DeletionSink for DryRunSink {
    async fn delete(&self, artifact: &Artifact) -> Result<(), AppError> {
        tracing::info!(
            id = %artifact.id,
            name = %artifact.name,
            version = %artifact.version,
            "[dry-run] would delete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn dry_run_sink_always_succeeds() {
        let artifact = Artifact {
            id: "abc".to_string(),
            name: "app".to_string(),
            version: "dev-1".to_string(),
            last_modified: Utc::now(),
            last_downloaded: None,
        };

        assert!(DryRunSink.delete(&artifact).await.is_ok());
    }
}
