// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Registry REST client.
//!
//! Handles component listing (with continuation-token pagination fully
//! materialized before the retention engine runs), component deletion, and
//! the telemetry reads used by the exporter.

use std::time::Duration;

use anyhow::anyhow;
use reqwest::{Client, Method, RequestBuilder, StatusCode};

use crate::error::AppError;
use crate::model::{BlobStoreInfo, Component, ComponentPage, RepositoryInfo, TaskInfo, TaskPage};

/// HTTP client wrapper for talking to the registry API.
#[derive(Clone)]
pub struct RegistryClient {
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    client: Client,
}

impl RegistryClient {
    pub fn try_new(
        base_url: &str,
        username: Option<String>,
        password: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow!("Failed to build registry client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
            client,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.request(method, url);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }
        request
    }

    /// List every component of a repository, following continuation tokens
    /// until the listing is exhausted.
    pub async fn list_components(&self, repository: &str) -> Result<Vec<Component>, AppError> {
        let mut components = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .request(Method::GET, "/service/rest/v1/components")
                .query(&[("repository", repository)]);
            if let Some(token) = &continuation_token {
                request = request.query(&[("continuationToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| AppError::registry(format!("component listing failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                return Err(AppError::registry(format!(
                    "component listing returned unexpected status {status}"
                )));
            }

            let page = response
                .json::<ComponentPage>()
                .await
                .map_err(|e| AppError::registry(format!("failed to parse component page: {e}")))?;

            components.extend(page.items);
            continuation_token = page.continuation_token;

            if continuation_token.is_none() {
                break;
            }
        }

        Ok(components)
    }

    /// Delete one component by id. A 404 means someone got there first; it
    /// is logged and treated as success.
    pub async fn delete_component(
        &self,
        id: &str,
        name: &str,
        version: &str,
    ) -> Result<(), AppError> {
        let path = format!("/service/rest/v1/components/{id}");
        let response = self
            .request(Method::DELETE, &path)
            .send()
            .await
            .map_err(|e| AppError::registry(format!("delete request failed: {e}")))?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            tracing::warn!(id, name, version, "component already gone (404)");
            return Ok(());
        }

        if !status.is_success() {
            return Err(AppError::registry(format!(
                "delete of {name}:{version} returned unexpected status {status}"
            )));
        }

        tracing::info!(id, name, version, "deleted component");
        Ok(())
    }

    pub async fn repositories(&self) -> Result<Vec<RepositoryInfo>, AppError> {
        let response = self
            .request(Method::GET, "/service/rest/v1/repositories")
            .send()
            .await
            .map_err(|e| AppError::registry(format!("repository listing failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::registry(format!(
                "repository listing returned unexpected status {}",
                response.status()
            )));
        }

        response
            .json::<Vec<RepositoryInfo>>()
            .await
            .map_err(|e| AppError::registry(format!("failed to parse repository listing: {e}")))
    }

    pub async fn blobstores(&self) -> Result<Vec<BlobStoreInfo>, AppError> {
        let response = self
            .request(Method::GET, "/service/rest/v1/blobstores")
            .send()
            .await
            .map_err(|e| AppError::registry(format!("blob store listing failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::registry(format!(
                "blob store listing returned unexpected status {}",
                response.status()
            )));
        }

        response
            .json::<Vec<BlobStoreInfo>>()
            .await
            .map_err(|e| AppError::registry(format!("failed to parse blob store listing: {e}")))
    }

    pub async fn tasks(&self) -> Result<Vec<TaskInfo>, AppError> {
        let mut tasks = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.request(Method::GET, "/service/rest/v1/tasks");
            if let Some(token) = &continuation_token {
                request = request.query(&[("continuationToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| AppError::registry(format!("task listing failed: {e}")))?;

            if !response.status().is_success() {
                return Err(AppError::registry(format!(
                    "task listing returned unexpected status {}",
                    response.status()
                )));
            }

            let page = response
                .json::<TaskPage>()
                .await
                .map_err(|e| AppError::registry(format!("failed to parse task page: {e}")))?;

            tasks.extend(page.items);
            continuation_token = page.continuation_token;

            if continuation_token.is_none() {
                break;
            }
        }

        Ok(tasks)
    }
}
