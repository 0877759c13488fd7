//! HTTP client for the capability/trigger catalog service

use async_trait::async_trait;
use roster_core::{Catalog, CapabilityProvider, Result, RosterError, TriggerInfo};
use serde::de::DeserializeOwned;
use std::env;
use tracing::instrument;

/// Environment variable holding the optional catalog bearer token
pub const CATALOG_TOKEN_ENV: &str = "ROSTER_CATALOG_TOKEN";

const ORGANIZATION_HEADER: &str = "x-organization-id";

/// Catalog backed by `GET {base}/capabilities` and `GET {base}/triggers`
///
/// Every request is scoped to one organization.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    base_url: String,
    organization_id: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl HttpCatalog {
    pub fn new(base_url: impl Into<String>, organization_id: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            organization_id: organization_id.into(),
            token: env::var(CATALOG_TOKEN_ENV).ok().filter(|t| !t.is_empty()),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path);
        tracing::debug!("GET {}", url);

        let mut request = self
            .http
            .get(&url)
            .header(ORGANIZATION_HEADER, &self.organization_id);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RosterError::Catalog(format!("Failed to reach {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            return Err(RosterError::Catalog(format!(
                "Catalog error {} from {}: {}",
                status, url, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RosterError::Catalog(format!("Invalid response from {}: {}", url, e)))
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    #[instrument(skip(self), fields(org = %self.organization_id))]
    async fn capabilities(&self) -> Result<Vec<CapabilityProvider>> {
        self.get("capabilities").await
    }

    #[instrument(skip(self), fields(org = %self.organization_id))]
    async fn triggers(&self) -> Result<Vec<TriggerInfo>> {
        self.get("triggers").await
    }
}
