//! HTTP knowledge backend client
//!
//! Speaks the backend's REST API over `reqwest`. Every request carries an
//! explicit timeout; non-2xx responses become [`BackendError::Http`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::backend_traits::{CognifyStatus, KnowledgeBackend, SearchHit, SearchType, WriteReceipt};
use crate::error::{BackendError, BackendResult};
use crate::normalize::{normalize_search_response, normalize_write_receipt};

/// Longest response body kept in an [`BackendError::Http`] message.
const MAX_ERROR_BODY: usize = 512;

/// Backend connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend, without trailing slash
    pub base_url: String,
    /// API key sent as `X-Api-Key` (optional for local deployments)
    pub api_key: Option<String>,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// User agent reported to the backend
    pub user_agent: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            base_url: std::env::var("MNEMOS_BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            api_key: std::env::var("MNEMOS_BACKEND_API_KEY").ok(),
            request_timeout_ms: std::env::var("MNEMOS_BACKEND_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15_000),
            user_agent: format!("mnemos-backend/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl BackendConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific server
    pub fn new(base_url: &str) -> Self {
        BackendConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            request_timeout_ms: 15_000,
            user_agent: format!("mnemos-backend/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Set authentication key
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    /// Set per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddRequest<'a> {
    data: &'a str,
    dataset_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dataset_id: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    search_type: &'static str,
    dataset_ids: &'a [String],
    top_k: usize,
}

/// Knowledge backend reached over HTTP
pub struct HttpKnowledgeBackend {
    config: BackendConfig,
    http_client: reqwest::Client,
}

impl HttpKnowledgeBackend {
    /// Create a new client
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        if config.base_url.is_empty() {
            return Err(BackendError::InvalidConfig("base_url is empty".into()));
        }
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| BackendError::InvalidConfig(e.to_string()))?;

        Ok(HttpKnowledgeBackend {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> BackendResult<Self> {
        Self::new(BackendConfig::from_env())
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .http_client
            .request(method, self.url(path))
            .timeout(self.config.request_timeout());
        match &self.config.api_key {
            Some(key) => builder.header("X-Api-Key", key),
            None => builder,
        }
    }

    /// Send a request and decode its JSON body, mapping failures to typed errors.
    async fn send(
        &self,
        operation: &str,
        builder: reqwest::RequestBuilder,
    ) -> BackendResult<Value> {
        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(operation, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::from_reqwest(operation, e))?;

        if !status.is_success() {
            let mut body = body;
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(BackendError::Http {
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl KnowledgeBackend for HttpKnowledgeBackend {
    #[instrument(skip(self, data), fields(dataset = %dataset_name))]
    async fn add(
        &self,
        data: &str,
        dataset_name: &str,
        dataset_id: Option<&str>,
    ) -> BackendResult<WriteReceipt> {
        let body = AddRequest {
            data,
            dataset_name,
            dataset_id,
        };
        let value = self
            .send("add", self.request(reqwest::Method::POST, "/api/v1/add").json(&body))
            .await?;
        let receipt = normalize_write_receipt(&value, dataset_name, dataset_id)?;
        debug!(dataset_id = %receipt.dataset_id, "added data to backend");
        Ok(receipt)
    }

    #[instrument(skip(self, data))]
    async fn update(
        &self,
        data_id: &str,
        dataset_id: &str,
        data: &str,
    ) -> BackendResult<WriteReceipt> {
        let builder = self
            .request(reqwest::Method::PATCH, "/api/v1/update")
            .query(&[("data_id", data_id), ("dataset_id", dataset_id)])
            .json(&json!({ "data": data }));
        let value = self.send("update", builder).await?;
        let mut receipt = normalize_write_receipt(&value, "", Some(dataset_id))?;
        if receipt.data_id.is_none() {
            receipt.data_id = Some(data_id.to_string());
        }
        Ok(receipt)
    }

    #[instrument(skip(self))]
    async fn delete(&self, data_id: &str, dataset_id: &str) -> BackendResult<()> {
        let builder = self
            .request(reqwest::Method::DELETE, "/api/v1/delete")
            .query(&[("data_id", data_id), ("dataset_id", dataset_id)]);
        self.send("delete", builder).await?;
        Ok(())
    }

    #[instrument(skip(self, query), fields(datasets = dataset_ids.len()))]
    async fn search(
        &self,
        query: &str,
        search_type: SearchType,
        dataset_ids: &[String],
        top_k: usize,
    ) -> BackendResult<Vec<SearchHit>> {
        let body = SearchRequest {
            query,
            search_type: search_type.as_wire(),
            dataset_ids,
            top_k,
        };
        let value = self
            .send(
                "search",
                self.request(reqwest::Method::POST, "/api/v1/search").json(&body),
            )
            .await?;
        let hits = normalize_search_response(&value);
        debug!(hits = hits.len(), "search completed");
        Ok(hits)
    }

    #[instrument(skip(self))]
    async fn cognify(&self, dataset_ids: &[String]) -> BackendResult<CognifyStatus> {
        let builder = self
            .request(reqwest::Method::POST, "/api/v1/cognify")
            .json(&json!({ "datasetIds": dataset_ids, "runInBackground": true }));
        let value = self.send("cognify", builder).await?;
        Ok(CognifyStatus {
            status: value
                .get("status")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_config_trims_trailing_slash() {
        let config = BackendConfig::new("http://backend:8000/");
        assert_eq!(config.base_url, "http://backend:8000");
    }

    #[test]
    fn test_builder_methods() {
        let config = BackendConfig::new("http://backend")
            .with_api_key("secret")
            .with_timeout(Duration::from_secs(3));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let mut config = BackendConfig::new("http://x");
        config.base_url.clear();
        assert!(matches!(
            HttpKnowledgeBackend::new(config),
            Err(BackendError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_add_request_serializes_camel_case() {
        let body = AddRequest {
            data: "hello",
            dataset_name: "alice-private",
            dataset_id: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["datasetName"], "alice-private");
        assert!(value.get("datasetId").is_none());
    }
}
