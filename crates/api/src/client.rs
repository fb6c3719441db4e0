//! reqwest implementation of [`ScanApi`]

use async_trait::async_trait;
use bytes::Bytes;
use cgm_rg_common::config::ApiConfig;
use cgm_rg_common::{ResultRecord, ScanMetadata, Workflow};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::{ApiError, ScanApi};

const API_KEY_HEADER: &str = "X-API-Key";

/// HTTP client for the scan-metadata service
#[derive(Debug, Clone)]
pub struct HttpScanApi {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WorkflowListing {
    Wrapped { workflows: Vec<Workflow> },
    Bare(Vec<Workflow>),
}

#[derive(Deserialize)]
struct PostedFile {
    #[serde(alias = "file_id")]
    id: String,
}

#[derive(Serialize)]
struct ResultBatch<'a> {
    results: &'a [ResultRecord],
}

impl HttpScanApi {
    /// Build a client from the `api` configuration section
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    /// Send a request and turn non-2xx responses into [`ApiError::Status`]
    async fn send(
        &self,
        method: &'static str,
        url: &str,
        request: RequestBuilder,
    ) -> Result<Response, ApiError> {
        debug!("{} {}", method, url);
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                method,
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.send("GET", &url, self.client.get(&url)).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Decode {
            url,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ScanApi for HttpScanApi {
    async fn get_scan_metadata(&self, scan_id: &str) -> Result<ScanMetadata, ApiError> {
        let mut scan: ScanMetadata = self.get_json(&format!("scans/{scan_id}")).await?;
        scan.attach_scan_ids();
        Ok(scan)
    }

    async fn get_workflows(&self) -> Result<Vec<Workflow>, ApiError> {
        Ok(match self.get_json::<WorkflowListing>("workflows").await? {
            WorkflowListing::Wrapped { workflows } | WorkflowListing::Bare(workflows) => workflows,
        })
    }

    async fn get_file(&self, file_id: &str) -> Result<Bytes, ApiError> {
        let url = self.url(&format!("files/{file_id}"));
        let response = self.send("GET", &url, self.client.get(&url)).await?;
        Ok(response.bytes().await?)
    }

    async fn post_file(&self, data: Bytes, mime_type: &str) -> Result<String, ApiError> {
        let url = self.url("files");
        let request = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(data);
        let text = self.send("POST", &url, request).await?.text().await?;
        // The service answers with either `{"id": ...}` or the bare id
        match serde_json::from_str::<PostedFile>(&text) {
            Ok(posted) => Ok(posted.id),
            Err(_) => {
                let id = text.trim().trim_matches('"').to_string();
                if id.is_empty() {
                    Err(ApiError::Decode {
                        url,
                        reason: "empty file id".to_string(),
                    })
                } else {
                    Ok(id)
                }
            }
        }
    }

    async fn post_results(&self, results: &[ResultRecord]) -> Result<(), ApiError> {
        let url = self.url("results");
        let request = self.client.post(&url).json(&ResultBatch { results });
        self.send("POST", &url, request).await?;
        debug!("Posted {} results", results.len());
        Ok(())
    }
}
