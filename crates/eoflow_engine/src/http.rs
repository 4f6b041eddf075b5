//! reqwest adapter for a JSON engine gateway.
//!
//! Endpoints, relative to the configured base URL:
//!
//! ```text
//! POST   jobs                              JobSpec        -> {"id": ...}
//! GET    jobs/{id}                                        -> JobStatusReport
//! POST   jobs/{id}/cancel
//! GET    collections/{c}/assets                           -> {"assets": [...]}
//! GET    collections/{c}/sources?date=YYYY-MM-DD          -> SourceAvailability
//! DELETE collections/{c}/assets/{a}
//! GET    exports/{destination}/{object}                   -> raw bytes
//! DELETE exports/{destination}/{object}
//! ```
//!
//! Collection ids may contain `/`; each id is sent as a single encoded
//! path segment.

use async_trait::async_trait;
use chrono::NaiveDate;
use eoflow_protocol::{EngineConfig, JobId};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::engine::ComputeEngine;
use crate::error::{EngineError, Result};
use crate::types::{AssetListing, JobSpec, JobStatusReport, SourceAvailability};

#[derive(Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Deserialize)]
struct AssetListResponse {
    #[serde(default)]
    assets: Vec<AssetListing>,
}

pub struct HttpComputeEngine {
    base: Url,
    token: Option<String>,
    http_client: reqwest::Client,
}

impl HttpComputeEngine {
    pub fn new(config: &EngineConfig, token: Option<String>) -> Result<Self> {
        let mut raw = config.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base = Url::parse(&raw).map_err(|e| EngineError::Url(format!("{raw}: {e}")))?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base,
            token,
            http_client,
        })
    }

    /// Base URL joined with `segments`, each percent-encoded as one segment.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| EngineError::Url(format!("{} cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        match status.as_u16() {
            400 | 404 | 422 => Err(EngineError::rejected(format!("HTTP {status}: {body}"))),
            code => Err(EngineError::Status { status: code, body }),
        }
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| EngineError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ComputeEngine for HttpComputeEngine {
    async fn submit(&self, spec: &JobSpec) -> Result<JobId> {
        let url = self.endpoint(&["jobs"])?;
        let response = self.send(self.http_client.post(url).json(spec)).await?;
        let body: SubmitResponse = Self::decode(response).await?;
        Ok(JobId::new(body.id))
    }

    async fn status(&self, job_id: &JobId) -> Result<JobStatusReport> {
        let url = self.endpoint(&["jobs", job_id.as_str()])?;
        let response = self.send(self.http_client.get(url)).await?;
        let mut report: JobStatusReport = Self::decode(response).await?;
        if report.id.is_empty() {
            report.id = job_id.to_string();
        }
        Ok(report)
    }

    async fn cancel(&self, job_id: &JobId) -> Result<()> {
        let url = self.endpoint(&["jobs", job_id.as_str(), "cancel"])?;
        self.send(self.http_client.post(url)).await?;
        Ok(())
    }

    async fn list_assets(&self, collection: &str) -> Result<Vec<AssetListing>> {
        let url = self.endpoint(&["collections", collection, "assets"])?;
        let response = self.send(self.http_client.get(url)).await?;
        let body: AssetListResponse = Self::decode(response).await?;
        Ok(body.assets)
    }

    async fn source_availability(
        &self,
        collection: &str,
        date: NaiveDate,
    ) -> Result<SourceAvailability> {
        let mut url = self.endpoint(&["collections", collection, "sources"])?;
        url.query_pairs_mut()
            .append_pair("date", &date.format("%Y-%m-%d").to_string());
        let response = self.send(self.http_client.get(url)).await?;
        Self::decode(response).await
    }

    async fn delete_asset(&self, collection: &str, asset_id: &str) -> Result<()> {
        let url = self.endpoint(&["collections", collection, "assets", asset_id])?;
        self.send(self.http_client.delete(url)).await?;
        Ok(())
    }
    async fn fetch_export(&self, destination: &str, object: &str) -> Result<Vec<u8>> {
        let url = self.endpoint(&["exports", destination, object])?;
        let response = self.send(self.http_client.get(url)).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn delete_export(&self, destination: &str, object: &str) -> Result<()> {
        let url = self.endpoint(&["exports", destination, object])?;
        self.send(self.http_client.delete(url)).await?;
        Ok(())
    }
}
