//! Scrapinghub HTTP client implementation

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{Result, ShubClientError};
use crate::streaming::{LineStream, StreamConfig, StreamRequest};
use crate::transport::{BatchResponse, Transport, TransportError};
use crate::types::*;

/// Default API location
pub const DEFAULT_API_URL: &str = "https://dash.scrapinghub.com/api/";

/// User-Agent the client identifies itself with
pub const USER_AGENT: &str = concat!("shub-client/", env!("CARGO_PKG_VERSION"));

/// Default request timeout; covers reading one whole batch body
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Scrapinghub REST API client
///
/// Cheap to clone; clones share one connection pool. Every stream spawned by
/// the client uses it as its [`Transport`].
#[derive(Debug, Clone)]
pub struct ShubClient {
    client: Client,
    base_url: Url,
    api_key: String,
    stream_config: StreamConfig,
    cancel: CancellationToken,
}

impl ShubClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - API root (e.g., "https://dash.scrapinghub.com/api/")
    /// * `api_key` - sent as the basic-auth user name
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        Self::with_config(base_url, api_key, DEFAULT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a new client with custom timeouts
    pub fn with_config(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        let mut base_url = Url::parse(base_url)?;
        // Resources resolve below the API path, never beside it
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
            stream_config: StreamConfig::default(),
            cancel: CancellationToken::new(),
        })
    }

    /// Use `config` for every stream spawned from now on
    pub fn with_stream_config(mut self, config: StreamConfig) -> Self {
        self.stream_config = config;
        self
    }

    /// Streams spawned by the returned client stop when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn stream_config(&self) -> &StreamConfig {
        &self.stream_config
    }

    /// Resolve an API resource such as `items.jl` or `/jobs/list.json`
    pub fn endpoint(&self, resource: &str) -> Result<Url> {
        Ok(self.base_url.join(resource.trim_start_matches('/'))?)
    }

    // =========================================================================
    // Line Streams
    // =========================================================================

    /// Stream an arbitrary resource
    pub fn stream(&self, request: StreamRequest) -> LineStream {
        LineStream::spawn_with_token(
            Arc::new(self.clone()),
            request,
            self.stream_config.clone(),
            self.cancel.clone(),
        )
    }

    /// Items of a job as JSON Lines (`items.jl`)
    #[instrument(skip(self))]
    pub fn items_as_json_lines(&self, job_id: &str, window: StreamWindow) -> Result<LineStream> {
        let request = Self::job_request("items.jl", job_id, QueryParams::new())?;
        Ok(self.stream(request.window(window)))
    }

    /// Items of a job as CSV rows (`items.csv`)
    #[instrument(skip(self))]
    pub fn items_as_csv(
        &self,
        job_id: &str,
        include_headers: bool,
        fields: &[String],
        window: StreamWindow,
    ) -> Result<LineStream> {
        let mut params = QueryParams::new();
        params
            .set("include_headers", if include_headers { "1" } else { "0" })
            .set("fields", fields.join(","));
        let request = Self::job_request("items.csv", job_id, params)?;
        Ok(self.stream(request.window(window)))
    }

    /// Log lines of a job (`log.txt`)
    #[instrument(skip(self))]
    pub fn log_lines(&self, job_id: &str, window: StreamWindow) -> Result<LineStream> {
        let request = Self::job_request("log.txt", job_id, QueryParams::new())?;
        Ok(self.stream(request.window(window)))
    }

    /// Jobs of a project as JSON Lines (`jobs/list.jl`), narrowed by `filters`
    #[instrument(skip(self))]
    pub fn jobs_as_json_lines(
        &self,
        project_id: &str,
        filters: &[(String, String)],
        window: StreamWindow,
    ) -> Result<LineStream> {
        let project: ProjectId = project_id.parse()?;
        let mut params: QueryParams = filters.iter().cloned().collect();
        params.set("project", project.as_str());
        let request = StreamRequest::new("jobs/list.jl", params).window(window);
        Ok(self.stream(request))
    }

    fn job_request(resource: &str, job_id: &str, mut params: QueryParams) -> Result<StreamRequest> {
        let job: JobId = job_id.parse()?;
        params
            .set("project", job.project_id().as_str())
            .set("job", job.as_str());
        Ok(StreamRequest::new(resource, params))
    }

    // =========================================================================
    // Job Queries
    // =========================================================================

    /// Fetch a single job document
    #[instrument(skip(self))]
    pub async fn job_info(&self, job_id: &str) -> Result<Job> {
        let job: JobId = job_id.parse()?;
        let mut params = QueryParams::new();
        params
            .set("project", job.project_id().as_str())
            .set("job", job.as_str());

        let list = self.get_job_list(&params).await?;
        list.jobs
            .into_iter()
            .next()
            .ok_or_else(|| ShubClientError::JobNotFound(job.to_string()))
    }

    /// List the jobs of a project, at most `count` when positive
    #[instrument(skip(self))]
    pub async fn list_jobs(
        &self,
        project_id: &str,
        count: i64,
        filters: &[(String, String)],
    ) -> Result<JobList> {
        let project: ProjectId = project_id.parse()?;
        let mut params: QueryParams = filters.iter().cloned().collect();
        params.set("project", project.as_str());
        if count > 0 {
            params.set("count", count.to_string());
        }
        self.get_job_list(&params).await
    }

    async fn get_job_list(&self, params: &QueryParams) -> Result<JobList> {
        let url = self.endpoint("jobs/list.json")?;
        debug!("Listing jobs from {}", url);

        let response = self
            .client
            .get(url)
            .basic_auth(&self.api_key, Some(""))
            .query(params.as_slice())
            .send()
            .await?;
        let list: JobList = self.handle_response(response).await?;
        if list.is_ok() {
            Ok(list)
        } else {
            Err(ShubClientError::ApiError(
                list.message.unwrap_or_else(|| format!("status {}", list.status)),
            ))
        }
    }

    // =========================================================================
    // Helper Methods
    // =========================================================================

    /// Handle response and deserialize JSON
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| ShubClientError::ParseError(e.to_string()))
        } else {
            Err(self.extract_error_from_status(response, status).await)
        }
    }

    async fn extract_error_from_status(
        &self,
        response: reqwest::Response,
        status: StatusCode,
    ) -> ShubClientError {
        #[derive(Deserialize)]
        struct ErrorBody {
            message: String,
        }

        // Try to parse error response body
        let message = match response.json::<ErrorBody>().await {
            Ok(err) => err.message,
            Err(_) => format!("HTTP {}", status),
        };
        ShubClientError::server_error(status.as_u16(), message)
    }
}

#[async_trait]
impl Transport for ShubClient {
    async fn fetch(
        &self,
        resource: &str,
        params: &QueryParams,
    ) -> std::result::Result<BatchResponse, TransportError> {
        let url = self.base_url.join(resource.trim_start_matches('/'))?;
        let response = self
            .client
            .get(url)
            .basic_auth(&self.api_key, Some(""))
            .query(params.as_slice())
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes_stream().map_err(io::Error::other);
        Ok(BatchResponse::new(status, Box::pin(body)))
    }
}
