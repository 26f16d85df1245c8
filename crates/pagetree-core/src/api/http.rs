use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{ExportApi, ExportHandle, ExportStatusReport, JobStatus, PageInfo};
use crate::types::{OutputFormat, PageRef};
use crate::{Error, Result};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://coda.io/apis/v1";

/// reqwest-backed [`ExportApi`] speaking the service's REST API.
#[derive(Debug, Clone)]
pub struct HttpExportApi {
    client: Client,
    base_url: Url,
    auth: HeaderValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageResponse {
    name: String,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    children: Vec<ChildRef>,
}

#[derive(Debug, Deserialize)]
struct ChildRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BeginExportResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportStatusResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    download_link: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpExportApi {
    /// Build a client for `base_url` authenticated with `token`.
    ///
    /// Fails with [`Error::Config`] when the token is missing or blank, or the
    /// base URL does not parse. No request is made.
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "API token is not configured; set PAGETREE_API_TOKEN or [api].token"
                        .to_string(),
                )
            })?;
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid API base URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "API base URL '{base_url}' cannot hold a path"
            )));
        }
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| Error::Config("API token contains invalid characters".to_string()))?;
        auth.set_sensitive(true);

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pagetree/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            client,
            base_url,
            auth,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("API base URL '{}' cannot hold a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn page_endpoint(&self, page: &PageRef, extra: &[&str]) -> Result<Url> {
        let mut segments = vec!["docs", page.doc_id.as_str(), "pages", page.page_id.as_str()];
        segments.extend_from_slice(extra);
        self.endpoint(&segments)
    }
}

/// Map a non-success response onto the error taxonomy.
async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        body
    };
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(message),
        StatusCode::NOT_FOUND => Error::NotFound(what.to_string()),
        _ => Error::Api {
            status: status.as_u16(),
            message,
        },
    })
}

#[async_trait::async_trait]
impl ExportApi for HttpExportApi {
    async fn get_page(&self, page: &PageRef) -> Result<PageInfo> {
        let url = self.page_endpoint(page, &[])?;
        debug!(page = %page, "GET page metadata");
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.auth.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let body: PageResponse = check_status(response, &format!("page {page}"))
            .await?
            .json()
            .await
            .map_err(|e| Error::Parse(format!("page {page}: {e}")))?;

        Ok(PageInfo {
            name: body.name,
            children: body.children.into_iter().map(|c| c.id).collect(),
            updated_at: body.updated_at,
        })
    }

    async fn begin_export(&self, page: &PageRef, format: OutputFormat) -> Result<ExportHandle> {
        let url = self.page_endpoint(page, &["export"])?;
        debug!(page = %page, format = format.as_str(), "POST export");
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, self.auth.clone())
            .json(&serde_json::json!({ "outputFormat": format.as_str() }))
            .send()
            .await?;
        let body: BeginExportResponse = check_status(response, &format!("page {page}"))
            .await?
            .json()
            .await
            .map_err(|e| Error::Parse(format!("export submission for {page}: {e}")))?;

        Ok(ExportHandle {
            job_id: body.id,
            status: body
                .status
                .as_deref()
                .map_or(JobStatus::InProgress, JobStatus::from_wire),
        })
    }

    async fn export_status(&self, page: &PageRef, job_id: &str) -> Result<ExportStatusReport> {
        let url = self.page_endpoint(page, &["export", job_id])?;
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.auth.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let body: ExportStatusResponse =
            check_status(response, &format!("export job {job_id} for {page}"))
                .await?
                .json()
                .await
                .map_err(|e| Error::Parse(format!("export status for {page}: {e}")))?;

        Ok(ExportStatusReport {
            status: body.status.as_deref().map(JobStatus::from_wire),
            download_ref: body.download_link,
            error: body.error,
        })
    }

    async fn fetch_content(&self, download_ref: &str) -> Result<String> {
        // Download links are pre-signed and take no auth header.
        let response = self.client.get(download_ref).send().await?;
        let content = check_status(response, "export download")
            .await?
            .text()
            .await?;
        debug!(bytes = content.len(), "Fetched exported content");
        Ok(content)
    }
}
