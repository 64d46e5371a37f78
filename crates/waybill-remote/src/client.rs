use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use waybill_core::action::{Blob, Fields};
use waybill_core::config::{Config, UploadMode};
use waybill_core::executor::{ActionExecutor, ObjectStorage, RecordApi};
use waybill_core::BackendError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest error body echoed back in a `Rejected` message.
const MAX_ERROR_BODY: usize = 200;

/// HTTP client for the hosted backend: PostgREST-style record updates and
/// object storage uploads.
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base: Url,
    api_key: Option<String>,
    upload_mode: UploadMode,
}

#[derive(Serialize)]
struct UploadUrlRequest<'a> {
    bucket_name: &'a str,
    object_key: &'a str,
}

#[derive(Deserialize)]
struct UploadUrlResponse {
    upload_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl BackendClient {
    pub fn new(base_url: &str, api_key: Option<String>, upload_mode: UploadMode) -> Result<Self, BackendError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(BackendError::InvalidUrl(base_url.to_string()));
        }
        let base = Url::parse(base_url).map_err(|e| BackendError::InvalidUrl(format!("{base_url}: {e}")))?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base,
            api_key,
            upload_mode,
        })
    }

    pub fn from_config(config: &Config) -> waybill_core::Result<Self> {
        let url = config.backend_url()?;
        Ok(Self::new(url, config.backend.api_key(), config.backend.upload_mode)?)
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// Append percent-encoded path segments to the base url.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, BackendError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("apikey", key).bearer_auth(key),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, BackendError> {
        let resp = req
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(BackendError::Rejected {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn upload_direct(&self, bucket: &str, key: &str, content_type: &str, data: &Blob) -> Result<(), BackendError> {
        // Slashes in the key address nested objects; everything else is encoded.
        let url = self.endpoint(["storage", "v1", "object", bucket].into_iter().chain(key.split('/')))?;
        let req = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(data.as_bytes().to_vec());
        self.send(self.authorize(req)).await?;
        Ok(())
    }

    async fn upload_signed(&self, bucket: &str, key: &str, content_type: &str, data: &Blob) -> Result<(), BackendError> {
        let url = self.endpoint(["api", "v1", "storage", "upload-url"])?;
        let req = self.http.post(url).json(&UploadUrlRequest {
            bucket_name: bucket,
            object_key: key,
        });
        let grant: UploadUrlResponse = self
            .send(self.authorize(req))
            .await?
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("upload-url: {e}")))?;

        // Relative URLs are served by the same backend.
        let target = if grant.upload_url.starts_with('/') {
            format!("{}{}", self.base_url(), grant.upload_url)
        } else {
            grant.upload_url
        };
        debug!(bucket, key, "uploading to pre-authorized url");
        let put = self
            .http
            .put(&target)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data.as_bytes().to_vec());
        self.send(put).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordApi for BackendClient {
    async fn update(&self, collection: &str, id: i64, fields: &Fields) -> Result<(), BackendError> {
        let url = self.endpoint(["rest", "v1", collection])?;
        let req = self
            .http
            .patch(url)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(fields);
        self.send(self.authorize(req)).await.map_err(|e| {
            warn!(collection, id, error = %e, "record update failed");
            e
        })?;
        debug!(collection, id, "record updated");
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for BackendClient {
    async fn upload(&self, bucket: &str, key: &str, content_type: &str, data: &Blob) -> Result<(), BackendError> {
        let result = match self.upload_mode {
            UploadMode::Direct => self.upload_direct(bucket, key, content_type, data).await,
            UploadMode::SignedUrl => self.upload_signed(bucket, key, content_type, data).await,
        };
        match &result {
            Ok(()) => debug!(bucket, key, bytes = data.len(), "object uploaded"),
            Err(e) => warn!(bucket, key, error = %e, "object upload failed"),
        }
        result
    }
}

/// Build the executor that replays actions against the configured backend.
pub fn executor(config: &Config) -> waybill_core::Result<ActionExecutor> {
    let client = Arc::new(BackendClient::from_config(config)?);
    Ok(ActionExecutor::new(client.clone(), client, config.targets.clone()))
}

fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(msg) = parsed.message.or(parsed.error) {
            return msg;
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no response body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}
