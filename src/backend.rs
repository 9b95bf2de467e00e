use crate::engine::{BackendResponse, ExecutionBackend};
use crate::error::TransportError;
use crate::http_client::HttpClient;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use url::Url;

#[derive(Serialize)]
pub(crate) struct CurlPayload<'a> {
    pub curl_command: &'a str,
}

/// Resolve `path` under `base`, keeping any path prefix `base` carries.
pub(crate) fn endpoint_url(base: &str, path: &str) -> Result<String, TransportError> {
    let mut base = Url::parse(base).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", base, e)))?;
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
        .map(String::from)
        .map_err(|e| TransportError::InvalidUrl(e.to_string()))
}

/// Execution backend reached over HTTP at `<base>/execute-curl`.
pub struct HttpExecutionBackend {
    client: HttpClient,
    endpoint: String,
}

impl HttpExecutionBackend {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, TransportError> {
        Ok(Self {
            client: HttpClient::new(timeout)?,
            endpoint: endpoint_url(base_url, "execute-curl")?,
        })
    }
}

#[async_trait]
impl ExecutionBackend for HttpExecutionBackend {
    async fn execute_curl(&self, curl_command: &str) -> Result<BackendResponse, TransportError> {
        let response = self
            .client
            .post_json(&self.endpoint, &CurlPayload { curl_command })
            .await?;

        // error payloads come back with 4xx/5xx statuses, so decode regardless
        serde_json::from_slice(&response.body).map_err(|e| {
            TransportError::MalformedResponse(format!(
                "HTTP {} from execution backend: {}",
                response.status, e
            ))
        })
    }
}
