use crate::error::TransportError;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Uri};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

type HttpsConnector = hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;

/// Status, headers and the fully collected body of a response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP client on hyper 1.x with rustls; plain HTTP and HTTPS.
pub struct HttpClient {
    client: Client<HttpsConnector, Full<Bytes>>,
    timeout: Option<Duration>,
}

impl HttpClient {
    /// `timeout` of `None` waits for the server indefinitely.
    pub fn new(timeout: Option<Duration>) -> Result<Self, TransportError> {
        // install once per process; later calls are no-ops
        let _ = rustls::crypto::ring::default_provider().install_default();

        let builder = match HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            Err(e) => {
                // plain HTTP keeps working; HTTPS targets fail certificate verification
                tracing::warn!("Failed to load native certs: {}", e);
                let tls = rustls::ClientConfig::builder()
                    .with_root_certificates(rustls::RootCertStore::empty())
                    .with_no_client_auth();
                HttpsConnectorBuilder::new().with_tls_config(tls)
            }
        };

        let https = builder
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build(https);

        Ok(Self { client, timeout })
    }

    /// POST `payload` as JSON.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
    ) -> Result<HttpResponse, TransportError> {
        let body = serde_json::to_string(payload)
            .map_err(|e| TransportError::BuildRequest(e.to_string()))?;

        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());

        self.request("POST", url, &headers, Some(&body)).await
    }

    /// Send the request and collect the whole body.
    ///
    /// The timeout covers the exchange end to end, body included.
    pub async fn request(
        &self,
        method: &str,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<&str>,
    ) -> Result<HttpResponse, TransportError> {
        // Parse URL and method
        let uri: Uri = url
            .parse()
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url, e)))?;

        let http_method = Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|e| TransportError::BuildRequest(format!("invalid method {}: {}", method, e)))?;

        // Build request body
        let body_data = match body {
            Some(data) => Full::new(Bytes::from(data.to_string())),
            None => Full::new(Bytes::new()),
        };

        let mut request = Request::builder().method(http_method).uri(uri);

        // Add headers
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let request = request
            .body(body_data)
            .map_err(|e| TransportError::BuildRequest(e.to_string()))?;

        tracing::debug!("{} {}", method, url);

        // Send and collect under one deadline
        let exchange = self.exchange(request);
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => exchange.await,
        }
    }

    async fn exchange(&self, request: Request<Full<Bytes>>) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| TransportError::Request(describe_client_error(&e)))?;

        let status = response.status().as_u16();

        // Repeated headers (Set-Cookie etc.) are joined, not dropped
        let mut response_headers: HashMap<String, String> = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                response_headers
                    .entry(name.as_str().to_string())
                    .and_modify(|existing| {
                        existing.push_str(", ");
                        existing.push_str(value);
                    })
                    .or_insert_with(|| value.to_string());
            }
        }

        // Read the full body
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| TransportError::ReadBody(e.to_string()))?
            .to_bytes();

        Ok(HttpResponse {
            status,
            headers: response_headers,
            body,
        })
    }
}

/// The legacy client's Display hides the cause ("client error (Connect)");
/// include the source chain so "connection refused" reaches the user.
fn describe_client_error(err: &hyper_util::client::legacy::Error) -> String {
    use std::error::Error;

    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
