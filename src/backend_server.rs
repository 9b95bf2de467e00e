//! A local execution backend: receives `{curl_command}`, performs the request
//! the command describes and answers with status, headers and body.

use crate::engine::{preview, BackendResponse};
use crate::http_client::HttpClient;
use crate::invocation::parse_invocation;
use anyhow::Result;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    #[serde(default)]
    curl_command: Option<String>,
}

pub async fn run(config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(config.addr).await?;

    println!("Execution backend starting on http://{}", listener.local_addr()?);
    println!("Routes:");
    println!("  POST /execute-curl");
    println!("  GET  /health");
    println!("\nPress Ctrl+C to stop\n");

    serve(listener, config.request_timeout).await
}

/// Accept connections forever, one task per connection.
pub async fn serve(listener: TcpListener, request_timeout: Duration) -> Result<()> {
    let client = Arc::new(HttpClient::new(Some(request_timeout))?);
    info!("Execution backend listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);

        // Each connection gets its own task
        let client = client.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, client.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                warn!("Connection error from {}: {}", peer, e);
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    client: Arc<HttpClient>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("{} {}", method, path);

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => json_response(StatusCode::OK, &json!({"status": "ok"})),
        (&Method::POST, "/execute-curl") => execute_curl(req, &client).await,
        _ => json_response(
            StatusCode::NOT_FOUND,
            &json!({"status": "error", "error": "Not Found"}),
        ),
    };

    Ok(response)
}

async fn execute_curl(req: Request<Incoming>, client: &HttpClient) -> Response<Full<Bytes>> {
    // Read the JSON payload
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &BackendResponse::error(format!("Failed to read request body: {}", e)),
            )
        }
    };

    let curl_command = serde_json::from_slice::<ExecuteRequest>(&body)
        .ok()
        .and_then(|r| r.curl_command)
        .filter(|c| !c.trim().is_empty());

    let curl_command = match curl_command {
        Some(c) => c,
        None => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &BackendResponse::error("No curl command provided"),
            )
        }
    };

    info!("Executing curl command: {}...", preview(&curl_command, 50));

    // Turn the command into method, URL, headers and body
    let invocation = match parse_invocation(&curl_command) {
        Ok(invocation) => invocation,
        Err(e) => {
            warn!("{}", e);
            return json_response(StatusCode::BAD_REQUEST, &BackendResponse::error(e.to_string()));
        }
    };

    // Replay it; a body that is not JSON goes back as text
    match client
        .request(
            &invocation.method,
            &invocation.url,
            &invocation.headers,
            invocation.body.as_deref(),
        )
        .await
    {
        Ok(response) => {
            let payload = match serde_json::from_slice::<Value>(&response.body) {
                Ok(value) => value,
                Err(_) => Value::String(response.text()),
            };
            json_response(
                StatusCode::OK,
                &BackendResponse::success(response.status, response.headers, payload),
            )
        }
        Err(e) => {
            error!("Error executing curl command: {}", e);
            json_response(StatusCode::BAD_GATEWAY, &BackendResponse::error(e.to_string()))
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, payload: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(payload).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HttpExecutionBackend;
    use crate::engine::{Outcome, TestExecutionEngine};
    use crate::test_case::{Classification, ExpectedStatus, TestCase};
    use std::collections::HashMap;

    async fn start() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, Duration::from_secs(5)));
        addr
    }

    fn engine(addr: SocketAddr) -> TestExecutionEngine<HttpExecutionBackend> {
        let backend = HttpExecutionBackend::new(&format!("http://{}", addr), Some(Duration::from_secs(10))).unwrap();
        TestExecutionEngine::new(backend)
    }

    #[tokio::test]
    async fn test_execute_against_self() {
        let addr = start().await;
        let engine = engine(addr);

        let health = TestCase::new(
            "health",
            "positive",
            format!("curl --location 'http://{}/health'", addr),
            Some(ExpectedStatus::from("200")),
        );
        let result = engine.execute(&health).await;
        assert_eq!(result.status_code(), Some(200));
        assert_eq!(result.classification, Some(Classification::Match));
        match &result.outcome {
            Outcome::Success { response, headers, .. } => {
                assert_eq!(response.as_ref().unwrap()["status"], "ok");
                assert_eq!(headers.as_ref().unwrap()["content-type"], "application/json");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let missing = TestCase::new(
            "unknown route",
            "negative",
            format!("curl 'http://{}/nope'", addr),
            Some(ExpectedStatus::Code(200)),
        );
        let result = engine.execute(&missing).await;
        assert_eq!(result.status_code(), Some(404));
        assert_eq!(result.classification, Some(Classification::Mismatch));
    }

    #[tokio::test]
    async fn test_placeholder_is_backend_error() {
        let addr = start().await;
        let engine = engine(addr);

        let test_case = TestCase::new(
            "placeholder",
            "positive",
            format!("curl 'http://{}/health' --header 'X-Key: <API_KEY>'", addr),
            None,
        );
        let result = engine.execute(&test_case).await;

        assert_eq!(
            result.outcome,
            Outcome::BackendError(
                "Found placeholder values that need to be replaced: <API_KEY>".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_unreachable_target_is_backend_error() {
        let addr = start().await;
        let engine = engine(addr);

        let test_case = TestCase::new("down", "positive", "curl http://127.0.0.1:1/", None);
        let result = engine.execute(&test_case).await;

        match result.outcome {
            Outcome::BackendError(message) => assert!(message.starts_with("Request failed")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_command_rejected() {
        let addr = start().await;
        let client = HttpClient::new(Some(Duration::from_secs(5))).unwrap();

        let response = client
            .post_json(&format!("http://{}/execute-curl", addr), &json!({}))
            .await
            .unwrap();

        assert_eq!(response.status, 400);
        let reply: BackendResponse = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(reply, BackendResponse::error("No curl command provided"));

        let response = client
            .request("GET", &format!("http://{}/other", addr), &HashMap::new(), None)
            .await
            .unwrap();
        assert_eq!(response.status, 404);
    }
}
