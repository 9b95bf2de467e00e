//! Test-case providers: a remote generation service, or a local generator
//! that derives header-focused variants from the request itself.

use crate::backend::{endpoint_url, CurlPayload};
use crate::error::{InvocationError, ProviderError};
use crate::http_client::HttpClient;
use crate::invocation::{parse_invocation, CurlInvocation};
use crate::test_case::{ExpectedStatus, TestCase};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

#[async_trait]
pub trait TestCaseProvider: Send + Sync {
    async fn generate(&self, curl_command: &str) -> Result<Vec<TestCase>, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    status: String,
    #[serde(default)]
    test_cases: Option<Vec<TestCase>>,
    #[serde(default)]
    error: Option<String>,
}

/// Remote generator reached at `<base>/generate-tests`.
pub struct HttpTestCaseProvider {
    client: HttpClient,
    endpoint: String,
}

impl HttpTestCaseProvider {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: HttpClient::new(timeout)?,
            endpoint: endpoint_url(base_url, "generate-tests")?,
        })
    }
}

#[async_trait]
impl TestCaseProvider for HttpTestCaseProvider {
    async fn generate(&self, curl_command: &str) -> Result<Vec<TestCase>, ProviderError> {
        let response = self
            .client
            .post_json(&self.endpoint, &CurlPayload { curl_command })
            .await?;

        let reply: GenerateResponse = serde_json::from_slice(&response.body).map_err(|e| {
            crate::error::TransportError::MalformedResponse(format!(
                "HTTP {} from test case generator: {}",
                response.status, e
            ))
        })?;

        interpret(reply)
    }
}

fn interpret(reply: GenerateResponse) -> Result<Vec<TestCase>, ProviderError> {
    if reply.status != "success" {
        return Err(ProviderError::Reported(
            reply
                .error
                .unwrap_or_else(|| "No test results available".to_string()),
        ));
    }

    match reply.test_cases {
        Some(cases) if !cases.is_empty() => {
            info!("Generated {} test cases", cases.len());
            Ok(cases)
        }
        _ => Err(ProviderError::Empty),
    }
}

/// Deterministic local generator: a baseline case plus a missing and an
/// invalid-value variant for every header on the request.
pub struct BasicTestCaseProvider {
    success_status: u16,
    failure_status: u16,
    invalid_value: String,
}

impl Default for BasicTestCaseProvider {
    fn default() -> Self {
        Self {
            success_status: 200,
            failure_status: 400,
            invalid_value: "invalid_value".to_string(),
        }
    }
}

impl BasicTestCaseProvider {
    /// Variants keep the method, URL, body and every other header of the
    /// original request; only the header under test changes.
    pub fn generate_cases(&self, curl_command: &str) -> Result<Vec<TestCase>, InvocationError> {
        let request = parse_invocation(curl_command)?;

        // the baseline runs the command exactly as given
        let mut cases = vec![TestCase::new(
            "Baseline positive test with all valid parameters",
            "positive",
            curl_command,
            Some(ExpectedStatus::from(self.success_status)),
        )];

        let mut names: Vec<&String> = request.headers.keys().collect();
        names.sort();

        // A missing and an invalid variant per header
        for name in names {
            let mut missing = request.clone();
            missing.headers.remove(name);
            cases.push(self.negative(format!("Missing required header: {}", name), &missing));

            let mut invalid = request.clone();
            invalid
                .headers
                .insert(name.clone(), self.invalid_value.clone());
            cases.push(self.negative(format!("Invalid value for header: {}", name), &invalid));
        }

        Ok(cases)
    }

    fn negative(&self, description: String, request: &CurlInvocation) -> TestCase {
        TestCase::new(
            description,
            "negative",
            request.to_curl_command(),
            Some(ExpectedStatus::from(self.failure_status)),
        )
    }
}

#[async_trait]
impl TestCaseProvider for BasicTestCaseProvider {
    async fn generate(&self, curl_command: &str) -> Result<Vec<TestCase>, ProviderError> {
        if curl_command.trim().is_empty() {
            return Err(ProviderError::Reported("No curl command provided".to_string()));
        }
        Ok(self.generate_cases(curl_command)?)
    }
}
