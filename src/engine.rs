use crate::error::TransportError;
use crate::test_case::{classify, Classification, ExpectedStatus, TestCase};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    Success,
    Error,
}

/// Reply of an execution backend for one curl command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendResponse {
    pub status: BackendStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    /// `None` only when the field is missing; an explicit `null` is kept.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackendResponse {
    pub fn success(status_code: u16, headers: HashMap<String, String>, response: Value) -> Self {
        Self {
            status: BackendStatus::Success,
            status_code: Some(status_code),
            headers: Some(headers),
            response: Some(response),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: BackendStatus::Error,
            status_code: None,
            headers: None,
            response: None,
            error: Some(message.into()),
        }
    }
}

fn present_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Something that performs the HTTP call a curl command describes.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn execute_curl(&self, curl_command: &str) -> Result<BackendResponse, TransportError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        status_code: Option<u16>,
        headers: Option<HashMap<String, String>>,
        response: Option<Value>,
    },
    /// The test case had nothing runnable; the backend was never called.
    ClientError(String),
    /// The backend ran and reported a failure.
    BackendError(String),
    /// The backend could not be reached or answered garbage.
    TransportError(String),
}

/// Terminal result of one execution. Built fresh per call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub outcome: Outcome,
    pub classification: Option<Classification>,
}

impl ExecutionResult {
    fn unclassified(outcome: Outcome) -> Self {
        Self {
            outcome,
            classification: None,
        }
    }

    fn from_backend(response: BackendResponse, expected: Option<&ExpectedStatus>) -> Self {
        match response.status {
            BackendStatus::Success => Self {
                classification: classify(expected, response.status_code),
                outcome: Outcome::Success {
                    status_code: response.status_code,
                    headers: response.headers,
                    response: response.response,
                },
            },
            BackendStatus::Error => Self::unclassified(Outcome::BackendError(
                response.error.unwrap_or_else(|| "Unknown error".to_string()),
            )),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// Wire status: `"success"` or `"error"`.
    pub fn status(&self) -> &'static str {
        if self.is_success() {
            "success"
        } else {
            "error"
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match &self.outcome {
            Outcome::Success { status_code, .. } => *status_code,
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::ClientError(msg) | Outcome::BackendError(msg) | Outcome::TransportError(msg) => {
                Some(msg.as_str())
            }
        }
    }

    /// Human-readable rendering: status line, optional headers, then body.
    pub fn report(&self) -> String {
        match &self.outcome {
            Outcome::Success {
                status_code,
                headers,
                response,
            } => {
                // 0 is as good as no status at all
                let mut out = format!(
                    "Status Code: {}\n\n",
                    status_code
                        .filter(|code| *code != 0)
                        .map(|code| code.to_string())
                        .unwrap_or_else(|| "Unknown".to_string())
                );

                if let Some(headers) = headers {
                    out.push_str("Headers:\n");
                    let mut names: Vec<&String> = headers.keys().collect();
                    names.sort();
                    for name in names {
                        out.push_str(&format!("{}: {}\n", name, headers[name]));
                    }
                    out.push('\n');
                }

                out.push_str("Body:\n");
                if let Some(body) = response {
                    out.push_str(&format_body(body));
                }
                out
            }
            _ => format!("Error: {}", self.error().unwrap_or_default()),
        }
    }
}

/// Strings go out as-is; anything structured is pretty-printed.
fn format_body(body: &Value) -> String {
    match body {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

impl Serialize for ExecutionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            status: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            status_code: Option<u16>,
            #[serde(skip_serializing_if = "Option::is_none")]
            headers: Option<&'a HashMap<String, String>>,
            #[serde(skip_serializing_if = "Option::is_none")]
            response: Option<&'a Value>,
            #[serde(skip_serializing_if = "Option::is_none")]
            error: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            classification: Option<Classification>,
        }

        let (headers, response) = match &self.outcome {
            Outcome::Success {
                headers, response, ..
            } => (headers.as_ref(), response.as_ref()),
            _ => (None, None),
        };

        Wire {
            status: self.status(),
            status_code: self.status_code(),
            headers,
            response,
            error: self.error(),
            classification: self.classification,
        }
        .serialize(serializer)
    }
}

/// Runs test cases through an [`ExecutionBackend`] and classifies the
/// observed status against the expected one.
///
/// Holds no per-call state; overlapping `execute` calls are independent.
pub struct TestExecutionEngine<B> {
    backend: B,
}

impl<B: ExecutionBackend> TestExecutionEngine<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Never fails: every failure mode becomes a terminal [`ExecutionResult`].
    pub async fn execute(&self, test_case: &TestCase) -> ExecutionResult {
        if !test_case.has_curl_command() {
            warn!("Test case '{}' has no curl command", test_case.description);
            return ExecutionResult::unclassified(Outcome::ClientError(
                "No curl command available".to_string(),
            ));
        }

        info!(
            "Executing test curl command: {}...",
            preview(&test_case.curl_command, 50)
        );

        // Dispatch, then fold whatever came back into a terminal result
        match self.backend.execute_curl(&test_case.curl_command).await {
            Ok(response) => {
                let result =
                    ExecutionResult::from_backend(response, test_case.expected_status_code.as_ref());
                if let Some(message) = result.error() {
                    warn!("Backend reported error: {}", message);
                }
                result
            }
            Err(e) => {
                error!("Error executing test case '{}': {}", test_case.description, e);
                ExecutionResult::unclassified(Outcome::TransportError(e.to_string()))
            }
        }
    }
}

/// First `max` characters of `s`, for log lines.
pub(crate) fn preview(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeBackend {
        reply: Result<BackendResponse, TransportError>,
        calls: AtomicUsize,
    }

    impl FakeBackend {
        fn new(reply: Result<BackendResponse, TransportError>) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ExecutionBackend for FakeBackend {
        async fn execute_curl(&self, _curl_command: &str) -> Result<BackendResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn case(expected: Option<ExpectedStatus>) -> TestCase {
        TestCase::new("Baseline", "positive", "curl 'http://svc.test/items'", expected)
    }

    #[tokio::test]
    async fn test_not_available_skips_backend() {
        let engine = TestExecutionEngine::new(FakeBackend::new(Ok(BackendResponse::error("unused"))));
        let test_case = TestCase::new("Prose", "negative", "Not available", None);

        let result = engine.execute(&test_case).await;

        assert_eq!(result.outcome, Outcome::ClientError("No curl command available".to_string()));
        assert_eq!(result.status(), "error");
        assert_eq!(engine.backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_command_skips_backend() {
        let engine = TestExecutionEngine::new(FakeBackend::new(Ok(BackendResponse::error("unused"))));
        let result = engine.execute(&TestCase::new("Empty", "", "", None)).await;
        assert!(matches!(result.outcome, Outcome::ClientError(_)));
        assert_eq!(engine.backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_match_and_mismatch() {
        let reply = BackendResponse {
            status: BackendStatus::Success,
            status_code: Some(200),
            headers: None,
            response: Some(json!({"ok": true})),
            error: None,
        };
        let engine = TestExecutionEngine::new(FakeBackend::new(Ok(reply)));

        let result = engine.execute(&case(Some(ExpectedStatus::from("200")))).await;
        assert_eq!(result.classification, Some(Classification::Match));
        assert_eq!(result.status_code(), Some(200));

        let result = engine.execute(&case(Some(ExpectedStatus::from("404")))).await;
        assert_eq!(result.classification, Some(Classification::Mismatch));

        let result = engine.execute(&case(None)).await;
        assert_eq!(result.classification, None);
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_report_formatting() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let reply = BackendResponse::success(201, headers, json!({"id": 7}));
        let engine = TestExecutionEngine::new(FakeBackend::new(Ok(reply)));

        let result = engine.execute(&case(Some(ExpectedStatus::Code(201)))).await;

        assert_eq!(
            result.report(),
            "Status Code: 201\n\nHeaders:\ncontent-type: application/json\n\nBody:\n{\n  \"id\": 7\n}"
        );
    }

    #[tokio::test]
    async fn test_report_text_body_and_unknown_status() {
        let reply = BackendResponse {
            status: BackendStatus::Success,
            status_code: None,
            headers: None,
            response: Some(Value::String("plain text".to_string())),
            error: None,
        };
        let engine = TestExecutionEngine::new(FakeBackend::new(Ok(reply)));

        let result = engine.execute(&case(Some(ExpectedStatus::Code(200)))).await;

        assert_eq!(result.report(), "Status Code: Unknown\n\nBody:\nplain text");
        assert_eq!(result.classification, None);
    }

    #[tokio::test]
    async fn test_backend_error_verbatim() {
        let engine = TestExecutionEngine::new(FakeBackend::new(Ok(BackendResponse::error(
            "Curl command failed with exit code 6",
        ))));

        let result = engine.execute(&case(Some(ExpectedStatus::Code(200)))).await;

        assert_eq!(
            result.outcome,
            Outcome::BackendError("Curl command failed with exit code 6".to_string())
        );
        assert_eq!(result.report(), "Error: Curl command failed with exit code 6");
        assert_eq!(result.classification, None);
    }

    #[tokio::test]
    async fn test_backend_error_without_message() {
        let reply = BackendResponse {
            error: None,
            ..BackendResponse::error("")
        };
        let engine = TestExecutionEngine::new(FakeBackend::new(Ok(reply)));
        let result = engine.execute(&case(None)).await;
        assert_eq!(result.error(), Some("Unknown error"));
    }

    #[tokio::test]
    async fn test_transport_error_resolves() {
        let engine = TestExecutionEngine::new(FakeBackend::new(Err(TransportError::Request(
            "connection refused".to_string(),
        ))));

        let result = engine.execute(&case(Some(ExpectedStatus::Code(200)))).await;

        assert_eq!(
            result.outcome,
            Outcome::TransportError("Request failed: connection refused".to_string())
        );
        assert_eq!(result.status(), "error");
    }

    #[test]
    fn test_wire_serialization() {
        let result = ExecutionResult {
            outcome: Outcome::Success {
                status_code: Some(200),
                headers: None,
                response: Some(json!({"ok": true})),
            },
            classification: Some(Classification::Match),
        };
        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(
            wire,
            json!({"status": "success", "status_code": 200, "response": {"ok": true}, "classification": "match"})
        );

        let result = ExecutionResult::unclassified(Outcome::BackendError("boom".to_string()));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"status": "error", "error": "boom"})
        );
    }

    #[test]
    fn test_unknown_backend_status_is_malformed() {
        let parsed: Result<BackendResponse, _> =
            serde_json::from_str(r#"{"status": "pending"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("héllo", 2), "hé");
        assert_eq!(preview("abc", 50), "abc");
    }

    #[tokio::test]
    async fn test_report_zero_status_is_unknown() {
        let reply = BackendResponse::success(0, HashMap::new(), json!("x"));
        let engine = TestExecutionEngine::new(FakeBackend::new(Ok(reply)));

        let result = engine.execute(&case(Some(ExpectedStatus::Code(200)))).await;

        assert!(result.report().starts_with("Status Code: Unknown\n"));
        assert_eq!(result.classification, None);
    }

    #[test]
    fn test_explicit_null_body_is_kept() {
        let reply: BackendResponse = serde_json::from_str(
            r#"{"status": "success", "status_code": 204, "response": null}"#,
        )
        .unwrap();
        assert_eq!(reply.response, Some(Value::Null));

        let result = ExecutionResult::from_backend(reply, None);
        assert_eq!(result.report(), "Status Code: 204\n\nBody:\nnull");

        let reply: BackendResponse =
            serde_json::from_str(r#"{"status": "success", "status_code": 204}"#).unwrap();
        assert_eq!(reply.response, None);
    }

    /// Answers with the status code named in the command's path, after a
    /// delay that makes the first call finish last.
    struct EchoBackend;

    #[async_trait]
    impl ExecutionBackend for EchoBackend {
        async fn execute_curl(&self, curl_command: &str) -> Result<BackendResponse, TransportError> {
            let code: u16 = curl_command
                .rsplit('/')
                .next()
                .and_then(|tail| tail.trim_end_matches('\'').parse().ok())
                .unwrap_or(0);
            let delay = if code == 200 { 50 } else { 0 };
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            Ok(BackendResponse::success(code, HashMap::new(), json!({ "code": code })))
        }
    }

    #[tokio::test]
    async fn test_overlapping_executions_are_independent() {
        let engine = TestExecutionEngine::new(EchoBackend);
        let ok = TestCase::new("ok", "positive", "curl 'http://svc.test/200'", Some(ExpectedStatus::Code(200)));
        let missing = TestCase::new("missing", "negative", "curl 'http://svc.test/404'", Some(ExpectedStatus::Code(200)));

        let (first, second) = tokio::join!(engine.execute(&ok), engine.execute(&missing));

        assert_eq!(first.status_code(), Some(200));
        assert_eq!(first.classification, Some(Classification::Match));
        assert!(first.report().contains("\"code\": 200"));

        assert_eq!(second.status_code(), Some(404));
        assert_eq!(second.classification, Some(Classification::Mismatch));
        assert!(second.report().contains("\"code\": 404"));
    }
}
