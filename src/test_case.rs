use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Stand-in used when a provider hands back a case without a command.
pub const CURL_NOT_AVAILABLE: &str = "Not available";

fn not_available() -> String {
    CURL_NOT_AVAILABLE.to_string()
}

/// A provider-supplied request/expectation pair.
///
/// `curl_command` is the single source of truth for what gets executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub test_type: String,
    #[serde(default = "not_available", alias = "modified_curl_command")]
    pub curl_command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_status_code: Option<ExpectedStatus>,
}

impl TestCase {
    pub fn new(
        description: impl Into<String>,
        test_type: impl Into<String>,
        curl_command: impl Into<String>,
        expected_status_code: Option<ExpectedStatus>,
    ) -> Self {
        Self {
            description: description.into(),
            test_type: test_type.into(),
            curl_command: curl_command.into(),
            expected_status_code,
        }
    }

    /// True when there is something to run.
    pub fn has_curl_command(&self) -> bool {
        !self.curl_command.trim().is_empty() && self.curl_command != CURL_NOT_AVAILABLE
    }
}

/// Expected status as providers send it: usually a number or a numeric
/// string. Anything else is kept as raw JSON so one odd value does not sink
/// the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpectedStatus {
    Code(i64),
    Text(String),
    Other(Value),
}

impl ExpectedStatus {
    /// Mirrors truthiness of the raw value: `0` and `""` count as absent.
    fn is_present(&self) -> bool {
        match self {
            ExpectedStatus::Code(code) => *code != 0,
            ExpectedStatus::Text(text) => !text.is_empty(),
            ExpectedStatus::Other(value) => match value {
                Value::Null => false,
                Value::Bool(flag) => *flag,
                Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
                Value::String(text) => !text.is_empty(),
                Value::Array(_) | Value::Object(_) => true,
            },
        }
    }

    /// Integer coercion; `None` stands for a value that is not a number.
    /// Fractional numbers truncate (`200.0` and `200.9` are 200).
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ExpectedStatus::Code(code) => Some(*code),
            ExpectedStatus::Text(text) => parse_int_prefix(text),
            ExpectedStatus::Other(Value::Number(n)) => n
                .as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64),
            ExpectedStatus::Other(_) => None,
        }
    }
}

impl From<u16> for ExpectedStatus {
    fn from(code: u16) -> Self {
        ExpectedStatus::Code(code as i64)
    }
}

impl From<&str> for ExpectedStatus {
    fn from(text: &str) -> Self {
        ExpectedStatus::Text(text.to_string())
    }
}

impl fmt::Display for ExpectedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedStatus::Code(code) => write!(f, "{}", code),
            ExpectedStatus::Text(text) => write!(f, "{}", text),
            ExpectedStatus::Other(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Match,
    Mismatch,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Match => write!(f, "match"),
            Classification::Mismatch => write!(f, "mismatch"),
        }
    }
}

/// Leading-integer coercion: skips leading whitespace, takes an optional
/// sign and the decimal digits that follow. `"201 Created"` is 201,
/// `"abc"` is `None`.
pub fn parse_int_prefix(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let digits_len = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits_len == 0 {
        return None;
    }

    let value: i64 = rest[..digits_len].parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Compare expected and observed status codes.
///
/// Returns `None` when either side is missing; non-numeric values never
/// match.
pub fn classify(expected: Option<&ExpectedStatus>, actual: Option<u16>) -> Option<Classification> {
    let expected = expected.filter(|e| e.is_present())?;
    let actual = actual.filter(|code| *code != 0)?;

    match expected.as_int() {
        Some(code) if code == actual as i64 => Some(Classification::Match),
        _ => Some(Classification::Mismatch),
    }
}
