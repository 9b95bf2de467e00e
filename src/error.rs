use thiserror::Error;

/// Failure to reach a backend or to make sense of what it sent back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to build request: {0}")]
    BuildRequest(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Failed to read response body: {0}")]
    ReadBody(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Reasons a curl command cannot be turned into an executable request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("Found placeholder values that need to be replaced: {}", .0.join(", "))]
    Placeholders(Vec<String>),

    #[error("Failed to parse curl command: unterminated {0} quote")]
    UnterminatedQuote(char),

    #[error("Failed to parse curl command: option {0} requires a value")]
    MissingValue(String),

    #[error("No URL found in curl command")]
    MissingUrl,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error("{0}")]
    Reported(String),

    #[error("Test case generator returned no test cases")]
    Empty,
}
