use thiserror::Error;

/// Type alias for Result with LabelerError
pub type Result<T> = std::result::Result<T, LabelerError>;

/// Error types for the labeling engine and its collaborators
#[derive(Error, Debug)]
pub enum LabelerError {
    /// No valid credential; the user must re-authenticate
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, resets, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Invalid message format or parsing error
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// The label store refused to create a label
    #[error("Failed to create label '{name}': {reason}")]
    LabelCreationFailed { name: String, reason: String },

    /// No suggestion with this id exists
    #[error("Suggestion not found: {0}")]
    SuggestionNotFound(String),

    /// Suggestion exists but is not pending
    #[error("Suggestion {id} is {status}, only pending suggestions can be decided")]
    InvalidSuggestionState { id: String, status: String },

    /// Another processing cycle holds the cycle guard
    #[error("A processing cycle is already running")]
    CycleInProgress,

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration or settings error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Persistent storage errors
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl LabelerError {
    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LabelerError::RateLimitExceeded { .. }
                | LabelerError::ServerError { .. }
                | LabelerError::NetworkError(_)
        )
    }

    /// Whether the user has to go through the OAuth flow again
    pub fn requires_reauth(&self) -> bool {
        matches!(self, LabelerError::AuthRequired(_))
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// The Retry-After header can be specified in two formats:
/// 1. Delay-seconds: An integer indicating seconds to wait (e.g., "120")
/// 2. HTTP-date: An HTTP date format (e.g., "Wed, 21 Oct 2015 07:28:00 GMT")
///
/// Returns the number of seconds to wait. If the header is missing or invalid,
/// returns a default of 5 seconds.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    if let Some(retry_after_value) = response.headers().get("retry-after") {
        if let Ok(retry_after_str) = retry_after_value.to_str() {
            if let Ok(seconds) = retry_after_str.parse::<u64>() {
                return seconds;
            }

            if let Ok(http_date) = httpdate::parse_http_date(retry_after_str) {
                let now = std::time::SystemTime::now();
                if let Ok(duration) = http_date.duration_since(now) {
                    return duration.as_secs();
                }
            }
        }
    }

    DEFAULT_RETRY_AFTER
}

impl From<google_gmail1::Error> for LabelerError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    401 => LabelerError::AuthRequired(message),
                    429 => {
                        let retry_after = parse_retry_after_header(response);
                        LabelerError::RateLimitExceeded { retry_after }
                    }
                    404 => LabelerError::NotFound("Resource not found".to_string()),
                    400 => LabelerError::BadRequest(message),
                    403 => LabelerError::Forbidden(message),
                    500..=599 => LabelerError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => LabelerError::ApiError(message),
                }
            }
            google_gmail1::Error::BadRequest(ref err) => {
                LabelerError::BadRequest(format!("{}", err))
            }
            google_gmail1::Error::MissingToken(ref err) => {
                LabelerError::AuthRequired(format!("No usable token: {}", err))
            }
            google_gmail1::Error::HttpError(ref err) => {
                LabelerError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => LabelerError::NetworkError(err.to_string()),
            _ => LabelerError::ApiError(error.to_string()),
        }
    }
}
