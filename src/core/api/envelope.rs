use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_FAILURE_MESSAGE: &str = "Request failed";

/// Business status code the backend uses for success.
const SUCCESS_CODE: i64 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// Unwrap the payload, or turn a non-200 business code into a failure.
    pub fn into_result(self) -> Result<Option<T>, ApiFailure> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(ApiFailure::Business {
                code: self.code,
                message: self
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
            })
        }
    }
}

/// Why a backend call failed, as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFailure {
    /// HTTP succeeded but the envelope code was not 200.
    Business { code: i64, message: String },
    /// 401. Stored credentials must be cleared and the user sent to login.
    Unauthorized,
    Forbidden,
    NotFound,
    RateLimited,
    ServerError,
    Http { status: u16, message: Option<String> },
    /// No response was received.
    Network(String),
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl ApiFailure {
    /// Map an HTTP error status, using the body's `message` where one exists.
    pub fn from_status(status: u16, body: Option<&str>) -> Self {
        match status {
            401 => ApiFailure::Unauthorized,
            403 => ApiFailure::Forbidden,
            404 => ApiFailure::NotFound,
            429 => ApiFailure::RateLimited,
            500 => ApiFailure::ServerError,
            _ => ApiFailure::Http {
                status,
                message: body
                    .and_then(|b| serde_json::from_str::<ErrorBody>(b).ok())
                    .and_then(|b| b.message)
                    .filter(|m| !m.is_empty()),
            },
        }
    }

    pub fn requires_reauth(&self) -> bool {
        matches!(self, ApiFailure::Unauthorized)
    }

    pub fn user_message(&self) -> String {
        match self {
            ApiFailure::Business { message, .. } => message.clone(),
            ApiFailure::Unauthorized => "Session expired, please log in again".to_string(),
            ApiFailure::Forbidden => "Permission denied".to_string(),
            ApiFailure::NotFound => "The requested resource does not exist".to_string(),
            ApiFailure::RateLimited => "Too many requests, please try again later".to_string(),
            ApiFailure::ServerError => "Internal server error".to_string(),
            ApiFailure::Http {
                message: Some(message),
                ..
            } => message.clone(),
            ApiFailure::Http {
                status,
                message: None,
            } => format!("{} ({})", DEFAULT_FAILURE_MESSAGE, status),
            ApiFailure::Network(_) => {
                "Network connection failed, please check your network settings".to_string()
            }
        }
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}

impl std::error::Error for ApiFailure {}
