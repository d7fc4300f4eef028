//! Error types for docflow
//!
//! Provides the error taxonomy observed at the REST boundary:
//! - Transport failures (network, timeout)
//! - HTTP-level failures decoded from the backend error envelope
//! - ERP-specific failures (archival, line creation)
//! - Client-local failures (decode, configuration, cancellation)
//!
//! Every error maps to a user-facing [`Notification`] so that call sites can
//! surface it without crashing the view.

use crate::notification::Notification;
use serde::{Deserialize, Serialize};

/// Failure envelope returned by the backend
///
/// `{ success, message, errorType, statusCode, errorDetails }`; every field is
/// optional because not every endpoint fills all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub error_details: Option<serde_json::Value>,
}

impl ErrorEnvelope {
    /// Parse an envelope from a raw response body, if it is one
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str::<Self>(body)
            .ok()
            .filter(|e| e.message.is_some() || e.error_type.is_some())
    }

    /// Failure reported inside a `2xx` body
    ///
    /// Any object with `success: false` counts, whatever else it carries.
    #[must_use]
    pub fn reported_failure(body: &str) -> Option<Self> {
        serde_json::from_str::<Self>(body)
            .ok()
            .filter(|e| e.success == Some(false))
    }

    /// Details rendered as a single line, if present
    #[must_use]
    pub fn details_text(&self) -> Option<String> {
        match self.error_details.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.trim().is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Main docflow error type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// Backend unreachable
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded its deadline
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Request rejected by backend validation
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: Option<String>,
    },

    /// Missing or expired credentials
    #[error("authentication required: {0}")]
    Authentication(String),

    /// Authenticated but not allowed
    #[error("permission denied: {0}")]
    Authorization(String),

    /// Document or resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Concurrent modification on the server
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unexpected server failure
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Backend temporarily unavailable
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// ERP archival job failed
    #[error("ERP archival failed: {message}")]
    ErpArchival {
        message: String,
        details: Option<String>,
    },

    /// ERP line creation failed
    #[error("ERP line creation failed: {message}")]
    ErpLineCreation {
        message: String,
        details: Option<String>,
    },

    /// Response body did not match the expected shape
    #[error("invalid response: {0}")]
    Decode(String),

    /// Client configuration is unusable
    #[error("configuration error: {0}")]
    Config(String),

    /// Request abandoned because its view scope closed
    #[error("request cancelled")]
    Cancelled,
}

/// Coarse classification of [`ApiError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Timeout,
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    Server,
    ServiceUnavailable,
    ErpArchival,
    ErpLineCreation,
    Decode,
    Config,
    Cancelled,
}

impl ErrorKind {
    /// Recognise a backend `errorType` string
    ///
    /// Accepts both `NotFoundError` and `NOT_FOUND` style spellings.
    #[must_use]
    pub fn from_error_type(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect::<String>()
            .to_ascii_lowercase();
        let normalized = normalized.strip_suffix("error").unwrap_or(&normalized);

        let kind = match normalized {
            "network" => Self::Network,
            "timeout" => Self::Timeout,
            "validation" | "badrequest" => Self::Validation,
            "authentication" | "unauthorized" => Self::Authentication,
            "authorization" | "forbidden" => Self::Authorization,
            "notfound" => Self::NotFound,
            "conflict" => Self::Conflict,
            "server" | "internal" | "internalserver" => Self::Server,
            "serviceunavailable" => Self::ServiceUnavailable,
            "erparchival" => Self::ErpArchival,
            "erplinecreation" => Self::ErpLineCreation,
            _ => return None,
        };
        Some(kind)
    }

    /// Classify an HTTP status code
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Authentication,
            403 => Self::Authorization,
            404 => Self::NotFound,
            409 => Self::Conflict,
            408 | 504 => Self::Timeout,
            503 => Self::ServiceUnavailable,
            500..=599 => Self::Server,
            _ => Self::Validation,
        }
    }
}

impl ApiError {
    /// Build an error from an HTTP failure and its (optional) envelope
    ///
    /// A recognised `errorType` wins over the HTTP status.
    #[must_use]
    pub fn from_response(status: u16, envelope: Option<&ErrorEnvelope>) -> Self {
        let kind = envelope
            .and_then(|e| e.error_type.as_deref())
            .and_then(ErrorKind::from_error_type)
            .unwrap_or_else(|| ErrorKind::from_status(status));

        let message = envelope
            .and_then(|e| e.message.clone())
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("HTTP {status}"));
        let details = envelope.and_then(ErrorEnvelope::details_text);
        let status = envelope.and_then(|e| e.status_code).unwrap_or(status);

        match kind {
            ErrorKind::Network => Self::Network(message),
            ErrorKind::Timeout => Self::Timeout(message),
            ErrorKind::Validation => Self::Validation { message, details },
            ErrorKind::Authentication => Self::Authentication(message),
            ErrorKind::Authorization => Self::Authorization(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Conflict => Self::Conflict(message),
            ErrorKind::ServiceUnavailable => Self::ServiceUnavailable(message),
            ErrorKind::ErpArchival => Self::ErpArchival { message, details },
            ErrorKind::ErpLineCreation => Self::ErpLineCreation { message, details },
            ErrorKind::Decode => Self::Decode(message),
            ErrorKind::Config => Self::Config(message),
            ErrorKind::Cancelled => Self::Cancelled,
            ErrorKind::Server => Self::Server { status, message },
        }
    }

    /// Classification of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Server { .. } => ErrorKind::Server,
            Self::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            Self::ErpArchival { .. } => ErrorKind::ErpArchival,
            Self::ErpLineCreation { .. } => ErrorKind::ErpLineCreation,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Config(_) => ErrorKind::Config,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Check if error is retryable
    ///
    /// Only drives the suggested-action text; nothing retries automatically.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Network
                | ErrorKind::Timeout
                | ErrorKind::Server
                | ErrorKind::ServiceUnavailable
        )
    }

    /// Whether the error should be shown to the user at all
    #[inline]
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Toast title for this error
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Network => "Connection problem",
            ErrorKind::Timeout => "Request timed out",
            ErrorKind::Validation => "Invalid request",
            ErrorKind::Authentication => "Session expired",
            ErrorKind::Authorization => "Access denied",
            ErrorKind::NotFound => "Not found",
            ErrorKind::Conflict => "Conflicting change",
            ErrorKind::Server => "Server error",
            ErrorKind::ServiceUnavailable => "Service unavailable",
            ErrorKind::ErpArchival => "ERP archival failed",
            ErrorKind::ErpLineCreation => "ERP line creation failed",
            ErrorKind::Decode => "Unexpected response",
            ErrorKind::Config => "Configuration error",
            ErrorKind::Cancelled => "Cancelled",
        }
    }

    /// Suggested user action
    #[must_use]
    pub fn help(&self) -> Option<&'static str> {
        if self.is_retryable() {
            return Some("This is usually temporary. Please try again in a moment.");
        }
        match self.kind() {
            ErrorKind::Authentication => Some("Please sign in again."),
            ErrorKind::Authorization => {
                Some("You do not have permission for this action. Contact an administrator.")
            }
            ErrorKind::Conflict => {
                Some("The document changed in the meantime. Refresh and try again.")
            }
            ErrorKind::Validation => Some("Check the submitted values and try again."),
            ErrorKind::ErpArchival | ErrorKind::ErpLineCreation => {
                Some("Check the ERP configuration of this document type.")
            }
            _ => None,
        }
    }

    /// Message body shown under the title
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { message, details }
            | Self::ErpArchival { message, details }
            | Self::ErpLineCreation { message, details } => match details {
                Some(d) => format!("{message} ({d})"),
                None => message.clone(),
            },
            Self::Server { message, .. } => message.clone(),
            Self::Network(m)
            | Self::Timeout(m)
            | Self::Authentication(m)
            | Self::Authorization(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::ServiceUnavailable(m)
            | Self::Decode(m)
            | Self::Config(m) => m.clone(),
            Self::Cancelled => "The request was cancelled.".to_string(),
        }
    }

    /// Convert into a user-facing notification
    #[must_use]
    pub fn to_notification(&self) -> Notification {
        let notification = Notification::error(self.title(), self.user_message());
        match self.help() {
            Some(help) => notification.with_help(help),
            None => notification,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

/// Result alias used by the docflow crates
pub type Result<T> = std::result::Result<T, ApiError>;
