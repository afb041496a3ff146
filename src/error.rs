/// Unified error types for the auth service
use crate::guard::ban::BanStatus;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// External error kinds, the only classification callers ever see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    BadInput,
    Unauthenticated,
    Forbidden,
    NotFound,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadInput => "BAD_INPUT",
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::BadInput => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Main error type for the auth service
#[derive(Error, Debug)]
pub enum AuthError {
    /// Malformed or missing fields, policy violations
    #[error("{0}")]
    BadInput(String),

    /// Missing, invalid or expired credential
    #[error("{0}")]
    Unauthenticated(String),

    /// Unknown account or wrong password, merged into one message
    #[error("Invalid email or password")]
    InvalidCredentials { remaining_attempts: Option<u32> },

    /// Authenticated but not allowed
    #[error("{0}")]
    Forbidden(String),

    /// Too many failed logins
    #[error("Account is temporarily locked due to too many failed login attempts. Please try again in {minutes_remaining} minute(s).")]
    AccountLocked {
        locked_until: DateTime<Utc>,
        minutes_remaining: i64,
    },

    /// Administrative ban still in force
    #[error("{}", .0.message)]
    AccountBanned(BanStatus),

    /// Not found errors
    #[error("{0}")]
    NotFound(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// External kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::BadInput(_) => ErrorKind::BadInput,
            AuthError::Unauthenticated(_) | AuthError::InvalidCredentials { .. } => {
                ErrorKind::Unauthenticated
            }
            AuthError::Forbidden(_)
            | AuthError::AccountLocked { .. }
            | AuthError::AccountBanned(_) => ErrorKind::Forbidden,
            AuthError::NotFound(_) => ErrorKind::NotFound,
            AuthError::Database(_)
            | AuthError::Migration(_)
            | AuthError::Io(_)
            | AuthError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Structured metadata for lock and ban failures
    pub fn extensions(&self) -> Option<Value> {
        match self {
            AuthError::InvalidCredentials {
                remaining_attempts: Some(remaining),
            } => Some(json!({ "remainingAttempts": remaining })),
            AuthError::AccountLocked {
                locked_until,
                minutes_remaining,
            } => Some(json!({
                "lockedUntil": locked_until.to_rfc3339(),
                "minutesRemaining": minutes_remaining,
            })),
            AuthError::AccountBanned(status) => {
                let mut ext = Map::new();
                ext.insert("isPermanent".into(), json!(status.is_permanent));
                if let Some(until) = status.banned_until {
                    ext.insert("bannedUntil".into(), json!(until.to_rfc3339()));
                }
                if let Some(ref reason) = status.banned_reason {
                    ext.insert("bannedReason".into(), json!(reason));
                }
                if let Some(minutes) = status.minutes_remaining {
                    ext.insert("minutesRemaining".into(), json!(minutes));
                }
                Some(Value::Object(ext))
            }
            _ => None,
        }
    }

    /// Message safe to show to a client
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Error body returned to HTTP clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        if kind == ErrorKind::Internal {
            tracing::error!(error = %self, "Request failed with internal error");
        }

        let body = Json(ErrorResponse {
            error: kind.as_str().to_string(),
            message: self.public_message(),
            extensions: self.extensions(),
        });

        (kind.status(), body).into_response()
    }
}

/// Result type alias for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_kinds_map_to_taxonomy() {
        assert_eq!(AuthError::BadInput("x".into()).kind(), ErrorKind::BadInput);
        assert_eq!(
            AuthError::InvalidCredentials { remaining_attempts: Some(2) }.kind(),
            ErrorKind::Unauthenticated
        );
        assert_eq!(
            AuthError::AccountLocked {
                locked_until: Utc::now(),
                minutes_remaining: 15
            }
            .kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(AuthError::Internal("boom".into()).kind(), ErrorKind::Internal);
        assert_eq!(ErrorKind::Forbidden.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = AuthError::Internal("secret detail".into());
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn test_lock_extensions() {
        let until = Utc::now() + Duration::minutes(15);
        let err = AuthError::AccountLocked {
            locked_until: until,
            minutes_remaining: 15,
        };
        let ext = err.extensions().unwrap();
        assert_eq!(ext["minutesRemaining"], 15);
        assert_eq!(ext["lockedUntil"], until.to_rfc3339());
    }

    #[test]
    fn test_ban_extensions() {
        let status = BanStatus {
            is_banned: true,
            is_permanent: true,
            banned_until: None,
            banned_reason: Some("spam".into()),
            banned_at: None,
            minutes_remaining: None,
            message: "banned".into(),
        };
        let ext = AuthError::AccountBanned(status).extensions().unwrap();
        assert_eq!(ext["isPermanent"], true);
        assert_eq!(ext["bannedReason"], "spam");
        assert!(ext.get("minutesRemaining").is_none());
    }
}
