//! Error taxonomy shared by the tool layer, the agent and the chat handler.
//!
//! Every failure that crosses a tool boundary is turned into an [`AppError`]
//! carrying one [`ErrorKind`]. The kind decides what the user gets to see;
//! the full message and context only go to the logs.

use std::fmt;

use crate::spotify::SpotifyError;
use crate::tools::schema::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid Spotify session.
    Authentication,
    /// Permission denied on a resource.
    Authorization,
    /// Malformed tool arguments.
    Validation,
    NotFound,
    /// Upstream Spotify failure or timeout.
    ExternalService,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Authentication => "AUTHENTICATION",
            ErrorKind::Authorization => "AUTHORIZATION",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::ExternalService => "EXTERNAL_SERVICE",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub user_id: Option<String>,
    pub operation: Option<String>,
}

impl ErrorContext {
    pub fn new(user_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            operation: Some(operation.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: ErrorContext,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalService, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Attach `{user_id, operation}`; fields that are already set are kept.
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        if self.context.user_id.is_none() {
            self.context.user_id = context.user_id;
        }
        if self.context.operation.is_none() {
            self.context.operation = context.operation;
        }
        self
    }

    /// Reclassify an arbitrary failure into the taxonomy.
    pub fn classify(err: anyhow::Error, context: ErrorContext) -> Self {
        let err = match err.downcast::<AppError>() {
            Ok(app) => return app.with_context(context),
            Err(err) => err,
        };
        let err = match err.downcast::<ValidationError>() {
            Ok(validation) => {
                return AppError::validation(validation.to_string()).with_context(context)
            }
            Err(err) => err,
        };
        if let Some(spotify) = err.downcast_ref::<SpotifyError>() {
            return AppError::new(spotify.kind(), spotify.to_string()).with_context(context);
        }

        let message = format!("{:#}", err);
        AppError::new(kind_from_message(&message), message).with_context(context)
    }

    /// Text that is safe to show in the chat. Never includes internals.
    pub fn user_message(&self) -> String {
        match self.kind {
            ErrorKind::Authentication => {
                "Please reconnect your Spotify account to continue.".to_string()
            }
            ErrorKind::Authorization => {
                "You do not have permission to perform this action.".to_string()
            }
            ErrorKind::Validation => format!("Invalid input: {}", self.message),
            ErrorKind::NotFound => format!("Requested resource not found: {}", self.message),
            ErrorKind::ExternalService => {
                "Spotify service is temporarily unavailable. Please try again later.".to_string()
            }
            ErrorKind::Internal => "An unexpected error occurred. Please try again.".to_string(),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::validation(err.to_string())
    }
}

fn kind_from_message(message: &str) -> ErrorKind {
    let lowered = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lowered.contains(n));

    if has(&["authorization", "unauthorized"]) {
        ErrorKind::Authentication
    } else if has(&["forbidden", "access denied"]) {
        ErrorKind::Authorization
    } else if has(&["not found", "does not exist"]) {
        ErrorKind::NotFound
    } else if has(&["validation", "invalid"]) {
        ErrorKind::Validation
    } else if has(&["network", "timeout", "timed out", "connection refused", "econnrefused"]) {
        ErrorKind::ExternalService
    } else {
        ErrorKind::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ErrorContext {
        ErrorContext::new("42", "search")
    }

    #[test]
    fn test_classify_keeps_app_errors() {
        let err = AppError::not_found("playlist gone");
        let classified = AppError::classify(err.into(), ctx());
        assert_eq!(classified.kind, ErrorKind::NotFound);
        assert_eq!(classified.message, "playlist gone");
        assert_eq!(classified.context.user_id.as_deref(), Some("42"));
        assert_eq!(classified.context.operation.as_deref(), Some("search"));
    }

    #[test]
    fn test_classify_validation_error() {
        let err = ValidationError::new("limit", "must be at most 50");
        let classified = AppError::classify(err.into(), ctx());
        assert_eq!(classified.kind, ErrorKind::Validation);
        assert!(classified.message.contains("limit"));
    }

    #[test]
    fn test_classify_spotify_status_codes() {
        let cases = [
            (401, ErrorKind::Authentication),
            (403, ErrorKind::Authorization),
            (404, ErrorKind::NotFound),
            (400, ErrorKind::Validation),
            (429, ErrorKind::ExternalService),
            (502, ErrorKind::ExternalService),
            (418, ErrorKind::Internal),
        ];
        for (status, kind) in cases {
            let err = SpotifyError::Status {
                status,
                message: "boom".to_string(),
            };
            assert_eq!(AppError::classify(err.into(), ctx()).kind, kind, "status {}", status);
        }
    }

    #[test]
    fn test_classify_by_message_patterns() {
        let cases = [
            ("Unauthorized request", ErrorKind::Authentication),
            ("Access denied to playlist", ErrorKind::Authorization),
            ("Track does not exist", ErrorKind::NotFound),
            ("invalid base62 id", ErrorKind::Validation),
            ("request timed out", ErrorKind::ExternalService),
            ("something odd", ErrorKind::Internal),
        ];
        for (message, kind) in cases {
            let classified = AppError::classify(anyhow::anyhow!(message), ctx());
            assert_eq!(classified.kind, kind, "message {:?}", message);
        }
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = AppError::internal("db lock poisoned at src/db/mod.rs:42");
        assert!(!err.user_message().contains("src/db"));

        let err = AppError::validation("`playlistId` must not be empty");
        assert!(err.user_message().starts_with("Invalid input:"));
    }

    #[test]
    fn test_with_context_does_not_overwrite() {
        let err = AppError::external("down").with_context(ErrorContext::new("1", "pauseTrack"));
        let err = err.with_context(ErrorContext::new("2", "agent"));
        assert_eq!(err.context.user_id.as_deref(), Some("1"));
        assert_eq!(err.context.operation.as_deref(), Some("pauseTrack"));
    }
}
