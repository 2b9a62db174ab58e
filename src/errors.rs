// ABOUTME: Unified error handling system with standard error codes
// ABOUTME: Maps each failure class to an HTTP status and a serializable response envelope
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Unified Error Handling System
//!
//! Centralized error types for the gateway. Every failure the login flow or
//! the chat relay can surface is one of the [`ErrorCode`] classes below, so
//! callers (and the HTTP collaborator mounting the gateway) get a stable
//! machine-readable code alongside the human-readable message.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Standard error codes used throughout the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Required configuration is absent; fatal at startup
    #[serde(rename = "CONFIG_MISSING")]
    ConfigMissing,
    /// A callback or API request is missing required parameters
    #[serde(rename = "INVALID_REQUEST")]
    InvalidRequest,
    /// The returned OAuth state does not match the stored session state
    #[serde(rename = "CSRF_MISMATCH")]
    CsrfMismatch,
    /// The session is unknown or has not completed the login flow
    #[serde(rename = "NOT_AUTHENTICATED")]
    NotAuthenticated,
    /// The identity provider's authorize or token endpoint rejected the flow
    #[serde(rename = "PROVIDER_EXCHANGE_FAILED")]
    ProviderExchangeFailed,
    /// Signing or recipient key material is not loaded; minting is disabled
    #[serde(rename = "KEYS_UNAVAILABLE")]
    KeysUnavailable,
    /// The client-credential token endpoint responded non-success
    #[serde(rename = "TOKEN_FETCH_FAILED")]
    TokenFetchFailed,
    /// A streamed frame could not be decoded; recoverable, the frame is skipped
    #[serde(rename = "MALFORMED_STREAM_FRAME")]
    MalformedStreamFrame,
    /// The chat stream's underlying connection failed; terminal for the request
    #[serde(rename = "STREAM_CONNECTION_ERROR")]
    StreamConnectionError,
    /// Catch-all for unexpected internal failures
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::NotAuthenticated => 401,
            Self::CsrfMismatch => 403,
            Self::ProviderExchangeFailed
            | Self::TokenFetchFailed
            | Self::MalformedStreamFrame
            | Self::StreamConnectionError => 502,
            Self::KeysUnavailable => 503,
            Self::ConfigMissing | Self::InternalError => 500,
        }
    }

    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::ConfigMissing => "Required configuration is missing",
            Self::InvalidRequest => "The request is missing required parameters",
            Self::CsrfMismatch => "Invalid state parameter - possible CSRF attack",
            Self::NotAuthenticated => "Not authenticated",
            Self::ProviderExchangeFailed => "Identity provider token exchange failed",
            Self::KeysUnavailable => "Token signing keys are not available",
            Self::TokenFetchFailed => "Failed to fetch bearer token",
            Self::MalformedStreamFrame => "Stream frame could not be decoded",
            Self::StreamConnectionError => "Chat stream connection failed",
            Self::InternalError => "An internal error occurred",
        }
    }
}

/// Unified error type for the gateway
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new error with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Required configuration missing, listing the absent variables
    pub fn config_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigMissing, message)
    }

    /// Callback/API request missing required parameters
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Returned state does not match the stored session state
    #[must_use]
    pub fn csrf_mismatch() -> Self {
        Self::new(
            ErrorCode::CsrfMismatch,
            "state parameter does not match this session",
        )
    }

    /// Session unknown or login flow not completed
    #[must_use]
    pub fn not_authenticated() -> Self {
        Self::new(ErrorCode::NotAuthenticated, "no authenticated session")
    }

    /// Identity provider rejected the exchange
    pub fn provider_exchange(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProviderExchangeFailed, message)
    }

    /// Key material absent; minting disabled
    #[must_use]
    pub fn keys_unavailable() -> Self {
        Self::new(
            ErrorCode::KeysUnavailable,
            "signing or recipient key not loaded",
        )
    }

    /// Client-credential token endpoint failure
    pub fn token_fetch(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TokenFetchFailed, message)
    }

    /// Undecodable stream frame (recoverable)
    pub fn malformed_frame(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedStreamFrame, message)
    }

    /// Chat stream connection failure (terminal for the request)
    pub fn stream_connection(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StreamConnectionError, message)
    }

    /// Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// HTTP error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error payload
    pub error: ErrorResponseDetails,
}

/// Body of an [`ErrorResponse`]
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponseDetails {
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        Self {
            error: ErrorResponseDetails {
                code: error.code,
                message: error.message,
            },
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(ErrorCode::InternalError, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::InvalidRequest.http_status(), 400);
        assert_eq!(ErrorCode::NotAuthenticated.http_status(), 401);
        assert_eq!(ErrorCode::CsrfMismatch.http_status(), 403);
        assert_eq!(ErrorCode::TokenFetchFailed.http_status(), 502);
        assert_eq!(ErrorCode::ConfigMissing.http_status(), 500);
    }

    #[test]
    fn test_error_response_serialization() {
        let error = AppError::csrf_mismatch();
        let response = ErrorResponse::from(error);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("CSRF_MISMATCH"));
        assert!(json.contains("state parameter"));
    }

    #[test]
    fn test_error_source_chaining() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let error = AppError::internal("wrapped").with_source(io);
        assert!(std::error::Error::source(&error).is_some());
    }
}
