//! Token lifecycle error types.
//!
//! Every failure surfaced by this crate is an [`AuthError`]: a stable
//! [`ErrorKind`], a short hint that is safe to show to clients, an optional
//! debug string for operators, and an optional cause chain. The hint never
//! carries storage or signing error text; that only ever lands in the debug
//! string and the source chain.

use std::error::Error as StdError;
use std::fmt;

use crate::storage::StorageError;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Stable error kinds, aligned with RFC 6749 error codes and their extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A parameter is missing, malformed, or the request collided with a
    /// concurrent request using the same token.
    InvalidRequest,
    /// Client authentication failed.
    InvalidClient,
    /// The grant (code, refresh token) is invalid, expired, or was issued to
    /// another client.
    InvalidGrant,
    /// A scope is not permitted or was never granted.
    InvalidScope,
    /// A refresh was attempted without a refresh-eligible scope.
    ScopeNotGranted,
    /// The client may not use this grant.
    UnauthorizedClient,
    /// No handler accepts the grant type.
    UnsupportedGrantType,
    /// No handler accepts the response type.
    UnsupportedResponseType,
    /// The token was revoked or already rotated.
    InactiveToken,
    /// The token has expired.
    TokenExpired,
    /// The token signature does not verify.
    TokenSignatureMismatch,
    /// The token is structurally malformed.
    InvalidTokenFormat,
    /// A token claim (aud, iss, nbf, jti...) failed validation.
    TokenClaim,
    /// The request is not authorized.
    RequestUnauthorized,
    /// The handler does not recognize the request. Used by handler chains to
    /// pass a request on to the next handler.
    RequestUnknown,
    /// The server cannot complete the request right now.
    TemporarilyUnavailable,
    /// The server is configured in a way that makes the request impossible.
    Misconfiguration,
    /// An unexpected storage or signing failure.
    ServerError,
}

impl ErrorKind {
    /// Returns the OAuth 2.0 error code.
    #[must_use]
    pub fn oauth_error_code(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidScope => "invalid_scope",
            Self::ScopeNotGranted => "scope_not_granted",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::InactiveToken => "inactive_token",
            Self::TokenExpired => "invalid_token",
            Self::TokenSignatureMismatch => "token_signature_mismatch",
            Self::InvalidTokenFormat => "invalid_token",
            Self::TokenClaim => "token_claim",
            Self::RequestUnauthorized => "request_unauthorized",
            Self::RequestUnknown => "request_unknown",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
            Self::Misconfiguration => "misconfiguration",
            Self::ServerError => "server_error",
        }
    }

    /// Returns the HTTP status code the endpoint layer should answer with.
    #[must_use]
    pub fn status_code(self) -> u16 {
        match self {
            Self::InvalidClient | Self::RequestUnauthorized | Self::TokenExpired => 401,
            Self::RequestUnknown => 400,
            Self::InactiveToken
            | Self::TokenSignatureMismatch
            | Self::InvalidTokenFormat
            | Self::TokenClaim => 401,
            Self::ScopeNotGranted => 403,
            Self::TemporarilyUnavailable => 503,
            Self::Misconfiguration | Self::ServerError => 500,
            Self::InvalidRequest
            | Self::InvalidGrant
            | Self::InvalidScope
            | Self::UnauthorizedClient
            | Self::UnsupportedGrantType
            | Self::UnsupportedResponseType => 400,
        }
    }

    /// Returns the fixed description of this kind.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::InvalidRequest => "Invalid request",
            Self::InvalidClient => "Invalid client",
            Self::InvalidGrant => "Invalid grant",
            Self::InvalidScope => "Invalid scope",
            Self::ScopeNotGranted => "Scope not granted",
            Self::UnauthorizedClient => "Unauthorized client",
            Self::UnsupportedGrantType => "Unsupported grant type",
            Self::UnsupportedResponseType => "Unsupported response type",
            Self::InactiveToken => "Token inactive",
            Self::TokenExpired => "Token expired",
            Self::TokenSignatureMismatch => "Token signature mismatch",
            Self::InvalidTokenFormat => "Invalid token format",
            Self::TokenClaim => "Token claim invalid",
            Self::RequestUnauthorized => "Request unauthorized",
            Self::RequestUnknown => "Request unknown",
            Self::TemporarilyUnavailable => "Temporarily unavailable",
            Self::Misconfiguration => "Misconfiguration",
            Self::ServerError => "Server error",
        }
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::InvalidClient | Self::InvalidGrant | Self::RequestUnauthorized => {
                ErrorCategory::Authentication
            }
            Self::InvalidScope | Self::ScopeNotGranted | Self::UnauthorizedClient => {
                ErrorCategory::Authorization
            }
            Self::InactiveToken
            | Self::TokenExpired
            | Self::TokenSignatureMismatch
            | Self::InvalidTokenFormat
            | Self::TokenClaim => ErrorCategory::Token,
            Self::InvalidRequest
            | Self::UnsupportedGrantType
            | Self::UnsupportedResponseType
            | Self::RequestUnknown => ErrorCategory::Validation,
            Self::TemporarilyUnavailable => ErrorCategory::Infrastructure,
            Self::Misconfiguration => ErrorCategory::Configuration,
            Self::ServerError => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Categories of errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Identity verification failures.
    Authentication,
    /// Permission failures.
    Authorization,
    /// Token validation failures.
    Token,
    /// Request validation errors.
    Validation,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Token => write!(f, "token"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Structured error returned by every operation in this crate.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {hint}")]
pub struct AuthError {
    kind: ErrorKind,
    hint: String,
    debug: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl AuthError {
    /// Creates an error of the given kind with a user-facing hint.
    #[must_use]
    pub fn new(kind: ErrorKind, hint: impl Into<String>) -> Self {
        Self {
            kind,
            hint: hint.into(),
            debug: None,
            source: None,
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(hint: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, hint)
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(hint: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidClient, hint)
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(hint: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidGrant, hint)
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(hint: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidScope, hint)
    }

    /// Creates a new `ScopeNotGranted` error.
    #[must_use]
    pub fn scope_not_granted(hint: impl Into<String>) -> Self {
        Self::new(ErrorKind::ScopeNotGranted, hint)
    }

    /// Creates a new `UnauthorizedClient` error.
    #[must_use]
    pub fn unauthorized_client(hint: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnauthorizedClient, hint)
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::UnsupportedGrantType,
            format!("The authorization grant type '{grant_type}' is not supported."),
        )
    }

    /// Creates a new `UnsupportedResponseType` error.
    #[must_use]
    pub fn unsupported_response_type(response_type: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::UnsupportedResponseType,
            format!("The response type '{response_type}' is not supported."),
        )
    }

    /// Creates a new `InactiveToken` error.
    #[must_use]
    pub fn inactive_token(hint: impl Into<String>) -> Self {
        Self::new(ErrorKind::InactiveToken, hint)
    }

    /// Creates a new `TokenExpired` error.
    #[must_use]
    pub fn token_expired(hint: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenExpired, hint)
    }

    /// Creates a new `TokenSignatureMismatch` error.
    #[must_use]
    pub fn token_signature_mismatch(hint: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenSignatureMismatch, hint)
    }

    /// Creates a new `InvalidTokenFormat` error.
    #[must_use]
    pub fn invalid_token_format(hint: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidTokenFormat, hint)
    }

    /// Creates a new `TokenClaim` error.
    #[must_use]
    pub fn token_claim(hint: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenClaim, hint)
    }

    /// Creates a new `RequestUnauthorized` error.
    #[must_use]
    pub fn request_unauthorized(hint: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestUnauthorized, hint)
    }

    /// Creates a new `RequestUnknown` error.
    #[must_use]
    pub fn request_unknown(hint: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestUnknown, hint)
    }

    /// Creates a new `TemporarilyUnavailable` error.
    #[must_use]
    pub fn temporarily_unavailable(hint: impl Into<String>) -> Self {
        Self::new(ErrorKind::TemporarilyUnavailable, hint)
    }

    /// Creates a new `Misconfiguration` error.
    #[must_use]
    pub fn misconfiguration(hint: impl Into<String>) -> Self {
        Self::new(ErrorKind::Misconfiguration, hint)
    }

    /// Creates a new `ServerError` with a generic hint.
    #[must_use]
    pub fn server_error() -> Self {
        Self::new(
            ErrorKind::ServerError,
            "The authorization server encountered an unexpected condition that prevented it from fulfilling the request.",
        )
    }

    /// Wraps a storage failure as a server error. The storage text goes to
    /// the debug string only.
    #[must_use]
    pub fn storage(err: StorageError) -> Self {
        Self::server_error()
            .with_debug(err.to_string())
            .with_source(err)
    }

    /// Attaches an operator-facing debug string.
    #[must_use]
    pub fn with_debug(mut self, debug: impl Into<String>) -> Self {
        self.debug = Some(debug.into());
        self
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the user-facing hint.
    #[must_use]
    pub fn hint(&self) -> &str {
        &self.hint
    }

    /// Returns the operator-facing debug string, if any.
    #[must_use]
    pub fn debug(&self) -> Option<&str> {
        self.debug.as_deref()
    }

    /// Returns `true` if the error has the given kind.
    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Returns the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        self.kind.oauth_error_code()
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.kind.status_code())
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.kind.status_code() >= 500
    }

    /// Builds the verbose operator report: the debug string followed by the
    /// rendered cause chain.
    #[must_use]
    pub fn debug_report(&self) -> String {
        let mut report = self.debug.clone().unwrap_or_default();
        let mut cause = self.source.as_deref().map(|e| e as &(dyn StdError + 'static));
        while let Some(err) = cause {
            let text = err.to_string();
            if !report.contains(&text) {
                if !report.is_empty() {
                    report.push_str(": ");
                }
                report.push_str(&text);
            }
            cause = err.source();
        }
        report
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        Self::storage(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::invalid_grant("The refresh token has not been found.");
        assert_eq!(
            err.to_string(),
            "Invalid grant: The refresh token has not been found."
        );

        let err = AuthError::unsupported_grant_type("password");
        assert!(err.to_string().contains("'password'"));
    }

    #[test]
    fn test_error_predicates() {
        let err = AuthError::invalid_scope("test");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert!(err.is(ErrorKind::InvalidScope));

        let err = AuthError::server_error();
        assert!(!err.is_client_error());
        assert!(err.is_server_error());

        let err = AuthError::temporarily_unavailable("retry");
        assert!(err.is_server_error());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::invalid_grant("test").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            AuthError::scope_not_granted("test").category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            AuthError::inactive_token("test").category(),
            ErrorCategory::Token
        );
        assert_eq!(
            AuthError::misconfiguration("test").category(),
            ErrorCategory::Configuration
        );
    }

    #[test]
    fn test_oauth_error_code() {
        assert_eq!(AuthError::invalid_grant("t").oauth_error_code(), "invalid_grant");
        assert_eq!(
            AuthError::scope_not_granted("t").oauth_error_code(),
            "scope_not_granted"
        );
        assert_eq!(
            AuthError::inactive_token("t").oauth_error_code(),
            "inactive_token"
        );
        assert_eq!(AuthError::server_error().oauth_error_code(), "server_error");
        assert_eq!(
            AuthError::token_expired("t").oauth_error_code(),
            "invalid_token"
        );
    }

    #[test]
    fn test_storage_error_text_stays_out_of_hint() {
        let err = AuthError::from(StorageError::backend("connection reset by peer"));
        assert!(err.is(ErrorKind::ServerError));
        assert!(!err.hint().contains("connection reset"));
        assert!(err.debug_report().contains("connection reset"));
    }

    #[test]
    fn test_debug_report_walks_source_chain() {
        let inner = AuthError::invalid_request("inner").with_debug("inner debug");
        let outer = AuthError::server_error()
            .with_debug("outer debug")
            .with_source(inner);

        let report = outer.debug_report();
        assert!(report.starts_with("outer debug"));
        assert!(report.contains("Invalid request: inner"));
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Authentication.to_string(), "authentication");
        assert_eq!(ErrorCategory::Token.to_string(), "token");
    }
}
