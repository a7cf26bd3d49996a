//! PKCE (Proof Key for Code Exchange, RFC 7636).
//!
//! At the authorization endpoint [`PkceHandler`] stores the code challenge
//! under the signature of the issued authorization code. At the token
//! endpoint it deletes that record before checking the presented verifier,
//! so every challenge is consumed at most once.
//!
//! `S256` is always accepted. `plain` is accepted only when
//! [`PkceConfig::allow_plain`](crate::config::PkceConfig) is set or the
//! client pins it.
//!
//! # Example
//!
//! ```
//! use octofhir_oidc::oauth::pkce::{PkceChallenge, PkceChallengeMethod, PkceVerifier};
//!
//! // Client generates a verifier and challenge
//! let verifier = PkceVerifier::generate();
//! let challenge = PkceChallenge::from_verifier(&verifier);
//!
//! // Server stores the challenge, later verifies the verifier from the token request
//! assert!(challenge.verify(PkceChallengeMethod::S256, verifier.as_str()).is_ok());
//! ```

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::handler::{AuthorizeEndpointHandler, HandlerContext, TokenEndpointHandler};
use crate::request::{AccessRequest, AccessResponse, AuthorizeRequest, AuthorizeResponse};
use crate::storage::{PkceRequestStorage, StorageError};
use crate::types::{Client, GrantType};

const VERIFIER_MIN_LENGTH: usize = 43;
const VERIFIER_MAX_LENGTH: usize = 128;

/// Form parameters kept in the stored PKCE record.
const PKCE_PARAMETERS: &[&str] = &["code_challenge", "code_challenge_method"];

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during PKCE operations.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Verifier length is outside the valid range (43-128 characters).
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains invalid characters.
    #[error("Invalid verifier characters: must be [A-Za-z0-9-._~]")]
    InvalidVerifierCharacters,

    /// Unsupported challenge method.
    #[error("Unsupported challenge method: {0}")]
    UnsupportedMethod(String),

    /// PKCE verification failed (verifier doesn't match challenge).
    #[error("PKCE verification failed: verifier does not match challenge")]
    VerificationFailed,
}

impl PkceError {
    /// Hint presented to the client at the token endpoint.
    #[must_use]
    pub fn token_endpoint_hint(&self) -> &'static str {
        match self {
            Self::InvalidVerifierLength(len) if *len < VERIFIER_MIN_LENGTH => {
                "The PKCE code verifier must be at least 43 characters."
            }
            Self::InvalidVerifierLength(_) => {
                "The PKCE code verifier can not be longer than 128 characters."
            }
            Self::InvalidVerifierCharacters => {
                "The PKCE code verifier must only contain [a-Z], [0-9], '-', '.', '_', '~'."
            }
            Self::UnsupportedMethod(_) => {
                "The code_challenge_method is not supported, use S256 instead."
            }
            Self::VerificationFailed => "The PKCE code challenge did not match the code verifier.",
        }
    }
}

impl From<PkceError> for AuthError {
    fn from(err: PkceError) -> Self {
        AuthError::invalid_grant(err.token_endpoint_hint()).with_debug(err.to_string())
    }
}

// =============================================================================
// PKCE Challenge Method
// =============================================================================

/// PKCE challenge method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PkceChallengeMethod {
    /// SHA-256 hash.
    #[default]
    S256,
    /// Verifier and challenge are identical.
    Plain,
}

impl PkceChallengeMethod {
    /// Parse challenge method from string. An empty method means `plain`.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::UnsupportedMethod` for anything but `S256` and `plain`.
    pub fn parse(method: &str) -> Result<Self, PkceError> {
        match method {
            "S256" => Ok(Self::S256),
            "plain" | "" => Ok(Self::Plain),
            other => Err(PkceError::UnsupportedMethod(other.to_string())),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
            Self::Plain => "plain",
        }
    }
}

impl std::fmt::Display for PkceChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// PKCE Verifier
// =============================================================================

/// PKCE code verifier.
///
/// A high-entropy random string of 43 to 128 characters from the unreserved
/// set `[A-Z] / [a-z] / [0-9] / "-" / "." / "_" / "~"`.
#[derive(Debug, Clone)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Create a new verifier from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Length is not between 43 and 128 characters
    /// - Contains characters other than `[A-Za-z0-9-._~]`
    pub fn new(verifier: impl Into<String>) -> Result<Self, PkceError> {
        let verifier = verifier.into();
        let len = verifier.len();

        if !(VERIFIER_MIN_LENGTH..=VERIFIER_MAX_LENGTH).contains(&len) {
            return Err(PkceError::InvalidVerifierLength(len));
        }

        if !verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~')
        {
            return Err(PkceError::InvalidVerifierCharacters);
        }

        Ok(Self(verifier))
    }

    /// Generate a cryptographically random verifier.
    ///
    /// Generates 32 random bytes and encodes them as base64url (43 characters).
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        // `gen` is a reserved keyword in Rust 2024, so we use r#gen
        let bytes: [u8; 32] = rng.r#gen();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// PKCE Challenge
// =============================================================================

/// PKCE code challenge: `BASE64URL(SHA256(ASCII(code_verifier)))` for S256,
/// the verifier itself for plain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    /// Create an S256 challenge from a verifier.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        Self(s256(verifier.as_str()))
    }

    /// Checks `verifier` against this challenge in constant time.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::VerificationFailed` if the verifier doesn't match.
    pub fn verify(&self, method: PkceChallengeMethod, verifier: &str) -> Result<(), PkceError> {
        let expected = match method {
            PkceChallengeMethod::S256 => s256(verifier),
            PkceChallengeMethod::Plain => verifier.to_string(),
        };
        if bool::from(expected.as_bytes().ct_eq(self.0.as_bytes())) {
            Ok(())
        } else {
            Err(PkceError::VerificationFailed)
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn s256(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

// =============================================================================
// Handler
// =============================================================================

/// Binds code challenges to authorization codes and verifies them at
/// redemption. Must be registered after the authorization code handler.
pub struct PkceHandler {
    context: HandlerContext,
}

impl PkceHandler {
    #[must_use]
    pub fn new(context: HandlerContext) -> Self {
        Self { context }
    }

    fn validate_no_challenge(&self, client: &Client) -> AuthResult<()> {
        let policy = self.context.config.pkce;
        if policy.enforce || client.require_pkce {
            return Err(AuthError::invalid_request(
                "Clients must include a code_challenge when performing the authorize code flow, but it is missing.",
            )
            .with_debug("The server is configured in a way that enforces PKCE for clients."));
        }
        if policy.enforce_for_public_clients && client.is_public() {
            return Err(AuthError::invalid_request(
                "This client must include a code_challenge when performing the authorize code flow, but it is missing.",
            )
            .with_debug("The server is configured in a way that enforces PKCE for this client."));
        }
        Ok(())
    }

    /// Applies the enforcement policy to a challenge and its method.
    fn validate_policy(&self, client: &Client, challenge: &str, method: &str) -> AuthResult<()> {
        if challenge.is_empty() {
            return self.validate_no_challenge(client);
        }

        let method = PkceChallengeMethod::parse(method).map_err(|e| {
            AuthError::invalid_request("The code_challenge_method is not supported, use S256 instead.")
                .with_debug(e.to_string())
        })?;

        if let Some(pinned) = client.pkce_challenge_method.as_deref() {
            if pinned != method.as_str() {
                return Err(AuthError::invalid_request(format!(
                    "Clients must use code_challenge_method={pinned}."
                ))
                .with_debug("The client is configured to use a specific PKCE challenge method."));
            }
            return Ok(());
        }

        if method == PkceChallengeMethod::Plain && !self.context.config.pkce.allow_plain {
            return Err(AuthError::invalid_request(
                "Clients must use code_challenge_method=S256, plain is not allowed.",
            )
            .with_debug(
                "The server is configured in a way that enforces PKCE S256 as challenge method for clients.",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthorizeEndpointHandler for PkceHandler {
    async fn handle_authorize_endpoint_request(
        &self,
        request: &mut AuthorizeRequest,
        response: &mut AuthorizeResponse,
    ) -> AuthResult<()> {
        if !request.has_response_type("code") {
            return Ok(());
        }

        let challenge = request.form_value("code_challenge").unwrap_or_default();
        let method = request.form_value("code_challenge_method").unwrap_or_default();
        self.validate_policy(&request.client, challenge, method)?;

        if challenge.is_empty() && method.is_empty() {
            return Ok(());
        }

        let code = response.parameter("code").ok_or_else(|| {
            AuthError::misconfiguration("The authorization code has not been issued yet.")
                .with_debug("The PKCE handler must be loaded after the authorize code handler.")
        })?;
        let signature = self.context.strategy.authorize_code_signature(code);

        self.context
            .storage
            .create_pkce_request_session(&signature, &request.sanitize(PKCE_PARAMETERS))
            .await
            .map_err(AuthError::storage)?;

        tracing::debug!(
            request_id = %request.id,
            client_id = %request.client.client_id,
            "PKCE challenge bound to authorization code"
        );
        Ok(())
    }
}

#[async_trait]
impl TokenEndpointHandler for PkceHandler {
    fn can_handle(&self, request: &AccessRequest) -> bool {
        request.is_exactly_grant_type(GrantType::AuthorizationCode.as_str())
    }

    async fn handle_token_endpoint_request(&self, request: &mut AccessRequest) -> AuthResult<()> {
        if !self.can_handle(request) {
            return Err(AuthError::request_unknown(
                "The handler is not responsible for this request.",
            ));
        }

        let verifier = request.form_value("code_verifier").unwrap_or_default();
        let code = request.form_value("code").unwrap_or_default();
        let signature = self.context.strategy.authorize_code_signature(code);

        let record = match self.context.storage.get_pkce_request_session(&signature).await {
            Ok(record) => record,
            Err(StorageError::NotFound) if verifier.is_empty() => {
                return self.validate_no_challenge(&request.client);
            }
            Err(StorageError::NotFound) => {
                return Err(AuthError::invalid_grant(
                    "Unable to find initial PKCE data tied to this request.",
                )
                .with_debug("Not found"));
            }
            Err(err) => return Err(AuthError::storage(err)),
        };

        // Consumed before verification, whatever the outcome.
        self.context
            .storage
            .delete_pkce_request_session(&signature)
            .await
            .map_err(AuthError::storage)?;

        let challenge = record.form_value("code_challenge").unwrap_or_default();
        let method = record.form_value("code_challenge_method").unwrap_or_default();
        self.validate_policy(&record.client, challenge, method)?;

        if verifier.is_empty() && challenge.is_empty() {
            return Ok(());
        }

        PkceVerifier::new(verifier)?;
        if challenge.is_empty() {
            return Err(AuthError::invalid_grant(
                "The PKCE code verifier was provided but the code challenge was absent from the authorization request.",
            ));
        }

        let method = PkceChallengeMethod::parse(method)?;
        PkceChallenge(challenge.to_string()).verify(method, verifier)?;

        tracing::debug!(request_id = %request.id, "PKCE code verifier accepted");
        Ok(())
    }

    async fn populate_token_endpoint_response(
        &self,
        _request: &mut AccessRequest,
        _response: &mut AccessResponse,
    ) -> AuthResult<()> {
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
