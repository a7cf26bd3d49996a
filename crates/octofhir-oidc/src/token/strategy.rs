//! Token strategies.
//!
//! Grant handlers issue and check tokens through [`TokenStrategy`]. Two
//! implementations exist:
//!
//! - [`OpaqueStrategy`]: HMAC-signed opaque tokens for every kind.
//! - [`JwtProfileStrategy`]: RFC 9068 JWT access tokens for clients that
//!   opted in, opaque tokens for everything else. Refresh tokens and
//!   authorization codes are never JWTs.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::OidcConfig;
use crate::error::AuthError;
use crate::request::{Request, TokenKind};
use crate::token::jwt::{JwtHeaderOptions, JwtSigner};
use crate::token::opaque::OpaqueStrategy;

/// Header `typ` of JWT access tokens.
pub const JWT_ACCESS_TOKEN_TYPE: &str = "at+jwt";

/// Issues, identifies and validates tokens of every kind.
///
/// Signatures are the lookup keys under which requests are persisted.
pub trait TokenStrategy: Send + Sync {
    /// Returns the storage signature of an access token.
    fn access_token_signature(&self, token: &str) -> String;

    /// Issues an access token for `request`, returning `(token, signature)`.
    ///
    /// # Errors
    ///
    /// Returns `server_error` if the token cannot be produced.
    fn generate_access_token(&self, request: &Request) -> AuthResult<(String, String)>;

    /// Validates an access token against the request it was issued for.
    ///
    /// # Errors
    ///
    /// Returns one of the token error kinds (`token_expired`,
    /// `token_signature_mismatch`, `invalid_token_format`, `token_claim`).
    fn validate_access_token(&self, request: &Request, token: &str) -> AuthResult<()>;

    fn refresh_token_signature(&self, token: &str) -> String;
    fn generate_refresh_token(&self, request: &Request) -> AuthResult<(String, String)>;
    fn validate_refresh_token(&self, request: &Request, token: &str) -> AuthResult<()>;

    fn authorize_code_signature(&self, token: &str) -> String;
    fn generate_authorize_code(&self, request: &Request) -> AuthResult<(String, String)>;
    fn validate_authorize_code(&self, request: &Request, token: &str) -> AuthResult<()>;

    /// Returns the storage signature of a token of `kind`.
    fn signature(&self, kind: TokenKind, token: &str) -> String {
        match kind {
            TokenKind::AccessToken => self.access_token_signature(token),
            TokenKind::RefreshToken => self.refresh_token_signature(token),
            TokenKind::AuthorizeCode => self.authorize_code_signature(token),
        }
    }
}

impl TokenStrategy for OpaqueStrategy {
    fn access_token_signature(&self, token: &str) -> String {
        OpaqueStrategy::signature(self, TokenKind::AccessToken, token)
    }

    fn generate_access_token(&self, _request: &Request) -> AuthResult<(String, String)> {
        self.generate(TokenKind::AccessToken)
    }

    fn validate_access_token(&self, request: &Request, token: &str) -> AuthResult<()> {
        self.validate(TokenKind::AccessToken, request, token)
    }

    fn refresh_token_signature(&self, token: &str) -> String {
        OpaqueStrategy::signature(self, TokenKind::RefreshToken, token)
    }

    fn generate_refresh_token(&self, _request: &Request) -> AuthResult<(String, String)> {
        self.generate(TokenKind::RefreshToken)
    }

    fn validate_refresh_token(&self, request: &Request, token: &str) -> AuthResult<()> {
        self.validate(TokenKind::RefreshToken, request, token)
    }

    fn authorize_code_signature(&self, token: &str) -> String {
        OpaqueStrategy::signature(self, TokenKind::AuthorizeCode, token)
    }

    fn generate_authorize_code(&self, _request: &Request) -> AuthResult<(String, String)> {
        self.generate(TokenKind::AuthorizeCode)
    }

    fn validate_authorize_code(&self, request: &Request, token: &str) -> AuthResult<()> {
        self.validate(TokenKind::AuthorizeCode, request, token)
    }
}

/// Returns `true` if `token` looks like a JWT access token: exactly three
/// dot-separated segments and no canonical opaque access token prefix.
#[must_use]
pub fn is_jwt_profile_access_token(token: &str, opaque_prefix: &str) -> bool {
    token.split('.').count() == 3 && !token.starts_with(opaque_prefix)
}

/// Wraps the opaque strategy and issues JWT access tokens to clients with
/// `jwt_profile_access_tokens` enabled.
#[derive(Debug, Clone)]
pub struct JwtProfileStrategy {
    opaque: OpaqueStrategy,
    signer: Arc<JwtSigner>,
    config: Arc<OidcConfig>,
}

impl JwtProfileStrategy {
    #[must_use]
    pub fn new(opaque: OpaqueStrategy, signer: Arc<JwtSigner>, config: Arc<OidcConfig>) -> Self {
        Self {
            opaque,
            signer,
            config,
        }
    }

    /// Returns `true` if `token` should be handled as a JWT access token.
    #[must_use]
    pub fn is_jwt(&self, token: &str) -> bool {
        is_jwt_profile_access_token(token, &self.opaque.prefix(TokenKind::AccessToken))
    }
}

fn jwt_signature(token: &str) -> String {
    token.rsplit('.').next().unwrap_or_default().to_string()
}

impl TokenStrategy for JwtProfileStrategy {
    fn access_token_signature(&self, token: &str) -> String {
        if self.is_jwt(token) {
            jwt_signature(token)
        } else {
            self.opaque.access_token_signature(token)
        }
    }

    fn generate_access_token(&self, request: &Request) -> AuthResult<(String, String)> {
        if !request.client.jwt_profile_access_tokens {
            return self.opaque.generate_access_token(request);
        }

        let mut claims = request
            .session
            .access_token_claims()
            .with_defaults(OffsetDateTime::now_utc(), &self.config.issuer);
        claims.scope.clone_from(&request.granted_scopes);
        claims.audience.clone_from(&request.granted_audience);
        if claims.client_id.as_deref().is_none_or(str::is_empty) {
            claims.client_id = Some(request.client.client_id.clone());
        }

        let token = self
            .signer
            .encode(
                &claims.to_map(self.config.tokens.jwt_scope_field),
                &JwtHeaderOptions::typed(JWT_ACCESS_TOKEN_TYPE),
            )
            .map_err(|e| {
                AuthError::server_error()
                    .with_debug(e.to_string())
                    .with_source(e)
            })?;
        let signature = jwt_signature(&token);
        Ok((token, signature))
    }

    fn validate_access_token(&self, request: &Request, token: &str) -> AuthResult<()> {
        if self.is_jwt(token) {
            self.signer.decode(token)?;
            return Ok(());
        }
        self.opaque.validate_access_token(request, token)
    }

    fn refresh_token_signature(&self, token: &str) -> String {
        self.opaque.refresh_token_signature(token)
    }

    fn generate_refresh_token(&self, request: &Request) -> AuthResult<(String, String)> {
        self.opaque.generate_refresh_token(request)
    }

    fn validate_refresh_token(&self, request: &Request, token: &str) -> AuthResult<()> {
        self.opaque.validate_refresh_token(request, token)
    }

    fn authorize_code_signature(&self, token: &str) -> String {
        self.opaque.authorize_code_signature(token)
    }

    fn generate_authorize_code(&self, request: &Request) -> AuthResult<(String, String)> {
        self.opaque.generate_authorize_code(request)
    }

    fn validate_authorize_code(&self, request: &Request, token: &str) -> AuthResult<()> {
        self.opaque.validate_authorize_code(request, token)
    }
}
