//! Token introspection.
//!
//! [`CoreIntrospector`] looks tokens up in storage, so revocation takes
//! effect immediately. [`StatelessJwtIntrospector`] trusts the signature and
//! claims of JWT access tokens without touching storage; a revoked JWT stays
//! valid for it until it expires.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::OidcConfig;
use crate::error::AuthError;
use crate::oauth::handler::{HandlerContext, TokenIntrospector};
use crate::request::{Request, TokenKind};
use crate::session::{JwtClaims, Session};
use crate::storage::{AccessTokenStorage, RefreshTokenStorage, StorageError};
use crate::token::jwt::JwtSigner;
use crate::token::strategy::{JWT_ACCESS_TOKEN_TYPE, is_jwt_profile_access_token};
use crate::types::Client;

/// Fails unless every scope in `required` is covered by the granted scopes.
fn match_scopes(config: &OidcConfig, request: &Request, required: &[String]) -> AuthResult<()> {
    for scope in required {
        if !config
            .scope_strategy
            .matches(&request.granted_scopes, scope)
        {
            return Err(AuthError::invalid_scope(format!(
                "The request scope '{scope}' has not been granted or is not allowed to be requested."
            )));
        }
    }
    Ok(())
}

// =============================================================================
// Storage-backed Introspection
// =============================================================================

/// Introspects access and refresh tokens against storage.
pub struct CoreIntrospector {
    context: HandlerContext,
}

impl CoreIntrospector {
    #[must_use]
    pub fn new(context: HandlerContext) -> Self {
        Self { context }
    }

    async fn introspect_access_token(
        &self,
        token: &str,
        scopes: &[String],
        accumulator: &mut Request,
    ) -> AuthResult<TokenKind> {
        let signature = self.context.strategy.access_token_signature(token);
        let original = self
            .context
            .storage
            .get_access_token_session(&signature)
            .await
            .map_err(|e| unknown_token(e, "The access token is not known."))?;

        self.context
            .strategy
            .validate_access_token(&original, token)?;
        match_scopes(&self.context.config, &original, scopes)?;
        accumulator.merge(&original);
        Ok(TokenKind::AccessToken)
    }

    async fn introspect_refresh_token(
        &self,
        token: &str,
        scopes: &[String],
        accumulator: &mut Request,
    ) -> AuthResult<TokenKind> {
        let signature = self.context.strategy.refresh_token_signature(token);
        let original = match self
            .context
            .storage
            .get_refresh_token_session(&signature)
            .await
        {
            Ok(original) => original,
            Err(StorageError::Inactive { .. }) => {
                return Err(AuthError::inactive_token(
                    "The refresh token has been used before or was revoked.",
                ));
            }
            Err(err) => return Err(unknown_token(err, "The refresh token is not known.")),
        };

        self.context
            .strategy
            .validate_refresh_token(&original, token)?;
        match_scopes(&self.context.config, &original, scopes)?;
        accumulator.merge(&original);
        Ok(TokenKind::RefreshToken)
    }
}

#[async_trait]
impl TokenIntrospector for CoreIntrospector {
    /// Tries the hinted kind first, access tokens without a hint. When both
    /// kinds fail, the error of the first attempt is returned.
    async fn introspect_token(
        &self,
        token: &str,
        hint: Option<TokenKind>,
        scopes: &[String],
        accumulator: &mut Request,
    ) -> AuthResult<TokenKind> {
        if hint == Some(TokenKind::RefreshToken) {
            match self.introspect_refresh_token(token, scopes, accumulator).await {
                Ok(kind) => Ok(kind),
                Err(err) => self
                    .introspect_access_token(token, scopes, accumulator)
                    .await
                    .map_err(|_| err),
            }
        } else {
            match self.introspect_access_token(token, scopes, accumulator).await {
                Ok(kind) => Ok(kind),
                Err(err) => self
                    .introspect_refresh_token(token, scopes, accumulator)
                    .await
                    .map_err(|_| err),
            }
        }
    }
}

// =============================================================================
// Stateless JWT Introspection
// =============================================================================

/// Introspects JWT access tokens from their claims alone.
#[derive(Debug, Clone)]
pub struct StatelessJwtIntrospector {
    signer: Arc<JwtSigner>,
    config: Arc<OidcConfig>,
}

impl StatelessJwtIntrospector {
    #[must_use]
    pub fn new(signer: Arc<JwtSigner>, config: Arc<OidcConfig>) -> Self {
        Self { signer, config }
    }

    fn opaque_prefix(&self) -> String {
        format!(
            "{}_{}_",
            self.config.tokens.prefix_organization,
            TokenKind::AccessToken.part()
        )
    }

    /// Rebuilds the request a JWT access token was issued for.
    fn request_from_claims(&self, claims: JwtClaims) -> AuthResult<Request> {
        let client_id = claims.client_id.clone().unwrap_or_default();

        let mut session = Session::new(claims.subject.clone());
        session.client_id.clone_from(&client_id);
        if let Some(expires_at) = claims.expires_at {
            session.set_expires_at(TokenKind::AccessToken, expires_at);
        }

        let mut request = Request::new(Arc::new(Client::new(client_id)), session);
        if let Some(jti) = &claims.jti {
            request.id.clone_from(jti);
        }
        request.requested_at = match (claims.issued_at, claims.extra.get("rat")) {
            (Some(issued_at), _) => issued_at,
            (None, Some(rat)) => rat
                .as_i64()
                .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
                .ok_or_else(|| AuthError::token_claim("Claim 'rat' is not a valid timestamp."))?,
            (None, None) => OffsetDateTime::now_utc(),
        };
        request.set_requested_scopes(&claims.scope);
        request.granted_scopes.clone_from(&claims.scope);
        request.set_requested_audience(&claims.audience);
        request.granted_audience.clone_from(&claims.audience);
        Ok(request)
    }
}

#[async_trait]
impl TokenIntrospector for StatelessJwtIntrospector {
    async fn introspect_token(
        &self,
        token: &str,
        _hint: Option<TokenKind>,
        scopes: &[String],
        accumulator: &mut Request,
    ) -> AuthResult<TokenKind> {
        if !is_jwt_profile_access_token(token, &self.opaque_prefix()) {
            return Err(AuthError::request_unknown("The token is not a JWT access token."));
        }

        let (header, claims) = self.signer.decode(token)?;
        let typ = header.typ.as_deref().unwrap_or_default();
        if !typ.eq_ignore_ascii_case(JWT_ACCESS_TOKEN_TYPE)
            && !typ.eq_ignore_ascii_case("application/at+jwt")
        {
            return Err(AuthError::request_unauthorized(
                "The token is not an RFC 9068 JWT access token.",
            )
            .with_debug(format!("Unexpected 'typ' header '{typ}'.")));
        }

        let request = self.request_from_claims(JwtClaims::from_map(claims)?)?;
        match_scopes(&self.config, &request, scopes)?;
        accumulator.merge(&request);

        tracing::debug!(request_id = %request.id, "JWT access token introspected without storage");
        Ok(TokenKind::AccessToken)
    }
}

/// Missing tokens are unauthorized. Backend failures stay server errors.
fn unknown_token(err: StorageError, hint: &str) -> AuthError {
    match err {
        StorageError::NotFound | StorageError::Inactive { .. } => {
            AuthError::request_unauthorized(hint).with_debug(err.to_string())
        }
        err => AuthError::storage(err),
    }
}
