//! Handler contracts and their registry.
//!
//! Endpoints never query handlers for capabilities at runtime. Each handler
//! category has its own trait, and [`HandlerRegistry`] holds one typed list
//! per category, populated once at startup.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::OidcConfig;
use crate::error::AuthError;
use crate::oauth::authorize_code::AuthorizeCodeHandler;
use crate::oauth::client_credentials::ClientCredentialsGrantHandler;
use crate::oauth::pkce::PkceHandler;
use crate::oauth::refresh::RefreshTokenGrantHandler;
use crate::request::{
    AccessRequest, AccessResponse, AuthorizeRequest, AuthorizeResponse, Request, TokenKind,
};
use crate::storage::{TokenStore, TokenTransaction};
use crate::token::TokenStrategy;
use crate::token::introspection::CoreIntrospector;
use crate::token::revocation::TokenRevocationHandler;
use crate::types::{Client, GrantType, LifespanKind};

// =============================================================================
// Handler Traits
// =============================================================================

/// Handler run at the token endpoint.
#[async_trait]
pub trait TokenEndpointHandler: Send + Sync {
    /// Returns `true` if this handler is responsible for `request`.
    fn can_handle(&self, request: &AccessRequest) -> bool;

    /// Returns `true` if the request may be processed without client
    /// authentication.
    fn can_skip_client_auth(&self, _request: &AccessRequest) -> bool {
        false
    }

    /// Validates the request and prepares the session of the tokens to issue.
    async fn handle_token_endpoint_request(&self, request: &mut AccessRequest) -> AuthResult<()>;

    /// Issues tokens and writes them into `response`.
    async fn populate_token_endpoint_response(
        &self,
        request: &mut AccessRequest,
        response: &mut AccessResponse,
    ) -> AuthResult<()>;
}

/// Handler run at the authorization endpoint.
#[async_trait]
pub trait AuthorizeEndpointHandler: Send + Sync {
    async fn handle_authorize_endpoint_request(
        &self,
        request: &mut AuthorizeRequest,
        response: &mut AuthorizeResponse,
    ) -> AuthResult<()>;
}

/// Token introspection strategy.
///
/// Returns `request_unknown` for tokens it is not responsible for.
#[async_trait]
pub trait TokenIntrospector: Send + Sync {
    /// Validates `token`, checks that it was granted every scope in
    /// `scopes`, and merges the token's request into `accumulator`.
    async fn introspect_token(
        &self,
        token: &str,
        hint: Option<TokenKind>,
        scopes: &[String],
        accumulator: &mut Request,
    ) -> AuthResult<TokenKind>;
}

/// RFC 7009 token revocation.
#[async_trait]
pub trait RevocationHandler: Send + Sync {
    async fn revoke_token(
        &self,
        client: &Client,
        token: &str,
        hint: Option<TokenKind>,
    ) -> AuthResult<()>;
}

// =============================================================================
// Handler Context
// =============================================================================

/// Collaborators shared by the standard handlers.
#[derive(Clone)]
pub struct HandlerContext {
    pub config: Arc<OidcConfig>,
    pub strategy: Arc<dyn TokenStrategy>,
    pub storage: Arc<dyn TokenStore>,
}

impl HandlerContext {
    #[must_use]
    pub fn new(
        config: Arc<OidcConfig>,
        strategy: Arc<dyn TokenStrategy>,
        storage: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            config,
            strategy,
            storage,
        }
    }

    /// Lifespan of a token of `kind` issued to `client` by `grant`.
    pub(crate) fn lifespan(&self, client: &Client, grant: GrantType, kind: LifespanKind) -> Duration {
        let fallback = match kind {
            LifespanKind::AccessToken => self.config.lifespans.access_token,
            LifespanKind::RefreshToken => self.config.lifespans.refresh_token,
            LifespanKind::IdToken => self.config.lifespans.id_token,
        };
        client.effective_lifespan(grant, kind, fallback)
    }

    /// Sets the access token expiry and, when the refresh lifespan is not
    /// zero, the refresh token expiry of the session. A zero refresh lifespan
    /// clears the refresh expiry so the token never expires.
    pub(crate) fn set_token_expiry(&self, request: &mut Request, grant: GrantType, refresh: bool) {
        let now = OffsetDateTime::now_utc();
        let access = self.lifespan(&request.client, grant, LifespanKind::AccessToken);
        request
            .session
            .set_expires_at(TokenKind::AccessToken, now + access);

        if refresh {
            let lifespan = self.lifespan(&request.client, grant, LifespanKind::RefreshToken);
            if lifespan.is_zero() {
                request.session.clear_expires_at(TokenKind::RefreshToken);
            } else {
                request
                    .session
                    .set_expires_at(TokenKind::RefreshToken, now + lifespan);
            }
        }
    }

    /// Returns `true` if the grant may carry a refresh token.
    pub(crate) fn can_issue_refresh_token(&self, request: &Request) -> bool {
        self.config.is_refresh_eligible(&request.granted_scopes)
            && request.client.is_grant_type_allowed(GrantType::RefreshToken)
    }

    /// Fills the access token fields of `response`.
    pub(crate) fn write_access_token(
        &self,
        request: &Request,
        grant: GrantType,
        token: String,
        response: &mut AccessResponse,
    ) {
        let expires_at = request
            .session
            .expires_at(TokenKind::AccessToken)
            .unwrap_or_else(|| {
                OffsetDateTime::now_utc()
                    + self.lifespan(&request.client, grant, LifespanKind::AccessToken)
            });
        response.set_access_token(token);
        response.set_expires_at(expires_at);
        response.set_scopes(&request.granted_scopes);
    }
}

/// Rolls back `tx` after `err`. A failed rollback is composed with the
/// triggering error into a server error.
pub(crate) async fn rollback(tx: &dyn TokenTransaction, err: AuthError) -> AuthError {
    match tx.rollback().await {
        Ok(()) => err,
        Err(rollback_err) => {
            tracing::warn!(error = %rollback_err, "Failed to roll back token transaction");
            let debug = format!(
                "error: {}; rollback error: {rollback_err}",
                err.debug_report()
            );
            AuthError::server_error().with_debug(debug).with_source(err)
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Statically typed handler lists, one per endpoint.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    pub authorize: Vec<Arc<dyn AuthorizeEndpointHandler>>,
    pub token: Vec<Arc<dyn TokenEndpointHandler>>,
    pub introspection: Vec<Arc<dyn TokenIntrospector>>,
    pub revocation: Vec<Arc<dyn RevocationHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Composes the standard handler set.
    ///
    /// The PKCE handler is registered after the authorization code handler
    /// at both endpoints; it needs the issued code.
    #[must_use]
    pub fn default_for(context: &HandlerContext) -> Self {
        let code = Arc::new(AuthorizeCodeHandler::new(context.clone()));
        let pkce = Arc::new(PkceHandler::new(context.clone()));

        Self::new()
            .with_authorize_handler(code.clone())
            .with_authorize_handler(pkce.clone())
            .with_token_handler(code)
            .with_token_handler(pkce)
            .with_token_handler(Arc::new(RefreshTokenGrantHandler::new(context.clone())))
            .with_token_handler(Arc::new(ClientCredentialsGrantHandler::new(context.clone())))
            .with_introspector(Arc::new(CoreIntrospector::new(context.clone())))
            .with_revocation_handler(Arc::new(TokenRevocationHandler::new(context.clone())))
    }

    #[must_use]
    pub fn with_authorize_handler(mut self, handler: Arc<dyn AuthorizeEndpointHandler>) -> Self {
        self.authorize.push(handler);
        self
    }

    #[must_use]
    pub fn with_token_handler(mut self, handler: Arc<dyn TokenEndpointHandler>) -> Self {
        self.token.push(handler);
        self
    }

    #[must_use]
    pub fn with_introspector(mut self, introspector: Arc<dyn TokenIntrospector>) -> Self {
        self.introspection.push(introspector);
        self
    }

    /// Registers `introspector` ahead of the others.
    #[must_use]
    pub fn with_leading_introspector(mut self, introspector: Arc<dyn TokenIntrospector>) -> Self {
        self.introspection.insert(0, introspector);
        self
    }

    #[must_use]
    pub fn with_revocation_handler(mut self, handler: Arc<dyn RevocationHandler>) -> Self {
        self.revocation.push(handler);
        self
    }
}
