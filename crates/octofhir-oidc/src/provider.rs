//! Provider facade.
//!
//! [`Provider`] routes endpoint requests through the handler registry. It
//! assumes the caller has already authenticated the client and collected
//! the resource owner's consent.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::AuthResult;
use crate::config::OidcConfig;
use crate::error::{AuthError, ErrorKind};
use crate::oauth::handler::{HandlerContext, HandlerRegistry};
use crate::oauth::jarm::JarmEncoder;
use crate::request::{AccessRequest, AccessResponse, AuthorizeRequest, AuthorizeResponse, Request, TokenKind};
use crate::session::Session;
use crate::storage::TokenStore;
use crate::token::TokenStrategy;
use crate::token::introspection::StatelessJwtIntrospector;
use crate::token::jwt::JwtSigner;
use crate::types::Client;

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Provider`].
pub struct ProviderBuilder {
    config: Arc<OidcConfig>,
    strategy: Arc<dyn TokenStrategy>,
    storage: Arc<dyn TokenStore>,
    signer: Option<Arc<JwtSigner>>,
    registry: Option<HandlerRegistry>,
    stateless_introspection: bool,
}

impl ProviderBuilder {
    /// Keyring used for JARM responses and stateless introspection.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<JwtSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Replaces the standard handler set.
    #[must_use]
    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Introspects JWT access tokens from their claims, ahead of storage.
    /// Requires a signer.
    #[must_use]
    pub fn with_stateless_introspection(mut self) -> Self {
        self.stateless_introspection = true;
        self
    }

    /// Builds the provider.
    ///
    /// # Errors
    ///
    /// Returns `misconfiguration` if the configuration is invalid, or if
    /// stateless introspection was requested without a signer.
    pub fn build(self) -> AuthResult<Provider> {
        self.config.validate().map_err(|e| {
            AuthError::misconfiguration("The provider configuration is invalid.")
                .with_debug(e.to_string())
                .with_source(e)
        })?;

        let context = HandlerContext::new(Arc::clone(&self.config), self.strategy, self.storage);
        let mut registry = self
            .registry
            .unwrap_or_else(|| HandlerRegistry::default_for(&context));

        if self.stateless_introspection {
            let signer = self.signer.clone().ok_or_else(|| {
                AuthError::misconfiguration("Stateless introspection requires a signing key.")
            })?;
            registry = registry.with_leading_introspector(Arc::new(StatelessJwtIntrospector::new(
                signer,
                Arc::clone(&self.config),
            )));
        }

        tracing::debug!(
            issuer = %self.config.issuer,
            authorize_handlers = registry.authorize.len(),
            token_handlers = registry.token.len(),
            introspectors = registry.introspection.len(),
            "OIDC provider initialized"
        );

        Ok(Provider {
            jarm: JarmEncoder::new(self.signer, Arc::clone(&self.config)),
            config: self.config,
            context,
            registry,
        })
    }
}

// =============================================================================
// Provider
// =============================================================================

/// OAuth 2.0 / OpenID Connect token lifecycle provider.
pub struct Provider {
    config: Arc<OidcConfig>,
    context: HandlerContext,
    registry: HandlerRegistry,
    jarm: JarmEncoder,
}

impl Provider {
    /// Starts building a provider.
    ///
    /// `strategy` should be built from the same `config`.
    #[must_use]
    pub fn builder(
        config: Arc<OidcConfig>,
        strategy: Arc<dyn TokenStrategy>,
        storage: Arc<dyn TokenStore>,
    ) -> ProviderBuilder {
        ProviderBuilder {
            config,
            strategy,
            storage,
            signer: None,
            registry: None,
            stateless_introspection: false,
        }
    }

    #[must_use]
    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    #[must_use]
    pub fn context(&self) -> &HandlerContext {
        &self.context
    }

    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Runs the authorization endpoint handlers over a consented request.
    ///
    /// For the JWT response modes the parameters are replaced by a single
    /// `response` parameter carrying the signed JARM token.
    ///
    /// # Errors
    ///
    /// Returns the first handler error, or `unsupported_response_type` if a
    /// requested response type was left unhandled.
    pub async fn authorize(&self, request: &mut AuthorizeRequest) -> AuthResult<AuthorizeResponse> {
        let mut response = AuthorizeResponse::default();
        for handler in &self.registry.authorize {
            handler
                .handle_authorize_endpoint_request(request, &mut response)
                .await?;
        }

        if !request.did_handle_all_response_types() {
            return Err(AuthError::unsupported_response_type(
                request.response_types.join(" "),
            ));
        }

        let mode = request.effective_response_mode();
        response.response_mode = mode;
        if mode.is_jwt() {
            let jwt = self
                .jarm
                .encode(&request.client, Some(&request.session), &response.parameters)?;
            response.parameters = BTreeMap::from([("response".to_string(), jwt)]);
        }

        tracing::debug!(
            request_id = %request.id,
            client_id = %request.client.client_id,
            response_mode = ?mode,
            "Authorization request completed"
        );
        Ok(response)
    }

    /// Returns `true` if the request may be processed without client
    /// authentication.
    #[must_use]
    pub fn can_skip_client_auth(&self, request: &AccessRequest) -> bool {
        self.registry
            .token
            .iter()
            .any(|h| h.can_handle(request) && h.can_skip_client_auth(request))
    }

    /// Runs the token endpoint handlers for the request's grant type.
    ///
    /// Every responsible handler first validates the request, then every one
    /// of them populates the response.
    ///
    /// # Errors
    ///
    /// Returns `unsupported_grant_type` if no handler is responsible, and the
    /// first handler error otherwise.
    pub async fn exchange(&self, request: &mut AccessRequest) -> AuthResult<AccessResponse> {
        let handlers: Vec<_> = self
            .registry
            .token
            .iter()
            .filter(|h| h.can_handle(&*request))
            .collect();
        if handlers.is_empty() {
            return Err(AuthError::unsupported_grant_type(request.grant_types.join(" ")));
        }

        for handler in &handlers {
            handler.handle_token_endpoint_request(request).await?;
        }

        let mut response = AccessResponse::default();
        for handler in &handlers {
            handler
                .populate_token_endpoint_response(request, &mut response)
                .await?;
        }

        let grant_types = request.grant_types.clone();
        for grant_type in &grant_types {
            request.mark_handled(grant_type);
        }
        Ok(response)
    }

    /// Introspects `token`, requiring every scope in `scopes`.
    ///
    /// Introspectors are asked in registry order; one answering
    /// `request_unknown` passes the token on to the next.
    ///
    /// # Errors
    ///
    /// Returns the first introspector error other than `request_unknown`, or
    /// `request_unauthorized` if no introspector recognized the token.
    pub async fn introspect(
        &self,
        token: &str,
        hint: Option<TokenKind>,
        scopes: &[String],
    ) -> AuthResult<(TokenKind, Request)> {
        let mut accumulator = Request::new(Arc::new(Client::new("")), Session::new(""));
        for introspector in &self.registry.introspection {
            match introspector
                .introspect_token(token, hint, scopes, &mut accumulator)
                .await
            {
                Ok(kind) => return Ok((kind, accumulator)),
                Err(err) if err.is(ErrorKind::RequestUnknown) => {}
                Err(err) => return Err(err),
            }
        }
        Err(AuthError::request_unauthorized(
            "Unable to find a suitable validation strategy for the token.",
        ))
    }

    /// Revokes `token` on behalf of `client`.
    ///
    /// # Errors
    ///
    /// Returns the first revocation handler error.
    pub async fn revoke(&self, client: &Client, token: &str, hint: Option<TokenKind>) -> AuthResult<()> {
        for handler in &self.registry.revocation {
            handler.revoke_token(client, token, hint).await?;
        }
        Ok(())
    }
}
