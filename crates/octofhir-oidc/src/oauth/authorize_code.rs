//! Authorization code grant (RFC 6749 Section 4.1).

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::handler::{
    AuthorizeEndpointHandler, HandlerContext, TokenEndpointHandler, rollback,
};
use crate::request::{
    AccessRequest, AccessResponse, AuthorizeRequest, AuthorizeResponse, Request, TokenKind,
};
use crate::storage::{
    AccessTokenStorage, AuthorizeCodeStorage, RefreshTokenStorage, StorageError,
    TokenRevocationStorage, TokenTransaction, Transactional,
};
use crate::types::GrantType;

/// Authorization request parameters persisted with the code.
const CODE_PARAMETERS: &[&str] = &[
    "client_id",
    "redirect_uri",
    "response_type",
    "scope",
    "audience",
    "nonce",
    "state",
];

/// Issues authorization codes and redeems them at the token endpoint.
pub struct AuthorizeCodeHandler {
    context: HandlerContext,
}

impl AuthorizeCodeHandler {
    #[must_use]
    pub fn new(context: HandlerContext) -> Self {
        Self { context }
    }

    fn presented_signature(&self, request: &AccessRequest) -> String {
        self.context
            .strategy
            .authorize_code_signature(request.form_value("code").unwrap_or_default())
    }

    /// Revokes every token issued from a code that was presented again.
    ///
    /// Both revocations are attempted. The first failure is returned.
    async fn revoke_issued_tokens(&self, request_id: &str) -> AuthResult<()> {
        let access = self.context.storage.revoke_access_token(request_id).await;
        let refresh = self.context.storage.revoke_refresh_token(request_id).await;
        access.and(refresh).map_err(AuthError::storage)
    }

    async fn redeem(
        &self,
        tx: &dyn TokenTransaction,
        request: &Request,
        code_signature: &str,
        access_signature: &str,
        refresh_signature: Option<&str>,
    ) -> AuthResult<()> {
        tx.get_authorize_code_session(code_signature)
            .await
            .map_err(redemption_error)?;
        tx.invalidate_authorize_code_session(code_signature)
            .await
            .map_err(redemption_error)?;

        let stored = request.sanitize(&[]);
        tx.create_access_token_session(access_signature, &stored)
            .await
            .map_err(redemption_error)?;
        if let Some(refresh_signature) = refresh_signature {
            tx.create_refresh_token_session(refresh_signature, access_signature, &stored)
                .await
                .map_err(redemption_error)?;
        }

        tx.commit().await.map_err(redemption_error)
    }
}

/// A lost race against another redemption of the same code is a client
/// error.
fn redemption_error(err: StorageError) -> AuthError {
    match err {
        StorageError::SerializationFailure | StorageError::InvalidatedAuthorizeCode { .. } => {
            AuthError::invalid_request(
                "The authorization code was redeemed by a concurrent request.",
            )
            .with_debug(err.to_string())
        }
        other => AuthError::storage(other),
    }
}

#[async_trait]
impl AuthorizeEndpointHandler for AuthorizeCodeHandler {
    async fn handle_authorize_endpoint_request(
        &self,
        request: &mut AuthorizeRequest,
        response: &mut AuthorizeResponse,
    ) -> AuthResult<()> {
        if !request.is_exactly_response_type("code") {
            return Ok(());
        }

        if !request.client.is_grant_type_allowed(GrantType::AuthorizationCode) {
            return Err(AuthError::unauthorized_client(
                "The OAuth 2.0 Client is not allowed to use authorization grant 'authorization_code'.",
            ));
        }

        let strategy = self.context.config.scope_strategy;
        if let Some(scope) = request
            .requested_scopes
            .iter()
            .find(|scope| !request.client.is_scope_allowed(strategy, scope))
        {
            return Err(AuthError::invalid_scope(format!(
                "The OAuth 2.0 Client is not allowed to request scope '{scope}'."
            )));
        }
        request
            .client
            .validate_audience(self.context.config.audience_strategy, &request.requested_audience)?;

        request.session.set_expires_at(
            TokenKind::AuthorizeCode,
            OffsetDateTime::now_utc() + self.context.config.lifespans.authorize_code,
        );

        let (code, signature) = self.context.strategy.generate_authorize_code(&request.request)?;
        self.context
            .storage
            .create_authorize_code_session(&signature, &request.sanitize(CODE_PARAMETERS))
            .await
            .map_err(AuthError::storage)?;

        response.add_parameter("code", code);
        if let Some(state) = &request.state {
            response.add_parameter("state", state.clone());
        }
        response.add_parameter("scope", request.granted_scopes.join(" "));
        request.set_response_type_handled("code");

        tracing::debug!(
            request_id = %request.id,
            client_id = %request.client.client_id,
            "Authorization code issued"
        );
        Ok(())
    }
}

#[async_trait]
impl TokenEndpointHandler for AuthorizeCodeHandler {
    fn can_handle(&self, request: &AccessRequest) -> bool {
        request.is_exactly_grant_type(GrantType::AuthorizationCode.as_str())
    }

    async fn handle_token_endpoint_request(&self, request: &mut AccessRequest) -> AuthResult<()> {
        if !self.can_handle(request) {
            return Err(AuthError::request_unknown(
                "The handler is not responsible for this request.",
            ));
        }

        if !request.client.is_grant_type_allowed(GrantType::AuthorizationCode) {
            return Err(AuthError::unauthorized_client(
                "The OAuth 2.0 Client is not allowed to use authorization grant 'authorization_code'.",
            ));
        }

        let code = request.form_value("code").unwrap_or_default().to_string();
        let signature = self.presented_signature(request);

        let original = match self.context.storage.get_authorize_code_session(&signature).await {
            Ok(original) => original,
            Err(StorageError::InvalidatedAuthorizeCode { request: original }) => {
                tracing::warn!(
                    request_id = %original.id,
                    client_id = %original.client.client_id,
                    "Authorization code reuse detected, revoking issued tokens"
                );
                let err = AuthError::invalid_grant("The authorization code has already been used.");
                return Err(match self.revoke_issued_tokens(&original.id).await {
                    Ok(()) => err,
                    Err(cleanup) => {
                        tracing::warn!(
                            request_id = %original.id,
                            kind = %cleanup.kind(),
                            error = %cleanup.debug_report(),
                            "Failed to revoke tokens of a reused authorization code"
                        );
                        err.with_source(cleanup)
                    }
                });
            }
            Err(StorageError::NotFound) => {
                return Err(AuthError::invalid_grant(
                    "The authorization code session for the given authorization code was not found.",
                )
                .with_debug("Not found"));
            }
            Err(err) => return Err(AuthError::storage(err)),
        };

        if let Err(err) = self
            .context
            .strategy
            .validate_authorize_code(&original, &code)
        {
            return Err(AuthError::invalid_grant("The authorization code is not valid.")
                .with_debug(err.debug_report())
                .with_source(err));
        }

        if original.client.client_id != request.client.client_id {
            return Err(AuthError::invalid_grant(
                "The OAuth 2.0 Client ID from this request does not match the one from the authorize request.",
            ));
        }

        if let Some(stored) = original.form_value("redirect_uri") {
            if request.form_value("redirect_uri") != Some(stored) {
                return Err(AuthError::invalid_grant(
                    "The 'redirect_uri' from this request does not match the one from the authorize request.",
                ));
            }
        }

        request.id.clone_from(&original.id);
        request.session = original.session.clone();
        request.requested_at = original.requested_at;
        request.requested_scopes.clone_from(&original.requested_scopes);
        request.granted_scopes.clone_from(&original.granted_scopes);
        request
            .requested_audience
            .clone_from(&original.requested_audience);
        request.granted_audience.clone_from(&original.granted_audience);

        let refresh = self.context.can_issue_refresh_token(&request.request);
        self.context
            .set_token_expiry(&mut request.request, GrantType::AuthorizationCode, refresh);

        tracing::debug!(
            request_id = %request.id,
            client_id = %request.client.client_id,
            "Authorization code accepted"
        );
        Ok(())
    }

    async fn populate_token_endpoint_response(
        &self,
        request: &mut AccessRequest,
        response: &mut AccessResponse,
    ) -> AuthResult<()> {
        if !self.can_handle(request) {
            return Err(AuthError::request_unknown(
                "The handler is not responsible for this request.",
            ));
        }

        let (access_token, access_signature) =
            self.context.strategy.generate_access_token(&request.request)?;
        let refresh = if self.context.can_issue_refresh_token(&request.request) {
            Some(self.context.strategy.generate_refresh_token(&request.request)?)
        } else {
            None
        };
        let signature = self.presented_signature(request);

        let tx = self
            .context
            .storage
            .begin_tx()
            .await
            .map_err(AuthError::storage)?;
        if let Err(err) = self
            .redeem(
                tx.as_ref(),
                &request.request,
                &signature,
                &access_signature,
                refresh.as_ref().map(|(_, signature)| signature.as_str()),
            )
            .await
        {
            return Err(rollback(tx.as_ref(), err).await);
        }

        self.context.write_access_token(
            &request.request,
            GrantType::AuthorizationCode,
            access_token,
            response,
        );
        response.refresh_token = refresh.map(|(token, _)| token);

        tracing::debug!(
            request_id = %request.id,
            client_id = %request.client.client_id,
            "Authorization code exchanged"
        );
        Ok(())
    }
}
