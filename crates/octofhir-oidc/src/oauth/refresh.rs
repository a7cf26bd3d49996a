//! Refresh token grant (RFC 6749 Section 6) with rotation and reuse
//! detection.
//!
//! Every successful refresh rotates the pair: the presented refresh token
//! and its access token are revoked and a new pair is stored under the
//! original request ID, all in one transaction. Presenting a rotated refresh
//! token again revokes the whole lineage.

use async_trait::async_trait;

use crate::AuthResult;
use crate::error::{AuthError, ErrorKind};
use crate::oauth::handler::{HandlerContext, TokenEndpointHandler, rollback};
use crate::request::{AccessRequest, AccessResponse, Request};
use crate::storage::{
    AccessTokenStorage, RefreshTokenStorage, StorageError, TokenRevocationStorage,
    TokenTransaction, Transactional,
};
use crate::types::GrantType;

const CONCURRENT_REFRESH_HINT: &str = "Failed to refresh token because of multiple concurrent requests using the same token which is not allowed.";

/// Token endpoint handler for `grant_type=refresh_token`.
pub struct RefreshTokenGrantHandler {
    context: HandlerContext,
}

impl RefreshTokenGrantHandler {
    #[must_use]
    pub fn new(context: HandlerContext) -> Self {
        Self { context }
    }

    fn presented_signature(&self, request: &AccessRequest) -> String {
        self.context
            .strategy
            .refresh_token_signature(request.form_value("refresh_token").unwrap_or_default())
    }

    /// Deletes the reused token and revokes everything issued under its
    /// request ID. Missing records are tolerated.
    async fn revoke_lineage(&self, signature: &str, original: &Request) -> AuthResult<()> {
        let tx = self
            .context
            .storage
            .begin_tx()
            .await
            .map_err(AuthError::storage)?;

        let result = async {
            tx.delete_refresh_token_session(signature)
                .await
                .map_err(AuthError::storage)?;
            tolerate_not_found(tx.revoke_refresh_token(&original.id).await)?;
            tolerate_not_found(tx.revoke_access_token(&original.id).await)?;
            tx.commit().await.map_err(AuthError::storage)
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(err) => Err(rollback(tx.as_ref(), err).await),
        }
    }

    async fn rotate(
        &self,
        tx: &dyn TokenTransaction,
        request: &Request,
        signature: &str,
        access_signature: &str,
        refresh_signature: &str,
    ) -> AuthResult<()> {
        let original = tx
            .get_refresh_token_session(signature)
            .await
            .map_err(rotation_error)?;

        tx.revoke_access_token(&original.id)
            .await
            .map_err(rotation_error)?;
        tx.revoke_refresh_token_maybe_grace_period(&original.id, signature)
            .await
            .map_err(rotation_error)?;

        let mut access_request = request.sanitize(&[]);
        access_request.id.clone_from(&original.id);
        tx.create_access_token_session(access_signature, &access_request)
            .await
            .map_err(rotation_error)?;

        // The refresh session keeps the original grant so a later refresh
        // may ask for it again.
        let mut refresh_request = access_request;
        refresh_request
            .requested_scopes
            .clone_from(&original.requested_scopes);
        refresh_request
            .granted_scopes
            .clone_from(&original.granted_scopes);
        refresh_request
            .granted_audience
            .clone_from(&original.granted_audience);
        tx.create_refresh_token_session(refresh_signature, access_signature, &refresh_request)
            .await
            .map_err(rotation_error)?;

        tx.commit().await.map_err(rotation_error)
    }
}

fn tolerate_not_found(result: Result<(), StorageError>) -> AuthResult<()> {
    match result {
        Ok(()) | Err(StorageError::NotFound) => Ok(()),
        Err(err) => Err(AuthError::storage(err)),
    }
}

/// Lost races during rotation are retryable; anything else is a server error.
fn rotation_error(err: StorageError) -> AuthError {
    if err.is_concurrency_conflict() {
        AuthError::invalid_request(CONCURRENT_REFRESH_HINT).with_debug(err.to_string())
    } else {
        AuthError::storage(err)
    }
}

#[async_trait]
impl TokenEndpointHandler for RefreshTokenGrantHandler {
    fn can_handle(&self, request: &AccessRequest) -> bool {
        request.is_exactly_grant_type(GrantType::RefreshToken.as_str())
    }

    async fn handle_token_endpoint_request(&self, request: &mut AccessRequest) -> AuthResult<()> {
        if !self.can_handle(request) {
            return Err(AuthError::request_unknown(
                "The handler is not responsible for this request.",
            ));
        }

        if !request.client.is_grant_type_allowed(GrantType::RefreshToken) {
            return Err(AuthError::unauthorized_client(
                "The OAuth 2.0 Client is not allowed to use authorization grant 'refresh_token'.",
            ));
        }

        let token = request.form_value("refresh_token").unwrap_or_default().to_string();
        let signature = self.presented_signature(request);

        let original = match self.context.storage.get_refresh_token_session(&signature).await {
            Ok(original) => original,
            Err(StorageError::Inactive { request: original }) => {
                tracing::warn!(
                    request_id = %original.id,
                    client_id = %original.client.client_id,
                    "Refresh token reuse detected, revoking the token lineage"
                );
                let err = AuthError::inactive_token(
                    "The refresh token has been used before or was revoked.",
                )
                .with_debug("Token is inactive because it has been revoked or rotated");

                return Err(match self.revoke_lineage(&signature, &original).await {
                    Ok(()) => err,
                    Err(cleanup) => {
                        tracing::warn!(
                            request_id = %original.id,
                            error = %cleanup.debug_report(),
                            "Failed to revoke the token lineage after refresh token reuse"
                        );
                        err.with_source(cleanup)
                    }
                });
            }
            Err(StorageError::NotFound) => {
                return Err(AuthError::invalid_grant("The refresh token was not found.")
                    .with_debug("The refresh token has not been found: Not found"));
            }
            Err(err) => return Err(AuthError::storage(err)),
        };

        if let Err(err) = self
            .context
            .strategy
            .validate_refresh_token(&original, &token)
        {
            let hint = if err.is(ErrorKind::TokenExpired) {
                AuthError::invalid_grant("The refresh token expired.")
            } else {
                AuthError::invalid_request("The refresh token is malformed or not valid.")
            };
            return Err(hint.with_debug(err.debug_report()).with_source(err));
        }

        let eligible = &self.context.config.refresh_token_scopes;
        if !self.context.config.is_refresh_eligible(&original.granted_scopes) {
            return Err(AuthError::scope_not_granted(format!(
                "The OAuth 2.0 Client was not granted scope {} and may thus not perform the 'refresh_token' authorization grant.",
                eligible.join(" or ")
            )));
        }

        if original.client.client_id != request.client.client_id {
            return Err(AuthError::invalid_grant(
                "The OAuth 2.0 Client ID from this request does not match the ID during the initial token issuance.",
            ));
        }

        request.id.clone_from(&original.id);
        request.session = original.session.clone();

        if request.requested_scopes.is_empty() {
            request.set_requested_scopes(&original.granted_scopes);
        }
        request.set_requested_audience(&original.requested_audience);

        let strategy = self.context.config.scope_strategy;
        let requested = request.requested_scopes.clone();
        for scope in &requested {
            if !original.granted_scopes.contains(scope) {
                if request.client.refresh_flow_ignore_original_granted_scopes {
                    tracing::debug!(
                        request_id = %request.id,
                        scope = %scope,
                        "Dropping scope outside the original grant"
                    );
                    continue;
                }
                return Err(AuthError::invalid_scope(format!(
                    "The requested scope '{scope}' was not originally granted by the resource owner."
                )));
            }
            if !request.client.is_scope_allowed(strategy, scope) {
                return Err(AuthError::invalid_scope(format!(
                    "The OAuth 2.0 Client is not allowed to request scope '{scope}'."
                )));
            }
            request.grant_scope(scope);
        }

        request
            .client
            .validate_audience(self.context.config.audience_strategy, &original.granted_audience)?;
        for audience in &original.granted_audience {
            request.grant_audience(audience);
        }

        self.context
            .set_token_expiry(&mut request.request, GrantType::RefreshToken, true);

        tracing::debug!(
            request_id = %request.id,
            client_id = %request.client.client_id,
            "Refresh token request accepted"
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
        let (refresh_token, refresh_signature) =
            self.context.strategy.generate_refresh_token(&request.request)?;
        let signature = self.presented_signature(request);

        let tx = self
            .context
            .storage
            .begin_tx()
            .await
            .map_err(AuthError::storage)?;
        if let Err(err) = self
            .rotate(
                tx.as_ref(),
                &request.request,
                &signature,
                &access_signature,
                &refresh_signature,
            )
            .await
        {
            return Err(rollback(tx.as_ref(), err).await);
        }

        self.context
            .write_access_token(&request.request, GrantType::RefreshToken, access_token, response);
        response.refresh_token = Some(refresh_token);

        tracing::debug!(
            request_id = %request.id,
            client_id = %request.client.client_id,
            "Refresh token rotated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::OffsetDateTime;

    use super::*;
    use crate::oauth::testing::{self, Faults};
    use crate::request::TokenKind;
    use crate::storage::MemoryStore;
    use crate::types::Client;

    /// Stores a grant of `scopes` and returns its refresh token.
    async fn seed(context: &HandlerContext, client: Client, scopes: &[&str]) -> (String, Request) {
        let mut original = testing::request(client);
        for scope in scopes {
            original.grant_scope(scope);
        }
        original.set_requested_scopes(scopes);
        original.grant_audience("https://api.example.com");
        original.set_requested_audience(&["https://api.example.com"]);
        context.set_token_expiry(&mut original, GrantType::AuthorizationCode, true);

        let (_, access_sig) = context.strategy.generate_access_token(&original).unwrap();
        let (refresh, refresh_sig) = context.strategy.generate_refresh_token(&original).unwrap();
        context
            .storage
            .create_access_token_session(&access_sig, &original)
            .await
            .unwrap();
        context
            .storage
            .create_refresh_token_session(&refresh_sig, &access_sig, &original)
            .await
            .unwrap();
        (refresh, original)
    }

    async fn refresh(
        handler: &RefreshTokenGrantHandler,
        client: Client,
        token: &str,
        scope: Option<&str>,
    ) -> AuthResult<(AccessRequest, AccessResponse)> {
        let mut form = vec![("grant_type", "refresh_token"), ("refresh_token", token)];
        if let Some(scope) = scope {
            form.push(("scope", scope));
        }
        let mut request = testing::access_request(client, &form);
        handler.handle_token_endpoint_request(&mut request).await?;
        let mut response = AccessResponse::default();
        handler
            .populate_token_endpoint_response(&mut request, &mut response)
            .await?;
        Ok((request, response))
    }

    fn handler() -> (RefreshTokenGrantHandler, HandlerContext, MemoryStore) {
        let (context, store) = testing::context();
        (RefreshTokenGrantHandler::new(context.clone()), context, store)
    }

    #[tokio::test]
    async fn test_omitted_scope_defaults_to_original_grant() {
        let (handler, context, store) = handler();
        let (token, original) = seed(&context, testing::client(), &["foo", "offline"]).await;

        let (request, response) = refresh(&handler, testing::client(), &token, None)
            .await
            .unwrap();

        assert_eq!(request.granted_scopes, vec!["foo", "offline"]);
        assert_eq!(response.scopes(), vec!["foo", "offline"]);
        assert_eq!(response.token_type, "bearer");
        assert_eq!(request.id, original.id);
        assert_eq!(request.granted_audience, vec!["https://api.example.com"]);

        let new_refresh = response.refresh_token.unwrap();
        let new_sig = context.strategy.refresh_token_signature(&new_refresh);
        let stored = store.get_refresh_token_session(&new_sig).await.unwrap();
        assert!(context.strategy.validate_refresh_token(&stored, &new_refresh).is_ok());

        let access_sig = context.strategy.access_token_signature(&response.access_token);
        let stored = store.get_access_token_session(&access_sig).await.unwrap();
        assert_eq!(stored.id, original.id);
        assert!(context
            .strategy
            .validate_access_token(&stored, &response.access_token)
            .is_ok());

        let old_sig = context.strategy.refresh_token_signature(&token);
        assert!(store.get_refresh_token_session(&old_sig).await.unwrap_err().is_inactive());
        assert_eq!(store.access_token_count().await, 1);
    }

    #[tokio::test]
    async fn test_reuse_revokes_lineage() {
        let (handler, context, store) = handler();
        let (token, _) = seed(&context, testing::client(), &["foo", "offline"]).await;

        refresh(&handler, testing::client(), &token, None).await.unwrap();
        assert_eq!(store.active_refresh_token_count().await, 1);

        let err = refresh(&handler, testing::client(), &token, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InactiveToken);
        assert_eq!(store.active_refresh_token_count().await, 0);
        assert_eq!(store.access_token_count().await, 0);
    }

    #[tokio::test]
    async fn test_narrowing_is_honored() {
        let (handler, context, store) = handler();
        let (token, _) = seed(&context, testing::client(), &["foo", "bar", "offline"]).await;

        let (request, response) = refresh(&handler, testing::client(), &token, Some("foo offline"))
            .await
            .unwrap();
        assert_eq!(request.granted_scopes, vec!["foo", "offline"]);

        // The stored refresh session keeps the wider original grant.
        let sig = context
            .strategy
            .refresh_token_signature(response.refresh_token.as_deref().unwrap());
        let stored = store.get_refresh_token_session(&sig).await.unwrap();
        assert_eq!(stored.granted_scopes, vec!["foo", "bar", "offline"]);
    }

    #[tokio::test]
    async fn test_broadening_is_rejected() {
        let (handler, context, _) = handler();
        let (token, _) = seed(&context, testing::client(), &["foo", "offline"]).await;

        let err = refresh(&handler, testing::client(), &token, Some("foo bar offline"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidScope);
        assert!(err.hint().contains("'bar'"));
    }

    #[tokio::test]
    async fn test_broadening_is_dropped_when_client_opts_in() {
        let (handler, context, _) = handler();
        let mut client = testing::client();
        client.refresh_flow_ignore_original_granted_scopes = true;
        let (token, _) = seed(&context, client.clone(), &["foo", "offline"]).await;

        let (request, _) = refresh(&handler, client, &token, Some("foo bar offline"))
            .await
            .unwrap();
        assert_eq!(request.granted_scopes, vec!["foo", "offline"]);
    }

    #[tokio::test]
    async fn test_requires_refresh_eligible_scope() {
        let (handler, context, _) = handler();
        let (token, _) = seed(&context, testing::client(), &["foo"]).await;

        let err = refresh(&handler, testing::client(), &token, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScopeNotGranted);
        assert!(err.hint().contains("offline_access or offline"));
    }

    #[tokio::test]
    async fn test_empty_eligible_scope_list_allows_any_grant() {
        let (context, _) = testing::context_with(|config| config.refresh_token_scopes.clear());
        let handler = RefreshTokenGrantHandler::new(context.clone());
        let (token, _) = seed(&context, testing::client(), &["foo"]).await;

        assert!(refresh(&handler, testing::client(), &token, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_client_must_match() {
        let (handler, context, _) = handler();
        let (token, _) = seed(&context, testing::client(), &["foo", "offline"]).await;

        let other = Client {
            client_id: "other".to_string(),
            ..testing::client()
        };
        let err = refresh(&handler, other, &token, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGrant);
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let (handler, _, _) = handler();
        let err = refresh(&handler, testing::client(), "octo_rt_abc.def", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGrant);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let (handler, context, store) = handler();
        let mut original = testing::request(testing::client());
        original.grant_scope("offline");
        original.session.set_expires_at(
            TokenKind::RefreshToken,
            OffsetDateTime::now_utc() - time::Duration::minutes(1),
        );
        let (token, sig) = context.strategy.generate_refresh_token(&original).unwrap();
        store
            .create_refresh_token_session(&sig, "", &original)
            .await
            .unwrap();

        let err = refresh(&handler, testing::client(), &token, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGrant);
        assert!(err.hint().contains("expired"));
    }

    #[tokio::test]
    async fn test_grant_type_must_be_allowed() {
        let (handler, context, _) = handler();
        let (token, _) = seed(&context, testing::client(), &["foo", "offline"]).await;
        let client = Client {
            grant_types: vec![GrantType::AuthorizationCode],
            ..testing::client()
        };

        let err = refresh(&handler, client, &token, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnauthorizedClient);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_retryable() {
        let (handler, context, _) = handler();
        let (token, _) = seed(&context, testing::client(), &["foo", "offline"]).await;
        let form = [("grant_type", "refresh_token"), ("refresh_token", token.as_str())];

        let mut first = testing::access_request(testing::client(), &form);
        let mut second = testing::access_request(testing::client(), &form);
        handler.handle_token_endpoint_request(&mut first).await.unwrap();
        handler.handle_token_endpoint_request(&mut second).await.unwrap();

        handler
            .populate_token_endpoint_response(&mut first, &mut AccessResponse::default())
            .await
            .unwrap();
        let err = handler
            .populate_token_endpoint_response(&mut second, &mut AccessResponse::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(err.hint(), CONCURRENT_REFRESH_HINT);
    }

    #[tokio::test]
    async fn test_zero_refresh_lifespan_never_expires() {
        let (context, store) = testing::context_with(|config| {
            config.lifespans.refresh_token = Duration::ZERO;
        });
        let handler = RefreshTokenGrantHandler::new(context.clone());
        let (token, _) = seed(&context, testing::client(), &["foo", "offline"]).await;

        let (request, response) = refresh(&handler, testing::client(), &token, None)
            .await
            .unwrap();
        assert!(request.session.expires_at(TokenKind::RefreshToken).is_none());

        let sig = context
            .strategy
            .refresh_token_signature(response.refresh_token.as_deref().unwrap());
        assert!(store.get_refresh_token_session(&sig).await.is_ok());
    }

    #[tokio::test]
    async fn test_reuse_error_survives_failed_lineage_revocation() {
        let (handler, context, store) = handler();
        let (token, _) = seed(&context, testing::client(), &["foo", "offline"]).await;
        refresh(&handler, testing::client(), &token, None).await.unwrap();

        let faults = Faults {
            revoke_refresh: true,
            ..Faults::default()
        };
        let failing = RefreshTokenGrantHandler::new(testing::failing_context(&store, faults));
        let err = refresh(&failing, testing::client(), &token, None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InactiveToken);
        let cleanup = std::error::Error::source(&err)
            .and_then(|e| e.downcast_ref::<AuthError>())
            .unwrap();
        assert_eq!(cleanup.kind(), ErrorKind::ServerError);
        assert!(cleanup.debug_report().contains("injected revoke failure"));

        // The cleanup transaction was rolled back as a whole.
        assert_eq!(store.active_refresh_token_count().await, 1);
        assert_eq!(store.access_token_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_commit_and_rollback_leave_old_pair() {
        let (_, context, store) = handler();
        let (token, _) = seed(&context, testing::client(), &["foo", "offline"]).await;

        let faults = Faults {
            commit: true,
            rollback: true,
            ..Faults::default()
        };
        let failing = RefreshTokenGrantHandler::new(testing::failing_context(&store, faults));
        let err = refresh(&failing, testing::client(), &token, None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ServerError);
        let debug = err.debug().unwrap();
        assert!(debug.contains("injected commit failure"));
        assert!(debug.contains("rollback error: Storage backend error: injected rollback failure"));

        let sig = context.strategy.refresh_token_signature(&token);
        assert!(store.get_refresh_token_session(&sig).await.is_ok());
        assert_eq!(store.access_token_count().await, 1);
    }

    #[tokio::test]
    async fn test_rotated_token_usable_within_grace_period() {
        let store = MemoryStore::new().with_refresh_grace_period(Duration::from_secs(60));
        let context = testing::context_over(store.clone());
        let handler = RefreshTokenGrantHandler::new(context.clone());
        let (token, original) = seed(&context, testing::client(), &["foo", "offline"]).await;

        let (_, first) = refresh(&handler, testing::client(), &token, None)
            .await
            .unwrap();
        let (request, second) = refresh(&handler, testing::client(), &token, None)
            .await
            .unwrap();
        assert_eq!(request.id, original.id);
        assert_ne!(first.refresh_token, second.refresh_token);

        // A retry inside the window is not reuse, so nothing was revoked.
        for refresh_token in [first.refresh_token, second.refresh_token] {
            let sig = context
                .strategy
                .refresh_token_signature(refresh_token.as_deref().unwrap());
            assert!(store.get_refresh_token_session(&sig).await.is_ok());
        }
        assert_eq!(store.access_token_count().await, 1);
    }

    #[tokio::test]
    async fn test_rotated_token_is_reuse_after_grace_period() {
        let store = MemoryStore::new().with_refresh_grace_period(Duration::from_millis(50));
        let context = testing::context_over(store.clone());
        let handler = RefreshTokenGrantHandler::new(context.clone());
        let (token, _) = seed(&context, testing::client(), &["foo", "offline"]).await;

        refresh(&handler, testing::client(), &token, None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let err = refresh(&handler, testing::client(), &token, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InactiveToken);
        assert_eq!(store.active_refresh_token_count().await, 0);
        assert_eq!(store.access_token_count().await, 0);
    }
}
