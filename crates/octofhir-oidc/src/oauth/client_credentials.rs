//! Client credentials grant (RFC 6749 Section 4.4).
//!
//! Only confidential clients may use this grant. The scopes and audience it
//! requests are granted directly; no refresh token is issued.

use async_trait::async_trait;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::handler::{HandlerContext, TokenEndpointHandler};
use crate::request::{AccessRequest, AccessResponse};
use crate::storage::AccessTokenStorage;
use crate::types::GrantType;

/// Token endpoint handler for `grant_type=client_credentials`.
pub struct ClientCredentialsGrantHandler {
    context: HandlerContext,
}

impl ClientCredentialsGrantHandler {
    #[must_use]
    pub fn new(context: HandlerContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl TokenEndpointHandler for ClientCredentialsGrantHandler {
    fn can_handle(&self, request: &AccessRequest) -> bool {
        request.is_exactly_grant_type(GrantType::ClientCredentials.as_str())
    }

    async fn handle_token_endpoint_request(&self, request: &mut AccessRequest) -> AuthResult<()> {
        if !self.can_handle(request) {
            return Err(AuthError::request_unknown(
                "The handler is not responsible for this request.",
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

        if request.client.is_public() {
            return Err(AuthError::invalid_grant(
                "The OAuth 2.0 Client is marked as public and is thus not allowed to use authorization grant 'client_credentials'.",
            ));
        }

        let scopes = request.requested_scopes.clone();
        for scope in &scopes {
            request.grant_scope(scope);
        }
        let audience = request.requested_audience.clone();
        for aud in &audience {
            request.grant_audience(aud);
        }

        self.context
            .set_token_expiry(&mut request.request, GrantType::ClientCredentials, false);
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

        if !request.client.is_grant_type_allowed(GrantType::ClientCredentials) {
            return Err(AuthError::unauthorized_client(
                "The OAuth 2.0 Client is not allowed to use authorization grant 'client_credentials'.",
            ));
        }

        let (token, signature) = self.context.strategy.generate_access_token(&request.request)?;
        self.context
            .storage
            .create_access_token_session(&signature, &request.sanitize(&[]))
            .await
            .map_err(AuthError::storage)?;

        self.context
            .write_access_token(&request.request, GrantType::ClientCredentials, token, response);

        tracing::debug!(
            request_id = %request.id,
            client_id = %request.client.client_id,
            "Client credentials access token issued"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::oauth::testing;
    use crate::request::TokenKind;
    use crate::types::Client;

    async fn run(client: Client, form: &[(&str, &str)]) -> AuthResult<(AccessRequest, AccessResponse)> {
        let (context, _) = testing::context();
        let handler = ClientCredentialsGrantHandler::new(context);
        let mut request = testing::access_request(client, form);
        handler.handle_token_endpoint_request(&mut request).await?;
        let mut response = AccessResponse::default();
        handler
            .populate_token_endpoint_response(&mut request, &mut response)
            .await?;
        Ok((request, response))
    }

    #[tokio::test]
    async fn test_issues_access_token_only() {
        let (request, response) = run(
            testing::client(),
            &[
                ("grant_type", "client_credentials"),
                ("scope", "foo offline"),
                ("audience", "https://api.example.com"),
            ],
        )
        .await
        .unwrap();

        assert!(response.access_token.starts_with("octo_at_"));
        assert!(response.refresh_token.is_none());
        assert_eq!(response.scopes(), vec!["foo", "offline"]);
        assert_eq!(request.granted_audience, vec!["https://api.example.com".to_string()]);
        assert!(request.session.expires_at(TokenKind::RefreshToken).is_none());
        assert!(response.expires_in.unwrap() > 3500);
    }

    #[tokio::test]
    async fn test_scope_not_allowed() {
        let err = run(
            testing::client(),
            &[("grant_type", "client_credentials"), ("scope", "foo admin")],
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidScope);
        assert_eq!(
            err.hint(),
            "The OAuth 2.0 Client is not allowed to request scope 'admin'."
        );
    }

    #[tokio::test]
    async fn test_audience_not_allowed() {
        let err = run(
            testing::client(),
            &[
                ("grant_type", "client_credentials"),
                ("audience", "https://other.example.com"),
            ],
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_public_client_rejected() {
        let client = Client {
            confidential: false,
            ..testing::client()
        };
        let err = run(client, &[("grant_type", "client_credentials")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGrant);
    }

    #[tokio::test]
    async fn test_grant_type_must_be_allowed() {
        let client = Client {
            grant_types: vec![GrantType::AuthorizationCode],
            ..testing::client()
        };
        let err = run(client, &[("grant_type", "client_credentials")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnauthorizedClient);
    }

    #[tokio::test]
    async fn test_client_lifespan_override() {
        let mut client = testing::client();
        client.lifespans.client_credentials_grant.access_token =
            Some(std::time::Duration::from_secs(60));
        let (_, response) = run(client, &[("grant_type", "client_credentials")])
            .await
            .unwrap();
        assert!(response.expires_in.unwrap() <= 60);
    }
}
