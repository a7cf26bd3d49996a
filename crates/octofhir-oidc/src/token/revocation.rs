//! OAuth 2.0 token revocation (RFC 7009).
//!
//! Revoking either token of a grant revokes every access and refresh token
//! stored under its request ID. Unknown or already inactive tokens are not
//! an error, so clients cannot test which tokens are valid.

use async_trait::async_trait;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::handler::{HandlerContext, RevocationHandler};
use crate::request::{Request, TokenKind};
use crate::storage::{
    AccessTokenStorage, RefreshTokenStorage, StorageError, StorageResult, TokenRevocationStorage,
};
use crate::types::Client;

/// Revokes the grant behind an access or refresh token.
pub struct TokenRevocationHandler {
    context: HandlerContext,
}

impl TokenRevocationHandler {
    #[must_use]
    pub fn new(context: HandlerContext) -> Self {
        Self { context }
    }

    async fn lookup(&self, kind: TokenKind, token: &str) -> StorageResult<Request> {
        match kind {
            TokenKind::AccessToken => {
                let signature = self.context.strategy.access_token_signature(token);
                self.context.storage.get_access_token_session(&signature).await
            }
            _ => {
                let signature = self.context.strategy.refresh_token_signature(token);
                self.context.storage.get_refresh_token_session(&signature).await
            }
        }
    }
}

fn is_gone(result: &StorageResult<()>) -> bool {
    matches!(
        result,
        Ok(()) | Err(StorageError::NotFound | StorageError::Inactive { .. })
    )
}

/// Missing and inactive records mean there is nothing left to revoke.
fn revocation_result(first: StorageResult<()>, second: StorageResult<()>) -> AuthResult<()> {
    if is_gone(&first) && is_gone(&second) {
        return Ok(());
    }
    let debug = [first, second]
        .into_iter()
        .filter_map(Result::err)
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    Err(AuthError::temporarily_unavailable(
        "The token could not be revoked, please try again.",
    )
    .with_debug(debug))
}

#[async_trait]
impl RevocationHandler for TokenRevocationHandler {
    async fn revoke_token(
        &self,
        client: &Client,
        token: &str,
        hint: Option<TokenKind>,
    ) -> AuthResult<()> {
        let order = if hint == Some(TokenKind::AccessToken) {
            [TokenKind::AccessToken, TokenKind::RefreshToken]
        } else {
            [TokenKind::RefreshToken, TokenKind::AccessToken]
        };

        let original = match self.lookup(order[0], token).await {
            Ok(original) => original,
            Err(first) => match self.lookup(order[1], token).await {
                Ok(original) => original,
                Err(second) => {
                    tracing::debug!(
                        client_id = %client.client_id,
                        "Revocation requested for an unknown or inactive token"
                    );
                    return revocation_result(Err(first), Err(second));
                }
            },
        };

        if original.client.client_id != client.client_id {
            return Err(AuthError::unauthorized_client(
                "The OAuth 2.0 Client is not allowed to revoke this token.",
            )
            .with_debug("The token was issued to another client."));
        }

        let refresh = self.context.storage.revoke_refresh_token(&original.id).await;
        let access = self.context.storage.revoke_access_token(&original.id).await;
        revocation_result(refresh, access)?;

        tracing::debug!(
            request_id = %original.id,
            client_id = %client.client_id,
            "Token revoked"
        );
        Ok(())
    }
}
