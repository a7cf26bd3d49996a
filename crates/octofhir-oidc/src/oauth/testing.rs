//! Fixtures shared by the handler tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::OidcConfig;
use crate::oauth::handler::HandlerContext;
use crate::request::{AccessRequest, Request};
use crate::session::Session;
use crate::storage::{
    AccessTokenStorage, AuthorizeCodeStorage, MemoryStore, PkceRequestStorage,
    RefreshTokenStorage, StorageError, StorageResult, TokenRevocationStorage, TokenTransaction,
    Transactional,
};
use crate::token::OpaqueStrategy;
use crate::types::{Client, GrantType};

pub(crate) const SECRET: [u8; 32] = [42; 32];

pub(crate) fn client() -> Client {
    Client {
        name: "App".to_string(),
        confidential: true,
        grant_types: vec![
            GrantType::AuthorizationCode,
            GrantType::ClientCredentials,
            GrantType::RefreshToken,
        ],
        response_types: vec!["code".to_string()],
        redirect_uris: vec!["https://app.example.com/cb".to_string()],
        scopes: vec!["foo".to_string(), "bar".to_string(), "offline".to_string()],
        audience: vec!["https://api.example.com".to_string()],
        ..Client::new("app")
    }
}

pub(crate) fn context_with(configure: impl FnOnce(&mut OidcConfig)) -> (HandlerContext, MemoryStore) {
    let mut config = OidcConfig::default();
    configure(&mut config);
    let config = Arc::new(config);
    let strategy = OpaqueStrategy::new(SECRET.to_vec(), Arc::clone(&config)).unwrap();
    let store = MemoryStore::new();
    let context = HandlerContext::new(config, Arc::new(strategy), Arc::new(store.clone()));
    (context, store)
}

/// Handler context with the default configuration over `store`.
pub(crate) fn context_over(store: MemoryStore) -> HandlerContext {
    let config = Arc::new(OidcConfig::default());
    let strategy = OpaqueStrategy::new(SECRET.to_vec(), Arc::clone(&config)).unwrap();
    HandlerContext::new(config, Arc::new(strategy), Arc::new(store))
}

pub(crate) fn context() -> (HandlerContext, MemoryStore) {
    context_with(|_| {})
}

pub(crate) fn request(client: Client) -> Request {
    let mut session = Session::new("alice");
    session.client_id.clone_from(&client.client_id);
    Request::new(Arc::new(client), session)
}

pub(crate) fn access_request(client: Client, form: &[(&str, &str)]) -> AccessRequest {
    let form: HashMap<String, String> = form
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    let mut session = Session::new("");
    session.client_id.clone_from(&client.client_id);
    AccessRequest::new(Arc::new(client), form, session)
}

// =============================================================================
// Failing Storage
// =============================================================================

/// Operations a [`FailingStore`] breaks.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Faults {
    pub commit: bool,
    pub rollback: bool,
    /// Token session lookups outside a transaction.
    pub lookup: bool,
    /// `revoke_refresh_token` inside a transaction.
    pub revoke_refresh: bool,
    /// Token revocations outside a transaction.
    pub revoke: bool,
}

fn injected(operation: &str) -> StorageError {
    StorageError::backend(format!("injected {operation} failure"))
}

/// Store sharing the data of a [`MemoryStore`] whose operations fail
/// according to `faults`.
pub(crate) struct FailingStore {
    inner: MemoryStore,
    faults: Faults,
}

/// Handler context backed by a [`FailingStore`] over `store`.
pub(crate) fn failing_context(store: &MemoryStore, faults: Faults) -> HandlerContext {
    let config = Arc::new(OidcConfig::default());
    let strategy = OpaqueStrategy::new(SECRET.to_vec(), Arc::clone(&config)).unwrap();
    let storage = FailingStore {
        inner: store.clone(),
        faults,
    };
    HandlerContext::new(config, Arc::new(strategy), Arc::new(storage))
}

pub(crate) struct FailingTransaction {
    inner: Box<dyn TokenTransaction>,
    faults: Faults,
}

impl FailingTransaction {
    pub(crate) async fn begin(store: &MemoryStore, faults: Faults) -> Self {
        Self {
            inner: store.begin_tx().await.unwrap(),
            faults,
        }
    }
}

#[async_trait]
impl AccessTokenStorage for FailingStore {
    async fn create_access_token_session(&self, signature: &str, request: &Request) -> StorageResult<()> {
        self.inner.create_access_token_session(signature, request).await
    }

    async fn get_access_token_session(&self, signature: &str) -> StorageResult<Request> {
        if self.faults.lookup {
            return Err(injected("lookup"));
        }
        self.inner.get_access_token_session(signature).await
    }

    async fn delete_access_token_session(&self, signature: &str) -> StorageResult<()> {
        self.inner.delete_access_token_session(signature).await
    }
}

#[async_trait]
impl RefreshTokenStorage for FailingStore {
    async fn create_refresh_token_session(
        &self,
        signature: &str,
        access_signature: &str,
        request: &Request,
    ) -> StorageResult<()> {
        self.inner
            .create_refresh_token_session(signature, access_signature, request)
            .await
    }

    async fn get_refresh_token_session(&self, signature: &str) -> StorageResult<Request> {
        if self.faults.lookup {
            return Err(injected("lookup"));
        }
        self.inner.get_refresh_token_session(signature).await
    }

    async fn delete_refresh_token_session(&self, signature: &str) -> StorageResult<()> {
        self.inner.delete_refresh_token_session(signature).await
    }
}

#[async_trait]
impl TokenRevocationStorage for FailingStore {
    async fn revoke_access_token(&self, request_id: &str) -> StorageResult<()> {
        if self.faults.revoke {
            return Err(injected("revoke"));
        }
        self.inner.revoke_access_token(request_id).await
    }

    async fn revoke_refresh_token(&self, request_id: &str) -> StorageResult<()> {
        if self.faults.revoke {
            return Err(injected("revoke"));
        }
        self.inner.revoke_refresh_token(request_id).await
    }

    async fn revoke_refresh_token_maybe_grace_period(
        &self,
        request_id: &str,
        signature: &str,
    ) -> StorageResult<()> {
        self.inner
            .revoke_refresh_token_maybe_grace_period(request_id, signature)
            .await
    }
}

#[async_trait]
impl AuthorizeCodeStorage for FailingStore {
    async fn create_authorize_code_session(&self, signature: &str, request: &Request) -> StorageResult<()> {
        self.inner.create_authorize_code_session(signature, request).await
    }

    async fn get_authorize_code_session(&self, signature: &str) -> StorageResult<Request> {
        self.inner.get_authorize_code_session(signature).await
    }

    async fn invalidate_authorize_code_session(&self, signature: &str) -> StorageResult<()> {
        self.inner.invalidate_authorize_code_session(signature).await
    }
}

#[async_trait]
impl PkceRequestStorage for FailingStore {
    async fn create_pkce_request_session(&self, signature: &str, request: &Request) -> StorageResult<()> {
        self.inner.create_pkce_request_session(signature, request).await
    }

    async fn get_pkce_request_session(&self, signature: &str) -> StorageResult<Request> {
        self.inner.get_pkce_request_session(signature).await
    }

    async fn delete_pkce_request_session(&self, signature: &str) -> StorageResult<()> {
        self.inner.delete_pkce_request_session(signature).await
    }
}

#[async_trait]
impl Transactional for FailingStore {
    async fn begin_tx(&self) -> StorageResult<Box<dyn TokenTransaction>> {
        Ok(Box::new(FailingTransaction::begin(&self.inner, self.faults).await))
    }
}

#[async_trait]
impl AccessTokenStorage for FailingTransaction {
    async fn create_access_token_session(&self, signature: &str, request: &Request) -> StorageResult<()> {
        self.inner.create_access_token_session(signature, request).await
    }

    async fn get_access_token_session(&self, signature: &str) -> StorageResult<Request> {
        self.inner.get_access_token_session(signature).await
    }

    async fn delete_access_token_session(&self, signature: &str) -> StorageResult<()> {
        self.inner.delete_access_token_session(signature).await
    }
}

#[async_trait]
impl RefreshTokenStorage for FailingTransaction {
    async fn create_refresh_token_session(
        &self,
        signature: &str,
        access_signature: &str,
        request: &Request,
    ) -> StorageResult<()> {
        self.inner
            .create_refresh_token_session(signature, access_signature, request)
            .await
    }

    async fn get_refresh_token_session(&self, signature: &str) -> StorageResult<Request> {
        self.inner.get_refresh_token_session(signature).await
    }

    async fn delete_refresh_token_session(&self, signature: &str) -> StorageResult<()> {
        self.inner.delete_refresh_token_session(signature).await
    }
}

#[async_trait]
impl TokenRevocationStorage for FailingTransaction {
    async fn revoke_access_token(&self, request_id: &str) -> StorageResult<()> {
        self.inner.revoke_access_token(request_id).await
    }

    async fn revoke_refresh_token(&self, request_id: &str) -> StorageResult<()> {
        if self.faults.revoke_refresh {
            return Err(injected("revoke"));
        }
        self.inner.revoke_refresh_token(request_id).await
    }

    async fn revoke_refresh_token_maybe_grace_period(
        &self,
        request_id: &str,
        signature: &str,
    ) -> StorageResult<()> {
        self.inner
            .revoke_refresh_token_maybe_grace_period(request_id, signature)
            .await
    }
}

#[async_trait]
impl AuthorizeCodeStorage for FailingTransaction {
    async fn create_authorize_code_session(&self, signature: &str, request: &Request) -> StorageResult<()> {
        self.inner.create_authorize_code_session(signature, request).await
    }

    async fn get_authorize_code_session(&self, signature: &str) -> StorageResult<Request> {
        self.inner.get_authorize_code_session(signature).await
    }

    async fn invalidate_authorize_code_session(&self, signature: &str) -> StorageResult<()> {
        self.inner.invalidate_authorize_code_session(signature).await
    }
}

#[async_trait]
impl TokenTransaction for FailingTransaction {
    async fn commit(&self) -> StorageResult<()> {
        if self.faults.commit {
            return Err(injected("commit"));
        }
        self.inner.commit().await
    }

    async fn rollback(&self) -> StorageResult<()> {
        if self.faults.rollback {
            return Err(injected("rollback"));
        }
        self.inner.rollback().await
    }
}
