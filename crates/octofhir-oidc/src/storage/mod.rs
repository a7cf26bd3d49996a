//! Storage contracts consumed by the grant handlers.
//!
//! This module defines storage interfaces for:
//!
//! - Access token sessions
//! - Refresh token sessions, with active flags for reuse detection
//! - Authorization code sessions
//! - PKCE challenge records
//! - Token revocation by request ID
//! - Transactions spanning several of the above
//!
//! Every session is the [`Request`] it was issued for, keyed by the token
//! signature. Request IDs tie the tokens of one lineage together.
//!
//! # Implementations
//!
//! - [`memory::MemoryStore`] - in-process storage with optimistic transactions

pub mod memory;

use async_trait::async_trait;

use crate::request::Request;

pub use memory::MemoryStore;

// =============================================================================
// Error Types
// =============================================================================

/// Errors returned by storage implementations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No session is stored under the signature.
    #[error("Not found")]
    NotFound,

    /// The session exists but was revoked or rotated.
    ///
    /// Carries the stored request so the caller can revoke its lineage.
    #[error("Token is inactive because it has been revoked or rotated")]
    Inactive { request: Box<Request> },

    /// A concurrent transaction modified data this transaction read.
    #[error("Unable to serialize access due to a concurrent update")]
    SerializationFailure,

    /// The authorization code was already exchanged.
    #[error("Authorization code has been invalidated")]
    InvalidatedAuthorizeCode { request: Box<Request> },

    /// Backend failure.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Create a `Backend` error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Returns `true` for `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Returns `true` for `Inactive`.
    #[must_use]
    pub fn is_inactive(&self) -> bool {
        matches!(self, Self::Inactive { .. })
    }

    /// Returns `true` if the error indicates a lost race with a concurrent
    /// request rather than corrupted state.
    #[must_use]
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(
            self,
            Self::SerializationFailure | Self::NotFound | Self::Inactive { .. }
        )
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Token Storage Traits
// =============================================================================

/// Storage for access token sessions.
#[async_trait]
pub trait AccessTokenStorage: Send + Sync {
    async fn create_access_token_session(
        &self,
        signature: &str,
        request: &Request,
    ) -> StorageResult<()>;

    /// # Errors
    ///
    /// Returns `NotFound` if no session is stored under `signature`.
    async fn get_access_token_session(&self, signature: &str) -> StorageResult<Request>;

    async fn delete_access_token_session(&self, signature: &str) -> StorageResult<()>;
}

/// Storage for refresh token sessions.
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Stores a refresh token session together with the signature of the
    /// access token issued alongside it.
    async fn create_refresh_token_session(
        &self,
        signature: &str,
        access_signature: &str,
        request: &Request,
    ) -> StorageResult<()>;

    /// # Errors
    ///
    /// Returns `NotFound` for unknown signatures and `Inactive` for revoked
    /// or rotated tokens.
    async fn get_refresh_token_session(&self, signature: &str) -> StorageResult<Request>;

    async fn delete_refresh_token_session(&self, signature: &str) -> StorageResult<()>;
}

/// Revocation of whole token lineages.
#[async_trait]
pub trait TokenRevocationStorage: Send + Sync {
    /// Deletes every access token session of `request_id`.
    async fn revoke_access_token(&self, request_id: &str) -> StorageResult<()>;

    /// Marks every refresh token session of `request_id` inactive.
    async fn revoke_refresh_token(&self, request_id: &str) -> StorageResult<()>;

    /// Revokes the refresh token rotated away from. Implementations with a
    /// grace period keep `signature` usable for a short window instead.
    async fn revoke_refresh_token_maybe_grace_period(
        &self,
        request_id: &str,
        signature: &str,
    ) -> StorageResult<()>;
}

/// Storage for authorization code sessions.
#[async_trait]
pub trait AuthorizeCodeStorage: Send + Sync {
    async fn create_authorize_code_session(
        &self,
        signature: &str,
        request: &Request,
    ) -> StorageResult<()>;

    /// # Errors
    ///
    /// Returns `InvalidatedAuthorizeCode` if the code was already exchanged.
    async fn get_authorize_code_session(&self, signature: &str) -> StorageResult<Request>;

    /// Marks the code as used. Later lookups fail with
    /// `InvalidatedAuthorizeCode`.
    async fn invalidate_authorize_code_session(&self, signature: &str) -> StorageResult<()>;
}

/// Storage for PKCE challenge records, keyed by authorization code signature.
#[async_trait]
pub trait PkceRequestStorage: Send + Sync {
    async fn create_pkce_request_session(
        &self,
        signature: &str,
        request: &Request,
    ) -> StorageResult<()>;

    async fn get_pkce_request_session(&self, signature: &str) -> StorageResult<Request>;

    async fn delete_pkce_request_session(&self, signature: &str) -> StorageResult<()>;
}

// =============================================================================
// Transactions
// =============================================================================

/// A unit of work over the token storage.
///
/// Mutations made through the transaction become visible only on
/// [`commit`](Self::commit). Reads observe committed state.
#[async_trait]
pub trait TokenTransaction:
    AccessTokenStorage + RefreshTokenStorage + TokenRevocationStorage + AuthorizeCodeStorage
{
    /// # Errors
    ///
    /// Returns `SerializationFailure` if data read by this transaction was
    /// changed concurrently. Nothing is applied in that case.
    async fn commit(&self) -> StorageResult<()>;

    async fn rollback(&self) -> StorageResult<()>;
}

/// Storage that can open transactions.
#[async_trait]
pub trait Transactional: Send + Sync {
    async fn begin_tx(&self) -> StorageResult<Box<dyn TokenTransaction>>;
}

/// Everything the grant handlers need from storage.
pub trait TokenStore:
    AccessTokenStorage
    + RefreshTokenStorage
    + TokenRevocationStorage
    + AuthorizeCodeStorage
    + PkceRequestStorage
    + Transactional
{
}

impl<T> TokenStore for T where
    T: AccessTokenStorage
        + RefreshTokenStorage
        + TokenRevocationStorage
        + AuthorizeCodeStorage
        + PkceRequestStorage
        + Transactional
{
}
