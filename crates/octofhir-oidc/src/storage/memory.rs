//! In-memory token storage.
//!
//! Every row carries a version. Transactions record the version of each
//! row they read and stage their writes; commit re-checks the read set
//! under the write lock and applies the staged writes atomically, failing
//! with [`StorageError::SerializationFailure`] if a concurrent commit
//! touched anything that was read.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::request::Request;
use crate::storage::{
    AccessTokenStorage, AuthorizeCodeStorage, PkceRequestStorage, RefreshTokenStorage,
    StorageError, StorageResult, TokenRevocationStorage, TokenTransaction, Transactional,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Table {
    Access,
    Refresh,
    AuthorizeCode,
    Pkce,
}

#[derive(Debug, Clone)]
struct Row {
    request: Request,
    active: bool,
    version: u64,
    /// Set on rotation when a grace period is configured.
    usable_until: Option<OffsetDateTime>,
}

impl Row {
    fn is_usable(&self, now: OffsetDateTime) -> bool {
        self.active && self.usable_until.is_none_or(|until| now <= until)
    }
}

#[derive(Debug)]
enum Operation {
    Create {
        table: Table,
        signature: String,
        request: Box<Request>,
    },
    Delete {
        table: Table,
        signature: String,
    },
    Deactivate {
        table: Table,
        signature: String,
    },
    RevokeAccess {
        request_id: String,
    },
    RevokeRefresh {
        request_id: String,
    },
    RevokeRefreshGracePeriod {
        request_id: String,
        signature: String,
    },
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<Table, HashMap<String, Row>>,
    version: u64,
}

impl MemoryState {
    fn row(&self, table: Table, signature: &str) -> Option<&Row> {
        self.tables.get(&table).and_then(|rows| rows.get(signature))
    }

    fn rows_mut(&mut self, table: Table) -> &mut HashMap<String, Row> {
        self.tables.entry(table).or_default()
    }

    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    fn lookup(&self, table: Table, signature: &str) -> StorageResult<Request> {
        let row = self.row(table, signature).ok_or(StorageError::NotFound)?;
        let request = Box::new(row.request.clone());
        match table {
            Table::Refresh if !row.is_usable(OffsetDateTime::now_utc()) => {
                Err(StorageError::Inactive { request })
            }
            Table::AuthorizeCode if !row.active => {
                Err(StorageError::InvalidatedAuthorizeCode { request })
            }
            _ => Ok(*request),
        }
    }

    fn apply(&mut self, operation: Operation, grace_period: Option<Duration>) {
        let version = self.next_version();
        match operation {
            Operation::Create {
                table,
                signature,
                request,
            } => {
                self.rows_mut(table).insert(
                    signature,
                    Row {
                        request: *request,
                        active: true,
                        version,
                        usable_until: None,
                    },
                );
            }
            Operation::Delete { table, signature } => {
                self.rows_mut(table).remove(&signature);
            }
            Operation::Deactivate { table, signature } => {
                if let Some(row) = self.rows_mut(table).get_mut(&signature) {
                    row.active = false;
                    row.version = version;
                }
            }
            Operation::RevokeAccess { request_id } => {
                self.rows_mut(Table::Access)
                    .retain(|_, row| row.request.id != request_id);
            }
            Operation::RevokeRefresh { request_id } => {
                for row in self.rows_mut(Table::Refresh).values_mut() {
                    if row.request.id == request_id {
                        row.active = false;
                        row.version = version;
                    }
                }
            }
            Operation::RevokeRefreshGracePeriod {
                request_id,
                signature,
            } => match grace_period {
                Some(grace) => {
                    let until = OffsetDateTime::now_utc() + grace;
                    if let Some(row) = self.rows_mut(Table::Refresh).get_mut(&signature) {
                        row.usable_until.get_or_insert(until);
                        row.version = version;
                    }
                }
                None => self.apply(Operation::RevokeRefresh { request_id }, None),
            },
        }
    }
}

/// In-memory implementation of every storage contract.
///
/// Cloning yields a handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    grace_period: Option<Duration>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps rotated refresh tokens usable for `grace_period`.
    #[must_use]
    pub fn with_refresh_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = Some(grace_period);
        self
    }

    /// Number of stored access token sessions.
    pub async fn access_token_count(&self) -> usize {
        self.count(Table::Access).await
    }

    /// Number of refresh token sessions that can still be used.
    pub async fn active_refresh_token_count(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let state = self.state.read().await;
        state
            .tables
            .get(&Table::Refresh)
            .map_or(0, |rows| rows.values().filter(|row| row.is_usable(now)).count())
    }

    async fn count(&self, table: Table) -> usize {
        self.state
            .read()
            .await
            .tables
            .get(&table)
            .map_or(0, HashMap::len)
    }

    async fn get(&self, table: Table, signature: &str) -> StorageResult<Request> {
        self.state.read().await.lookup(table, signature)
    }

    async fn execute(&self, operation: Operation) -> StorageResult<()> {
        self.state.write().await.apply(operation, self.grace_period);
        Ok(())
    }
}

fn create(table: Table, signature: &str, request: &Request) -> Operation {
    Operation::Create {
        table,
        signature: signature.to_string(),
        request: Box::new(request.clone()),
    }
}

fn delete(table: Table, signature: &str) -> Operation {
    Operation::Delete {
        table,
        signature: signature.to_string(),
    }
}

#[async_trait]
impl AccessTokenStorage for MemoryStore {
    async fn create_access_token_session(&self, signature: &str, request: &Request) -> StorageResult<()> {
        self.execute(create(Table::Access, signature, request)).await
    }

    async fn get_access_token_session(&self, signature: &str) -> StorageResult<Request> {
        self.get(Table::Access, signature).await
    }

    async fn delete_access_token_session(&self, signature: &str) -> StorageResult<()> {
        self.execute(delete(Table::Access, signature)).await
    }
}

#[async_trait]
impl RefreshTokenStorage for MemoryStore {
    async fn create_refresh_token_session(
        &self,
        signature: &str,
        _access_signature: &str,
        request: &Request,
    ) -> StorageResult<()> {
        self.execute(create(Table::Refresh, signature, request)).await
    }

    async fn get_refresh_token_session(&self, signature: &str) -> StorageResult<Request> {
        self.get(Table::Refresh, signature).await
    }

    async fn delete_refresh_token_session(&self, signature: &str) -> StorageResult<()> {
        self.execute(delete(Table::Refresh, signature)).await
    }
}

#[async_trait]
impl TokenRevocationStorage for MemoryStore {
    async fn revoke_access_token(&self, request_id: &str) -> StorageResult<()> {
        self.execute(Operation::RevokeAccess {
            request_id: request_id.to_string(),
        })
        .await
    }

    async fn revoke_refresh_token(&self, request_id: &str) -> StorageResult<()> {
        self.execute(Operation::RevokeRefresh {
            request_id: request_id.to_string(),
        })
        .await
    }

    async fn revoke_refresh_token_maybe_grace_period(
        &self,
        request_id: &str,
        signature: &str,
    ) -> StorageResult<()> {
        self.execute(Operation::RevokeRefreshGracePeriod {
            request_id: request_id.to_string(),
            signature: signature.to_string(),
        })
        .await
    }
}

#[async_trait]
impl AuthorizeCodeStorage for MemoryStore {
    async fn create_authorize_code_session(&self, signature: &str, request: &Request) -> StorageResult<()> {
        self.execute(create(Table::AuthorizeCode, signature, request)).await
    }

    async fn get_authorize_code_session(&self, signature: &str) -> StorageResult<Request> {
        self.get(Table::AuthorizeCode, signature).await
    }

    async fn invalidate_authorize_code_session(&self, signature: &str) -> StorageResult<()> {
        self.execute(Operation::Deactivate {
            table: Table::AuthorizeCode,
            signature: signature.to_string(),
        })
        .await
    }
}

#[async_trait]
impl PkceRequestStorage for MemoryStore {
    async fn create_pkce_request_session(&self, signature: &str, request: &Request) -> StorageResult<()> {
        self.execute(create(Table::Pkce, signature, request)).await
    }

    async fn get_pkce_request_session(&self, signature: &str) -> StorageResult<Request> {
        self.get(Table::Pkce, signature).await
    }

    async fn delete_pkce_request_session(&self, signature: &str) -> StorageResult<()> {
        self.execute(delete(Table::Pkce, signature)).await
    }
}

#[async_trait]
impl Transactional for MemoryStore {
    async fn begin_tx(&self) -> StorageResult<Box<dyn TokenTransaction>> {
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            grace_period: self.grace_period,
            inner: Mutex::new(TransactionState::default()),
        }))
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Version observed for a row; `None` if the row did not exist.
type ReadSet = Vec<(Table, String, Option<u64>)>;

#[derive(Debug, Default)]
struct TransactionState {
    reads: ReadSet,
    writes: Vec<Operation>,
    finished: bool,
}

/// Optimistic transaction over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransaction {
    state: Arc<RwLock<MemoryState>>,
    grace_period: Option<Duration>,
    inner: Mutex<TransactionState>,
}

impl MemoryTransaction {
    fn with_state<T>(&self, f: impl FnOnce(&mut TransactionState) -> T) -> StorageResult<T> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StorageError::backend("transaction state is poisoned"))?;
        if inner.finished {
            return Err(StorageError::backend("transaction already finished"));
        }
        Ok(f(&mut inner))
    }

    fn stage(&self, operation: Operation) -> StorageResult<()> {
        self.with_state(|inner| inner.writes.push(operation))
    }

    async fn get(&self, table: Table, signature: &str) -> StorageResult<Request> {
        let (version, result) = {
            let state = self.state.read().await;
            (
                state.row(table, signature).map(|row| row.version),
                state.lookup(table, signature),
            )
        };
        self.with_state(|inner| inner.reads.push((table, signature.to_string(), version)))?;
        result
    }
}

#[async_trait]
impl AccessTokenStorage for MemoryTransaction {
    async fn create_access_token_session(&self, signature: &str, request: &Request) -> StorageResult<()> {
        self.stage(create(Table::Access, signature, request))
    }

    async fn get_access_token_session(&self, signature: &str) -> StorageResult<Request> {
        self.get(Table::Access, signature).await
    }

    async fn delete_access_token_session(&self, signature: &str) -> StorageResult<()> {
        self.stage(delete(Table::Access, signature))
    }
}

#[async_trait]
impl RefreshTokenStorage for MemoryTransaction {
    async fn create_refresh_token_session(
        &self,
        signature: &str,
        _access_signature: &str,
        request: &Request,
    ) -> StorageResult<()> {
        self.stage(create(Table::Refresh, signature, request))
    }

    async fn get_refresh_token_session(&self, signature: &str) -> StorageResult<Request> {
        self.get(Table::Refresh, signature).await
    }

    async fn delete_refresh_token_session(&self, signature: &str) -> StorageResult<()> {
        self.stage(delete(Table::Refresh, signature))
    }
}

#[async_trait]
impl TokenRevocationStorage for MemoryTransaction {
    async fn revoke_access_token(&self, request_id: &str) -> StorageResult<()> {
        self.stage(Operation::RevokeAccess {
            request_id: request_id.to_string(),
        })
    }

    async fn revoke_refresh_token(&self, request_id: &str) -> StorageResult<()> {
        self.stage(Operation::RevokeRefresh {
            request_id: request_id.to_string(),
        })
    }

    async fn revoke_refresh_token_maybe_grace_period(
        &self,
        request_id: &str,
        signature: &str,
    ) -> StorageResult<()> {
        self.stage(Operation::RevokeRefreshGracePeriod {
            request_id: request_id.to_string(),
            signature: signature.to_string(),
        })
    }
}

#[async_trait]
impl AuthorizeCodeStorage for MemoryTransaction {
    async fn create_authorize_code_session(&self, signature: &str, request: &Request) -> StorageResult<()> {
        self.stage(create(Table::AuthorizeCode, signature, request))
    }

    async fn get_authorize_code_session(&self, signature: &str) -> StorageResult<Request> {
        self.get(Table::AuthorizeCode, signature).await
    }

    async fn invalidate_authorize_code_session(&self, signature: &str) -> StorageResult<()> {
        self.stage(Operation::Deactivate {
            table: Table::AuthorizeCode,
            signature: signature.to_string(),
        })
    }
}

#[async_trait]
impl TokenTransaction for MemoryTransaction {
    async fn commit(&self) -> StorageResult<()> {
        let (reads, writes) = self.with_state(|inner| {
            inner.finished = true;
            (
                std::mem::take(&mut inner.reads),
                std::mem::take(&mut inner.writes),
            )
        })?;

        let mut state = self.state.write().await;
        let conflict = reads.iter().any(|(table, signature, version)| {
            state.row(*table, signature).map(|row| row.version) != *version
        });
        if conflict {
            tracing::debug!(reads = reads.len(), "Transaction conflicts with a concurrent commit");
            return Err(StorageError::SerializationFailure);
        }

        for operation in writes {
            state.apply(operation, self.grace_period);
        }
        Ok(())
    }

    async fn rollback(&self) -> StorageResult<()> {
        // Rolling back after a failed commit is a no-op.
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StorageError::backend("transaction state is poisoned"))?;
        inner.finished = true;
        inner.reads.clear();
        inner.writes.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::types::Client;

    fn request(id: &str) -> Request {
        let mut request = Request::new(Arc::new(Client::new("app")), Session::new("alice"));
        request.id = id.to_string();
        request
    }

    #[tokio::test]
    async fn test_refresh_revocation_marks_inactive() {
        let store = MemoryStore::new();
        store
            .create_refresh_token_session("rt1", "at1", &request("r1"))
            .await
            .unwrap();
        store.create_access_token_session("at1", &request("r1")).await.unwrap();

        store.revoke_refresh_token("r1").await.unwrap();
        store.revoke_access_token("r1").await.unwrap();

        let err = store.get_refresh_token_session("rt1").await.unwrap_err();
        match err {
            StorageError::Inactive { request } => assert_eq!(request.id, "r1"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.get_access_token_session("at1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_invalidated_code() {
        let store = MemoryStore::new();
        store.create_authorize_code_session("ac1", &request("r1")).await.unwrap();
        store.invalidate_authorize_code_session("ac1").await.unwrap();

        assert!(matches!(
            store.get_authorize_code_session("ac1").await,
            Err(StorageError::InvalidatedAuthorizeCode { .. })
        ));
    }

    #[tokio::test]
    async fn test_transaction_writes_apply_on_commit() {
        let store = MemoryStore::new();
        let tx = store.begin_tx().await.unwrap();
        tx.create_access_token_session("at1", &request("r1")).await.unwrap();
        assert_eq!(store.access_token_count().await, 0);

        tx.commit().await.unwrap();
        assert_eq!(store.access_token_count().await, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryStore::new();
        let tx = store.begin_tx().await.unwrap();
        tx.create_access_token_session("at1", &request("r1")).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.access_token_count().await, 0);
        assert!(tx.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_rotation_conflicts() {
        let store = MemoryStore::new();
        store
            .create_refresh_token_session("rt1", "at1", &request("r1"))
            .await
            .unwrap();

        let first = store.begin_tx().await.unwrap();
        let second = store.begin_tx().await.unwrap();
        first.get_refresh_token_session("rt1").await.unwrap();
        second.get_refresh_token_session("rt1").await.unwrap();

        first.revoke_refresh_token("r1").await.unwrap();
        second.revoke_refresh_token("r1").await.unwrap();
        second
            .create_refresh_token_session("rt2", "at2", &request("r1"))
            .await
            .unwrap();

        first.commit().await.unwrap();
        assert!(matches!(
            second.commit().await,
            Err(StorageError::SerializationFailure)
        ));
        assert!(store.get_refresh_token_session("rt2").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_grace_period_keeps_rotated_token_usable() {
        let store = MemoryStore::new().with_refresh_grace_period(Duration::from_secs(60));
        store
            .create_refresh_token_session("rt1", "at1", &request("r1"))
            .await
            .unwrap();

        store
            .revoke_refresh_token_maybe_grace_period("r1", "rt1")
            .await
            .unwrap();
        assert!(store.get_refresh_token_session("rt1").await.is_ok());

        let strict = MemoryStore::new();
        strict
            .create_refresh_token_session("rt1", "at1", &request("r1"))
            .await
            .unwrap();
        strict
            .revoke_refresh_token_maybe_grace_period("r1", "rt1")
            .await
            .unwrap();
        assert!(strict.get_refresh_token_session("rt1").await.unwrap_err().is_inactive());
    }
}
