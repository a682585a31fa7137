use futures::future::BoxFuture;

use crate::dao::models::{LedgerEntity, WatchedIdentityEntity};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for the two record collections.
///
/// Only whole collections are read or written. Loading a missing or corrupt
/// collection yields an empty one.
pub trait RecordStore: Send + Sync {
    fn load_watched(&self) -> BoxFuture<'static, StorageResult<Vec<WatchedIdentityEntity>>>;
    fn save_watched(
        &self,
        watched: Vec<WatchedIdentityEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn load_ledger(&self) -> BoxFuture<'static, StorageResult<LedgerEntity>>;
    fn save_ledger(&self, ledger: LedgerEntity) -> BoxFuture<'static, StorageResult<()>>;
}
