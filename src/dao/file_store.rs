//! Record store keeping each collection in its own JSON document on disk.

use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use futures::future::BoxFuture;
use serde::{Serialize, de::DeserializeOwned};
use tokio::{fs, sync::Mutex};
use tracing::{info, warn};

use crate::dao::{
    models::{LedgerEntity, WatchedIdentityEntity},
    record_store::RecordStore,
    storage::{StorageError, StorageResult},
};

const WATCHED_FILE: &str = "watched.json";
const LEDGER_FILE: &str = "ledger.json";

#[derive(Clone)]
pub struct JsonFileStore {
    watched: Arc<CollectionFile>,
    ledger: Arc<CollectionFile>,
}

/// One collection document plus the lock serialising its writers.
struct CollectionFile {
    path: PathBuf,
    write_gate: Mutex<()>,
}

impl JsonFileStore {
    /// Build a store rooted at `data_dir`. The directory is created lazily on first write.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            watched: Arc::new(CollectionFile::new(data_dir.join(WATCHED_FILE))),
            ledger: Arc::new(CollectionFile::new(data_dir.join(LEDGER_FILE))),
        }
    }
}

impl CollectionFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_gate: Mutex::new(()),
        }
    }

    async fn load<T>(&self) -> StorageResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "collection file not found; starting empty");
                return Ok(T::default());
            }
            Err(err) => return Err(StorageError::read(&self.path, err)),
        };

        match serde_json::from_str::<T>(&contents) {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "collection file is corrupt; starting empty"
                );
                Ok(T::default())
            }
        }
    }

    async fn save<T>(&self, value: &T) -> StorageResult<()>
    where
        T: Serialize + ?Sized,
    {
        let payload =
            serde_json::to_vec_pretty(value).map_err(|source| StorageError::Encode {
                path: self.path.display().to_string(),
                source,
            })?;

        let _gate = self.write_gate.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| StorageError::write(parent, err))?;
        }

        // Write to a sibling file first so a crash mid-write never truncates the collection.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, payload)
            .await
            .map_err(|err| StorageError::write(&staging, err))?;
        fs::rename(&staging, &self.path)
            .await
            .map_err(|err| StorageError::write(&self.path, err))?;
        Ok(())
    }
}

impl RecordStore for JsonFileStore {
    fn load_watched(&self) -> BoxFuture<'static, StorageResult<Vec<WatchedIdentityEntity>>> {
        let file = self.watched.clone();
        Box::pin(async move { file.load().await })
    }

    fn save_watched(
        &self,
        watched: Vec<WatchedIdentityEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let file = self.watched.clone();
        Box::pin(async move { file.save(&watched).await })
    }

    fn load_ledger(&self) -> BoxFuture<'static, StorageResult<LedgerEntity>> {
        let file = self.ledger.clone();
        Box::pin(async move { file.load().await })
    }

    fn save_ledger(&self, ledger: LedgerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let file = self.ledger.clone();
        Box::pin(async move { file.save(&ledger).await })
    }
}
