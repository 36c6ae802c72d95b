//! Shared-directory session store.
//!
//! Each session lives in `<dir>/<id>.json`.  Nodes that mount the same
//! directory see each other's sessions, which is enough for a small cluster
//! on one host or a shared volume.  Writes go through a temp file and a
//! rename so readers never observe a torn blob.  Writes and removals of
//! one id are applied in call order, including `Async` puts that finish in
//! the background.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use sc_domain::config::ReplicationMode;
use sc_domain::error::{Error, Result};

use crate::store::SessionStore;

pub struct FileSessionStore {
    dir: PathBuf,
    /// Per-id write locks.  Entries are created under the map lock and
    /// dropped once nothing else holds them.
    writes: Arc<WriteLocks>,
}

type WriteLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

impl FileSessionStore {
    /// Open (creating if needed) the store directory.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(Error::Io)?;
        tracing::info!(path = %dir.display(), "file session store opened");
        Ok(Self {
            dir: dir.to_path_buf(),
            writes: Arc::default(),
        })
    }

    /// Wait for earlier writes of `id` and hold off later ones.
    async fn lock_id(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = self.writes.lock().entry(id.to_owned()).or_default().clone();
        lock.lock_owned().await
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let safe = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !safe {
            return Err(Error::Store(format!("invalid session id {id:?}")));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

fn release_id(writes: &WriteLocks, id: &str, guard: OwnedMutexGuard<()>) {
    drop(guard);
    let mut writes = writes.lock();
    if writes.get(id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
        writes.remove(id);
    }
}

async fn write_atomic(path: PathBuf, blob: Vec<u8>) -> Result<()> {
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
    tokio::fs::write(&tmp, &blob).await?;
    if let Err(e) = tokio::fs::rename(&tmp, &path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(Error::Io(e));
    }
    Ok(())
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn put(&self, id: &str, blob: Vec<u8>, mode: ReplicationMode) -> Result<()> {
        let path = self.path_for(id)?;
        let guard = self.lock_id(id).await;
        match mode {
            ReplicationMode::Sync => {
                let result = write_atomic(path, blob).await;
                release_id(&self.writes, id, guard);
                result
            }
            ReplicationMode::Async => {
                let id = id.to_owned();
                let writes = self.writes.clone();
                // The guard travels with the write; the next caller for this
                // id waits until it has landed.
                tokio::spawn(async move {
                    if let Err(e) = write_atomic(path, blob).await {
                        tracing::warn!(session_id = %id, error = %e, "async session write failed");
                    }
                    release_id(&writes, &id, guard);
                });
                Ok(())
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        let guard = self.lock_id(id).await;
        let result = match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        };
        release_id(&self.writes, id, guard);
        result
    }

    fn new_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}
