//! Persistence backends for the store document

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::types::StoreDocument;
use crate::error::{Error, Result};

/// Where the store document lives. Loaded once at startup, saved in full after every mutation.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    fn load(&self) -> Result<StoreDocument>;

    async fn save(&self, doc: &StoreDocument) -> Result<()>;
}

/// Single pretty-printed JSON file, replaced atomically on save.
///
/// The document holds wallet seeds, so the file is owner read/write only on Unix.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PersistenceBackend for JsonFileBackend {
    fn load(&self) -> Result<StoreDocument> {
        if !self.path.exists() {
            warn!("{} not found, starting with empty store", self.path.display());
            return Ok(StoreDocument::default());
        }

        let data = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Persistence(format!("read {}: {}", self.path.display(), e)))?;

        let doc: StoreDocument = serde_json::from_str(&data)
            .map_err(|e| Error::Persistence(format!("parse {}: {}", self.path.display(), e)))?;

        info!(
            "Loaded data for {} wallet(s) with {} sniper config(s) from {}",
            doc.wallets.len(),
            doc.config_count(),
            self.path.display()
        );
        Ok(doc)
    }

    async fn save(&self, doc: &StoreDocument) -> Result<()> {
        let data = serde_json::to_string_pretty(doc)
            .map_err(|e| Error::Persistence(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        write_private(&tmp, data.as_bytes())
            .await
            .map_err(|e| Error::Persistence(format!("write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::Persistence(format!("replace {}: {}", self.path.display(), e)))?;

        debug!("Saved store to {}", self.path.display());
        Ok(())
    }
}

/// Write `data` to `path` with mode 0600, also tightening a pre-existing file
async fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
    }

    file.write_all(data).await?;
    file.sync_all().await
}

/// Process-local backend for ephemeral runs and tests
#[derive(Default)]
pub struct MemoryBackend {
    saved: Mutex<StoreDocument>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    /// Make subsequent saves fail, to exercise durability warnings
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Last successfully saved document
    pub fn snapshot(&self) -> StoreDocument {
        self.saved
            .lock()
            .map(|doc| doc.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PersistenceBackend for MemoryBackend {
    fn load(&self) -> Result<StoreDocument> {
        Ok(self.snapshot())
    }

    async fn save(&self, doc: &StoreDocument) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Persistence("memory backend write disabled".to_string()));
        }
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| Error::Internal("memory backend poisoned".to_string()))?;
        *saved = doc.clone();
        Ok(())
    }
}
