use super::CacheEntry;
use crate::domain::Domain;
use crate::error::CacheCorruptionError;
use fs4::fs_std::FileExt;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tempfile::NamedTempFile;
use tokio::fs;

/// Persistence for fetched block-lists, keyed by the source's cache path.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Blocks until no other holder, in this process or another, has `path`.
    async fn lock(&self, path: &Path) -> std::io::Result<StoreLock>;
    /// `Ok(None)` when nothing has been persisted yet.
    async fn load(&self, path: &Path) -> Result<Option<CacheEntry>, CacheCorruptionError>;
    async fn save(&self, path: &Path, entry: &CacheEntry) -> std::io::Result<()>;
}

/// Exclusive hold on one cache path. Released on drop.
#[derive(Debug, Default)]
pub struct StoreLock {
    _file: Option<std::fs::File>,
}

#[derive(Serialize)]
struct EntryRef<'a> {
    url: &'a str,
    fetched_at: u64,
    domains: Vec<&'a Domain>,
}

#[derive(Deserialize)]
struct EntryOwned {
    // files written before the url was recorded never match a source
    #[serde(default)]
    url: String,
    fetched_at: u64,
    domains: Vec<Domain>,
}

/// JSON files on disk.
///
/// Writes go to a uniquely named temp file in the target's directory that is
/// then renamed over the target, so a reader sees either the old or the new
/// entry. `lock` takes an advisory lock on a sibling `.lock` file.
#[derive(Debug, Default, Clone)]
pub struct FileCacheStore;

impl FileCacheStore {
    pub fn new() -> Self {
        Self
    }

    fn encode(entry: &CacheEntry) -> serde_json::Result<Vec<u8>> {
        let mut domains: Vec<&Domain> = entry.domains.iter().collect();
        domains.sort();
        serde_json::to_vec_pretty(&EntryRef {
            url: &entry.url,
            fetched_at: entry.fetched_at,
            domains,
        })
    }

    fn lock_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[async_trait::async_trait]
impl CacheStore for FileCacheStore {
    async fn lock(&self, path: &Path) -> std::io::Result<StoreLock> {
        fs::create_dir_all(parent_dir(path)).await?;
        let lock_path = Self::lock_path(path);

        tokio::task::spawn_blocking(move || -> std::io::Result<StoreLock> {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            file.lock_exclusive()?;
            Ok(StoreLock { _file: Some(file) })
        })
        .await
        .map_err(std::io::Error::other)?
    }

    async fn load(&self, path: &Path) -> Result<Option<CacheEntry>, CacheCorruptionError> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheCorruptionError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let owned: EntryOwned =
            serde_json::from_slice(&bytes).map_err(|source| CacheCorruptionError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Some(CacheEntry {
            url: owned.url,
            fetched_at: owned.fetched_at,
            domains: owned.domains.into_iter().collect(),
        }))
    }

    async fn save(&self, path: &Path, entry: &CacheEntry) -> std::io::Result<()> {
        fs::create_dir_all(parent_dir(path)).await?;

        let bytes = Self::encode(entry)?;
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = NamedTempFile::new_in(parent_dir(&path))?;
            tmp.write_all(&bytes)?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)?
    }
}

/// In-process store. Nothing outlives the process, and `lock` never blocks
/// since `ListCache` already serializes access within a process.
#[derive(Debug, Default, Clone)]
pub struct MemoryCacheStore {
    entries: Arc<RwLock<FxHashMap<PathBuf, CacheEntry>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, entry: CacheEntry) {
        self.entries.write().unwrap().insert(path.into(), entry);
    }

    pub fn get(&self, path: &Path) -> Option<CacheEntry> {
        self.entries.read().unwrap().get(path).cloned()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCacheStore {
    async fn lock(&self, _path: &Path) -> std::io::Result<StoreLock> {
        Ok(StoreLock::default())
    }

    async fn load(&self, path: &Path) -> Result<Option<CacheEntry>, CacheCorruptionError> {
        Ok(self.get(path))
    }

    async fn save(&self, path: &Path, entry: &CacheEntry) -> std::io::Result<()> {
        self.insert(path, entry.clone());
        Ok(())
    }
}
