//! Credential Cache.
//!
//! Keeps the connection descriptor of the most recently drained cluster so
//! consecutive events for the same cluster skip `DescribeCluster`. An entry is
//! trusted only when its cluster name equals the requested one; any other
//! entry is deleted before the caller rebuilds.
//!
//! Both implementations serialize access with an async mutex. [`FileCache`]
//! additionally replaces its file through a same-directory rename, so another
//! process on the host never reads a half-written kubeconfig.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::kubeconfig::{ConnectionDescriptor, KubeconfigFile};

/// File name of the cached kubeconfig inside the cache directory.
pub const KUBECONFIG_FILE_NAME: &str = "kubeconfig";

/// Cluster name plus the descriptor built for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedClusterState {
    /// Cluster the descriptor belongs to.
    pub cluster_name: String,
    /// Connection descriptor.
    pub descriptor: ConnectionDescriptor,
}

/// Cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cached file could not be (de)serialized.
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    /// The blocking filesystem task panicked or was cancelled.
    #[error("cache task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Cross-invocation cache of connection descriptors keyed by cluster name.
#[async_trait]
pub trait CredentialCache: Send + Sync {
    /// Descriptor for `cluster_name`, or `None` on a miss.
    ///
    /// An entry for a different cluster counts as a miss and is removed.
    async fn get(&self, cluster_name: &str) -> Result<Option<ConnectionDescriptor>, CacheError>;

    /// Store the descriptor for `cluster_name`, replacing any previous entry.
    async fn put(
        &self,
        cluster_name: &str,
        descriptor: &ConnectionDescriptor,
    ) -> Result<(), CacheError>;
}

/// In-process cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    state: Mutex<Option<CachedClusterState>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialCache for MemoryCache {
    async fn get(&self, cluster_name: &str) -> Result<Option<ConnectionDescriptor>, CacheError> {
        let mut state = self.state.lock().await;
        match state.as_ref() {
            Some(cached) if cached.cluster_name == cluster_name => {
                Ok(Some(cached.descriptor.clone()))
            }
            Some(cached) => {
                debug!(
                    cached = %cached.cluster_name,
                    requested = cluster_name,
                    "Discarding cached descriptor for another cluster"
                );
                *state = None;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        cluster_name: &str,
        descriptor: &ConnectionDescriptor,
    ) -> Result<(), CacheError> {
        *self.state.lock().await = Some(CachedClusterState {
            cluster_name: cluster_name.to_string(),
            descriptor: descriptor.clone(),
        });
        Ok(())
    }
}

/// Host-local durable cache storing the kubeconfig on disk.
///
/// Filesystem work runs on the blocking pool.
#[derive(Debug)]
pub struct FileCache {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileCache {
    /// Create a cache rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the cached kubeconfig.
    #[must_use]
    pub fn kubeconfig_path(&self) -> PathBuf {
        self.dir.join(KUBECONFIG_FILE_NAME)
    }

    fn read_state(path: &Path) -> Result<Option<CachedClusterState>, CacheError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let file = KubeconfigFile::from_yaml(&raw)?;
        Ok(file.current().map(|(name, descriptor)| CachedClusterState {
            cluster_name: name.to_string(),
            descriptor,
        }))
    }

    fn remove(path: &Path) -> Result<(), CacheError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn write_atomic(dir: &Path, path: &Path, contents: &str) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(io_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(contents.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

async fn blocking<T, F>(f: F) -> Result<T, CacheError>
where
    F: FnOnce() -> Result<T, CacheError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

#[async_trait]
impl CredentialCache for FileCache {
    async fn get(&self, cluster_name: &str) -> Result<Option<ConnectionDescriptor>, CacheError> {
        let _guard = self.lock.lock().await;
        let path = self.kubeconfig_path();

        let read_path = path.clone();
        let state = match blocking(move || Self::read_state(&read_path)).await {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable cached kubeconfig, discarding");
                blocking(move || Self::remove(&path)).await?;
                return Ok(None);
            }
        };

        match state {
            Some(cached) if cached.cluster_name == cluster_name => {
                info!(cluster_name, "Same cluster as last event, reusing kubeconfig");
                Ok(Some(cached.descriptor))
            }
            Some(cached) => {
                info!(
                    cached = %cached.cluster_name,
                    requested = cluster_name,
                    "Cached kubeconfig belongs to another cluster, discarding"
                );
                blocking(move || Self::remove(&path)).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        cluster_name: &str,
        descriptor: &ConnectionDescriptor,
    ) -> Result<(), CacheError> {
        let _guard = self.lock.lock().await;
        let yaml = KubeconfigFile::from_descriptor(cluster_name, descriptor).to_yaml()?;
        let dir = self.dir.clone();
        let path = self.kubeconfig_path();

        blocking(move || Self::write_atomic(&dir, &path, &yaml)).await?;
        debug!(cluster_name, path = %self.kubeconfig_path().display(), "Cached kubeconfig");
        Ok(())
    }
}
