//! Remote storage relay
//!
//! A [`RelaySession`] wraps one authenticated storage account session for the
//! lifetime of a job: connect once, make sure the destination folder exists,
//! then push files into it. Every public operation reports a plain success
//! flag and logs the reason for a failure.

mod webdav;

pub use webdav::{WebDavBackend, WebDavSession};

use crate::config::RetryConfig;
use crate::error::RelayError;
use crate::retry::with_retry;
use crate::utils::format_bytes;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Opaque handle of a remote folder
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FolderId(pub String);

impl std::fmt::Display for FolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account capacity as reported at login
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StorageSpace {
    /// Total capacity in bytes
    pub total: u64,
    /// Bytes in use
    pub used: u64,
}

impl StorageSpace {
    /// Bytes still free
    pub fn free(&self) -> u64 {
        self.total.saturating_sub(self.used)
    }
}

/// What the storage reported back for an upload
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadedFile {
    /// Size the server holds, when it says
    pub size: Option<u64>,
}

/// Storage account client that can open sessions
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Authenticate and open a session
    async fn login(&self) -> std::result::Result<Box<dyn StorageSession>, RelayError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Authenticated storage session
#[async_trait]
pub trait StorageSession: Send + Sync {
    /// Account capacity
    async fn storage_space(&self) -> std::result::Result<StorageSpace, RelayError>;

    /// Look a folder up by name; `Ok(None)` when it does not exist
    async fn find(&self, name: &str) -> std::result::Result<Option<FolderId>, RelayError>;

    /// Create a folder; `Ok(None)` when the server gave no handle back
    async fn create_folder(&self, name: &str) -> std::result::Result<Option<FolderId>, RelayError>;

    /// Upload the file at `path` into `parent`
    async fn upload(
        &self,
        path: &Path,
        parent: &FolderId,
    ) -> std::result::Result<UploadedFile, RelayError>;
}

/// Where a relay session stands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayState {
    /// No authenticated session
    Disconnected,
    /// Logged in, no folder ensured yet
    Connected,
    /// Logged in with a destination folder
    Ready,
    /// Logged in but the destination folder could not be ensured
    Failed,
}

/// Result of a successful upload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The server reports the same size as the local file
    Verified {
        /// File size in bytes
        size: u64,
    },
    /// The server reports a different size, or none at all
    ///
    /// Still counts as a success: only a transport or API failure fails an
    /// upload.
    SizeMismatch {
        /// Local size before the transfer
        local: u64,
        /// Size reported by the server
        remote: Option<u64>,
    },
}

/// One job's session with the storage account
pub struct RelaySession {
    backend: Arc<dyn StorageBackend>,
    handle: Option<Box<dyn StorageSession>>,
    free_capacity: u64,
    folder: Option<String>,
    state: RelayState,
}

impl RelaySession {
    /// Create a disconnected session over `backend`
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            handle: None,
            free_capacity: 0,
            folder: None,
            state: RelayState::Disconnected,
        }
    }

    /// Current state
    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Free capacity cached at login
    pub fn free_capacity(&self) -> u64 {
        self.free_capacity
    }

    /// Log in unless already logged in; false on failure
    ///
    /// A failed login leaves the session disconnected. Capacity is read once
    /// per login and cached for the session.
    pub async fn connect(&mut self) -> bool {
        if self.handle.is_some() {
            return true;
        }

        let login = async {
            let session = self.backend.login().await?;
            let space = session.storage_space().await?;
            Ok::<_, RelayError>((session, space))
        };

        match login.await {
            Ok((session, space)) => {
                tracing::info!(
                    backend = self.backend.name(),
                    used = %format_bytes(space.used),
                    total = %format_bytes(space.total),
                    "Connected to storage"
                );
                self.free_capacity = space.free();
                self.handle = Some(session);
                self.state = RelayState::Connected;
                true
            }
            Err(e) => {
                tracing::error!(backend = self.backend.name(), error = %e, "Connection to storage failed");
                false
            }
        }
    }

    /// Make sure folder `name` exists, creating it when it does not
    ///
    /// A failed lookup is treated as "not found". True when the folder was
    /// found or created with a non-empty handle.
    pub async fn ensure_directory(&mut self, name: &str) -> bool {
        if name.is_empty() {
            tracing::error!("Folder name is empty");
            return false;
        }
        if !self.connect().await {
            return false;
        }
        let Some(session) = self.handle.as_ref() else {
            return false;
        };

        let found = match session.find(name).await {
            Ok(found) => found,
            Err(e) => {
                tracing::info!(folder = name, error = %e, "Folder lookup failed, creating it");
                None
            }
        };

        let folder_id = match found {
            Some(id) => {
                tracing::warn!(folder = name, id = %id, "Folder already exists");
                Some(id)
            }
            None => match session.create_folder(name).await {
                Ok(id) => id,
                Err(e) => {
                    tracing::error!(folder = name, error = %e, "Creating folder failed");
                    None
                }
            },
        };

        match folder_id {
            Some(id) => {
                tracing::info!(folder = name, id = %id, "Folder ready");
                self.folder = Some(name.to_string());
                self.state = RelayState::Ready;
                true
            }
            None => {
                tracing::error!(folder = name, "Folder has not been created");
                self.folder = None;
                self.state = RelayState::Failed;
                false
            }
        }
    }

    /// Upload one file into the ensured folder; true on success
    pub async fn upload_file(&mut self, path: &Path) -> bool {
        match self.try_upload(path).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Upload failed");
                false
            }
        }
    }

    /// Upload with retries under `policy`; true as soon as one attempt succeeds
    pub async fn upload_file_with_retry(&mut self, path: &Path, policy: &RetryConfig) -> bool {
        if !self.connect().await {
            return false;
        }
        let this = &*self;
        match with_retry(policy, || this.try_upload(path)).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Upload failed after retries");
                false
            }
        }
    }

    /// One upload attempt
    ///
    /// The folder handle is looked up again on every call. The file is refused
    /// up front when it is larger than the free capacity cached at login.
    pub async fn try_upload(&self, path: &Path) -> std::result::Result<UploadOutcome, RelayError> {
        let session = self.handle.as_ref().ok_or(RelayError::NotConnected)?;
        let folder = self
            .folder
            .as_deref()
            .filter(|_| self.state == RelayState::Ready)
            .ok_or_else(|| RelayError::DirectoryNotReady {
                name: self.folder.clone().unwrap_or_default(),
            })?;

        let local = tokio::fs::metadata(path)
            .await
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len())
            .ok_or_else(|| RelayError::Transfer {
                path: path.to_path_buf(),
                reason: "no such file".to_string(),
            })?;

        let folder_id = match session.find(folder).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                return Err(RelayError::DirectoryNotReady {
                    name: folder.to_string(),
                });
            }
            Err(e) => {
                tracing::error!(folder, error = %e, "Resolving folder failed");
                return Err(RelayError::DirectoryNotReady {
                    name: folder.to_string(),
                });
            }
        };

        if self.free_capacity < local {
            tracing::error!(
                path = %path.display(),
                size = %format_bytes(local),
                free = %format_bytes(self.free_capacity),
                "Not enough free space in storage"
            );
            return Err(RelayError::InsufficientCapacity {
                required: local,
                available: self.free_capacity,
            });
        }

        let uploaded = session.upload(path, &folder_id).await?;
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

        if uploaded.size == Some(local) {
            tracing::info!(file = %name, folder, size = %format_bytes(local), "Uploaded");
            Ok(UploadOutcome::Verified { size: local })
        } else {
            tracing::warn!(
                file = %name,
                folder,
                local = %format_bytes(local),
                remote = ?uploaded.size,
                "Size differs after upload"
            );
            Ok(UploadOutcome::SizeMismatch {
                local,
                remote: uploaded.size,
            })
        }
    }

    /// Drop the authenticated session; safe to call more than once
    pub fn close(&mut self) {
        if self.handle.take().is_some() {
            tracing::debug!(backend = self.backend.name(), "Storage session closed");
        }
        self.folder = None;
        self.state = RelayState::Disconnected;
    }
}
