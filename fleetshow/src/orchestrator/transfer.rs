//! Remote file operations for staging and harvesting run artifacts.

use std::future::Future;
use std::path::Path;
use std::time::{Duration, SystemTime};

use log::debug;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use tokio::io::AsyncWriteExt;

use crate::error::{Result, TransferError};
use crate::transport::SshTransport;

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub modified: Option<SystemTime>,
}

/// File operations on the management node.
///
/// Remote paths are `/`-separated; relative paths resolve against the
/// login's home directory.
pub trait FileTransfer: Send + Sync {
    /// Create `path` and any missing parents. Existing directories are fine.
    fn create_dir_all(&self, path: &str) -> impl Future<Output = Result<()>> + Send;

    fn exists(&self, path: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Copy a local file to `remote`, replacing it, and apply `mode` if given.
    fn upload(
        &self,
        local: &Path,
        remote: &str,
        mode: Option<u32>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn download(&self, remote: &str, local: &Path) -> impl Future<Output = Result<()>> + Send;

    /// List a directory, most recently modified first.
    ///
    /// Fails with [`TransferError::NotFound`] when `path` does not exist.
    fn list_dir(&self, path: &str) -> impl Future<Output = Result<Vec<RemoteEntry>>> + Send;
}

/// Join a remote directory and a name.
pub fn remote_join(dir: &str, name: &str) -> String {
    match dir.trim_end_matches('/') {
        "" if dir.starts_with('/') => format!("/{}", name),
        "" | "." => name.to_string(),
        dir => format!("{}/{}", dir, name),
    }
}

/// Drop `.` and `..` and order a listing newest first.
///
/// Entries without a modification time sort last; ties keep listing order.
pub fn sort_newest_first(entries: Vec<RemoteEntry>) -> Vec<RemoteEntry> {
    let mut entries: Vec<RemoteEntry> = entries
        .into_iter()
        .filter(|entry| entry.name != "." && entry.name != "..")
        .collect();
    entries.sort_by(|a, b| b.modified.cmp(&a.modified));
    entries
}

/// [`FileTransfer`] over the SFTP subsystem of an SSH connection.
pub struct SftpTransfer {
    sftp: SftpSession,
}

impl SftpTransfer {
    /// Start an SFTP session on `transport`.
    pub async fn open(transport: &SshTransport) -> Result<Self> {
        let channel = transport.open_subsystem("sftp").await?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| TransferError::Subsystem(e.to_string()))?;
        debug!("sftp session open on {}", transport.host());
        Ok(Self { sftp })
    }
}

fn remote_error(path: &str, err: impl std::fmt::Display) -> TransferError {
    TransferError::Remote {
        path: path.to_string(),
        message: err.to_string(),
    }
}

fn local_error(path: &Path, source: std::io::Error) -> TransferError {
    TransferError::Local {
        path: path.to_path_buf(),
        source,
    }
}

impl FileTransfer for SftpTransfer {
    async fn create_dir_all(&self, path: &str) -> Result<()> {
        let mut current = if path.starts_with('/') {
            String::from("/")
        } else {
            String::new()
        };
        for part in path.split('/').filter(|p| !p.is_empty() && *p != ".") {
            current = remote_join(&current, part);
            let exists = self
                .sftp
                .try_exists(current.as_str())
                .await
                .map_err(|e| remote_error(&current, e))?;
            if !exists {
                debug!("creating remote directory {}", current);
                self.sftp
                    .create_dir(current.as_str())
                    .await
                    .map_err(|e| remote_error(&current, e))?;
            }
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let exists = self
            .sftp
            .try_exists(path)
            .await
            .map_err(|e| remote_error(path, e))?;
        Ok(exists)
    }

    async fn upload(&self, local: &Path, remote: &str, mode: Option<u32>) -> Result<()> {
        let mut source = tokio::fs::File::open(local)
            .await
            .map_err(|e| local_error(local, e))?;
        let mut target = self
            .sftp
            .create(remote)
            .await
            .map_err(|e| remote_error(remote, e))?;
        let copied = tokio::io::copy(&mut source, &mut target)
            .await
            .map_err(|e| remote_error(remote, e))?;
        target
            .shutdown()
            .await
            .map_err(|e| remote_error(remote, e))?;

        if let Some(mode) = mode {
            let mut attrs = FileAttributes::empty();
            attrs.permissions = Some(mode);
            self.sftp
                .set_metadata(remote, attrs)
                .await
                .map_err(|e| remote_error(remote, e))?;
        }
        debug!("uploaded {} -> {} ({} bytes)", local.display(), remote, copied);
        Ok(())
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        let mut source = self
            .sftp
            .open(remote)
            .await
            .map_err(|e| remote_error(remote, e))?;
        let mut target = tokio::fs::File::create(local)
            .await
            .map_err(|e| local_error(local, e))?;
        let copied = tokio::io::copy(&mut source, &mut target)
            .await
            .map_err(|e| local_error(local, e))?;
        target.flush().await.map_err(|e| local_error(local, e))?;
        debug!("downloaded {} -> {} ({} bytes)", remote, local.display(), copied);
        Ok(())
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        if !self.exists(path).await? {
            return Err(TransferError::NotFound {
                path: path.to_string(),
            }
            .into());
        }
        let listing = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| remote_error(path, e))?;

        let entries = listing
            .map(|entry| RemoteEntry {
                name: entry.file_name(),
                modified: entry
                    .metadata()
                    .mtime
                    .map(|secs| SystemTime::UNIX_EPOCH + Duration::from_secs(u64::from(secs))),
            })
            .collect();
        Ok(sort_newest_first(entries))
    }
}
