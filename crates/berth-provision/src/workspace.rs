//! Tenant-private config directories.
//!
//! Every tenant gets `<instances_root>/<tenant_id>/`, bind-mounted into
//! its container. The directory holds `openclaw.json` plus whatever the
//! agent writes at runtime, and is readable only by the container user.

use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;
use walkdir::WalkDir;

use crate::app_config::AppConfig;

pub const CONFIG_FILE: &str = "openclaw.json";

const DIR_MODE: u32 = 0o700;
const CONFIG_MODE: u32 = 0o600;

/// Owner applied to a tenant directory so the container user can read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantOwner {
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone)]
pub struct TenantWorkspace {
    dir: PathBuf,
}

impl TenantWorkspace {
    pub fn new(instances_root: &Path, tenant_id: &str) -> Self {
        Self {
            dir: instances_root.join(tenant_id),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Create the directory with mode 0700. Returns `false` if it already
    /// existed, e.g. a backup kept from an earlier deprovision; its mode is
    /// tightened to 0700 as well.
    pub async fn create(&self) -> io::Result<bool> {
        if tokio::fs::try_exists(&self.dir).await? {
            tokio::fs::set_permissions(&self.dir, std::fs::Permissions::from_mode(DIR_MODE)).await?;
            return Ok(false);
        }
        if let Some(parent) = self.dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || std::fs::DirBuilder::new().mode(DIR_MODE).create(&dir))
            .await
            .map_err(io::Error::other)??;
        Ok(true)
    }

    /// Write `openclaw.json` with mode 0600.
    pub async fn write_config(&self, config: &AppConfig) -> io::Result<()> {
        let body = serde_json::to_vec_pretty(config)?;
        self.write_config_bytes(&body).await?;
        debug!(path = ?self.config_path(), "tenant config written");
        Ok(())
    }

    /// Raw contents of `openclaw.json`, or `None` if there is none.
    pub async fn read_config_bytes(&self) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.config_path()).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replace `openclaw.json` with `body` verbatim.
    pub async fn write_config_bytes(&self, body: &[u8]) -> io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(CONFIG_MODE)
            .open(self.config_path())
            .await?;
        file.write_all(body).await?;
        file.flush().await
    }

    /// Hand the directory tree to `owner` (if any) and lock it down to 0700.
    pub async fn restrict(&self, owner: Option<TenantOwner>) -> io::Result<()> {
        if let Some(owner) = owner {
            let dir = self.dir.clone();
            tokio::task::spawn_blocking(move || chown_tree(&dir, owner))
                .await
                .map_err(io::Error::other)??;
        }
        tokio::fs::set_permissions(&self.dir, std::fs::Permissions::from_mode(DIR_MODE)).await
    }

    /// Delete the directory and everything in it. A missing directory is
    /// not an error.
    pub async fn purge(&self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

fn chown_tree(root: &Path, owner: TenantOwner) -> io::Result<()> {
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(io::Error::other)?;
        std::os::unix::fs::lchown(entry.path(), Some(owner.uid), Some(owner.gid))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig::build("123:abc", None, &[], 18789, "tok")
    }

    #[tokio::test]
    async fn create_write_restrict_purge() {
        let root = tempfile::tempdir().unwrap();
        let ws = TenantWorkspace::new(root.path(), "abc123");

        assert!(ws.create().await.unwrap());
        assert!(!ws.create().await.unwrap());

        ws.write_config(&config()).await.unwrap();
        let written: AppConfig =
            serde_json::from_slice(&std::fs::read(ws.config_path()).unwrap()).unwrap();
        assert_eq!(written, config());

        ws.restrict(None).await.unwrap();
        let mode = std::fs::metadata(ws.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);

        ws.purge().await.unwrap();
        assert!(!ws.path().exists());
        ws.purge().await.unwrap();
    }

    #[tokio::test]
    async fn secrets_are_private_before_restrict() {
        let root = tempfile::tempdir().unwrap();
        let ws = TenantWorkspace::new(&root.path().join("instances"), "abc123");

        assert!(ws.create().await.unwrap());
        ws.write_config(&config()).await.unwrap();

        let dir_mode = std::fs::metadata(ws.path()).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);
        let file_mode = std::fs::metadata(ws.config_path()).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn existing_directory_is_tightened() {
        let root = tempfile::tempdir().unwrap();
        let ws = TenantWorkspace::new(root.path(), "abc123");
        std::fs::create_dir(ws.path()).unwrap();
        std::fs::set_permissions(ws.path(), std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(!ws.create().await.unwrap());
        let mode = std::fs::metadata(ws.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[tokio::test]
    async fn config_bytes_restore_verbatim() {
        let root = tempfile::tempdir().unwrap();
        let ws = TenantWorkspace::new(root.path(), "abc123");
        ws.create().await.unwrap();
        assert_eq!(ws.read_config_bytes().await.unwrap(), None);

        ws.write_config_bytes(b"{\"old\":true}").await.unwrap();
        let saved = ws.read_config_bytes().await.unwrap().unwrap();
        ws.write_config(&config()).await.unwrap();
        ws.write_config_bytes(&saved).await.unwrap();
        assert_eq!(std::fs::read(ws.config_path()).unwrap(), b"{\"old\":true}");
    }

    #[tokio::test]
    async fn chown_to_current_owner_succeeds() {
        let root = tempfile::tempdir().unwrap();
        let ws = TenantWorkspace::new(root.path(), "abc123");
        ws.create().await.unwrap();
        ws.write_config(&config()).await.unwrap();

        // Re-assigning a file to its current owner needs no privileges.
        use std::os::unix::fs::MetadataExt;
        let meta = std::fs::metadata(ws.path()).unwrap();
        let owner = TenantOwner {
            uid: meta.uid(),
            gid: meta.gid(),
        };
        ws.restrict(Some(owner)).await.unwrap();
        assert_eq!(std::fs::metadata(ws.config_path()).unwrap().uid(), owner.uid);
    }
}
