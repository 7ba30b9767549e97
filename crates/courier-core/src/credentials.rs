//! Local credential workspace.
//!
//! One directory per tenant holding the current credential snapshot, so a
//! connection can resume without contacting the durable store. Snapshots are
//! written atomically (temp file + rename) to survive crashes mid-write.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::connect::CredentialSnapshot;
use crate::error::{CourierError, Result};

/// Filename of the snapshot inside a tenant's workspace directory.
const SNAPSHOT_FILE: &str = "creds.json";

/// Filesystem-backed credential workspace, one subdirectory per tenant.
pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    /// Creates a credential store rooted at `root`.
    ///
    /// # Errors
    /// Returns an error if the root directory cannot be created.
    pub fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self { root: root.to_path_buf() })
    }

    /// Directory holding a tenant's credential state.
    pub fn tenant_dir(&self, number: &str) -> PathBuf {
        self.root.join(number)
    }

    /// Whether a snapshot exists for the tenant.
    pub fn exists(&self, number: &str) -> bool {
        self.tenant_dir(number).join(SNAPSHOT_FILE).is_file()
    }

    /// Writes the tenant's snapshot, replacing any previous one.
    pub fn save(&self, number: &str, snapshot: &CredentialSnapshot) -> Result<()> {
        let dir = self.tenant_dir(number);
        fs::create_dir_all(&dir)?;
        let json = snapshot.to_json()?;
        self.atomic_write(&dir.join(SNAPSHOT_FILE), &json)?;
        debug!(number = %number, "Credential snapshot written");
        Ok(())
    }

    /// Loads the tenant's snapshot, or `None` when no workspace exists.
    ///
    /// A snapshot that exists but fails to parse is treated as corrupt and
    /// reported as an error; the caller decides whether to re-pair or
    /// restore from the durable store.
    pub fn load(&self, number: &str) -> Result<Option<CredentialSnapshot>> {
        let path = self.tenant_dir(number).join(SNAPSHOT_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let snapshot = CredentialSnapshot::from_json(&content)?;
        Ok(Some(snapshot))
    }

    /// Removes the tenant's workspace directory entirely.
    pub fn delete(&self, number: &str) -> Result<()> {
        let dir = self.tenant_dir(number);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
            debug!(number = %number, "Credential workspace removed");
        }
        Ok(())
    }

    /// Writes content to a file atomically via a temp file in the same
    /// directory.
    fn atomic_write(&self, file_path: &Path, content: &str) -> Result<()> {
        let temp_name = format!(".{}.tmp.{}", SNAPSHOT_FILE, Uuid::new_v4());
        let temp_path = file_path.parent().unwrap_or(&self.root).join(temp_name);

        fs::write(&temp_path, content).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            CourierError::Io(e)
        })?;

        fs::rename(&temp_path, file_path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            CourierError::Io(e)
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot(tag: &str) -> CredentialSnapshot {
        CredentialSnapshot::new(serde_json::json!({ "creds": tag }))
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path()).unwrap();

        assert!(!store.exists("94741671668"));
        store.save("94741671668", &snapshot("first")).unwrap();
        assert!(store.exists("94741671668"));

        let loaded = store.load("94741671668").unwrap().unwrap();
        assert_eq!(loaded, snapshot("first"));
    }

    #[test]
    fn test_save_overwrites_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path()).unwrap();

        store.save("123", &snapshot("old")).unwrap();
        store.save("123", &snapshot("new")).unwrap();

        let loaded = store.load("123").unwrap().unwrap();
        assert_eq!(loaded, snapshot("new"));
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path()).unwrap();
        assert!(store.load("404").unwrap().is_none());
    }

    #[test]
    fn test_delete_removes_workspace() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path()).unwrap();

        store.save("123", &snapshot("x")).unwrap();
        store.delete("123").unwrap();

        assert!(!store.exists("123"));
        assert!(!store.tenant_dir("123").exists());
        // Deleting again is a no-op.
        store.delete("123").unwrap();
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path()).unwrap();

        let tenant_dir = store.tenant_dir("123");
        fs::create_dir_all(&tenant_dir).unwrap();
        fs::write(tenant_dir.join(SNAPSHOT_FILE), "not json").unwrap();

        assert!(store.load("123").is_err());
    }
}
