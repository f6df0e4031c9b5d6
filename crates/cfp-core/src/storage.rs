//! Durable session token storage.
//!
//! The session is persisted as a single `auth_token` key in
//! `<CFP_HOME>/credentials.json` with restricted permissions (0600).
//! Tokens are never logged or displayed in full.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};

use crate::config::paths;

/// Key under which the bearer token is stored.
pub const TOKEN_KEY: &str = "auth_token";

/// Persisted bearer token. Absence means logged out.
///
/// Both the HTTP client and the auth store hold the same instance so they
/// agree on where the token lives and what clearing means.
pub trait TokenStorage: Send + Sync {
    /// Returns the stored token, if any.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be read.
    fn load(&self) -> Result<Option<String>>;

    /// Persists `token`, replacing any previous value.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn save(&self, token: &str) -> Result<()>;

    /// Removes the stored token. Clearing an empty store is not an error.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn clear(&self) -> Result<()>;
}

/// File-backed storage (JSON map, one key).
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Storage at the default credentials path under CFP_HOME.
    pub fn default_location() -> Self {
        Self::new(paths::credentials_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read credentials from {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse credentials from {}", self.path.display()))
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents =
            serde_json::to_string_pretty(map).context("Failed to serialize credentials")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.path)
                .with_context(|| format!("Failed to open {} for writing", self.path.display()))?;
            file.write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        }

        #[cfg(not(unix))]
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.path)
                .with_context(|| format!("Failed to open {} for writing", self.path.display()))?;
            file.write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        }

        Ok(())
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Result<Option<String>> {
        let map = self.read_map()?;
        Ok(map
            .get(TOKEN_KEY)
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty()))
    }

    fn save(&self, token: &str) -> Result<()> {
        let mut map = self.read_map().unwrap_or_default();
        map.insert(TOKEN_KEY.to_string(), token.to_string());
        self.write_map(&map)
    }

    fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        // An unreadable file is replaced rather than left behind.
        let mut map = self.read_map().unwrap_or_default();
        map.remove(TOKEN_KEY);
        self.write_map(&map)
    }
}

/// In-process storage for embedders and tests.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Result<Option<String>> {
        let guard = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.clone())
    }

    fn save(&self, token: &str) -> Result<()> {
        let mut guard = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
        Ok(())
    }
}

/// Masks a token for display, keeping a short prefix.
pub fn mask_token(token: &str) -> String {
    if token.chars().count() > 12 {
        let prefix: String = token.chars().take(8).collect();
        format!("{prefix}...")
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_file_storage_roundtrip_and_clear() {
        let dir = tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path().join("credentials.json"));

        assert_eq!(storage.load().unwrap(), None);

        storage.save("token-123").unwrap();
        assert_eq!(storage.load().unwrap().as_deref(), Some("token-123"));

        let raw = fs::read_to_string(storage.path()).unwrap();
        assert!(raw.contains(TOKEN_KEY));

        storage.clear().unwrap();
        assert_eq!(storage.load().unwrap(), None);
    }

    #[test]
    fn test_clear_without_file_is_ok() {
        let dir = tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path().join("missing.json"));
        storage.clear().unwrap();
        assert!(!storage.path().exists());
    }

    #[test]
    fn test_blank_token_reads_as_logged_out() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, r#"{"auth_token": "  "}"#).unwrap();
        assert_eq!(FileTokenStorage::new(path).load().unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_storage_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path().join("credentials.json"));
        storage.save("secret").unwrap();

        let mode = fs::metadata(storage.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryTokenStorage::with_token("T");
        assert_eq!(storage.load().unwrap().as_deref(), Some("T"));
        storage.clear().unwrap();
        assert_eq!(storage.load().unwrap(), None);
    }

    #[test]
    fn test_memory_storage_survives_poisoned_lock() {
        let storage = std::sync::Arc::new(MemoryTokenStorage::with_token("T"));
        let poisoner = std::sync::Arc::clone(&storage);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.token.lock().unwrap();
            panic!("poison the lock");
        })
        .join();
        assert!(storage.token.is_poisoned());

        assert_eq!(storage.load().unwrap().as_deref(), Some("T"));
        storage.save("U").unwrap();
        assert_eq!(storage.load().unwrap().as_deref(), Some("U"));
        storage.clear().unwrap();
        assert_eq!(storage.load().unwrap(), None);
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("1|abcdefghijklmnop"), "1|abcdef...");
        assert_eq!(mask_token("short"), "***");
    }
}
