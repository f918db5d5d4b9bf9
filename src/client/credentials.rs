//! Local credential persistence and access-mode gating.
//!
//! One key, one file: `<config_dir>/edgequake-ocr/api_key`. The directory can
//! be moved with `OCR_RELAY_CONFIG_DIR`, which tests use to stay hermetic.

use crate::config::redact_key;
use crate::error::ClientError;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the credential directory.
pub const CONFIG_DIR_ENV: &str = "OCR_RELAY_CONFIG_DIR";

const APP_DIR: &str = "edgequake-ocr";
const KEY_FILE: &str = "api_key";

/// File-backed store for a single provider credential.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store the key file inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(KEY_FILE),
        }
    }

    /// `$OCR_RELAY_CONFIG_DIR`, else the platform config directory.
    ///
    /// Returns `None` only when the platform has no config directory.
    pub fn default_location() -> Option<Self> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
            return Some(Self::in_dir(dir));
        }
        dirs::config_dir().map(|d| Self::in_dir(d.join(APP_DIR)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored key. A missing or blank file yields `None`.
    pub fn load(&self) -> Result<Option<String>, ClientError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => {
                let key = raw.trim();
                Ok((!key.is_empty()).then(|| key.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(self.store_error(source)),
        }
    }

    /// Persist `key`, replacing any previous one.
    pub fn save(&self, key: &str) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.store_error(e))?;
        }
        std::fs::write(&self.path, key.trim()).map_err(|e| self.store_error(e))?;
        restrict_permissions(&self.path).map_err(|e| self.store_error(e))?;
        debug!("Saved key {} to {}", redact_key(key), self.path.display());
        Ok(())
    }

    /// Remove the stored key. Clearing an empty store is not an error.
    pub fn clear(&self) -> Result<(), ClientError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Cleared stored key at {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.store_error(source)),
        }
    }

    fn store_error(&self, source: std::io::Error) -> ClientError {
        ClientError::CredentialStore {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// How the client is allowed to submit.
#[derive(Clone, PartialEq, Eq)]
pub enum AccessMode {
    /// Real submissions with this provider key.
    Credential(String),
    /// Canned results, no network.
    TestMode,
}

impl AccessMode {
    /// Decide the mode from, in order: test mode, an explicit key, the store.
    ///
    /// Choosing test mode clears the stored key.
    pub fn resolve(
        explicit_key: Option<&str>,
        test_mode: bool,
        store: Option<&CredentialStore>,
    ) -> Result<Self, ClientError> {
        if test_mode {
            if let Some(store) = store {
                store.clear()?;
            }
            return Ok(AccessMode::TestMode);
        }
        if let Some(key) = explicit_key.map(str::trim).filter(|k| !k.is_empty()) {
            return Ok(AccessMode::Credential(key.to_string()));
        }
        match store {
            Some(store) => store
                .load()?
                .map(AccessMode::Credential)
                .ok_or(ClientError::NoCredential),
            None => Err(ClientError::NoCredential),
        }
    }

    pub fn is_test_mode(&self) -> bool {
        matches!(self, AccessMode::TestMode)
    }

    pub fn credential(&self) -> Option<&str> {
        match self {
            AccessMode::Credential(key) => Some(key),
            AccessMode::TestMode => None,
        }
    }
}

impl fmt::Debug for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Credential(key) => f
                .debug_tuple("Credential")
                .field(&redact_key(key))
                .finish(),
            AccessMode::TestMode => f.write_str("TestMode"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path().join("nested"));

        assert_eq!(store.load().unwrap(), None);
        store.save("  sk-abcdef\n").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("sk-abcdef"));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn blank_file_is_no_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        std::fs::write(store.path(), "   \n").unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_mode_clears_stored_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        store.save("sk-stored").unwrap();

        let mode = AccessMode::resolve(None, true, Some(&store)).unwrap();
        assert!(mode.is_test_mode());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn explicit_key_wins_over_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        store.save("sk-stored").unwrap();

        let mode = AccessMode::resolve(Some("sk-flag"), false, Some(&store)).unwrap();
        assert_eq!(mode.credential(), Some("sk-flag"));

        let mode = AccessMode::resolve(Some("  "), false, Some(&store)).unwrap();
        assert_eq!(mode.credential(), Some("sk-stored"));
    }

    #[test]
    fn no_key_anywhere() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        assert!(matches!(
            AccessMode::resolve(None, false, Some(&store)),
            Err(ClientError::NoCredential)
        ));
        assert!(matches!(
            AccessMode::resolve(None, false, None),
            Err(ClientError::NoCredential)
        ));
    }

    #[test]
    fn debug_redacts_key() {
        let shown = format!("{:?}", AccessMode::Credential("sk-very-secret".into()));
        assert!(!shown.contains("very-secret"), "got: {shown}");
    }
}
