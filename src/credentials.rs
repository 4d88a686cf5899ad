//! Credential storage with a degrading chain of backends.
//!
//! Access tokens are stored one record per configured instance. The platform
//! keychain is preferred; when it is unavailable (not installed, denied, or
//! unsupported) the store falls back to owner-only files under the per-user
//! configuration directory. The backend is selected once at startup and used
//! for every subsequent operation, so reads and writes never split across
//! backends within one process run.

use std::fs;
use std::path::PathBuf;

use dirs::config_dir;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const KEYRING_SERVICE: &str = "lmcli";
pub const CREDENTIALS_DIR_NAME: &str = "credentials";

#[derive(Debug, Error)]
pub enum CredentialError {
    /// No credential is stored for the instance; the user must log in.
    #[error("not authenticated for instance {instance:?}, please run `lmcli login`")]
    NotAuthenticated { instance: String },
    /// The selected backend itself failed.
    #[error("credential storage failure: {0}")]
    Backend(String),
    #[error("failed to resolve the configuration directory")]
    NoConfigDirectory,
}

/// A stored access token for one instance.
///
/// The token value is deliberately excluded from `Debug` output so it cannot
/// leak through logs or panic messages.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    pub instance: String,
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl Credential {
    pub fn new(instance: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            access_token: access_token.into(),
            expires_at: None,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("instance", &self.instance)
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// One storage backend. `load` returns `Ok(None)` for "no record", which the
/// store maps to [`CredentialError::NotAuthenticated`]; backend faults come
/// back as errors.
pub trait CredentialBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn save(&self, credential: &Credential) -> Result<(), CredentialError>;
    fn load(&self, instance: &str) -> Result<Option<Credential>, CredentialError>;
    fn delete(&self, instance: &str) -> Result<(), CredentialError>;
}

/// Platform-native keychain backend.
pub struct KeyringBackend;

impl KeyringBackend {
    /// Probe whether the keychain is usable at all. The probe only reads; a
    /// missing entry proves the backend works.
    pub fn probe() -> Result<Self, CredentialError> {
        let entry = Entry::new(KEYRING_SERVICE, "__probe__")
            .map_err(|e| CredentialError::Backend(e.to_string()))?;
        match entry.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(Self),
            Err(e) => Err(CredentialError::Backend(e.to_string())),
        }
    }

    fn entry(instance: &str) -> Result<Entry, CredentialError> {
        Entry::new(KEYRING_SERVICE, instance)
            .map_err(|e| CredentialError::Backend(e.to_string()))
    }
}

impl CredentialBackend for KeyringBackend {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn save(&self, credential: &Credential) -> Result<(), CredentialError> {
        let record = serde_json::to_string(credential)
            .map_err(|e| CredentialError::Backend(e.to_string()))?;
        Self::entry(&credential.instance)?
            .set_password(&record)
            .map_err(|e| CredentialError::Backend(e.to_string()))
    }

    fn load(&self, instance: &str) -> Result<Option<Credential>, CredentialError> {
        match Self::entry(instance)?.get_password() {
            Ok(record) => {
                let credential = serde_json::from_str(&record)
                    .map_err(|e| CredentialError::Backend(e.to_string()))?;
                Ok(Some(credential))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CredentialError::Backend(e.to_string())),
        }
    }

    fn delete(&self, instance: &str) -> Result<(), CredentialError> {
        match Self::entry(instance)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialError::Backend(e.to_string())),
        }
    }
}

/// On-disk fallback backend: one JSON file per instance under the per-user
/// configuration directory, restricted to owner-only permissions.
pub struct FileBackend {
    directory: PathBuf,
}

impl FileBackend {
    pub fn new() -> Result<Self, CredentialError> {
        let mut directory = config_dir().ok_or(CredentialError::NoConfigDirectory)?;
        directory.push(crate::configuration::DEFAULT_APPLICATION_ID);
        directory.push(CREDENTIALS_DIR_NAME);
        Ok(Self { directory })
    }

    /// A backend rooted at an explicit directory, for tests.
    pub fn with_directory(directory: PathBuf) -> Self {
        Self { directory }
    }

    fn record_path(&self, instance: &str) -> PathBuf {
        self.directory.join(format!("{}.json", instance))
    }

    #[cfg(unix)]
    fn restrict_permissions(path: &PathBuf) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
    }

    #[cfg(not(unix))]
    fn restrict_permissions(_path: &PathBuf) -> std::io::Result<()> {
        Ok(())
    }
}

impl CredentialBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn save(&self, credential: &Credential) -> Result<(), CredentialError> {
        fs::create_dir_all(&self.directory)
            .map_err(|e| CredentialError::Backend(e.to_string()))?;
        let path = self.record_path(&credential.instance);
        let record = serde_json::to_string_pretty(credential)
            .map_err(|e| CredentialError::Backend(e.to_string()))?;
        fs::write(&path, record).map_err(|e| CredentialError::Backend(e.to_string()))?;
        Self::restrict_permissions(&path).map_err(|e| CredentialError::Backend(e.to_string()))
    }

    fn load(&self, instance: &str) -> Result<Option<Credential>, CredentialError> {
        let path = self.record_path(instance);
        match fs::read_to_string(&path) {
            Ok(record) => {
                let credential = serde_json::from_str(&record)
                    .map_err(|e| CredentialError::Backend(e.to_string()))?;
                Ok(Some(credential))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CredentialError::Backend(e.to_string())),
        }
    }

    fn delete(&self, instance: &str) -> Result<(), CredentialError> {
        match fs::remove_file(self.record_path(instance)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CredentialError::Backend(e.to_string())),
        }
    }
}

/// The credential store, bound to the backend selected at startup.
pub struct CredentialStore {
    backend: Box<dyn CredentialBackend>,
}

impl CredentialStore {
    /// Try each backend constructor in order and bind to the first that
    /// works: keychain first, owner-only files second. The selection is made
    /// once; all later operations go through the same backend.
    pub fn detect() -> Result<Self, CredentialError> {
        match KeyringBackend::probe() {
            Ok(backend) => {
                debug!("using keyring credential backend");
                Ok(Self { backend: Box::new(backend) })
            }
            Err(e) => {
                warn!("keyring unavailable ({}), falling back to file storage", e);
                Ok(Self { backend: Box::new(FileBackend::new()?) })
            }
        }
    }

    /// Bind to an explicit backend. Tests use this to force a failing
    /// primary or to root the file backend in a temporary directory.
    pub fn with_backend(backend: Box<dyn CredentialBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn save(&self, credential: &Credential) -> Result<(), CredentialError> {
        debug!(instance = %credential.instance, backend = self.backend.name(), "saving credential");
        self.backend.save(credential)
    }

    /// Load the credential for `instance`, distinguishing "never logged in"
    /// from a broken backend.
    pub fn load(&self, instance: &str) -> Result<Credential, CredentialError> {
        match self.backend.load(instance)? {
            Some(credential) => Ok(credential),
            None => Err(CredentialError::NotAuthenticated {
                instance: instance.to_string(),
            }),
        }
    }

    pub fn delete(&self, instance: &str) -> Result<(), CredentialError> {
        debug!(instance, backend = self.backend.name(), "deleting credential");
        self.backend.delete(instance)
    }
}
