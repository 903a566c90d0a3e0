//! Credential storage for remote cache providers

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, instrument, warn};

/// Key under which the GitHub personal access token is stored
pub const GITHUB_TOKEN_KEY: &str = "github-token";

/// Persistent key/value store for secrets
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> io::Result<()>;

    /// Remove a value; removing a missing key is not an error
    fn remove(&self, key: &str) -> io::Result<()>;
}

/// Asks the user for a token when none is stored
pub trait TokenPrompt: Send + Sync {
    /// Returns `None` when the user declines or no terminal is attached
    fn prompt(&self, message: &str) -> Option<String>;
}

/// Credentials persisted as a JSON object on disk
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the rnef state directory
    pub fn default_location() -> Self {
        Self::new(rnef_core::config::defaults::state_dir().join("credentials.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> BTreeMap<String, String> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };
        match serde_json::from_str(&content) {
            Ok(values) => values,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable credential file");
                BTreeMap::new()
            }
        }
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(values).map_err(io::Error::other)?;
        fs::write(&self.path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_all().remove(key)
    }

    #[instrument(skip(self, value), fields(path = %self.path.display()))]
    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        let mut values = self.read_all();
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)?;
        debug!(key, "credential stored");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn remove(&self, key: &str) -> io::Result<()> {
        let mut values = self.read_all();
        if values.remove(key).is_some() {
            self.write_all(&values)?;
            debug!(key, "credential removed");
        }
        Ok(())
    }
}

/// In-memory credential store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: &str) -> Self {
        self.lock().insert(key.to_string(), value.to_string());
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}
