use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;

use crate::error::StoreError;

/// Identifies whose records are being accessed. Always supplied by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Scope(String);

pub const ANONYMOUS_SCOPE: &str = "anonymous";

impl Scope {
    /// Builds a scope from a user identifier. Lowercase ASCII letters, digits
    /// and `-` pass through; every other byte, `_` included, becomes `_xx`
    /// (lowercase hex). The encoding is reversible, so distinct users never
    /// share a scope, and it survives case-insensitive filesystems.
    /// A blank identifier maps to the anonymous scope.
    pub fn new(user: &str) -> Self {
        if user.trim().is_empty() {
            return Scope(ANONYMOUS_SCOPE.to_string());
        }

        let mut encoded = String::with_capacity(user.len());
        for byte in user.bytes() {
            if byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-' {
                encoded.push(byte as char);
            } else {
                encoded.push_str(&format!("_{:02x}", byte));
            }
        }
        Scope(encoded)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw key/value persistence, partitioned by scope. Values are JSON text.
///
/// `get` distinguishes absence (`Ok(None)`) from failure (`Err`). Callers in
/// the pipeline core collapse both to "absent"; the distinction exists for
/// logging.
pub trait Storage: Send + Sync {
    fn get(&self, scope: &Scope, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, scope: &Scope, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, scope: &Scope, key: &str) -> Result<(), StoreError>;
    fn keys(&self, scope: &Scope) -> Result<Vec<String>, StoreError>;
}

// --- In-memory backend ---

#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<Scope, BTreeMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Scope, BTreeMap<String, String>>>, StoreError>
    {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory storage mutex poisoned".to_string()))
    }
}

impl Storage for MemoryStorage {
    fn get(&self, scope: &Scope, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .lock()?
            .get(scope)
            .and_then(|records| records.get(key))
            .cloned())
    }

    fn set(&self, scope: &Scope, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?
            .entry(scope.clone())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, scope: &Scope, key: &str) -> Result<(), StoreError> {
        if let Some(records) = self.lock()?.get_mut(scope) {
            records.remove(key);
        }
        Ok(())
    }

    fn keys(&self, scope: &Scope) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()?
            .get(scope)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default())
    }
}

// --- File backend ---

const RECORD_EXTENSION: &str = "json";

/// One JSON file per record at `<root>/<scope>/<key>.json`.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn scope_dir(&self, scope: &Scope) -> PathBuf {
        self.root.join(scope.as_str())
    }

    fn record_path(&self, scope: &Scope, key: &str) -> PathBuf {
        self.scope_dir(scope)
            .join(format!("{}.{}", key, RECORD_EXTENSION))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl Storage for FileStorage {
    fn get(&self, scope: &Scope, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.record_path(scope, key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    /// Write-temp-sync-rename so a record is either the old or the new
    /// version, never partial.
    fn set(&self, scope: &Scope, key: &str, value: &str) -> Result<(), StoreError> {
        let dir = self.scope_dir(scope);
        let path = self.record_path(scope, key);

        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;

        let temp_file = NamedTempFile::new_in(&dir).map_err(|e| io_error(&dir, e))?;
        fs::write(temp_file.path(), value).map_err(|e| io_error(temp_file.path(), e))?;

        let file = fs::File::open(temp_file.path()).map_err(|e| io_error(temp_file.path(), e))?;
        file.sync_all().map_err(|e| io_error(temp_file.path(), e))?;

        temp_file
            .persist(&path)
            .map_err(|e| io_error(&path, e.error))?;

        Ok(())
    }

    fn remove(&self, scope: &Scope, key: &str) -> Result<(), StoreError> {
        let path = self.record_path(scope, key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    fn keys(&self, scope: &Scope) -> Result<Vec<String>, StoreError> {
        let dir = self.scope_dir(scope);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&dir, e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_escapes_unsafe_characters() {
        assert_eq!(Scope::new("user@example.com").as_str(), "user_40example_2ecom");
        assert_eq!(Scope::new("../etc").as_str(), "_2e_2e_2fetc");
        assert_eq!(Scope::new("   ").as_str(), ANONYMOUS_SCOPE);
        assert_eq!(Scope::new("u-42_a").as_str(), "u-42_5fa");
        assert_eq!(Scope::new("Bob").as_str(), "_42ob");
    }

    #[test]
    fn distinct_users_never_share_a_scope() {
        let users = [
            "a.b",
            "a_b",
            "a_2eb",
            "user@example.com",
            "user_example_com",
            "Alice",
            "alice",
            "ünï",
            "_c3_bcn_c3_af",
        ];
        for (i, a) in users.iter().enumerate() {
            for b in &users[i + 1..] {
                assert_ne!(Scope::new(a), Scope::new(b), "{} and {} collide", a, b);
            }
        }
    }

    #[test]
    fn memory_storage_partitions_by_scope() {
        let storage = MemoryStorage::new();
        let alice = Scope::new("alice");
        let bob = Scope::new("bob");

        storage.set(&alice, "k", "1").unwrap();
        assert_eq!(storage.get(&alice, "k").unwrap().as_deref(), Some("1"));
        assert_eq!(storage.get(&bob, "k").unwrap(), None);

        storage.remove(&alice, "k").unwrap();
        assert_eq!(storage.get(&alice, "k").unwrap(), None);
        assert!(storage.keys(&alice).unwrap().is_empty());
    }
}
