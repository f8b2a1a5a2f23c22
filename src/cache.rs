//! Token cache shared by the OAuth-based credentials
//!
//! Entries are keyed by `(client_id, tenant, scope)`. Disk entries live under
//! `<config_dir>/tokens/` as one JSON file per key, named by the SHA-256 of
//! the key. Memory entries live in a process-wide map and disappear with the
//! process.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{LazyLock, Mutex};

use crate::error::{AuthError, Result};
use crate::types::Token;

static MEMORY: LazyLock<Mutex<HashMap<CacheKey, Token>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Write a file readable by the owner only, from the moment it exists
#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies on creation
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents)?;
    Ok(())
}

/// Where cached tokens are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Persist tokens to disk so they survive restarts
    #[default]
    Disk,
    /// Keep tokens in process memory only
    Memory,
}

impl FromStr for CacheMode {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disk" => Ok(Self::Disk),
            "memory" => Ok(Self::Memory),
            other => Err(AuthError::validation(format!(
                "unknown cache mode '{other}', expected 'disk' or 'memory'"
            ))),
        }
    }
}

/// Identity of a cached token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Client (application) ID
    pub client_id: String,
    /// Tenant ID
    pub tenant_id: String,
    /// Requested scope string
    pub scope: String,
}

impl CacheKey {
    /// Create a cache key
    pub fn new(
        client_id: impl Into<String>,
        tenant_id: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            tenant_id: tenant_id.into(),
            scope: scope.into(),
        }
    }

    /// Stable hex digest used as file name and map key
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.client_id.as_bytes());
        hasher.update([0]);
        hasher.update(self.tenant_id.as_bytes());
        hasher.update([0]);
        hasher.update(self.scope.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Token cache for a single storage mode
#[derive(Debug, Clone)]
pub struct TokenCache {
    mode: CacheMode,
    dir: PathBuf,
}

impl TokenCache {
    /// Create a cache; `config_dir` is only used in disk mode
    #[must_use]
    pub fn new(mode: CacheMode, config_dir: &Path) -> Self {
        Self {
            mode,
            dir: config_dir.join("tokens"),
        }
    }

    /// Process-wide in-memory cache
    #[must_use]
    pub fn memory() -> Self {
        Self {
            mode: CacheMode::Memory,
            dir: PathBuf::new(),
        }
    }

    /// Storage mode of this cache
    #[must_use]
    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.digest()))
    }

    /// Load a token regardless of expiry
    ///
    /// # Errors
    ///
    /// Returns an error if a disk entry exists but cannot be read or parsed.
    pub fn load(&self, key: &CacheKey) -> Result<Option<Token>> {
        match self.mode {
            CacheMode::Memory => {
                let map = MEMORY
                    .lock()
                    .map_err(|_| AuthError::cache("memory cache lock poisoned"))?;
                Ok(map.get(key).cloned())
            }
            CacheMode::Disk => {
                let path = self.path_for(key);
                if !path.exists() {
                    return Ok(None);
                }
                let content = std::fs::read_to_string(&path)?;
                let token = serde_json::from_str(&content).map_err(|e| {
                    AuthError::cache(format!("corrupt cache entry {}: {e}", path.display()))
                })?;
                Ok(Some(token))
            }
        }
    }

    /// Load a token only if it has not expired
    ///
    /// Read failures are logged and treated as a miss.
    #[must_use]
    pub fn load_valid(&self, key: &CacheKey) -> Option<Token> {
        match self.load(key) {
            Ok(Some(token)) if !token.is_expired() => Some(token),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Ignoring unreadable token cache entry: {e}");
                None
            }
        }
    }

    /// Store a token
    ///
    /// # Errors
    ///
    /// Returns an error if the disk entry cannot be written.
    pub fn save(&self, key: &CacheKey, token: &Token) -> Result<()> {
        match self.mode {
            CacheMode::Memory => {
                let mut map = MEMORY
                    .lock()
                    .map_err(|_| AuthError::cache("memory cache lock poisoned"))?;
                map.insert(key.clone(), token.clone());
            }
            CacheMode::Disk => {
                create_private_dir(&self.dir)?;
                write_private(&self.path_for(key), serde_json::to_string_pretty(token)?.as_bytes())?;
            }
        }
        Ok(())
    }

    /// Drop every in-memory entry issued to `client_id`
    ///
    /// Returns the number of entries removed. Disk entries are named by
    /// digest only and are left alone.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Cache` if the memory cache lock is poisoned.
    pub fn forget_client(&self, client_id: &str) -> Result<usize> {
        if self.mode != CacheMode::Memory {
            return Ok(0);
        }
        let mut map = MEMORY
            .lock()
            .map_err(|_| AuthError::cache("memory cache lock poisoned"))?;
        let before = map.len();
        map.retain(|key, _| key.client_id != client_id);
        Ok(before - map.len())
    }

    /// Remove a token
    ///
    /// # Errors
    ///
    /// Returns an error if the disk entry exists but cannot be deleted.
    pub fn delete(&self, key: &CacheKey) -> Result<()> {
        match self.mode {
            CacheMode::Memory => {
                let mut map = MEMORY
                    .lock()
                    .map_err(|_| AuthError::cache("memory cache lock poisoned"))?;
                map.remove(key);
            }
            CacheMode::Disk => {
                let path = self.path_for(key);
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fresh_token(access: &str) -> Token {
        Token::expiring_in(access, None, 3600, None)
    }

    #[test]
    fn test_disk_save_load_delete() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(CacheMode::Disk, dir.path());
        let key = CacheKey::new("client", "tenant", "scope/.default");

        assert!(cache.load(&key).unwrap().is_none());
        cache.save(&key, &fresh_token("disk-token")).unwrap();
        assert_eq!(cache.load_valid(&key).unwrap().access_token, "disk-token");

        cache.delete(&key).unwrap();
        assert!(cache.load(&key).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_disk_entry_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(CacheMode::Disk, dir.path());
        let key = CacheKey::new("client", "tenant", "perm");
        cache.save(&key, &fresh_token("t")).unwrap();

        let mode = std::fs::metadata(cache.path_for(&key)).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let dir_mode = std::fs::metadata(dir.path().join("tokens")).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_loose_entry_is_tightened() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(CacheMode::Disk, dir.path());
        let key = CacheKey::new("client", "tenant", "loose");
        std::fs::create_dir_all(dir.path().join("tokens")).unwrap();
        let path = cache.path_for(&key);
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        cache.save(&key, &fresh_token("t")).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(cache.load_valid(&key).unwrap().access_token, "t");
    }

    #[test]
    fn test_forget_client_drops_only_that_client() {
        let cache = TokenCache::memory();
        let mine = CacheKey::new("forget-test-client", "tenant", "s1");
        let mine_too = CacheKey::new("forget-test-client", "tenant", "s2");
        let other = CacheKey::new("forget-test-other", "tenant", "s1");
        for key in [&mine, &mine_too, &other] {
            cache.save(key, &fresh_token("t")).unwrap();
        }

        assert_eq!(cache.forget_client("forget-test-client").unwrap(), 2);
        assert!(cache.load(&mine).unwrap().is_none());
        assert!(cache.load(&mine_too).unwrap().is_none());
        assert!(cache.load(&other).unwrap().is_some());
    }

    #[test]
    fn test_memory_keys_are_distinct() {
        let cache = TokenCache::memory();
        let a = CacheKey::new("cache-test-client", "tenant-a", "s");
        let b = CacheKey::new("cache-test-client", "tenant-b", "s");

        cache.save(&a, &fresh_token("for-a")).unwrap();
        assert_eq!(cache.load_valid(&a).unwrap().access_token, "for-a");
        assert!(cache.load_valid(&b).is_none());
    }

    #[test]
    fn test_expired_entry_is_not_valid() {
        let cache = TokenCache::memory();
        let key = CacheKey::new("cache-test-client", "expired", "s");
        cache.save(&key, &Token::new("old", "Bearer", 1, None)).unwrap();

        assert!(cache.load_valid(&key).is_none());
        assert!(cache.load(&key).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(CacheMode::Disk, dir.path());
        let key = CacheKey::new("c", "t", "s");
        std::fs::create_dir_all(dir.path().join("tokens")).unwrap();
        std::fs::write(cache.path_for(&key), "not json").unwrap();

        assert!(matches!(cache.load(&key), Err(AuthError::Cache(_))));
        assert!(cache.load_valid(&key).is_none());
    }

    #[test]
    fn test_cache_mode_from_str() {
        assert_eq!("Memory".parse::<CacheMode>().unwrap(), CacheMode::Memory);
        assert!("redis".parse::<CacheMode>().is_err());
    }
}
