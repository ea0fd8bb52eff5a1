//! Persistent state storage.
//!
//! [`StateStore`] is the raw key-value capability supplied by the host;
//! [`LicenseStore`] layers the typed schema of every persisted key on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{LicenseError, Result};
use crate::models::LicenseRecord;
use crate::offline::{OfflineCache, ResponseCache};

/// Storage keys
pub mod keys {
    pub const LICENSE_KEY: &str = "licenseKey";
    pub const INSTANCE_ID: &str = "instanceId";
    pub const API_DATA: &str = "apiData";
    pub const LAST_VALIDATED: &str = "lastValidated";
    pub const VALID_UNTIL: &str = "validUntil";
    pub const OFFLINE_MODE: &str = "offlineMode";
    pub const API_CACHE: &str = "apiCache";
}

/// Durable key-value storage. A value set before process exit must be
/// readable after the next start.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;
}

fn poisoned() -> LicenseError {
    LicenseError::Storage("storage lock poisoned".into())
}

/// In-memory store
///
/// Useful for testing or ephemeral storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    store: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.store.read().map_err(|_| poisoned())?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.store
            .write()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.store.write().map_err(|_| poisoned())?.remove(key);
        Ok(())
    }
}

/// File-based store
///
/// Keeps every key in one JSON object, rewritten on each mutation.
pub struct FileStore {
    path: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl FileStore {
    /// Open the store in the platform data directory for `app_name`:
    /// - Linux: `~/.local/share/{app_name}/license.json`
    /// - macOS: `~/Library/Application Support/{app_name}/license.json`
    /// - Windows: `C:\Users\{User}\AppData\Roaming\{app_name}\license.json`
    pub fn for_app(app_name: &str) -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", app_name).ok_or_else(|| {
            LicenseError::Storage("could not determine a data directory".into())
        })?;
        Self::open(dirs.data_dir().join("license.json"))
    }

    /// Open (or create) the store at an explicit path.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LicenseError::Storage(format!("{}: {}", parent.display(), e)))?;
        }

        let cache = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| LicenseError::Storage(format!("{}: {}", path.display(), e)))?;
            serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "License store is corrupt, starting empty");
                HashMap::new()
            })
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the cache to a sibling temp file, then rename over the original.
    fn save(&self, cache: &HashMap<String, String>) -> Result<()> {
        let contents = serde_json::to_string_pretty(cache)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| LicenseError::Storage(format!("{}: {}", self.path.display(), e)))
    }
}

impl StateStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.read().map_err(|_| poisoned())?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut cache = self.cache.write().map_err(|_| poisoned())?;
        cache.insert(key.to_string(), value.to_string());
        self.save(&cache)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut cache = self.cache.write().map_err(|_| poisoned())?;
        if cache.remove(key).is_some() {
            self.save(&cache)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .finish()
    }
}

/// Typed view over a [`StateStore`], one accessor per persisted key.
#[derive(Clone)]
pub struct LicenseStore {
    inner: Arc<dyn StateStore>,
}

impl LicenseStore {
    pub fn new(inner: Arc<dyn StateStore>) -> Self {
        Self { inner }
    }

    pub fn license_key(&self) -> Result<Option<String>> {
        self.inner.get(keys::LICENSE_KEY)
    }

    pub fn instance_id(&self) -> Result<Option<String>> {
        self.inner.get(keys::INSTANCE_ID)
    }

    pub fn api_data(&self) -> Result<Option<serde_json::Value>> {
        self.get_json(keys::API_DATA)
    }

    pub fn last_validated(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_timestamp(keys::LAST_VALIDATED)
    }

    pub fn valid_until(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_timestamp(keys::VALID_UNTIL)
    }

    pub fn offline_mode(&self) -> Result<Option<OfflineCache>> {
        self.get_json(keys::OFFLINE_MODE)
    }

    pub fn set_offline_mode(&self, cache: &OfflineCache) -> Result<()> {
        self.set_json(keys::OFFLINE_MODE, cache)
    }

    pub fn api_cache(&self) -> Result<Option<ResponseCache>> {
        self.get_json(keys::API_CACHE)
    }

    pub fn set_api_cache(&self, cache: &ResponseCache) -> Result<()> {
        self.set_json(keys::API_CACHE, cache)
    }

    /// The bound license, if key and instance are both present.
    pub fn load_record(&self) -> Result<Option<LicenseRecord>> {
        let (Some(license_key), Some(instance_id)) = (self.license_key()?, self.instance_id()?)
        else {
            return Ok(None);
        };

        Ok(Some(LicenseRecord {
            license_key,
            instance_id,
            last_validated_at: self.last_validated()?,
            valid_until: self.valid_until()?,
            api_data: self.api_data()?.unwrap_or(serde_json::Value::Null),
        }))
    }

    /// Persist a full record. `licenseKey` goes last so a torn write never looks bound.
    pub fn save_record(&self, record: &LicenseRecord) -> Result<()> {
        self.set_json(keys::API_DATA, &record.api_data)?;
        match record.last_validated_at {
            Some(at) => self.inner.set(keys::LAST_VALIDATED, &at.to_rfc3339())?,
            None => self.inner.delete(keys::LAST_VALIDATED)?,
        }
        match record.valid_until {
            Some(until) => self.inner.set(keys::VALID_UNTIL, &until.to_rfc3339())?,
            None => self.inner.delete(keys::VALID_UNTIL)?,
        }
        self.inner.set(keys::INSTANCE_ID, &record.instance_id)?;
        self.inner.set(keys::LICENSE_KEY, &record.license_key)
    }

    /// Refresh the fields a successful validation updates.
    pub fn save_validation(
        &self,
        api_data: &serde_json::Value,
        validated_at: DateTime<Utc>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.set_json(keys::API_DATA, api_data)?;
        self.inner
            .set(keys::LAST_VALIDATED, &validated_at.to_rfc3339())?;
        match valid_until {
            Some(until) => self.inner.set(keys::VALID_UNTIL, &until.to_rfc3339()),
            None => self.inner.delete(keys::VALID_UNTIL),
        }
    }

    /// Erase the bound license. `licenseKey` goes first so trust is revoked
    /// even if a later delete fails.
    pub fn clear_record(&self) -> Result<()> {
        for key in [
            keys::LICENSE_KEY,
            keys::INSTANCE_ID,
            keys::API_DATA,
            keys::LAST_VALIDATED,
            keys::VALID_UNTIL,
        ] {
            self.inner.delete(key)?;
        }
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.inner.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "Ignoring unreadable persisted value");
                Ok(None)
            }
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.inner.set(key, &serde_json::to_string(value)?)
    }

    fn get_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.inner.get(key)? else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(ts) => Ok(Some(ts.with_timezone(&Utc))),
            Err(e) => {
                tracing::warn!(key, error = %e, "Ignoring unreadable persisted timestamp");
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for LicenseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseStore").finish_non_exhaustive()
    }
}
