use crate::error::{Result, SwitchError};
use crate::i18n::{LanguageCatalog, LanguageCode};
use crate::location::LocationInfo;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Durable string key-value storage
pub trait PreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    /// Remove several keys in one change; either all go or none do
    fn remove_all(&self, keys: &[&str]) -> Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| SwitchError::Storage("store lock poisoned".to_string()))
}

/// In-process store, lost when dropped. Clones share the same values.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.values)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.values)?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.values)?.remove(key);
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let mut values = lock(&self.values)?;
        for key in keys {
            values.remove(*key);
        }
        Ok(())
    }
}

/// Store backed by a JSON object on disk, rewritten on every change
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    values: Arc<Mutex<BTreeMap<String, String>>>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    SwitchError::Storage(format!("{} is not a valid store: {}", path.display(), e))
                })?
            }
        } else {
            BTreeMap::new()
        };

        debug!("Opened preference store at {} ({} keys)", path.display(), values.len());

        Ok(Self {
            path,
            values: Arc::new(Mutex::new(values)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `values` to a sibling temp file, then move it over the store
    fn persist(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(values)?;

        let mut temp_name = self.path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".tmp");
        let temp_path = self.path.with_file_name(temp_name);

        fs::write(&temp_path, content)?;
        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Apply `change` to a copy of the values and keep it only once it is on disk
    fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let mut values = lock(&self.values)?;
        let mut updated = values.clone();
        if !change(&mut updated) {
            return Ok(());
        }
        self.persist(&updated)?;
        *values = updated;
        Ok(())
    }
}

impl PreferenceStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.values)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|values| values.remove(key).is_some())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        self.update(|values| {
            let mut removed = false;
            for key in keys {
                removed |= values.remove(*key).is_some();
            }
            removed
        })
    }
}

/// Names of the persisted keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub preferred_language: String,
    pub recommendation_declined: String,
    pub user_location: String,
    pub last_visit: String,
}

impl StorageKeys {
    pub fn new(prefix: &str) -> Self {
        Self {
            preferred_language: format!("{}-preferred-language", prefix),
            recommendation_declined: format!("{}-language-recommendation-declined", prefix),
            user_location: format!("{}-user-location", prefix),
            last_visit: format!("{}-last-visit", prefix),
        }
    }

    pub fn all(&self) -> [&str; 4] {
        [
            &self.preferred_language,
            &self.recommendation_declined,
            &self.user_location,
            &self.last_visit,
        ]
    }
}

/// The visitor's durable choices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedPreference {
    pub language_code: Option<LanguageCode>,
    pub declined_recommendation: bool,
    pub last_visit: Option<DateTime<Utc>>,
}

/// Typed access to the persisted keys of one store
#[derive(Debug, Clone)]
pub struct Preferences<S: PreferenceStore> {
    store: S,
    keys: StorageKeys,
}

impl<S: PreferenceStore> Preferences<S> {
    pub fn new(store: S, keys: StorageKeys) -> Self {
        Self { store, keys }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    /// Raw stored language, unvalidated. Blank values count as absent.
    pub fn stored_language(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .get(&self.keys.preferred_language)?
            .filter(|value| !value.trim().is_empty()))
    }

    pub fn declined(&self) -> Result<bool> {
        Ok(self
            .store
            .get(&self.keys.recommendation_declined)?
            .is_some_and(|value| value == "true"))
    }

    /// Cached location; an unreadable cache counts as absent
    pub fn cached_location(&self) -> Result<Option<LocationInfo>> {
        let Some(raw) = self.store.get(&self.keys.user_location)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(location) => Ok(Some(location)),
            Err(e) => {
                warn!("Ignoring unreadable cached location: {}", e);
                Ok(None)
            }
        }
    }

    pub fn last_visit(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.store.get(&self.keys.last_visit)? else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(timestamp) => Ok(Some(timestamp.with_timezone(&Utc))),
            Err(e) => {
                warn!("Ignoring unreadable last visit '{}': {}", raw, e);
                Ok(None)
            }
        }
    }

    /// Read the whole preference, dropping a stored code the catalog no longer has
    pub fn load(&self, catalog: &LanguageCatalog) -> Result<PersistedPreference> {
        let language_code = match self.stored_language()? {
            Some(raw) => match LanguageCode::from_code(catalog, &raw) {
                Ok(code) => Some(code),
                Err(_) => {
                    warn!("Stored language '{}' is not supported, ignoring it", raw);
                    None
                }
            },
            None => None,
        };

        Ok(PersistedPreference {
            language_code,
            declined_recommendation: self.declined()?,
            last_visit: self.last_visit()?,
        })
    }

    /// Write every field of `preference`; absent fields leave their key alone
    pub fn save(&self, preference: &PersistedPreference) -> Result<()> {
        if let Some(code) = preference.language_code {
            self.save_language(code)?;
        }
        if preference.declined_recommendation {
            self.store.set(&self.keys.recommendation_declined, "true")?;
        } else {
            self.store.remove(&self.keys.recommendation_declined)?;
        }
        if let Some(timestamp) = preference.last_visit {
            self.touch_last_visit(timestamp)?;
        }
        Ok(())
    }

    pub fn save_language(&self, code: LanguageCode) -> Result<()> {
        self.store.set(&self.keys.preferred_language, code.code())
    }

    pub fn save_location(&self, location: &LocationInfo) -> Result<()> {
        let json = serde_json::to_string(location)?;
        self.store.set(&self.keys.user_location, &json)
    }

    pub fn touch_last_visit(&self, now: DateTime<Utc>) -> Result<()> {
        self.store.set(&self.keys.last_visit, &now.to_rfc3339())
    }

    /// Remove every persisted key in a single store change
    pub fn reset_all(&self) -> Result<()> {
        self.store.remove_all(&self.keys.all())?;
        info!("Language preferences reset");
        Ok(())
    }
}
