use std::collections::HashMap;
#[cfg(not(target_arch = "wasm32"))]
use std::fs;
#[cfg(not(target_arch = "wasm32"))]
use std::io::{ErrorKind, Write};
#[cfg(not(target_arch = "wasm32"))]
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::access::errors::AccessError;
use crate::access::types::{
    AccessPolicy, ContentModule, DashboardPolicy, Level, LevelPolicies, ModuleSwitch, PolicyKey,
};

/// Durable string key-value storage holding JSON-encoded policy documents.
///
/// Implementations must be synchronous: evaluation happens inline on the
/// caller's thread with no suspension points.
pub trait KeyValueStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, AccessError>;
    fn write(&self, key: &str, value: &str) -> Result<(), AccessError>;
    fn remove(&self, key: &str) -> Result<(), AccessError>;
}

/// Process-local store. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, AccessError> {
        let entries = self.entries.read().map_err(|_| AccessError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), AccessError> {
        let mut entries = self.entries.write().map_err(|_| AccessError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AccessError> {
        let mut entries = self.entries.write().map_err(|_| AccessError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key under a directory.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileStore {
    /// Open (and create if missing) the store directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, AccessError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| AccessError::Storage {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, AccessError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AccessError::UnknownPolicyKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>, AccessError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(AccessError::Storage {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), AccessError> {
        let path = self.path_for(key)?;
        let storage_err = |source: std::io::Error| AccessError::Storage {
            key: key.to_string(),
            source,
        };
        // one uniquely named temp file per write; readers only ever see a
        // complete document
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root).map_err(storage_err)?;
        tmp.write_all(value.as_bytes()).map_err(storage_err)?;
        tmp.persist(&path).map_err(|e| storage_err(e.error))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AccessError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AccessError::Storage {
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// A JSON document persisted under a `PolicyKey`.
pub trait PolicyDocument: Serialize + DeserializeOwned + Default {}

impl PolicyDocument for ModuleSwitch {}
impl PolicyDocument for LevelPolicies {}
impl PolicyDocument for DashboardPolicy {}

/// Typed access to the policy documents of a `KeyValueStore`.
///
/// Reads never fail: a missing document is materialized from its default and
/// written back, an unreadable or corrupt one is replaced by its default for
/// the duration of the call.
#[derive(Clone)]
pub struct ConfigStore {
    backend: Arc<dyn KeyValueStore>,
}

impl ConfigStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn get<P: PolicyDocument>(&self, key: PolicyKey) -> P {
        match self.try_get::<P>(key) {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                let doc = P::default();
                if let Err(e) = self.set(key, &doc) {
                    tracing::warn!(key = %key, error = %e, "Failed to persist default policy");
                }
                doc
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Policy unreadable, using default");
                P::default()
            }
        }
    }

    /// Read a document without materializing defaults.
    pub fn try_get<P: PolicyDocument>(&self, key: PolicyKey) -> Result<Option<P>, AccessError> {
        let Some(raw) = self.backend.read(key.as_str())? else {
            return Ok(None);
        };
        let doc = serde_json::from_str(&raw).map_err(|source| AccessError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(doc))
    }

    pub fn set<P: PolicyDocument>(&self, key: PolicyKey, doc: &P) -> Result<(), AccessError> {
        let json = serde_json::to_string(doc).map_err(|e| AccessError::InvalidPolicy(e.to_string()))?;
        self.backend.write(key.as_str(), &json)
    }

    /// Remove the stored document; the next `get` re-materializes the default.
    pub fn reset(&self, key: PolicyKey) -> Result<(), AccessError> {
        self.backend.remove(key.as_str())
    }

    pub fn contains(&self, key: PolicyKey) -> bool {
        matches!(self.backend.read(key.as_str()), Ok(Some(_)))
    }

    /// The document under `key` as untyped JSON, materializing the default.
    pub fn get_value(&self, key: PolicyKey) -> Value {
        let value = match key {
            PolicyKey::LevelModule | PolicyKey::JlptModule => {
                serde_json::to_value(self.get::<ModuleSwitch>(key))
            }
            PolicyKey::LevelAccess | PolicyKey::JlptAccess => {
                serde_json::to_value(self.get::<LevelPolicies>(key))
            }
            PolicyKey::DashboardAccess => serde_json::to_value(self.get::<DashboardPolicy>(key)),
        };
        value.unwrap_or(Value::Null)
    }

    /// Validate untyped JSON against the shape of `key` and store it.
    pub fn set_value(&self, key: PolicyKey, value: Value) -> Result<(), AccessError> {
        match key {
            PolicyKey::LevelModule | PolicyKey::JlptModule => {
                self.set(key, &parse_document::<ModuleSwitch>(key, value)?)
            }
            PolicyKey::LevelAccess | PolicyKey::JlptAccess => {
                self.set(key, &parse_document::<LevelPolicies>(key, value)?)
            }
            PolicyKey::DashboardAccess => {
                self.set(key, &parse_document::<DashboardPolicy>(key, value)?)
            }
        }
    }

    pub fn module_switch(&self, module: ContentModule) -> ModuleSwitch {
        self.get(module.switch_key())
    }

    pub fn set_module_enabled(&self, module: ContentModule, enabled: bool) -> Result<(), AccessError> {
        self.set(module.switch_key(), &ModuleSwitch { enabled })
    }

    pub fn level_policies(&self, module: ContentModule) -> LevelPolicies {
        self.get(module.levels_key())
    }

    /// Replace the rule of a single level, keeping the others.
    pub fn set_level_policy(
        &self,
        module: ContentModule,
        level: Level,
        policy: AccessPolicy,
    ) -> Result<(), AccessError> {
        let mut policies = self.level_policies(module);
        policies.insert(level, policy);
        self.set(module.levels_key(), &policies)
    }

    pub fn dashboard_policy(&self) -> DashboardPolicy {
        self.get(PolicyKey::DashboardAccess)
    }

    pub fn set_dashboard_policy(&self, policy: &DashboardPolicy) -> Result<(), AccessError> {
        self.set(PolicyKey::DashboardAccess, policy)
    }
}

fn parse_document<P: PolicyDocument>(key: PolicyKey, value: Value) -> Result<P, AccessError> {
    serde_json::from_value(value)
        .map_err(|e| AccessError::InvalidPolicy(format!("`{key}`: {e}")))
}
