//! Mapping storage.
//!
//! Mappings are identified by `(tenant, name, version)`; a saved version is
//! never overwritten. The file-backed [`MappingRepository`] stores one JSON
//! file per version named `{tenant}_{name}_v{version}.json`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::Context;
use tracing::{debug, warn};

use roster_model::{ImportMapping, TenantId};

use crate::error::{MappingError, Result};

pub trait MappingStore: Send + Sync {
    /// Stores a new version; fails if `(tenant, name, version)` exists.
    fn save(&self, mapping: &ImportMapping) -> Result<()>;

    fn load(&self, tenant: &TenantId, name: &str, version: u32) -> Result<Option<ImportMapping>>;

    /// Highest version of `name`.
    fn latest(&self, tenant: &TenantId, name: &str) -> Result<Option<ImportMapping>>;

    /// All mappings of `tenant`, by name then version descending.
    fn list(&self, tenant: &TenantId) -> Result<Vec<ImportMapping>>;
}

fn sort_listing(mappings: &mut [ImportMapping]) {
    mappings.sort_by(|a, b| a.name.cmp(&b.name).then(b.version.cmp(&a.version)));
}

/// Mapping store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryMappingStore {
    mappings: RwLock<BTreeMap<(TenantId, String, u32), ImportMapping>>,
}

impl InMemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MappingStore for InMemoryMappingStore {
    fn save(&self, mapping: &ImportMapping) -> Result<()> {
        mapping.check_limits()?;
        let mut mappings = self.mappings.write().map_err(|_| MappingError::Poisoned)?;
        let key = (mapping.tenant.clone(), mapping.name.clone(), mapping.version);
        if mappings.contains_key(&key) {
            return Err(MappingError::VersionExists {
                tenant: mapping.tenant.clone(),
                name: mapping.name.clone(),
                version: mapping.version,
            });
        }
        mappings.insert(key, mapping.clone());
        Ok(())
    }

    fn load(&self, tenant: &TenantId, name: &str, version: u32) -> Result<Option<ImportMapping>> {
        let mappings = self.mappings.read().map_err(|_| MappingError::Poisoned)?;
        Ok(mappings
            .get(&(tenant.clone(), name.to_string(), version))
            .cloned())
    }

    fn latest(&self, tenant: &TenantId, name: &str) -> Result<Option<ImportMapping>> {
        let mappings = self.mappings.read().map_err(|_| MappingError::Poisoned)?;
        Ok(mappings
            .values()
            .filter(|m| m.tenant == *tenant && m.name == name)
            .max_by_key(|m| m.version)
            .cloned())
    }

    fn list(&self, tenant: &TenantId) -> Result<Vec<ImportMapping>> {
        let mappings = self.mappings.read().map_err(|_| MappingError::Poisoned)?;
        let mut out: Vec<ImportMapping> = mappings
            .values()
            .filter(|m| m.tenant == *tenant)
            .cloned()
            .collect();
        sort_listing(&mut out);
        Ok(out)
    }
}

/// Directory of JSON mapping files.
#[derive(Debug, Clone)]
pub struct MappingRepository {
    base_dir: PathBuf,
}

impl MappingRepository {
    /// Opens a repository, creating the directory if needed.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).with_context(|| {
            format!(
                "Failed to create mapping repository: {}",
                base_dir.display()
            )
        })?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, tenant: &TenantId, name: &str, version: u32) -> PathBuf {
        self.base_dir.join(format!(
            "{}_{}_v{version}.json",
            normalize_id(tenant.as_str()),
            normalize_id(name)
        ))
    }

    fn read(&self, path: &Path) -> Result<ImportMapping> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read mapping from {}", path.display()))?;
        let mapping = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse mapping from {}", path.display()))?;
        Ok(mapping)
    }

    /// Every parseable mapping of `tenant`. Unreadable files are skipped.
    fn scan(&self, tenant: &TenantId) -> Result<Vec<ImportMapping>> {
        let prefix = format!("{}_", normalize_id(tenant.as_str()));
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.base_dir)
            .with_context(|| format!("Failed to read repository: {}", self.base_dir.display()))?
        {
            let path = entry.context("Failed to read repository entry")?.path();
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            if !path.is_file() || !filename.starts_with(&prefix) || !filename.ends_with(".json")
            {
                continue;
            }
            match self.read(&path) {
                Ok(mapping) if mapping.tenant == *tenant => out.push(mapping),
                Ok(_) => {}
                Err(error) => warn!(path = %path.display(), %error, "skipping unreadable mapping"),
            }
        }
        Ok(out)
    }
}

impl MappingStore for MappingRepository {
    fn save(&self, mapping: &ImportMapping) -> Result<()> {
        mapping.check_limits()?;
        let path = self.path_for(&mapping.tenant, &mapping.name, mapping.version);
        if path.exists() {
            return Err(MappingError::VersionExists {
                tenant: mapping.tenant.clone(),
                name: mapping.name.clone(),
                version: mapping.version,
            });
        }
        let json = serde_json::to_string_pretty(mapping)
            .with_context(|| format!("Failed to serialize mapping {mapping}"))?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write mapping to {}", path.display()))?;
        debug!(mapping = %mapping, path = %path.display(), "mapping saved");
        Ok(())
    }

    fn load(&self, tenant: &TenantId, name: &str, version: u32) -> Result<Option<ImportMapping>> {
        let path = self.path_for(tenant, name, version);
        if !path.exists() {
            return Ok(None);
        }
        self.read(&path).map(Some)
    }

    fn latest(&self, tenant: &TenantId, name: &str) -> Result<Option<ImportMapping>> {
        Ok(self
            .scan(tenant)?
            .into_iter()
            .filter(|m| m.name == name)
            .max_by_key(|m| m.version))
    }

    fn list(&self, tenant: &TenantId) -> Result<Vec<ImportMapping>> {
        let mut out = self.scan(tenant)?;
        sort_listing(&mut out);
        Ok(out)
    }
}

/// Normalize an id for use in filenames.
fn normalize_id(id: &str) -> String {
    id.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect()
}
