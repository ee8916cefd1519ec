//! Seed files: pipeline settings plus per-tenant fixtures.
//!
//! The CLI runs against in-memory collaborators. A seed file supplies what a
//! deployment would hold in its databases:
//!
//! ```toml
//! [pipeline]
//! chunk_size = 500
//!
//! [[tenants]]
//! id = "lycee-bilingue"
//!
//! [tenants.rules]
//! mandatory_fields = ["full_name"]
//!
//! [[tenants.mappings]]
//! name = "sis-export"
//! fields = { "Mail" = "email", "Matricule" = "matricule" }
//! required = [["email", "phone", "matricule"]]
//!
//! [[tenants.references]]
//! kind = "level"
//! code = "6EME"
//! id = "lvl-6"
//! aliases = ["6e", "sixieme"]
//!
//! [[tenants.records]]
//! email = "jane.doe@example.com"
//! matricule = "A123"
//! level = "6EME"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{debug, info};

use roster_core::{Collaborators, ImportPipeline, PipelineConfig};
use roster_map::{InMemoryMappingStore, MappingRepository, MappingStore};
use roster_model::{
    ImportMapping, RecordDraft, ReferenceId, ReferenceKind, RequiredTarget, TenantId, TenantRules,
    TransformRule, fields,
};
use roster_store::{
    InMemoryRecordStore, InMemoryReferenceSource, InMemoryStagingStore, RecordStore,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Seed {
    pub pipeline: PipelineConfig,
    pub tenants: Vec<TenantSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantSeed {
    pub id: String,
    /// Tenant-specific validation rules; defaults apply when absent.
    #[serde(default)]
    pub rules: Option<TenantRules>,
    #[serde(default)]
    pub mappings: Vec<MappingSeed>,
    #[serde(default)]
    pub references: Vec<ReferenceSeed>,
    /// Records that exist before any import, as canonical field values.
    /// `level` and `department` hold reference codes.
    #[serde(default)]
    pub records: Vec<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MappingSeed {
    pub name: String,
    #[serde(default = "first_version")]
    pub version: u32,
    /// Source column -> canonical field.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub transforms: Vec<TransformRule>,
    #[serde(default)]
    pub required: Vec<RequiredTarget>,
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
}

fn first_version() -> u32 {
    1
}

impl MappingSeed {
    pub fn to_mapping(&self, tenant: &TenantId) -> Result<ImportMapping> {
        let mut mapping = ImportMapping::new(tenant.clone(), &self.name)
            .with_context(|| format!("invalid mapping name '{}'", self.name))?
            .with_version(self.version);
        mapping.field_mappings = self.fields.clone();
        mapping.transforms = self.transforms.clone();
        mapping.required_targets = self.required.clone();
        mapping.aliases = self.aliases.clone();
        mapping
            .check_limits()
            .with_context(|| format!("mapping '{}' is too large", self.name))?;
        Ok(mapping)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceSeed {
    pub kind: ReferenceKind,
    pub code: String,
    pub id: String,
    /// Other spellings operators use for the same code.
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// A pipeline wired to seeded in-memory collaborators.
pub struct SeededPipeline {
    pub pipeline: ImportPipeline,
    pub records: Arc<InMemoryRecordStore>,
    pub mappings: Arc<dyn MappingStore>,
}

impl Seed {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read seed file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid seed file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let seed: Seed = toml::from_str(text).context("failed to parse TOML")?;
        seed.pipeline
            .validate()
            .context("invalid [pipeline] section")?;
        let mut seen = HashSet::new();
        for tenant in &seed.tenants {
            if !seen.insert(tenant.id.as_str()) {
                bail!("tenant '{}' is listed twice", tenant.id);
            }
        }
        Ok(seed)
    }

    pub fn tenant(&self, id: &TenantId) -> Option<&TenantSeed> {
        self.tenants.iter().find(|t| t.id == id.as_str())
    }

    /// Builds the pipeline and loads every tenant's fixtures into it.
    ///
    /// Mappings go to `mapping_dir` when given, so they outlive the run;
    /// versions already present there are left untouched.
    pub fn build(&self, mapping_dir: Option<&Path>) -> Result<SeededPipeline> {
        let mappings: Arc<dyn MappingStore> = match mapping_dir {
            Some(dir) => Arc::new(MappingRepository::new(dir).with_context(|| {
                format!("failed to open mapping directory {}", dir.display())
            })?),
            None => Arc::new(InMemoryMappingStore::new()),
        };
        let references = Arc::new(InMemoryReferenceSource::new());
        let records = Arc::new(InMemoryRecordStore::new());

        let mut pipeline = ImportPipeline::new(
            self.pipeline.clone(),
            Collaborators {
                staging: Arc::new(InMemoryStagingStore::new()),
                records: records.clone(),
                references: references.clone(),
                mappings: mappings.clone(),
            },
        )
        .context("failed to build the import pipeline")?;

        for tenant_seed in &self.tenants {
            let tenant = TenantId::new(&tenant_seed.id)
                .with_context(|| format!("invalid tenant id '{}'", tenant_seed.id))?;
            let codes = tenant_seed.load_references(&tenant, &references)?;
            tenant_seed.load_mappings(&tenant, mappings.as_ref())?;
            tenant_seed.load_records(&tenant, &codes, records.as_ref())?;
            if let Some(rules) = &tenant_seed.rules {
                pipeline = pipeline.with_tenant_rules(tenant.clone(), rules.clone());
            }
            info!(
                tenant = %tenant,
                mappings = tenant_seed.mappings.len(),
                references = tenant_seed.references.len(),
                records = tenant_seed.records.len(),
                "tenant seeded"
            );
        }
        Ok(SeededPipeline {
            pipeline,
            records,
            mappings,
        })
    }
}

type ReferenceCodes = BTreeMap<(ReferenceKind, String), ReferenceId>;

impl TenantSeed {
    fn load_references(
        &self,
        tenant: &TenantId,
        source: &InMemoryReferenceSource,
    ) -> Result<ReferenceCodes> {
        let mut codes = ReferenceCodes::new();
        for reference in &self.references {
            let id = ReferenceId::new(&reference.id);
            for code in std::iter::once(&reference.code).chain(&reference.aliases) {
                source
                    .insert(tenant, reference.kind, code, id.clone())
                    .with_context(|| format!("failed to seed {} '{code}'", reference.kind))?;
                codes.insert((reference.kind, code.trim().to_uppercase()), id.clone());
            }
        }
        Ok(codes)
    }

    fn load_mappings(&self, tenant: &TenantId, store: &dyn MappingStore) -> Result<()> {
        for seed in &self.mappings {
            let mapping = seed.to_mapping(tenant)?;
            if store.load(tenant, &mapping.name, mapping.version)?.is_some() {
                debug!(mapping = %mapping, "mapping already stored");
                continue;
            }
            store
                .save(&mapping)
                .with_context(|| format!("failed to store mapping {mapping}"))?;
        }
        Ok(())
    }

    fn load_records(
        &self,
        tenant: &TenantId,
        codes: &ReferenceCodes,
        store: &dyn RecordStore,
    ) -> Result<()> {
        for (position, values) in self.records.iter().enumerate() {
            let resolve = |kind: ReferenceKind, field: &str| -> Result<Option<ReferenceId>> {
                let Some(code) = fields::present(values, field) else {
                    return Ok(None);
                };
                codes
                    .get(&(kind, code.trim().to_uppercase()))
                    .cloned()
                    .map(Some)
                    .with_context(|| {
                        format!("record {} of '{tenant}': unknown {kind} '{code}'", position + 1)
                    })
            };
            let level = resolve(ReferenceKind::Level, fields::LEVEL)?;
            let department = resolve(ReferenceKind::Department, fields::DEPARTMENT)?;
            let draft = RecordDraft::from_normalized(values, level, department);
            if draft.identifiers().is_empty() {
                bail!(
                    "record {} of '{tenant}' has no email, phone or matricule",
                    position + 1
                );
            }
            store
                .create(tenant, draft, None)
                .with_context(|| format!("failed to seed record {} of '{tenant}'", position + 1))?;
        }
        Ok(())
    }
}
