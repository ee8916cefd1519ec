//! Mapping selection and suggestion.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use roster_model::{
    ImportMapping, RequiredTarget, TenantId, TransformOp, TransformRule, fields,
};

use crate::aliases::{default_aliases, merge_aliases};
use crate::error::{MappingError, Result};
use crate::fold::fold_header;
use crate::repository::MappingStore;
use crate::score::{AliasScorer, Suggestion};

/// Name given to mappings built from alias suggestions.
pub const SUGGESTED_MAPPING_NAME: &str = "suggested";

/// How the operator chose the mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingSelector {
    /// A stored mapping; the latest version when `version` is `None`.
    Named { name: String, version: Option<u32> },
    /// Best stored mapping for the headers, else an alias suggestion.
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalSource {
    Selected,
    BestExisting,
    Suggested,
}

/// A mapping offered to the operator. Nothing is stored or applied until
/// the proposal is accepted.
#[derive(Debug, Clone, Serialize)]
pub struct MappingProposal {
    pub mapping: ImportMapping,
    pub source: ProposalSource,
    /// 0.0 to 1.0.
    pub confidence: f32,
    /// Per-header suggestions when `source` is `Suggested`.
    pub suggestions: Vec<Suggestion>,
    /// Headers the mapping leaves unassigned.
    pub unmapped_headers: Vec<String>,
}

pub struct MappingResolver {
    store: Arc<dyn MappingStore>,
    min_confidence: f32,
}

impl MappingResolver {
    pub fn new(store: Arc<dyn MappingStore>, min_confidence: f32) -> Self {
        Self {
            store,
            min_confidence,
        }
    }

    pub fn store(&self) -> &Arc<dyn MappingStore> {
        &self.store
    }

    pub fn propose(
        &self,
        tenant: &TenantId,
        headers: &[String],
        selector: &MappingSelector,
    ) -> Result<MappingProposal> {
        match selector {
            MappingSelector::Named { name, version } => {
                let found = match version {
                    Some(v) => self.store.load(tenant, name, *v)?,
                    None => self.store.latest(tenant, name)?,
                };
                let mapping = found.ok_or_else(|| MappingError::NotFound {
                    tenant: tenant.clone(),
                    name: name.clone(),
                    version: *version,
                })?;
                let confidence = coverage(&mapping, headers);
                info!(tenant = %tenant, mapping = %mapping, confidence, "mapping selected");
                Ok(MappingProposal {
                    unmapped_headers: unmapped(&mapping, headers),
                    mapping,
                    source: ProposalSource::Selected,
                    confidence,
                    suggestions: Vec::new(),
                })
            }
            MappingSelector::Auto => self.auto(tenant, headers),
        }
    }

    fn auto(&self, tenant: &TenantId, headers: &[String]) -> Result<MappingProposal> {
        let stored = self.store.list(tenant)?;

        // Listing is by name then version descending: first of each name is latest.
        let mut latest: BTreeMap<&str, &ImportMapping> = BTreeMap::new();
        for mapping in &stored {
            latest.entry(mapping.name.as_str()).or_insert(mapping);
        }
        let best = latest
            .values()
            .map(|m| (*m, coverage(m, headers)))
            .filter(|(_, c)| *c >= self.min_confidence)
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((mapping, confidence)) = best {
            info!(tenant = %tenant, mapping = %mapping, confidence, "reusing stored mapping");
            return Ok(MappingProposal {
                mapping: mapping.clone(),
                source: ProposalSource::BestExisting,
                confidence,
                suggestions: Vec::new(),
                unmapped_headers: unmapped(mapping, headers),
            });
        }

        let mut aliases = default_aliases();
        for mapping in &stored {
            merge_aliases(&mut aliases, &mapping.aliases);
        }
        let scorer = AliasScorer::new(aliases);
        let suggestions = scorer.suggest(headers, self.min_confidence);
        if suggestions.is_empty() {
            let best_score = scorer.best_score(headers);
            debug!(tenant = %tenant, best_score, "no header reached the threshold");
            return Err(MappingError::NoMappingAvailable {
                tenant: tenant.clone(),
                best_score,
                threshold: self.min_confidence,
            });
        }

        let mapping = suggested_mapping(tenant, &suggestions)?;
        let confidence =
            suggestions.iter().map(|s| s.score.score).sum::<f32>() / suggestions.len() as f32;
        info!(
            tenant = %tenant,
            assigned = suggestions.len(),
            headers = headers.len(),
            confidence,
            "mapping suggested from aliases"
        );
        Ok(MappingProposal {
            unmapped_headers: unmapped(&mapping, headers),
            mapping,
            source: ProposalSource::Suggested,
            confidence,
            suggestions,
        })
    }
}

/// Share of the mapping's columns present in `headers`.
fn coverage(mapping: &ImportMapping, headers: &[String]) -> f32 {
    if mapping.field_mappings.is_empty() {
        return 0.0;
    }
    let folded: Vec<String> = headers.iter().map(|h| fold_header(h)).collect();
    let hits = mapping
        .field_mappings
        .keys()
        .filter(|column| folded.contains(&fold_header(column)))
        .count();
    hits as f32 / mapping.field_mappings.len() as f32
}

fn unmapped(mapping: &ImportMapping, headers: &[String]) -> Vec<String> {
    let columns: Vec<String> = mapping
        .field_mappings
        .keys()
        .map(|c| fold_header(c))
        .collect();
    headers
        .iter()
        .filter(|h| !columns.contains(&fold_header(h)))
        .cloned()
        .collect()
}

/// Builds a mapping from suggestions with the standard normalization rules
/// for the fields it assigns.
fn suggested_mapping(tenant: &TenantId, suggestions: &[Suggestion]) -> Result<ImportMapping> {
    let mut mapping = ImportMapping::new(tenant.clone(), SUGGESTED_MAPPING_NAME)?;
    for suggestion in suggestions {
        mapping = mapping.with_field(&suggestion.header, &suggestion.target);
    }
    let assigned: Vec<&str> = mapping.targets();
    let mut rules = Vec::new();
    for target in &assigned {
        let op = match *target {
            fields::EMAIL => Some(TransformOp::Lowercase),
            fields::PHONE | fields::PARENT_PHONE_1 | fields::PARENT_PHONE_2 => {
                Some(TransformOp::PhoneNormalize { country_code: None })
            }
            fields::FULL_NAME | fields::FIRST_NAME | fields::LAST_NAME | fields::ADDRESS => {
                Some(TransformOp::CollapseWhitespace)
            }
            _ => None,
        };
        if let Some(op) = op {
            rules.push(TransformRule::new(*target, op));
        }
    }
    if !assigned.contains(&fields::FULL_NAME)
        && assigned.contains(&fields::FIRST_NAME)
        && assigned.contains(&fields::LAST_NAME)
    {
        rules.push(
            TransformRule::new(
                fields::FULL_NAME,
                TransformOp::Concat {
                    separator: " ".to_string(),
                },
            )
            .with_sources([fields::FIRST_NAME, fields::LAST_NAME]),
        );
    }
    let mut mapping = rules.into_iter().fold(mapping, ImportMapping::with_rule);
    mapping = mapping.with_required(RequiredTarget::AnyOf(
        fields::STRONG_IDENTIFIERS
            .iter()
            .map(ToString::to_string)
            .collect(),
    ));
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryMappingStore;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn resolver() -> (Arc<InMemoryMappingStore>, MappingResolver) {
        let store = Arc::new(InMemoryMappingStore::new());
        let resolver = MappingResolver::new(store.clone(), 0.6);
        (store, resolver)
    }

    #[test]
    fn test_named_selection_uses_latest_version() {
        let (store, resolver) = resolver();
        let tenant = TenantId::new("a").unwrap();
        for version in [1, 2] {
            store
                .save(
                    &ImportMapping::new(tenant.clone(), "sis-export")
                        .unwrap()
                        .with_version(version)
                        .with_field("Mail", "email"),
                )
                .unwrap();
        }
        let proposal = resolver
            .propose(
                &tenant,
                &headers(&["Mail", "Remarque"]),
                &MappingSelector::Named {
                    name: "sis-export".to_string(),
                    version: None,
                },
            )
            .unwrap();
        assert_eq!(proposal.source, ProposalSource::Selected);
        assert_eq!(proposal.mapping.version, 2);
        assert_eq!(proposal.unmapped_headers, vec!["Remarque".to_string()]);
    }

    #[test]
    fn test_named_selection_is_tenant_scoped() {
        let (store, resolver) = resolver();
        let a = TenantId::new("a").unwrap();
        let b = TenantId::new("b").unwrap();
        store
            .save(&ImportMapping::new(a, "shared").unwrap().with_field("Mail", "email"))
            .unwrap();
        let err = resolver
            .propose(
                &b,
                &headers(&["Mail"]),
                &MappingSelector::Named {
                    name: "shared".to_string(),
                    version: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, MappingError::NotFound { .. }));
    }

    #[test]
    fn test_auto_prefers_covering_stored_mapping() {
        let (store, resolver) = resolver();
        let tenant = TenantId::new("a").unwrap();
        store
            .save(
                &ImportMapping::new(tenant.clone(), "sis-export")
                    .unwrap()
                    .with_field("Courriel élève", "email")
                    .with_field("GSM", "phone"),
            )
            .unwrap();
        let proposal = resolver
            .propose(
                &tenant,
                &headers(&["courriel eleve", "gsm"]),
                &MappingSelector::Auto,
            )
            .unwrap();
        assert_eq!(proposal.source, ProposalSource::BestExisting);
        assert!((proposal.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_auto_suggests_from_aliases() {
        let (_, resolver) = resolver();
        let tenant = TenantId::new("a").unwrap();
        let proposal = resolver
            .propose(
                &tenant,
                &headers(&["Mail", "Téléphone", "Prénom", "Nom", "Observations"]),
                &MappingSelector::Auto,
            )
            .unwrap();
        assert_eq!(proposal.source, ProposalSource::Suggested);
        assert_eq!(proposal.mapping.field_mappings["Mail"], "email");
        assert_eq!(proposal.mapping.field_mappings["Téléphone"], "phone");
        assert_eq!(proposal.unmapped_headers, vec!["Observations".to_string()]);
        assert!(
            proposal
                .mapping
                .transforms
                .iter()
                .any(|r| r.target == fields::FULL_NAME)
        );
    }

    #[test]
    fn test_unrecognized_headers_yield_no_mapping() {
        let (_, resolver) = resolver();
        let tenant = TenantId::new("a").unwrap();
        let err = resolver
            .propose(&tenant, &headers(&["col1", "col2"]), &MappingSelector::Auto)
            .unwrap_err();
        assert!(matches!(err, MappingError::NoMappingAvailable { .. }));
    }
}
