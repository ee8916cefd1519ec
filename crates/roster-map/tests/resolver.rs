use std::sync::Arc;

use roster_map::{
    AliasScorer, InMemoryMappingStore, MappingResolver, MappingSelector, MappingStore,
    ProposalSource, default_aliases,
};
use roster_model::{ImportMapping, TenantId};

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_exact_alias_explanation() {
    let scorer = AliasScorer::new(default_aliases());
    insta::assert_snapshot!(scorer.score("Mail", "email").explain(), @"Exact alias: 100% ('mail')");
}

#[test]
fn test_tenant_aliases_extend_suggestions() {
    let store = Arc::new(InMemoryMappingStore::new());
    let tenant = TenantId::new("college-b").expect("tenant");
    // A stored mapping whose columns do not cover the new export still
    // contributes its aliases.
    store
        .save(
            &ImportMapping::new(tenant.clone(), "ancien")
                .expect("mapping")
                .with_field("Code", "matricule")
                .with_aliases("matricule", ["Code Élève"]),
        )
        .expect("save");
    let resolver = MappingResolver::new(store, 0.6);

    let proposal = resolver
        .propose(
            &tenant,
            &headers(&["code eleve", "Courriel"]),
            &MappingSelector::Auto,
        )
        .expect("proposal");
    assert_eq!(proposal.source, ProposalSource::Suggested);
    assert_eq!(proposal.mapping.field_mappings["code eleve"], "matricule");
    assert_eq!(proposal.mapping.field_mappings["Courriel"], "email");
    assert!(proposal.unmapped_headers.is_empty());
    assert_eq!(proposal.suggestions.len(), 2);
}

#[test]
fn test_other_tenant_aliases_are_not_used() {
    let store = Arc::new(InMemoryMappingStore::new());
    let owner = TenantId::new("college-b").expect("tenant");
    let other = TenantId::new("college-c").expect("tenant");
    store
        .save(
            &ImportMapping::new(owner, "ancien")
                .expect("mapping")
                .with_field("zz", "matricule")
                .with_aliases("matricule", ["qwerty"]),
        )
        .expect("save");
    let resolver = MappingResolver::new(store, 0.6);
    assert!(
        resolver
            .propose(&other, &headers(&["qwerty"]), &MappingSelector::Auto)
            .is_err()
    );
}
