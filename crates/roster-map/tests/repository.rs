use std::fs;

use roster_map::{MappingError, MappingRepository, MappingStore};
use roster_model::{ImportMapping, RequiredTarget, TenantId, TransformOp, TransformRule};

fn sample_mapping(tenant: &TenantId, version: u32) -> ImportMapping {
    ImportMapping::new(tenant.clone(), "Export SIS")
        .expect("mapping")
        .with_version(version)
        .with_field("Mail", "email")
        .with_field("Téléphone", "phone")
        .with_rule(TransformRule::new("email", TransformOp::Lowercase))
        .with_required(RequiredTarget::Field("full_name".to_string()))
}

#[test]
fn test_repository_save_and_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = MappingRepository::new(dir.path().join("mappings")).expect("create repo");
    let tenant = TenantId::new("Lycee-A").expect("tenant");

    let mapping = sample_mapping(&tenant, 1);
    repo.save(&mapping).expect("save mapping");

    let file = repo.base_dir().join("lycee-a_export-sis_v1.json");
    assert!(file.exists(), "expected {}", file.display());

    let loaded = repo
        .load(&tenant, "Export SIS", 1)
        .expect("load mapping")
        .expect("mapping should exist");
    assert_eq!(loaded, mapping);
    assert!(repo.load(&tenant, "Export SIS", 2).expect("load").is_none());
}

#[test]
fn test_repository_refuses_to_overwrite_a_version() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = MappingRepository::new(dir.path()).expect("create repo");
    let tenant = TenantId::new("lycee-a").expect("tenant");

    repo.save(&sample_mapping(&tenant, 1)).expect("save v1");
    let err = repo.save(&sample_mapping(&tenant, 1)).unwrap_err();
    assert!(matches!(err, MappingError::VersionExists { version: 1, .. }));
}

#[test]
fn test_repository_latest_and_list_are_tenant_scoped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = MappingRepository::new(dir.path()).expect("create repo");
    let a = TenantId::new("lycee-a").expect("tenant");
    let b = TenantId::new("lycee-b").expect("tenant");

    repo.save(&sample_mapping(&a, 1)).expect("save");
    repo.save(&sample_mapping(&a, 3)).expect("save");
    repo.save(&sample_mapping(&b, 7)).expect("save");
    fs::write(dir.path().join("lycee-a_broken_v1.json"), "{ not json").expect("write");

    let latest = repo
        .latest(&a, "Export SIS")
        .expect("latest")
        .expect("mapping");
    assert_eq!(latest.version, 3);

    let listed: Vec<u32> = repo
        .list(&a)
        .expect("list")
        .iter()
        .map(|m| m.version)
        .collect();
    assert_eq!(listed, vec![3, 1]);
}

#[test]
fn test_repository_rejects_oversized_mapping() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = MappingRepository::new(dir.path()).expect("create repo");
    let tenant = TenantId::new("lycee-a").expect("tenant");

    let mut mapping = sample_mapping(&tenant, 1);
    mapping.transforms.extend(
        std::iter::repeat_with(|| TransformRule::new("address", TransformOp::Trim)).take(501),
    );
    assert!(matches!(
        repo.save(&mapping),
        Err(MappingError::Invalid(_))
    ));
}
