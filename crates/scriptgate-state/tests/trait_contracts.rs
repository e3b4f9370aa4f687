//! Contract tests run against every `ProjectStore` backend.

use scriptgate_state::fakes::MemoryProjectStore;
use scriptgate_state::{
    AuditEntry, AuditKind, FsProjectStore, GenerationMode, ProjectRoot, ProjectStore,
    ProjectVersion, ReadOutcome, VersionsFile,
};

fn root() -> ProjectRoot {
    ProjectRoot::new("https://www.acme.io", "owner-7").unwrap()
}

async fn check_documents_roundtrip(store: &dyn ProjectStore) {
    let script = serde_json::json!({ "brandName": "Acme", "hook": ["Ship faster"] });
    store.write_script(&root(), &script).await.unwrap();
    assert_eq!(
        store.read_script(&root()).await.unwrap(),
        ReadOutcome::Present(script.clone())
    );

    let quality = serde_json::json!({ "score": 88.0 });
    store.write_quality(&root(), &quality).await.unwrap();
    assert_eq!(
        store.read_quality(&root()).await.unwrap().into_option(),
        Some(quality)
    );

    // whole-document overwrite
    let script2 = serde_json::json!({ "brandName": "Acme 2" });
    store.write_script(&root(), &script2).await.unwrap();
    assert_eq!(
        store.read_script(&root()).await.unwrap().into_option(),
        Some(script2)
    );
}

async fn check_versions_and_audit(store: &dyn ProjectStore) {
    let mut file = store.load_versions(&root()).await.unwrap();
    assert!(file.versions.is_empty());
    file.versions
        .push(ProjectVersion::queued("job-a", file.next_version(), GenerationMode::Generate));
    file.policy_or_default().min_confidence = 0.8;
    store.write_versions(&file).await.unwrap();

    let reloaded = store.load_versions(&root()).await.unwrap();
    assert_eq!(reloaded.versions.len(), 1);
    assert_eq!(reloaded.versions[0].version, 1);
    assert_eq!(reloaded.policy.map(|p| p.min_confidence), Some(0.8));

    store
        .append_audit(&root(), &AuditEntry::new(AuditKind::RerenderQueued).with_job("job-a"))
        .await
        .unwrap();
    store
        .append_audit(
            &root(),
            &AuditEntry::new(AuditKind::AutopromoteSkipped).with_reason("below-threshold"),
        )
        .await
        .unwrap();
    let audit = store.read_audit(&root()).await.unwrap();
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[1].reason.as_deref(), Some("below-threshold"));

    let roots = store.list_roots().await.unwrap();
    assert_eq!(roots, vec![root()]);
}

#[tokio::test]
async fn memory_store_satisfies_contract() {
    let store = MemoryProjectStore::new();
    check_documents_roundtrip(&store).await;
    check_versions_and_audit(&store).await;
}

#[tokio::test]
async fn fs_store_satisfies_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsProjectStore::new(dir.path()).unwrap();
    check_documents_roundtrip(&store).await;
    check_versions_and_audit(&store).await;
}

#[tokio::test]
async fn fs_store_persists_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = FsProjectStore::new(dir.path()).unwrap();
        store.write_versions(&VersionsFile::new(root())).await.unwrap();
    }
    let store = FsProjectStore::new(dir.path()).unwrap();
    assert!(matches!(
        store.read_versions(&root()).await.unwrap(),
        ReadOutcome::Present(_)
    ));
}
