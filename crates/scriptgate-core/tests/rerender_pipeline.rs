//! Guard, improve, render and auto-promote against the on-disk store.

use std::sync::Arc;

use async_trait::async_trait;
use scriptgate_core::fixtures::{sample_scraped, sample_script};
use scriptgate_core::pipeline::{load_quality_file, load_script, persist_guard_output};
use scriptgate_core::{
    improve_and_queue, run_quality_guard, sweep_pending_promotions, GuardOptions, ImproveOptions,
    JobQueue, PromotionConfig, RenderJob, RenderOutcome, Renderer,
};
use scriptgate_state::{
    AuditKind, FsProjectStore, GenerationMode, ProjectRoot, ProjectStore, VersionArtifacts,
};

struct DiskRenderer;

#[async_trait]
impl Renderer for DiskRenderer {
    async fn render(&self, job: &RenderJob) -> RenderOutcome {
        RenderOutcome::completed(VersionArtifacts {
            video_path: Some(format!("renders/{}/v{}.mp4", job.root.key(), job.version)),
            script_path: Some("script.json".to_string()),
            ..VersionArtifacts::default()
        })
    }
}

fn lenient() -> PromotionConfig {
    PromotionConfig {
        core_icp_default: 0.6,
        broad_default: 0.6,
        ..PromotionConfig::default()
    }
}

fn options() -> ImproveOptions {
    ImproveOptions {
        pack_override: Some("saas".into()),
        queue_rerender: true,
        auto_promote_if_winner: true,
        ..ImproveOptions::default()
    }
}

#[tokio::test]
async fn improved_script_is_rendered_and_promoted_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsProjectStore::new(dir.path()).unwrap());
    let root = ProjectRoot::new("https://acmeflow.io", "acct-1").unwrap();
    let (queue, handle) = JobQueue::spawn(store.clone(), Arc::new(DiskRenderer), lenient());

    let mut draft = sample_script();
    draft.features[1].demo_lines.clear();
    draft.features[1].icon = "skull".into();

    let outcome = improve_and_queue(
        &queue,
        store.as_ref(),
        &root,
        &draft,
        &sample_scraped(),
        &options(),
    )
    .await
    .unwrap();
    assert!(outcome.succeeded(), "stopped with {}", outcome.stop_reason);
    assert_eq!(outcome.queued_version, Some(1));

    queue.wait_idle().await.unwrap();

    let file = store.load_versions(&root).await.unwrap();
    assert_eq!(file.versions.len(), 1);
    let v = &file.versions[0];
    assert_eq!(v.mode, GenerationMode::Rerender);
    assert!(v.is_renderable());
    assert!(v.meta.pinned);
    assert!(v.auto_promote_evaluated_at.is_some());

    let script = load_script(store.as_ref(), &root).await.unwrap().unwrap();
    let quality = load_quality_file(store.as_ref(), &root).await.unwrap().unwrap();
    assert!(quality.matches_script(&script).unwrap());
    assert_eq!(quality.mode, GenerationMode::Rerender);
    assert_eq!(script.features.len(), 3);

    let report = sweep_pending_promotions(store.as_ref(), &lenient()).await.unwrap();
    assert_eq!(report.roots, 1);
    assert_eq!(report.evaluated, 0);

    let kinds: Vec<_> = store
        .read_audit(&root)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![AuditKind::RerenderQueued, AuditKind::AutopromotePromoted]
    );

    drop(queue);
    handle.await.unwrap();
}

#[tokio::test]
async fn strict_threshold_leaves_lone_rerender_unpinned() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsProjectStore::new(dir.path()).unwrap());
    let root = ProjectRoot::new("https://acmeflow.io", "acct-2").unwrap();
    let (queue, _handle) =
        JobQueue::spawn(store.clone(), Arc::new(DiskRenderer), PromotionConfig::default());

    improve_and_queue(
        &queue,
        store.as_ref(),
        &root,
        &sample_script(),
        &sample_scraped(),
        &options(),
    )
    .await
    .unwrap();
    queue.wait_idle().await.unwrap();

    let file = store.load_versions(&root).await.unwrap();
    assert!(!file.versions[0].meta.pinned);
    let audit = store.read_audit(&root).await.unwrap();
    let last = audit.last().unwrap();
    assert_eq!(last.kind, AuditKind::AutopromoteSkipped);
    assert_eq!(last.reason.as_deref(), Some("below-threshold"));
}

#[tokio::test]
async fn corrupt_quality_file_is_recomputable() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsProjectStore::new(dir.path()).unwrap();
    let root = ProjectRoot::new("https://acmeflow.io", "acct-3").unwrap();

    let out = run_quality_guard(
        &sample_script(),
        &sample_scraped(),
        &GuardOptions {
            pack_override: Some("saas".into()),
            ..GuardOptions::default()
        },
    )
    .unwrap();
    persist_guard_output(&store, &root, &out).await.unwrap();

    let path = dir
        .path()
        .join("projects")
        .join(root.key())
        .join("quality.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(store.read_quality(&root).await.unwrap().is_corrupt());
    assert!(load_quality_file(&store, &root).await.unwrap().is_none());

    persist_guard_output(&store, &root, &out).await.unwrap();
    assert!(load_quality_file(&store, &root).await.unwrap().is_some());
}
