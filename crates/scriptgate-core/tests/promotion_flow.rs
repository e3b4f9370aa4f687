use std::sync::Arc;

use scriptgate_core::learning::collect_outcome_learning;
use scriptgate_core::ranking::composite_score;
use scriptgate_core::{
    calibrate_thresholds, promote_version, recommend_project_version, PromotionConfig,
    PromotionReason,
};
use scriptgate_state::{
    AuditKind, FsProjectStore, GenerationMode, Outcome, ProjectRoot, ProjectStore,
    ProjectVersion, PromotionSegment, QualitySnapshot, VersionArtifacts, VersionStatus,
    VersionsFile,
};

fn root(url: &str) -> ProjectRoot {
    ProjectRoot::new(url, "acct-42").unwrap()
}

fn version(
    id: &str,
    n: u32,
    status: VersionStatus,
    score: f64,
    pack: &str,
    video: bool,
) -> ProjectVersion {
    let mut v = ProjectVersion::queued(id, n, GenerationMode::Rerender);
    v.status = status;
    v.quality = Some(QualitySnapshot {
        score,
        passed: score >= 75.0,
        domain_pack_id: Some(pack.to_string()),
        template_id: Some("product-tour".to_string()),
        ..QualitySnapshot::default()
    });
    if video {
        v.artifacts = VersionArtifacts {
            video_path: Some(format!("/renders/{id}.mp4")),
            ..VersionArtifacts::default()
        };
    }
    v
}

async fn seed(store: &dyn ProjectStore, root: &ProjectRoot, versions: Vec<ProjectVersion>) {
    let mut file = VersionsFile::new(root.clone());
    file.versions = versions;
    store.write_versions(&file).await.unwrap();
}

fn pinned_count(file: &VersionsFile) -> usize {
    file.versions.iter().filter(|v| v.meta.pinned).count()
}

#[tokio::test]
async fn rendered_passing_rerender_outranks_failed_first_cut() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsProjectStore::new(dir.path()).unwrap();
    let r = root("https://acmeflow.io");

    let mut v1 = version("job-v1", 1, VersionStatus::Completed, 60.0, "saas", false);
    v1.mode = GenerationMode::Generate;
    let v2 = version("job-v2", 2, VersionStatus::Completed, 92.0, "saas", true);
    seed(&store, &r, vec![v1, v2]).await;

    let learning = collect_outcome_learning(&store).await.unwrap();
    let file = store.load_versions(&r).await.unwrap();
    let rec = recommend_project_version(&file.versions, &learning);

    assert_eq!(rec.recommended.as_deref(), Some("job-v2"));
    let (c1, _) = composite_score(file.find("job-v1").unwrap(), &learning);
    let (c2, _) = composite_score(file.find("job-v2").unwrap(), &learning);
    assert!(c2 - c1 >= 40.0, "composite gap {c2} - {c1}");
}

#[tokio::test]
async fn promotion_never_pins_unrenderable_versions() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsProjectStore::new(dir.path()).unwrap();
    let r = root("https://acmeflow.io");
    seed(
        &store,
        &r,
        vec![
            version("running", 1, VersionStatus::Running, 90.0, "saas", true),
            version("failed", 2, VersionStatus::Failed, 90.0, "saas", true),
            version("no-video", 3, VersionStatus::Completed, 90.0, "saas", false),
            version("good-a", 4, VersionStatus::Completed, 80.0, "saas", true),
            version("good-b", 5, VersionStatus::Completed, 85.0, "saas", true),
        ],
    )
    .await;

    let expected = [
        ("running", false, PromotionReason::NotCompleted),
        ("failed", false, PromotionReason::NotCompleted),
        ("no-video", false, PromotionReason::MissingVideo),
        ("missing", false, PromotionReason::VersionNotFound),
        ("good-a", true, PromotionReason::Promoted),
        ("good-b", true, PromotionReason::Promoted),
    ];
    for (job, promoted, reason) in expected {
        let result = promote_version(&store, &r, job).await.unwrap();
        assert_eq!((result.promoted, result.reason), (promoted, reason), "{job}");
        let file = store.load_versions(&r).await.unwrap();
        assert!(pinned_count(&file) <= 1);
        assert!(file
            .versions
            .iter()
            .filter(|v| v.meta.pinned)
            .all(|v| v.is_renderable()));
    }

    let file = store.load_versions(&r).await.unwrap();
    assert_eq!(file.pinned().map(|v| v.id.as_str()), Some("good-b"));
    let promoted = store
        .read_audit(&r)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == AuditKind::VersionPromoted)
        .count();
    assert_eq!(promoted, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_promotions_leave_one_pin() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsProjectStore::new(dir.path()).unwrap());
    let r = root("https://acmeflow.io");
    let versions = (1..=6)
        .map(|n| {
            version(
                &format!("job-{n}"),
                n,
                VersionStatus::Completed,
                80.0,
                "saas",
                true,
            )
        })
        .collect();
    seed(store.as_ref(), &r, versions).await;

    let tasks: Vec<_> = (1..=6)
        .map(|n| {
            let store = store.clone();
            let r = r.clone();
            tokio::spawn(async move {
                promote_version(store.as_ref(), &r, &format!("job-{n}"))
                    .await
                    .unwrap()
            })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().promoted);
    }

    let file = store.load_versions(&r).await.unwrap();
    assert_eq!(pinned_count(&file), 1);
    assert_eq!(file.versions.len(), 6);
}

async fn seed_outcomes(
    store: &dyn ProjectStore,
    r: &ProjectRoot,
    pack: &str,
    accepted: u32,
    rejected: u32,
) {
    let versions = (0..accepted + rejected)
        .map(|i| {
            let mut v = version(
                &format!("job-{i}"),
                i + 1,
                VersionStatus::Completed,
                85.0,
                pack,
                true,
            );
            v.meta.outcome = Some(if i < accepted {
                Outcome::Accepted
            } else {
                Outcome::Rejected
            });
            v
        })
        .collect();
    seed(store, r, versions).await;
}

async fn calibrated_core_icp(accepted: u32, rejected: u32) -> f64 {
    let dir = tempfile::tempdir().unwrap();
    let store = FsProjectStore::new(dir.path()).unwrap();
    let r = root("https://ledgerly.io");
    seed_outcomes(&store, &r, "fintech", accepted, rejected).await;

    let learning = collect_outcome_learning(&store).await.unwrap();
    let report = calibrate_thresholds(&store, &r, &learning, &PromotionConfig::default(), false)
        .await
        .unwrap();
    report.recommended(PromotionSegment::CoreIcp).unwrap()
}

#[tokio::test]
async fn good_history_lowers_threshold_below_bad_history() {
    let good = calibrated_core_icp(10, 2).await;
    let bad = calibrated_core_icp(2, 10).await;
    assert!(good < bad, "good={good} bad={bad}");
    assert!(good < PromotionConfig::default().core_icp_default);
    assert!((0.55..=0.9).contains(&good));
    assert!((0.55..=0.9).contains(&bad));
}

#[tokio::test]
async fn calibration_learns_across_roots_and_applies_to_one() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsProjectStore::new(dir.path()).unwrap();
    let history = root("https://ledgerly.io");
    let target = root("https://paywise.io");
    seed_outcomes(&store, &history, "fintech", 12, 0).await;
    seed(&store, &target, Vec::new()).await;

    let learning = collect_outcome_learning(&store).await.unwrap();
    assert_eq!(learning.total_outcomes(), 12);

    let report = calibrate_thresholds(&store, &target, &learning, &PromotionConfig::default(), true)
        .await
        .unwrap();
    assert!(report.applied);

    let file = store.load_versions(&target).await.unwrap();
    let policy = file.policy.unwrap();
    assert_eq!(
        policy.segment_thresholds.get(PromotionSegment::CoreIcp),
        report.recommended(PromotionSegment::CoreIcp)
    );
    assert!(policy.last_calibration.is_some());

    let untouched = store.load_versions(&history).await.unwrap();
    assert!(untouched.policy.is_none());

    let audit = store.read_audit(&target).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].kind, AuditKind::PolicyUpdated);
}
