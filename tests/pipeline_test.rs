mod helpers;

use std::sync::Arc;
use std::time::Duration;

use face_detect_cache::models::detection::{DetectionOutcome, OutcomeStatus, Provenance};
use face_detect_cache::models::job::UploadedImage;
use face_detect_cache::services::aggregator::RequestAggregator;
use face_detect_cache::services::audit::AuditLog;
use face_detect_cache::services::cache::{MemoryResultCache, ResultCache};
use face_detect_cache::services::fingerprint::Fingerprint;
use face_detect_cache::services::ledger::MemoryJobLedger;

use helpers::{TestApp, UnreachableCache};

fn images(files: &[(&str, &str)]) -> Vec<UploadedImage> {
    files
        .iter()
        .map(|(name, bytes)| UploadedImage::new(*name, bytes.as_bytes()))
        .collect()
}

#[tokio::test]
async fn test_resubmission_is_served_from_cache() {
    let app = TestApp::new();
    let batch = [("img1.jpg", "B1"), ("img2.jpg", "B2")];

    let first = app.aggregator.run(images(&batch)).await.unwrap();
    assert_eq!((first.total_images, first.processed, first.cached), (2, 2, 0));

    let second = app.aggregator.run(images(&batch)).await.unwrap();
    assert_eq!((second.total_images, second.processed, second.cached), (2, 0, 2));
    assert!(second.faces.iter().all(|o| o.result_type == Provenance::Cached));
    assert_eq!(second.faces[0].detection, first.faces[0].detection);

    assert_eq!(app.detector.calls(), 2);
}

#[tokio::test]
async fn test_duplicates_within_one_request_run_detector_once() {
    let app = TestApp::new();
    let report = app
        .aggregator
        .run(images(&[("a.jpg", "same"), ("b.jpg", "same"), ("c.jpg", "same")]))
        .await
        .unwrap();

    assert_eq!(report.total_images, 3);
    assert_eq!(report.processed, 1);
    assert_eq!(report.cached, 2);
    assert_eq!(report.faces[0].result_type, Provenance::Processed);
    assert_eq!(report.faces[1].image_name, "b.jpg");
    assert_eq!(report.faces[2].image_name, "c.jpg");
    assert_eq!(app.detector.calls_for(b"same"), 1);
    assert!(report.is_consistent());
}

#[tokio::test]
async fn test_outcomes_follow_upload_order() {
    let app = TestApp::new();
    let names: Vec<String> = (0..12).map(|i| format!("img{i}.jpg")).collect();
    let batch: Vec<UploadedImage> = names
        .iter()
        .enumerate()
        .map(|(i, name)| UploadedImage::new(name.clone(), format!("bytes-{i}").into_bytes()))
        .collect();

    let report = app.aggregator.run(batch).await.unwrap();
    let reported: Vec<&str> = report.faces.iter().map(|o| o.image_name.as_str()).collect();
    assert_eq!(reported, names.iter().map(String::as_str).collect::<Vec<_>>());
    for (i, outcome) in report.faces.iter().enumerate() {
        assert_eq!(outcome.detection["content"], format!("bytes-{i}"));
    }
}

#[tokio::test]
async fn test_one_failing_image_does_not_abort_batch() {
    let app = TestApp::new();
    let report = app
        .aggregator
        .run(images(&[
            ("ok1.jpg", "fine-1"),
            ("broken.jpg", "corrupt-data"),
            ("ok2.jpg", "fine-2"),
        ]))
        .await
        .unwrap();

    assert_eq!(report.total_images, 3);
    assert_eq!(report.processed, 3);
    assert_eq!(report.cached, 0);
    assert_eq!(report.failed, 1);

    let broken = &report.faces[1];
    assert_eq!(broken.image_name, "broken.jpg");
    assert_eq!(broken.status, OutcomeStatus::Failed);
    assert!(broken.detection.is_empty());
    assert!(broken.error.is_some());
}

#[tokio::test]
async fn test_failed_detection_is_retried_next_time() {
    let app = TestApp::new();
    app.aggregator.run(images(&[("x.jpg", "corrupt")])).await.unwrap();
    let again = app.aggregator.run(images(&[("x.jpg", "corrupt")])).await.unwrap();

    assert_eq!(again.processed, 1);
    assert_eq!(again.cached, 0);
    assert_eq!(app.detector.calls_for(b"corrupt"), 2);
}

#[tokio::test]
async fn test_clear_all_forces_recompute() {
    let app = TestApp::new();
    app.aggregator.run(images(&[("img1.jpg", "B1")])).await.unwrap();
    app.cache.clear_all().await.unwrap();

    let report = app.aggregator.run(images(&[("img1.jpg", "B1")])).await.unwrap();
    assert_eq!(report.faces[0].result_type, Provenance::Processed);
    assert_eq!(app.detector.calls_for(b"B1"), 2);
}

#[tokio::test]
async fn test_concurrent_requests_never_mix_outcomes() {
    let app = Arc::new(TestApp::new());

    let requests: Vec<_> = (0..6)
        .map(|r| {
            let app = app.clone();
            tokio::spawn(async move {
                let batch: Vec<UploadedImage> = (0..5)
                    .map(|i| {
                        UploadedImage::new(format!("req{r}-img{i}.jpg"), format!("req{r}-bytes{i}").into_bytes())
                    })
                    .collect();
                (r, app.aggregator.run(batch).await.unwrap())
            })
        })
        .collect();

    for request in requests {
        let (r, report) = request.await.unwrap();
        assert_eq!(report.total_images, 5);
        assert!(report.is_consistent());
        for (i, outcome) in report.faces.iter().enumerate() {
            assert_eq!(outcome.image_name, format!("req{r}-img{i}.jpg"));
            assert_eq!(outcome.detection["content"], format!("req{r}-bytes{i}"));
        }
    }
    assert_eq!(app.detector.calls(), 30);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_detection() {
    let app = TestApp::with_stores(
        Arc::new(MemoryResultCache::new()),
        Arc::new(MemoryJobLedger::new()),
        Duration::from_millis(100),
    );

    let (first, second) = tokio::join!(
        app.aggregator.run(images(&[("mine.jpg", "shared-bytes")])),
        app.aggregator.run(images(&[("yours.jpg", "shared-bytes")])),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(app.detector.calls_for(b"shared-bytes"), 1);
    assert_eq!(first.faces[0].image_name, "mine.jpg");
    assert_eq!(first.faces[0].result_type, Provenance::Processed);
    assert_eq!(second.faces[0].image_name, "yours.jpg");
    assert_eq!(second.faces[0].result_type, Provenance::Cached);
    assert_eq!(second.faces[0].detection, first.faces[0].detection);
    assert_eq!(app.aggregator.in_flight(), 0);

    let third = app.aggregator.run(images(&[("again.jpg", "shared-bytes")])).await.unwrap();
    assert_eq!(third.cached, 1);
    assert_eq!(app.detector.calls(), 1);
}

#[tokio::test]
async fn test_more_misses_than_queue_capacity() {
    let app = TestApp::new();
    let batch: Vec<UploadedImage> = (0..40)
        .map(|i| UploadedImage::new(format!("img{i}.jpg"), format!("payload-{i}").into_bytes()))
        .collect();

    let report = tokio::time::timeout(Duration::from_secs(10), app.aggregator.run(batch))
        .await
        .expect("aggregation stalled under back-pressure")
        .unwrap();
    assert_eq!(report.processed, 40);
}

#[tokio::test]
async fn test_abandoned_request_still_populates_cache() {
    let app = TestApp::with_stores(
        Arc::new(MemoryResultCache::new()),
        Arc::new(MemoryJobLedger::new()),
        Duration::from_millis(100),
    );

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        app.aggregator.run(images(&[("slow.jpg", "slow-bytes")])),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(app.aggregator.in_flight(), 0);

    app.pool.shutdown().await;
    let fingerprint = Fingerprint::of(b"slow-bytes");
    assert!(app.cache.lookup(&fingerprint).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unreachable_cache_is_bypassed() {
    let app = TestApp::with_stores(
        Arc::new(UnreachableCache),
        Arc::new(MemoryJobLedger::new()),
        Duration::ZERO,
    );

    let report = app
        .aggregator
        .run(images(&[("img1.jpg", "B1"), ("img2.jpg", "B2")]))
        .await
        .unwrap();
    assert_eq!((report.processed, report.cached, report.failed), (2, 0, 0));
}

#[tokio::test]
async fn test_request_after_shutdown_fails() {
    let app = TestApp::new();
    app.pool.shutdown().await;
    tokio_test::assert_err!(app.aggregator.run(images(&[("img1.jpg", "B1")])).await);
}

#[tokio::test]
async fn test_every_outcome_is_audited() {
    let app = TestApp::new();
    let path = std::env::temp_dir().join(format!("audit-{}.txt", uuid::Uuid::new_v4()));
    let audit = Arc::new(AuditLog::open(&path).await.unwrap());
    let aggregator = RequestAggregator::new(app.cache.clone(), app.pool.clone(), Some(audit));

    aggregator.run(images(&[("img1.jpg", "B1")])).await.unwrap();
    aggregator
        .run(images(&[("img1.jpg", "B1"), ("img2.jpg", "B2")]))
        .await
        .unwrap();

    let contents = tokio::fs::read_to_string(&path).await.unwrap();
    let audited: Vec<DetectionOutcome> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(audited.len(), 3);
    assert_eq!(audited[0].result_type, Provenance::Processed);
    assert_eq!(audited[1].result_type, Provenance::Cached);
    assert_eq!(audited[2].image_name, "img2.jpg");
    tokio::fs::remove_file(path).await.ok();
}
