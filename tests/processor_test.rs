//! Batch and single-job processing, failures, cancellation and re-entrancy.

mod helpers;

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use helpers::*;
use sprite_queue::models::job::{JobSpec, JobStats, JobStatus};
use sprite_queue::services::events::{EventKind, QueueEvent};
use sprite_queue::services::persistence::MemorySlot;
use sprite_queue::services::processor::Processor;
use sprite_queue::services::queue::JobStore;

fn slot_statuses(blob: &str) -> Vec<String> {
    let jobs: Vec<serde_json::Value> = serde_json::from_str(blob).unwrap();
    jobs.iter()
        .map(|j| j["status"].as_str().unwrap().to_string())
        .collect()
}

fn setup(animator: MockAnimator) -> (Arc<JobStore>, Arc<MockAnimator>, Arc<Processor>) {
    let store = Arc::new(JobStore::new(Arc::new(MemorySlot::new()), usize::MAX));
    let animator = Arc::new(animator);
    let processor = Arc::new(Processor::new(store.clone(), animator.clone()));
    (store, animator, processor)
}

#[tokio::test]
async fn test_all_jobs_succeed() {
    let (store, animator, processor) = setup(MockAnimator::new());

    let completed = Arc::new(AtomicUsize::new(0));
    let finals: Arc<Mutex<Vec<JobStats>>> = Arc::new(Mutex::new(Vec::new()));

    let c = completed.clone();
    store.on(EventKind::JobComplete, move |event| {
        if let QueueEvent::JobComplete(job) = event {
            assert_eq!(job.status, JobStatus::Done);
            assert!(job.result.is_some());
            c.fetch_add(1, Ordering::SeqCst);
        }
    });
    let f = finals.clone();
    store.on(EventKind::AllComplete, move |event| {
        if let QueueEvent::AllComplete(stats) = event {
            f.lock().unwrap().push(*stats);
        }
    });

    for prompt in ["walk", "run", "jump", "idle"] {
        store.add_job(job_spec(prompt)).await;
    }

    let stats = processor.process_all().await.expect("batch should run");

    assert_eq!(animator.calls(), 4);
    assert_eq!(animator.prompts(), vec!["walk", "run", "jump", "idle"]);
    assert_eq!(completed.load(Ordering::SeqCst), 4);
    assert_eq!(
        *finals.lock().unwrap(),
        vec![JobStats {
            total: 4,
            pending: 0,
            processing: 0,
            done: 4,
            errors: 0,
        }]
    );
    assert_eq!(stats.done, 4);
    assert!(!processor.is_processing());

    for job in store.get_all().await {
        assert_eq!(job.status, JobStatus::Done);
        assert!(job.error.is_none());
        let result = job.result.as_ref().unwrap();
        assert_eq!(
            result.spritesheet_url,
            format!("https://cdn.example.com/{}.png", job.motion_prompt().unwrap())
        );
    }
}

#[tokio::test]
async fn test_failure_does_not_stop_batch() {
    let (store, animator, processor) = setup(MockAnimator::new().failing_on("run"));

    let a = store.add_job(job_spec("walk")).await;
    let b = store.add_job(job_spec("run")).await;
    let c = store.add_job(job_spec("jump")).await;

    let stats = processor.process_all().await.unwrap();

    assert_eq!(animator.calls(), 3);
    assert_eq!(stats.done, 2);
    assert_eq!(stats.errors, 1);

    assert_eq!(store.get(a).await.unwrap().status, JobStatus::Done);
    assert_eq!(store.get(c).await.unwrap().status, JobStatus::Done);

    let failed = store.get(b).await.unwrap();
    assert_eq!(failed.status, JobStatus::Error);
    assert_eq!(failed.error.as_deref(), Some("cannot animate 'run'"));
    assert!(failed.result.is_none());
}

#[tokio::test]
async fn test_invalid_settings_fail_only_that_job() {
    let (store, animator, processor) = setup(MockAnimator::new());

    let bad = store
        .add_job(JobSpec {
            image: "https://example.com/sprite.png".to_string(),
            settings: settings(json!({"frames": 16})),
            ..Default::default()
        })
        .await;
    let good = store.add_job(job_spec("walk")).await;

    processor.process_all().await.unwrap();

    let failed = store.get(bad).await.unwrap();
    assert_eq!(failed.status, JobStatus::Error);
    assert!(failed.error.unwrap().contains("motion_prompt is required"));
    assert_eq!(store.get(good).await.unwrap().status, JobStatus::Done);
    assert_eq!(animator.calls(), 1);
}

#[tokio::test]
async fn test_cancel_lets_current_job_finish_then_stops() {
    let gate = Gate::new();
    let (store, animator, processor) = setup(MockAnimator::new().gated(gate.clone()));

    let ids = vec![
        store.add_job(job_spec("walk")).await,
        store.add_job(job_spec("run")).await,
        store.add_job(job_spec("jump")).await,
    ];

    let batch = tokio::spawn({
        let processor = processor.clone();
        async move { processor.process_all().await }
    });

    gate.started.notified().await;
    assert_eq!(store.get(ids[0]).await.unwrap().status, JobStatus::Processing);

    processor.cancel_processing();
    assert!(!processor.is_processing());
    gate.open();

    let stats = batch.await.unwrap().unwrap();

    assert_eq!(animator.calls(), 1);
    assert_eq!(stats.done, 1);
    assert_eq!(stats.pending, 2);
    assert_eq!(store.get(ids[0]).await.unwrap().status, JobStatus::Done);
    assert_eq!(store.get(ids[1]).await.unwrap().status, JobStatus::Pending);
    assert_eq!(store.get(ids[2]).await.unwrap().status, JobStatus::Pending);
}

#[tokio::test]
async fn test_each_finished_job_is_persisted_and_announced_mid_batch() {
    let gate = Gate::new();
    let slot = Arc::new(MemorySlot::new());
    let store = Arc::new(JobStore::new(slot.clone(), usize::MAX));
    let processor = Arc::new(Processor::new(
        store.clone(),
        Arc::new(MockAnimator::new().gated(gate.clone())),
    ));

    store.add_job(job_spec("walk")).await;
    store.add_job(job_spec("run")).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    store.on(EventKind::Update, move |event| {
        if let QueueEvent::Update { jobs, .. } = event {
            let statuses: Vec<_> = jobs.iter().map(|j| j.status.to_string()).collect();
            s.lock().unwrap().push(statuses.join(","));
        }
    });
    let s = seen.clone();
    store.on(EventKind::AllComplete, move |_| {
        s.lock().unwrap().push("all_complete".to_string());
    });

    let batch = tokio::spawn({
        let processor = processor.clone();
        async move { processor.process_all().await }
    });

    gate.started.notified().await;
    gate.step();
    gate.started.notified().await;

    // First job is finished, second is held open.
    let blob = slot.contents().await.unwrap();
    assert_eq!(slot_statuses(&blob), vec!["done", "processing"]);
    assert!(seen.lock().unwrap().contains(&"done,pending".to_string()));
    assert!(!seen.lock().unwrap().contains(&"all_complete".to_string()));

    gate.open();
    batch.await.unwrap().unwrap();

    let seen = seen.lock().unwrap();
    let first_done = seen.iter().position(|s| s == "done,pending").unwrap();
    let all_complete = seen.iter().position(|s| s == "all_complete").unwrap();
    assert!(first_done < all_complete);
    assert_eq!(seen.last().map(String::as_str), Some("all_complete"));
}

#[tokio::test]
async fn test_batch_started_after_cancel_overlaps_job_in_flight() {
    let gate = Gate::new();
    let (store, animator, processor) = setup(MockAnimator::new().gated(gate.clone()));
    let a = store.add_job(job_spec("walk")).await;
    let b = store.add_job(job_spec("run")).await;

    let first = tokio::spawn({
        let processor = processor.clone();
        async move { processor.process_all().await }
    });
    gate.started.notified().await;
    processor.cancel_processing();

    let second = tokio::spawn({
        let processor = processor.clone();
        async move { processor.process_all().await }
    });
    gate.started.notified().await;

    // Both animate calls are in flight at once.
    assert_eq!(animator.calls(), 2);
    assert_eq!(store.get(a).await.unwrap().status, JobStatus::Processing);
    assert_eq!(store.get(b).await.unwrap().status, JobStatus::Processing);
    assert!(processor.is_processing());

    gate.open();
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    assert_eq!(animator.prompts(), vec!["walk", "run"]);
    assert!(!processor.is_processing());
    assert_eq!(store.get_stats().await.done, 2);
}

#[tokio::test]
async fn test_second_process_all_is_rejected_while_running() {
    let gate = Gate::new();
    let (store, animator, processor) = setup(MockAnimator::new().gated(gate.clone()));

    for prompt in ["walk", "run", "jump"] {
        store.add_job(job_spec(prompt)).await;
    }

    let (first, second) = futures::join!(processor.process_all(), async {
        gate.started.notified().await;
        assert!(processor.is_processing());
        let rejected = processor.process_all().await;
        gate.open();
        rejected
    });

    assert!(second.is_none());
    assert_eq!(first.unwrap().done, 3);
    assert_eq!(animator.calls(), 3);
}

#[tokio::test]
async fn test_jobs_added_mid_run_wait_for_next_batch() {
    let gate = Gate::new();
    let (store, animator, processor) = setup(MockAnimator::new().gated(gate.clone()));

    store.add_job(job_spec("walk")).await;

    let batch = tokio::spawn({
        let processor = processor.clone();
        async move { processor.process_all().await }
    });

    gate.started.notified().await;
    let late = store.add_job(job_spec("late")).await;
    gate.open();
    batch.await.unwrap().unwrap();

    assert_eq!(animator.calls(), 1);
    assert_eq!(store.get(late).await.unwrap().status, JobStatus::Pending);

    processor.process_all().await.unwrap();
    assert_eq!(store.get(late).await.unwrap().status, JobStatus::Done);
}

#[tokio::test]
async fn test_batch_reruns_failed_jobs() {
    let (store, _, processor) = setup(MockAnimator::new().failing_on("run"));
    let id = store.add_job(job_spec("run")).await;
    processor.process_all().await.unwrap();
    assert_eq!(store.get(id).await.unwrap().status, JobStatus::Error);

    store
        .update_job_settings(id, settings(json!({"motion_prompt": "sprint"})))
        .await;
    processor.process_all().await.unwrap();

    let job = store.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert!(job.error.is_none());
}

#[tokio::test]
async fn test_retry_only_resets_failed_jobs() {
    let (store, animator, processor) = setup(MockAnimator::new().failing_on("run"));
    let ok = store.add_job(job_spec("walk")).await;
    let failed = store.add_job(job_spec("run")).await;
    processor.process_all().await.unwrap();

    assert!(!processor.retry_job(ok).await);
    assert_eq!(store.get(ok).await.unwrap().status, JobStatus::Done);

    assert!(processor.retry_job(failed).await);
    let job = store.get(failed).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.error.is_none());

    // Retrying does not run anything by itself.
    assert_eq!(animator.calls(), 2);
    assert!(!processor.retry_job(uuid::Uuid::new_v4()).await);
}

#[tokio::test]
async fn test_process_single_runs_one_job() {
    let (store, animator, processor) = setup(MockAnimator::new());
    let a = store.add_job(job_spec("walk")).await;
    let b = store.add_job(job_spec("run")).await;

    let completed = Arc::new(AtomicUsize::new(0));
    let c = completed.clone();
    store.on(EventKind::JobComplete, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(processor.process_single(b).await, Some(JobStatus::Done));
    assert_eq!(animator.prompts(), vec!["run"]);
    assert_eq!(store.get(a).await.unwrap().status, JobStatus::Pending);
    assert_eq!(completed.load(Ordering::SeqCst), 1);

    assert_eq!(processor.process_single(uuid::Uuid::new_v4()).await, None);
}

#[tokio::test]
async fn test_process_single_cannot_double_run_a_batch_job() {
    let gate = Gate::new();
    let (store, animator, processor) = setup(MockAnimator::new().gated(gate.clone()));
    let a = store.add_job(job_spec("walk")).await;
    store.add_job(job_spec("run")).await;

    let batch = tokio::spawn({
        let processor = processor.clone();
        async move { processor.process_all().await }
    });

    gate.started.notified().await;
    assert_eq!(processor.process_single(a).await, None);

    gate.open();
    batch.await.unwrap().unwrap();
    assert_eq!(animator.prompts(), vec!["walk", "run"]);
}

#[tokio::test]
async fn test_batch_ignores_job_held_by_single_run() {
    let gate = Gate::new();
    let (store, animator, processor) = setup(MockAnimator::new().gated(gate.clone()));
    let a = store.add_job(job_spec("walk")).await;
    let b = store.add_job(job_spec("run")).await;

    // Run `b` on its own first and hold it open while the batch starts.
    let single = tokio::spawn({
        let processor = processor.clone();
        async move { processor.process_single(b).await }
    });
    gate.started.notified().await;

    let batch = tokio::spawn({
        let processor = processor.clone();
        async move { processor.process_all().await }
    });
    gate.open();

    assert_eq!(single.await.unwrap(), Some(JobStatus::Done));
    batch.await.unwrap().unwrap();

    assert_eq!(animator.calls(), 2);
    assert_eq!(store.get(a).await.unwrap().status, JobStatus::Done);
    assert_eq!(store.get(b).await.unwrap().status, JobStatus::Done);
}

#[tokio::test]
async fn test_processing_transition_clears_previous_error() {
    let (store, _, processor) = setup(MockAnimator::new().failing_on("run"));
    let id = store.add_job(job_spec("run")).await;
    processor.process_all().await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    store.on(EventKind::Update, move |event| {
        if let QueueEvent::Update { jobs, .. } = event {
            let job = &jobs[0];
            s.lock().unwrap().push((job.status, job.error.clone()));
        }
    });

    processor.process_single(id).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], (JobStatus::Processing, None));
    assert_eq!(
        seen.last().cloned(),
        Some((JobStatus::Error, Some("cannot animate 'run'".to_string())))
    );
}

#[test]
fn test_empty_queue_still_completes_batch() {
    let (store, animator, processor) = setup(MockAnimator::new());
    let fired = Arc::new(AtomicUsize::new(0));
    let f = fired.clone();
    store.on(EventKind::AllComplete, move |_| {
        f.fetch_add(1, Ordering::SeqCst);
    });

    let stats = tokio_test::block_on(processor.process_all());

    assert_eq!(stats, Some(JobStats::default()));
    assert_eq!(animator.calls(), 0);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}
