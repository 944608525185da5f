#![allow(clippy::disallowed_methods)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use actors::{
    Actor, JobExecutor, JobRuntime, JobSubmitter, QueueActor, QueueActorState, SubmitError,
    SupervisorArgs, start_supervisor,
};
use backend::ImageBackend;
use common::*;
use imagegen_core::{DEFAULT_MODEL, JobState, QueueConfig};

async fn runtime(h: &Harness, backend: Arc<dyn ImageBackend>, concurrency: u32) -> JobRuntime {
    let config = QueueConfig {
        concurrency,
        poll_interval_ms: 10,
        tick_interval_ms: 50,
        ..QueueConfig::default()
    };
    runtime_with(h, backend, config).await
}

async fn runtime_with(h: &Harness, backend: Arc<dyn ImageBackend>, config: QueueConfig) -> JobRuntime {
    let executor = JobExecutor::new(h.jobs.clone(), h.images.clone(), backend)
        .with_timeout(Duration::from_millis(500));
    start_supervisor(SupervisorArgs {
        config,
        executor: Arc::new(executor),
        persistence: None,
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn submitted_job_runs_to_success() {
    let h = harness().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let rt = runtime(&h, png_backend(calls.clone(), Duration::ZERO), 2).await;
    assert_eq!(rt.worker_count().await, Some(2));

    let submitter = JobSubmitter::new(h.jobs.clone(), rt.queue.clone());
    let id = submitter.submit("a red fox", Some("stable-diffusion")).await.unwrap();

    let job = wait_for_terminal(&h.jobs, id, Duration::from_secs(5)).await;
    assert_eq!(job.state, JobState::Succeeded);
    let image_ref = job.image_ref().unwrap();
    assert_eq!(h.images.get(image_ref).await.unwrap().as_ref(), PNG);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    rt.shutdown().await;
}

#[tokio::test]
async fn submission_ids_are_unique_and_start_pending() {
    let h = harness().await;
    // A detached queue: nothing consumes, so jobs stay PENDING.
    let (queue, handle) = Actor::spawn(None, QueueActor, QueueActorState::new(QueueConfig::default()))
        .await
        .unwrap();
    let submitter = JobSubmitter::new(h.jobs.clone(), queue.clone());

    let mut seen = std::collections::HashSet::new();
    for n in 0..10 {
        let id = submitter.submit(&format!("prompt {n}"), None).await.unwrap();
        assert!(seen.insert(id));

        let job = h.jobs.get(id).await.unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.model, DEFAULT_MODEL);
    }

    queue.stop(None);
    handle.await.unwrap();
}

#[tokio::test]
async fn blank_prompt_is_rejected_without_a_record() {
    let h = harness().await;
    let (queue, handle) = Actor::spawn(None, QueueActor, QueueActorState::new(QueueConfig::default()))
        .await
        .unwrap();
    let submitter = JobSubmitter::new(h.jobs.clone(), queue.clone());

    for prompt in ["", "   ", "\n\t"] {
        let err = submitter.submit(prompt, None).await.unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)), "{err:?}");
    }
    assert!(h.jobs.count_by_state().await.unwrap().is_empty());

    queue.stop(None);
    handle.await.unwrap();
}

#[tokio::test]
async fn refused_enqueue_leaves_no_job_behind() {
    let h = harness().await;
    let config = QueueConfig {
        max_queue_size: Some(0),
        ..QueueConfig::default()
    };
    let (queue, handle) = Actor::spawn(None, QueueActor, QueueActorState::new(config))
        .await
        .unwrap();
    let submitter = JobSubmitter::new(h.jobs.clone(), queue.clone());

    let err = submitter.submit("a red fox", None).await.unwrap_err();
    assert!(matches!(err, SubmitError::QueueUnavailable(_)), "{err:?}");
    assert!(h.jobs.count_by_state().await.unwrap().is_empty());

    // A stopped queue is unavailable too.
    queue.stop(None);
    handle.await.unwrap();
    let err = submitter.submit("a red fox", None).await.unwrap_err();
    assert!(matches!(err, SubmitError::QueueUnavailable(_)), "{err:?}");
    assert!(h.jobs.count_by_state().await.unwrap().is_empty());
}

#[tokio::test]
async fn workers_keep_going_after_failures() {
    let h = harness().await;
    let rt = runtime(&h, selective_backend(), 1).await;
    let submitter = JobSubmitter::new(h.jobs.clone(), rt.queue.clone());

    let failing = submitter.submit("please fail", None).await.unwrap();
    let fine = submitter.submit("a calm lake", None).await.unwrap();

    let failed = wait_for_terminal(&h.jobs, failing, Duration::from_secs(5)).await;
    assert_eq!(failed.state, JobState::Failed);
    assert!(failed.error_detail().unwrap().contains("500"));

    let succeeded = wait_for_terminal(&h.jobs, fine, Duration::from_secs(5)).await;
    assert_eq!(succeeded.state, JobState::Succeeded);
    assert_eq!(rt.worker_count().await, Some(1));

    rt.shutdown().await;
}

#[tokio::test]
async fn timed_out_job_does_not_stay_running() {
    let h = harness().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let rt = runtime(&h, png_backend(calls, Duration::from_secs(30)), 1).await;
    let submitter = JobSubmitter::new(h.jobs.clone(), rt.queue.clone());

    let id = submitter.submit("a slow fox", None).await.unwrap();
    let job = wait_for_terminal(&h.jobs, id, Duration::from_secs(3)).await;
    assert_eq!(job.state, JobState::Failed);
    assert!(job.error_detail().unwrap().contains("timed out"));

    rt.shutdown().await;
}

#[tokio::test]
async fn crashing_worker_fails_the_job_once_deliveries_run_out() {
    let h = harness().await;
    let config = QueueConfig {
        concurrency: 1,
        max_deliveries: 2,
        visibility_timeout_secs: 0,
        poll_interval_ms: 10,
        tick_interval_ms: 50,
        ..QueueConfig::default()
    };
    let rt = runtime_with(&h, crashing_backend(), config).await;
    let submitter = JobSubmitter::new(h.jobs.clone(), rt.queue.clone());

    let id = submitter.submit("a cursed fox", None).await.unwrap();
    let job = wait_for_terminal(&h.jobs, id, Duration::from_secs(5)).await;
    assert_eq!(job.state, JobState::Failed);
    assert!(
        job.error_detail().unwrap().starts_with("gave up after 2 deliveries"),
        "{:?}",
        job.error_detail()
    );

    rt.shutdown().await;
}
