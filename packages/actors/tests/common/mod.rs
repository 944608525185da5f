#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use backend::{BackendError, BackendFuture, FnBackend, GeneratedImage, GenerationRequest, ImageBackend};
use bytes::Bytes;
use db::DbConfig;
use db::repositories::JobRepository;
use imagegen_core::{Delivery, Job, JobId, JobMessage};
use storage::{ImageStore, StorageConfig};

pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3, 4];

/// Registry and image store backed by memory.
pub struct Harness {
    pub jobs: JobRepository,
    pub images: ImageStore,
}

pub async fn harness() -> Harness {
    let mut config = DbConfig::memory();
    config.database = format!("test_{}", JobId::new().0.simple());
    let db = db::init(&config).await.unwrap();

    Harness {
        jobs: JobRepository::new(db),
        images: ImageStore::new(StorageConfig::memory()).unwrap(),
    }
}

fn png_after(delay: Duration) -> BackendFuture<'static> {
    Box::pin(async move {
        tokio::time::sleep(delay).await;
        Ok(GeneratedImage {
            bytes: Bytes::from_static(PNG),
            extension: "png",
        })
    })
}

fn fail_with(err: BackendError) -> BackendFuture<'static> {
    Box::pin(async move { Err(err) })
}

/// Backend that returns [`PNG`] after `delay` and counts its calls.
pub fn png_backend(calls: Arc<AtomicUsize>, delay: Duration) -> Arc<dyn ImageBackend> {
    Arc::new(FnBackend::new(move |_request: GenerationRequest| {
        calls.fetch_add(1, Ordering::SeqCst);
        png_after(delay)
    }))
}

/// Backend that always fails with `err`.
pub fn failing_backend(err: BackendError) -> Arc<dyn ImageBackend> {
    Arc::new(FnBackend::new(move |_request: GenerationRequest| {
        fail_with(err.clone())
    }))
}

/// Backend that fails for prompts containing "fail" and draws the rest.
pub fn selective_backend() -> Arc<dyn ImageBackend> {
    Arc::new(FnBackend::new(|request: GenerationRequest| {
        if request.prompt.contains("fail") {
            fail_with(BackendError::HttpStatus {
                status: 500,
                body: "boom".into(),
            })
        } else {
            png_after(Duration::ZERO)
        }
    }))
}

/// Backend that answers with a format the image store does not keep.
pub fn unsupported_format_backend() -> Arc<dyn ImageBackend> {
    Arc::new(FnBackend::new(|_request: GenerationRequest| -> BackendFuture<'static> {
        Box::pin(async {
            Ok(GeneratedImage {
                bytes: Bytes::from_static(b"II*\0"),
                extension: "tiff",
            })
        })
    }))
}

async fn crash() -> Result<GeneratedImage, BackendError> {
    panic!("generator crashed")
}

/// Backend whose call panics, taking the worker down with it.
pub fn crashing_backend() -> Arc<dyn ImageBackend> {
    Arc::new(FnBackend::new(|_request: GenerationRequest| -> BackendFuture<'static> {
        Box::pin(crash())
    }))
}

pub fn message_for(job: &Job) -> JobMessage {
    JobMessage {
        job_id: job.id,
        prompt: job.prompt.clone(),
        model: job.model.clone(),
    }
}

pub fn delivery(job: &Job, tag: u64, attempt: u32) -> Delivery {
    Delivery {
        tag,
        attempt,
        message: message_for(job),
    }
}

pub async fn pending_job(jobs: &JobRepository, prompt: &str) -> Job {
    jobs.create(&Job::new(prompt, "stable-diffusion")).await.unwrap()
}

/// Poll the registry until the job is terminal.
pub async fn wait_for_terminal(jobs: &JobRepository, id: JobId, within: Duration) -> Job {
    let deadline = Instant::now() + within;
    loop {
        let job = jobs.get(id).await.unwrap();
        if job.state.is_terminal() {
            return job;
        }
        assert!(
            Instant::now() < deadline,
            "job {} still {} after {:?}",
            id,
            job.state,
            within
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
