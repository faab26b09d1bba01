use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::job::{GenerationJob, JobKind, JobOutput, JobSpec, JobStatus};
use crate::services::credential::ApiKey;
use crate::services::generation::JobRunner;

struct TrackedJob {
    job: GenerationJob,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Registry {
    jobs: HashMap<Uuid, TrackedJob>,
    latest: HashMap<JobKind, Uuid>,
}

/// Live generation jobs, at most one per kind.
///
/// Submitting a job supersedes the previous job of the same kind: the old
/// job is dropped and its token cancelled, so a late result is discarded.
pub struct JobRegistry {
    runner: Arc<JobRunner>,
    inner: RwLock<Registry>,
}

impl JobRegistry {
    pub fn new(runner: Arc<JobRunner>) -> Self {
        Self {
            runner,
            inner: RwLock::new(Registry::default()),
        }
    }

    /// Register a job for `spec` and start it on a background task.
    pub async fn submit(self: &Arc<Self>, spec: JobSpec, key: ApiKey) -> GenerationJob {
        let job = GenerationJob::new(spec);
        let kind = job.kind();
        let cancel = CancellationToken::new();

        let superseded = {
            let mut inner = self.inner.write().await;
            let previous = inner.latest.insert(kind, job.id);
            let superseded = previous.and_then(|id| inner.jobs.remove(&id));
            if let Some(old) = &superseded {
                old.cancel.cancel();
                tracing::info!(job_id = %old.job.id, kind = %kind, "Superseded previous job");
            }
            inner.jobs.insert(
                job.id,
                TrackedJob {
                    job: job.clone(),
                    cancel: cancel.clone(),
                },
            );
            superseded
        };
        if let Some(old) = superseded {
            self.release_output(&old.job).await;
        }

        metrics::counter!("generation_jobs_total", "kind" => kind.to_string()).increment(1);
        tracing::info!(job_id = %job.id, kind = %kind, "Generation job submitted");

        let registry = Arc::clone(self);
        let snapshot = job.clone();
        tokio::spawn(async move {
            registry.drive(job, key, cancel).await;
        });

        snapshot
    }

    async fn drive(&self, mut job: GenerationJob, key: ApiKey, cancel: CancellationToken) {
        let kind = job.kind();
        if let Err(e) = job.start() {
            tracing::error!(job_id = %job.id, error = %e, "Failed to start job");
            return;
        }
        if !self.store(&job).await {
            return;
        }

        let started = Instant::now();
        let outcome = self.runner.execute(&job.spec, &key, &cancel).await;
        metrics::histogram!("generation_job_seconds", "kind" => kind.to_string())
            .record(started.elapsed().as_secs_f64());

        match &outcome {
            Ok(output) => {
                metrics::counter!("generation_jobs_succeeded", "kind" => kind.to_string())
                    .increment(1);
                tracing::info!(
                    job_id = %job.id,
                    kind = %kind,
                    duration_ms = started.elapsed().as_millis() as u64,
                    output = %output_summary(output),
                    "Generation job succeeded"
                );
            }
            Err(failure) => {
                metrics::counter!(
                    "generation_jobs_failed",
                    "kind" => kind.to_string(),
                    "category" => failure.category().to_string()
                )
                .increment(1);
                tracing::error!(
                    job_id = %job.id,
                    kind = %kind,
                    category = %failure.category(),
                    error = %failure,
                    "Generation job failed"
                );
            }
        }

        if let Err(e) = job.finish(outcome) {
            tracing::error!(job_id = %job.id, error = %e, "Failed to record job outcome");
            return;
        }
        if !self.store(&job).await {
            tracing::debug!(job_id = %job.id, "Discarding result of superseded job");
            self.release_output(&job).await;
        }
    }

    /// Drop the stored video a no-longer-tracked job produced.
    async fn release_output(&self, job: &GenerationJob) {
        if let Some(JobOutput::Video(video)) = job.result() {
            if self.runner.videos().remove(video.id).await {
                tracing::debug!(job_id = %job.id, video_id = %video.id, "Released video of superseded job");
            }
        }
    }

    /// Replace the stored copy of `job`. Returns false if the job is no
    /// longer tracked.
    async fn store(&self, job: &GenerationJob) -> bool {
        let mut inner = self.inner.write().await;
        match inner.jobs.get_mut(&job.id) {
            Some(tracked) => {
                tracked.job = job.clone();
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<GenerationJob> {
        self.inner.read().await.jobs.get(&id).map(|t| t.job.clone())
    }

    /// Request cancellation. Returns false for unknown jobs.
    pub async fn cancel(&self, id: Uuid) -> bool {
        match self.inner.read().await.jobs.get(&id) {
            Some(tracked) => {
                tracked.cancel.cancel();
                tracing::info!(job_id = %id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Jobs not yet in a terminal state.
    pub async fn active_count(&self) -> usize {
        self.inner
            .read()
            .await
            .jobs
            .values()
            .filter(|t| matches!(t.job.status(), JobStatus::Idle | JobStatus::Running))
            .count()
    }
}

fn output_summary(output: &JobOutput) -> String {
    match output {
        JobOutput::Analysis(result) if result.warning.is_some() => "analysis (degraded)".to_string(),
        JobOutput::Analysis(_) => "analysis".to_string(),
        JobOutput::Images { frames, .. } => format!("{} image(s)", frames.len()),
        JobOutput::Video(video) => format!("video {} bytes", video.size_bytes),
    }
}
