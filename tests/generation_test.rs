//! Generation job lifecycle against a scripted backend.

mod fixtures;
mod helpers;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clipforge::models::job::{
    AspectRatio, FailureCategory, GenerationFailure, GenerationJob, JobOutput, JobSpec, JobStatus,
    ANALYSIS_PLACEHOLDER,
};
use clipforge::services::backend::ApiError;
use clipforge::services::generation::{BatchPolicy, JobRunner, RunnerConfig};
use clipforge::services::jobs::JobRegistry;
use clipforge::services::video_store::VideoStore;
use tokio_util::sync::CancellationToken;

use fixtures::*;
use helpers::*;

fn analyze_job() -> GenerationJob {
    GenerationJob::new(JobSpec::analyze(start_frame(), None))
}

fn images_job(count: u8) -> GenerationJob {
    GenerationJob::new(JobSpec::image_generate("a lighthouse in fog", AspectRatio::Square, count).unwrap())
}

fn video_job(aspect: AspectRatio) -> GenerationJob {
    GenerationJob::new(
        JobSpec::video_generate(start_frame(), Some(end_frame()), "slow dolly in", aspect, "720p").unwrap(),
    )
}

#[tokio::test]
async fn test_analyze_structured_reply() {
    let backend = Arc::new(ScriptedBackend::new().analysis(Ok(STRUCTURED_ANALYSIS.to_string())));
    let (runner, _) = runner(backend, RunnerConfig::default());

    let mut job = analyze_job();
    runner.run(&mut job, &test_key(), &CancellationToken::new()).await;

    assert_eq!(job.status(), JobStatus::Succeeded);
    match job.result() {
        Some(JobOutput::Analysis(result)) => {
            assert_eq!(result.chinese_description, "雨夜街头，霓虹灯倒映在积水中");
            assert!(result.english_prompt.starts_with("rainy neon street"));
            assert!(result.warning.is_none());
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_analyze_unstructured_reply_degrades_instead_of_failing() {
    let backend = Arc::new(ScriptedBackend::new().analysis(Ok(UNSTRUCTURED_ANALYSIS.to_string())));
    let (runner, _) = runner(backend, RunnerConfig::default());

    let mut job = analyze_job();
    runner.run(&mut job, &test_key(), &CancellationToken::new()).await;

    assert_eq!(job.status(), JobStatus::Succeeded);
    match job.result() {
        Some(JobOutput::Analysis(result)) => {
            assert_eq!(result.english_prompt, UNSTRUCTURED_ANALYSIS);
            assert_eq!(result.chinese_description, ANALYSIS_PLACEHOLDER);
            assert!(result.warning.is_some());
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_analyze_remote_error_fails_with_vendor_message() {
    let backend = Arc::new(
        ScriptedBackend::new().analysis(Err(status_error(500, "Internal error encountered."))),
    );
    let (runner, _) = runner(backend, RunnerConfig::default());

    let mut job = analyze_job();
    runner.run(&mut job, &test_key(), &CancellationToken::new()).await;

    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(
        job.error(),
        Some(&GenerationFailure::Generation {
            message: "Internal error encountered.".to_string()
        })
    );
}

#[tokio::test]
async fn test_image_batch_all_succeed() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .image(Ok(generated_png(4, 4)))
            .image(Ok(generated_png(4, 4)))
            .image(Ok(generated_png(4, 4))),
    );
    let (runner, _) = runner(backend.clone(), RunnerConfig::default());

    let mut job = images_job(3);
    runner.run(&mut job, &test_key(), &CancellationToken::new()).await;

    assert_eq!(job.status(), JobStatus::Succeeded);
    assert_eq!(backend.image_calls.load(Ordering::SeqCst), 3);
    match job.result() {
        Some(JobOutput::Images { frames, failures }) => {
            assert_eq!(frames.len(), 3);
            assert!(failures.is_empty());
            assert!(frames.iter().all(|f| f.is_generated() && f.source_timestamp.is_none()));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

/// Default policy is all-or-nothing: one failed sub-request fails the batch.
#[tokio::test]
async fn test_image_batch_all_or_nothing_when_second_fails() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .image(Ok(generated_png(4, 4)))
            .image(Err(status_error(429, "Resource has been exhausted")))
            .image(Ok(generated_png(4, 4))),
    );
    let (runner, _) = runner(backend.clone(), runner_config(BatchPolicy::AllOrNothing));

    let mut job = images_job(3);
    runner.run(&mut job, &test_key(), &CancellationToken::new()).await;

    assert_eq!(backend.image_calls.load(Ordering::SeqCst), 3);
    assert_eq!(job.status(), JobStatus::Failed);
    assert!(job.result().is_none());
    assert_eq!(
        job.error().map(|e| e.to_string()),
        Some("Resource has been exhausted".to_string())
    );
}

/// Opt-in alternative: keep the images that did come back.
#[tokio::test]
async fn test_image_batch_partial_success_policy() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .image(Ok(generated_png(4, 4)))
            .image(Err(status_error(429, "Resource has been exhausted")))
            .image(Ok(generated_png(4, 4))),
    );
    let (runner, _) = runner(backend, runner_config(BatchPolicy::PartialSuccess));

    let mut job = images_job(3);
    runner.run(&mut job, &test_key(), &CancellationToken::new()).await;

    assert_eq!(job.status(), JobStatus::Succeeded);
    match job.result() {
        Some(JobOutput::Images { frames, failures }) => {
            assert_eq!(frames.len(), 2);
            assert_eq!(failures, &vec!["Resource has been exhausted".to_string()]);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_image_batch_partial_success_still_fails_when_nothing_returns() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .image(Err(status_error(500, "first")))
            .image(Err(status_error(500, "second"))),
    );
    let (runner, _) = runner(backend, runner_config(BatchPolicy::PartialSuccess));

    let mut job = images_job(2);
    runner.run(&mut job, &test_key(), &CancellationToken::new()).await;

    assert_eq!(job.status(), JobStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_video_polls_at_fixed_interval_until_done() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .submission(Ok(pending("operations/veo-1")))
            .poll(Ok(pending("operations/veo-1")))
            .poll(Ok(pending("operations/veo-1")))
            .poll(Ok(finished("operations/veo-1", "https://files.test/v1:download?alt=media")))
            .video(Ok(vec![1, 2, 3, 4])),
    );
    let (runner, videos) = runner(backend.clone(), runner_config(BatchPolicy::AllOrNothing));

    let started = tokio::time::Instant::now();
    let mut job = video_job(AspectRatio::Landscape);
    runner.run(&mut job, &test_key(), &CancellationToken::new()).await;
    let elapsed = started.elapsed();

    assert_eq!(job.status(), JobStatus::Succeeded);
    assert_eq!(backend.poll_calls.load(Ordering::SeqCst), 3);
    assert!(elapsed >= Duration::from_secs(15), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(20), "elapsed {:?}", elapsed);

    assert_eq!(
        backend.fetched_uris.lock().unwrap().as_slice(),
        &["https://files.test/v1:download?alt=media&key=AIzaTestKey_0123456789".to_string()]
    );

    match job.result() {
        Some(JobOutput::Video(resource)) => {
            assert_eq!(resource.size_bytes, 4);
            let stored = videos.get(resource.id).await.unwrap();
            assert_eq!(stored.bytes.as_slice(), &[1, 2, 3, 4]);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_video_submits_bucketed_aspect_ratio() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .submission(Ok(finished("operations/veo-2", "https://files.test/v2")))
            .video(Ok(vec![0])),
    );
    let (runner, _) = runner(backend.clone(), RunnerConfig::default());

    let mut job = video_job(AspectRatio::StandardPortrait);
    runner.run(&mut job, &test_key(), &CancellationToken::new()).await;

    assert_eq!(job.status(), JobStatus::Succeeded);
    assert_eq!(backend.poll_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        backend.submitted_aspects.lock().unwrap().as_slice(),
        &[AspectRatio::Portrait]
    );
}

#[tokio::test(start_paused = true)]
async fn test_video_403_at_every_stage_is_billing_required() {
    let cases: Vec<ScriptedBackend> = vec![
        ScriptedBackend::new().submission(Err(status_error(403, "The caller does not have permission"))),
        ScriptedBackend::new()
            .submission(Ok(pending("op")))
            .poll(Err(ApiError::Malformed("got HTTP 403 while polling".to_string()))),
        ScriptedBackend::new()
            .submission(Ok(finished("op", "https://files.test/v3")))
            .video(Err(status_error(403, "Forbidden"))),
    ];

    for backend in cases {
        let hook = Arc::new(CountingHook::default());
        let videos = Arc::new(VideoStore::new());
        let runner = JobRunner::new(Arc::new(backend), videos, RunnerConfig::default())
            .with_key_selection(hook.clone());

        let mut job = video_job(AspectRatio::Landscape);
        runner.run(&mut job, &test_key(), &CancellationToken::new()).await;

        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(
            job.error().map(|e| e.category()),
            Some(FailureCategory::BillingRequired)
        );
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_video_done_without_uri_fails() {
    let backend = Arc::new(ScriptedBackend::new().submission(Ok(clipforge::services::backend::VideoOperation {
        name: "op".to_string(),
        done: true,
        video_uri: None,
    })));
    let (runner, _) = runner(backend, RunnerConfig::default());

    let mut job = video_job(AspectRatio::Landscape);
    runner.run(&mut job, &test_key(), &CancellationToken::new()).await;

    assert_eq!(job.error().map(|e| e.category()), Some(FailureCategory::Generation));
}

#[tokio::test(start_paused = true)]
async fn test_video_polling_times_out() {
    let backend = Arc::new(ScriptedBackend::new().submission(Ok(pending("op"))).keep_pending());
    let config = RunnerConfig {
        poll_interval: Duration::from_secs(5),
        max_wait: Some(Duration::from_secs(30)),
        batch_policy: BatchPolicy::AllOrNothing,
    };
    let (runner, _) = runner(backend.clone(), config);

    let mut job = video_job(AspectRatio::Landscape);
    runner.run(&mut job, &test_key(), &CancellationToken::new()).await;

    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.error(), Some(&GenerationFailure::TimedOut { waited_secs: 30 }));
    assert_eq!(backend.poll_calls.load(Ordering::SeqCst), 6);
}

#[tokio::test(start_paused = true)]
async fn test_video_polling_bound_shortens_last_wait() {
    let backend = Arc::new(ScriptedBackend::new().submission(Ok(pending("op"))).keep_pending());
    let config = RunnerConfig {
        poll_interval: Duration::from_secs(5),
        max_wait: Some(Duration::from_secs(7)),
        batch_policy: BatchPolicy::AllOrNothing,
    };
    let (runner, _) = runner(backend.clone(), config);

    let started = tokio::time::Instant::now();
    let mut job = video_job(AspectRatio::Landscape);
    runner.run(&mut job, &test_key(), &CancellationToken::new()).await;
    let elapsed = started.elapsed();

    assert_eq!(job.error(), Some(&GenerationFailure::TimedOut { waited_secs: 7 }));
    assert_eq!(backend.poll_calls.load(Ordering::SeqCst), 2);
    assert!(elapsed < Duration::from_secs(8), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_video_polling_stops_on_cancel() {
    let backend = Arc::new(ScriptedBackend::new().submission(Ok(pending("op"))).keep_pending());
    let (runner, _) = runner(backend.clone(), RunnerConfig::default());
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            cancel.cancel();
        })
    };

    let mut job = video_job(AspectRatio::Landscape);
    runner.run(&mut job, &test_key(), &cancel).await;
    canceller.await.unwrap();

    assert_eq!(job.error(), Some(&GenerationFailure::Cancelled));
    assert_eq!(backend.poll_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_terminal_job_is_not_rerun() {
    let backend = Arc::new(ScriptedBackend::new().analysis(Ok(STRUCTURED_ANALYSIS.to_string())));
    let (runner, _) = runner(backend.clone(), RunnerConfig::default());

    let mut job = analyze_job();
    runner.run(&mut job, &test_key(), &CancellationToken::new()).await;
    runner.run(&mut job, &test_key(), &CancellationToken::new()).await;

    assert_eq!(job.status(), JobStatus::Succeeded);
    assert_eq!(backend.analyze_calls.load(Ordering::SeqCst), 1);
}

async fn wait_for_terminal(registry: &JobRegistry, id: uuid::Uuid) -> GenerationJob {
    for _ in 0..200 {
        if let Some(job) = registry.get(id).await {
            if job.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish", id);
}

#[tokio::test]
async fn test_registry_runs_job_in_background() {
    let backend = Arc::new(ScriptedBackend::new().analysis(Ok(STRUCTURED_ANALYSIS.to_string())));
    let (runner, _) = runner(backend, RunnerConfig::default());
    let registry = Arc::new(JobRegistry::new(Arc::new(runner)));

    let submitted = registry
        .submit(JobSpec::analyze(start_frame(), None), test_key())
        .await;
    assert_eq!(submitted.status(), JobStatus::Idle);

    let finished = wait_for_terminal(&registry, submitted.id).await;
    assert_eq!(finished.status(), JobStatus::Succeeded);
    assert_eq!(registry.active_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_registry_supersedes_job_of_same_kind() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .submission(Ok(pending("first")))
            .submission(Ok(finished("second", "https://files.test/second")))
            .video(Ok(vec![9]))
            .keep_pending(),
    );
    let (runner, _) = runner(backend, RunnerConfig::default());
    let registry = Arc::new(JobRegistry::new(Arc::new(runner)));

    let first = registry
        .submit(video_job(AspectRatio::Landscape).spec, test_key())
        .await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    let second = registry
        .submit(video_job(AspectRatio::Landscape).spec, test_key())
        .await;

    assert!(registry.get(first.id).await.is_none());
    assert!(!registry.cancel(first.id).await);

    let finished = wait_for_terminal(&registry, second.id).await;
    assert_eq!(finished.status(), JobStatus::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn test_registry_cancel_marks_job_cancelled() {
    let backend = Arc::new(ScriptedBackend::new().submission(Ok(pending("op"))).keep_pending());
    let (runner, _) = runner(backend, RunnerConfig::default());
    let registry = Arc::new(JobRegistry::new(Arc::new(runner)));

    let job = registry
        .submit(video_job(AspectRatio::Landscape).spec, test_key())
        .await;
    tokio::time::sleep(Duration::from_secs(7)).await;
    assert!(registry.cancel(job.id).await);

    let finished = wait_for_terminal(&registry, job.id).await;
    assert_eq!(finished.error(), Some(&GenerationFailure::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn test_registry_releases_video_of_superseded_job() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .submission(Ok(finished("first", "https://files.test/first")))
            .video(Ok(vec![1]))
            .submission(Ok(finished("second", "https://files.test/second")))
            .video(Ok(vec![2])),
    );
    let (runner, videos) = runner(backend, RunnerConfig::default());
    let registry = Arc::new(JobRegistry::new(Arc::new(runner)));

    let first = registry
        .submit(video_job(AspectRatio::Landscape).spec, test_key())
        .await;
    let first_video = match wait_for_terminal(&registry, first.id).await.result() {
        Some(JobOutput::Video(video)) => video.id,
        other => panic!("unexpected result: {:?}", other),
    };
    assert_eq!(videos.len().await, 1);

    let second = registry
        .submit(video_job(AspectRatio::Landscape).spec, test_key())
        .await;
    let second_video = match wait_for_terminal(&registry, second.id).await.result() {
        Some(JobOutput::Video(video)) => video.id,
        other => panic!("unexpected result: {:?}", other),
    };

    assert_eq!(videos.len().await, 1);
    assert!(videos.get(first_video).await.is_none());
    assert!(videos.get(second_video).await.is_some());
}
