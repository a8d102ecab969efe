//! Per-job tracking: poll on a fixed interval until the job finishes,
//! then fetch and extract its log.
//!
//! One tracker task runs per job. It owns its [`Job`] and reports a single
//! [`JobOutcome`]; the orchestrator is the only writer into the dataset
//! and the record store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use scalekit_core::dataset::RunAggregate;
use scalekit_core::extract::{extract_all, JobExtraction};
use scalekit_remote::backoff::{retry, Backoff, BackoffConfig};
use scalekit_remote::{Job, JobHandle, JobState};

/// Why a job produced no data.
#[derive(Debug, Clone, PartialEq)]
pub enum MissingReason {
    RemoteFailed,
    TimedOut,
    /// Polls kept failing until the retry budget ran out.
    Unreachable(String),
    LogUnavailable(String),
    ExtractionFailed(String),
    /// The log held no timing or memory records.
    NoRecords,
}

impl std::fmt::Display for MissingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingReason::RemoteFailed => write!(f, "remote job failed"),
            MissingReason::TimedOut => write!(f, "timed out"),
            MissingReason::Unreachable(e) => write!(f, "status unavailable: {e}"),
            MissingReason::LogUnavailable(e) => write!(f, "log unavailable: {e}"),
            MissingReason::ExtractionFailed(e) => write!(f, "extraction failed: {e}"),
            MissingReason::NoRecords => write!(f, "no timing or memory records in log"),
        }
    }
}

#[derive(Debug)]
pub enum JobOutcome {
    Collected {
        job: Job,
        run: RunAggregate,
        extraction: JobExtraction,
    },
    Missing {
        job: Job,
        reason: MissingReason,
        skipped_records: usize,
    },
    /// Tracking stopped on user abort.
    Cancelled { job: Job },
}

impl JobOutcome {
    pub fn job(&self) -> &Job {
        match self {
            JobOutcome::Collected { job, .. }
            | JobOutcome::Missing { job, .. }
            | JobOutcome::Cancelled { job } => job,
        }
    }
}

/// Shared configuration of all tracker tasks of a sweep.
#[derive(Clone)]
pub struct JobTracker {
    pub handle: JobHandle,
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    pub backoff: BackoffConfig,
    pub keep_output: bool,
    /// Bounds concurrent remote calls across all trackers.
    pub permits: Arc<Semaphore>,
    pub cancel: CancellationToken,
}

impl JobTracker {
    /// Track `job` to completion.
    pub async fn track(&self, mut job: Job) -> JobOutcome {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut backoff = Backoff::new(self.backoff.clone());

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(job_id = %job.id, "Tracking cancelled, job left running");
                    return JobOutcome::Cancelled { job };
                }
                _ = interval.tick() => {}
            }

            let polled = {
                let Ok(_permit) = self.permits.acquire().await else {
                    return JobOutcome::Cancelled { job };
                };
                self.handle.poll(&job).await
            };

            match polled {
                Ok(state) => {
                    backoff.reset();
                    job.transition(state);
                    match state {
                        JobState::Succeeded => return self.collect(job).await,
                        JobState::Failed => {
                            tracing::warn!(
                                job_id = %job.id,
                                point = %job.point,
                                "Remote job failed, output kept",
                            );
                            return self.missing(job, MissingReason::RemoteFailed, 0);
                        }
                        _ => {}
                    }
                }
                Err(e) if e.is_transient() => match backoff.record_failure() {
                    Some(delay) => {
                        tracing::warn!(
                            job_id = %job.id,
                            attempt = backoff.failures(),
                            error = %e,
                            "Poll failed, retrying",
                        );
                        tokio::select! {
                            _ = self.cancel.cancelled() => return JobOutcome::Cancelled { job },
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => {
                        tracing::error!(
                            job_id = %job.id,
                            error = %e,
                            "Poll retry budget exhausted, abandoning job",
                        );
                        return self.missing(job, MissingReason::Unreachable(e.to_string()), 0);
                    }
                },
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "Poll failed, abandoning job");
                    return self.missing(job, MissingReason::Unreachable(e.to_string()), 0);
                }
            }

            let elapsed = (Utc::now() - job.submit_time).to_std().unwrap_or_default();
            if elapsed >= self.job_timeout {
                job.transition(JobState::TimedOut);
                tracing::warn!(
                    job_id = %job.id,
                    point = %job.point,
                    elapsed_secs = elapsed.as_secs(),
                    "Job timed out",
                );
                if !self.keep_output {
                    self.cleanup_best_effort(&job).await;
                }
                return self.missing(job, MissingReason::TimedOut, 0);
            }
        }
    }

    async fn collect(&self, job: Job) -> JobOutcome {
        let tracker = self;
        let pending = &job;
        let fetched = retry(&self.backoff, &self.cancel, "Log fetch", move || async move {
            let _permit = tracker.permits.acquire().await.ok();
            tracker.handle.fetch_log(pending).await
        })
        .await;

        let lines = match fetched {
            None => return JobOutcome::Cancelled { job },
            Some(Ok(lines)) => lines,
            Some(Err(e)) => {
                tracing::error!(job_id = %job.id, error = %e, "Could not fetch job log");
                return self.missing(job, MissingReason::LogUnavailable(e.to_string()), 0);
            }
        };

        let extraction = match tokio::task::spawn_blocking(move || extract_all(&lines)).await {
            Ok(extraction) => extraction,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Extraction task failed");
                return self.missing(job, MissingReason::ExtractionFailed(e.to_string()), 0);
            }
        };

        let skipped = extraction.skipped_count();
        let Some(run) = RunAggregate::from_extraction(&extraction, job.size) else {
            tracing::warn!(job_id = %job.id, skipped, "Log produced no records, output kept");
            return self.missing(job, MissingReason::NoRecords, skipped);
        };

        tracing::info!(
            job_id = %job.id,
            point = %job.point,
            repeat = job.repeat,
            ranks = run.ranks,
            skipped,
            "Collected job",
        );

        if !self.keep_output {
            self.cleanup_best_effort(&job).await;
        }

        JobOutcome::Collected {
            job,
            run,
            extraction,
        }
    }

    fn missing(&self, job: Job, reason: MissingReason, skipped_records: usize) -> JobOutcome {
        JobOutcome::Missing {
            job,
            reason,
            skipped_records,
        }
    }

    async fn cleanup_best_effort(&self, job: &Job) {
        let _permit = self.permits.acquire().await.ok();
        if let Err(e) = self.handle.cleanup(job).await {
            tracing::warn!(job_id = %job.id, error = %e, "Cleanup failed, output left in place");
        }
    }
}
