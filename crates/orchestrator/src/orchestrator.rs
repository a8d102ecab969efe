//! The scaling orchestrator: grid generation, submission, tracking, and
//! assembly of the [`ScalingDataset`].

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use scalekit_core::dataset::ScalingDataset;
use scalekit_core::extract::{ProgressRecord, TimelineRecord};
use scalekit_core::grid;
use scalekit_core::point::ScalingPoint;
use scalekit_core::workload::Workload;
use scalekit_remote::{Job, JobHandle, JobState, RemoteBackend, RemoteError};

use crate::config::SweepOptions;
use crate::context::ExecutionContext;
use crate::error::OrchestratorError;
use crate::report::{PointReport, PointStatus, SweepReport};
use crate::tracker::{JobOutcome, JobTracker, MissingReason};

/// Progress and timeline records of one job, for export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobExport {
    /// Job directory name, unique within the run.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Vec<ProgressRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Vec<TimelineRecord>>,
}

/// Result of a sweep or collection pass.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub run_id: String,
    pub options: SweepOptions,
    pub dataset: ScalingDataset,
    pub report: SweepReport,
    pub exports: Vec<JobExport>,
}

pub struct Orchestrator {
    ctx: ExecutionContext,
    handle: JobHandle,
}

impl Orchestrator {
    pub fn new(ctx: ExecutionContext, backend: Arc<dyn RemoteBackend>) -> Self {
        Self {
            ctx,
            handle: JobHandle::new(backend),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Run a sweep: generate the grid, submit every job, and (unless in
    /// manual mode) track all of them to completion.
    ///
    /// Fails before any remote action on configuration errors, and after
    /// submission only when no job was accepted.
    pub async fn run(&self, options: &SweepOptions) -> Result<SweepOutcome, OrchestratorError> {
        options.validate()?;
        let host = self.ctx.hosts.get(&options.host)?.clone();
        let points = grid::generate(&options.grid, &host)?;
        let run_id = self.ctx.run_id.as_str();

        self.ctx.records.save_sweep(run_id, options)?;

        let planned = plan(options, &points);
        let total = planned.len();
        tracing::info!(
            run_id,
            host = %host.id,
            mode = %options.grid.mode,
            points = points.len(),
            jobs = total,
            "Starting sweep",
        );

        // Calls start in grid order; at most `max_concurrency` in flight.
        // Each accepted job is recorded as soon as its call returns, so a
        // stalled or cancelled submission never loses the others.
        let records = &self.ctx.records;
        let submitted: Vec<Submission> = stream::iter(planned)
            .map(|(point, repeat, workload)| {
                let handle = self.handle.clone();
                let host = &host;
                async move {
                    let result = handle.submit(host, run_id, &point, repeat, &workload).await;
                    let saved = match &result {
                        Ok(job) => records.save_job(run_id, job).map_err(|e| e.to_string()),
                        Err(_) => Ok(()),
                    };
                    Submission {
                        point,
                        repeat,
                        result,
                        saved,
                    }
                }
            })
            .buffered(self.ctx.config.max_concurrency)
            .take_until(self.ctx.cancel.cancelled())
            .collect()
            .await;

        let mut report = SweepReport::new(run_id, &host.id, options.manual);
        let mut accepted = Vec::new();
        let mut unrecorded = 0;
        let returned = submitted.len();
        for submission in submitted {
            let Submission {
                point,
                repeat,
                result,
                saved,
            } = submission;
            match (result, saved) {
                (Ok(job), Ok(())) => accepted.push(job),
                (Ok(job), Err(e)) => {
                    tracing::error!(
                        job_id = %job.id,
                        point = %point,
                        error = %e,
                        "Job record not saved",
                    );
                    unrecorded += 1;
                    report.push(PointReport {
                        point,
                        repeat,
                        job_id: Some(job.id),
                        status: PointStatus::MissingData(format!("job record not saved: {e}")),
                        skipped_records: 0,
                    });
                }
                (Err(e), _) => {
                    tracing::warn!(point = %point, repeat, error = %e, "Submission failed");
                    report.push(PointReport {
                        point,
                        repeat,
                        job_id: None,
                        status: PointStatus::SubmissionFailed(e.to_string()),
                        skipped_records: 0,
                    });
                }
            }
        }

        if self.ctx.cancel.is_cancelled() && returned < total {
            tracing::warn!(
                run_id,
                recorded = accepted.len(),
                not_submitted = total - returned,
                "Sweep cancelled during submission",
            );
        }

        if accepted.is_empty() && unrecorded == 0 {
            return Err(OrchestratorError::NoJobsAccepted {
                run_id: run_id.to_string(),
                host: host.id.clone(),
            });
        }

        if options.manual {
            for job in &accepted {
                report.push(PointReport {
                    point: job.point,
                    repeat: job.repeat,
                    job_id: Some(job.id.clone()),
                    status: PointStatus::Submitted,
                    skipped_records: 0,
                });
            }
            report.sort();
            tracing::info!(run_id, jobs = accepted.len(), "Jobs submitted, collect later");
            return Ok(SweepOutcome {
                run_id: run_id.to_string(),
                options: options.clone(),
                dataset: ScalingDataset::new(),
                report,
                exports: Vec::new(),
            });
        }

        Ok(self
            .track_all(options, accepted, ScalingDataset::new(), report)
            .await)
    }

    /// Re-entrant collection pass over the persisted records of the run.
    ///
    /// Jobs collected by an earlier pass contribute their archived data;
    /// every other recorded job is tracked as in [`Orchestrator::run`].
    pub async fn collect(
        &self,
        keep_output: Option<bool>,
    ) -> Result<SweepOutcome, OrchestratorError> {
        let run_id = self.ctx.run_id.as_str();
        let mut options = self.ctx.records.load_sweep(run_id)?;
        if let Some(keep) = keep_output {
            options.keep_output = keep;
        }
        // Fail early on a host that is no longer configured.
        self.ctx.hosts.get(&options.host)?;

        let mut dataset = ScalingDataset::new();
        let mut report = SweepReport::new(run_id, &options.host, false);

        for archived in self.ctx.records.load_archived(run_id)? {
            let job = archived.job;
            let status = match (&archived.run, job.state) {
                (Some(run), _) => {
                    dataset.insert(job.point, job.repeat, run.clone());
                    PointStatus::Collected
                }
                (None, JobState::TimedOut) => PointStatus::TimedOut,
                (None, state) => PointStatus::MissingData(format!("job {state}")),
            };
            report.push(PointReport {
                point: job.point,
                repeat: job.repeat,
                job_id: Some(job.id),
                status,
                skipped_records: 0,
            });
        }

        let jobs = self.ctx.records.load_jobs(run_id)?;
        tracing::info!(
            run_id,
            pending = jobs.len(),
            collected = dataset.len(),
            "Resuming collection",
        );

        Ok(self.track_all(&options, jobs, dataset, report).await)
    }

    async fn track_all(
        &self,
        options: &SweepOptions,
        jobs: Vec<Job>,
        mut dataset: ScalingDataset,
        mut report: SweepReport,
    ) -> SweepOutcome {
        let config = &self.ctx.config;
        let tracker = JobTracker {
            handle: self.handle.clone(),
            poll_interval: config.poll_interval,
            job_timeout: config.job_timeout,
            backoff: config.backoff(),
            keep_output: options.keep_output,
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
            cancel: self.ctx.cancel.clone(),
        };

        let mut tasks = JoinSet::new();
        for job in jobs {
            let tracker = tracker.clone();
            tasks.spawn(async move { tracker.track(job).await });
        }

        let mut exports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    self.absorb(options, outcome, &mut dataset, &mut report, &mut exports)
                }
                Err(e) => tracing::error!(error = %e, "Tracker task failed"),
            }
        }

        report.sort();
        exports.sort_by(|a: &JobExport, b: &JobExport| a.name.cmp(&b.name));
        tracing::info!(
            run_id = %self.ctx.run_id,
            with_data = report.points_with_data(),
            points = report.total_points(),
            "Sweep finished",
        );

        SweepOutcome {
            run_id: self.ctx.run_id.clone(),
            options: options.clone(),
            dataset,
            report,
            exports,
        }
    }

    /// Fold one outcome into the dataset, the records, and the report.
    fn absorb(
        &self,
        options: &SweepOptions,
        outcome: JobOutcome,
        dataset: &mut ScalingDataset,
        report: &mut SweepReport,
        exports: &mut Vec<JobExport>,
    ) {
        let run_id = self.ctx.run_id.as_str();
        let records = &self.ctx.records;

        let (job, status, skipped_records, persisted) = match outcome {
            JobOutcome::Collected {
                job,
                run,
                extraction,
            } => {
                if options.progress || options.timeline {
                    exports.push(JobExport {
                        name: job_dir_name(&job),
                        progress: options.progress.then(|| extraction.progress.records.clone()),
                        timeline: options.timeline.then(|| extraction.timeline.records.clone()),
                    });
                }
                let persisted = records.archive_job(run_id, &job, Some(&run));
                dataset.insert(job.point, job.repeat, run);
                (job, PointStatus::Collected, extraction.skipped_count(), persisted)
            }
            JobOutcome::Missing {
                job,
                reason,
                skipped_records,
            } => {
                let persisted = match reason {
                    // Finished for good.
                    MissingReason::RemoteFailed
                    | MissingReason::TimedOut
                    | MissingReason::Unreachable(_) => records.archive_job(run_id, &job, None),
                    // Output is still on the host; a later pass may retry.
                    _ => records.save_job(run_id, &job),
                };
                let status = match reason {
                    MissingReason::TimedOut => PointStatus::TimedOut,
                    other => PointStatus::MissingData(other.to_string()),
                };
                (job, status, skipped_records, persisted)
            }
            JobOutcome::Cancelled { job } => {
                let persisted = records.save_job(run_id, &job);
                (job, PointStatus::Cancelled, 0, persisted)
            }
        };

        if let Err(e) = persisted {
            tracing::error!(job_id = %job.id, error = %e, "Could not update job record");
        }

        report.push(PointReport {
            point: job.point,
            repeat: job.repeat,
            job_id: Some(job.id),
            status,
            skipped_records,
        });
    }
}

/// One returned submission call and whether its job record was saved.
struct Submission {
    point: ScalingPoint,
    repeat: u32,
    result: Result<Job, RemoteError>,
    saved: Result<(), String>,
}

/// Every (point, repeat) of the sweep with the workload it runs.
fn plan(options: &SweepOptions, points: &[ScalingPoint]) -> Vec<(ScalingPoint, u32, Workload)> {
    let base_cores = points.first().map_or(1, |p| p.total_cores()).max(1);
    points
        .iter()
        .flat_map(|point| (0..options.repeats).map(move |repeat| (*point, repeat)))
        .map(|(point, repeat)| {
            let workload = if options.weak {
                options.workload.scaled(point.total_cores() / base_cores)
            } else {
                options.workload.clone()
            };
            (point, repeat, workload)
        })
        .collect()
}

fn job_dir_name(job: &Job) -> String {
    job.working_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| job.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scalekit_core::grid::GridConfig;
    use scalekit_core::point::ParallelizationMode;
    use scalekit_core::workload::WorkloadSize;

    fn options(weak: bool, repeats: u32) -> SweepOptions {
        let workload = Workload {
            name: "galaxy".to_string(),
            command: "skirt".to_string(),
            args: Vec::new(),
            size: WorkloadSize {
                packages: 1000,
                wavelengths: 10,
                dust_cells: 100,
            },
        };
        let grid = GridConfig::new(ParallelizationMode::Mpi, 1.0, 4.0);
        let mut options = SweepOptions::new(workload, "cluster", grid);
        options.weak = weak;
        options.repeats = repeats;
        options
    }

    fn point(processes: u32) -> ScalingPoint {
        ScalingPoint {
            processes,
            cores_per_process: 1,
            nodes: processes,
            hybrid: false,
        }
    }

    #[test]
    fn plan_repeats_each_point_in_grid_order() {
        let planned = plan(&options(false, 2), &[point(1), point(2)]);
        let order: Vec<(u32, u32)> = planned.iter().map(|(p, r, _)| (p.processes, *r)).collect();
        assert_eq!(order, vec![(1, 0), (1, 1), (2, 0), (2, 1)]);
    }

    #[test]
    fn weak_scaling_grows_packages_with_cores() {
        let planned = plan(&options(true, 1), &[point(2), point(4), point(8)]);
        let packages: Vec<u64> = planned.iter().map(|(_, _, w)| w.size.packages).collect();
        assert_eq!(packages, vec![1000, 2000, 4000]);
    }
}
