pub mod workdir;

use crate::{
    config::LifecycleConfig,
    scheduler::{JobId, Scheduler, SchedulerError},
};
use std::{
    io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Maximum retries exceeded ({retry_count} > {max_retries})")]
    RetriesExhausted { retry_count: u32, max_retries: u32 },
    #[error("Job {id} exited the queue with failure, check the outputs in {workdir:?}")]
    JobFailed { id: JobId, workdir: PathBuf },
    #[error("Scheduler interaction failed")]
    Scheduler(#[from] SchedulerError),
    #[error("Failed to inspect working directory {workdir:?}: {source}")]
    Workdir { workdir: PathBuf, source: io::Error },
    #[error("{0:?} is not a valid working directory")]
    InvalidWorkdir(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Init,
    Submitted,
    Queued,
    LeftQueue,
    Resubmitting,
    Done,
    Failed,
    Vanished,
}

/// Everything a single poll learns about a job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observation {
    pub in_queue: bool,
    pub done_flag: bool,
    pub fail_flag: bool,
    pub all_complete: bool,
}

/// What to do once a job no longer needs polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Completed,
    Resubmit,
    Stop,
    Failed,
    Vanished,
}

/// Evaluate one observation, `None` means the job is still queued.
///
/// A finished workflow log wins over everything; after that the queue, then the fail
/// sentinel, then the done sentinel.
// a fail sentinel is fatal even when a done sentinel exists as well
pub fn decide(observation: &Observation, resubmit: bool) -> Option<Verdict> {
    if observation.all_complete {
        Some(Verdict::Completed)
    } else if observation.in_queue {
        None
    } else if observation.fail_flag {
        Some(Verdict::Failed)
    } else if observation.done_flag {
        Some(if resubmit {
            Verdict::Resubmit
        } else {
            Verdict::Stop
        })
    } else {
        Some(Verdict::Vanished)
    }
}

/// One scheduler job and where it stands
#[derive(Debug, Clone)]
pub struct Job {
    pub workdir: PathBuf,
    pub submission_file: PathBuf,
    pub id: Option<JobId>,
    pub state: JobState,
    pub retry_count: u32,
}

impl Job {
    pub fn new(workdir: PathBuf, submission_file: PathBuf, retry_count: u32) -> Self {
        Self {
            workdir,
            submission_file,
            id: None,
            state: JobState::Init,
            retry_count,
        }
    }
}

/// Non-fatal ways a job can end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// the workflow log reports completion
    Completed(JobId),
    /// left the queue with a done sentinel and resubmission is disabled
    Stopped(JobId),
    /// left the queue without any sentinel
    Vanished(JobId),
}

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub resubmit: bool,
    pub max_retries: u32,
    pub poll_interval: Duration,
    pub completion_marker: String,
}

impl From<&LifecycleConfig> for LifecycleSettings {
    fn from(config: &LifecycleConfig) -> Self {
        Self {
            resubmit: config.resubmit,
            max_retries: config.max_retries,
            poll_interval: config.poll_interval(),
            completion_marker: config.completion_marker.clone(),
        }
    }
}

/// Drives one job from submission to a terminal state, blocking the calling thread
pub struct JobLifecycleController<S> {
    scheduler: S,
    settings: LifecycleSettings,
}

impl<S: Scheduler> JobLifecycleController<S> {
    pub fn new(scheduler: S, settings: LifecycleSettings) -> Self {
        Self {
            scheduler,
            settings,
        }
    }

    fn workdir_error(workdir: &Path) -> impl FnOnce(io::Error) -> LifecycleError + '_ {
        move |source| LifecycleError::Workdir {
            workdir: workdir.to_path_buf(),
            source,
        }
    }

    /// Query the queue, the sentinels and the workflow log for `id`
    pub fn observe(&self, workdir: &Path, id: JobId) -> Result<Observation, LifecycleError> {
        let in_queue = self.scheduler.in_queue(id)?;
        let done_flag = workdir::sentinel_path(workdir, id, "done").is_file();
        let fail_flag = workdir::sentinel_path(workdir, id, "fail").is_file();
        let all_complete = workdir::workflow_finished(workdir, &self.settings.completion_marker)
            .map_err(Self::workdir_error(workdir))?;

        let observation = Observation {
            in_queue,
            done_flag,
            fail_flag,
            all_complete,
        };
        debug!(job = id, observation = ?observation, "Polled job");

        Ok(observation)
    }

    fn submit(&self, job: &mut Job) -> Result<JobId, LifecycleError> {
        let removed =
            workdir::clean_directory(&job.workdir).map_err(Self::workdir_error(&job.workdir))?;
        if !removed.is_empty() {
            info!(removed = removed.len(), workdir = ?job.workdir, "Cleaned stale artifacts");
        }

        info!(
            "Submitting job {}",
            job.workdir.join(&job.submission_file).to_string_lossy()
        );
        let id = self.scheduler.submit(&job.workdir, &job.submission_file)?;

        job.id = Some(id);
        job.state = JobState::Submitted;
        info!("Submitted job {id}");

        Ok(id)
    }

    /// Poll until the job needs no further polling
    fn wait(&self, job: &mut Job, id: JobId) -> Result<Verdict, LifecycleError> {
        loop {
            thread::sleep(self.settings.poll_interval);

            let observation = self.observe(&job.workdir, id)?;
            match decide(&observation, self.settings.resubmit) {
                Some(verdict) => return Ok(verdict),
                None => {
                    job.state = JobState::Queued;
                    info!("Job {id} still in queue...");
                }
            }
        }
    }

    /// Submit `job` and follow it to a terminal state, resubmitting while allowed.
    ///
    /// Every attempt cleans the working directory before it submits. Exceeding the
    /// retry budget, a fail sentinel and any scheduler error are fatal.
    pub fn run(&self, job: &mut Job) -> Result<Outcome, LifecycleError> {
        if !job.workdir.is_dir() {
            return Err(LifecycleError::InvalidWorkdir(job.workdir.clone()));
        }

        loop {
            if job.retry_count > self.settings.max_retries {
                error!(
                    retry_count = job.retry_count,
                    max_retries = self.settings.max_retries,
                    "Maximum retries exceeded"
                );

                return Err(LifecycleError::RetriesExhausted {
                    retry_count: job.retry_count,
                    max_retries: self.settings.max_retries,
                });
            }

            let id = self.submit(job)?;

            match self.wait(job, id)? {
                Verdict::Completed => {
                    job.state = JobState::Done;
                    info!("Workflow for job {id} finished; check subdirectories for job errors");

                    return Ok(Outcome::Completed(id));
                }
                Verdict::Resubmit => {
                    job.state = JobState::Resubmitting;
                    job.retry_count += 1;
                    info!(
                        "Job {id} left queue without completing; resubmitting (attempt {})",
                        job.retry_count
                    );
                }
                Verdict::Stop => {
                    job.state = JobState::LeftQueue;
                    info!("Job {id} exited the queue without failure");

                    return Ok(Outcome::Stopped(id));
                }
                Verdict::Failed => {
                    job.state = JobState::Failed;
                    error!(job = id, workdir = ?job.workdir, "Job exited the queue with failure");

                    return Err(LifecycleError::JobFailed {
                        id,
                        workdir: job.workdir.clone(),
                    });
                }
                Verdict::Vanished => {
                    job.state = JobState::Vanished;
                    warn!(
                        job = id,
                        workdir = ?job.workdir,
                        "Job left the queue without a sentinel or finished log; its outcome is unknown"
                    );

                    return Ok(Outcome::Vanished(id));
                }
            }
        }
    }
}
