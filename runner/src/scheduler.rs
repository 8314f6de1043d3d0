use crate::config::SchedulerConfig;
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, error, warn};
use wait_timeout::ChildExt;

pub type JobId = u64;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("No command configured for {0}")]
    EmptyCommand(&'static str),
    #[error("Failed to spawn {command}: {source}")]
    Spawn { command: String, source: io::Error },
    #[error("Failed to wait for {command}: {source}")]
    Wait { command: String, source: io::Error },
    #[error("{command} did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("Submission of {script:?} failed with {status}; stdout: {stdout:?}, stderr: {stderr:?}")]
    SubmitFailed {
        script: PathBuf,
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
    #[error("Could not parse a job id from submit output {0:?}")]
    UnparsableJobId(String),
}

/// Operations the lifecycle controller needs from a batch scheduler
pub trait Scheduler {
    /// submit `script` from within `workdir` and return the scheduler's job id
    fn submit(&self, workdir: &Path, script: &Path) -> Result<JobId, SchedulerError>;

    /// whether the job is still listed in the queue
    fn in_queue(&self, id: JobId) -> Result<bool, SchedulerError>;
}

impl<S: Scheduler + ?Sized> Scheduler for &S {
    fn submit(&self, workdir: &Path, script: &Path) -> Result<JobId, SchedulerError> {
        (**self).submit(workdir, script)
    }

    fn in_queue(&self, id: JobId) -> Result<bool, SchedulerError> {
        (**self).in_queue(id)
    }
}

/// Find `pattern` in the submit output and parse the number directly following it
pub fn parse_job_id(output: &str, pattern: &str) -> Option<JobId> {
    output.lines().find_map(|line| {
        let index = line.find(pattern)?;
        let digits: String = line[index + pattern.len()..]
            .trim_start()
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();

        digits.parse().ok()
    })
}

/// Read `pipe` to the end on its own thread
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buffer)?;
        }

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    })
}

struct CommandOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// Slurm through its command line tools, `sbatch` and `squeue` by default
#[derive(Debug, Clone)]
pub struct SlurmScheduler {
    config: SchedulerConfig,
}

impl SlurmScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    fn run(
        &self,
        program: &[String],
        args: &[&str],
        workdir: Option<&Path>,
        purpose: &'static str,
    ) -> Result<CommandOutput, SchedulerError> {
        let (executable, fixed) = program
            .split_first()
            .ok_or(SchedulerError::EmptyCommand(purpose))?;
        let command = program.join(" ");
        let timeout = self.config.command_timeout();

        let mut builder = Command::new(executable);
        builder
            .args(fixed)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(workdir) = workdir {
            builder.current_dir(workdir);
        }

        let mut child = builder.spawn().map_err(|source| SchedulerError::Spawn {
            command: command.clone(),
            source,
        })?;

        // pipes are drained while waiting, a full pipe would stall the command
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match child.wait_timeout(timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                // child hasn't exited yet
                if let Err(error) = child.kill() {
                    warn!(error = ?error, command = %command, "Failed to kill hung scheduler command");
                }
                if let Err(error) = child.wait() {
                    warn!(error = ?error, command = %command, "Failed to reap killed scheduler command");
                }

                return Err(SchedulerError::Timeout { command, timeout });
            }
            Err(source) => return Err(SchedulerError::Wait { command, source }),
        };

        let collect = |reader: JoinHandle<io::Result<String>>| {
            reader
                .join()
                .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "pipe reader panicked")))
                .map_err(|source| SchedulerError::Wait {
                    command: command.clone(),
                    source,
                })
        };
        let stdout = collect(stdout)?;
        let stderr = collect(stderr)?;

        debug!(command = %command, status = ?status, stdout = %stdout.trim(), "Scheduler command finished");

        Ok(CommandOutput {
            status,
            stdout,
            stderr,
        })
    }
}

impl Scheduler for SlurmScheduler {
    fn submit(&self, workdir: &Path, script: &Path) -> Result<JobId, SchedulerError> {
        let script_arg = script.to_string_lossy();
        let output = self.run(&self.config.submit, &[&script_arg], Some(workdir), "submit")?;

        if !output.status.success() {
            error!(
                status = ?output.status,
                stdout = %output.stdout,
                stderr = %output.stderr,
                "Submission failed"
            );

            return Err(SchedulerError::SubmitFailed {
                script: script.to_path_buf(),
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        parse_job_id(&output.stdout, &self.config.job_pattern)
            .ok_or(SchedulerError::UnparsableJobId(output.stdout))
    }

    fn in_queue(&self, id: JobId) -> Result<bool, SchedulerError> {
        let id_arg = id.to_string();
        let output = self.run(&self.config.queue, &[&id_arg], None, "queue")?;

        // squeue exits non-zero for ids it already purged
        if !output.status.success() {
            debug!(job = id, stderr = %output.stderr.trim(), "Queue query failed, treating job as gone");
            return Ok(false);
        }

        Ok(!output.stdout.trim().is_empty())
    }
}
