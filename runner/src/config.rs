use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::{self, File},
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{error, warn};

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Executor not supported: {0}")]
    UnsupportedExecutor(String),
    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(#[from] Error),
    #[error("Failed to read config {path:?}: {source}")]
    Read { path: PathBuf, source: Error },
    #[error("Failed to parse config")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    // interpreter for python task scripts
    #[serde(default = "default_python")]
    pub python: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    // Name of the selected executor, see Executors::load for the selection proccess
    #[serde(default = "default_executor")]
    pub name: String,
    // size of the local thread pool, defaults to the number of cpus
    pub threads: Option<usize>,
    // per task timeout in seconds
    pub timeout: Option<u64>,
    // prefix for every task, `{tasks}`, `{cpus}` and `{gpus}` are substituted
    #[serde(default)]
    pub launcher: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    #[serde(default = "default_submit")]
    pub submit: Vec<String>,
    // the job id is appended as the last argument
    #[serde(default = "default_queue")]
    pub queue: Vec<String>,
    // text directly preceding the job id in the submit output
    #[serde(default = "default_job_pattern")]
    pub job_pattern: String,
    // seconds before a scheduler command is considered hung
    #[serde(default = "default_command_timeout")]
    pub timeout: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    #[serde(default)]
    pub resubmit: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    // seconds between polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_completion_marker")]
    pub completion_marker: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            scheduler: SchedulerConfig::default(),
            lifecycle: LifecycleConfig::default(),
            python: default_python(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            name: default_executor(),
            threads: None,
            timeout: None,
            launcher: Vec::new(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            submit: default_submit(),
            queue: default_queue(),
            job_pattern: default_job_pattern(),
            timeout: default_command_timeout(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            resubmit: false,
            max_retries: default_max_retries(),
            poll_interval: default_poll_interval(),
            completion_marker: default_completion_marker(),
        }
    }
}

impl SchedulerConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl LifecycleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }
}

impl RunnerConfig {
    /// read a yaml config, unknown keys are rejected
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let content = fs::read_to_string(path).map_err(|source| ConfigErrors::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn preflight_checks(&mut self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        self.executor.name = self.executor.name.to_lowercase();

        match self.executor.name.as_str() {
            "local" | "dry" => {}
            executor_name => {
                error!("executor.name ({executor_name}) is not supported, please use `local` or `dry`");
                contains_error = true;
            }
        }

        if self.executor.threads == Some(0) {
            error!("executor.threads cannot be 0");
            contains_error = true;
        }

        if self.executor.timeout == Some(0) {
            error!("executor.timeout cannot be 0, leave it out to disable the timeout");
            contains_error = true;
        }

        if self.scheduler.submit.is_empty() {
            error!("scheduler.submit must name the submit command");
            contains_error = true;
        }

        if self.scheduler.queue.is_empty() {
            error!("scheduler.queue must name the queue query command");
            contains_error = true;
        }

        if self.scheduler.job_pattern.trim().is_empty() {
            error!("scheduler.job_pattern cannot be empty, the job id would be unparsable");
            contains_error = true;
        }

        if self.scheduler.timeout == 0 {
            error!("scheduler.timeout cannot be 0");
            contains_error = true;
        }

        if self.lifecycle.completion_marker.is_empty() {
            error!("lifecycle.completion_marker cannot be empty, every log would count as finished");
            contains_error = true;
        }

        if self.lifecycle.poll_interval == 0 {
            warn!("lifecycle.poll_interval is 0, the scheduler will be queried without pause");
        }

        // a bare interpreter name is resolved through PATH at launch
        if self.python.components().count() > 1 {
            match check_executable(&self.python) {
                Ok(true) => {}
                Ok(false) => {
                    error!(
                        "python interpreter {} is not executable",
                        self.python.to_string_lossy()
                    );
                    contains_error = true;
                }
                Err(e) => {
                    error!(
                        "Failed to determine if python ({}) is an executable: {e}",
                        self.python.to_string_lossy()
                    );
                    contains_error = true;
                }
            }
        }

        contains_error
    }
}

fn default_executor() -> String {
    "local".to_owned()
}

fn default_submit() -> Vec<String> {
    vec!["sbatch".to_owned()]
}

fn default_queue() -> Vec<String> {
    vec!["squeue".to_owned(), "-h".to_owned(), "-j".to_owned()]
}

fn default_job_pattern() -> String {
    "Submitted batch job".to_owned()
}

fn default_command_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_poll_interval() -> u64 {
    60
}

fn default_completion_marker() -> String {
    "EXITING WORKFLOW ENVIRONMENT".to_owned()
}

/// interpreter of the active conda environment, plain `python` otherwise
fn default_python() -> PathBuf {
    env::var_os("CONDA_PREFIX")
        .map(|prefix| PathBuf::from(prefix).join("bin").join("python"))
        .unwrap_or_else(|| PathBuf::from("python"))
}
