mod dry;
mod local;

pub use dry::DryExecutor;
pub use local::LocalExecutor;

use crate::config::{ConfigErrors, ExecutorConfig};
use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to create task directory {path:?}: {source}")]
    CreateTaskDir { path: PathBuf, source: io::Error },
    #[error("Failed to start the thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Plan has no command to run")]
    EmptyCommand,
    #[error("{failed} of {total} tasks failed")]
    TasksFailed { failed: u64, total: u64 },
}

/// One unit of work handed to an executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTask {
    pub args: Vec<String>,
    pub task_dir: PathBuf,
    pub subtasks: usize,
}

/// Everything an executor needs to launch a set of tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPlan {
    // program followed by its fixed arguments
    pub command: Vec<String>,
    pub tasks: Vec<PlannedTask>,
    pub cpus_per_task: usize,
    pub gpus_per_task: usize,
}

impl TaskPlan {
    pub fn total_subtasks(&self) -> usize {
        self.tasks.iter().map(|task| task.subtasks).sum()
    }
}

pub trait Executor {
    fn execute(&mut self, plan: &TaskPlan) -> Result<(), ExecutorError>;
}

#[derive(Clone, Debug)]
pub enum Executors {
    Dry(DryExecutor),
    Local(LocalExecutor),
}

impl Executors {
    /// pick the executor named in the config, `dry_run` always wins
    pub fn load(config: &ExecutorConfig, dry_run: bool) -> Result<Self, ConfigErrors> {
        if dry_run {
            return Ok(Self::Dry(DryExecutor));
        }

        match config.name.as_str() {
            "dry" => Ok(Self::Dry(DryExecutor)),
            "local" => Ok(Self::Local(LocalExecutor::load(config))),
            _ => Err(ConfigErrors::UnsupportedExecutor(config.name.clone())),
        }
    }

    pub fn execute(&mut self, plan: &TaskPlan) -> Result<(), ExecutorError> {
        match self {
            Self::Dry(executor) => executor.execute(plan),
            Self::Local(executor) => executor.execute(plan),
        }
    }
}
