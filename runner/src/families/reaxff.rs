use super::{run_flags, FamilyError, PendingTask, RunLayout};
use crate::{assemble::Run, matching::Role};
use std::path::PathBuf;

/// JAX-ReaxFF force field fits, a fixed number of subtasks per run
#[derive(Debug, Clone)]
pub struct ReaxFFJob {
    pub layout: RunLayout,
    // init_FF, params, geo, train_file and optionally the validation files
    pub roles: Vec<Role>,
    pub fits_per_runpath: usize,
    // forwarded verbatim after the file arguments
    pub extra_args: Vec<String>,
    pub cpus_per_task: usize,
    pub gpus_per_task: usize,
    pub sort: bool,
    pub program: String,
}

impl ReaxFFJob {
    pub fn task_counts(&self, paths: &[PathBuf]) -> Vec<usize> {
        vec![self.fits_per_runpath.max(1); paths.len()]
    }

    pub fn task_command(&self) -> Vec<String> {
        vec![self.program.clone()]
    }

    pub fn runs(&self) -> Result<Vec<Run>, FamilyError> {
        self.layout.build_runs(&self.roles, None)
    }

    pub fn pending(&self, runs: Vec<Run>) -> Vec<PendingTask> {
        runs.into_iter()
            .map(|run| PendingTask {
                args: run_flags(&run)
                    .into_iter()
                    .chain(self.extra_args.iter().cloned())
                    .collect(),
                size_path: run.task_dir.clone(),
                task_dir: run.task_dir,
            })
            .collect()
    }
}
