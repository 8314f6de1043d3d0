use super::{Executor, ExecutorError, PlannedTask, TaskPlan};
use crate::config::ExecutorConfig;
use rayon::{prelude::*, ThreadPoolBuilder};
use std::{
    fs::{self, File},
    io,
    process::{Command, ExitStatus, Stdio},
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};
use tracing::{debug, error, info, instrument, warn};
use wait_timeout::ChildExt;

/// Executor that works on a local thread pool
#[derive(Clone, Debug)]
pub struct LocalExecutor {
    threads: usize,
    timeout: Option<Duration>,
    launcher: Vec<String>,
}

impl LocalExecutor {
    /// create a new LocalExecutor instance
    pub fn load(config: &ExecutorConfig) -> Self {
        Self {
            threads: config.threads.unwrap_or_else(num_cpus::get),
            timeout: config.timeout.map(Duration::from_secs),
            launcher: config.launcher.clone(),
        }
    }

    /// launcher prefix with the task's resources filled in
    pub fn launcher_for(&self, task: &PlannedTask, plan: &TaskPlan) -> Vec<String> {
        self.launcher
            .iter()
            .map(|token| {
                token
                    .replace("{tasks}", &task.subtasks.to_string())
                    .replace("{cpus}", &plan.cpus_per_task.to_string())
                    .replace("{gpus}", &plan.gpus_per_task.to_string())
            })
            .collect()
    }

    fn run_task(&self, task: &PlannedTask, plan: &TaskPlan) -> io::Result<Option<ExitStatus>> {
        let argv = self
            .launcher_for(task, plan)
            .into_iter()
            .chain(plan.command.iter().cloned())
            .chain(task.args.iter().cloned())
            .collect::<Vec<_>>();
        // the plan was checked for a command before any task is started
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(&task.task_dir)
            .stdin(Stdio::null())
            .stdout(File::create(task.task_dir.join("task.out"))?)
            .stderr(File::create(task.task_dir.join("task.err"))?)
            .spawn()?;

        match self.timeout {
            Some(timeout) => match child.wait_timeout(timeout)? {
                Some(status) => Ok(Some(status)),
                None => {
                    // child hasn't exited yet
                    child.kill()?;
                    child.wait()?;

                    Ok(None)
                }
            },
            None => child.wait().map(Some),
        }
    }
}

impl Executor for LocalExecutor {
    /// execute tasks concurrently with a thread pool
    #[instrument(skip(self, plan), level = "info", fields(tasks = plan.tasks.len()))]
    fn execute(&mut self, plan: &TaskPlan) -> Result<(), ExecutorError> {
        if plan.command.is_empty() && self.launcher.is_empty() {
            return Err(ExecutorError::EmptyCommand);
        }

        for task in plan.tasks.iter() {
            fs::create_dir_all(&task.task_dir).map_err(|source| ExecutorError::CreateTaskDir {
                path: task.task_dir.clone(),
                source,
            })?;
        }

        debug!("Starting thread pool with {} threads", self.threads);

        let pool = ThreadPoolBuilder::new().num_threads(self.threads).build()?;

        // general counters to provide a progress log
        let total = plan.tasks.len() as u64;
        let processed = AtomicU64::new(0);
        let failed = AtomicU64::new(0);

        pool.install(|| {
            plan.tasks.par_iter().for_each(|task| {
                debug!(
                    "Processing {:?} with {} subtasks",
                    task.task_dir, task.subtasks
                );
                let start = Instant::now();

                match self.run_task(task, plan) {
                    Ok(Some(status)) => {
                        debug!(
                            "Finished in {} ms | status: {}",
                            start.elapsed().as_millis(),
                            status.success()
                        );

                        if !status.success() {
                            warn!(task_dir = ?task.task_dir, status = ?status, "Task failed");
                            failed.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    Ok(None) => {
                        warn!(task_dir = ?task.task_dir, "Task ran into timeout and was killed");
                        failed.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => {
                        error!(task_dir = ?task.task_dir, error = ?e, "Failed to run task");
                        failed.fetch_add(1, Ordering::SeqCst);
                    }
                }

                info!(
                    "Done with {}/{}",
                    processed.fetch_add(1, Ordering::SeqCst) + 1,
                    total
                );
            })
        });

        let failed = failed.load(Ordering::SeqCst);
        if failed > 0 {
            return Err(ExecutorError::TasksFailed { failed, total });
        }

        info!("Done with processing");

        Ok(())
    }
}
