use super::{Executor, ExecutorError, TaskPlan};
use itertools::Itertools;
use std::fmt::Write;
use tracing::debug;

/// Prints the plan instead of running it
#[derive(Clone, Copy, Debug, Default)]
pub struct DryExecutor;

impl DryExecutor {
    pub fn render(plan: &TaskPlan) -> String {
        let mut output = String::new();

        for task in plan.tasks.iter() {
            let _ = writeln!(
                output,
                "path: {}, tasks: {}\n",
                task.task_dir.to_string_lossy(),
                task.subtasks
            );
        }

        let _ = write!(
            output,
            "Total tasks = {}; cpus_per_task={}; gpus_per_task={}",
            plan.total_subtasks(),
            plan.cpus_per_task,
            plan.gpus_per_task
        );

        output
    }
}

impl Executor for DryExecutor {
    fn execute(&mut self, plan: &TaskPlan) -> Result<(), ExecutorError> {
        debug!(command = %plan.command.iter().join(" "), "Dry run");
        for task in plan.tasks.iter() {
            debug!(task_dir = ?task.task_dir, args = ?task.args, "Planned task");
        }

        println!("{}", Self::render(plan));

        Ok(())
    }
}
