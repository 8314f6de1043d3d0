use crate::{
    config::ExecutorConfig,
    executors::{DryExecutor, Executor, ExecutorError, Executors, LocalExecutor, PlannedTask, TaskPlan},
};
use std::fs;
use tempfile::tempdir;

fn plan(command: &[&str], tasks: Vec<PlannedTask>) -> TaskPlan {
    TaskPlan {
        command: command.iter().map(|part| part.to_string()).collect(),
        tasks,
        cpus_per_task: 2,
        gpus_per_task: 0,
    }
}

fn task(task_dir: std::path::PathBuf, args: &[&str], subtasks: usize) -> PlannedTask {
    PlannedTask {
        args: args.iter().map(|arg| arg.to_string()).collect(),
        task_dir,
        subtasks,
    }
}

#[test]
fn dry_run_lists_every_task_and_the_total() {
    let plan = plan(
        &["python", "lammps_task.py"],
        vec![
            task("/runs/a".into(), &[], 3),
            task("/runs/b".into(), &[], 1),
        ],
    );

    assert_eq!(
        DryExecutor::render(&plan),
        "path: /runs/a, tasks: 3\n\npath: /runs/b, tasks: 1\n\nTotal tasks = 4; cpus_per_task=2; gpus_per_task=0"
    );
}

#[test]
fn dry_run_flag_overrides_the_configured_executor() {
    let config = ExecutorConfig::default();

    assert!(matches!(
        Executors::load(&config, true).unwrap(),
        Executors::Dry(_)
    ));
    assert!(matches!(
        Executors::load(&config, false).unwrap(),
        Executors::Local(_)
    ));

    let unsupported = ExecutorConfig {
        name: "flux".into(),
        ..ExecutorConfig::default()
    };
    assert!(Executors::load(&unsupported, false).is_err());
}

#[test]
fn local_executor_runs_tasks_in_their_directories() {
    let dir = tempdir().unwrap();
    let plan = plan(
        &["sh", "-c", "echo \"$1\" > result.txt", "sh"],
        vec![
            task(dir.path().join("a"), &["first"], 1),
            task(dir.path().join("b/nested"), &["second"], 2),
        ],
    );
    let mut executor = LocalExecutor::load(&ExecutorConfig {
        threads: Some(2),
        ..ExecutorConfig::default()
    });

    executor.execute(&plan).unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("a/result.txt")).unwrap(),
        "first\n"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("b/nested/result.txt")).unwrap(),
        "second\n"
    );
    assert!(dir.path().join("a/task.out").is_file());
}

#[test]
fn failing_tasks_are_counted() {
    let dir = tempdir().unwrap();
    let plan = plan(
        &["sh", "-c", "exit \"$1\"", "sh"],
        vec![
            task(dir.path().join("ok"), &["0"], 1),
            task(dir.path().join("bad"), &["3"], 1),
        ],
    );
    let mut executor = LocalExecutor::load(&ExecutorConfig {
        threads: Some(1),
        ..ExecutorConfig::default()
    });

    assert!(matches!(
        executor.execute(&plan),
        Err(ExecutorError::TasksFailed {
            failed: 1,
            total: 2
        })
    ));
}

#[test]
fn timed_out_tasks_fail() {
    let dir = tempdir().unwrap();
    let plan = plan(&["sleep", "30"], vec![task(dir.path().join("slow"), &[], 1)]);
    let mut executor = LocalExecutor::load(&ExecutorConfig {
        threads: Some(1),
        timeout: Some(1),
        ..ExecutorConfig::default()
    });

    assert!(matches!(
        executor.execute(&plan),
        Err(ExecutorError::TasksFailed { failed: 1, .. })
    ));
}

#[test]
fn launcher_placeholders_are_filled() {
    let executor = LocalExecutor::load(&ExecutorConfig {
        launcher: vec![
            "srun".into(),
            "-n".into(),
            "{tasks}".into(),
            "--cpus-per-task={cpus}".into(),
            "--gpus-per-task={gpus}".into(),
        ],
        ..ExecutorConfig::default()
    });
    let plan = plan(&["python"], vec![]);

    assert_eq!(
        executor.launcher_for(&task("/r".into(), &[], 6), &plan),
        vec!["srun", "-n", "6", "--cpus-per-task=2", "--gpus-per-task=0"]
    );
}

#[test]
fn plans_without_a_command_are_rejected() {
    let dir = tempdir().unwrap();
    let plan = plan(&[], vec![task(dir.path().join("a"), &[], 1)]);
    let mut executor = LocalExecutor::load(&ExecutorConfig::default());

    assert!(matches!(
        executor.execute(&plan),
        Err(ExecutorError::EmptyCommand)
    ));
}
