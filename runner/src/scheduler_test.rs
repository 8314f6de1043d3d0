use crate::{
    config::SchedulerConfig,
    scheduler::{parse_job_id, Scheduler, SchedulerError, SlurmScheduler},
};
use std::path::Path;
use tempfile::tempdir;

fn shell(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into(), "sh".into()]
}

fn scheduler(submit: &str, queue: &str, timeout: u64) -> SlurmScheduler {
    SlurmScheduler::new(SchedulerConfig {
        submit: shell(submit),
        queue: shell(queue),
        timeout,
        ..SchedulerConfig::default()
    })
}

#[test]
fn parses_sbatch_output() {
    assert_eq!(
        parse_job_id("Submitted batch job 12345\n", "Submitted batch job"),
        Some(12345)
    );
    assert_eq!(
        parse_job_id(
            "sbatch: warning: partition busy\nSubmitted batch job 7 on cluster perlmutter\n",
            "Submitted batch job"
        ),
        Some(7)
    );
    assert_eq!(parse_job_id("Submitted batch job\n", "Submitted batch job"), None);
    assert_eq!(parse_job_id("queued as 12", "Submitted batch job"), None);
}

#[test]
fn submit_runs_in_the_working_directory() {
    let dir = tempdir().unwrap();
    let scheduler = scheduler(
        r#"test -f "$1" && echo "Submitted batch job 42""#,
        "true",
        10,
    );
    std::fs::write(dir.path().join("submit.sh"), "#!/bin/sh\n").unwrap();

    assert_eq!(scheduler.submit(dir.path(), Path::new("submit.sh")).unwrap(), 42);
}

#[test]
fn failed_submission_keeps_diagnostics() {
    let dir = tempdir().unwrap();
    let scheduler = scheduler("echo partial; echo 'sbatch: error: invalid account' >&2; exit 1", "true", 10);

    match scheduler.submit(dir.path(), Path::new("submit.sh")) {
        Err(SchedulerError::SubmitFailed { stdout, stderr, .. }) => {
            assert_eq!(stdout.trim(), "partial");
            assert!(stderr.contains("invalid account"));
        }
        other => panic!("expected a failed submission, got {other:?}"),
    }
}

#[test]
fn unparsable_output_is_an_error() {
    let dir = tempdir().unwrap();
    let scheduler = scheduler("echo 'job accepted'", "true", 10);

    assert!(matches!(
        scheduler.submit(dir.path(), Path::new("submit.sh")),
        Err(SchedulerError::UnparsableJobId(_))
    ));
}

#[test]
fn queue_presence_is_non_empty_output() {
    let listed = scheduler("true", r#"echo "$1 R 0:01""#, 10);
    assert!(listed.in_queue(5).unwrap());

    let gone = scheduler("true", "exit 0", 10);
    assert!(!gone.in_queue(5).unwrap());

    let purged = scheduler("true", "echo 'Invalid job id specified' >&2; exit 1", 10);
    assert!(!purged.in_queue(5).unwrap());
}

#[test]
fn large_output_does_not_stall_the_command() {
    let verbose = scheduler("true", "head -c 200000 /dev/zero | tr '\\0' x", 10);

    assert!(verbose.in_queue(7).unwrap());
}

#[test]
fn hung_commands_time_out() {
    let hung = scheduler("true", "sleep 30", 1);

    assert!(matches!(
        hung.in_queue(5),
        Err(SchedulerError::Timeout { .. })
    ));
}

#[test]
fn missing_program_fails_to_spawn() {
    let scheduler = SlurmScheduler::new(SchedulerConfig {
        queue: vec!["/nonexistent/squeue".into()],
        ..SchedulerConfig::default()
    });

    assert!(matches!(
        scheduler.in_queue(1),
        Err(SchedulerError::Spawn { .. })
    ));
}
