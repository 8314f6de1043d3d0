use crate::config::{check_executable, ConfigErrors, RunnerConfig};
use std::{fs, os::unix::fs::PermissionsExt, path::PathBuf};
use tempfile::tempdir;

#[test]
fn empty_config_uses_defaults() {
    let mut config: RunnerConfig = serde_yaml::from_str("{}").unwrap();

    assert_eq!(config.executor.name, "local");
    assert_eq!(config.scheduler.submit, vec!["sbatch"]);
    assert_eq!(config.scheduler.queue, vec!["squeue", "-h", "-j"]);
    assert_eq!(config.scheduler.job_pattern, "Submitted batch job");
    assert_eq!(config.lifecycle.max_retries, 3);
    assert_eq!(config.lifecycle.poll_interval, 60);
    assert!(!config.lifecycle.resubmit);
    assert_eq!(config.lifecycle.completion_marker, "EXITING WORKFLOW ENVIRONMENT");

    config.python = PathBuf::from("python");
    assert!(!config.preflight_checks());
}

#[test]
fn unknown_keys_are_rejected() {
    assert!(serde_yaml::from_str::<RunnerConfig>("executor:\n  name: local\n  nodes: 4\n").is_err());
}

#[test]
fn preflight_collects_all_errors() {
    let mut config: RunnerConfig = serde_yaml::from_str(
        "executor:\n  name: Flux\n  threads: 0\nscheduler:\n  submit: []\n  job_pattern: ''\n",
    )
    .unwrap();
    config.python = PathBuf::from("python");

    assert!(config.preflight_checks());
    assert_eq!(config.executor.name, "flux");
}

#[test]
fn executable_bit_is_checked() {
    let dir = tempdir().unwrap();
    let script = dir.path().join("run.sh");
    fs::write(&script, "#!/bin/sh\n").unwrap();

    fs::set_permissions(&script, fs::Permissions::from_mode(0o644)).unwrap();
    assert!(!check_executable(&script).unwrap());

    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    assert!(check_executable(&script).unwrap());

    assert!(matches!(
        check_executable(&dir.path().join("missing")),
        Err(ConfigErrors::FileNotFound(_))
    ));
}

#[test]
fn load_reads_yaml_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("runner.yaml");
    fs::write(
        &path,
        "lifecycle:\n  resubmit: true\n  max_retries: 5\n  poll_interval: 10\nexecutor:\n  name: dry\n",
    )
    .unwrap();

    let config = RunnerConfig::load(&path).unwrap();
    assert!(config.lifecycle.resubmit);
    assert_eq!(config.lifecycle.max_retries, 5);
    assert_eq!(config.executor.name, "dry");

    assert!(matches!(
        RunnerConfig::load(&dir.path().join("missing.yaml")),
        Err(ConfigErrors::Read { .. })
    ));
}
