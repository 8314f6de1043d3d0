use crate::scheduler::JobId;
use globset::{Glob, GlobMatcher, GlobSet, GlobSetBuilder};
use itertools::Itertools;
use once_cell::sync::Lazy;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// artifacts of earlier attempts, removed before every submission
pub const CLEANUP_PATTERNS: [&str; 7] = [
    "job_record.txt",
    "job.*.done",
    "job.*.fail",
    "*.out",
    "*.err",
    "logs*.txt",
    "restart*.dat",
];

pub const WORKFLOW_LOG_PATTERN: &str = "logs*.txt";

static CLEANUP_SET: Lazy<GlobSet> = Lazy::new(|| {
    let mut builder = GlobSetBuilder::new();
    for pattern in CLEANUP_PATTERNS {
        builder.add(Glob::new(pattern).expect("cleanup patterns are valid globs"));
    }
    builder.build().expect("cleanup patterns are valid globs")
});

static WORKFLOW_LOG: Lazy<GlobMatcher> = Lazy::new(|| {
    Glob::new(WORKFLOW_LOG_PATTERN)
        .expect("workflow log pattern is a valid glob")
        .compile_matcher()
});

/// `job.<id>.<outcome>` inside `workdir`
pub fn sentinel_path(workdir: &Path, id: JobId, outcome: &str) -> PathBuf {
    workdir.join(format!("job.{id}.{outcome}"))
}

/// plain files directly inside `workdir` whose name matches `accept`
fn files_matching<F>(workdir: &Path, accept: F) -> io::Result<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool,
{
    let mut matches = Vec::new();

    for entry in fs::read_dir(workdir)? {
        let entry = entry?;

        if !entry.file_type()?.is_file() {
            continue;
        }

        let path = entry.path();
        if path.file_name().map_or(false, |name| accept(Path::new(name))) {
            matches.push(path);
        }
    }

    Ok(matches)
}

/// the workflow log sorting last by name
pub fn latest_log(workdir: &Path) -> io::Result<Option<PathBuf>> {
    Ok(files_matching(workdir, |name| WORKFLOW_LOG.is_match(name))?
        .into_iter()
        .sorted()
        .last())
}

/// whether the latest workflow log contains `marker`
pub fn workflow_finished(workdir: &Path, marker: &str) -> io::Result<bool> {
    match latest_log(workdir)? {
        Some(log) => {
            // logs may carry non utf-8 output from the task programs
            let content = fs::read(&log)?;
            let finished = String::from_utf8_lossy(&content).contains(marker);
            debug!(log = ?log, finished, "Scanned workflow log");

            Ok(finished)
        }
        None => Ok(false),
    }
}

/// Remove sentinels, logs and restart files of a previous attempt, returns the removed paths
pub fn clean_directory(workdir: &Path) -> io::Result<Vec<PathBuf>> {
    let stale = files_matching(workdir, |name| CLEANUP_SET.is_match(name))?;

    for path in stale.iter() {
        match fs::remove_file(path) {
            Ok(()) => debug!(path = ?path, "Removed stale artifact"),
            // already gone is as good as removed
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                warn!(path = ?path, "Stale artifact vanished before removal")
            }
            Err(error) => return Err(error),
        }
    }

    Ok(stale)
}
