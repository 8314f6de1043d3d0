use crate::matching::{common_prefix, proximity_combinations, Combination, MatchError, Role};
use itertools::{iproduct, Itertools};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("Failed to match input files")]
    Match(#[from] MatchError),
    #[error("Label {0} is requested in the argument order but no role provides it")]
    UnknownLabel(String),
    #[error("Label {0} is declared for both the run and the inputs directory")]
    DuplicateLabel(String),
}

/// A fully resolved task: ordered (label, path) arguments and the directory it runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub args: Vec<(String, PathBuf)>,
    pub task_dir: PathBuf,
}

impl Run {
    pub fn get(&self, label: &str) -> Option<&Path> {
        self.args
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, path)| path.as_path())
    }

    #[cfg(test)]
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|(label, _)| label.as_str())
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.args.iter().map(|(_, path)| path.as_path())
    }

    /// Permute (and project) the arguments into `order`
    pub fn reorder<S: AsRef<str>>(self, order: &[S]) -> Result<Self, AssembleError> {
        let mut by_label: BTreeMap<String, PathBuf> = self.args.into_iter().collect();

        let args = order
            .iter()
            .map(|label| {
                let label = label.as_ref();
                by_label
                    .remove(label)
                    .map(|path| (label.to_owned(), path))
                    .ok_or_else(|| AssembleError::UnknownLabel(label.to_owned()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            args,
            task_dir: self.task_dir,
        })
    }
}

/// Derive where a run's outputs go.
///
/// The deepest template path is compared against the per-case anchor; the components it
/// has between the common prefix (plus the template root itself) and its file name are
/// re-created below the anchor's parent directory.
pub fn task_directory(case: &Combination, template: &Combination) -> PathBuf {
    let anchor = case.anchor();
    let parent = anchor
        .path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let Some(deepest) = template.deepest() else {
        return parent;
    };

    let components = deepest.components();
    let shared = common_prefix(anchor.components(), components);
    let start = shared + 1;
    let end = components.len().saturating_sub(1);

    if start >= end {
        parent
    } else {
        components[start..end]
            .iter()
            .fold(parent, |path, component| path.join(component))
    }
}

/// Join a per-case and a template combination into a single run
pub fn assemble(case: &Combination, template: &Combination) -> Run {
    let args = case
        .entries()
        .iter()
        .chain(template.entries().iter())
        .map(|(label, candidate)| (label.clone(), candidate.path.clone()))
        .collect_vec();

    Run {
        args,
        task_dir: task_directory(case, template),
    }
}

/// Match `case_roles` under `run_root` and `template_roles` under `inputs_root`, then pair
/// every per-case combination with every template combination. Each run's arguments are
/// put into `order`.
pub fn build_full_runs<S: AsRef<str>>(
    run_root: &Path,
    case_roles: &[Role],
    inputs_root: &Path,
    template_roles: &[Role],
    order: &[S],
) -> Result<Vec<Run>, AssembleError> {
    if let Some(role) = case_roles
        .iter()
        .find(|role| template_roles.iter().any(|other| other.label == role.label))
    {
        return Err(AssembleError::DuplicateLabel(role.label.clone()));
    }

    let cases = proximity_combinations(run_root, case_roles)?;
    let templates = proximity_combinations(inputs_root, template_roles)?;

    debug!(
        cases = cases.len(),
        templates = templates.len(),
        "Assembling runs from matched combinations"
    );

    let runs = iproduct!(cases.iter(), templates.iter())
        .map(|(case, template)| assemble(case, template).reorder(order))
        .collect::<Result<Vec<_>, _>>()?;

    // duplicates are kept, later outputs may overwrite earlier ones
    runs.iter()
        .map(|run| &run.task_dir)
        .duplicates()
        .for_each(|task_dir| warn!(task_dir = ?task_dir, "Several runs share one task directory"));

    Ok(runs)
}
